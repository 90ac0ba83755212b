/*!
 * Loopback Registry
 * In-process coordinator stand-in for single-host runs and tests
 */

use crate::core::types::NodeIdentity;
use crate::registry::{RegistrationError, RemoteRegistry};
use log::info;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Accepts every registration and remembers it. Useful when no external
/// coordinator transport is wired in.
#[derive(Default)]
pub struct LoopbackRegistry {
    devices: Mutex<HashSet<String>>,
    services: Mutex<HashSet<String>>,
    nodes: Mutex<HashSet<String>>,
}

impl LoopbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn service_count(&self) -> usize {
        self.services.lock().len()
    }
}

impl RemoteRegistry for LoopbackRegistry {
    fn register_node(&self, node: &NodeIdentity) -> Result<(), RegistrationError> {
        info!("node {} joined domain {}", node.label, node.domain_name);
        self.nodes.lock().insert(node.identifier.clone());
        Ok(())
    }

    fn unregister_node(&self, node: &NodeIdentity) -> Result<(), RegistrationError> {
        self.nodes.lock().remove(&node.identifier);
        Ok(())
    }

    fn register_device(&self, identifier: &str, label: &str) -> Result<(), RegistrationError> {
        info!("device {} ({}) registered with domain", label, identifier);
        self.devices.lock().insert(identifier.to_string());
        Ok(())
    }

    fn unregister_device(&self, identifier: &str) -> Result<(), RegistrationError> {
        self.devices.lock().remove(identifier);
        Ok(())
    }

    fn register_service(&self, name: &str) -> Result<(), RegistrationError> {
        info!("service {} registered with domain", name);
        self.services.lock().insert(name.to_string());
        Ok(())
    }

    fn unregister_service(&self, name: &str) -> Result<(), RegistrationError> {
        self.services.lock().remove(name);
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        true
    }
}
