/*!
 * Node Deployment Tests
 * End-to-end: plan a node configuration, launch real child processes,
 * serve registrations, and verify the ordered start pass
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sdr_node::core::types::NodeIdentity;
use sdr_node::descriptor::{CodeKind, JsonDescriptorStore, LocalFileStore, PropertyValue};
use sdr_node::node::{ControlError, DeviceControl, NodeManager, NodeManagerConfig};
use sdr_node::registry::LoopbackRegistry;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FakeDevice {
    identifier: String,
    label: String,
    started: Arc<Mutex<Vec<String>>>,
    configured: Mutex<Vec<(String, PropertyValue)>>,
}

impl FakeDevice {
    fn new(identifier: &str, started: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            label: format!("{identifier}_label"),
            started,
            configured: Mutex::new(Vec::new()),
        })
    }
}

impl DeviceControl for FakeDevice {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }
    fn label(&self) -> String {
        self.label.clone()
    }
    fn start(&self) -> Result<(), ControlError> {
        self.started.lock().push(self.identifier.clone());
        Ok(())
    }
    fn stop(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn release(&self) -> Result<(), ControlError> {
        Ok(())
    }
    fn configure(&self, props: &[(String, PropertyValue)]) -> Result<(), ControlError> {
        self.configured.lock().extend(props.iter().cloned());
        Ok(())
    }
    fn load(&self, _: &str, _: CodeKind) -> Result<(), ControlError> {
        Ok(())
    }
    fn execute_linked(
        &self,
        _: &str,
        _: &[(String, String)],
        _: &[String],
    ) -> Result<(), ControlError> {
        Ok(())
    }
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel.trim_start_matches('/'));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// An rx device whose first implementation only builds for sparc, plus a
/// package with no deployable implementation at all.
fn seed_store(root: &Path) {
    write(root, "/devices/rx/rx.sh", "#!/bin/sh\nsleep 5\n");
    write(
        root,
        "/devices/rx/rx.spd.json",
        r#"{
            "id": "DCE:rx",
            "name": "rx",
            "prf_file": "/devices/rx/rx.prf.json",
            "implementations": [
                { "id": "sparc_build",
                  "code": { "local_file": "rx.sh", "kind": "executable" },
                  "processors": ["sparc"] },
                { "id": "host_build",
                  "code": { "local_file": "rx.sh", "kind": "executable" } }
            ]
        }"#,
    );
    write(
        root,
        "/devices/rx/rx.prf.json",
        r#"[
            { "id": "sample_rate", "scalar_type": "long",
              "value": { "shape": "simple", "data": { "type": "long", "value": 3 } } }
        ]"#,
    );
    write(
        root,
        "/devices/never/never.spd.json",
        r#"{
            "id": "DCE:never",
            "name": "never",
            "implementations": [
                { "id": "sparc_build",
                  "code": { "local_file": "never.sh", "kind": "executable" },
                  "processors": ["sparc"] }
            ]
        }"#,
    );
    write(
        root,
        "/nodes/test/config.json",
        r#"{
            "id": "DCE:test_node",
            "name": "test_node",
            "placements": [
                { "package_file": "/devices/rx/rx.spd.json",
                  "instantiations": [
                      { "id": "inst_b", "usage_name": "rx_b", "start_order": 20 },
                      { "id": "inst_a", "usage_name": "rx_a", "start_order": 10 },
                      { "id": "inst_c", "usage_name": "rx_c" }
                  ] },
                { "package_file": "/devices/never/never.spd.json",
                  "instantiations": [{ "id": "inst_never" }] }
            ]
        }"#,
    );
}

fn manager_for(root: &Path) -> Arc<NodeManager> {
    manager_with(root, "/nodes/test/config.json")
}

fn manager_with(root: &Path, config_path: &str) -> Arc<NodeManager> {
    let files = LocalFileStore::new(root);
    let store = Arc::new(JsonDescriptorStore::new(files.clone()));
    let config = NodeManagerConfig {
        identity: NodeIdentity::new("DCE:test_node", "test_node", "SDR_DEV"),
        node_config_path: config_path.to_string(),
        cache_root: root.join("cache"),
        default_log_uri: None,
        debug_level: Some(2),
        event_channel: None,
        registry_retry: Duration::from_millis(10),
    };
    NodeManager::new(config, store, Arc::new(files), Arc::new(LoopbackRegistry::new()))
}

#[test]
fn test_full_node_lifecycle() {
    let dir = TempDir::new().unwrap();
    seed_store(dir.path());
    let manager = manager_for(dir.path());
    let reaper = manager
        .supervisor()
        .start_reaper(manager.shutdown_flag())
        .unwrap();

    // the sparc-only package is skipped, the rx instances launch
    let launched = manager.deploy().unwrap();
    assert_eq!(launched, 3);
    assert_eq!(manager.supervisor().child_count(), 3);
    assert_eq!(
        manager.implementation_id("inst_a").as_deref(),
        Some("host_build")
    );
    assert_eq!(manager.implementation_id("inst_never"), None);
    assert!(!manager.ledger().all_registered());

    // registration order deliberately differs from start order
    let started = Arc::new(Mutex::new(Vec::new()));
    let dev_c = FakeDevice::new("inst_c", Arc::clone(&started));
    let dev_b = FakeDevice::new("inst_b", Arc::clone(&started));
    let dev_a = FakeDevice::new("inst_a", Arc::clone(&started));

    manager.register_device(dev_c.clone()).unwrap();
    assert!(started.lock().is_empty());
    manager.register_device(dev_b.clone()).unwrap();
    manager.register_device(dev_a.clone()).unwrap();

    // explicit orders first (10 then 20), unordered units afterwards
    assert!(manager.ledger().all_registered());
    assert_eq!(*started.lock(), vec!["inst_a", "inst_b", "inst_c"]);

    // merged configure values were pushed before start
    assert!(dev_a
        .configured
        .lock()
        .iter()
        .any(|(id, _)| id == "sample_rate"));

    manager.shutdown_sequence(&manager.supervisor().exit_events());
    assert!(manager.ledger().live_pids().is_empty());
    let _ = reaper.join();
}

/// A service placement ordered ahead of a device. The service registers
/// under its usage name, and the start pass has to honor that.
fn seed_service_node(root: &Path) {
    write(root, "/services/clock/clock.sh", "#!/bin/sh\nsleep 5\n");
    write(
        root,
        "/services/clock/clock.spd.json",
        r#"{
            "id": "DCE:clock",
            "name": "clock",
            "kind": "service",
            "implementations": [
                { "id": "host_build",
                  "code": { "local_file": "clock.sh", "kind": "executable" } }
            ]
        }"#,
    );
    write(
        root,
        "/nodes/svc/config.json",
        r#"{
            "id": "DCE:svc_node",
            "name": "svc_node",
            "placements": [
                { "package_file": "/devices/rx/rx.spd.json",
                  "instantiations": [
                      { "id": "inst_dev", "usage_name": "rx_dev", "start_order": 20 }
                  ] },
                { "package_file": "/services/clock/clock.spd.json",
                  "instantiations": [
                      { "id": "inst_svc", "usage_name": "svc_1", "start_order": 10 }
                  ] }
            ]
        }"#,
    );
}

#[test]
fn test_service_start_order_uses_registration_name() {
    let dir = TempDir::new().unwrap();
    seed_store(dir.path());
    seed_service_node(dir.path());
    let manager = manager_with(dir.path(), "/nodes/svc/config.json");
    let reaper = manager
        .supervisor()
        .start_reaper(manager.shutdown_flag())
        .unwrap();
    assert_eq!(manager.deploy().unwrap(), 2);

    let started = Arc::new(Mutex::new(Vec::new()));
    let dev = FakeDevice::new("inst_dev", Arc::clone(&started));
    let svc = FakeDevice::new("svc_1", Arc::clone(&started));

    manager.register_device(dev).unwrap();
    assert!(started.lock().is_empty());
    manager
        .register_service("svc_1", Some(svc as Arc<dyn DeviceControl>))
        .unwrap();

    // declared orders win: the service at 10 starts before the device at 20
    assert_eq!(*started.lock(), vec!["svc_1", "inst_dev"]);

    manager.shutdown_sequence(&manager.supervisor().exit_events());
    assert!(manager.ledger().live_pids().is_empty());
    let _ = reaper.join();
}

#[test]
fn test_duplicate_registration_tolerated() {
    let dir = TempDir::new().unwrap();
    seed_store(dir.path());
    let manager = manager_for(dir.path());
    let reaper = manager
        .supervisor()
        .start_reaper(manager.shutdown_flag())
        .unwrap();
    manager.deploy().unwrap();

    let started = Arc::new(Mutex::new(Vec::new()));
    let dev = FakeDevice::new("inst_a", Arc::clone(&started));
    manager.register_device(dev.clone()).unwrap();
    manager.register_device(dev).unwrap();
    assert_eq!(manager.ledger().registered_units().len(), 1);

    manager.shutdown_sequence(&manager.supervisor().exit_events());
    let _ = reaper.join();
}
