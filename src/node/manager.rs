/*!
 * Node Manager
 * Deploys the node configuration, serves registrations from launched
 * units, runs the start pass, and drives orderly shutdown
 */

use crate::core::types::{AdminState, NodeIdentity};
use crate::descriptor::{
    ComparisonAction, DescriptorStore, FileStore, Property, PropertyCatalog, PropertyKinds,
    PropertyValue, ScalarType, SimpleValue,
};
use crate::ledger::{RegisterOutcome, RegistrationLedger, UnitKind};
use crate::node::control::DeviceControl;
use crate::node::signals;
use crate::plan::{DeploymentError, DeploymentPlanner};
use crate::registry::{with_retry, RegistrationError, RemoteRegistry};
use crate::supervise::{ExitEvent, LaunchContext, ProcessSupervisor};
use dashmap::DashMap;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Static node-level settings.
#[derive(Debug, Clone)]
pub struct NodeManagerConfig {
    pub identity: NodeIdentity,
    /// Store path of the node configuration document.
    pub node_config_path: String,
    pub cache_root: PathBuf,
    pub default_log_uri: Option<String>,
    pub debug_level: Option<u8>,
    pub event_channel: Option<String>,
    /// Backoff between coordinator registration retries.
    pub registry_retry: Duration,
}

/// Allocation catalog advertising this host's identity, the values the
/// processor and OS placement checks run against.
pub fn host_catalog() -> PropertyCatalog {
    fn identity(name: &str, value: &str) -> Property {
        Property {
            id: name.to_string(),
            name: Some(name.to_string()),
            mode: crate::descriptor::AccessMode::ReadOnly,
            action: ComparisonAction::Eq,
            kinds: PropertyKinds::ALLOCATION,
            scalar_type: ScalarType::String,
            value: Some(PropertyValue::Simple(SimpleValue::String(
                value.to_string(),
            ))),
        }
    }

    let processor = match std::env::consts::ARCH {
        "x86" | "i686" => "x86",
        other => other,
    };
    let os = match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        other => other,
    };

    let os_version = nix::sys::utsname::uname()
        .map(|u| u.release().to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut catalog = PropertyCatalog::new();
    let _ = catalog.insert(identity("processor_name", processor));
    let _ = catalog.insert(identity("os_name", os));
    let _ = catalog.insert(identity("os_version", &os_version));
    info!(
        "host identity: processor {} os {} {}",
        processor, os, os_version
    );
    catalog
}

/// Coordinates the whole node lifecycle.
pub struct NodeManager {
    config: NodeManagerConfig,
    store: Arc<dyn DescriptorStore>,
    registry: Arc<dyn RemoteRegistry>,
    ledger: Arc<RegistrationLedger>,
    supervisor: Arc<ProcessSupervisor>,
    shutdown: Arc<AtomicBool>,
    host: PropertyCatalog,
    /// instantiation id -> implementation id chosen for it
    implementation_ids: DashMap<String, String>,
    /// registration identity -> configure payload applied at registration
    configure_payloads: DashMap<String, Vec<(String, PropertyValue)>>,
    start_sequence: Mutex<Vec<String>>,
    started: AtomicBool,
    admin: Mutex<AdminState>,
}

impl NodeManager {
    pub fn new(
        config: NodeManagerConfig,
        store: Arc<dyn DescriptorStore>,
        files: Arc<dyn FileStore>,
        registry: Arc<dyn RemoteRegistry>,
    ) -> Arc<Self> {
        let ledger = Arc::new(RegistrationLedger::new());
        let supervisor = Arc::new(ProcessSupervisor::new(files, Arc::clone(&ledger)));
        Arc::new(Self {
            config,
            store,
            registry,
            ledger,
            supervisor,
            shutdown: Arc::new(AtomicBool::new(false)),
            host: host_catalog(),
            implementation_ids: DashMap::new(),
            configure_payloads: DashMap::new(),
            start_sequence: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            admin: Mutex::new(AdminState::Active),
        })
    }

    pub fn ledger(&self) -> &Arc<RegistrationLedger> {
        &self.ledger
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn admin_state(&self) -> AdminState {
        *self.admin.lock()
    }

    /// Implementation chosen for an instantiation, once planned.
    pub fn implementation_id(&self, instantiation_id: &str) -> Option<String> {
        self.implementation_ids
            .get(instantiation_id)
            .map(|e| e.value().clone())
    }

    fn launch_context(&self) -> LaunchContext {
        LaunchContext {
            node: self.config.identity.clone(),
            node_ref: self.config.identity.identifier.clone(),
            event_channel: self.config.event_channel.clone(),
            cache_root: self.config.cache_root.clone(),
            default_log_uri: self.config.default_log_uri.clone(),
            debug_level: self.config.debug_level,
        }
    }

    /// Register with the coordinator, plan the node configuration, and
    /// launch every planned unit. Per-unit launch failures are logged
    /// and skipped. Returns the number of launched units.
    pub fn deploy(&self) -> Result<usize, DeploymentError> {
        with_retry(
            &self.shutdown,
            self.config.registry_retry,
            "node registration",
            || self.registry.register_node(&self.config.identity),
        )?;

        let node_config = self.store.load_node_config(&self.config.node_config_path)?;
        info!(
            "deploying node {} ({} placements)",
            node_config.name,
            node_config.placements.len()
        );

        let planner = DeploymentPlanner::new(self.store.as_ref(), &self.host);
        let plan = planner.build(&node_config);
        *self.start_sequence.lock() = plan.start_sequence.clone();

        let ctx = self.launch_context();
        let mut launched = 0;
        for rec in &plan.records {
            if let Some(imp) = rec.implementation() {
                self.implementation_ids
                    .insert(rec.instantiation.id.clone(), imp.id.clone());
            }
            self.configure_payloads.insert(
                rec.registration_identity().to_string(),
                configure_payload(&rec.merged),
            );

            match self.supervisor.launch(rec, &ctx) {
                Ok(()) => launched += 1,
                Err(e) => error!("launch of {} failed: {}", rec.label(), e),
            }
        }
        info!("launched {}/{} planned units", launched, plan.records.len());
        Ok(launched)
    }

    /// Serve a device registration from a launched unit.
    pub fn register_device(
        &self,
        handle: Arc<dyn DeviceControl>,
    ) -> Result<(), RegistrationError> {
        let identifier = handle.identifier();
        let label = handle.label();

        // Configure before exposing the device, and outside any lock
        if let Some(payload) = self.configure_payloads.get(&identifier) {
            if !payload.is_empty() {
                if let Err(e) = handle.configure(payload.value()) {
                    warn!("initial configure of {} failed: {}", label, e);
                }
            }
        }

        let outcome =
            self.ledger
                .register(UnitKind::Device, &identifier, &label, Some(handle));
        if outcome == RegisterOutcome::AlreadyRegistered {
            return Ok(());
        }
        if let Err(e) = self.registry.register_device(&identifier, &label) {
            if !e.is_transient() {
                return Err(e);
            }
            warn!("domain registration of {} deferred: {}", label, e);
        }
        self.maybe_start();
        Ok(())
    }

    /// Serve a service registration.
    pub fn register_service(
        &self,
        name: &str,
        handle: Option<Arc<dyn DeviceControl>>,
    ) -> Result<(), RegistrationError> {
        let outcome = self.ledger.register(UnitKind::Service, name, name, handle);
        if outcome == RegisterOutcome::AlreadyRegistered {
            return Ok(());
        }
        if let Err(e) = self.registry.register_service(name) {
            if !e.is_transient() {
                return Err(e);
            }
            warn!("domain registration of service {} deferred: {}", name, e);
        }
        self.maybe_start();
        Ok(())
    }

    /// Explicit unregister from a still-running unit.
    pub fn unregister_device(&self, identifier: &str) {
        if self.ledger.unregister(UnitKind::Device, identifier).is_some() {
            if let Err(e) = self.registry.unregister_device(identifier) {
                warn!("domain unregister of {} failed: {}", identifier, e);
            }
        }
    }

    pub fn unregister_service(&self, name: &str) {
        if self.ledger.unregister(UnitKind::Service, name).is_some() {
            if let Err(e) = self.registry.unregister_service(name) {
                warn!("domain unregister of service {} failed: {}", name, e);
            }
        }
    }

    /// Bookkeeping for a reaped child.
    pub fn handle_exit(&self, event: ExitEvent) {
        let Some(exited) = self.ledger.on_exit(event.pid) else {
            return;
        };
        match (event.code, event.signal) {
            (Some(0), _) => info!("{} (pid {}) exited cleanly", exited.record.label, event.pid),
            (Some(code), _) => warn!(
                "{} (pid {}) exited with status {}",
                exited.record.label, event.pid, code
            ),
            (None, Some(sig)) => warn!(
                "{} (pid {}) terminated by signal {}",
                exited.record.label, event.pid, sig
            ),
            (None, None) => warn!("{} (pid {}) exited", exited.record.label, event.pid),
        }
        if exited.was_registered {
            let result = match exited.kind {
                UnitKind::Device => self.registry.unregister_device(&exited.record.identifier),
                UnitKind::Service => self.registry.unregister_service(&exited.record.identifier),
            };
            if let Err(e) = result {
                warn!(
                    "domain unregister of exited {} failed: {}",
                    exited.record.identifier, e
                );
            }
        }
    }

    /// Once every expected unit has registered, run the start pass:
    /// explicitly ordered units first, ascending, then the rest in
    /// registration order.
    fn maybe_start(&self) {
        if !self.ledger.all_registered() {
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let sequence = self.start_sequence.lock().clone();
        let registered = self.ledger.registered_units();
        let mut ordered = Vec::new();
        for id in &sequence {
            if let Some((_, rec)) = registered.iter().find(|(_, r)| &r.identifier == id) {
                ordered.push(rec.clone());
            }
        }
        for (_, rec) in &registered {
            if !sequence.contains(&rec.identifier) {
                ordered.push(rec.clone());
            }
        }

        info!("all expected units registered, starting {}", ordered.len());
        for rec in ordered {
            if let Some(handle) = rec.handle {
                if let Err(e) = handle.start() {
                    error!("start of {} failed: {}", rec.label, e);
                }
            }
        }
    }

    /// Re-register the node and everything it tracks; the health monitor
    /// calls this after a coordinator outage ends.
    pub fn reset_registrations(&self) {
        if let Err(e) = self.registry.register_node(&self.config.identity) {
            warn!("node re-registration failed: {}", e);
            return;
        }
        for (kind, rec) in self.ledger.registered_units() {
            let result = match kind {
                UnitKind::Device => self.registry.register_device(&rec.identifier, &rec.label),
                UnitKind::Service => self.registry.register_service(&rec.identifier),
            };
            if let Err(e) = result {
                warn!("re-registration of {} failed: {}", rec.identifier, e);
            }
        }
    }

    pub fn all_children_exited(&self) -> bool {
        self.supervisor.child_count() == 0
    }

    /// Drain exit events until shutdown is requested, then run the
    /// shutdown sequence.
    pub fn run(&self, events: flume::Receiver<ExitEvent>) {
        loop {
            if signals::requested() {
                self.shutdown.store(true, Ordering::SeqCst);
            }
            match events.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => self.handle_exit(event),
                Err(flume::RecvTimeoutError::Timeout) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shutdown_sequence(&events);
    }

    /// Stop in reverse start order, release and unregister everything,
    /// then escalate signals against whatever remains.
    pub fn shutdown_sequence(&self, events: &flume::Receiver<ExitEvent>) {
        *self.admin.lock() = AdminState::ShuttingDown;
        self.shutdown.store(true, Ordering::SeqCst);
        info!("node {} shutting down", self.config.identity.label);

        let mut sequence = self.start_sequence.lock().clone();
        sequence.reverse();
        let registered = self.ledger.registered_units();
        for id in &sequence {
            if let Some((_, rec)) = registered.iter().find(|(_, r)| &r.identifier == id) {
                if let Some(handle) = &rec.handle {
                    if let Err(e) = handle.stop() {
                        warn!("stop of {} failed: {}", rec.label, e);
                    }
                }
            }
        }

        if let Err(e) = self.registry.unregister_node(&self.config.identity) {
            warn!("node unregister failed: {}", e);
        }

        for (kind, rec) in self.ledger.registered_units() {
            if let Some(handle) = &rec.handle {
                if let Err(e) = handle.release() {
                    warn!("release of {} failed: {}", rec.label, e);
                }
            }
            match kind {
                UnitKind::Device => self.unregister_device(&rec.identifier),
                UnitKind::Service => self.unregister_service(&rec.identifier),
            }
        }

        // Give released children a moment to exit on their own, then
        // escalate against the stragglers. The drain keeps the ledger
        // current between steps so dead pids are never re-signalled.
        while let Ok(event) = events.try_recv() {
            self.handle_exit(event);
        }
        self.ledger.escalate_shutdown(|| {
            while let Ok(event) = events.try_recv() {
                self.handle_exit(event);
            }
        });

        // The run loop is gone, so pump the remaining exits here
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !self.ledger.live_pids().is_empty() && std::time::Instant::now() < deadline {
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.handle_exit(event),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        if !self.ledger.live_pids().is_empty() {
            warn!("some children never exited");
        }

        *self.admin.lock() = AdminState::Shutdown;
        info!("node {} shutdown complete", self.config.identity.label);
    }
}

/// Populated configure-kind values handed to a device right after it
/// registers.
fn configure_payload(merged: &PropertyCatalog) -> Vec<(String, PropertyValue)> {
    merged
        .of_kind(PropertyKinds::CONFIGURE | PropertyKinds::PROPERTY)
        .filter_map(|p| p.value.as_ref().map(|v| (p.id.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_catalog_advertises_identity() {
        let host = host_catalog();
        let proc = host.get_by_name("processor_name").unwrap();
        assert!(proc.is_kind(PropertyKinds::ALLOCATION));
        assert_eq!(proc.action, ComparisonAction::Eq);
        assert!(host.get_by_name("os_name").is_some());

        let version = host.get_by_name("os_version").unwrap();
        assert!(matches!(
            version.simple_value(),
            Some(SimpleValue::String(v)) if !v.is_empty()
        ));
    }

    #[test]
    fn test_configure_payload_skips_empty_values() {
        let mut merged = PropertyCatalog::new();
        merged
            .insert(Property::simple("a", SimpleValue::Long(1)))
            .unwrap();
        let mut empty = Property::simple("b", SimpleValue::Long(0));
        empty.value = None;
        merged.insert(empty).unwrap();
        let mut exec_only = Property::simple("c", SimpleValue::Long(3));
        exec_only.kinds = PropertyKinds::EXECPARAM;
        merged.insert(exec_only).unwrap();

        let payload = configure_payload(&merged);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload[0].0, "a");
    }
}
