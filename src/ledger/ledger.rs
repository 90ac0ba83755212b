/*!
 * Ledger Internals
 * Single-lock bookkeeping of pending and registered devices and services,
 * with the shutdown signal escalation that drains it
 */

use crate::core::types::{Pid, SIGNAL_GRACE, UNMANAGED_PID};
use crate::node::control::DeviceControl;
use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which table a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Device,
    Service,
}

/// One tracked unit. `pid` is [`UNMANAGED_PID`] for registrants this node
/// never launched; those are exempt from exit bookkeeping and from the
/// kill escalation.
#[derive(Clone)]
pub struct UnitRecord {
    pub identifier: String,
    pub label: String,
    pub pid: Pid,
    pub handle: Option<Arc<dyn DeviceControl>>,
}

impl fmt::Debug for UnitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRecord")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("handle", &self.handle.is_some())
            .finish()
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The identity was already registered; a tolerated no-op.
    AlreadyRegistered,
}

/// A unit removed by an exit notification.
#[derive(Debug, Clone)]
pub struct ExitedUnit {
    pub kind: UnitKind,
    pub record: UnitRecord,
    pub was_registered: bool,
}

#[derive(Default)]
struct Tables {
    pending_devices: Vec<UnitRecord>,
    registered_devices: Vec<UnitRecord>,
    pending_services: Vec<UnitRecord>,
    registered_services: Vec<UnitRecord>,
}

impl Tables {
    fn pending(&mut self, kind: UnitKind) -> &mut Vec<UnitRecord> {
        match kind {
            UnitKind::Device => &mut self.pending_devices,
            UnitKind::Service => &mut self.pending_services,
        }
    }

    fn registered(&mut self, kind: UnitKind) -> &mut Vec<UnitRecord> {
        match kind {
            UnitKind::Device => &mut self.registered_devices,
            UnitKind::Service => &mut self.registered_services,
        }
    }

    fn all_registered(&self) -> bool {
        self.pending_devices.is_empty() && self.pending_services.is_empty()
    }

    fn live_pids(&self) -> Vec<Pid> {
        [
            &self.pending_devices,
            &self.registered_devices,
            &self.pending_services,
            &self.registered_services,
        ]
        .into_iter()
        .flatten()
        .map(|r| r.pid)
        .filter(|pid| *pid != UNMANAGED_PID)
        .collect()
    }
}

/// The registration state machine behind a single exclusive lock.
///
/// No method calls out to a unit while holding the lock; callers get
/// cloned records (with `Arc` handles) to act on afterwards.
#[derive(Default)]
pub struct RegistrationLedger {
    tables: Mutex<Tables>,
    changed: Condvar,
}

impl RegistrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a launched unit the node now expects to register.
    pub fn insert_pending(&self, kind: UnitKind, identifier: &str, label: &str, pid: Pid) {
        let mut tables = self.tables.lock();
        tables.pending(kind).push(UnitRecord {
            identifier: identifier.to_string(),
            label: label.to_string(),
            pid,
            handle: None,
        });
        debug!("{} {} pending (pid {})", kind_name(kind), label, pid);
    }

    /// Promote a pending unit to registered, carrying its pid over. A
    /// registrant with no pending entry gets a synthetic zero-pid record.
    /// Re-registering a registered identity is a warning no-op.
    pub fn register(
        &self,
        kind: UnitKind,
        identifier: &str,
        label: &str,
        handle: Option<Arc<dyn DeviceControl>>,
    ) -> RegisterOutcome {
        let mut tables = self.tables.lock();
        if tables
            .registered(kind)
            .iter()
            .any(|r| r.identifier == identifier)
        {
            warn!("{} {} is already registered", kind_name(kind), identifier);
            return RegisterOutcome::AlreadyRegistered;
        }

        let pending = tables.pending(kind);
        let record = match pending.iter().position(|r| r.identifier == identifier) {
            Some(index) => {
                let mut record = pending.remove(index);
                record.label = label.to_string();
                record.handle = handle;
                record
            }
            None => {
                info!(
                    "{} {} registered without a pending launch",
                    kind_name(kind),
                    identifier
                );
                UnitRecord {
                    identifier: identifier.to_string(),
                    label: label.to_string(),
                    pid: UNMANAGED_PID,
                    handle,
                }
            }
        };
        tables.registered(kind).push(record);
        drop(tables);
        self.changed.notify_all();
        RegisterOutcome::Registered
    }

    /// Handle of a registered device, for persona launches.
    pub fn device_handle(&self, identifier: &str) -> Option<Arc<dyn DeviceControl>> {
        let tables = self.tables.lock();
        tables
            .registered_devices
            .iter()
            .find(|r| r.identifier == identifier)
            .and_then(|r| r.handle.clone())
    }

    /// Remove whatever record tracks the exited pid. Synthetic zero-pid
    /// registrants are never matched.
    pub fn on_exit(&self, pid: Pid) -> Option<ExitedUnit> {
        if pid == UNMANAGED_PID {
            return None;
        }
        let mut tables = self.tables.lock();
        let mut removed = None;
        for (kind, registered) in [(UnitKind::Device, true), (UnitKind::Service, true)]
            .into_iter()
            .chain([(UnitKind::Device, false), (UnitKind::Service, false)])
        {
            let table = if registered {
                tables.registered(kind)
            } else {
                tables.pending(kind)
            };
            if let Some(index) = table.iter().position(|r| r.pid == pid) {
                removed = Some(ExitedUnit {
                    kind,
                    record: table.remove(index),
                    was_registered: registered,
                });
                break;
            }
        }
        drop(tables);
        if removed.is_some() {
            self.changed.notify_all();
        }
        removed
    }

    /// Explicit unregister. A unit whose process is still alive moves
    /// back to pending; it still has to exit or be escalated.
    pub fn unregister(&self, kind: UnitKind, identifier: &str) -> Option<UnitRecord> {
        let mut tables = self.tables.lock();
        let table = tables.registered(kind);
        let index = table.iter().position(|r| r.identifier == identifier)?;
        let record = table.remove(index);
        if record.pid != UNMANAGED_PID {
            let mut back = record.clone();
            back.handle = None;
            tables.pending(kind).push(back);
        }
        drop(tables);
        self.changed.notify_all();
        Some(record)
    }

    /// True once every expected unit has registered.
    pub fn all_registered(&self) -> bool {
        self.tables.lock().all_registered()
    }

    /// Snapshot of registered units, devices first.
    pub fn registered_units(&self) -> Vec<(UnitKind, UnitRecord)> {
        let tables = self.tables.lock();
        tables
            .registered_devices
            .iter()
            .map(|r| (UnitKind::Device, r.clone()))
            .chain(
                tables
                    .registered_services
                    .iter()
                    .map(|r| (UnitKind::Service, r.clone())),
            )
            .collect()
    }

    pub fn live_pids(&self) -> Vec<Pid> {
        self.tables.lock().live_pids()
    }

    /// Wait until no launched child is tracked anymore, up to `timeout`.
    pub fn wait_children_gone(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut tables = self.tables.lock();
        while !tables.live_pids().is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.changed.wait_for(&mut tables, deadline - now);
        }
        true
    }

    /// Signal every remaining launched child, escalating from SIGINT
    /// through SIGTERM to SIGKILL with a grace period between steps.
    /// Zero-pid registrants and already-exited children are skipped.
    ///
    /// `drain` runs with the lock released, before each step and
    /// throughout each grace; callers use it to feed queued exit
    /// notifications into [`Self::on_exit`] so a step never re-signals
    /// a pid that already died.
    pub fn escalate_shutdown(&self, mut drain: impl FnMut()) {
        for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGKILL] {
            drain();
            let pids = self.live_pids();
            if pids.is_empty() {
                return;
            }
            info!("sending {} to {} remaining children", sig, pids.len());
            for pid in pids {
                if let Err(e) = kill(nix::unistd::Pid::from_raw(pid as i32), sig) {
                    // Raced with the exit path; the reaper will clean up
                    debug!("signal {} to pid {} failed: {}", sig, pid, e);
                }
            }
            if sig != Signal::SIGKILL {
                let deadline = Instant::now() + SIGNAL_GRACE;
                loop {
                    drain();
                    let now = Instant::now();
                    let mut tables = self.tables.lock();
                    if tables.live_pids().is_empty() || now >= deadline {
                        break;
                    }
                    let step = (deadline - now).min(Duration::from_millis(50));
                    self.changed.wait_for(&mut tables, step);
                }
            }
        }
        drain();
    }
}

fn kind_name(kind: UnitKind) -> &'static str {
    match kind {
        UnitKind::Device => "device",
        UnitKind::Service => "service",
    }
}
