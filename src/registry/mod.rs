/*!
 * Domain Registry
 * Contract with the domain coordinator plus the reachability monitor
 */

mod health;
mod loopback;

pub use health::HealthMonitor;
pub use loopback::LoopbackRegistry;

use crate::core::types::NodeIdentity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Registration failures against the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Transient transport trouble; worth retrying.
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),

    /// The coordinator rejected the registration outright.
    #[error("registration rejected: {0}")]
    Rejected(String),
}

impl RegistrationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistrationError::Unreachable(_))
    }
}

/// The domain coordinator as seen by a node.
pub trait RemoteRegistry: Send + Sync {
    fn register_node(&self, node: &NodeIdentity) -> Result<(), RegistrationError>;

    fn unregister_node(&self, node: &NodeIdentity) -> Result<(), RegistrationError>;

    fn register_device(&self, identifier: &str, label: &str) -> Result<(), RegistrationError>;

    fn unregister_device(&self, identifier: &str) -> Result<(), RegistrationError>;

    fn register_service(&self, name: &str) -> Result<(), RegistrationError>;

    fn unregister_service(&self, name: &str) -> Result<(), RegistrationError>;

    fn is_reachable(&self) -> bool;
}

/// Retry a transient-failing operation until it succeeds or shutdown is
/// requested. Rejections propagate immediately.
pub fn with_retry<T>(
    shutdown: &AtomicBool,
    interval: Duration,
    what: &str,
    mut op: impl FnMut() -> Result<T, RegistrationError>,
) -> Result<T, RegistrationError> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if shutdown.load(Ordering::SeqCst) {
                    return Err(e);
                }
                log::warn!("{} failed, retrying: {}", what, e);
                std::thread::sleep(interval);
            }
            Err(e) => return Err(e),
        }
    }
}
