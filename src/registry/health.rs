/*!
 * Coordinator Health Monitor
 * Polls reachability and triggers re-registration after an outage
 */

use crate::registry::RemoteRegistry;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background reachability poller. When the coordinator comes back after
/// an observed outage, the recovery callback runs so the node can
/// re-register itself and everything it tracks.
pub struct HealthMonitor {
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn(
        registry: Arc<dyn RemoteRegistry>,
        shutdown: Arc<AtomicBool>,
        interval: Duration,
        on_recover: impl Fn() + Send + 'static,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("registry-health".to_string())
            .spawn(move || {
                let mut outage = false;
                while !shutdown.load(Ordering::SeqCst) {
                    let reachable = registry.is_reachable();
                    if !reachable && !outage {
                        warn!("domain coordinator unreachable");
                        outage = true;
                    } else if reachable && outage {
                        info!("domain coordinator reachable again, re-registering");
                        outage = false;
                        on_recover();
                    }
                    thread::sleep(interval);
                }
            })
            .ok();
        Self { handle }
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NodeIdentity;
    use crate::registry::RegistrationError;
    use std::sync::atomic::AtomicU32;

    struct FlappingRegistry {
        up: AtomicBool,
    }

    impl RemoteRegistry for FlappingRegistry {
        fn register_node(&self, _: &NodeIdentity) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn unregister_node(&self, _: &NodeIdentity) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn register_device(&self, _: &str, _: &str) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn unregister_device(&self, _: &str) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn register_service(&self, _: &str) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn unregister_service(&self, _: &str) -> Result<(), RegistrationError> {
            Ok(())
        }
        fn is_reachable(&self) -> bool {
            self.up.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_recovery_callback_fires_after_outage() {
        let registry = Arc::new(FlappingRegistry {
            up: AtomicBool::new(false),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let recoveries = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&recoveries);
        let monitor = HealthMonitor::spawn(
            registry.clone(),
            Arc::clone(&shutdown),
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        thread::sleep(Duration::from_millis(50));
        registry.up.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));

        shutdown.store(true, Ordering::SeqCst);
        monitor.join();
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    }
}
