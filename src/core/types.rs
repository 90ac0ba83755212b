/*!
 * Core Types
 * Node identity and administrative state shared across subsystems
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OS process identifier. Zero marks a registrant the node never launched.
pub type Pid = u32;

/// Pid value used for registrants that were not launched by this node.
pub const UNMANAGED_PID: Pid = 0;

/// Grace period between signal escalation steps during shutdown.
pub const SIGNAL_GRACE: Duration = Duration::from_millis(500);

/// How long a persona launch waits for its composite parent to register.
pub const PARENT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for a composite parent registration.
pub const PARENT_RESOLVE_POLL: Duration = Duration::from_millis(100);

/// Identity a node presents to the domain coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub identifier: String,
    pub label: String,
    pub domain_name: String,
}

impl NodeIdentity {
    pub fn new(
        identifier: impl Into<String>,
        label: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            domain_name: domain_name.into(),
        }
    }

    /// Path under which launched units report themselves: `<domain>/<label>`.
    pub fn scoped_path(&self) -> String {
        format!("{}/{}", self.domain_name, self.label)
    }
}

/// Administrative lifecycle of the node manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminState {
    Active,
    ShuttingDown,
    Shutdown,
}

impl Default for AdminState {
    fn default() -> Self {
        AdminState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_path() {
        let id = NodeIdentity::new("DCE:abc", "DevMgr_node", "SDR_DEV");
        assert_eq!(id.scoped_path(), "SDR_DEV/DevMgr_node");
    }

    #[test]
    fn test_admin_state_default() {
        assert_eq!(AdminState::default(), AdminState::Active);
    }
}
