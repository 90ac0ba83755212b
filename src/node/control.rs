/*!
 * Device Control
 * The in-process contract a registered unit exposes back to its node
 */

use crate::descriptor::{CodeKind, PropertyValue};
use thiserror::Error;

/// Faults reported by a controlled unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unit cannot {op} in its current state: {reason}")]
    InvalidState { op: &'static str, reason: String },

    #[error("load of {path} failed: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("execute of {path} failed: {reason}")]
    ExecuteFailed { path: String, reason: String },

    #[error("unit unreachable: {0}")]
    Unreachable(String),
}

/// Control surface of a launched and registered unit.
///
/// Implementations must return from `stop` and `release` within a bounded
/// time; the shutdown path relies on these calls not hanging.
pub trait DeviceControl: Send + Sync {
    fn identifier(&self) -> String;

    fn label(&self) -> String;

    fn start(&self) -> Result<(), ControlError>;

    fn stop(&self) -> Result<(), ControlError>;

    /// Tear the unit down. After release the unit is expected to
    /// unregister and exit on its own.
    fn release(&self) -> Result<(), ControlError>;

    fn configure(&self, props: &[(String, PropertyValue)]) -> Result<(), ControlError>;

    /// Load an artifact into a loadable unit.
    fn load(&self, path: &str, kind: CodeKind) -> Result<(), ControlError>;

    /// Launch a linked (in-host) executable inside an executable unit.
    fn execute_linked(
        &self,
        path: &str,
        args: &[(String, String)],
        dependencies: &[String],
    ) -> Result<(), ControlError>;
}
