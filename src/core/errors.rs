/*!
 * Error Types
 * Centralized re-exports of the per-subsystem error enums
 */

pub use crate::descriptor::store::ParseError;
pub use crate::matching::PropertyMatchingError;
pub use crate::node::control::ControlError;
pub use crate::plan::DeploymentError;
pub use crate::registry::RegistrationError;
pub use crate::supervise::ProcessLaunchError;
