/*!
 * Node Coordination
 * Ties planning, supervision, the ledger, and the registry into one node
 */

pub mod control;
pub mod manager;
pub mod signals;

pub use control::{ControlError, DeviceControl};
pub use manager::{host_catalog, NodeManager, NodeManagerConfig};
