/*!
 * Core Module
 * Shared identifiers, states, and error re-exports
 */

pub mod errors;
pub mod types;

pub use errors::*;
pub use types::{AdminState, NodeIdentity, Pid};
