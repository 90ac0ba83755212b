/*!
 * SDR Node Library
 * Deployment and device-management middleware for a software-defined-radio node
 */

pub mod core;
pub mod descriptor;
pub mod ledger;
pub mod matching;
pub mod node;
pub mod plan;
pub mod registry;
pub mod resolve;
pub mod supervise;

// Re-exports
pub use crate::core::types::{AdminState, NodeIdentity, Pid};
pub use descriptor::{
    AccessMode, CodeKind, ComparisonAction, ComponentInstantiation, ComponentKind,
    ComponentPlacement, DescriptorStore, FileStore, Implementation, JsonDescriptorStore,
    LocalFileStore, NodeConfiguration, PackageDescriptor, ParseError, Property, PropertyCatalog,
    PropertyKinds, PropertyValue, ScalarType, SimpleValue, SoftPackageRef,
};
pub use ledger::{RegistrationLedger, UnitKind, UnitRecord};
pub use matching::PropertyMatchingError;
pub use node::{ControlError, DeviceControl, NodeManager, NodeManagerConfig};
pub use plan::{DeploymentError, DeploymentPlan, DeploymentPlanner, DeploymentRecord, LaunchStrategy};
pub use registry::{RegistrationError, RemoteRegistry};
pub use supervise::{ProcessLaunchError, ProcessSupervisor};
