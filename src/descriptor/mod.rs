/*!
 * Descriptor Model
 * Typed, in-memory representation of the deployment profiles a node boots from
 */

pub mod node_config;
pub mod package;
pub mod property;
pub mod store;
pub mod value;

pub use node_config::{
    ComponentInstantiation, ComponentPlacement, LoggingDirective, NodeConfiguration,
    OverrideValue, PropertyOverride,
};
pub use package::{
    CodeArtifact, CodeKind, ComponentKind, DependencyRef, DependencyValue, Implementation,
    OsConstraint, PackageDescriptor, SoftPackageRef, UsesDeviceRequirement,
};
pub use property::{AccessMode, ComparisonAction, Property, PropertyCatalog, PropertyKinds};
pub use store::{DescriptorStore, FileStore, JsonDescriptorStore, LocalFileStore, ParseError};
pub use value::{PropertyValue, ScalarType, SimpleValue, StructValue, ValueError};
