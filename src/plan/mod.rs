/*!
 * Deployment Planning
 * Turns a node configuration into launch-ready records with merged
 * properties and an explicit start sequence
 */

pub mod overrides;
pub mod planner;

pub use overrides::apply_overrides;
pub use planner::{
    DeploymentPlan, DeploymentPlanner, DeploymentRecord, LaunchStrategy,
};

use crate::descriptor::ParseError;
use crate::matching::PropertyMatchingError;
use crate::registry::RegistrationError;
use thiserror::Error;

/// Failures while planning or launching a deployment.
#[derive(Error, Debug)]
pub enum DeploymentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Matching(#[from] PropertyMatchingError),

    #[error("package {package} has no implementation deployable on this host")]
    NoDeployableImplementation { package: String },

    #[error("instantiation {instantiation} names unknown composite parent {parent}")]
    MissingCompositeParent {
        instantiation: String,
        parent: String,
    },

    #[error("placement of {package} declares no instantiations")]
    EmptyPlacement { package: String },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
