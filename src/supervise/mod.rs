/*!
 * Process Supervision
 * Launches planned units, composes their environments, and reaps exits
 */

pub mod artifacts;
pub mod environment;
pub mod launcher;

pub use artifacts::{classify, ArtifactClass, SearchPathMods};
pub use environment::compose_child_env;
pub use launcher::{ExitEvent, LaunchContext, ProcessSupervisor};

use crate::node::control::ControlError;
use std::io;
use thiserror::Error;

/// Launch-time failures for a single unit. These are logged per unit and
/// never abort the rest of the node.
#[derive(Error, Debug)]
pub enum ProcessLaunchError {
    #[error("package {package} carries no selected implementation")]
    NoImplementation { package: String },

    #[error("artifact {path} not present in the file store")]
    MissingArtifact { path: String },

    #[error("cannot spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("composite parent {parent} never registered")]
    ParentUnresolved { parent: String },

    #[error("composite host call failed: {0}")]
    Host(#[from] ControlError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
