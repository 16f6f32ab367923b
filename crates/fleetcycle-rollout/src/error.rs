//! Replacement run error taxonomy.

use std::time::Duration;

use thiserror::Error;

use fleetcycle_core::{FleetError, GroupName, ImageRef, InstanceId};

/// Result type alias for replacement operations.
pub type ReplaceResult<T> = Result<T, ReplaceError>;

/// Errors that terminate a replacement run.
#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("group not found: {0}")]
    GroupNotFound(GroupName),

    #[error("image not found: {0}")]
    ImageNotFound(ImageRef),

    #[error("timed out after {waited:?} waiting for {phase}")]
    Timeout { phase: &'static str, waited: Duration },

    #[error("replacement cancelled by operator")]
    Cancelled,

    #[error("provider terminated the just-launched instance {0} instead of an old one")]
    UnexpectedRemoval(InstanceId),

    #[error("inconsistent group state: {0}")]
    Inconsistent(String),

    #[error("provider error: {0}")]
    Provider(#[from] FleetError),
}
