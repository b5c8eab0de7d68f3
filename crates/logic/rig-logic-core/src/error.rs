//! Error types for rig logic.

use rig_dna::DnaError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RigLogicError {
    /// A parent rest matrix could not be inverted.
    #[error("Bone '{bone}' has a non-invertible parent rest matrix")]
    DegenerateBone { bone: String },

    /// Behavior tables are inconsistent with the definition.
    #[error("Invalid behavior data: {reason}")]
    InvalidBehavior { reason: String },

    /// A control index or name does not exist in the asset.
    #[error("Unknown control '{name}'")]
    UnknownControl { name: String },

    #[error(transparent)]
    Dna(#[from] DnaError),
}

impl RigLogicError {
    /// Get error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::DegenerateBone { .. } => "rest_pose",
            Self::InvalidBehavior { .. } => "behavior",
            Self::UnknownControl { .. } => "controls",
            Self::Dna(err) => err.category(),
        }
    }
}
