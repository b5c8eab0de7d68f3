//! Error types for rig instances and the editing session.

use rig_dna::DnaError;
use rig_logic::RigLogicError;

use crate::ids::Component;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InstanceError {
    /// An evaluation is already running; nested evaluation is rejected.
    #[error("Rig evaluation already in progress")]
    EvaluationInProgress,

    /// The handle's slot was freed or reused.
    #[error("Stale rig handle (index {index}, generation {generation})")]
    StaleHandle { index: u32, generation: u32 },

    /// The instance has no DNA or scene rig for the component.
    #[error("Rig component {component:?} is not available")]
    MissingComponent { component: Component },

    /// An editor operation that needs an active editing session.
    #[error("RBF editing is not active")]
    NotEditing,

    /// An editor operation was refused by its validation.
    #[error("{reason}")]
    Rejected { reason: String },

    /// Creating, reading or restoring a DNA backup failed.
    #[error("DNA backup failed: {reason}")]
    Backup { reason: String },

    #[error(transparent)]
    Logic(#[from] RigLogicError),

    #[error(transparent)]
    Dna(#[from] DnaError),
}

impl InstanceError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Get error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::EvaluationInProgress => "reentrancy",
            Self::StaleHandle { .. } => "handle",
            Self::MissingComponent { .. } => "component",
            Self::NotEditing | Self::Rejected { .. } => "editor",
            Self::Backup { .. } => "backup",
            Self::Logic(err) => err.category(),
            Self::Dna(err) => err.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_category() {
        let err: InstanceError = DnaError::WriteFailed {
            code: 1,
            message: "disk full".into(),
        }
        .into();
        assert_eq!(err.category(), "write");
        assert_eq!(err.to_string(), "DNA write failed (1): disk full");
        assert_eq!(InstanceError::rejected("nope").category(), "editor");
    }
}
