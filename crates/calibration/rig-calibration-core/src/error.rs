//! Error types for calibration and export.

use rig_dna::DnaError;
use rig_instance::Component;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CalibrationError {
    /// A mesh with shape keys has no `Basis` key to measure deltas against.
    #[error("Mesh '{mesh}' has shape keys but no Basis shape key")]
    MissingBasisShape { mesh: String },

    /// `write()` finished but the writer status reports a failure.
    #[error("Error saving DNA: {message}")]
    WriteFailed { message: String },

    /// The instance has no DNA bound for the component.
    #[error("No {component:?} DNA is bound to rig instance '{instance}'")]
    MissingDna {
        instance: String,
        component: Component,
    },

    #[error(transparent)]
    Dna(#[from] DnaError),
}

impl CalibrationError {
    /// Get error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingBasisShape { .. } => "shape_keys",
            Self::WriteFailed { .. } => "write",
            Self::MissingDna { .. } => "instance",
            Self::Dna(err) => err.category(),
        }
    }

    /// Map a failed writer status onto [`CalibrationError::WriteFailed`].
    pub(crate) fn from_status(err: DnaError) -> Self {
        match err {
            DnaError::WriteFailed { message, .. } => Self::WriteFailed { message },
            other => Self::Dna(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_status_becomes_write_error() {
        let err = CalibrationError::from_status(DnaError::WriteFailed {
            code: 3,
            message: "disk full".into(),
        });
        assert_eq!(
            err,
            CalibrationError::WriteFailed {
                message: "disk full".into()
            }
        );
        assert_eq!(err.to_string(), "Error saving DNA: disk full");
        assert_eq!(err.category(), "write");
    }
}
