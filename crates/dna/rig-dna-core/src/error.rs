//! Error types for the DNA accessor.

/// Failures raised while opening, reading, or persisting a DNA asset.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DnaError {
    /// The DNA file does not exist on disk.
    #[error("DNA file not found: {path}")]
    FileNotFound { path: String },

    /// IO error while reading or writing a DNA file.
    #[error("IO error: {reason}")]
    Io { reason: String },

    /// The asset could not be encoded or decoded.
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// The file extension does not map to a known DNA format.
    #[error("Unsupported DNA format: {path}")]
    UnsupportedFormat { path: String },

    /// An indexed accessor was called with an index past the end of its table.
    #[error("{kind} index {index} is out of range (count: {count})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// `write()` reported a failure through the writer status.
    #[error("DNA write failed ({code}): {message}")]
    WriteFailed { code: i32, message: String },
}

impl DnaError {
    /// Get error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } | Self::Io { .. } => "io",
            Self::Serialization { .. } | Self::UnsupportedFormat { .. } => "format",
            Self::IndexOutOfRange { .. } => "data",
            Self::WriteFailed { .. } => "write",
        }
    }
}

impl From<std::io::Error> for DnaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DnaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for DnaError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_group_related_failures() {
        let missing = DnaError::FileNotFound {
            path: "head.dna".into(),
        };
        assert_eq!(missing.category(), "io");

        let oob = DnaError::IndexOutOfRange {
            kind: "joint",
            index: 4,
            count: 2,
        };
        assert_eq!(oob.category(), "data");
        assert_eq!(oob.to_string(), "joint index 4 is out of range (count: 2)");
    }

    #[test]
    fn io_errors_convert() {
        let err: DnaError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, DnaError::Io { .. }));
    }
}
