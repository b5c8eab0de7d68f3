//! User-facing validation results.
//!
//! Validation failures are returned, not raised, so batch operations can
//! collect every problem before presenting them.

use serde::{Deserialize, Serialize};

/// A fix the host may offer to apply when a validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoFix {
    /// Rename these meshes to their LOD 0 names.
    RenameToLod0 { meshes: Vec<String> },
    /// Unwrap UVs on these meshes.
    UnwrapUvs { meshes: Vec<String> },
    /// Move these mesh origins onto the rig origin.
    MatchRigOrigin { meshes: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<AutoFix>,
}

impl ValidationReport {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            valid: true,
            title: title.into(),
            message: message.into(),
            fix: None,
        }
    }

    pub fn failure(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            title: title.into(),
            message: message.into(),
            fix: None,
        }
    }

    pub fn with_fix(mut self, fix: AutoFix) -> Self {
        self.fix = Some(fix);
        self
    }

    /// Plain validity check with an empty title, used by editor guards.
    pub fn ok() -> Self {
        Self::success("", "")
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::failure("", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_serializes_with_kind_tag() {
        let report = ValidationReport::failure("Missing UVs", "head_lod0_mesh").with_fix(
            AutoFix::UnwrapUvs {
                meshes: vec!["head_lod0_mesh".into()],
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fix"]["kind"], "unwrap_uvs");
        assert_eq!(json["valid"], false);
    }
}
