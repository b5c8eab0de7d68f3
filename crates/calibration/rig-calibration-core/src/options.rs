//! What a calibration or export run touches.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Vertex positions (calibration) or whole meshes (export).
    pub meshes: bool,
    /// Blend-shape target deltas. Head only.
    pub shape_keys: bool,
    /// Skin weights from vertex groups.
    pub vertex_groups: bool,
    /// Neutral joint translations and rotations.
    pub bones: bool,
    /// Copy shared neck vertices and bones from the body so head and body
    /// meet exactly.
    pub align_head_and_body: bool,
    pub run_validations: bool,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            meshes: true,
            shape_keys: true,
            vertex_groups: true,
            bones: true,
            align_head_and_body: false,
            run_validations: true,
        }
    }
}
