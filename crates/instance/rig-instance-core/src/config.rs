//! Per-instance evaluation settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Feature toggles of one rig instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigInstanceConfig {
    /// Master switch for listener driven evaluation.
    pub auto_evaluate: bool,
    /// Per-component listener switches. Explicit calls to
    /// `RigInstance::evaluate` ignore the `auto_evaluate*` flags.
    pub auto_evaluate_head: bool,
    pub auto_evaluate_body: bool,
    pub evaluate_bones: bool,
    pub evaluate_shape_keys: bool,
    pub evaluate_texture_masks: bool,
    /// Read driver bones into raw controls. When off, raw controls stay at
    /// the identity rotation.
    pub evaluate_rbfs: bool,
    /// Head LOD. The body follows the paired body LOD.
    pub active_lod: u16,
    pub align_head_and_body: bool,
    /// Return the body rig to its rest pose when the active RBF pose changes.
    pub reset_rbf_pose_on_change: bool,
    pub backups: BackupConfig,
}

impl Default for RigInstanceConfig {
    fn default() -> Self {
        Self {
            auto_evaluate: true,
            auto_evaluate_head: true,
            auto_evaluate_body: true,
            evaluate_bones: true,
            evaluate_shape_keys: true,
            evaluate_texture_masks: true,
            evaluate_rbfs: true,
            active_lod: 0,
            align_head_and_body: false,
            reset_rbf_pose_on_change: true,
            backups: BackupConfig::default(),
        }
    }
}

/// Automatic DNA backups around commits, calibration and export. Only
/// file-backed DNA is backed up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Older backups beyond this count are deleted.
    pub max_backups: usize,
    /// Defaults to `rig_dna_backups` in the system temp directory.
    pub root: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 5,
            root: None,
        }
    }
}

/// Scene object names an instance is bound to, used to route scene
/// updates. Actions are keyed by the armature they are assigned to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigBindings {
    pub head_rig: Option<String>,
    pub body_rig: Option<String>,
    pub face_board: Option<String>,
    pub control_rig: Option<String>,
    pub face_board_action: Option<String>,
    pub body_rig_action: Option<String>,
    pub control_rig_action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: RigInstanceConfig =
            serde_json::from_str(r#"{ "evaluate_rbfs": false, "active_lod": 2 }"#).unwrap();
        assert!(!config.evaluate_rbfs);
        assert_eq!(config.active_lod, 2);
        assert!(config.auto_evaluate_body);
        assert!(!config.align_head_and_body);
        assert!(config.reset_rbf_pose_on_change);
        assert_eq!(config.backups, BackupConfig::default());

        let config: RigInstanceConfig =
            serde_json::from_str(r#"{ "backups": { "max_backups": 2 } }"#).unwrap();
        assert!(config.backups.enabled);
        assert_eq!(config.backups.max_backups, 2);
    }
}
