//! Read side of the DNA accessor.
//!
//! [`DnaReader`] exposes indexed getters over a [`DnaAsset`]. Out-of-range
//! indices yield `None` or an empty slice, never a panic. [`MemoryReader`] is
//! the reference implementation backed by a deserialized asset.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::asset::{Behavior, DnaAsset, SkinWeights, VertexLayout};
use crate::error::DnaError;
use crate::rbf::{RbfPoseRecord, RbfSolverRecord, SwingTwistSetup};
use crate::units::{CoordinateSystem, RotationUnit, TranslationUnit};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DnaFormat {
    Json,
    Binary,
}

impl DnaFormat {
    /// `.json` files are JSON, everything else is treated as binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DnaFormat::Json,
            _ => DnaFormat::Binary,
        }
    }
}

fn name_at(names: &[String], index: u16) -> Option<&str> {
    names.get(index as usize).map(String::as_str)
}

fn count(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

pub trait DnaReader {
    fn asset(&self) -> &DnaAsset;

    /// File the asset was read from, if any.
    fn path(&self) -> Option<&Path> {
        None
    }

    // -- descriptor ---------------------------------------------------------

    fn name(&self) -> &str {
        &self.asset().descriptor.name
    }

    fn lod_count(&self) -> u16 {
        self.asset().descriptor.lod_count
    }

    fn translation_unit(&self) -> TranslationUnit {
        self.asset().descriptor.translation_unit
    }

    fn rotation_unit(&self) -> RotationUnit {
        self.asset().descriptor.rotation_unit
    }

    fn coordinate_system(&self) -> CoordinateSystem {
        self.asset().descriptor.coordinate_system
    }

    // -- definition ---------------------------------------------------------

    fn gui_control_count(&self) -> u16 {
        count(self.asset().definition.gui_control_names.len())
    }

    fn gui_control_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.gui_control_names, index)
    }

    fn raw_control_count(&self) -> u16 {
        count(self.asset().definition.raw_control_names.len())
    }

    fn raw_control_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.raw_control_names, index)
    }

    fn joint_count(&self) -> u16 {
        count(self.asset().definition.joint_names.len())
    }

    fn joint_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.joint_names, index)
    }

    /// Parent joint, `None` for the root (which points at itself) or an invalid index.
    fn joint_parent_index(&self, index: u16) -> Option<u16> {
        let parent = *self
            .asset()
            .definition
            .joint_hierarchy
            .get(index as usize)?;
        (parent != index).then_some(parent)
    }

    fn neutral_joint_translations(&self) -> &[[f32; 3]] {
        &self.asset().definition.neutral_joint_translations
    }

    fn neutral_joint_rotations(&self) -> &[[f32; 3]] {
        &self.asset().definition.neutral_joint_rotations
    }

    fn neutral_joint_translation(&self, index: u16) -> Option<[f32; 3]> {
        self.neutral_joint_translations().get(index as usize).copied()
    }

    fn neutral_joint_rotation(&self, index: u16) -> Option<[f32; 3]> {
        self.neutral_joint_rotations().get(index as usize).copied()
    }

    fn blend_shape_channel_count(&self) -> u16 {
        count(self.asset().definition.blend_shape_channel_names.len())
    }

    fn blend_shape_channel_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.blend_shape_channel_names, index)
    }

    fn animated_map_count(&self) -> u16 {
        count(self.asset().definition.animated_map_names.len())
    }

    fn animated_map_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.animated_map_names, index)
    }

    fn mesh_count(&self) -> u16 {
        count(self.asset().definition.mesh_names.len())
    }

    fn mesh_name(&self, index: u16) -> Option<&str> {
        name_at(&self.asset().definition.mesh_names, index)
    }

    fn mesh_indices_for_lod(&self, lod: u16) -> &[u16] {
        self.asset().definition.lod_mesh_mapping.indices_for_lod(lod)
    }

    fn joint_indices_for_lod(&self, lod: u16) -> &[u16] {
        self.asset().definition.lod_joint_mapping.indices_for_lod(lod)
    }

    fn blend_shape_channel_indices_for_lod(&self, lod: u16) -> &[u16] {
        self.asset()
            .definition
            .lod_blend_shape_mapping
            .indices_for_lod(lod)
    }

    fn animated_map_indices_for_lod(&self, lod: u16) -> &[u16] {
        self.asset()
            .definition
            .lod_animated_map_mapping
            .indices_for_lod(lod)
    }

    // -- behavior -----------------------------------------------------------

    fn behavior(&self) -> &Behavior {
        &self.asset().behavior
    }

    // -- geometry -----------------------------------------------------------

    fn vertex_positions(&self, mesh: u16) -> &[[f32; 3]] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| m.positions.as_slice())
            .unwrap_or(&[])
    }

    fn vertex_normals(&self, mesh: u16) -> &[[f32; 3]] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| m.normals.as_slice())
            .unwrap_or(&[])
    }

    fn vertex_texture_coordinates(&self, mesh: u16) -> &[[f32; 2]] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| m.texture_coordinates.as_slice())
            .unwrap_or(&[])
    }

    fn vertex_layouts(&self, mesh: u16) -> &[VertexLayout] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| m.layouts.as_slice())
            .unwrap_or(&[])
    }

    fn vertex_layout_position_indices(&self, mesh: u16) -> Vec<u32> {
        self.vertex_layouts(mesh)
            .iter()
            .map(|layout| layout.position)
            .collect()
    }

    fn skin_weights(&self, mesh: u16) -> &[SkinWeights] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| m.skin_weights.as_slice())
            .unwrap_or(&[])
    }

    fn blend_shape_target_count(&self, mesh: u16) -> u16 {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .map(|m| count(m.blend_shape_targets.len()))
            .unwrap_or(0)
    }

    fn blend_shape_channel_index(&self, mesh: u16, target: u16) -> Option<u16> {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)?
            .blend_shape_targets
            .get(target as usize)
            .map(|t| t.channel_index)
    }

    fn blend_shape_target_vertex_indices(&self, mesh: u16, target: u16) -> &[u32] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .and_then(|m| m.blend_shape_targets.get(target as usize))
            .map(|t| t.vertex_indices.as_slice())
            .unwrap_or(&[])
    }

    fn blend_shape_target_deltas(&self, mesh: u16, target: u16) -> &[[f32; 3]] {
        self.asset()
            .geometry
            .meshes
            .get(mesh as usize)
            .and_then(|m| m.blend_shape_targets.get(target as usize))
            .map(|t| t.deltas.as_slice())
            .unwrap_or(&[])
    }

    // -- rbf / twist-swing --------------------------------------------------

    fn rbf_solver_count(&self) -> u16 {
        count(self.asset().rbf.solvers.len())
    }

    fn rbf_solver(&self, index: u16) -> Option<&RbfSolverRecord> {
        self.asset().rbf.solvers.get(index as usize)
    }

    fn rbf_pose_count(&self) -> u16 {
        count(self.asset().rbf.poses.len())
    }

    fn rbf_pose(&self, index: u16) -> Option<&RbfPoseRecord> {
        self.asset().rbf.poses.get(index as usize)
    }

    fn twist_count(&self) -> u16 {
        count(self.asset().twist_swing.twists.len())
    }

    fn twist(&self, index: u16) -> Option<&SwingTwistSetup> {
        self.asset().twist_swing.twists.get(index as usize)
    }

    fn twist_output_joint_indices(&self, index: u16) -> &[u16] {
        self.twist(index)
            .map(|t| t.output_joint_indices.as_slice())
            .unwrap_or(&[])
    }

    fn swing_count(&self) -> u16 {
        count(self.asset().twist_swing.swings.len())
    }

    fn swing(&self, index: u16) -> Option<&SwingTwistSetup> {
        self.asset().twist_swing.swings.get(index as usize)
    }

    fn swing_output_joint_indices(&self, index: u16) -> &[u16] {
        self.swing(index)
            .map(|s| s.output_joint_indices.as_slice())
            .unwrap_or(&[])
    }
}

/// Reader over an owned, fully deserialized asset.
#[derive(Clone, Debug, Default)]
pub struct MemoryReader {
    asset: DnaAsset,
    path: Option<PathBuf>,
}

impl MemoryReader {
    pub fn new(asset: DnaAsset) -> Self {
        Self { asset, path: None }
    }

    pub fn from_json_str(json: &str) -> Result<Self, DnaError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn into_asset(self) -> DnaAsset {
        self.asset
    }
}

impl DnaReader for MemoryReader {
    fn asset(&self) -> &DnaAsset {
        &self.asset
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Open a DNA file. A missing file is reported as [`DnaError::FileNotFound`].
pub fn open_reader(path: &Path, format: DnaFormat) -> Result<MemoryReader, DnaError> {
    if !path.exists() {
        return Err(DnaError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let bytes = fs::read(path)?;
    let asset: DnaAsset = match format {
        DnaFormat::Json => serde_json::from_slice(&bytes)?,
        DnaFormat::Binary => bincode::deserialize(&bytes)?,
    };
    log::debug!(
        "opened DNA '{}' ({} joints, {} meshes)",
        path.display(),
        asset.definition.joint_names.len(),
        asset.definition.mesh_names.len()
    );
    Ok(MemoryReader {
        asset,
        path: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> MemoryReader {
        MemoryReader::from_json_str(
            r#"{
                "definition": {
                    "joint_names": ["spine_04", "neck_01", "head"],
                    "joint_hierarchy": [0, 0, 1],
                    "raw_control_names": ["head.qx", "head.qy", "head.qz", "head.qw"],
                    "mesh_names": ["head_lod0_mesh"],
                    "lod_mesh_mapping": { "lods": [0], "indices": [[0]] }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn root_joint_has_no_parent() {
        let reader = reader();
        assert_eq!(reader.joint_parent_index(0), None);
        assert_eq!(reader.joint_parent_index(2), Some(1));
        assert_eq!(reader.joint_parent_index(9), None);
    }

    #[test]
    fn out_of_range_getters_are_empty() {
        let reader = reader();
        assert_eq!(reader.joint_name(3), None);
        assert!(reader.vertex_positions(4).is_empty());
        assert_eq!(reader.blend_shape_channel_index(0, 0), None);
        assert_eq!(reader.mesh_indices_for_lod(0), &[0]);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(DnaFormat::from_path(Path::new("a/head.json")), DnaFormat::Json);
        assert_eq!(DnaFormat::from_path(Path::new("a/head.dna")), DnaFormat::Binary);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = open_reader(Path::new("/definitely/not/here.dna"), DnaFormat::Binary)
            .unwrap_err();
        assert!(matches!(err, DnaError::FileNotFound { .. }));
    }
}
