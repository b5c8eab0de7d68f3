//! Write side of the DNA accessor.
//!
//! Writers own a copy of the asset. Setters mutate that copy; `write()` flushes
//! it and records the outcome in a [`Status`] the caller must inspect, because
//! a partially written asset is corrupt.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::asset::{grow, BlendShapeTarget, DnaAsset, Mesh, VertexLayout};
use crate::error::DnaError;
use crate::layers::{DataLayer, UnknownLayerPolicy};
use crate::rbf::{RbfPoseRecord, RbfSolverRecord};
use crate::reader::{DnaFormat, DnaReader, MemoryReader};

/// Outcome of the last `write()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Zero means success.
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Convert a failed status into an error.
    pub fn check(&self) -> Result<(), DnaError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(DnaError::WriteFailed {
                code: self.code,
                message: self.message.clone(),
            })
        }
    }
}

fn mesh_mut(asset: &mut DnaAsset, mesh: u16) -> &mut Mesh {
    grow(&mut asset.geometry.meshes, mesh as usize);
    &mut asset.geometry.meshes[mesh as usize]
}

fn target_mut(asset: &mut DnaAsset, mesh: u16, target: u16) -> &mut BlendShapeTarget {
    let mesh = mesh_mut(asset, mesh);
    grow(&mut mesh.blend_shape_targets, target as usize);
    &mut mesh.blend_shape_targets[target as usize]
}

pub trait DnaWriter {
    fn asset(&self) -> &DnaAsset;
    fn asset_mut(&mut self) -> &mut DnaAsset;

    /// Flush the asset. Check [`DnaWriter::status`] afterwards.
    fn write(&mut self);
    fn status(&self) -> &Status;

    /// Copy the selected layers from `source`.
    fn set_from(&mut self, source: &dyn DnaReader, layer: DataLayer, policy: UnknownLayerPolicy) {
        self.asset_mut().copy_layers(source.asset(), layer, policy);
    }

    // -- descriptor / definition ---------------------------------------------

    fn set_lod_count(&mut self, lod_count: u16) {
        self.asset_mut().descriptor.lod_count = lod_count;
    }

    fn set_joint_name(&mut self, index: u16, name: &str) {
        let names = &mut self.asset_mut().definition.joint_names;
        grow(names, index as usize);
        names[index as usize] = name.to_string();
    }

    fn clear_joint_names(&mut self) {
        self.asset_mut().definition.joint_names.clear();
    }

    fn set_joint_hierarchy(&mut self, hierarchy: Vec<u16>) {
        self.asset_mut().definition.joint_hierarchy = hierarchy;
    }

    fn set_neutral_joint_translations(&mut self, translations: Vec<[f32; 3]>) {
        self.asset_mut().definition.neutral_joint_translations = translations;
    }

    fn set_neutral_joint_rotations(&mut self, rotations: Vec<[f32; 3]>) {
        self.asset_mut().definition.neutral_joint_rotations = rotations;
    }

    fn set_joint_indices(&mut self, index: u16, joint_indices: Vec<u16>) {
        self.asset_mut()
            .definition
            .lod_joint_mapping
            .set_indices(index, joint_indices);
    }

    fn clear_joint_indices(&mut self) {
        self.asset_mut().definition.lod_joint_mapping.indices.clear();
    }

    fn set_lod_joint_mapping(&mut self, lod: u16, index: u16) {
        self.asset_mut()
            .definition
            .lod_joint_mapping
            .set_lod_mapping(lod, index);
    }

    fn clear_lod_joint_mappings(&mut self) {
        self.asset_mut().definition.lod_joint_mapping.lods.clear();
    }

    fn set_mesh_name(&mut self, index: u16, name: &str) {
        let names = &mut self.asset_mut().definition.mesh_names;
        grow(names, index as usize);
        names[index as usize] = name.to_string();
    }

    fn clear_mesh_names(&mut self) {
        self.asset_mut().definition.mesh_names.clear();
    }

    fn set_mesh_indices(&mut self, index: u16, mesh_indices: Vec<u16>) {
        self.asset_mut()
            .definition
            .lod_mesh_mapping
            .set_indices(index, mesh_indices);
    }

    fn clear_mesh_indices(&mut self) {
        self.asset_mut().definition.lod_mesh_mapping.indices.clear();
    }

    fn set_lod_mesh_mapping(&mut self, lod: u16, index: u16) {
        self.asset_mut()
            .definition
            .lod_mesh_mapping
            .set_lod_mapping(lod, index);
    }

    fn clear_lod_mesh_mappings(&mut self) {
        self.asset_mut().definition.lod_mesh_mapping.lods.clear();
    }

    // -- geometry -------------------------------------------------------------

    fn clear_meshes(&mut self) {
        self.asset_mut().geometry.meshes.clear();
    }

    fn set_vertex_positions(&mut self, mesh: u16, positions: Vec<[f32; 3]>) {
        mesh_mut(self.asset_mut(), mesh).positions = positions;
    }

    fn set_vertex_normals(&mut self, mesh: u16, normals: Vec<[f32; 3]>) {
        mesh_mut(self.asset_mut(), mesh).normals = normals;
    }

    fn set_vertex_texture_coordinates(&mut self, mesh: u16, uvs: Vec<[f32; 2]>) {
        mesh_mut(self.asset_mut(), mesh).texture_coordinates = uvs;
    }

    fn set_vertex_layouts(&mut self, mesh: u16, layouts: Vec<VertexLayout>) {
        mesh_mut(self.asset_mut(), mesh).layouts = layouts;
    }

    fn set_face_vertex_layout_indices(&mut self, mesh: u16, face: u32, layout_indices: Vec<u32>) {
        let faces = &mut mesh_mut(self.asset_mut(), mesh).faces;
        grow(faces, face as usize);
        faces[face as usize] = layout_indices;
    }

    fn clear_face_vertex_layout_indices(&mut self, mesh: u16) {
        mesh_mut(self.asset_mut(), mesh).faces.clear();
    }

    fn clear_skin_weights(&mut self, mesh: u16) {
        mesh_mut(self.asset_mut(), mesh).skin_weights.clear();
    }

    fn set_skin_weights_values(&mut self, mesh: u16, vertex: u32, weights: Vec<f32>) {
        let skin = &mut mesh_mut(self.asset_mut(), mesh).skin_weights;
        grow(skin, vertex as usize);
        skin[vertex as usize].weights = weights;
    }

    fn set_skin_weights_joint_indices(&mut self, mesh: u16, vertex: u32, joint_indices: Vec<u16>) {
        let mesh = mesh_mut(self.asset_mut(), mesh);
        grow(&mut mesh.skin_weights, vertex as usize);
        let influences = joint_indices.len() as u16;
        mesh.skin_weights[vertex as usize].joint_indices = joint_indices;
        mesh.maximum_influence_per_vertex = mesh.maximum_influence_per_vertex.max(influences);
    }

    fn clear_blend_shape_targets(&mut self, mesh: u16) {
        mesh_mut(self.asset_mut(), mesh).blend_shape_targets.clear();
    }

    fn set_blend_shape_channel_index(&mut self, mesh: u16, target: u16, channel: u16) {
        target_mut(self.asset_mut(), mesh, target).channel_index = channel;
    }

    fn set_blend_shape_target_vertex_indices(
        &mut self,
        mesh: u16,
        target: u16,
        vertex_indices: Vec<u32>,
    ) {
        target_mut(self.asset_mut(), mesh, target).vertex_indices = vertex_indices;
    }

    fn set_blend_shape_target_deltas(&mut self, mesh: u16, target: u16, deltas: Vec<[f32; 3]>) {
        target_mut(self.asset_mut(), mesh, target).deltas = deltas;
    }

    // -- rbf ------------------------------------------------------------------

    fn set_rbf_solvers(&mut self, solvers: Vec<RbfSolverRecord>) {
        self.asset_mut().rbf.solvers = solvers;
    }

    fn set_rbf_poses(&mut self, poses: Vec<RbfPoseRecord>) {
        self.asset_mut().rbf.poses = poses;
    }
}

fn encode(asset: &DnaAsset, format: DnaFormat) -> Result<Vec<u8>, DnaError> {
    Ok(match format {
        DnaFormat::Json => serde_json::to_vec_pretty(asset)?,
        DnaFormat::Binary => bincode::serialize(asset)?,
    })
}

/// Writer persisting to a file on `write()`.
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    format: DnaFormat,
    asset: DnaAsset,
    status: Status,
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>, format: DnaFormat) -> Self {
        Self {
            path: path.into(),
            format,
            asset: DnaAsset::default(),
            status: Status::ok(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DnaWriter for FileWriter {
    fn asset(&self) -> &DnaAsset {
        &self.asset
    }

    fn asset_mut(&mut self) -> &mut DnaAsset {
        &mut self.asset
    }

    fn write(&mut self) {
        self.status = match encode(&self.asset, self.format)
            .and_then(|bytes| fs::write(&self.path, bytes).map_err(DnaError::from))
        {
            Ok(()) => {
                log::info!("wrote DNA '{}'", self.path.display());
                Status::ok()
            }
            Err(DnaError::Serialization { reason }) => Status::failed(2, reason),
            Err(err) => Status::failed(1, err.to_string()),
        };
    }

    fn status(&self) -> &Status {
        &self.status
    }
}

/// In-memory writer. `write()` snapshots the asset; a failure message can be
/// injected to exercise the fatal write path.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    asset: DnaAsset,
    written: Option<DnaAsset>,
    fail_with: Option<String>,
    status: Status,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write()` fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn written(&self) -> Option<&DnaAsset> {
        self.written.as_ref()
    }

    /// Reader over the last successfully written asset.
    pub fn written_reader(&self) -> Option<MemoryReader> {
        self.written.clone().map(MemoryReader::new)
    }
}

impl DnaWriter for MemoryWriter {
    fn asset(&self) -> &DnaAsset {
        &self.asset
    }

    fn asset_mut(&mut self) -> &mut DnaAsset {
        &mut self.asset
    }

    fn write(&mut self) {
        self.status = match &self.fail_with {
            Some(message) => Status::failed(1, message.clone()),
            None => {
                self.written = Some(self.asset.clone());
                Status::ok()
            }
        };
    }

    fn status(&self) -> &Status {
        &self.status
    }
}
