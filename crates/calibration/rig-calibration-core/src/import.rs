//! Building scene meshes and shape keys from DNA.
//!
//! Shape keys are imported through a [`WorkQueue`] so a host can spread
//! thousands of targets over several frames.

use nalgebra::Vector3;

use rig_dna::DnaReader;
use rig_logic::scene::BASIS_SHAPE_KEY;
use rig_logic::{scene_mesh_name, shape_key_name, SceneMesh, SceneShapeKey};

use crate::queue::{WorkItem, WorkQueue};
use crate::transforms::{dna_to_scene, y_up_to_z_up_vector};

/// Scene mesh of DNA mesh `mesh_index`, named `"<instance>_<mesh>"`, with
/// one vertex group per joint and no shape keys.
pub fn scene_mesh_from_dna(
    reader: &dyn DnaReader,
    instance: &str,
    mesh_index: u16,
) -> Option<SceneMesh> {
    let dna_name = reader.mesh_name(mesh_index)?;
    let data = reader.asset().geometry.meshes.get(mesh_index as usize)?;
    let modifier = reader.translation_unit().linear_modifier();

    let vertices = reader
        .vertex_positions(mesh_index)
        .iter()
        .map(|p| dna_to_scene(p, modifier))
        .collect();
    let normals = reader
        .vertex_normals(mesh_index)
        .iter()
        .map(|n| {
            let v = Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64);
            let v = y_up_to_z_up_vector(&v);
            [v.x, v.y, v.z]
        })
        .collect();

    let layouts = reader.vertex_layouts(mesh_index);
    let coordinates = reader.vertex_texture_coordinates(mesh_index);
    let mut faces = Vec::with_capacity(data.faces.len());
    let mut uvs = Vec::new();
    for face in &data.faces {
        let mut corners = Vec::with_capacity(face.len());
        for &layout in face {
            let Some(layout) = layouts.get(layout as usize) else {
                log::warn!("mesh '{dna_name}' references missing vertex layout {layout}");
                continue;
            };
            corners.push(layout.position);
            let uv = coordinates
                .get(layout.texture_coordinate as usize)
                .copied()
                .unwrap_or_default();
            uvs.push([uv[0] as f64, uv[1] as f64]);
        }
        faces.push(corners);
    }

    let vertex_groups = (0..reader.joint_count())
        .map(|joint| reader.joint_name(joint).unwrap_or_default().to_string())
        .collect();
    let vertex_weights = reader
        .skin_weights(mesh_index)
        .iter()
        .map(|skin| {
            skin.joint_indices
                .iter()
                .zip(&skin.weights)
                .map(|(&joint, &weight)| (joint as usize, weight as f64))
                .collect()
        })
        .collect();

    Some(SceneMesh {
        name: scene_mesh_name(instance, dna_name),
        vertices,
        normals,
        faces,
        uvs: (!coordinates.is_empty()).then_some(uvs),
        vertex_groups,
        vertex_weights,
        shape_keys: Vec::new(),
        location: [0.0; 3],
    })
}

/// One step of a shape-key import.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeKeyImport {
    /// Drop existing keys and add the `Basis` key.
    InitializeBasis { mesh_index: u16, mesh: String },
    /// Add the key of one blend-shape target.
    CreateKey {
        mesh_index: u16,
        target: u16,
        /// Number of targets on the mesh.
        count: u16,
        mesh: String,
        key: String,
    },
}

impl WorkItem for ShapeKeyImport {
    fn description(&self) -> String {
        match self {
            Self::InitializeBasis { .. } => "Initializing basis shape...".to_string(),
            Self::CreateKey {
                target, count, key, ..
            } => format!("{target}/{count} {key} ..."),
        }
    }
}

impl ShapeKeyImport {
    /// Scene mesh the item writes to.
    pub fn mesh(&self) -> &str {
        match self {
            Self::InitializeBasis { mesh, .. } | Self::CreateKey { mesh, .. } => mesh,
        }
    }

    /// Apply the step to `mesh`. With `neutral` set, keys are created
    /// without their deltas.
    pub fn apply(&self, reader: &dyn DnaReader, mesh: &mut SceneMesh, neutral: bool) {
        match self {
            Self::InitializeBasis { .. } => {
                let basis = basis_key(mesh);
                mesh.shape_keys.clear();
                mesh.shape_keys.push(basis);
            }
            Self::CreateKey {
                mesh_index,
                target,
                key,
                ..
            } => {
                if mesh.shape_keys.is_empty() {
                    let basis = basis_key(mesh);
                    mesh.shape_keys.push(basis);
                }
                for shape_key in &mut mesh.shape_keys {
                    shape_key.value = 0.0;
                }
                mesh.shape_keys.retain(|shape_key| shape_key.name != *key);

                let mut positions = mesh
                    .basis()
                    .map(|basis| basis.positions.clone())
                    .unwrap_or_else(|| mesh.vertices.clone());
                if !neutral {
                    let modifier = reader.translation_unit().linear_modifier();
                    let indices = reader.blend_shape_target_vertex_indices(*mesh_index, *target);
                    let deltas = reader.blend_shape_target_deltas(*mesh_index, *target);
                    for (&vertex, delta) in indices.iter().zip(deltas) {
                        let Some(position) = positions.get_mut(vertex as usize) else {
                            continue;
                        };
                        let offset = dna_to_scene(delta, modifier);
                        for (value, step) in position.iter_mut().zip(offset) {
                            *value += step;
                        }
                    }
                }
                log::trace!("created shape key {key}");
                mesh.shape_keys.push(SceneShapeKey {
                    name: key.clone(),
                    positions,
                    value: 0.0,
                });
            }
        }
    }
}

fn basis_key(mesh: &SceneMesh) -> SceneShapeKey {
    SceneShapeKey {
        name: BASIS_SHAPE_KEY.to_string(),
        positions: mesh.vertices.clone(),
        value: 0.0,
    }
}

/// Queue that builds every blend-shape target of `reader` as a shape key:
/// per mesh with targets, a basis step followed by one step per target.
pub fn shape_key_import_items(
    reader: &dyn DnaReader,
    instance: &str,
) -> WorkQueue<ShapeKeyImport> {
    let mut queue = WorkQueue::default();
    for mesh_index in 0..reader.mesh_count() {
        let count = reader.blend_shape_target_count(mesh_index);
        let Some(dna_mesh) = reader.mesh_name(mesh_index) else {
            continue;
        };
        if count == 0 {
            continue;
        }
        let mesh = scene_mesh_name(instance, dna_mesh);
        queue.push(ShapeKeyImport::InitializeBasis {
            mesh_index,
            mesh: mesh.clone(),
        });
        for target in 0..count {
            let Some(channel) = reader
                .blend_shape_channel_index(mesh_index, target)
                .and_then(|channel| reader.blend_shape_channel_name(channel))
            else {
                log::warn!("target {target} of mesh '{dna_mesh}' has no channel name");
                continue;
            };
            queue.push(ShapeKeyImport::CreateKey {
                mesh_index,
                target,
                count,
                mesh: mesh.clone(),
                key: shape_key_name(dna_mesh, channel),
            });
        }
    }
    queue
}
