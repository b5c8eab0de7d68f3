//! Conversions between scene data (Z-up, meters) and DNA data (Y-up, DNA
//! translation unit).
//!
//! Vector axis swaps are exact permutations so values that round trip
//! through the scene come back bit-identical.

use std::collections::BTreeMap;
use std::path::Path;

use hashbrown::HashMap;
use nalgebra::{Matrix4, Vector3};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use rig_dna::{DnaError, DnaReader};
use rig_logic::constants::SHAPE_KEY_DELTA_THRESHOLD;
use rig_logic::math::{decompose, quaternion_to_euler, vector_to_f32, z_up_to_y_up};
use rig_logic::{SceneBoneSource, SceneMesh};

use crate::error::CalibrationError;

/// Vertex groups with this prefix mark topology regions, not joints.
pub const TOPOLOGY_GROUP_PREFIX: &str = "TOPO_GROUP_";

static LOD_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)(_LOD\d)").ok());

/// LOD of a mesh named like `"ada_teeth_lod3_mesh"`, if the name carries one.
pub fn lod_index(name: &str) -> Option<u16> {
    let pattern = LOD_PATTERN.as_ref()?;
    let tag = pattern.captures(name)?.get(1)?.as_str();
    tag.chars().last()?.to_digit(10).map(|digit| digit as u16)
}

/// Rotate a scene vector -90 degrees about X.
pub fn z_up_to_y_up_vector(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, v.z, -v.y)
}

/// Rotate a DNA vector +90 degrees about X.
pub fn y_up_to_z_up_vector(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.z, v.y)
}

/// Scene position or delta to DNA space. `scale` converts meters into the
/// DNA translation unit.
pub fn scene_to_dna(position: &[f64; 3], scale: f64) -> Vector3<f64> {
    z_up_to_y_up_vector(&Vector3::from(*position)) * scale
}

pub fn dna_to_scene(position: &[f32; 3], linear_modifier: f64) -> [f64; 3] {
    let v = Vector3::new(
        position[0] as f64,
        position[1] as f64,
        position[2] as f64,
    );
    let scene = y_up_to_z_up_vector(&v) * linear_modifier;
    [scene.x, scene.y, scene.z]
}

/// Meters to the reader's translation unit.
pub fn dna_scale(reader: &dyn DnaReader) -> f64 {
    1.0 / reader.translation_unit().linear_modifier()
}

/// Vertices where `key` moved away from `basis`, as DNA deltas.
pub fn shape_key_deltas(
    basis: &[[f64; 3]],
    key: &[[f64; 3]],
    linear_modifier: f64,
) -> (Vec<u32>, Vec<[f32; 3]>) {
    let mut indices = Vec::new();
    let mut deltas = Vec::new();
    for (index, (base, moved)) in basis.iter().zip(key).enumerate() {
        let delta = z_up_to_y_up_vector(&(Vector3::from(*moved) - Vector3::from(*base)));
        if delta.norm() > SHAPE_KEY_DELTA_THRESHOLD {
            indices.push(index as u32);
            deltas.push(vector_to_f32(&(delta / linear_modifier)));
        }
    }
    (indices, deltas)
}

/// Per vertex `(joint indices, weights)` from the groups named like joints.
pub fn skin_weights<F>(
    mesh: &SceneMesh,
    joint_index: F,
    skip_zero: bool,
) -> Vec<(Vec<u16>, Vec<f32>)>
where
    F: Fn(&str) -> Option<u16>,
{
    (0..mesh.vertices.len())
        .map(|vertex| {
            let mut joints = Vec::new();
            let mut weights = Vec::new();
            let groups = mesh.vertex_weights.get(vertex).map(Vec::as_slice).unwrap_or(&[]);
            for &(group, weight) in groups {
                let Some(name) = mesh.vertex_groups.get(group) else {
                    continue;
                };
                if name.starts_with(TOPOLOGY_GROUP_PREFIX) || (skip_zero && weight <= 0.0) {
                    continue;
                }
                if let Some(joint) = joint_index(name) {
                    joints.push(joint);
                    weights.push(weight as f32);
                }
            }
            (joints, weights)
        })
        .collect()
}

/// Neutral bone transforms of a rig in DNA conventions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneTransforms {
    pub names: Vec<String>,
    /// Parent position in `names`, or the bone's own position for roots.
    pub hierarchy: Vec<u16>,
    pub is_leaf: Vec<bool>,
    /// Local translations in the DNA translation unit, Y-up.
    pub translations: Vec<Vector3<f64>>,
    /// Local Euler XYZ rotations in degrees.
    pub rotations: Vec<Vector3<f64>>,
    index: HashMap<String, usize>,
}

impl BoneTransforms {
    /// Read the rest pose of `rig`, skipping `ignored` bones. The first kept
    /// bone and any bone without a parent are expressed in DNA world space;
    /// the others relative to their parent's rest matrix.
    pub fn from_rig(rig: &dyn SceneBoneSource, ignored: &[&str], scale: f64) -> Self {
        let mut transforms = Self::default();
        let bones = rig
            .bone_names()
            .into_iter()
            .filter(|name| !ignored.contains(&name.as_str()))
            .filter_map(|name| rig.bone(&name));

        for (position, bone) in bones.enumerate() {
            let parent = bone.parent.as_deref().and_then(|p| rig.bone(p));
            let local: Matrix4<f64> = match parent {
                Some(parent) if position > 0 => match parent.rest_matrix.try_inverse() {
                    Some(inverse) => inverse * bone.rest_matrix,
                    None => {
                        log::warn!(
                            "bone '{}' has a singular parent rest matrix, using its armature transform",
                            bone.name
                        );
                        bone.rest_matrix
                    }
                },
                _ => z_up_to_y_up() * bone.rest_matrix,
            };
            let parts = decompose(&local);
            let euler = quaternion_to_euler(&parts.rotation);

            let hierarchy = bone
                .parent
                .as_deref()
                .and_then(|p| transforms.index.get(p).copied())
                .unwrap_or(position);
            transforms.hierarchy.push(hierarchy as u16);
            transforms.is_leaf.push(!bone.has_children);
            transforms.translations.push(parts.location * scale);
            transforms.rotations.push(euler.map(f64::to_degrees));
            transforms.index.insert(bone.name.clone(), position);
            transforms.names.push(bone.name);
        }
        transforms
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// `(translation, rotation)` of a bone by name.
    pub fn get(&self, name: &str) -> Option<(Vector3<f64>, Vector3<f64>)> {
        self.index_of(name)
            .map(|i| (self.translations[i], self.rotations[i]))
    }
}

/// Head vertex to body vertex pairs along the neck seam, per head LOD.
///
/// JSON form: `{ "0": { "1204": 88, ... }, "1": { ... } }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeLoopMapping(BTreeMap<u16, BTreeMap<u32, u32>>);

impl EdgeLoopMapping {
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json).map_err(DnaError::from)?)
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(DnaError::from)?;
        Self::from_json(&text)
    }

    pub fn insert(&mut self, head_lod: u16, head_vertex: u32, body_vertex: u32) {
        self.0
            .entry(head_lod)
            .or_default()
            .insert(head_vertex, body_vertex);
    }

    pub fn for_lod(&self, head_lod: u16) -> Option<&BTreeMap<u32, u32>> {
        self.0.get(&head_lod)
    }
}
