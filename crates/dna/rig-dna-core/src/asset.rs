//! Serde data model of a DNA asset.
//!
//! The asset is split into the same layers the accessor copies with
//! [`DataLayer`](crate::DataLayer): descriptor, definition, behavior, geometry,
//! RBF behavior and twist/swing behavior. Layers this crate does not know
//! about are kept verbatim in [`DnaAsset::unknown`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rbf::{RbfBehavior, TwistSwingBehavior};
use crate::units::{CoordinateSystem, RotationUnit, TranslationUnit};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnaAsset {
    pub descriptor: Descriptor,
    pub definition: Definition,
    pub behavior: Behavior,
    pub geometry: Geometry,
    pub rbf: RbfBehavior,
    pub twist_swing: TwistSwingBehavior,
    /// Opaque layers carried through `set_from(.., Preserve)`.
    pub unknown: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub name: String,
    pub archetype: String,
    pub gender: String,
    pub age: u16,
    pub db_name: String,
    pub db_max_lod: u16,
    pub db_complexity: String,
    pub translation_unit: TranslationUnit,
    pub rotation_unit: RotationUnit,
    pub coordinate_system: CoordinateSystem,
    pub lod_count: u16,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            archetype: String::new(),
            gender: String::new(),
            age: 0,
            db_name: String::new(),
            db_max_lod: 0,
            db_complexity: String::new(),
            translation_unit: TranslationUnit::Cm,
            rotation_unit: RotationUnit::Degrees,
            coordinate_system: CoordinateSystem::default(),
            lod_count: 1,
        }
    }
}

/// Per-LOD index lists. `lods[lod]` picks the row of `indices` used by that LOD,
/// so several LODs can share one list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodMapping {
    pub lods: Vec<u16>,
    pub indices: Vec<Vec<u16>>,
}

impl LodMapping {
    pub fn indices_for_lod(&self, lod: u16) -> &[u16] {
        self.lods
            .get(lod as usize)
            .and_then(|row| self.indices.get(*row as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_lod_mapping(&mut self, lod: u16, index: u16) {
        grow(&mut self.lods, lod as usize);
        self.lods[lod as usize] = index;
    }

    pub fn set_indices(&mut self, index: u16, values: Vec<u16>) {
        grow(&mut self.indices, index as usize);
        self.indices[index as usize] = values;
    }

    pub fn clear(&mut self) {
        self.lods.clear();
        self.indices.clear();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Definition {
    pub gui_control_names: Vec<String>,
    pub raw_control_names: Vec<String>,
    pub joint_names: Vec<String>,
    /// Parent joint index per joint; the root joint points at itself.
    pub joint_hierarchy: Vec<u16>,
    /// Neutral (bind) translations in asset units, parent space.
    pub neutral_joint_translations: Vec<[f32; 3]>,
    /// Neutral (bind) Euler XYZ rotations in asset units, parent space.
    pub neutral_joint_rotations: Vec<[f32; 3]>,
    pub blend_shape_channel_names: Vec<String>,
    pub animated_map_names: Vec<String>,
    pub mesh_names: Vec<String>,
    pub lod_joint_mapping: LodMapping,
    pub lod_blend_shape_mapping: LodMapping,
    pub lod_animated_map_mapping: LodMapping,
    pub lod_mesh_mapping: LodMapping,
}

/// Layout of evaluated joint outputs: 9 attributes per joint for Euler rigs,
/// 10 for quaternion rigs (`[tx, ty, tz, qx, qy, qz, qw, sx, sy, sz]`).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RotationRepresentation {
    #[default]
    EulerAngles,
    Quaternion,
}

impl RotationRepresentation {
    pub fn attributes_per_joint(self) -> usize {
        match self {
            RotationRepresentation::EulerAngles => 9,
            RotationRepresentation::Quaternion => 10,
        }
    }
}

/// Piecewise-linear mapping: each row adds `slope * x + cut` to
/// `outputs[output]` when `from <= x <= to` for `x = inputs[input]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalTable {
    pub input_indices: Vec<u16>,
    pub output_indices: Vec<u16>,
    pub from_values: Vec<f32>,
    pub to_values: Vec<f32>,
    pub slope_values: Vec<f32>,
    pub cut_values: Vec<f32>,
}

impl ConditionalTable {
    pub fn len(&self) -> usize {
        self.input_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_indices.is_empty()
    }
}

/// Pose-space deformation products. Entries sharing a row multiply into the
/// raw-control slot `rows[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsdMatrix {
    pub count: u16,
    pub rows: Vec<u16>,
    pub columns: Vec<u16>,
    pub values: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointGroup {
    /// Number of rows evaluated per LOD; rows are ordered by importance.
    pub lods: Vec<u16>,
    pub input_indices: Vec<u16>,
    /// Euler joint attribute indices (`joint * 9 + attribute`), rotations in degrees.
    pub output_indices: Vec<u16>,
    /// Row-major `output_indices.len() x input_indices.len()` matrix.
    pub values: Vec<f32>,
    pub joint_indices: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointBehavior {
    pub row_count: u16,
    pub column_count: u16,
    pub groups: Vec<JointGroup>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendShapeBehavior {
    pub lods: Vec<u16>,
    pub input_indices: Vec<u16>,
    pub output_indices: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedMapBehavior {
    pub lods: Vec<u16>,
    pub conditionals: ConditionalTable,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavior {
    pub rotation_representation: RotationRepresentation,
    pub gui_to_raw: ConditionalTable,
    pub psds: PsdMatrix,
    pub joints: JointBehavior,
    pub blend_shapes: BlendShapeBehavior,
    pub animated_maps: AnimatedMapBehavior,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VertexLayout {
    pub position: u32,
    pub texture_coordinate: u32,
    pub normal: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinWeights {
    pub weights: Vec<f32>,
    pub joint_indices: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendShapeTarget {
    pub channel_index: u16,
    pub vertex_indices: Vec<u32>,
    /// Y-up deltas in asset units.
    pub deltas: Vec<[f32; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mesh {
    /// Y-up positions in asset units.
    pub positions: Vec<[f32; 3]>,
    pub texture_coordinates: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub layouts: Vec<VertexLayout>,
    /// Faces as lists of layout indices.
    pub faces: Vec<Vec<u32>>,
    pub maximum_influence_per_vertex: u16,
    pub skin_weights: Vec<SkinWeights>,
    pub blend_shape_targets: Vec<BlendShapeTarget>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub meshes: Vec<Mesh>,
}

/// Resize `values` so `index` is addressable.
pub(crate) fn grow<T: Default>(values: &mut Vec<T>, index: usize) {
    if values.len() <= index {
        values.resize_with(index + 1, T::default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lod_mapping_shares_rows_between_lods() {
        let mut mapping = LodMapping::default();
        mapping.set_indices(0, vec![0, 1, 2]);
        mapping.set_indices(1, vec![0]);
        mapping.set_lod_mapping(0, 0);
        mapping.set_lod_mapping(1, 1);
        mapping.set_lod_mapping(2, 1);

        assert_eq!(mapping.indices_for_lod(0), &[0, 1, 2]);
        assert_eq!(mapping.indices_for_lod(2), &[0]);
        assert!(mapping.indices_for_lod(7).is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let asset: DnaAsset = serde_json::from_str(
            r#"{ "definition": { "joint_names": ["root"], "joint_hierarchy": [0] } }"#,
        )
        .unwrap();
        assert_eq!(asset.descriptor.lod_count, 1);
        assert_eq!(asset.definition.joint_names, vec!["root".to_string()]);
        assert_eq!(
            asset.behavior.rotation_representation.attributes_per_joint(),
            9
        );
    }
}
