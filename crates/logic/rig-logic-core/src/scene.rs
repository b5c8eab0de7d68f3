//! Host scene interfaces.
//!
//! Evaluation and calibration only see the scene through these traits, so a
//! host adapter decides how names resolve to bones, meshes and mask sliders.
//! [`MemoryArmature`] and [`MemoryScene`] are in-memory adapters used by
//! tests and headless tools.
//!
//! Conventions:
//! * `rest_matrix` is the armature-space bind matrix of a bone.
//! * `pose_matrix` is the evaluated *world* matrix (armature matrix applied,
//!   constraints included).
//! * `location` is the translation of the local pose basis (GUI slider value).

use hashbrown::HashMap;
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use rig_dna::DnaReader;

use crate::constants::SCALE_FACTOR;
use crate::math::{decompose, euler_to_quaternion, loc_rot_scale, vector_from_f32, y_up_to_z_up};

#[derive(Clone, Debug, PartialEq)]
pub struct SceneBone {
    pub name: String,
    pub parent: Option<String>,
    pub rest_matrix: Matrix4<f64>,
    pub pose_matrix: Matrix4<f64>,
    pub location: Vector3<f64>,
    pub has_children: bool,
}

pub trait SceneBoneSource {
    fn armature_matrix(&self) -> Matrix4<f64> {
        Matrix4::identity()
    }

    /// Bone names, parents before children.
    fn bone_names(&self) -> Vec<String>;

    fn bone(&self, name: &str) -> Option<SceneBone>;

    fn has_bone(&self, name: &str) -> bool {
        self.bone(name).is_some()
    }

    /// Influence of the CHILD_OF constraint on `bone`, if it has one.
    fn constraint_influence(&self, _bone: &str) -> Option<f64> {
        None
    }
}

pub trait SceneBoneSink {
    /// Set the local pose basis. Returns false when the bone does not exist.
    fn set_bone_basis(&mut self, name: &str, basis: Matrix4<f64>) -> bool;

    /// Overwrite the Euler rotation channel of the pose basis.
    fn set_bone_rotation_euler(&mut self, name: &str, euler: Vector3<f64>) -> bool;

    fn set_constraint_influence(&mut self, bone: &str, value: f64) -> bool;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneShapeKey {
    pub name: String,
    /// Object-space positions, one per mesh vertex.
    pub positions: Vec<[f64; 3]>,
    pub value: f64,
}

/// Name of the reference shape key every other key is relative to.
pub const BASIS_SHAPE_KEY: &str = "Basis";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMesh {
    pub name: String,
    /// Object-space vertex positions (Z-up, scene units).
    pub vertices: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    /// Faces as vertex index lists.
    pub faces: Vec<Vec<u32>>,
    /// UVs per face corner, in face order. `None` when the mesh has no UV layer.
    pub uvs: Option<Vec<[f64; 2]>>,
    pub vertex_groups: Vec<String>,
    /// Per vertex `(group index, weight)` pairs.
    pub vertex_weights: Vec<Vec<(usize, f64)>>,
    pub shape_keys: Vec<SceneShapeKey>,
    /// Object origin in world space.
    pub location: [f64; 3],
}

impl SceneMesh {
    pub fn basis(&self) -> Option<&SceneShapeKey> {
        self.shape_key(BASIS_SHAPE_KEY)
    }

    pub fn shape_key(&self, name: &str) -> Option<&SceneShapeKey> {
        self.shape_keys.iter().find(|key| key.name == name)
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.as_ref().is_some_and(|uvs| !uvs.is_empty())
    }
}

pub trait SceneMeshSource {
    fn mesh_names(&self) -> Vec<String>;
    fn mesh(&self, name: &str) -> Option<SceneMesh>;

    fn has_shape_key(&self, mesh: &str, key: &str) -> bool {
        self.mesh(mesh).is_some_and(|m| m.shape_key(key).is_some())
    }
}

pub trait SceneOutputSink {
    /// Returns false when the shape key does not exist.
    fn set_shape_key_value(&mut self, mesh: &str, key: &str, value: f64) -> bool;
    /// Returns false when the mask slider does not exist.
    fn set_mask_value(&mut self, slider: &str, value: f64) -> bool;
}

// ---------------------------------------------------------------------------
// In-memory armature
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct MemoryBone {
    name: String,
    parent: Option<usize>,
    rest_matrix: Matrix4<f64>,
    basis: Matrix4<f64>,
    /// Pose matrix forced by a constraint, in armature space.
    constrained: Option<Matrix4<f64>>,
    constraint_influence: Option<f64>,
}

/// Armature with forward kinematics
/// `pose = parent_pose * parent_rest^-1 * rest * basis`.
#[derive(Clone, Debug)]
pub struct MemoryArmature {
    matrix_world: Matrix4<f64>,
    bones: Vec<MemoryBone>,
    index: HashMap<String, usize>,
}

impl Default for MemoryArmature {
    fn default() -> Self {
        Self {
            matrix_world: Matrix4::identity(),
            bones: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl MemoryArmature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix_world(mut self, matrix: Matrix4<f64>) -> Self {
        self.matrix_world = matrix;
        self
    }

    /// Add a bone. The parent must already exist; unknown parents make a root.
    pub fn add_bone(&mut self, name: &str, parent: Option<&str>, rest_matrix: Matrix4<f64>) -> &mut Self {
        let parent = parent.and_then(|p| self.index.get(p).copied());
        self.index.insert(name.to_string(), self.bones.len());
        self.bones.push(MemoryBone {
            name: name.to_string(),
            parent,
            rest_matrix,
            basis: Matrix4::identity(),
            constrained: None,
            constraint_influence: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn basis(&self, name: &str) -> Option<Matrix4<f64>> {
        self.index.get(name).map(|&i| self.bones[i].basis)
    }

    /// Set the basis translation (how GUI controls are moved).
    pub fn set_location(&mut self, name: &str, location: Vector3<f64>) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                let basis = &mut self.bones[i].basis;
                basis[(0, 3)] = location.x;
                basis[(1, 3)] = location.y;
                basis[(2, 3)] = location.z;
                true
            }
            None => false,
        }
    }

    pub fn set_rest_matrix(&mut self, name: &str, rest: Matrix4<f64>) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.bones[i].rest_matrix = rest;
                true
            }
            None => false,
        }
    }

    /// Force the armature-space pose of a bone, as an external constraint would.
    pub fn constrain_pose(&mut self, name: &str, pose: Matrix4<f64>) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.bones[i].constrained = Some(pose);
                true
            }
            None => false,
        }
    }

    /// Give a bone a CHILD_OF constraint with the given influence.
    pub fn add_child_of_constraint(&mut self, name: &str, influence: f64) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.bones[i].constraint_influence = Some(influence);
                true
            }
            None => false,
        }
    }

    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.basis = Matrix4::identity();
            bone.constrained = None;
        }
    }

    fn armature_pose(&self, index: usize) -> Matrix4<f64> {
        let bone = &self.bones[index];
        if let Some(pose) = bone.constrained {
            return pose;
        }
        match bone.parent {
            Some(parent) => {
                let parent_bone = &self.bones[parent];
                let parent_rest_inv = parent_bone
                    .rest_matrix
                    .try_inverse()
                    .unwrap_or_else(Matrix4::identity);
                self.armature_pose(parent) * parent_rest_inv * bone.rest_matrix * bone.basis
            }
            None => bone.rest_matrix * bone.basis,
        }
    }
}

impl SceneBoneSource for MemoryArmature {
    fn armature_matrix(&self) -> Matrix4<f64> {
        self.matrix_world
    }

    fn bone_names(&self) -> Vec<String> {
        self.bones.iter().map(|b| b.name.clone()).collect()
    }

    fn bone(&self, name: &str) -> Option<SceneBone> {
        let &i = self.index.get(name)?;
        let bone = &self.bones[i];
        Some(SceneBone {
            name: bone.name.clone(),
            parent: bone.parent.map(|p| self.bones[p].name.clone()),
            rest_matrix: bone.rest_matrix,
            pose_matrix: self.matrix_world * self.armature_pose(i),
            location: Vector3::new(bone.basis[(0, 3)], bone.basis[(1, 3)], bone.basis[(2, 3)]),
            has_children: self.bones.iter().any(|b| b.parent == Some(i)),
        })
    }

    fn has_bone(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn constraint_influence(&self, bone: &str) -> Option<f64> {
        self.index
            .get(bone)
            .and_then(|&i| self.bones[i].constraint_influence)
    }
}

impl SceneBoneSink for MemoryArmature {
    fn set_bone_basis(&mut self, name: &str, basis: Matrix4<f64>) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.bones[i].basis = basis;
                true
            }
            None => false,
        }
    }

    fn set_bone_rotation_euler(&mut self, name: &str, euler: Vector3<f64>) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                let parts = decompose(&self.bones[i].basis);
                self.bones[i].basis =
                    loc_rot_scale(&parts.location, &euler_to_quaternion(&euler), &parts.scale);
                true
            }
            None => false,
        }
    }

    fn set_constraint_influence(&mut self, bone: &str, value: f64) -> bool {
        match self.index.get(bone) {
            Some(&i) if self.bones[i].constraint_influence.is_some() => {
                self.bones[i].constraint_influence = Some(value);
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory meshes and outputs
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct MemoryScene {
    meshes: Vec<SceneMesh>,
    masks: HashMap<String, f64>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: SceneMesh) -> &mut Self {
        self.meshes.retain(|m| m.name != mesh.name);
        self.meshes.push(mesh);
        self
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut SceneMesh> {
        self.meshes.iter_mut().find(|m| m.name == name)
    }

    pub fn add_mask_slider(&mut self, slider: &str) -> &mut Self {
        self.masks.insert(slider.to_string(), 0.0);
        self
    }

    pub fn mask_value(&self, slider: &str) -> Option<f64> {
        self.masks.get(slider).copied()
    }

    pub fn shape_key_value(&self, mesh: &str, key: &str) -> Option<f64> {
        self.meshes
            .iter()
            .find(|m| m.name == mesh)?
            .shape_key(key)
            .map(|k| k.value)
    }
}

impl SceneMeshSource for MemoryScene {
    fn mesh_names(&self) -> Vec<String> {
        self.meshes.iter().map(|m| m.name.clone()).collect()
    }

    fn mesh(&self, name: &str) -> Option<SceneMesh> {
        self.meshes.iter().find(|m| m.name == name).cloned()
    }

    fn has_shape_key(&self, mesh: &str, key: &str) -> bool {
        self.meshes
            .iter()
            .any(|m| m.name == mesh && m.shape_key(key).is_some())
    }
}

impl SceneOutputSink for MemoryScene {
    fn set_shape_key_value(&mut self, mesh: &str, key: &str, value: f64) -> bool {
        let Some(mesh) = self.mesh_mut(mesh) else {
            return false;
        };
        match mesh.shape_keys.iter_mut().find(|k| k.name == key) {
            Some(shape_key) => {
                shape_key.value = value;
                true
            }
            None => false,
        }
    }

    fn set_mask_value(&mut self, slider: &str, value: f64) -> bool {
        match self.masks.get_mut(slider) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Local bind transform of one DNA joint in scene units.
pub fn neutral_local_matrix(reader: &dyn DnaReader, joint: u16) -> Matrix4<f64> {
    let translation = reader
        .neutral_joint_translation(joint)
        .map(vector_from_f32)
        .unwrap_or_else(Vector3::zeros)
        / SCALE_FACTOR;
    let rotation = reader
        .neutral_joint_rotation(joint)
        .map(vector_from_f32)
        .unwrap_or_else(Vector3::zeros)
        .map(f64::to_radians);
    loc_rot_scale(
        &translation,
        &euler_to_quaternion(&rotation),
        &Vector3::repeat(1.0),
    )
}

/// Build an armature in its bind pose from the DNA neutral joints.
/// Root joints are converted from Y-up to Z-up.
pub fn neutral_bind_pose(reader: &dyn DnaReader) -> MemoryArmature {
    let count = reader.joint_count() as usize;
    let mut world: Vec<Option<Matrix4<f64>>> = vec![None; count];

    fn resolve(
        reader: &dyn DnaReader,
        joint: usize,
        world: &mut [Option<Matrix4<f64>>],
        depth: usize,
    ) -> Matrix4<f64> {
        if let Some(m) = world[joint] {
            return m;
        }
        let local = neutral_local_matrix(reader, joint as u16);
        let matrix = match reader.joint_parent_index(joint as u16) {
            Some(parent) if (parent as usize) < world.len() && depth < world.len() => {
                resolve(reader, parent as usize, world, depth + 1) * local
            }
            _ => y_up_to_z_up() * local,
        };
        world[joint] = Some(matrix);
        matrix
    }

    let mut armature = MemoryArmature::new();
    let mut added = vec![false; count];
    // Parents are added before children so `add_bone` can link them.
    fn add(
        reader: &dyn DnaReader,
        joint: usize,
        world: &mut [Option<Matrix4<f64>>],
        added: &mut [bool],
        armature: &mut MemoryArmature,
        depth: usize,
    ) {
        if added[joint] || depth > added.len() {
            return;
        }
        let parent = reader.joint_parent_index(joint as u16);
        if let Some(p) = parent.filter(|&p| (p as usize) < added.len()) {
            add(reader, p as usize, world, added, armature, depth + 1);
        }
        let matrix = resolve(reader, joint, world, 0);
        let name = reader.joint_name(joint as u16).unwrap_or_default().to_string();
        let parent_name = parent.and_then(|p| reader.joint_name(p));
        armature.add_bone(&name, parent_name, matrix);
        added[joint] = true;
    }

    for joint in 0..count {
        add(reader, joint, &mut world, &mut added, &mut armature, 0);
    }
    armature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{rotation_x, translation};
    use approx::assert_relative_eq;
    use rig_dna::MemoryReader;

    fn chain() -> MemoryArmature {
        let mut arm = MemoryArmature::new();
        arm.add_bone("root", None, Matrix4::identity());
        arm.add_bone(
            "child",
            Some("root"),
            Matrix4::new_translation(&Vector3::new(0.0, 1.0, 0.0)),
        );
        arm
    }

    #[test]
    fn forward_kinematics_follow_parent_basis() {
        let mut arm = chain();
        arm.set_bone_basis("root", rotation_x(std::f64::consts::FRAC_PI_2));
        let child = arm.bone("child").unwrap();
        assert_relative_eq!(
            translation(&child.pose_matrix),
            Vector3::new(0.0, 0.0, 1.0),
            epsilon = 1e-12
        );
        assert_eq!(child.parent.as_deref(), Some("root"));
        assert!(arm.bone("root").unwrap().has_children);
    }

    #[test]
    fn pose_matrix_includes_world_matrix() {
        let mut arm = chain();
        arm = arm.with_matrix_world(Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)));
        let child = arm.bone("child").unwrap();
        assert_relative_eq!(translation(&child.pose_matrix).x, 5.0);
    }

    #[test]
    fn output_sink_reports_missing_targets() {
        let mut scene = MemoryScene::new();
        scene.add_mesh(SceneMesh {
            name: "ada_head_lod0_mesh".into(),
            shape_keys: vec![SceneShapeKey {
                name: "head_lod0_mesh__jaw_open".into(),
                ..SceneShapeKey::default()
            }],
            ..SceneMesh::default()
        });
        scene.add_mask_slider("head_wm1.jawOpen_msk");

        assert!(scene.set_shape_key_value("ada_head_lod0_mesh", "head_lod0_mesh__jaw_open", 0.7));
        assert!(!scene.set_shape_key_value("ada_head_lod0_mesh", "missing", 0.7));
        assert!(scene.set_mask_value("head_wm1.jawOpen_msk", 0.2));
        assert!(!scene.set_mask_value("other_msk", 0.2));
        assert_eq!(
            scene.shape_key_value("ada_head_lod0_mesh", "head_lod0_mesh__jaw_open"),
            Some(0.7)
        );
    }

    #[test]
    fn bind_pose_scales_and_rotates_root_to_z_up() {
        let reader = MemoryReader::from_json_str(
            r#"{ "definition": {
                "joint_names": ["root", "spine"],
                "joint_hierarchy": [0, 0],
                "neutral_joint_translations": [[0, 0, 0], [0, 100, 0]],
                "neutral_joint_rotations": [[0, 0, 0], [0, 0, 0]]
            } }"#,
        )
        .unwrap();
        let arm = neutral_bind_pose(&reader);
        let spine = arm.bone("spine").unwrap();
        assert_relative_eq!(
            translation(&spine.rest_matrix),
            Vector3::new(0.0, 0.0, 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(spine.pose_matrix, spine.rest_matrix, epsilon = 1e-12);
    }
}
