//! Rest-pose cache.
//!
//! Every bone's bind transform relative to its parent, decomposed once per
//! rig. All per-frame deltas are applied on top of these entries; the cache is
//! never mutated after it is computed.

use hashbrown::HashMap;
use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::error::RigLogicError;
use crate::math::{decompose, euler_to_quaternion, quaternion_to_euler};
use crate::scene::SceneBoneSource;

/// Rotation channel a bone is driven through.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RotationMode {
    Quaternion,
    EulerXyz,
}

/// How rest rotations are stored.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RestRotationPolicy {
    /// Quaternion for quaternion-driven bones, Euler otherwise (head rigs).
    #[default]
    FollowMode,
    /// Euler for every bone (body rigs).
    AlwaysEuler,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RestRotation {
    Euler(Vector3<f64>),
    Quaternion(UnitQuaternion<f64>),
}

impl RestRotation {
    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        match self {
            RestRotation::Euler(euler) => euler_to_quaternion(euler),
            RestRotation::Quaternion(q) => *q,
        }
    }

    pub fn to_euler(&self) -> Vector3<f64> {
        match self {
            RestRotation::Euler(euler) => *euler,
            RestRotation::Quaternion(q) => quaternion_to_euler(q),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RestPoseEntry {
    pub location: Vector3<f64>,
    pub rotation: RestRotation,
    pub scale: Vector3<f64>,
    pub mode: RotationMode,
    pub rest_to_parent: Matrix4<f64>,
    pub rest_to_parent_inverse: Matrix4<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct RestPoseCache {
    entries: HashMap<String, RestPoseEntry>,
}

impl RestPoseCache {
    pub fn get(&self, bone: &str) -> Option<&RestPoseEntry> {
        self.entries.get(bone)
    }

    pub fn contains(&self, bone: &str) -> bool {
        self.entries.contains_key(bone)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RestPoseEntry)> {
        self.entries.iter()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RestPoseReport {
    pub cache: RestPoseCache,
    /// Bones skipped because a matrix could not be inverted.
    pub failures: Vec<RigLogicError>,
}

/// Parent-space bind matrix of `bone`, or `None` when the parent rest matrix
/// is not invertible.
fn rest_to_parent(bones: &dyn SceneBoneSource, bone: &str) -> Option<Matrix4<f64>> {
    let scene_bone = bones.bone(bone)?;
    match scene_bone.parent.as_deref().and_then(|p| bones.bone(p)) {
        Some(parent) => parent
            .rest_matrix
            .try_inverse()
            .map(|inv| inv * scene_bone.rest_matrix),
        None => Some(scene_bone.rest_matrix),
    }
}

pub fn compute_rest_pose(
    bones: &dyn SceneBoneSource,
    mode_of: impl Fn(&str) -> RotationMode,
    policy: RestRotationPolicy,
) -> RestPoseReport {
    let mut report = RestPoseReport::default();
    for name in bones.bone_names() {
        let matrix = rest_to_parent(bones, &name);
        let Some((matrix, inverse)) = matrix.and_then(|m| m.try_inverse().map(|inv| (m, inv)))
        else {
            log::error!("Error getting rest pose for bone '{name}': matrix cannot be inverted");
            report
                .failures
                .push(RigLogicError::DegenerateBone { bone: name });
            continue;
        };

        let parts = decompose(&matrix);
        let mode = mode_of(&name);
        let rotation = match (mode, policy) {
            (RotationMode::Quaternion, RestRotationPolicy::FollowMode) => {
                RestRotation::Quaternion(parts.rotation)
            }
            _ => RestRotation::Euler(quaternion_to_euler(&parts.rotation)),
        };
        report.cache.entries.insert(
            name,
            RestPoseEntry {
                location: parts.location,
                rotation,
                scale: parts.scale,
                mode,
                rest_to_parent: matrix,
                rest_to_parent_inverse: inverse,
            },
        );
    }
    report
}
