//! Editable RBF solver model in scene units.
//!
//! DNA records store translations in centimeters and rotations as `[x, y, z, w]`
//! quaternions. The model keeps scene units (translation / 100) and Euler
//! radians for driven bones so edits compare directly against pose bones.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use rig_dna::{
    DnaReader, RbfDistanceMethod, RbfDrivenRecord, RbfDriverRecord, RbfFunctionType,
    RbfNormalizeMethod, RbfPoseRecord, RbfSolverMode, RbfSolverRecord, TwistAxis,
};

use crate::constants::{DEFAULT_POSE_NAME, SCALE_FACTOR};
use crate::math::{
    euler_to_quaternion, quaternion_from_xyzw, quaternion_to_euler, quaternion_to_xyzw,
    vector_from_f32, vector_to_f32,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfDriver {
    pub bone_name: String,
    pub joint_index: i32,
    pub quaternion_rotation: UnitQuaternion<f64>,
    pub euler_rotation: Vector3<f64>,
}

impl RbfDriver {
    pub fn identity(bone_name: impl Into<String>, joint_index: i32) -> Self {
        Self {
            bone_name: bone_name.into(),
            joint_index,
            quaternion_rotation: UnitQuaternion::identity(),
            euler_rotation: Vector3::zeros(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DrivenDataType {
    #[default]
    Bone,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfDriven {
    pub bone_name: String,
    pub joint_index: i32,
    pub data_type: DrivenDataType,
    /// Translation delta from the rest pose, scene units.
    pub location: Vector3<f64>,
    /// Euler XYZ rotation in radians.
    pub euler_rotation: Vector3<f64>,
    /// Scale delta per axis; a component equal to the pose scale factor means "no delta".
    pub scale: Vector3<f64>,
    pub location_edited: bool,
    pub rotation_edited: bool,
    pub scale_edited: bool,
}

impl RbfDriven {
    pub fn new(bone_name: impl Into<String>, joint_index: i32, scale_factor: f64) -> Self {
        Self {
            bone_name: bone_name.into(),
            joint_index,
            data_type: DrivenDataType::Bone,
            location: Vector3::zeros(),
            euler_rotation: Vector3::zeros(),
            scale: Vector3::repeat(scale_factor),
            location_edited: false,
            rotation_edited: false,
            scale_edited: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfPose {
    pub name: String,
    pub pose_index: i32,
    pub scale_factor: f64,
    pub target_enable: bool,
    pub joint_group_index: i32,
    pub drivers: Vec<RbfDriver>,
    pub driven: Vec<RbfDriven>,
}

impl RbfPose {
    pub fn new(name: impl Into<String>, pose_index: i32) -> Self {
        Self {
            name: name.into(),
            pose_index,
            scale_factor: 1.0,
            target_enable: true,
            joint_group_index: -1,
            drivers: Vec::new(),
            driven: Vec::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_POSE_NAME
    }

    /// Orientation of the first driver, identity when the pose has none.
    pub fn driver_rotation(&self) -> UnitQuaternion<f64> {
        self.drivers
            .first()
            .map(|d| d.quaternion_rotation)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    pub fn driven_bone(&self, name: &str) -> Option<&RbfDriven> {
        self.driven.iter().find(|d| d.bone_name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfSolver {
    pub name: String,
    pub solver_index: i32,
    pub mode: RbfSolverMode,
    pub distance_method: RbfDistanceMethod,
    pub normalize_method: RbfNormalizeMethod,
    pub function_type: RbfFunctionType,
    pub twist_axis: TwistAxis,
    pub radius: f64,
    pub weight_threshold: f64,
    pub automatic_radius: bool,
    /// Raw control slots of the driver quaternion, `[x, y, z, w]`.
    pub raw_control_indices: Vec<u16>,
    pub poses: Vec<RbfPose>,
}

impl RbfSolver {
    pub fn new(name: impl Into<String>, solver_index: i32) -> Self {
        let record = RbfSolverRecord::default();
        Self {
            name: name.into(),
            solver_index,
            mode: record.mode,
            distance_method: record.distance_method,
            normalize_method: record.normalize_method,
            function_type: record.function_type,
            twist_axis: record.twist_axis,
            radius: record.radius as f64,
            weight_threshold: record.weight_threshold as f64,
            automatic_radius: record.automatic_radius,
            raw_control_indices: Vec::new(),
            poses: Vec::new(),
        }
    }

    pub fn pose(&self, name: &str) -> Option<&RbfPose> {
        self.poses.iter().find(|p| p.name == name)
    }

    pub fn pose_mut(&mut self, name: &str) -> Option<&mut RbfPose> {
        self.poses.iter_mut().find(|p| p.name == name)
    }

    pub fn default_pose(&self) -> Option<&RbfPose> {
        self.poses.iter().find(|p| p.is_default())
    }

    /// Name of the driver bone, taken from the first pose that has a driver.
    pub fn driver_bone(&self) -> Option<&str> {
        self.poses
            .iter()
            .find_map(|p| p.drivers.first())
            .map(|d| d.bone_name.as_str())
    }
}

fn joint_name(reader: &dyn DnaReader, index: u16) -> String {
    reader.joint_name(index).unwrap_or_default().to_string()
}

fn driver_from_record(reader: &dyn DnaReader, record: &RbfDriverRecord) -> RbfDriver {
    let rotation = quaternion_from_xyzw(record.quaternion);
    RbfDriver {
        bone_name: joint_name(reader, record.joint_index),
        joint_index: record.joint_index as i32,
        quaternion_rotation: rotation,
        euler_rotation: quaternion_to_euler(&rotation),
    }
}

fn driven_from_record(reader: &dyn DnaReader, record: &RbfDrivenRecord) -> RbfDriven {
    RbfDriven {
        bone_name: joint_name(reader, record.joint_index),
        joint_index: record.joint_index as i32,
        data_type: DrivenDataType::Bone,
        location: vector_from_f32(record.translation) / SCALE_FACTOR,
        euler_rotation: quaternion_to_euler(&quaternion_from_xyzw(record.rotation)),
        scale: vector_from_f32(record.scale),
        location_edited: false,
        rotation_edited: false,
        scale_edited: false,
    }
}

/// Build the editable solver list from the asset.
pub fn solvers_from_reader(reader: &dyn DnaReader) -> Vec<RbfSolver> {
    (0..reader.rbf_solver_count())
        .filter_map(|index| reader.rbf_solver(index).map(|record| (index, record)))
        .map(|(index, record)| {
            let poses = record
                .pose_indices
                .iter()
                .filter_map(|&pose_index| {
                    let pose = reader.rbf_pose(pose_index)?;
                    Some(RbfPose {
                        name: pose.name.clone(),
                        pose_index: pose_index as i32,
                        scale_factor: pose.scale_factor as f64,
                        target_enable: pose.target_enable,
                        joint_group_index: pose.joint_group_index,
                        drivers: pose
                            .drivers
                            .iter()
                            .map(|d| driver_from_record(reader, d))
                            .collect(),
                        driven: pose
                            .driven
                            .iter()
                            .map(|d| driven_from_record(reader, d))
                            .collect(),
                    })
                })
                .collect();
            RbfSolver {
                name: record.name.clone(),
                solver_index: index as i32,
                mode: record.mode,
                distance_method: record.distance_method,
                normalize_method: record.normalize_method,
                function_type: record.function_type,
                twist_axis: record.twist_axis,
                radius: record.radius as f64,
                weight_threshold: record.weight_threshold as f64,
                automatic_radius: record.automatic_radius,
                raw_control_indices: record.raw_control_indices.clone(),
                poses,
            }
        })
        .collect()
}

/// Flatten solvers back into DNA records. Solvers are ordered by
/// `solver_index` and poses are renumbered densely in that order.
pub fn solvers_to_records(solvers: &[RbfSolver]) -> (Vec<RbfSolverRecord>, Vec<RbfPoseRecord>) {
    let mut ordered: Vec<&RbfSolver> = solvers.iter().collect();
    ordered.sort_by_key(|s| s.solver_index);

    let mut solver_records = Vec::with_capacity(ordered.len());
    let mut pose_records = Vec::new();
    for solver in ordered {
        let mut pose_indices = Vec::with_capacity(solver.poses.len());
        for pose in &solver.poses {
            pose_indices.push(pose_records.len() as u16);
            pose_records.push(RbfPoseRecord {
                name: pose.name.clone(),
                scale_factor: pose.scale_factor as f32,
                target_enable: pose.target_enable,
                joint_group_index: pose.joint_group_index,
                drivers: pose
                    .drivers
                    .iter()
                    .filter(|d| d.joint_index >= 0)
                    .map(|d| RbfDriverRecord {
                        joint_index: d.joint_index as u16,
                        quaternion: quaternion_to_xyzw(&d.quaternion_rotation),
                    })
                    .collect(),
                driven: pose
                    .driven
                    .iter()
                    .filter(|d| d.joint_index >= 0)
                    .map(|d| RbfDrivenRecord {
                        joint_index: d.joint_index as u16,
                        translation: vector_to_f32(&(d.location * SCALE_FACTOR)),
                        rotation: quaternion_to_xyzw(&euler_to_quaternion(&d.euler_rotation)),
                        scale: vector_to_f32(&d.scale),
                    })
                    .collect(),
            });
        }
        solver_records.push(RbfSolverRecord {
            name: solver.name.clone(),
            raw_control_indices: solver.raw_control_indices.clone(),
            pose_indices,
            mode: solver.mode,
            distance_method: solver.distance_method,
            normalize_method: solver.normalize_method,
            function_type: solver.function_type,
            twist_axis: solver.twist_axis,
            radius: solver.radius as f32,
            weight_threshold: solver.weight_threshold as f32,
            automatic_radius: solver.automatic_radius,
        });
    }
    (solver_records, pose_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rig_dna::MemoryReader;

    fn reader() -> MemoryReader {
        MemoryReader::from_json_str(
            r#"{
                "definition": { "joint_names": ["root", "upperarm_l", "upperarm_twist_01_l"],
                                "joint_hierarchy": [0, 0, 1] },
                "rbf": {
                    "solvers": [{ "name": "upperarm_l_UERBFSolver", "pose_indices": [0, 1],
                                  "raw_control_indices": [0, 1, 2, 3] }],
                    "poses": [
                        { "name": "default", "drivers": [{ "joint_index": 1, "quaternion": [0, 0, 0, 1] }] },
                        { "name": "upperarm_l_up",
                          "drivers": [{ "joint_index": 1, "quaternion": [0.3826834, 0, 0, 0.9238795] }],
                          "driven": [{ "joint_index": 2, "translation": [1.5, 0, 0],
                                       "rotation": [0, 0, 0, 1], "scale": [1, 1, 1] }] }
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn reader_records_become_scene_unit_solvers() {
        let solvers = solvers_from_reader(&reader());
        assert_eq!(solvers.len(), 1);
        let solver = &solvers[0];
        assert_eq!(solver.driver_bone(), Some("upperarm_l"));
        let up = solver.pose("upperarm_l_up").unwrap();
        assert_eq!(up.driven[0].bone_name, "upperarm_twist_01_l");
        assert_relative_eq!(up.driven[0].location.x, 0.015, epsilon = 1e-9);
        assert_relative_eq!(up.drivers[0].euler_rotation.x, 45f64.to_radians(), epsilon = 1e-6);
        assert!(solver.default_pose().is_some());
    }

    #[test]
    fn records_survive_a_model_round_trip() {
        let source = reader();
        let (solvers, poses) = solvers_to_records(&solvers_from_reader(&source));
        assert_eq!(solvers[0].pose_indices, vec![0, 1]);
        assert_eq!(poses[1].driven[0].translation[0], 1.5);
        let q = poses[1].drivers[0].quaternion;
        assert_relative_eq!(q[0], 0.3826834, epsilon = 1e-6);
        assert_relative_eq!(q[3], 0.9238795, epsilon = 1e-6);
    }
}
