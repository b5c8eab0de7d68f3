//! Solver, pose and driven-bone management for the editing session.
//!
//! Captured values follow the DNA conventions: driven location and scale are
//! deltas from the rest pose, driven rotation is the pose-bone Euler, and a
//! scale component equal to the pose scale factor means "no delta".

use std::collections::BTreeSet;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use rig_dna::DnaReader;
use rig_logic::constants::{BONE_DELTA_THRESHOLD, DEFAULT_POSE_NAME, RBF_SOLVER_POSTFIX};
use rig_logic::math::{decompose, euler_to_quaternion, loc_rot_scale, quaternion_to_euler};
use rig_logic::{
    calculate_swing_twist, local_basis, ControlName, DrivenDataType, RbfDriven, RbfDriver,
    RbfPose, RbfSolver, SceneBoneSource, SwingTwistBones,
};

use super::{mirrored_name, EditContext, RbfEditor};
use crate::error::InstanceError;
use crate::scene::RigArmature;

/// Explicit driven transform: location in meters, rotation as Euler XYZ
/// radians, scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivenTransform {
    pub location: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
}

impl Default for DrivenTransform {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
        }
    }
}

/// Where a new pose takes its driven bones from.
#[derive(Clone, Debug, PartialEq)]
pub enum DrivenSource {
    /// Capture these bones from the scene.
    Scene(Vec<String>),
    /// Use explicit values.
    Transforms(Vec<(String, DrivenTransform)>),
    /// Duplicate another pose of the same solver. `bones` limits or extends
    /// the copied set; bones the source lacks are captured from the scene.
    CopyFrom {
        pose: String,
        bones: Option<Vec<String>>,
    },
}

/// A bone that may be added to the active solver's joint group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableBone {
    pub name: String,
    /// DNA joint index, -1 when the bone is not a DNA joint.
    pub joint_index: i32,
    pub in_solver: bool,
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

fn joint_index_or_unset(ctx: EditContext<'_>, bone: &str) -> i32 {
    ctx.joint_index(bone).map_or(-1, i32::from)
}

/// Driver bone of a solver, derived from its name.
pub fn solver_driver_bone(solver: &RbfSolver) -> String {
    solver.name.replace(RBF_SOLVER_POSTFIX, "")
}

/// Raw controls `<bone>.qx/.qy/.qz/.qw` in x, y, z, w order; empty when any
/// of the four is missing.
pub fn driver_raw_controls(reader: &dyn DnaReader, bone: &str) -> Vec<u16> {
    let find = |axis: &str| {
        let name = format!("{bone}.q{axis}");
        (0..reader.raw_control_count()).find(|&i| reader.raw_control_name(i) == Some(name.as_str()))
    };
    ["x", "y", "z", "w"]
        .iter()
        .map(|axis| find(axis))
        .collect::<Option<Vec<u16>>>()
        .unwrap_or_default()
}

/// Swing and twist outputs fed by the raw controls of `driver`.
pub fn swing_twist_bones(reader: &dyn DnaReader, driver: &str) -> SwingTwistBones {
    let driven_by = |inputs: &[u16]| {
        inputs.iter().any(|&i| {
            reader
                .raw_control_name(i)
                .and_then(ControlName::parse)
                .is_some_and(|name| name.control == driver)
        })
    };
    let names = |joints: &[u16]| -> Vec<String> {
        joints
            .iter()
            .filter_map(|&j| reader.joint_name(j).map(str::to_string))
            .collect()
    };

    let mut bones = SwingTwistBones::default();
    if let Some(setup) = (0..reader.swing_count())
        .filter_map(|i| reader.swing(i))
        .find(|setup| driven_by(&setup.input_control_indices))
    {
        bones.swing_axis = Some(setup.axis);
        bones.swing_bone_names = names(&setup.output_joint_indices);
        bones.swing_blend_weights = setup.blend_weights.iter().map(|&w| w as f64).collect();
    }
    if let Some(setup) = (0..reader.twist_count())
        .filter_map(|i| reader.twist(i))
        .find(|setup| driven_by(&setup.input_control_indices))
    {
        bones.twist_axis = Some(setup.axis);
        bones.twist_bone_names = names(&setup.output_joint_indices);
        bones.twist_blend_weights = setup.blend_weights.iter().map(|&w| w as f64).collect();
    }
    bones
}

/// Capture a driven bone from the scene. Returns an update message when a
/// value changed (always when `new`).
pub fn set_driven_bone_data(
    ctx: EditContext<'_>,
    rig: &dyn SceneBoneSource,
    pose_name: &str,
    scale_factor: f64,
    driven: &mut RbfDriven,
    bone: &str,
    new: bool,
) -> Option<String> {
    let basis = local_basis(rig, bone)?;
    let Some(rest) = ctx.rest_pose.get(bone) else {
        log::warn!("No rest pose for driven bone '{bone}'");
        return None;
    };

    driven.bone_name = bone.to_string();
    driven.data_type = DrivenDataType::Bone;
    if let Some(joint) = ctx.joint_index(bone) {
        driven.joint_index = i32::from(joint);
    }

    let modified = decompose(&(rest.rest_to_parent * basis));
    let location = modified.location - rest.location;
    let rotation = quaternion_to_euler(&decompose(&basis).rotation);
    let scale = (modified.scale - rest.scale).map(|d| {
        if round5(d) != 0.0 {
            d
        } else {
            scale_factor
        }
    });

    let mut updates = Vec::new();
    if (rotation - driven.euler_rotation).norm() > BONE_DELTA_THRESHOLD || new {
        driven.euler_rotation = rotation;
        log::debug!(
            "Updated RBF pose \"{pose_name}\" driven bone \"{bone}\" rotation to {rotation:?}"
        );
        updates.push("rotation");
    }
    if (location - driven.location).norm() > BONE_DELTA_THRESHOLD || new {
        driven.location = location;
        log::debug!(
            "Updated RBF pose \"{pose_name}\" driven bone \"{bone}\" location to {location:?}"
        );
        updates.push("location");
    }
    let scale_changed = (scale - driven.scale).iter().all(|d| {
        let d = round5(d.abs());
        d != 0.0 && d != scale_factor
    });
    if scale_changed || new {
        driven.scale = scale;
        log::debug!("Updated RBF pose \"{pose_name}\" driven bone \"{bone}\" scale to {scale:?}");
        updates.push("scale");
    }

    (!updates.is_empty()).then(|| {
        format!(
            "Updated pose \"{pose_name}\" driven bone \"{bone}\" ({})",
            updates.join(", ")
        )
    })
}

/// Capture a driver bone rotation from the scene.
pub fn set_driver_bone_data(
    ctx: EditContext<'_>,
    rig: &dyn SceneBoneSource,
    pose_name: &str,
    driver: &mut RbfDriver,
    bone: &str,
    new: bool,
) -> Option<String> {
    let rotation = decompose(&local_basis(rig, bone)?).rotation;
    driver.bone_name = bone.to_string();
    if let Some(joint) = ctx.joint_index(bone) {
        driver.joint_index = i32::from(joint);
    }

    let delta = driver.quaternion_rotation.coords - rotation.coords;
    if delta.iter().any(|d| d.abs() > BONE_DELTA_THRESHOLD) || new {
        driver.quaternion_rotation = rotation;
        driver.euler_rotation = quaternion_to_euler(&rotation);
        log::debug!(
            "Updated RBF pose \"{pose_name}\" driver bone \"{bone}\" rotation to {:?}",
            rotation.coords
        );
        return Some(format!(
            "Updated pose \"{pose_name}\" driver bone \"{bone}\" (rotation)"
        ));
    }
    None
}

impl RbfEditor {
    fn solver_at(&self, index: Option<usize>) -> Result<usize, InstanceError> {
        let index = index.unwrap_or(self.active_solver);
        if index >= self.solvers.len() {
            return Err(InstanceError::rejected(format!("Invalid solver index: {index}")));
        }
        Ok(index)
    }

    fn next_pose_index(&self, ctx: EditContext<'_>) -> i32 {
        i32::from(ctx.reader.rbf_pose_count()).max(self.max_pose_index() + 1)
    }

    /// Driven bones of every pose in the active solver.
    pub fn solver_joint_group_bones(&self) -> BTreeSet<String> {
        self.active_solver()
            .map(|solver| {
                solver
                    .poses
                    .iter()
                    .flat_map(|pose| pose.driven.iter())
                    .filter(|driven| driven.data_type == DrivenDataType::Bone)
                    .map(|driven| driven.bone_name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recapture the active pose from the scene. Driven bones of the default
    /// pose are never captured.
    pub fn update_pose(&mut self, ctx: EditContext<'_>, rig: &dyn SceneBoneSource) -> Vec<String> {
        let Some(pose) = self.active_pose_mut() else {
            return Vec::new();
        };
        let pose_name = pose.name.clone();
        let scale_factor = pose.scale_factor;
        let mut messages = Vec::new();

        for driver in &mut pose.drivers {
            let bone = driver.bone_name.clone();
            if !rig.has_bone(&bone) {
                log::error!(
                    "Driver bone \"{bone}\" was not found in the armature when updating RBF pose \
                     \"{pose_name}\". Please ensure the bone exists or delete this pose and recreate it."
                );
                continue;
            }
            messages.extend(set_driver_bone_data(ctx, rig, &pose_name, driver, &bone, false));
        }

        if !pose.is_default() {
            for driven in &mut pose.driven {
                let bone = driven.bone_name.clone();
                if !rig.has_bone(&bone) {
                    log::warn!(
                        "Driven bone \"{bone}\" was not found in the armature when updating RBF pose \
                         \"{pose_name}\". It will be deleted from the pose when this data is committed."
                    );
                    continue;
                }
                messages.extend(set_driven_bone_data(
                    ctx,
                    rig,
                    &pose_name,
                    scale_factor,
                    driven,
                    &bone,
                    false,
                ));
            }
        }

        self.mark_edited();
        messages
    }

    /// Flag driven values that differ from the session start.
    fn mark_edited(&mut self) {
        let snapshot = self.tracker.snapshot().to_vec();
        for solver in &mut self.solvers {
            let initial = snapshot.iter().find(|s| s.name == solver.name);
            for pose in &mut solver.poses {
                let initial = initial.and_then(|s| s.pose(&pose.name));
                for driven in &mut pose.driven {
                    let Some(old) = initial.and_then(|p| p.driven_bone(&driven.bone_name)) else {
                        continue;
                    };
                    driven.location_edited =
                        (driven.location - old.location).norm() > BONE_DELTA_THRESHOLD;
                    driven.rotation_edited =
                        (driven.euler_rotation - old.euler_rotation).norm() > BONE_DELTA_THRESHOLD;
                    driven.scale_edited = (driven.scale - old.scale).norm() > BONE_DELTA_THRESHOLD;
                }
            }
        }
    }

    /// Create a solver driven by `driver_bone` with a default pose, and make
    /// it active. Returns its list index.
    pub fn add_rbf_solver(
        &mut self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
        driver_bone: &str,
        driver_rotation: Option<UnitQuaternion<f64>>,
    ) -> Result<usize, InstanceError> {
        let report = self.validate_add_rbf_solver(ctx, rig, driver_bone);
        if !report.valid {
            return Err(InstanceError::rejected(report.message));
        }

        let solver_name = format!("{driver_bone}{RBF_SOLVER_POSTFIX}");
        let solver_index =
            i32::from(ctx.reader.rbf_solver_count()).max(self.max_solver_index() + 1);
        let mut solver = RbfSolver::new(solver_name.as_str(), solver_index);
        solver.raw_control_indices = driver_raw_controls(ctx.reader, driver_bone);

        let mut default = RbfPose::new(DEFAULT_POSE_NAME, self.next_pose_index(ctx));
        let mut driver = RbfDriver::identity(driver_bone, joint_index_or_unset(ctx, driver_bone));
        if let Some(rotation) = driver_rotation {
            driver.quaternion_rotation = rotation;
            driver.euler_rotation = quaternion_to_euler(&rotation);
        }
        default.drivers.push(driver);
        solver.poses.push(default);

        self.solvers.push(solver);
        self.active_solver = self.solvers.len() - 1;
        self.active_pose = 0;
        log::info!("Created new RBF solver \"{solver_name}\" with driver bone \"{driver_bone}\".");
        Ok(self.active_solver)
    }

    /// Remove a solver (the active one by default).
    pub fn remove_rbf_solver(&mut self, index: Option<usize>) -> Result<String, InstanceError> {
        if self.solvers.is_empty() {
            return Err(InstanceError::rejected("No RBF solvers to remove."));
        }
        let index = self.solver_at(index)?;
        let removed = self.solvers.remove(index);
        self.active_solver = index.min(self.solvers.len().saturating_sub(1));
        self.active_pose = 0;
        log::info!("Removed RBF solver \"{}\".", removed.name);
        Ok(format!("Removed RBF solver \"{}\".", removed.name))
    }

    /// Add a pose to a solver (the active one by default) and make it active.
    /// Returns the new pose index.
    pub fn add_rbf_pose(
        &mut self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
        name: &str,
        solver: Option<usize>,
        source: DrivenSource,
        driver_rotation: Option<UnitQuaternion<f64>>,
    ) -> Result<i32, InstanceError> {
        if self.solvers.is_empty() {
            return Err(InstanceError::rejected("No RBF solvers available."));
        }
        let solver_index = self.solver_at(solver)?;
        let target = &self.solvers[solver_index];
        if target.pose(name).is_some() {
            return Err(InstanceError::rejected(format!(
                "A pose named '{name}' already exists in this solver."
            )));
        }

        let mut pose = RbfPose::new(name, self.next_pose_index(ctx));
        let copy_from = match &source {
            DrivenSource::CopyFrom { pose: from, .. } => {
                let from = target.pose(from).cloned().ok_or_else(|| {
                    InstanceError::rejected(format!("Pose '{from}' not found in this solver."))
                })?;
                pose.joint_group_index = from.joint_group_index;
                pose.target_enable = from.target_enable;
                pose.scale_factor = from.scale_factor;
                Some(from)
            }
            _ => None,
        };

        let driver_bone = solver_driver_bone(target);
        if !rig.has_bone(&driver_bone) {
            return Err(InstanceError::rejected(format!(
                "Driver bone '{driver_bone}' not found in armature."
            )));
        }
        let mut driver =
            RbfDriver::identity(driver_bone.as_str(), joint_index_or_unset(ctx, &driver_bone));
        match driver_rotation {
            Some(rotation) => {
                driver.quaternion_rotation = rotation;
                driver.euler_rotation = quaternion_to_euler(&rotation);
            }
            None => {
                set_driver_bone_data(ctx, rig, name, &mut driver, &driver_bone, true);
            }
        }
        pose.drivers.push(driver);

        let capture = |pose: &RbfPose, bone: &str| {
            let mut driven =
                RbfDriven::new(bone, joint_index_or_unset(ctx, bone), pose.scale_factor);
            set_driven_bone_data(
                ctx,
                rig,
                &pose.name,
                pose.scale_factor,
                &mut driven,
                bone,
                true,
            );
            driven
        };
        match source {
            DrivenSource::Scene(bones) => {
                for bone in &bones {
                    if rig.has_bone(bone) {
                        let driven = capture(&pose, bone);
                        pose.driven.push(driven);
                    } else {
                        log::warn!("Driven bone '{bone}' not found in armature; skipped.");
                    }
                }
            }
            DrivenSource::Transforms(transforms) => {
                for (bone, transform) in transforms {
                    let mut driven =
                        RbfDriven::new(bone.as_str(), joint_index_or_unset(ctx, &bone), 1.0);
                    driven.location = transform.location;
                    driven.euler_rotation = transform.rotation;
                    driven.scale = transform.scale;
                    pose.driven.push(driven);
                }
            }
            DrivenSource::CopyFrom { bones, .. } => {
                let Some(from) = copy_from.as_ref() else {
                    return Err(InstanceError::rejected("No source pose to copy from."));
                };
                let bones = bones.unwrap_or_else(|| {
                    from.driven
                        .iter()
                        .map(|d| d.bone_name.clone())
                        .filter(|bone| rig.has_bone(bone))
                        .collect()
                });
                for bone in &bones {
                    let driven = match from.driven_bone(bone) {
                        Some(source) if from.is_default() => RbfDriven {
                            data_type: source.data_type,
                            ..RbfDriven::new(bone.as_str(), source.joint_index, 1.0)
                        },
                        Some(source) => RbfDriven {
                            location_edited: false,
                            rotation_edited: false,
                            scale_edited: false,
                            ..source.clone()
                        },
                        None => capture(&pose, bone),
                    };
                    pose.driven.push(driven);
                }
            }
        }

        let solver = &mut self.solvers[solver_index];
        if copy_from.is_none() && !pose.driven.is_empty() {
            if let Some(default) = solver.poses.iter_mut().find(|p| p.is_default()) {
                default.driven = pose
                    .driven
                    .iter()
                    .map(|d| RbfDriven {
                        data_type: d.data_type,
                        ..RbfDriven::new(d.bone_name.as_str(), d.joint_index, 1.0)
                    })
                    .collect();
            }
        }

        let pose_index = pose.pose_index;
        log::info!(
            "Created new RBF pose \"{name}\" with {} driven bones.",
            pose.driven.len()
        );
        solver.poses.push(pose);
        self.active_pose = solver.poses.len() - 1;
        self.active_solver = solver_index;
        Ok(pose_index)
    }

    /// Remove the active pose. The default pose cannot be removed.
    pub fn remove_rbf_pose(&mut self) -> Result<String, InstanceError> {
        let active_pose = self.active_pose;
        let Some(solver) = self.solvers.get_mut(self.active_solver) else {
            return Err(InstanceError::rejected("No active RBF solver found."));
        };
        let Some(pose) = solver.poses.get(active_pose) else {
            return Err(InstanceError::rejected("No active pose found."));
        };
        if pose.is_default() {
            return Err(InstanceError::rejected("Cannot remove the default pose."));
        }
        let removed = solver.poses.remove(active_pose);
        self.active_pose = active_pose.min(solver.poses.len().saturating_sub(1));
        log::info!("Removed RBF pose \"{}\".", removed.name);
        Ok(format!("Removed RBF pose \"{}\".", removed.name))
    }

    /// Scene bones that can join the active solver's joint group: everything
    /// except driver, swing and twist bones. Bones already in the group come
    /// first, then by name.
    pub fn available_driven_bones(
        &self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
    ) -> Vec<AvailableBone> {
        let existing = self.solver_joint_group_bones();
        let mut bones: Vec<AvailableBone> = rig
            .bone_names()
            .into_iter()
            .filter(|name| {
                !ctx.lookups.driver_bones.contains(name)
                    && !ctx.lookups.swing_bones.contains(name)
                    && !ctx.lookups.twist_bones.contains(name)
            })
            .map(|name| AvailableBone {
                joint_index: joint_index_or_unset(ctx, &name),
                in_solver: existing.contains(&name),
                name,
            })
            .collect();
        bones.sort_by(|a, b| b.in_solver.cmp(&a.in_solver).then_with(|| a.name.cmp(&b.name)));
        bones
    }

    /// Add bones to every non-default pose of the active solver with zero
    /// deltas. With `capture_active_pose` the active pose takes their current
    /// scene transforms instead.
    pub fn add_driven_bones(
        &mut self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
        names: &[String],
        capture_active_pose: bool,
    ) -> Result<String, InstanceError> {
        if names.is_empty() {
            return Err(InstanceError::rejected("No bones specified to add."));
        }
        if self.active_solver().is_none() {
            return Err(InstanceError::rejected("No active RBF solver found."));
        }
        let existing = self.solver_joint_group_bones();
        let mut new_bones: Vec<&str> = Vec::new();
        for name in names {
            if !existing.contains(name) && !new_bones.contains(&name.as_str()) {
                new_bones.push(name);
            }
        }
        if new_bones.is_empty() {
            return Ok("All specified bones are already in the solver's joint group.".to_string());
        }

        let active_pose = self.active_pose;
        let solver = &mut self.solvers[self.active_solver];
        for (index, pose) in solver.poses.iter_mut().enumerate() {
            if pose.is_default() {
                continue;
            }
            for &bone in &new_bones {
                if pose.driven_bone(bone).is_some() {
                    continue;
                }
                let mut driven =
                    RbfDriven::new(bone, joint_index_or_unset(ctx, bone), pose.scale_factor);
                if capture_active_pose && index == active_pose && rig.has_bone(bone) {
                    set_driven_bone_data(
                        ctx,
                        rig,
                        &pose.name,
                        pose.scale_factor,
                        &mut driven,
                        bone,
                        true,
                    );
                }
                pose.driven.push(driven);
                log::debug!("Added bone '{bone}' to pose '{}'.", pose.name);
            }
        }

        log::info!("Added {} bones to solver joint group: {new_bones:?}.", new_bones.len());
        Ok(format!(
            "Added {} bones to the solver's joint group.",
            new_bones.len()
        ))
    }

    /// Remove bones from every pose of the active solver. At least one driven
    /// bone must remain.
    pub fn remove_driven_bones(&mut self, names: &[String]) -> Result<String, InstanceError> {
        if self.active_solver().is_none() {
            return Err(InstanceError::rejected("No active RBF solver found."));
        }
        let existing = self.solver_joint_group_bones();
        let remove: BTreeSet<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| existing.contains(*name))
            .collect();
        if remove.is_empty() {
            return Err(InstanceError::rejected(
                "None of the selected bones are in the solver's joint group.",
            ));
        }
        if existing.len() == remove.len() {
            return Err(InstanceError::rejected(
                "Cannot remove all driven bones. At least one driven bone must remain in the solver.",
            ));
        }

        let mut removed_entries = 0;
        for pose in &mut self.solvers[self.active_solver].poses {
            let before = pose.driven.len();
            pose.driven.retain(|d| !remove.contains(d.bone_name.as_str()));
            if !pose.is_default() {
                removed_entries += before - pose.driven.len();
            }
        }
        log::info!(
            "Removed {} bones from solver joint group: {remove:?}. Total driven entries removed \
             across all poses: {removed_entries}.",
            remove.len()
        );
        Ok(format!(
            "Removed {} bones from the solver's joint group.",
            remove.len()
        ))
    }

    fn mirrored_pose(
        &self,
        ctx: EditContext<'_>,
        source: &RbfPose,
        pose_index: i32,
        name: String,
    ) -> RbfPose {
        let bone_name = |bone: &str| {
            mirrored_name(bone, &self.patterns.bone).unwrap_or_else(|| bone.to_string())
        };
        let mut pose = RbfPose::new(name, pose_index);
        pose.joint_group_index = -1;
        pose.target_enable = source.target_enable;
        pose.scale_factor = source.scale_factor;
        pose.drivers = source
            .drivers
            .iter()
            .map(|driver| {
                let bone = bone_name(&driver.bone_name);
                RbfDriver {
                    joint_index: joint_index_or_unset(ctx, &bone),
                    bone_name: bone,
                    quaternion_rotation: driver.quaternion_rotation,
                    euler_rotation: quaternion_to_euler(&driver.quaternion_rotation),
                }
            })
            .collect();
        pose.driven = source
            .driven
            .iter()
            .map(|driven| {
                let bone = bone_name(&driven.bone_name);
                RbfDriven {
                    joint_index: joint_index_or_unset(ctx, &bone),
                    bone_name: bone,
                    data_type: driven.data_type,
                    location: -driven.location,
                    euler_rotation: driven.euler_rotation,
                    scale: driven.scale,
                    location_edited: false,
                    rotation_edited: false,
                    scale_edited: false,
                }
            })
            .collect();
        pose
    }

    /// Mirror the active solver to the opposite side and make the copy
    /// active. Returns its list index.
    pub fn mirror_solver(
        &mut self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
    ) -> Result<usize, InstanceError> {
        let report = self.validate_mirror_solver(rig);
        if !report.valid {
            return Err(InstanceError::rejected(report.message));
        }
        let source = self
            .active_solver()
            .cloned()
            .ok_or_else(|| InstanceError::rejected("No active solver found."))?;
        let name = mirrored_name(&source.name, &self.patterns.solver)
            .ok_or_else(|| InstanceError::rejected("Could not generate mirrored solver name."))?;
        let driver = mirrored_name(&solver_driver_bone(&source), &self.patterns.bone)
            .ok_or_else(|| {
                InstanceError::rejected("Could not generate mirrored driver bone name.")
            })?;

        let mut solver = RbfSolver {
            name: name.clone(),
            solver_index: self.max_solver_index() + 1,
            raw_control_indices: driver_raw_controls(ctx.reader, &driver),
            poses: Vec::new(),
            ..source.clone()
        };
        let mut pose_index = self.max_pose_index() + 1;
        for pose in &source.poses {
            let pose_name = if pose.name.eq_ignore_ascii_case(DEFAULT_POSE_NAME) {
                DEFAULT_POSE_NAME.to_string()
            } else {
                mirrored_name(&pose.name, &self.patterns.pose).unwrap_or_else(|| pose.name.clone())
            };
            solver.poses.push(self.mirrored_pose(ctx, pose, pose_index, pose_name));
            pose_index += 1;
        }

        self.solvers.push(solver);
        self.active_solver = self.solvers.len() - 1;
        self.active_pose = 0;
        log::info!("Mirrored solver \"{}\" to \"{name}\".", source.name);
        Ok(self.active_solver)
    }

    /// Mirror the active pose into the mirrored solver, which becomes active.
    /// Returns the new pose index.
    pub fn mirror_pose(&mut self, ctx: EditContext<'_>) -> Result<i32, InstanceError> {
        let report = self.validate_mirror_pose();
        if !report.valid {
            return Err(InstanceError::rejected(report.message));
        }
        let (Some(solver), Some(source)) = (self.active_solver(), self.active_pose()) else {
            return Err(InstanceError::rejected("No active solver or pose."));
        };
        let target_name = mirrored_name(&solver.name, &self.patterns.solver)
            .ok_or_else(|| InstanceError::rejected("Could not generate mirrored solver name."))?;
        let target = self
            .solvers
            .iter()
            .position(|s| s.name == target_name)
            .ok_or_else(|| {
                InstanceError::rejected(format!("Target solver \"{target_name}\" not found."))
            })?;
        let pose_name =
            mirrored_name(&source.name, &self.patterns.pose).unwrap_or_else(|| source.name.clone());
        let pose_index = self.max_pose_index() + 1;
        let pose = self.mirrored_pose(ctx, source, pose_index, pose_name.clone());
        log::info!(
            "Mirrored pose \"{}\" to \"{pose_name}\" in solver \"{target_name}\".",
            source.name
        );

        let target_solver = &mut self.solvers[target];
        target_solver.poses.push(pose);
        self.active_pose = target_solver.poses.len() - 1;
        self.active_solver = target;
        Ok(pose_index)
    }

    /// Put the body rig into the active pose. Drivers and their swing/twist
    /// outputs are set from the stored driver rotation; while editing, driven
    /// bones are set from their stored deltas. Returns `true` when the caller
    /// should evaluate the body to show the solver result instead.
    pub fn pose_scene(&self, ctx: EditContext<'_>, rig: &mut dyn RigArmature, reset: bool) -> bool {
        let Some(pose) = self.active_pose() else {
            return false;
        };
        if reset || self.editing {
            for name in rig.bone_names() {
                rig.set_bone_basis(&name, nalgebra::Matrix4::identity());
            }
        }
        if pose.is_default() {
            return false;
        }

        for driver in &pose.drivers {
            let basis = loc_rot_scale(
                &Vector3::zeros(),
                &driver.quaternion_rotation,
                &Vector3::repeat(1.0),
            );
            if !rig.set_bone_basis(&driver.bone_name, basis) {
                continue;
            }
            let bones = swing_twist_bones(ctx.reader, &driver.bone_name);
            let (swings, twists) = calculate_swing_twist(&driver.quaternion_rotation, &bones);
            for (bone, euler) in swings.iter().chain(twists.iter()) {
                rig.set_bone_rotation_euler(bone, *euler);
            }
        }

        if !self.editing {
            return true;
        }

        for driven in &pose.driven {
            if driven.data_type != DrivenDataType::Bone {
                continue;
            }
            let Some(rest) = ctx.rest_pose.get(&driven.bone_name) else {
                continue;
            };
            let location = rest.location + driven.location;
            let rotation = rest.rotation.to_euler() + driven.euler_rotation;
            let scale_delta = driven.scale.map(|s| {
                if round5(s) != round5(pose.scale_factor) {
                    s
                } else {
                    0.0
                }
            });
            let matrix = loc_rot_scale(
                &location,
                &euler_to_quaternion(&rotation),
                &(rest.scale + scale_delta),
            );
            if rig.set_bone_basis(&driven.bone_name, rest.rest_to_parent_inverse * matrix) {
                rig.set_bone_rotation_euler(&driven.bone_name, driven.euler_rotation);
            }
        }
        false
    }
}
