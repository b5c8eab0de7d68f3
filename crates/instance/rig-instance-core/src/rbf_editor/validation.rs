//! Guards for structural edits and for committing a session.

use rig_logic::constants::{BONE_DELTA_THRESHOLD, DEFAULT_POSE_NAME, RBF_SOLVER_POSTFIX};
use rig_logic::math::rotation_difference;
use rig_logic::{SceneBoneSource, ValidationReport};

use super::ops::solver_driver_bone;
use super::{mirrored_name, EditContext, RbfEditor};

impl RbfEditor {
    /// Every driver bone must have a distinct rotation in each pose of the
    /// active solver.
    pub fn validate_no_duplicate_driver_bone_values(&self) -> ValidationReport {
        let Some(solver) = self.active_solver() else {
            return ValidationReport::invalid("No active RBF solver found.");
        };
        if solver.poses.is_empty() {
            return ValidationReport::invalid("No poses found in the active RBF solver.");
        }

        let drivers: Vec<(&str, &str, _)> = solver
            .poses
            .iter()
            .flat_map(|pose| {
                pose.drivers
                    .iter()
                    .map(move |d| (pose.name.as_str(), d.bone_name.as_str(), d.quaternion_rotation))
            })
            .collect();
        for (i, (pose_a, driver_a, rotation_a)) in drivers.iter().enumerate() {
            for (pose_b, driver_b, rotation_b) in drivers.iter().skip(i + 1) {
                if driver_a == driver_b
                    && rotation_difference(rotation_a, rotation_b) < BONE_DELTA_THRESHOLD
                {
                    return ValidationReport::invalid(format!(
                        "Poses '{pose_a}' and '{pose_b}' have a driver bone '{driver_a}' with the \
                         same rotation values. Driver bone rotations must be unique across all \
                         poses in the solver."
                    ));
                }
            }
        }
        ValidationReport::ok()
    }

    /// Every solver needs a non-default pose, and every non-default pose
    /// needs a driven bone.
    pub fn validate_solver_non_default_pose_with_driven_bones(&self) -> ValidationReport {
        if self.solvers.is_empty() {
            return ValidationReport::invalid("No RBF solvers, please add one.");
        }
        for solver in &self.solvers {
            if solver.poses.len() <= 1 {
                return ValidationReport::invalid(format!(
                    "The RBF solver '{}' must have at least one non-default pose.",
                    solver.name
                ));
            }
            if let Some(pose) = solver
                .poses
                .iter()
                .find(|pose| !pose.is_default() && pose.driven.is_empty())
            {
                return ValidationReport::invalid(format!(
                    "Pose \"{}\" in the RBF solver \"{}\" has no driven bones. Poses must have at \
                     least one driven bone.",
                    pose.name, solver.name
                ));
            }
        }
        ValidationReport::ok()
    }

    pub fn validate_add_rbf_solver(
        &self,
        ctx: EditContext<'_>,
        rig: &dyn SceneBoneSource,
        driver_bone: &str,
    ) -> ValidationReport {
        if !rig.has_bone(driver_bone) {
            return ValidationReport::invalid(format!(
                "Bone \"{driver_bone}\" not found in the body rig."
            ));
        }
        if ctx.lookups.swing_bones.contains(driver_bone) {
            return ValidationReport::invalid(format!(
                "Bone \"{driver_bone}\" is a swing bone and cannot be used as a driver bone."
            ));
        }
        if ctx.lookups.twist_bones.contains(driver_bone) {
            return ValidationReport::invalid(format!(
                "Bone \"{driver_bone}\" is a twist bone and cannot be used as a driver bone."
            ));
        }
        let expected = format!("{driver_bone}{RBF_SOLVER_POSTFIX}");
        if self.solvers.iter().any(|s| s.name == expected) {
            return ValidationReport::invalid(format!(
                "A solver for bone \"{driver_bone}\" already exists: \"{expected}\"."
            ));
        }
        ValidationReport::ok()
    }

    pub fn validate_mirror_solver(&self, rig: &dyn SceneBoneSource) -> ValidationReport {
        let Some(solver) = self.active_solver() else {
            return ValidationReport::invalid("No active RBF solver found.");
        };
        let Some(target) = mirrored_name(&solver.name, &self.patterns.solver) else {
            return ValidationReport::invalid(format!(
                "Solver \"{}\" does not match the mirror pattern and cannot be mirrored.",
                solver.name
            ));
        };
        if self.solvers.iter().any(|s| s.name == target) {
            return ValidationReport::invalid(format!(
                "Target solver \"{target}\" already exists. Delete it first or mirror individual \
                 poses instead."
            ));
        }
        let driver = solver_driver_bone(solver);
        let Some(mirrored_driver) = mirrored_name(&driver, &self.patterns.bone) else {
            return ValidationReport::invalid(format!(
                "Driver bone \"{driver}\" does not match the bone mirror pattern."
            ));
        };
        if !rig.has_bone(&mirrored_driver) {
            return ValidationReport::invalid(format!(
                "Mirrored driver bone \"{mirrored_driver}\" does not exist in the body rig."
            ));
        }
        ValidationReport::ok()
    }

    pub fn validate_mirror_pose(&self) -> ValidationReport {
        let Some(solver) = self.active_solver() else {
            return ValidationReport::invalid("No active RBF solver found.");
        };
        let Some(pose) = self.active_pose() else {
            return ValidationReport::invalid("No active pose found.");
        };
        if pose.name.eq_ignore_ascii_case(DEFAULT_POSE_NAME) {
            return ValidationReport::invalid("Cannot mirror the default pose.");
        }
        let Some(target_name) = mirrored_name(&solver.name, &self.patterns.solver) else {
            return ValidationReport::invalid(format!(
                "Solver \"{}\" does not match the mirror pattern.",
                solver.name
            ));
        };
        let Some(target) = self.solvers.iter().find(|s| s.name == target_name) else {
            return ValidationReport::invalid(format!(
                "Target solver \"{target_name}\" does not exist. Mirror the solver first or \
                 create it manually."
            ));
        };
        let pose_name =
            mirrored_name(&pose.name, &self.patterns.pose).unwrap_or_else(|| pose.name.clone());
        if target.pose(&pose_name).is_some() {
            return ValidationReport::invalid(format!(
                "Pose \"{pose_name}\" already exists in solver \"{target_name}\". Delete it first \
                 or update it manually."
            ));
        }
        ValidationReport::ok()
    }
}
