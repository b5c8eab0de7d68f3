//! Changes made during an editing session, relative to the solvers the
//! session started from.

use hashbrown::HashSet;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use rig_logic::constants::{BONE_DELTA_THRESHOLD, DEFAULT_POSE_NAME};
use rig_logic::math::rotation_difference;
use rig_logic::{RbfPose, RbfSolver};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PoseAdded,
    PoseRemoved,
    SolverAdded,
    SolverRemoved,
    DrivenBoneAdded,
    DrivenBoneRemoved,
    DriverModified,
    DrivenLocation,
    DrivenRotation,
    DrivenScale,
}

/// A transform edit on one bone of one pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneChange {
    pub bone: String,
    pub pose: String,
    pub solver: String,
    pub change_type: ChangeType,
    pub old: Vec<f64>,
    pub new: Vec<f64>,
}

impl BoneChange {
    pub fn summary(&self) -> String {
        let label = match self.change_type {
            ChangeType::DrivenLocation => "location",
            ChangeType::DrivenRotation => "rotation",
            ChangeType::DrivenScale => "scale",
            _ => "driver rotation",
        };
        format!("{}: {label} modified", self.bone)
    }
}

/// A solver, pose or driven bone that was added or removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralChange {
    pub change_type: ChangeType,
    pub name: String,
    /// Solver name for poses, `"<solver>/<pose>"` for bones, empty for solvers.
    pub parent: String,
}

impl StructuralChange {
    fn new(change_type: ChangeType, name: &str, parent: impl Into<String>) -> Self {
        Self {
            change_type,
            name: name.to_string(),
            parent: parent.into(),
        }
    }

    pub fn summary(&self) -> String {
        let (name, parent) = (&self.name, &self.parent);
        match self.change_type {
            ChangeType::PoseAdded => format!("Added pose '{name}' to {parent}"),
            ChangeType::PoseRemoved => format!("Removed pose '{name}' from {parent}"),
            ChangeType::SolverAdded => format!("Added solver '{name}'"),
            ChangeType::SolverRemoved => format!("Removed solver '{name}'"),
            ChangeType::DrivenBoneAdded => format!("Added bone '{name}' to {parent}"),
            ChangeType::DrivenBoneRemoved => format!("Removed bone '{name}' from {parent}"),
            _ => format!("{:?}: {name}", self.change_type),
        }
    }
}

/// Session changes. `snapshot` holds the solvers as they were when editing
/// started; [`ChangeTracker::update`] recomputes the lists from scratch.
#[derive(Clone, Debug, Default)]
pub struct ChangeTracker {
    snapshot: Vec<RbfSolver>,
    pub bone_changes: Vec<BoneChange>,
    pub structural_changes: Vec<StructuralChange>,
}

fn sorted_difference<'a>(left: &HashSet<&'a str>, right: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = left.difference(right).copied().collect();
    names.sort_unstable();
    names
}

fn components(v: &Vector3<f64>) -> Vec<f64> {
    v.iter().copied().collect()
}

impl ChangeTracker {
    pub fn new(snapshot: Vec<RbfSolver>) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> &[RbfSolver] {
        &self.snapshot
    }

    pub fn has_changes(&self) -> bool {
        !self.bone_changes.is_empty() || !self.structural_changes.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.bone_changes.len() + self.structural_changes.len()
    }

    pub fn clear(&mut self) {
        self.snapshot.clear();
        self.bone_changes.clear();
        self.structural_changes.clear();
    }

    /// Recompute the change lists for `current`.
    pub fn update(&mut self, current: &[RbfSolver]) {
        self.bone_changes.clear();
        self.structural_changes.clear();

        let snapshot = std::mem::take(&mut self.snapshot);
        let before: HashSet<&str> = snapshot.iter().map(|s| s.name.as_str()).collect();
        let after: HashSet<&str> = current.iter().map(|s| s.name.as_str()).collect();
        for name in sorted_difference(&after, &before) {
            self.structural_changes
                .push(StructuralChange::new(ChangeType::SolverAdded, name, ""));
        }
        for name in sorted_difference(&before, &after) {
            self.structural_changes
                .push(StructuralChange::new(ChangeType::SolverRemoved, name, ""));
        }

        for solver in current {
            let Some(initial) = snapshot.iter().find(|s| s.name == solver.name) else {
                continue;
            };
            let before: HashSet<&str> = initial.poses.iter().map(|p| p.name.as_str()).collect();
            let after: HashSet<&str> = solver.poses.iter().map(|p| p.name.as_str()).collect();
            for name in sorted_difference(&after, &before) {
                if name != DEFAULT_POSE_NAME {
                    self.structural_changes.push(StructuralChange::new(
                        ChangeType::PoseAdded,
                        name,
                        solver.name.as_str(),
                    ));
                }
            }
            for name in sorted_difference(&before, &after) {
                self.structural_changes.push(StructuralChange::new(
                    ChangeType::PoseRemoved,
                    name,
                    solver.name.as_str(),
                ));
            }
            for pose in &solver.poses {
                if let Some(initial_pose) = initial.pose(&pose.name) {
                    self.compare_pose(&solver.name, initial_pose, pose);
                }
            }
        }
        drop(before);
        self.snapshot = snapshot;
    }

    fn compare_pose(&mut self, solver: &str, initial: &RbfPose, current: &RbfPose) {
        let parent = format!("{solver}/{}", current.name);
        let before: HashSet<&str> = initial.driven.iter().map(|d| d.bone_name.as_str()).collect();
        let after: HashSet<&str> = current.driven.iter().map(|d| d.bone_name.as_str()).collect();
        for name in sorted_difference(&after, &before) {
            self.structural_changes.push(StructuralChange::new(
                ChangeType::DrivenBoneAdded,
                name,
                parent.as_str(),
            ));
        }
        for name in sorted_difference(&before, &after) {
            self.structural_changes.push(StructuralChange::new(
                ChangeType::DrivenBoneRemoved,
                name,
                parent.as_str(),
            ));
        }

        let change = |bone: &str, change_type, old: Vec<f64>, new: Vec<f64>| BoneChange {
            bone: bone.to_string(),
            pose: current.name.clone(),
            solver: solver.to_string(),
            change_type,
            old,
            new,
        };
        for driven in &current.driven {
            let Some(old) = initial.driven_bone(&driven.bone_name) else {
                continue;
            };
            let pairs = [
                (ChangeType::DrivenLocation, old.location, driven.location),
                (ChangeType::DrivenRotation, old.euler_rotation, driven.euler_rotation),
                (ChangeType::DrivenScale, old.scale, driven.scale),
            ];
            for (change_type, before, after) in pairs {
                if (after - before).norm() > BONE_DELTA_THRESHOLD {
                    self.bone_changes.push(change(
                        &driven.bone_name,
                        change_type,
                        components(&before),
                        components(&after),
                    ));
                }
            }
        }
        for driver in &current.drivers {
            let Some(old) = initial.drivers.iter().find(|d| d.bone_name == driver.bone_name) else {
                continue;
            };
            if rotation_difference(&old.quaternion_rotation, &driver.quaternion_rotation)
                > BONE_DELTA_THRESHOLD
            {
                self.bone_changes.push(change(
                    &driver.bone_name,
                    ChangeType::DriverModified,
                    old.quaternion_rotation.coords.iter().copied().collect(),
                    driver.quaternion_rotation.coords.iter().copied().collect(),
                ));
            }
        }
    }

    /// Human-readable lines, structural changes first, with an overflow line
    /// when more than `max_lines` changes exist.
    pub fn summary_lines(&self, max_lines: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .structural_changes
            .iter()
            .take(max_lines)
            .map(StructuralChange::summary)
            .collect();
        let remaining = max_lines.saturating_sub(lines.len());
        lines.extend(self.bone_changes.iter().take(remaining).map(BoneChange::summary));
        let shown = lines.len();
        if self.change_count() > shown {
            lines.push(format!("... and {} more changes", self.change_count() - shown));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;
    use rig_logic::{RbfDriven, RbfDriver};

    fn solver() -> RbfSolver {
        let mut solver = RbfSolver::new("upperarm_l_UERBFSolver", 0);
        let mut default = RbfPose::new("default", 0);
        default.drivers.push(RbfDriver::identity("upperarm_l", 2));
        let mut up = RbfPose::new("upperarm_l_up", 1);
        up.drivers.push(RbfDriver::identity("upperarm_l", 2));
        up.driven.push(RbfDriven::new("upperarm_out_l", 4, 1.0));
        solver.poses = vec![default, up];
        solver
    }

    #[test]
    fn untouched_session_has_no_changes() {
        let mut tracker = ChangeTracker::new(vec![solver()]);
        tracker.update(&[solver()]);
        assert!(!tracker.has_changes());
        assert!(tracker.summary_lines(5).is_empty());
    }

    #[test]
    fn transform_edits_above_threshold_are_tracked() {
        let mut tracker = ChangeTracker::new(vec![solver()]);
        let mut current = solver();
        let pose = current.pose_mut("upperarm_l_up").unwrap();
        pose.driven[0].location.x = 0.0005;
        pose.driven[0].euler_rotation.z = 0.5;
        pose.drivers[0].quaternion_rotation = UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0);
        tracker.update(&[current]);
        let summaries: Vec<String> = tracker.bone_changes.iter().map(BoneChange::summary).collect();
        assert_eq!(
            summaries,
            vec!["upperarm_out_l: rotation modified", "upperarm_l: driver rotation modified"]
        );
    }

    #[test]
    fn structural_changes_are_listed_first_with_overflow() {
        let mut tracker = ChangeTracker::new(vec![solver()]);
        let mut current = solver();
        current.poses.retain(|p| p.name != "upperarm_l_up");
        let mut down = RbfPose::new("upperarm_l_down", 2);
        down.driven.push(RbfDriven::new("upperarm_out_l", 4, 1.0));
        current.poses.push(down);
        let added = RbfSolver::new("thigh_l_UERBFSolver", 1);
        tracker.update(&[current, added]);

        assert_eq!(tracker.change_count(), 3);
        let lines = tracker.summary_lines(2);
        assert_eq!(lines[0], "Added solver 'thigh_l_UERBFSolver'");
        assert_eq!(lines[1], "Added pose 'upperarm_l_down' to upperarm_l_UERBFSolver");
        assert_eq!(lines[2], "... and 1 more changes");
    }

    #[test]
    fn driven_bone_membership_is_tracked_per_pose() {
        let mut tracker = ChangeTracker::new(vec![solver()]);
        let mut current = solver();
        let pose = current.pose_mut("upperarm_l_up").unwrap();
        pose.driven.push(RbfDriven::new("upperarm_in_l", 5, 1.0));
        tracker.update(&[current]);
        assert_eq!(
            tracker.structural_changes[0].summary(),
            "Added bone 'upperarm_in_l' to upperarm_l_UERBFSolver/upperarm_l_up"
        );
    }
}
