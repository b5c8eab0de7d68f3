//! RBF pose editing session for a body rig.
//!
//! * [`ops`] solver, pose and driven-bone management plus scene capture.
//! * [`validation`] guards run before structural edits and before commit.
//! * [`mirror`] left/right name mirroring.
//! * [`change_tracker`] diff of the session against its starting point.
//!
//! The editor owns a working copy of the solvers. Evaluation keeps using the
//! solvers of the DNA until the session is committed.

pub mod change_tracker;
pub mod mirror;
pub mod ops;
pub mod validation;

use rig_dna::DnaReader;
use rig_logic::{solvers_from_reader, RbfPose, RbfSolver, RestPoseCache, RigLookups};

pub use change_tracker::{BoneChange, ChangeTracker, ChangeType, StructuralChange};
pub use mirror::{mirrored_name, side_replacement, MirrorPatterns};
pub use ops::{AvailableBone, DrivenSource, DrivenTransform};

/// Read-only body data the editor works against.
#[derive(Clone, Copy)]
pub struct EditContext<'a> {
    pub reader: &'a dyn DnaReader,
    pub lookups: &'a RigLookups,
    pub rest_pose: &'a RestPoseCache,
}

impl<'a> EditContext<'a> {
    pub fn joint_index(&self, bone: &str) -> Option<u16> {
        self.lookups.joint_index.get(bone).copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RbfEditor {
    solvers: Vec<RbfSolver>,
    active_solver: usize,
    active_pose: usize,
    editing: bool,
    pub patterns: MirrorPatterns,
    tracker: ChangeTracker,
}

impl RbfEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn solvers(&self) -> &[RbfSolver] {
        &self.solvers
    }

    pub fn solvers_mut(&mut self) -> &mut Vec<RbfSolver> {
        &mut self.solvers
    }

    /// Replace the working copy with the solvers stored in `reader`.
    pub fn load(&mut self, reader: &dyn DnaReader) {
        self.solvers = solvers_from_reader(reader);
        self.active_solver = 0;
        self.active_pose = 0;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Start a session from the DNA solvers.
    pub fn begin(&mut self, reader: &dyn DnaReader) {
        self.load(reader);
        self.tracker = ChangeTracker::new(self.solvers.clone());
        self.editing = true;
    }

    /// End the session and drop the tracked changes.
    pub fn end(&mut self) {
        self.editing = false;
        self.tracker.clear();
    }

    /// Discard the working copy, restoring the solvers the session started
    /// from, and end the session.
    pub fn revert(&mut self) {
        self.solvers = self.tracker.snapshot().to_vec();
        self.active_solver = 0;
        self.active_pose = 0;
        self.end();
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Recompute the tracked changes against the working copy.
    pub fn refresh_changes(&mut self) -> &ChangeTracker {
        self.tracker.update(&self.solvers);
        &self.tracker
    }

    pub fn active_solver_index(&self) -> usize {
        self.active_solver
    }

    pub fn active_pose_index(&self) -> usize {
        self.active_pose
    }

    pub fn active_solver(&self) -> Option<&RbfSolver> {
        self.solvers.get(self.active_solver)
    }

    pub fn active_pose(&self) -> Option<&RbfPose> {
        self.active_solver()?.poses.get(self.active_pose)
    }

    /// Select a solver by list index; its first pose becomes active.
    pub fn set_active_solver(&mut self, index: usize) -> bool {
        if index >= self.solvers.len() {
            return false;
        }
        self.active_solver = index;
        self.active_pose = 0;
        true
    }

    pub fn set_active_pose(&mut self, index: usize) -> bool {
        let in_range = self
            .active_solver()
            .is_some_and(|solver| index < solver.poses.len());
        if in_range {
            self.active_pose = index;
        }
        in_range
    }

    fn active_pose_mut(&mut self) -> Option<&mut RbfPose> {
        let pose = self.active_pose;
        self.solvers.get_mut(self.active_solver)?.poses.get_mut(pose)
    }

    fn max_pose_index(&self) -> i32 {
        self.solvers
            .iter()
            .flat_map(|s| s.poses.iter().map(|p| p.pose_index))
            .max()
            .unwrap_or(-1)
    }

    fn max_solver_index(&self) -> i32 {
        self.solvers
            .iter()
            .map(|s| s.solver_index)
            .max()
            .unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_dna::MemoryReader;

    fn reader() -> MemoryReader {
        let asset = rig_test_fixtures::dna::load("body_rbf").unwrap();
        MemoryReader::new(asset)
    }

    #[test]
    fn begin_loads_solvers_and_snapshot() {
        let mut editor = RbfEditor::new();
        editor.begin(&reader());
        assert!(editor.is_editing());
        assert_eq!(editor.solvers().len(), 1);
        assert_eq!(editor.tracker().snapshot().len(), 1);
        assert!(!editor.refresh_changes().has_changes());
        editor.end();
        assert!(!editor.is_editing());
        assert!(editor.tracker().snapshot().is_empty());
    }

    #[test]
    fn active_selection_is_bounds_checked() {
        let mut editor = RbfEditor::new();
        editor.load(&reader());
        assert!(editor.set_active_pose(1));
        assert!(!editor.set_active_pose(9));
        assert!(!editor.set_active_solver(3));
        assert!(editor.set_active_solver(0));
        assert_eq!(editor.active_pose_index(), 0);
    }
}
