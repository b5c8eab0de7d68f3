//! RBF pose solver.
//!
//! * [`model`] editable solver/pose/driver/driven records and DNA conversions.
//! * [`solver`] distances, kernels, weights and driven blending.
//! * [`swing_twist`] twist-axis decomposition for secondary bones.

pub mod model;
pub mod solver;
pub mod swing_twist;

pub use model::{
    solvers_from_reader, solvers_to_records, DrivenDataType, RbfDriven, RbfDriver, RbfPose,
    RbfSolver,
};
pub use solver::{
    automatic_radius, blend_driven, distance, kernel, pose_weights, BlendedDriven, RadiusStats,
};
pub use swing_twist::{
    calculate_partial_rotations, calculate_swing_twist, partial_rotation, swing_twist,
    PartialRotation, PartialRotationOutput, SwingTwistBones,
};
