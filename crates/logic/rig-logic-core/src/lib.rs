//! rig-logic-core: DNA-driven rig evaluation (host agnostic)
//!
//! Pipeline, leaves first:
//! * [`rest_pose`] caches each bone's bind transform relative to its parent.
//! * [`controls`] reads GUI and raw control values from the scene.
//! * [`evaluator`] maps controls through the DNA behavior into joint,
//!   blend-shape and animated-map outputs.
//! * [`applier`] writes those outputs back to the scene.
//!
//! The scene itself is only reached through the traits in [`scene`].

pub mod applier;
pub mod constants;
pub mod controls;
pub mod error;
pub mod evaluator;
pub mod log_once;
pub mod lookups;
pub mod math;
pub mod rbf;
pub mod report;
pub mod rest_pose;
pub mod scene;

// Re-exports for hosts and the instance layer
pub use applier::{
    apply_blend_shapes, apply_euler_joints, apply_quaternion_joints, apply_texture_masks,
    mask_slider_name, solo_blend_shape,
};
pub use controls::{
    body_raw_control_values, driver_local_quaternion, eye_aim_values, gui_control_values,
    head_raw_control_values, head_switch_influences, local_basis, reset_raw_controls,
    use_eye_aim, ControlName, ControlOverrides,
};
pub use error::RigLogicError;
pub use evaluator::{EvaluatorPhase, RigLogic, RigState};
pub use log_once::LogOnce;
pub use lookups::{scene_mesh_name, shape_key_name, RigLookups, ShapeKeyLookup, ShapeKeyTarget};
pub use rbf::{
    blend_driven, calculate_swing_twist, pose_weights, solvers_from_reader, solvers_to_records,
    swing_twist, DrivenDataType, RbfDriven, RbfDriver, RbfPose, RbfSolver, SwingTwistBones,
};
pub use report::{AutoFix, ValidationReport};
pub use rest_pose::{
    compute_rest_pose, RestPoseCache, RestPoseEntry, RestPoseReport, RestRotation,
    RestRotationPolicy, RotationMode,
};
pub use scene::{
    neutral_bind_pose, MemoryArmature, MemoryScene, SceneBone, SceneBoneSink, SceneBoneSource,
    SceneMesh, SceneMeshSource, SceneOutputSink, SceneShapeKey,
};
