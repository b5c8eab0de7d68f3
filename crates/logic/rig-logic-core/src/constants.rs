//! Numeric thresholds and well-known names shared by evaluation and calibration.

pub use rig_dna::SCALE_FACTOR;

/// Vertex and shape-key deltas at or below this length are treated as unchanged.
pub const SHAPE_KEY_DELTA_THRESHOLD: f64 = 1e-6;
/// Bone translation/rotation deltas at or below this value are treated as unchanged.
pub const BONE_DELTA_THRESHOLD: f64 = 1e-3;
/// General float comparison tolerance (eye aim, origin checks, center-eye override).
pub const FLOATING_POINT_PRECISION: f64 = 1e-4;
/// Longest shape-key name the host can store.
pub const SHAPE_KEY_NAME_MAX_LENGTH: usize = 63;

pub const ATTR_COUNT_PER_EULER_JOINT: usize = 9;
pub const ATTR_COUNT_PER_QUATERNION_JOINT: usize = 10;

pub const RBF_SOLVER_POSTFIX: &str = "_UERBFSolver";
pub const DEFAULT_POSE_NAME: &str = "default";

/// Body bones that live in the head DNA only for parenting; calibration skips them.
pub const EXTRA_BONES: [&str; 5] = ["root", "pelvis", "spine_01", "spine_02", "spine_03"];

/// Maximum eye yaw/pitch mapped to a control value of 1.
pub const EYE_AIM_MAX_YAW_DEGREES: f64 = 60.0;
pub const EYE_AIM_MAX_PITCH_DEGREES: f64 = 30.0;
/// `CTRL_lookAtSwitch` location y at or above this enables eye aim.
pub const EYE_AIM_SWITCH_ON: f64 = 0.99;

pub const LOOK_AT_SWITCH: &str = "CTRL_lookAtSwitch";
pub const CENTER_EYE_CONTROL: &str = "CTRL_C_eye";
/// (aim target, eye bone on the head rig, GUI control) per side.
pub const EYE_AIM_TRIPLES: [(&str, &str, &str); 2] = [
    ("CTRL_L_eyeAim", "FACIAL_L_Eye", "CTRL_L_eye"),
    ("CTRL_R_eyeAim", "FACIAL_R_Eye", "CTRL_R_eye"),
];
/// (switch control, constrained control) pairs driving CHILD_OF influences.
pub const HEAD_SWITCHES: [(&str, &str); 2] = [
    ("CTRL_faceGUIfollowHead", "CTRL_faceGUI"),
    ("CTRL_eyesAimFollowHead", "CTRL_C_eyesAim"),
];

/// Head LOD to the body LOD whose mesh shares its neck edge loop.
pub fn head_to_body_lod(head_lod: u16) -> Option<u16> {
    match head_lod {
        0 | 1 => Some(0),
        2 | 3 => Some(1),
        4 | 5 => Some(2),
        6 | 7 => Some(3),
        _ => None,
    }
}
