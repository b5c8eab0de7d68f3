//! RBF solver and twist/swing records as stored in the asset.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RbfSolverMode {
    Additive,
    #[default]
    Interpolative,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RbfDistanceMethod {
    Quaternion,
    #[default]
    SwingAngle,
    TwistAngle,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RbfNormalizeMethod {
    OnlyNormalizeAboveOne,
    #[default]
    AlwaysNormalize,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RbfFunctionType {
    #[default]
    Gaussian,
    Exponential,
    Linear,
    Cubic,
    Quintic,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TwistAxis {
    #[default]
    X,
    Y,
    Z,
}

impl TwistAxis {
    pub fn unit(self) -> [f64; 3] {
        match self {
            TwistAxis::X => [1.0, 0.0, 0.0],
            TwistAxis::Y => [0.0, 1.0, 0.0],
            TwistAxis::Z => [0.0, 0.0, 1.0],
        }
    }

    /// Parses `"x"`, `"Y"` etc. Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "x" => Some(TwistAxis::X),
            "y" => Some(TwistAxis::Y),
            "z" => Some(TwistAxis::Z),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfSolverRecord {
    pub name: String,
    /// Raw controls holding the driver quaternion, ordered x, y, z, w.
    pub raw_control_indices: Vec<u16>,
    pub pose_indices: Vec<u16>,
    pub mode: RbfSolverMode,
    pub distance_method: RbfDistanceMethod,
    pub normalize_method: RbfNormalizeMethod,
    pub function_type: RbfFunctionType,
    pub twist_axis: TwistAxis,
    pub radius: f32,
    pub weight_threshold: f32,
    pub automatic_radius: bool,
}

impl Default for RbfSolverRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            raw_control_indices: Vec::new(),
            pose_indices: Vec::new(),
            mode: RbfSolverMode::default(),
            distance_method: RbfDistanceMethod::default(),
            normalize_method: RbfNormalizeMethod::default(),
            function_type: RbfFunctionType::default(),
            twist_axis: TwistAxis::default(),
            radius: 50.0,
            weight_threshold: 0.001,
            automatic_radius: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfDriverRecord {
    pub joint_index: u16,
    /// Driver orientation, x y z w.
    pub quaternion: [f32; 4],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfDrivenRecord {
    pub joint_index: u16,
    /// Translation delta in asset units.
    pub translation: [f32; 3],
    /// Rotation delta, x y z w.
    pub rotation: [f32; 4],
    /// Scale delta; components equal to the pose scale factor carry no delta.
    pub scale: [f32; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfPoseRecord {
    pub name: String,
    pub scale_factor: f32,
    pub target_enable: bool,
    pub joint_group_index: i32,
    pub drivers: Vec<RbfDriverRecord>,
    pub driven: Vec<RbfDrivenRecord>,
}

impl Default for RbfPoseRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            scale_factor: 0.0,
            target_enable: true,
            joint_group_index: -1,
            drivers: Vec::new(),
            driven: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfBehavior {
    pub solvers: Vec<RbfSolverRecord>,
    pub poses: Vec<RbfPoseRecord>,
}

/// One twist or swing setup: a driver quaternion split about `axis` and
/// distributed over output joints by blend weight.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingTwistSetup {
    pub axis: TwistAxis,
    /// Raw controls holding the driver quaternion, ordered x, y, z, w.
    pub input_control_indices: Vec<u16>,
    pub output_joint_indices: Vec<u16>,
    pub blend_weights: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwistSwingBehavior {
    pub twists: Vec<SwingTwistSetup>,
    pub swings: Vec<SwingTwistSetup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_defaults_match_editor_defaults() {
        let solver = RbfSolverRecord::default();
        assert_eq!(solver.mode, RbfSolverMode::Interpolative);
        assert_eq!(solver.distance_method, RbfDistanceMethod::SwingAngle);
        assert_eq!(solver.normalize_method, RbfNormalizeMethod::AlwaysNormalize);
        assert_eq!(solver.radius, 50.0);
        assert_eq!(solver.weight_threshold, 0.001);
    }

    #[test]
    fn twist_axis_parses_case_insensitively() {
        assert_eq!(TwistAxis::parse("Y"), Some(TwistAxis::Y));
        assert_eq!(TwistAxis::parse("w"), None);
    }
}
