//! Control mapping: scene state to GUI and raw control values.
//!
//! GUI controls are named `"<control>.t<axis>"` and read from the
//! translation of a face-board bone. Raw controls are named
//! `"<bone>.q<axis>"` and read from the local quaternion of a driver bone.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use rig_dna::DnaReader;

use crate::constants::{
    CENTER_EYE_CONTROL, EYE_AIM_MAX_PITCH_DEGREES, EYE_AIM_MAX_YAW_DEGREES, EYE_AIM_SWITCH_ON,
    EYE_AIM_TRIPLES, FLOATING_POINT_PRECISION, HEAD_SWITCHES, LOOK_AT_SWITCH,
};
use crate::error::RigLogicError;
use crate::evaluator::RigState;
use crate::log_once::LogOnce;
use crate::math::{decompose, translation};
use crate::scene::{SceneBoneSink, SceneBoneSource};

/// `"<control>.<attribute>"` split at the last `.`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControlName<'a> {
    pub control: &'a str,
    pub attribute: &'a str,
}

impl<'a> ControlName<'a> {
    pub fn parse(name: &'a str) -> Option<Self> {
        let (control, attribute) = name.rsplit_once('.')?;
        Some(Self { control, attribute })
    }

    /// Axis of a GUI control attribute (`"ty"` -> `"y"`).
    pub fn gui_axis(&self) -> String {
        self.attribute
            .rsplit('t')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Axis of a raw control attribute (`"qw"` -> `"w"`).
    pub fn raw_axis(&self) -> String {
        self.attribute
            .rsplit('q')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn is_quaternion(&self) -> bool {
        self.attribute.starts_with('q')
    }
}

fn vector_component(v: &Vector3<f64>, axis: &str) -> Option<f64> {
    match axis {
        "x" => Some(v.x),
        "y" => Some(v.y),
        "z" => Some(v.z),
        _ => None,
    }
}

fn quaternion_component(q: &UnitQuaternion<f64>, axis: &str) -> Option<f64> {
    match axis {
        "x" => Some(q.i),
        "y" => Some(q.j),
        "z" => Some(q.k),
        "w" => Some(q.w),
        _ => None,
    }
}

/// Local pose basis of a bone, recovered from its evaluated world matrix so
/// constraints and parent motion are included.
pub fn local_basis(bones: &dyn SceneBoneSource, name: &str) -> Option<Matrix4<f64>> {
    let bone = bones.bone(name)?;
    let rest_inverse = bone.rest_matrix.try_inverse()?;
    match bone.parent.as_deref().and_then(|p| bones.bone(p)) {
        Some(parent) => Some(
            rest_inverse * parent.rest_matrix * parent.pose_matrix.try_inverse()? * bone.pose_matrix,
        ),
        None => Some(rest_inverse * bones.armature_matrix().try_inverse()? * bone.pose_matrix),
    }
}

/// Local rotation of a driver bone, normalized.
pub fn driver_local_quaternion(
    bones: &dyn SceneBoneSource,
    name: &str,
) -> Option<UnitQuaternion<f64>> {
    local_basis(bones, name).map(|basis| decompose(&basis).rotation)
}

/// `control -> axis -> value`. Used for bake-time overrides and eye-aim results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlOverrides {
    values: HashMap<String, HashMap<String, f64>>,
}

impl ControlOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, control: &str, axis: &str, value: f64) -> &mut Self {
        self.values
            .entry(control.to_string())
            .or_default()
            .insert(axis.to_string(), value);
        self
    }

    pub fn get(&self, control: &str, axis: &str) -> Option<f64> {
        self.values.get(control)?.get(axis).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// True when `CTRL_lookAtSwitch` is switched on.
pub fn use_eye_aim(face_board: &dyn SceneBoneSource) -> bool {
    face_board
        .bone(LOOK_AT_SWITCH)
        .is_some_and(|bone| bone.location.y >= EYE_AIM_SWITCH_ON)
}

/// Eye GUI values that point each eye at its aim target.
///
/// Results are keyed by GUI control (`CTRL_L_eye`, `CTRL_R_eye`) with `x` as
/// yaw and `y` as pitch, both normalized to `[-1, 1]`.
pub fn eye_aim_values(
    face_board: &dyn SceneBoneSource,
    head_rig: &dyn SceneBoneSource,
) -> ControlOverrides {
    let mut values = ControlOverrides::new();
    for (target_name, eye_name, control) in EYE_AIM_TRIPLES {
        let (Some(target), Some(eye)) = (face_board.bone(target_name), head_rig.bone(eye_name))
        else {
            continue;
        };
        let direction = translation(&target.pose_matrix) - translation(&eye.pose_matrix);
        if direction.norm() < FLOATING_POINT_PRECISION {
            continue;
        }
        let rest_world = head_rig.armature_matrix() * eye.rest_matrix;
        let Some(inverse) = rest_world.fixed_view::<3, 3>(0, 0).into_owned().try_inverse() else {
            continue;
        };
        let local = (inverse * direction).normalize();

        let horizontal = (local.x * local.x + local.z * local.z).sqrt();
        let yaw = if horizontal > FLOATING_POINT_PRECISION {
            (local.x / horizontal).clamp(-1.0, 1.0).asin()
        } else {
            0.0
        };
        let pitch = local.y.atan2(horizontal);

        values.set(
            control,
            "x",
            (yaw.to_degrees() / EYE_AIM_MAX_YAW_DEGREES).clamp(-1.0, 1.0),
        );
        values.set(
            control,
            "y",
            (pitch.to_degrees() / EYE_AIM_MAX_PITCH_DEGREES).clamp(-1.0, 1.0),
        );
    }
    values
}

fn is_eye_control(control: &str) -> bool {
    EYE_AIM_TRIPLES.iter().any(|(_, _, c)| *c == control)
}

/// Write every GUI control of `reader` into `state`.
///
/// Overrides win when present. Otherwise the face-board bone translation is
/// used, except for the eye controls where a non-zero eye-aim value, or
/// failing that a non-zero `CTRL_C_eye` value, takes its place. Controls
/// without a bone default to 0.
pub fn gui_control_values(
    reader: &dyn DnaReader,
    face_board: &dyn SceneBoneSource,
    eye_aim: Option<&ControlOverrides>,
    overrides: Option<&ControlOverrides>,
    state: &mut RigState,
    log: &mut LogOnce,
) -> Result<(), RigLogicError> {
    let mut missing: Vec<String> = Vec::new();
    let center = face_board.bone(CENTER_EYE_CONTROL);
    for index in 0..reader.gui_control_count() {
        let Some(name) = reader.gui_control_name(index).and_then(ControlName::parse) else {
            continue;
        };
        let axis = name.gui_axis();

        if let Some(value) = overrides.and_then(|o| o.get(name.control, &axis)) {
            state.set_gui_control(index, value)?;
            continue;
        }

        let Some(bone) = face_board.bone(name.control) else {
            if !missing.iter().any(|m| m == name.control) {
                missing.push(name.control.to_string());
            }
            state.set_gui_control(index, 0.0)?;
            continue;
        };
        let mut value = vector_component(&bone.location, &axis).unwrap_or(0.0);

        if is_eye_control(name.control) {
            let aimed = eye_aim
                .and_then(|aim| aim.get(name.control, &axis))
                .filter(|v| v.abs() > FLOATING_POINT_PRECISION);
            let centered = center
                .as_ref()
                .and_then(|c| vector_component(&c.location, &axis))
                .filter(|v| v.abs() > FLOATING_POINT_PRECISION);
            if let Some(v) = aimed.or(centered) {
                value = v;
            }
        }
        state.set_gui_control(index, value)?;
    }
    log.warn_missing("head_missing_gui_controls", "GUI controls", &missing);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn raw_control_values(
    reader: &dyn DnaReader,
    rig: &dyn SceneBoneSource,
    driver_bones: &HashSet<String>,
    overrides: Option<&ControlOverrides>,
    quaternion_only: bool,
    category: &str,
    state: &mut RigState,
    log: &mut LogOnce,
) -> Result<(), RigLogicError> {
    let mut rotations: HashMap<&str, Option<UnitQuaternion<f64>>> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for index in 0..reader.raw_control_count() {
        let Some(name) = reader.raw_control_name(index).and_then(ControlName::parse) else {
            continue;
        };
        if (quaternion_only && !name.is_quaternion()) || !driver_bones.contains(name.control) {
            continue;
        }
        let axis = name.raw_axis();
        if let Some(value) = overrides.and_then(|o| o.get(name.control, &axis)) {
            state.set_raw_control(index, value)?;
            continue;
        }
        let rotation = *rotations
            .entry(name.control)
            .or_insert_with(|| driver_local_quaternion(rig, name.control));
        match rotation.and_then(|q| quaternion_component(&q, &axis)) {
            Some(value) => state.set_raw_control(index, value)?,
            None => {
                if !missing.iter().any(|m| m == name.control) {
                    missing.push(name.control.to_string());
                }
            }
        }
    }
    log.warn_missing(category, "raw control bones", &missing);
    Ok(())
}

/// Raw controls of head driver bones. Only `q` attributes are read.
pub fn head_raw_control_values(
    reader: &dyn DnaReader,
    rig: &dyn SceneBoneSource,
    driver_bones: &HashSet<String>,
    overrides: Option<&ControlOverrides>,
    state: &mut RigState,
    log: &mut LogOnce,
) -> Result<(), RigLogicError> {
    raw_control_values(
        reader,
        rig,
        driver_bones,
        overrides,
        true,
        "head_missing_raw_controls",
        state,
        log,
    )
}

/// Raw controls of body driver bones.
pub fn body_raw_control_values(
    reader: &dyn DnaReader,
    rig: &dyn SceneBoneSource,
    driver_bones: &HashSet<String>,
    overrides: Option<&ControlOverrides>,
    state: &mut RigState,
    log: &mut LogOnce,
) -> Result<(), RigLogicError> {
    raw_control_values(
        reader,
        rig,
        driver_bones,
        overrides,
        false,
        "body_missing_raw_controls",
        state,
        log,
    )
}

/// Put the raw controls selected by `filter` back to the identity rotation.
pub fn reset_raw_controls(
    reader: &dyn DnaReader,
    state: &mut RigState,
    filter: impl Fn(&ControlName<'_>) -> bool,
) -> Result<(), RigLogicError> {
    for index in 0..reader.raw_control_count() {
        let Some(name) = reader.raw_control_name(index).and_then(ControlName::parse) else {
            continue;
        };
        if !filter(&name) {
            continue;
        }
        let value = if name.raw_axis() == "w" { 1.0 } else { 0.0 };
        state.set_raw_control(index, value)?;
    }
    Ok(())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Copy each head switch onto the CHILD_OF influence of the control it
/// drives. Returns the number of influences changed.
pub fn head_switch_influences<B>(face_board: &mut B) -> usize
where
    B: SceneBoneSource + SceneBoneSink + ?Sized,
{
    let mut changed = 0;
    for (switch, target) in HEAD_SWITCHES {
        let Some(value) = face_board.bone(switch).map(|b| b.location.y) else {
            continue;
        };
        let Some(current) = face_board.constraint_influence(target) else {
            continue;
        };
        if round3(current) != round3(value) && face_board.set_constraint_influence(target, value)
        {
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RigLogic;
    use crate::math::{rotation_x, y_up_to_z_up};
    use crate::scene::MemoryArmature;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;
    use rig_dna::MemoryReader;

    fn head_reader() -> MemoryReader {
        MemoryReader::from_json_str(
            r#"{ "definition": {
                "gui_control_names": ["CTRL_L_eye.tx", "CTRL_L_eye.ty", "CTRL_L_mouth_corner.ty", "CTRL_missing.tx"],
                "raw_control_names": ["FACIAL_L_Eye.qx", "FACIAL_L_Eye.qy", "FACIAL_L_Eye.qz", "FACIAL_L_Eye.qw", "CTRL_expressions.jawOpen"]
            } }"#,
        )
        .unwrap()
    }

    fn face_board() -> MemoryArmature {
        let mut board = MemoryArmature::new();
        for name in ["CTRL_L_eye", "CTRL_C_eye", "CTRL_L_mouth_corner", LOOK_AT_SWITCH] {
            board.add_bone(name, None, Matrix4::identity());
        }
        board
    }

    #[test]
    fn control_names_split_into_axis() {
        let gui = ControlName::parse("CTRL_L_brow_raiseIn.ty").unwrap();
        assert_eq!(gui.control, "CTRL_L_brow_raiseIn");
        assert_eq!(gui.gui_axis(), "y");
        let raw = ControlName::parse("FACIAL_L_Eye.qW").unwrap();
        assert_eq!(raw.raw_axis(), "w");
        assert!(raw.is_quaternion());
        assert!(!ControlName::parse("CTRL_expressions.jawOpen")
            .unwrap()
            .is_quaternion());
        assert!(ControlName::parse("no_dot").is_none());
    }

    #[test]
    fn driver_quaternion_comes_from_world_matrices() {
        let mut rig = MemoryArmature::new().with_matrix_world(y_up_to_z_up());
        rig.add_bone("head", None, Matrix4::identity());
        rig.add_bone(
            "FACIAL_L_Eye",
            Some("head"),
            Matrix4::new_translation(&Vector3::new(0.03, 0.1, 0.0)),
        );
        rig.set_bone_basis("head", rotation_x(0.3));
        rig.set_bone_basis("FACIAL_L_Eye", rotation_x(0.5));

        let q = driver_local_quaternion(&rig, "FACIAL_L_Eye").unwrap();
        assert_relative_eq!(q.angle(), 0.5, epsilon = 1e-9);
        let root = driver_local_quaternion(&rig, "head").unwrap();
        assert_relative_eq!(root.angle(), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn gui_values_prefer_overrides_then_eye_aim_then_center_eye() {
        let reader = head_reader();
        let rig = RigLogic::from_reader(&reader).unwrap();
        let mut state = RigState::new(&rig);
        let mut log = LogOnce::new("ada");
        let mut board = face_board();
        board.set_location("CTRL_L_eye", Vector3::new(0.1, 0.2, 0.0));
        board.set_location("CTRL_C_eye", Vector3::new(0.0, -0.5, 0.0));
        board.set_location("CTRL_L_mouth_corner", Vector3::new(0.0, 0.7, 0.0));

        let mut aim = ControlOverrides::new();
        aim.set("CTRL_L_eye", "x", 0.4).set("CTRL_L_eye", "y", 0.0);
        gui_control_values(&reader, &board, Some(&aim), None, &mut state, &mut log).unwrap();
        assert_relative_eq!(state.gui_control(0).unwrap(), 0.4);
        // zero eye aim falls back to the center eye control
        assert_relative_eq!(state.gui_control(1).unwrap(), -0.5);
        assert_relative_eq!(state.gui_control(2).unwrap(), 0.7);
        assert_relative_eq!(state.gui_control(3).unwrap(), 0.0);

        let mut overrides = ControlOverrides::new();
        overrides.set("CTRL_L_mouth_corner", "y", 1.0);
        gui_control_values(&reader, &board, None, Some(&overrides), &mut state, &mut log).unwrap();
        assert_relative_eq!(state.gui_control(2).unwrap(), 1.0);
        assert_relative_eq!(state.gui_control(0).unwrap(), 0.1);
    }

    #[test]
    fn head_raw_controls_read_quaternion_axes_only() {
        let reader = head_reader();
        let rig_logic = RigLogic::from_reader(&reader).unwrap();
        let mut state = RigState::new(&rig_logic);
        let mut log = LogOnce::new("ada");
        let mut rig = MemoryArmature::new();
        rig.add_bone("FACIAL_L_Eye", None, Matrix4::identity());
        rig.set_bone_basis("FACIAL_L_Eye", rotation_x(1.0));
        let drivers: HashSet<String> = ["FACIAL_L_Eye".to_string()].into_iter().collect();

        state.set_raw_control(4, 0.25).unwrap();
        head_raw_control_values(&reader, &rig, &drivers, None, &mut state, &mut log).unwrap();
        assert_relative_eq!(state.raw_control(0).unwrap(), 0.5f64.sin(), epsilon = 1e-12);
        assert_relative_eq!(state.raw_control(3).unwrap(), 0.5f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(state.raw_control(4).unwrap(), 0.25);

        reset_raw_controls(&reader, &mut state, |name| name.is_quaternion()).unwrap();
        assert_relative_eq!(state.raw_control(0).unwrap(), 0.0);
        assert_relative_eq!(state.raw_control(3).unwrap(), 1.0);
    }

    #[test]
    fn missing_driver_bones_leave_values_untouched() {
        let reader = head_reader();
        let rig_logic = RigLogic::from_reader(&reader).unwrap();
        let mut state = RigState::new(&rig_logic);
        let mut log = LogOnce::new("ada");
        let drivers: HashSet<String> = ["FACIAL_L_Eye".to_string()].into_iter().collect();
        state.set_raw_control(3, 1.0).unwrap();
        head_raw_control_values(&reader, &MemoryArmature::new(), &drivers, None, &mut state, &mut log)
            .unwrap();
        assert_relative_eq!(state.raw_control(3).unwrap(), 1.0);
        assert!(!log.first("head_missing_raw_controls"));
    }

    #[test]
    fn eye_aim_maps_yaw_and_pitch_to_control_range() {
        let mut board = MemoryArmature::new();
        board.add_bone(
            "CTRL_L_eyeAim",
            None,
            Matrix4::new_translation(&Vector3::new(1.0, 1.0, 1.0)),
        );
        let mut head = MemoryArmature::new();
        head.add_bone("FACIAL_L_Eye", None, Matrix4::identity());

        let values = eye_aim_values(&board, &head);
        // 45 degrees of yaw over a 60 degree range, pitch clamped at 30
        assert_relative_eq!(values.get("CTRL_L_eye", "x").unwrap(), 0.75, epsilon = 1e-9);
        assert_relative_eq!(values.get("CTRL_L_eye", "y").unwrap(), 1.0, epsilon = 1e-9);
        assert!(values.get("CTRL_R_eye", "x").is_none());
    }

    #[test]
    fn look_at_switch_enables_eye_aim() {
        let mut board = face_board();
        assert!(!use_eye_aim(&board));
        board.set_location(LOOK_AT_SWITCH, Vector3::new(0.0, 1.0, 0.0));
        assert!(use_eye_aim(&board));
    }

    #[test]
    fn switches_update_only_on_visible_change() {
        let mut board = MemoryArmature::new();
        board.add_bone("CTRL_faceGUIfollowHead", None, Matrix4::identity());
        board.add_bone("CTRL_faceGUI", None, Matrix4::identity());
        board.add_child_of_constraint("CTRL_faceGUI", 1.0);

        board.set_location("CTRL_faceGUIfollowHead", Vector3::new(0.0, 0.9996, 0.0));
        assert_eq!(head_switch_influences(&mut board), 0);

        board.set_location("CTRL_faceGUIfollowHead", Vector3::new(0.0, 0.25, 0.0));
        assert_eq!(head_switch_influences(&mut board), 1);
        assert_relative_eq!(board.constraint_influence("CTRL_faceGUI").unwrap(), 0.25);
    }
}
