//! Swing/twist decomposition and partial-rotation outputs.

use hashbrown::HashMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use rig_dna::{SwingTwistSetup, TwistAxis};

use crate::math::quaternion_to_euler;

/// Split `q` into `(swing, twist)` with `q = swing * twist` and `twist` a
/// rotation about `axis`.
pub fn swing_twist(
    q: &UnitQuaternion<f64>,
    axis: &Vector3<f64>,
) -> (UnitQuaternion<f64>, UnitQuaternion<f64>) {
    let axis = axis.normalize();
    let projection = axis * q.imag().dot(&axis);
    let raw = Quaternion::from_parts(q.w, projection);
    let twist = if raw.norm() > 1e-12 {
        UnitQuaternion::from_quaternion(raw)
    } else {
        // 180 degree swing: the twist is undefined.
        UnitQuaternion::identity()
    };
    let swing = q * twist.inverse();
    (swing, twist)
}

/// Slerp from identity towards `target`, taking the short way round.
pub fn partial_rotation(target: &UnitQuaternion<f64>, weight: f64) -> UnitQuaternion<f64> {
    let target = if target.w < 0.0 {
        UnitQuaternion::new_unchecked(-target.into_inner())
    } else {
        *target
    };
    UnitQuaternion::identity()
        .try_slerp(&target, weight, 1e-9)
        .unwrap_or(target)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PartialRotation {
    Swing,
    Twist,
}

/// Rotation of one output joint.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialRotationOutput {
    pub joint_index: u16,
    pub rotation: UnitQuaternion<f64>,
}

/// Blend the swing or twist part of `driver` into each output joint of
/// `setup`, slerping from identity by the joint's blend weight.
pub fn calculate_partial_rotations(
    setup: &SwingTwistSetup,
    kind: PartialRotation,
    driver: &UnitQuaternion<f64>,
) -> Vec<PartialRotationOutput> {
    let (swing, twist) = swing_twist(driver, &Vector3::from(setup.axis.unit()));
    let component = match kind {
        PartialRotation::Swing => swing,
        PartialRotation::Twist => twist,
    };
    setup
        .output_joint_indices
        .iter()
        .enumerate()
        .map(|(i, &joint_index)| {
            let weight = setup.blend_weights.get(i).copied().unwrap_or(1.0) as f64;
            PartialRotationOutput {
                joint_index,
                rotation: partial_rotation(&component, weight),
            }
        })
        .collect()
}

/// Named swing/twist outputs for one driver bone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SwingTwistBones {
    pub swing_axis: Option<TwistAxis>,
    pub swing_bone_names: Vec<String>,
    pub swing_blend_weights: Vec<f64>,
    pub twist_axis: Option<TwistAxis>,
    pub twist_bone_names: Vec<String>,
    pub twist_blend_weights: Vec<f64>,
}

/// Euler XYZ outputs per bone name for `(swing, twist)` bones, used when a
/// pose is previewed outside of evaluation.
pub fn calculate_swing_twist(
    driver: &UnitQuaternion<f64>,
    bones: &SwingTwistBones,
) -> (HashMap<String, Vector3<f64>>, HashMap<String, Vector3<f64>>) {
    fn blend(
        component: impl Fn(&Vector3<f64>) -> UnitQuaternion<f64>,
        axis: Option<TwistAxis>,
        names: &[String],
        weights: &[f64],
    ) -> HashMap<String, Vector3<f64>> {
        let Some(axis) = axis else {
            return HashMap::new();
        };
        let target = component(&Vector3::from(axis.unit()));
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let weight = weights.get(i).copied().unwrap_or(1.0);
                let rotation = partial_rotation(&target, weight);
                (name.clone(), quaternion_to_euler(&rotation))
            })
            .collect()
    }

    let swings = blend(
        |axis| swing_twist(driver, axis).0,
        bones.swing_axis,
        &bones.swing_bone_names,
        &bones.swing_blend_weights,
    );
    let twists = blend(
        |axis| swing_twist(driver, axis).1,
        bones.twist_axis,
        &bones.twist_bone_names,
        &bones.twist_blend_weights,
    );
    (swings, twists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::rotation_difference;
    use approx::assert_relative_eq;

    #[test]
    fn decomposition_recomposes() {
        let q = UnitQuaternion::from_euler_angles(0.4, -0.3, 0.8);
        let axis = Vector3::x();
        let (swing, twist) = swing_twist(&q, &axis);
        assert!(rotation_difference(&(swing * twist), &q) < 1e-12);
        let twist_axis = twist.axis().map(|a| a.into_inner()).unwrap_or_else(Vector3::x);
        assert_relative_eq!(twist_axis.cross(&axis).norm(), 0.0, epsilon = 1e-9);
        // swing leaves no rotation about the axis
        let (_, swing_twist_part) = swing_twist(&swing, &axis);
        assert!(rotation_difference(&swing_twist_part, &UnitQuaternion::identity()) < 1e-9);
    }

    #[test]
    fn twist_outputs_are_weighted() {
        let setup = SwingTwistSetup {
            axis: TwistAxis::X,
            input_control_indices: vec![0, 1, 2, 3],
            output_joint_indices: vec![4, 5],
            blend_weights: vec![0.5, 1.0],
        };
        let driver = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        let outputs = calculate_partial_rotations(&setup, PartialRotation::Twist, &driver);
        assert_relative_eq!(outputs[0].rotation.angle(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(outputs[1].rotation.angle(), 1.0, epsilon = 1e-9);

        let swings = calculate_partial_rotations(&setup, PartialRotation::Swing, &driver);
        assert_relative_eq!(swings[1].rotation.angle(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn named_outputs_skip_missing_axes() {
        let bones = SwingTwistBones {
            twist_axis: Some(TwistAxis::X),
            twist_bone_names: vec!["upperarm_twist_01_l".into()],
            twist_blend_weights: vec![0.5],
            ..SwingTwistBones::default()
        };
        let driver = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.8);
        let (swings, twists) = calculate_swing_twist(&driver, &bones);
        assert!(swings.is_empty());
        assert_relative_eq!(twists["upperarm_twist_01_l"].x, 0.4, epsilon = 1e-9);
    }
}
