//! Writes evaluator outputs back into the scene.
//!
//! Bone transforms are always rebuilt from the rest-pose cache plus the
//! current delta, so repeated evaluation never accumulates.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use rig_dna::DnaReader;

use crate::constants::{
    ATTR_COUNT_PER_EULER_JOINT, ATTR_COUNT_PER_QUATERNION_JOINT, SCALE_FACTOR,
    SHAPE_KEY_NAME_MAX_LENGTH,
};
use crate::log_once::LogOnce;
use crate::lookups::{RigLookups, ShapeKeyLookup};
use crate::math::{euler_to_quaternion, loc_rot_scale};
use crate::rest_pose::RestPoseCache;
use crate::scene::{SceneBoneSink, SceneOutputSink};

fn vector(values: &[f64]) -> Vector3<f64> {
    Vector3::new(values[0], values[1], values[2])
}

/// Head joints: 9 floats per joint, Euler rotations in degrees.
/// Driver bones are skipped. Returns the number of bones written.
pub fn apply_euler_joints(
    reader: &dyn DnaReader,
    outputs: &[f64],
    rest_pose: &RestPoseCache,
    lookups: &RigLookups,
    sink: &mut dyn SceneBoneSink,
    log: &mut LogOnce,
) -> usize {
    let mut applied = 0;
    let mut missing: Vec<&str> = Vec::new();
    for joint in 0..reader.joint_count() {
        let Some(name) = reader.joint_name(joint) else {
            continue;
        };
        if lookups.driver_bones.contains(name) {
            continue;
        }
        let start = joint as usize * ATTR_COUNT_PER_EULER_JOINT;
        let Some(values) = outputs.get(start..start + ATTR_COUNT_PER_EULER_JOINT) else {
            break;
        };
        let Some(rest) = rest_pose.get(name) else {
            missing.push(name);
            continue;
        };

        let mut location_delta = vector(&values[0..3]) / SCALE_FACTOR;
        if reader.joint_parent_index(joint).is_none() {
            // DNA Y-up to scene Z-up
            location_delta = Vector3::new(location_delta.x, -location_delta.z, location_delta.y);
        }
        let rotation_delta = vector(&values[3..6]).map(f64::to_radians);
        let scale_delta = vector(&values[6..9]);

        let location = rest.location + location_delta;
        let rotation = rest.rotation.to_euler() + rotation_delta;
        let scale = rest.scale + scale_delta;
        let basis = rest.rest_to_parent_inverse
            * loc_rot_scale(&location, &euler_to_quaternion(&rotation), &scale);

        if !sink.set_bone_basis(name, basis) {
            missing.push(name);
            continue;
        }
        if lookups.has_children(joint) {
            sink.set_bone_rotation_euler(name, rotation_delta);
        }
        applied += 1;
    }
    log.warn_missing("head_missing_bones", "bones", &missing);
    applied
}

/// Body joints: 10 floats per joint with quaternion rotations. Only RBF
/// driven, swing and twist bones are written and the root joint is left
/// alone. Returns the number of bones written.
pub fn apply_quaternion_joints(
    reader: &dyn DnaReader,
    outputs: &[f64],
    rest_pose: &RestPoseCache,
    lookups: &RigLookups,
    sink: &mut dyn SceneBoneSink,
    log: &mut LogOnce,
) -> usize {
    let mut applied = 0;
    let mut missing: Vec<&str> = Vec::new();
    for joint in 1..reader.joint_count() {
        let Some(name) = reader.joint_name(joint) else {
            continue;
        };
        if !lookups.is_body_output(name) {
            continue;
        }
        let start = joint as usize * ATTR_COUNT_PER_QUATERNION_JOINT;
        let Some(d) = outputs.get(start..start + ATTR_COUNT_PER_QUATERNION_JOINT) else {
            break;
        };
        let Some(rest) = rest_pose.get(name) else {
            missing.push(name);
            continue;
        };

        let location = rest.location + vector(&d[0..3]) / SCALE_FACTOR;
        let delta = Quaternion::new(d[6], d[3], d[4], d[5]);
        let delta = if delta.norm() > f64::EPSILON {
            UnitQuaternion::from_quaternion(delta)
        } else {
            UnitQuaternion::identity()
        };
        let rotation = rest.rotation.to_quaternion() * delta;
        let scale = rest.scale + vector(&d[7..10]);
        let basis = rest.rest_to_parent_inverse * loc_rot_scale(&location, &rotation, &scale);

        if sink.set_bone_basis(name, basis) {
            applied += 1;
        } else {
            missing.push(name);
        }
    }
    log.warn_missing("body_missing_bones", "bones", &missing);
    applied
}

/// Set every mapped shape key to its channel weight. Returns the
/// `(shape key, value)` pairs written.
pub fn apply_blend_shapes(
    outputs: &[f64],
    lookup: &ShapeKeyLookup,
    sink: &mut dyn SceneOutputSink,
    log: &mut LogOnce,
) -> Vec<(String, f64)> {
    let mut applied = Vec::new();
    let mut missing: Vec<&str> = Vec::new();
    for (channel, &value) in outputs.iter().enumerate() {
        for target in lookup.targets(channel as u16) {
            if sink.set_shape_key_value(&target.mesh, &target.key, value) {
                applied.push((target.key.clone(), value));
            } else if target.key.len() <= SHAPE_KEY_NAME_MAX_LENGTH {
                missing.push(&target.key);
            }
        }
    }
    log.warn_missing("head_missing_shape_keys", "shape keys", &missing);
    applied
}

/// Zero every mapped shape key except `selected`, which is set to 1.
pub fn solo_blend_shape(
    lookup: &ShapeKeyLookup,
    sink: &mut dyn SceneOutputSink,
    selected: Option<&str>,
) {
    for (_, target) in lookup.iter() {
        let value = if Some(target.key.as_str()) == selected {
            1.0
        } else {
            0.0
        };
        sink.set_shape_key_value(&target.mesh, &target.key, value);
    }
}

/// Mask slider driven by an animated map, e.g.
/// `"head_cm1_color.head_wm1_jawOpen"` -> `"wm1.head_wm1_jawOpen_msk"`.
pub fn mask_slider_name(animated_map: &str) -> Option<String> {
    let (prefix, _) = animated_map.split_once('.')?;
    let (_, attribute) = animated_map.rsplit_once('.')?;
    let map = prefix.split('_').nth(1)?.to_lowercase().replace("cm", "wm");
    Some(format!("{map}.{attribute}_msk"))
}

/// Write animated-map outputs to their mask sliders. Returns the
/// `(slider, value)` pairs written.
pub fn apply_texture_masks(
    reader: &dyn DnaReader,
    outputs: &[f64],
    sink: &mut dyn SceneOutputSink,
    log: &mut LogOnce,
) -> Vec<(String, f64)> {
    let mut applied = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for (index, &value) in outputs.iter().enumerate() {
        let Some(slider) = reader
            .animated_map_name(index as u16)
            .and_then(mask_slider_name)
        else {
            continue;
        };
        if sink.set_mask_value(&slider, value) {
            applied.push((slider, value));
        } else {
            missing.push(slider);
        }
    }
    log.warn_missing("head_missing_texture_masks", "texture mask sliders", &missing);
    applied
}
