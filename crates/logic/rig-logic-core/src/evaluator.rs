//! Behavior evaluation.
//!
//! [`RigLogic`] is the compiled, immutable behavior of one DNA asset.
//! [`RigState`] holds the mutable per-rig inputs and outputs. Evaluation runs
//! in a fixed order: GUI to raw mapping, PSDs, joint matrices, RBF solvers,
//! twist/swing, blend shapes, animated maps.
//!
//! Joint behavior tables always address Euler outputs
//! (`joint * 9 + attribute`, rotations in degrees). Quaternion rigs convert
//! those into the 10-attribute layout `[tx, ty, tz, qx, qy, qz, qw, sx, sy, sz]`
//! before RBF and twist/swing rotations are composed in.

use hashbrown::HashSet;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use rig_dna::{Behavior, ConditionalTable, DnaReader, RotationRepresentation, SwingTwistSetup};

use crate::constants::{ATTR_COUNT_PER_EULER_JOINT, SCALE_FACTOR};
use crate::error::RigLogicError;
use crate::math::{euler_to_quaternion, quaternion_to_euler};
use crate::rbf::{
    blend_driven, calculate_partial_rotations, pose_weights, solvers_from_reader, PartialRotation,
    RbfSolver,
};

/// Lifecycle of one rig component.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EvaluatorPhase {
    #[default]
    Uninitialized,
    Initialized,
    Evaluating,
}

#[inline]
fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[derive(Clone, Debug)]
pub struct RigLogic {
    name: String,
    lod_count: u16,
    representation: RotationRepresentation,
    gui_count: usize,
    raw_count: usize,
    joint_count: usize,
    blend_shape_count: usize,
    animated_map_count: usize,
    behavior: Behavior,
    rbf_solvers: Vec<RbfSolver>,
    twists: Vec<SwingTwistSetup>,
    swings: Vec<SwingTwistSetup>,
}

fn check_table(
    name: &str,
    table: &ConditionalTable,
    input_count: usize,
    output_count: usize,
) -> Result<(), RigLogicError> {
    let len = table.len();
    let lengths = [
        table.output_indices.len(),
        table.from_values.len(),
        table.to_values.len(),
        table.slope_values.len(),
        table.cut_values.len(),
    ];
    if lengths.iter().any(|&l| l != len) {
        return Err(RigLogicError::InvalidBehavior {
            reason: format!("{name}: conditional table columns have different lengths"),
        });
    }
    if let Some(i) = table.input_indices.iter().find(|&&i| i as usize >= input_count) {
        return Err(RigLogicError::InvalidBehavior {
            reason: format!("{name}: input index {i} out of range ({input_count})"),
        });
    }
    if let Some(o) = table.output_indices.iter().find(|&&o| o as usize >= output_count) {
        return Err(RigLogicError::InvalidBehavior {
            reason: format!("{name}: output index {o} out of range ({output_count})"),
        });
    }
    Ok(())
}

impl RigLogic {
    /// Compile the behavior of `reader`, validating table shapes.
    pub fn from_reader(reader: &dyn DnaReader) -> Result<Self, RigLogicError> {
        let behavior = reader.behavior().clone();
        let gui_count = reader.gui_control_count() as usize;
        let raw_count = reader.raw_control_count() as usize;
        let slot_count = raw_count + behavior.psds.count as usize;
        let joint_count = reader.joint_count() as usize;
        let blend_shape_count = reader.blend_shape_channel_count() as usize;
        let animated_map_count = reader.animated_map_count() as usize;

        check_table("gui_to_raw", &behavior.gui_to_raw, gui_count, slot_count)?;
        check_table(
            "animated_maps",
            &behavior.animated_maps.conditionals,
            slot_count,
            animated_map_count,
        )?;

        let psds = &behavior.psds;
        if psds.rows.len() != psds.values.len() || psds.columns.len() != psds.values.len() {
            return Err(RigLogicError::InvalidBehavior {
                reason: "psds: rows, columns and values have different lengths".into(),
            });
        }
        if psds
            .rows
            .iter()
            .chain(&psds.columns)
            .any(|&i| i as usize >= slot_count)
        {
            return Err(RigLogicError::InvalidBehavior {
                reason: format!("psds: index out of range ({slot_count})"),
            });
        }

        let joint_attrs = joint_count * ATTR_COUNT_PER_EULER_JOINT;
        for (g, group) in behavior.joints.groups.iter().enumerate() {
            if group.values.len() != group.input_indices.len() * group.output_indices.len() {
                return Err(RigLogicError::InvalidBehavior {
                    reason: format!(
                        "joint group {g}: {} values for a {}x{} matrix",
                        group.values.len(),
                        group.output_indices.len(),
                        group.input_indices.len()
                    ),
                });
            }
            if group.input_indices.iter().any(|&i| i as usize >= slot_count)
                || group.output_indices.iter().any(|&o| o as usize >= joint_attrs)
            {
                return Err(RigLogicError::InvalidBehavior {
                    reason: format!("joint group {g}: index out of range"),
                });
            }
        }

        let blend_shapes = &behavior.blend_shapes;
        if blend_shapes.input_indices.len() != blend_shapes.output_indices.len()
            || blend_shapes
                .input_indices
                .iter()
                .any(|&i| i as usize >= slot_count)
            || blend_shapes
                .output_indices
                .iter()
                .any(|&o| o as usize >= blend_shape_count)
        {
            return Err(RigLogicError::InvalidBehavior {
                reason: "blend shapes: mapping out of range".into(),
            });
        }

        let rig = Self {
            name: reader.name().to_string(),
            lod_count: reader.lod_count().max(1),
            representation: behavior.rotation_representation,
            gui_count,
            raw_count,
            joint_count,
            blend_shape_count,
            animated_map_count,
            rbf_solvers: solvers_from_reader(reader),
            twists: reader.asset().twist_swing.twists.clone(),
            swings: reader.asset().twist_swing.swings.clone(),
            behavior,
        };
        log::debug!(
            "compiled rig logic '{}': {} joints, {} blend shapes, {} animated maps, {} rbf solvers",
            rig.name,
            rig.joint_count,
            rig.blend_shape_count,
            rig.animated_map_count,
            rig.rbf_solvers.len()
        );
        Ok(rig)
    }

    /// Override the joint output layout.
    pub fn with_rotation_representation(mut self, representation: RotationRepresentation) -> Self {
        self.representation = representation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lod_count(&self) -> u16 {
        self.lod_count
    }

    pub fn rotation_representation(&self) -> RotationRepresentation {
        self.representation
    }

    pub fn attributes_per_joint(&self) -> usize {
        self.representation.attributes_per_joint()
    }

    pub fn gui_control_count(&self) -> usize {
        self.gui_count
    }

    pub fn raw_control_count(&self) -> usize {
        self.raw_count
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    pub fn blend_shape_channel_count(&self) -> usize {
        self.blend_shape_count
    }

    pub fn animated_map_count(&self) -> usize {
        self.animated_map_count
    }

    pub fn rbf_solvers(&self) -> &[RbfSolver] {
        &self.rbf_solvers
    }

    /// Replace the solver set, e.g. while an editing session previews changes.
    pub fn set_rbf_solvers(&mut self, solvers: Vec<RbfSolver>) {
        self.rbf_solvers = solvers;
    }

    /// Run the GUI to raw conditional table.
    pub fn map_gui_to_raw(&self, state: &mut RigState) {
        let table = &self.behavior.gui_to_raw;
        let touched: HashSet<u16> = table.output_indices.iter().copied().collect();
        for &slot in &touched {
            state.raw[slot as usize] = 0.0;
        }
        apply_conditionals(table, &state.gui, &mut state.raw, table.len());
    }

    pub fn calculate(&self, state: &mut RigState) {
        let lod = state.lod as usize;
        self.calculate_psds(state);
        self.calculate_joints(state, lod);
        if self.representation == RotationRepresentation::Quaternion {
            state.convert_to_quaternions();
        }
        self.calculate_rbf(state);
        self.calculate_twist_swing(state);
        self.calculate_blend_shapes(state, lod);
        self.calculate_animated_maps(state, lod);
    }

    /// Set the LOD, map GUI controls and calculate.
    pub fn evaluate(&self, state: &mut RigState, lod: u16) {
        state.set_lod(lod);
        self.map_gui_to_raw(state);
        self.calculate(state);
    }

    fn calculate_psds(&self, state: &mut RigState) {
        let psds = &self.behavior.psds;
        let mut products: Vec<Option<f64>> = vec![None; state.raw.len()];
        for ((&row, &column), &weight) in psds.rows.iter().zip(&psds.columns).zip(&psds.values) {
            let factor = clamp01(state.raw[column as usize] * weight as f64);
            let slot = &mut products[row as usize];
            *slot = Some(slot.unwrap_or(1.0) * factor);
        }
        for (slot, product) in products.into_iter().enumerate() {
            if let Some(product) = product {
                state.raw[slot] = clamp01(product);
            }
        }
    }

    fn calculate_joints(&self, state: &mut RigState, lod: usize) {
        state.euler_outputs.iter_mut().for_each(|v| *v = 0.0);
        for group in &self.behavior.joints.groups {
            let inputs = group.input_indices.len();
            let rows = group
                .lods
                .get(lod)
                .map(|&r| r as usize)
                .unwrap_or(group.output_indices.len())
                .min(group.output_indices.len());
            for row in 0..rows {
                let coefficients = &group.values[row * inputs..(row + 1) * inputs];
                let sum: f64 = coefficients
                    .iter()
                    .zip(&group.input_indices)
                    .map(|(&c, &input)| c as f64 * state.raw[input as usize])
                    .sum();
                state.euler_outputs[group.output_indices[row] as usize] += sum;
            }
        }
        if self.representation == RotationRepresentation::EulerAngles {
            state.joint_outputs.copy_from_slice(&state.euler_outputs);
        }
    }

    fn driver_quaternion(state: &RigState, indices: &[u16]) -> Option<UnitQuaternion<f64>> {
        if indices.len() < 4 {
            return None;
        }
        let value = |i: usize| state.raw.get(indices[i] as usize).copied();
        let q = Quaternion::new(value(3)?, value(0)?, value(1)?, value(2)?);
        (q.norm() > f64::EPSILON).then(|| UnitQuaternion::from_quaternion(q))
    }

    fn calculate_rbf(&self, state: &mut RigState) {
        state.rbf_pose_weights.clear();
        for solver in &self.rbf_solvers {
            let Some(driver) = Self::driver_quaternion(state, &solver.raw_control_indices) else {
                state.rbf_pose_weights.push(Vec::new());
                continue;
            };
            let weights = pose_weights(solver, &driver);
            for driven in blend_driven(solver, &weights) {
                if driven.joint_index < 0 || driven.joint_index as usize >= self.joint_count {
                    continue;
                }
                let joint = driven.joint_index as usize;
                state.add_translation(joint, &(driven.location * SCALE_FACTOR));
                state.compose_rotation(joint, &driven.rotation);
                state.add_scale(joint, &driven.scale);
            }
            state.rbf_pose_weights.push(weights);
        }
    }

    fn calculate_twist_swing(&self, state: &mut RigState) {
        let setups = self
            .twists
            .iter()
            .map(|s| (s, PartialRotation::Twist))
            .chain(self.swings.iter().map(|s| (s, PartialRotation::Swing)));
        for (setup, kind) in setups {
            let Some(driver) = Self::driver_quaternion(state, &setup.input_control_indices) else {
                continue;
            };
            for output in calculate_partial_rotations(setup, kind, &driver) {
                if (output.joint_index as usize) < self.joint_count {
                    state.compose_rotation(output.joint_index as usize, &output.rotation);
                }
            }
        }
    }

    fn calculate_blend_shapes(&self, state: &mut RigState, lod: usize) {
        state.blend_shape_outputs.iter_mut().for_each(|v| *v = 0.0);
        let mapping = &self.behavior.blend_shapes;
        let rows = mapping
            .lods
            .get(lod)
            .map(|&r| r as usize)
            .unwrap_or(mapping.output_indices.len())
            .min(mapping.output_indices.len());
        for i in 0..rows {
            state.blend_shape_outputs[mapping.output_indices[i] as usize] =
                state.raw[mapping.input_indices[i] as usize];
        }
    }

    fn calculate_animated_maps(&self, state: &mut RigState, lod: usize) {
        state.animated_map_outputs.iter_mut().for_each(|v| *v = 0.0);
        let maps = &self.behavior.animated_maps;
        let rows = maps
            .lods
            .get(lod)
            .map(|&r| r as usize)
            .unwrap_or(maps.conditionals.len())
            .min(maps.conditionals.len());
        apply_conditionals(
            &maps.conditionals,
            &state.raw,
            &mut state.animated_map_outputs,
            rows,
        );
        state
            .animated_map_outputs
            .iter_mut()
            .for_each(|v| *v = clamp01(*v));
    }
}

/// Evaluate the first `rows` rows of a conditional table. A row adds
/// `slope * x + cut` when `from <= x <= to`. When `x` sits on a boundary
/// shared with an earlier row of the same (input, output) pair, only the
/// earlier row fires.
fn apply_conditionals(table: &ConditionalTable, inputs: &[f64], outputs: &mut [f64], rows: usize) {
    let mut fired: HashSet<(u16, u16)> = HashSet::new();
    for row in 0..rows.min(table.len()) {
        let input = table.input_indices[row];
        let output = table.output_indices[row];
        let x = inputs[input as usize];
        let from = table.from_values[row] as f64;
        let to = table.to_values[row] as f64;
        if x < from || x > to {
            continue;
        }
        let on_boundary = x == from || x == to;
        if on_boundary && fired.contains(&(input, output)) {
            continue;
        }
        fired.insert((input, output));
        outputs[output as usize] += table.slope_values[row] as f64 * x + table.cut_values[row] as f64;
    }
}

/// Mutable inputs and outputs of one rig.
#[derive(Clone, Debug)]
pub struct RigState {
    gui: Vec<f64>,
    /// Raw controls followed by PSD slots.
    raw: Vec<f64>,
    raw_count: usize,
    lod: u16,
    lod_count: u16,
    representation: RotationRepresentation,
    euler_outputs: Vec<f64>,
    joint_outputs: Vec<f64>,
    blend_shape_outputs: Vec<f64>,
    animated_map_outputs: Vec<f64>,
    rbf_pose_weights: Vec<Vec<f64>>,
}

impl RigState {
    pub fn new(rig: &RigLogic) -> Self {
        let slots = rig.raw_count + rig.behavior.psds.count as usize;
        let mut state = Self {
            gui: vec![0.0; rig.gui_count],
            raw: vec![0.0; slots],
            raw_count: rig.raw_count,
            lod: 0,
            lod_count: rig.lod_count,
            representation: rig.representation,
            euler_outputs: vec![0.0; rig.joint_count * ATTR_COUNT_PER_EULER_JOINT],
            joint_outputs: vec![0.0; rig.joint_count * rig.attributes_per_joint()],
            blend_shape_outputs: vec![0.0; rig.blend_shape_count],
            animated_map_outputs: vec![0.0; rig.animated_map_count],
            rbf_pose_weights: Vec::new(),
        };
        state.reset_joint_outputs();
        state
    }

    fn reset_joint_outputs(&mut self) {
        self.joint_outputs.iter_mut().for_each(|v| *v = 0.0);
        if self.representation == RotationRepresentation::Quaternion {
            for joint in self.joint_outputs.chunks_mut(10) {
                joint[6] = 1.0;
            }
        }
    }

    pub fn set_gui_control(&mut self, index: u16, value: f64) -> Result<(), RigLogicError> {
        let slot = self
            .gui
            .get_mut(index as usize)
            .ok_or_else(|| RigLogicError::UnknownControl {
                name: format!("gui[{index}]"),
            })?;
        *slot = value;
        Ok(())
    }

    pub fn gui_control(&self, index: u16) -> Option<f64> {
        self.gui.get(index as usize).copied()
    }

    pub fn gui_controls(&self) -> &[f64] {
        &self.gui
    }

    pub fn set_raw_control(&mut self, index: u16, value: f64) -> Result<(), RigLogicError> {
        if index as usize >= self.raw_count {
            return Err(RigLogicError::UnknownControl {
                name: format!("raw[{index}]"),
            });
        }
        self.raw[index as usize] = value;
        Ok(())
    }

    pub fn raw_control(&self, index: u16) -> Option<f64> {
        self.raw[..self.raw_count].get(index as usize).copied()
    }

    pub fn raw_controls(&self) -> &[f64] {
        &self.raw[..self.raw_count]
    }

    /// PSD outputs of the last calculation.
    pub fn psd_values(&self) -> &[f64] {
        &self.raw[self.raw_count..]
    }

    /// Set the LOD, clamped to `lod_count - 1`. Returns the LOD in effect.
    pub fn set_lod(&mut self, lod: u16) -> u16 {
        let max = self.lod_count.saturating_sub(1);
        if lod > max {
            log::warn!("LOD {lod} is out of range, using LOD {max}");
        }
        self.lod = lod.min(max);
        self.lod
    }

    pub fn lod(&self) -> u16 {
        self.lod
    }

    pub fn joint_outputs(&self) -> &[f64] {
        &self.joint_outputs
    }

    pub fn blend_shape_outputs(&self) -> &[f64] {
        &self.blend_shape_outputs
    }

    pub fn animated_map_outputs(&self) -> &[f64] {
        &self.animated_map_outputs
    }

    /// Pose weights of each RBF solver from the last calculation.
    pub fn rbf_pose_weights(&self, solver: usize) -> &[f64] {
        self.rbf_pose_weights
            .get(solver)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn convert_to_quaternions(&mut self) {
        for (euler, out) in self
            .euler_outputs
            .chunks(ATTR_COUNT_PER_EULER_JOINT)
            .zip(self.joint_outputs.chunks_mut(10))
        {
            let rotation = euler_to_quaternion(&Vector3::new(
                euler[3].to_radians(),
                euler[4].to_radians(),
                euler[5].to_radians(),
            ));
            out[..3].copy_from_slice(&euler[..3]);
            out[3] = rotation.i;
            out[4] = rotation.j;
            out[5] = rotation.k;
            out[6] = rotation.w;
            out[7..10].copy_from_slice(&euler[6..9]);
        }
    }

    fn joint_slice(&mut self, joint: usize) -> &mut [f64] {
        let stride = self.representation.attributes_per_joint();
        &mut self.joint_outputs[joint * stride..(joint + 1) * stride]
    }

    fn add_translation(&mut self, joint: usize, delta: &Vector3<f64>) {
        let out = self.joint_slice(joint);
        for (slot, d) in out[..3].iter_mut().zip(delta.iter()) {
            *slot += d;
        }
    }

    fn add_scale(&mut self, joint: usize, delta: &Vector3<f64>) {
        let quaternion = self.representation == RotationRepresentation::Quaternion;
        let out = self.joint_slice(joint);
        let start = if quaternion { 7 } else { 6 };
        for (slot, d) in out[start..start + 3].iter_mut().zip(delta.iter()) {
            *slot += d;
        }
    }

    /// Compose `delta` after the joint's current rotation output.
    fn compose_rotation(&mut self, joint: usize, delta: &UnitQuaternion<f64>) {
        match self.representation {
            RotationRepresentation::Quaternion => {
                let out = self.joint_slice(joint);
                let current = UnitQuaternion::from_quaternion(Quaternion::new(
                    out[6], out[3], out[4], out[5],
                ));
                let rotation = current * delta;
                out[3] = rotation.i;
                out[4] = rotation.j;
                out[5] = rotation.k;
                out[6] = rotation.w;
            }
            RotationRepresentation::EulerAngles => {
                let out = self.joint_slice(joint);
                let current = euler_to_quaternion(&Vector3::new(
                    out[3].to_radians(),
                    out[4].to_radians(),
                    out[5].to_radians(),
                ));
                let euler = quaternion_to_euler(&(current * delta));
                out[3] = euler.x.to_degrees();
                out[4] = euler.y.to_degrees();
                out[5] = euler.z.to_degrees();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rig_dna::MemoryReader;

    fn reader(json: &str) -> MemoryReader {
        MemoryReader::from_json_str(json).unwrap()
    }

    fn conditional_rig() -> MemoryReader {
        reader(
            r#"{
                "descriptor": { "lod_count": 2 },
                "definition": {
                    "gui_control_names": ["CTRL_L_brow_raiseIn.ty"],
                    "raw_control_names": ["CTRL_expressions.browRaiseInL"]
                },
                "behavior": {
                    "gui_to_raw": {
                        "input_indices": [0, 0],
                        "output_indices": [0, 0],
                        "from_values": [-1.0, 0.0],
                        "to_values": [0.0, 1.0],
                        "slope_values": [-1.0, 2.0],
                        "cut_values": [0.0, 0.5]
                    }
                }
            }"#,
        )
    }

    #[test]
    fn shared_boundary_fires_first_row_only() {
        let rig = RigLogic::from_reader(&conditional_rig()).unwrap();
        let mut state = RigState::new(&rig);

        state.set_gui_control(0, 0.0).unwrap();
        rig.map_gui_to_raw(&mut state);
        assert_relative_eq!(state.raw_control(0).unwrap(), 0.0);

        state.set_gui_control(0, 0.5).unwrap();
        rig.map_gui_to_raw(&mut state);
        assert_relative_eq!(state.raw_control(0).unwrap(), 1.5);

        state.set_gui_control(0, -0.5).unwrap();
        rig.map_gui_to_raw(&mut state);
        assert_relative_eq!(state.raw_control(0).unwrap(), 0.5);
    }

    #[test]
    fn lod_is_clamped_to_last_lod() {
        let rig = RigLogic::from_reader(&conditional_rig()).unwrap();
        let mut state = RigState::new(&rig);
        assert_eq!(state.set_lod(5), 1);
        assert_eq!(state.lod(), 1);
    }

    #[test]
    fn unknown_controls_are_errors() {
        let rig = RigLogic::from_reader(&conditional_rig()).unwrap();
        let mut state = RigState::new(&rig);
        assert!(matches!(
            state.set_raw_control(3, 1.0),
            Err(RigLogicError::UnknownControl { .. })
        ));
    }

    fn psd_rig() -> MemoryReader {
        reader(
            r#"{
                "definition": {
                    "raw_control_names": ["CTRL_expressions.jawOpen", "CTRL_expressions.mouthLeft"],
                    "blend_shape_channel_names": ["jaw_open", "jaw_open_mouth_left"]
                },
                "behavior": {
                    "psds": { "count": 1, "rows": [2, 2], "columns": [0, 1], "values": [1.0, 2.0] },
                    "blend_shapes": { "lods": [2], "input_indices": [0, 2], "output_indices": [0, 1] }
                }
            }"#,
        )
    }

    #[test]
    fn psd_is_clamped_product_of_inputs() {
        let rig = RigLogic::from_reader(&psd_rig()).unwrap();
        let mut state = RigState::new(&rig);
        state.set_raw_control(0, 0.5).unwrap();
        state.set_raw_control(1, 0.25).unwrap();
        rig.calculate(&mut state);
        assert_relative_eq!(state.psd_values()[0], 0.25);
        assert_relative_eq!(state.blend_shape_outputs()[1], 0.25);
        assert_relative_eq!(state.blend_shape_outputs()[0], 0.5);

        state.set_raw_control(1, 3.0).unwrap();
        rig.calculate(&mut state);
        assert_relative_eq!(state.psd_values()[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn malformed_joint_group_is_rejected() {
        let bad = reader(
            r#"{
                "definition": { "raw_control_names": ["a.qx"], "joint_names": ["a"], "joint_hierarchy": [0] },
                "behavior": { "joints": { "groups": [
                    { "input_indices": [0], "output_indices": [3, 4], "values": [1.0] }
                ] } }
            }"#,
        );
        assert!(matches!(
            RigLogic::from_reader(&bad),
            Err(RigLogicError::InvalidBehavior { .. })
        ));
    }

    fn joint_rig(representation: &str) -> MemoryReader {
        reader(&format!(
            r#"{{
                "descriptor": {{ "lod_count": 2 }},
                "definition": {{
                    "raw_control_names": ["ctrl.qx"],
                    "joint_names": ["jaw"],
                    "joint_hierarchy": [0]
                }},
                "behavior": {{
                    "rotation_representation": "{representation}",
                    "joints": {{ "groups": [
                        {{ "lods": [2, 1], "input_indices": [0], "output_indices": [3, 0],
                           "values": [90.0, 4.0], "joint_indices": [0] }}
                    ] }}
                }}
            }}"#
        ))
    }

    #[test]
    fn joint_rows_are_gated_by_lod() {
        let rig = RigLogic::from_reader(&joint_rig("EulerAngles")).unwrap();
        let mut state = RigState::new(&rig);
        state.set_raw_control(0, 0.5).unwrap();

        rig.evaluate(&mut state, 0);
        assert_relative_eq!(state.joint_outputs()[3], 45.0);
        assert_relative_eq!(state.joint_outputs()[0], 2.0);

        rig.evaluate(&mut state, 1);
        assert_relative_eq!(state.joint_outputs()[3], 45.0);
        assert_relative_eq!(state.joint_outputs()[0], 0.0, epsilon = 0.0);
    }

    #[test]
    fn quaternion_rigs_emit_ten_attributes() {
        let rig = RigLogic::from_reader(&joint_rig("Quaternion")).unwrap();
        let mut state = RigState::new(&rig);
        assert_eq!(state.joint_outputs().len(), 10);
        assert_relative_eq!(state.joint_outputs()[6], 1.0);

        state.set_raw_control(0, 0.5).unwrap();
        rig.evaluate(&mut state, 0);
        let out = state.joint_outputs();
        let half = 22.5f64.to_radians();
        assert_relative_eq!(out[3], half.sin(), epsilon = 1e-12);
        assert_relative_eq!(out[6], half.cos(), epsilon = 1e-12);
        assert_relative_eq!(out[0], 2.0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rig = RigLogic::from_reader(&joint_rig("Quaternion")).unwrap();
        let mut a = RigState::new(&rig);
        let mut b = RigState::new(&rig);
        for state in [&mut a, &mut b] {
            state.set_raw_control(0, 0.3).unwrap();
            rig.evaluate(state, 0);
        }
        assert_eq!(a.joint_outputs(), b.joint_outputs());
    }
}
