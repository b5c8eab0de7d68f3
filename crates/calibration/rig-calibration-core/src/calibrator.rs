//! Calibration: write scene edits into an existing DNA while keeping every
//! value the scene did not change.
//!
//! Values are only overwritten when they moved by more than a threshold
//! (1e-6 for vertices and shape-key deltas, 1e-3 for bones), so repeated
//! calibration of an unchanged scene leaves the DNA bit-identical.

use hashbrown::HashMap;
use nalgebra::Vector3;

use rig_dna::{DataLayer, DnaReader, DnaWriter, UnknownLayerPolicy};
use rig_instance::Component;
use rig_logic::constants::{
    head_to_body_lod, BONE_DELTA_THRESHOLD, EXTRA_BONES, SHAPE_KEY_DELTA_THRESHOLD,
    SHAPE_KEY_NAME_MAX_LENGTH,
};
use rig_logic::math::{vector_from_f32, vector_to_f32, wrap_degrees};
use rig_logic::{scene_mesh_name, shape_key_name, ValidationReport};

use crate::error::CalibrationError;
use crate::options::CalibrationOptions;
use crate::scene::{component_label, CalibrationScene, ExportLods};
use crate::transforms::{
    dna_scale, scene_to_dna, shape_key_deltas, skin_weights, BoneTransforms, EdgeLoopMapping,
};
use crate::validation::validate_export;

/// Body data a head calibration copies from when aligning head and body.
pub struct BodyAlignment<'a> {
    pub reader: &'a dyn DnaReader,
    pub edge_loops: EdgeLoopMapping,
}

fn joint_lookup(reader: &dyn DnaReader) -> HashMap<&str, u16> {
    (0..reader.joint_count())
        .filter_map(|joint| reader.joint_name(joint).map(|name| (name, joint)))
        .collect()
}

fn joint_named(reader: &dyn DnaReader, name: &str) -> Option<u16> {
    (0..reader.joint_count()).find(|&joint| reader.joint_name(joint) == Some(name))
}

pub struct DnaCalibrator<'a> {
    instance: String,
    component: Component,
    reader: &'a dyn DnaReader,
    options: CalibrationOptions,
    body: Option<BodyAlignment<'a>>,
}

impl<'a> DnaCalibrator<'a> {
    /// `component` picks head or body conventions; [`Component::All`] is
    /// treated as the head.
    pub fn new(
        instance: impl Into<String>,
        component: Component,
        reader: &'a dyn DnaReader,
    ) -> Self {
        Self {
            instance: instance.into(),
            component,
            reader,
            options: CalibrationOptions::default(),
            body: None,
        }
    }

    pub fn with_options(mut self, options: CalibrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_body(mut self, body: Option<BodyAlignment<'a>>) -> Self {
        self.body = body;
        self
    }

    fn is_head(&self) -> bool {
        self.component.includes_head()
    }

    fn aligning(&self) -> Option<&BodyAlignment<'a>> {
        if self.is_head() && self.options.align_head_and_body {
            self.body.as_ref()
        } else {
            None
        }
    }

    /// Copy the source DNA into `writer`, apply the enabled stages and
    /// write. Validation failures come back as an invalid report with
    /// nothing written; a failed write is an error.
    pub fn run(
        &self,
        scene: &CalibrationScene<'_>,
        writer: &mut dyn DnaWriter,
    ) -> Result<ValidationReport, CalibrationError> {
        writer.set_from(self.reader, DataLayer::All, UnknownLayerPolicy::Preserve);
        let lods = ExportLods::collect(
            &self.instance,
            self.component,
            scene.meshes,
            self.options.meshes,
        );
        if self.options.run_validations {
            let report = validate_export(
                self.component,
                scene.rig(self.component),
                scene.meshes,
                &lods,
                self.options.meshes,
            );
            if !report.valid {
                return Ok(report);
            }
        }

        if self.options.meshes {
            self.calibrate_vertex_positions(scene, &lods, writer);
        }
        if self.options.shape_keys {
            self.calibrate_shape_keys(scene, writer)?;
        }
        if self.options.vertex_groups {
            self.calibrate_vertex_groups(scene, writer);
        }
        if self.options.bones {
            self.calibrate_bones(scene, writer);
        }

        let label = component_label(self.component);
        log::info!("saving calibrated {label} DNA of '{}'", self.instance);
        writer.write();
        writer
            .status()
            .check()
            .map_err(CalibrationError::from_status)?;
        Ok(ValidationReport::success(
            "Success",
            format!("Calibration of {label} successful."),
        ))
    }

    /// DNA positions of body vertices shared with head mesh `scene_name`,
    /// keyed by head vertex.
    fn body_vertex_lookup(
        &self,
        scene: &CalibrationScene<'_>,
        lod: u16,
        scene_name: &str,
        scale: f64,
    ) -> HashMap<u32, Vector3<f64>> {
        let mut lookup = HashMap::new();
        let Some(body) = self.aligning() else {
            return lookup;
        };
        if scene_name != scene_mesh_name(&self.instance, &format!("head_lod{lod}_mesh")) {
            return lookup;
        }
        let Some(body_lod) = head_to_body_lod(lod) else {
            return lookup;
        };
        let body_name = scene_mesh_name(&self.instance, &format!("body_lod{body_lod}_mesh"));
        let (Some(body_mesh), Some(pairs)) =
            (scene.meshes.mesh(&body_name), body.edge_loops.for_lod(lod))
        else {
            return lookup;
        };
        for (&head_vertex, &body_vertex) in pairs {
            match body_mesh.vertices.get(body_vertex as usize) {
                Some(position) => {
                    lookup.insert(head_vertex, scene_to_dna(position, scale));
                }
                None => {
                    log::warn!(
                        "head to body vertex mapping of LOD {lod} points at missing vertex {body_vertex} \
                         of '{body_name}'; a vertex on '{scene_name}' or '{body_name}' may have been deleted"
                    );
                    return HashMap::new();
                }
            }
        }
        lookup
    }

    fn calibrate_vertex_positions(
        &self,
        scene: &CalibrationScene<'_>,
        lods: &ExportLods,
        writer: &mut dyn DnaWriter,
    ) {
        let scale = dna_scale(self.reader);
        let by_name: HashMap<&str, u16> = (0..self.reader.mesh_count())
            .filter_map(|mesh| self.reader.mesh_name(mesh).map(|name| (name, mesh)))
            .collect();

        for (&lod, meshes) in &lods.lods {
            log::info!("calibrating LOD {lod} vertex positions");
            for export in meshes {
                let Some(&mesh_index) = by_name.get(export.dna_name.as_str()) else {
                    log::warn!(
                        "mesh '{}' is not in the DNA and will not be calibrated",
                        export.dna_name
                    );
                    continue;
                };
                let Some(mesh) = scene.meshes.mesh(&export.scene_name) else {
                    continue;
                };
                let body_lookup = self.body_vertex_lookup(scene, lod, &export.scene_name, scale);

                let mut positions = self.reader.vertex_positions(mesh_index).to_vec();
                if mesh.vertices.len() != positions.len() {
                    log::warn!(
                        "'{}' has {} vertices but the DNA has {}; unmatched vertices are left as they are",
                        export.scene_name,
                        mesh.vertices.len(),
                        positions.len()
                    );
                }
                let mut moved = 0usize;
                let pairs = positions.iter_mut().zip(&mesh.vertices);
                for (index, (slot, vertex)) in pairs.enumerate() {
                    let target = body_lookup
                        .get(&(index as u32))
                        .copied()
                        .unwrap_or_else(|| scene_to_dna(vertex, scale));
                    if (target - vector_from_f32(*slot)).norm() > SHAPE_KEY_DELTA_THRESHOLD {
                        *slot = vector_to_f32(&target);
                        moved += 1;
                    }
                }
                log::debug!("{moved} vertices moved on '{}'", export.dna_name);
                writer.set_vertex_positions(mesh_index, positions);
            }
        }
    }

    fn calibrate_shape_keys(
        &self,
        scene: &CalibrationScene<'_>,
        writer: &mut dyn DnaWriter,
    ) -> Result<(), CalibrationError> {
        if !self.is_head() {
            return Ok(());
        }
        let reader = self.reader;
        let linear_modifier = reader.translation_unit().linear_modifier();

        for lod in 0..reader.lod_count() {
            if reader.blend_shape_channel_indices_for_lod(lod).is_empty() {
                continue;
            }
            log::info!("calibrating shape keys of head LOD {lod}");
            for &mesh_index in reader.mesh_indices_for_lod(lod) {
                let Some(dna_mesh) = reader.mesh_name(mesh_index) else {
                    continue;
                };
                let scene_name = scene_mesh_name(&self.instance, dna_mesh);
                let Some(mesh) = scene.meshes.mesh(&scene_name) else {
                    log::error!("mesh '{scene_name}' not found for shape key calibration, skipping");
                    continue;
                };
                if mesh.shape_keys.is_empty() {
                    log::warn!("mesh '{scene_name}' has no shape keys, skipping shape key calibration");
                    continue;
                }
                let Some(basis) = mesh.basis() else {
                    return Err(CalibrationError::MissingBasisShape { mesh: scene_name });
                };

                let mut largest = 0usize;
                for target in 0..reader.blend_shape_target_count(mesh_index) {
                    let Some(channel) = reader
                        .blend_shape_channel_index(mesh_index, target)
                        .and_then(|channel| reader.blend_shape_channel_name(channel))
                    else {
                        continue;
                    };
                    let key_name = shape_key_name(dna_mesh, channel);
                    if key_name.len() > SHAPE_KEY_NAME_MAX_LENGTH {
                        log::warn!(
                            "shape key name '{key_name}' is longer than {SHAPE_KEY_NAME_MAX_LENGTH} \
                             characters, skipping"
                        );
                        continue;
                    }
                    let Some(key) = mesh.shape_key(&key_name) else {
                        log::error!("shape key '{key_name}' not found on '{scene_name}', skipping");
                        continue;
                    };
                    let (indices, deltas) =
                        shape_key_deltas(&basis.positions, &key.positions, linear_modifier);
                    largest = largest.max(indices.len());
                    writer.set_blend_shape_target_vertex_indices(mesh_index, target, indices);
                    writer.set_blend_shape_target_deltas(mesh_index, target, deltas);
                }
                log::debug!("largest shape key delta count on '{dna_mesh}': {largest}");
            }
        }
        Ok(())
    }

    fn calibrate_vertex_groups(&self, scene: &CalibrationScene<'_>, writer: &mut dyn DnaWriter) {
        let reader = self.reader;
        let joints = joint_lookup(reader);
        for lod in 0..reader.lod_count() {
            log::info!(
                "calibrating vertex groups of {} LOD {lod}",
                component_label(self.component)
            );
            for &mesh_index in reader.mesh_indices_for_lod(lod) {
                let Some(dna_mesh) = reader.mesh_name(mesh_index) else {
                    continue;
                };
                let scene_name = scene_mesh_name(&self.instance, dna_mesh);
                let Some(mesh) = scene.meshes.mesh(&scene_name) else {
                    log::warn!("mesh '{scene_name}' not found for vertex group calibration, skipping");
                    continue;
                };
                writer.clear_skin_weights(mesh_index);
                let weights = skin_weights(&mesh, |group| joints.get(group).copied(), false);
                for (vertex, (joint_indices, values)) in weights.into_iter().enumerate() {
                    writer.set_skin_weights_joint_indices(mesh_index, vertex as u32, joint_indices);
                    writer.set_skin_weights_values(mesh_index, vertex as u32, values);
                }
            }
        }
    }

    fn calibrate_bones(&self, scene: &CalibrationScene<'_>, writer: &mut dyn DnaWriter) {
        let label = component_label(self.component);
        let Some(rig) = scene.rig(self.component) else {
            log::warn!("no {label} rig in the scene, bone transforms are left unchanged");
            return;
        };
        let reader = self.reader;
        let scale = dna_scale(reader);
        let ignored: &[&str] = if self.is_head() { &EXTRA_BONES } else { &[] };
        let transforms = BoneTransforms::from_rig(rig, ignored, scale);

        let body = self.aligning();
        let body_scene = body
            .and(scene.body_rig)
            .map(|rig| BoneTransforms::from_rig(rig, &[], scale));

        let joints = joint_lookup(reader);
        let mut translations = reader.neutral_joint_translations().to_vec();
        let mut rotations = reader.neutral_joint_rotations().to_vec();

        for (index, name) in transforms.names.iter().enumerate() {
            let Some(&joint) = joints.get(name.as_str()) else {
                log::warn!("bone '{name}' is not in the {label} DNA, skipping");
                continue;
            };
            let mut translation = transforms.translations[index];
            let mut rotation = transforms.rotations[index];

            // shared bones take the body values, verbatim while the body
            // scene still matches the body DNA
            if let Some((body_translation, body_rotation)) =
                body_scene.as_ref().and_then(|bones| bones.get(name))
            {
                translation = body_translation;
                rotation = body_rotation;
                let body_joint =
                    body.and_then(|b| joint_named(b.reader, name).map(|j| (b.reader, j)));
                if let Some((body_reader, body_joint)) = body_joint {
                    if let Some(dna) = body_reader.neutral_joint_translation(body_joint) {
                        let dna = vector_from_f32(dna);
                        if (translation - dna).norm() <= BONE_DELTA_THRESHOLD {
                            translation = dna;
                        }
                    }
                    if let Some(dna) = body_reader.neutral_joint_rotation(body_joint) {
                        for axis in 0..3 {
                            let delta = wrap_degrees(rotation[axis] - dna[axis] as f64);
                            if delta.abs() <= BONE_DELTA_THRESHOLD {
                                rotation[axis] = dna[axis] as f64;
                            }
                        }
                    }
                }
            }

            let slot = joint as usize;
            if let Some(current) = translations.get_mut(slot) {
                if (translation - vector_from_f32(*current)).norm() > BONE_DELTA_THRESHOLD {
                    log::debug!("bone '{name}' translation updated");
                    *current = vector_to_f32(&translation);
                }
            }
            if let Some(current) = rotations.get_mut(slot) {
                for (axis, value) in current.iter_mut().enumerate() {
                    // 181 and -179 degrees are the same angle
                    if wrap_degrees(rotation[axis] - *value as f64).abs() > BONE_DELTA_THRESHOLD {
                        *value = rotation[axis] as f32;
                    }
                }
            }
        }
        writer.set_neutral_joint_translations(translations);
        writer.set_neutral_joint_rotations(rotations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;
    use rig_dna::{MemoryReader, MemoryWriter};
    use rig_logic::math::rotation_x;
    use rig_logic::{neutral_bind_pose, MemoryScene, SceneBoneSource};

    use crate::import::scene_mesh_from_dna;

    fn body() -> MemoryReader {
        MemoryReader::new(rig_test_fixtures::dna::load("body_rbf").expect("body fixture"))
    }

    #[test]
    fn rotation_deltas_wrap_before_comparing() {
        let reader = body();
        let mut rig = neutral_bind_pose(&reader);
        let scene_mesh = scene_mesh_from_dna(&reader, "ada", 0).unwrap();
        let mut meshes = MemoryScene::new();
        meshes.add_mesh(scene_mesh);

        let mut asset = reader.asset().clone();
        asset.definition.neutral_joint_rotations[3] = [181.0, 0.0, 0.0];
        asset.definition.neutral_joint_rotations[4] = [0.0, 90.0, 0.0];
        let edited = MemoryReader::new(asset);
        // the scene keeps every rotation at zero except upperarm_twist_01_l at -179
        let arm = rig.bone("upperarm_l").unwrap().rest_matrix;
        let twisted = arm
            * Matrix4::new_translation(&Vector3::new(0.1, 0.0, 0.0))
            * rotation_x((-179f64).to_radians());
        assert!(rig.set_rest_matrix("upperarm_twist_01_l", twisted));

        let scene = CalibrationScene::new(&meshes).with_body_rig(&rig);
        let mut writer = MemoryWriter::new();
        let report = DnaCalibrator::new("ada", Component::Body, &edited)
            .run(&scene, &mut writer)
            .unwrap();
        assert!(report.valid, "{}", report.message);
        assert_eq!(report.message, "Calibration of body successful.");

        let rotations = &writer.written().unwrap().definition.neutral_joint_rotations;
        assert_eq!(rotations[3], [181.0, 0.0, 0.0], "181 vs -179 is no change");
        assert!(rotations[4][1].abs() < 1e-6, "90 degree change is written");
    }
}
