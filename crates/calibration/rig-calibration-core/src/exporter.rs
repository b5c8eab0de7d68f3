//! Full export: joints, meshes and LOD mappings are rebuilt from the scene.
//! Behavior, RBF and other layers are carried over from the source DNA.

use hashbrown::HashMap;
use nalgebra::Vector3;

use rig_dna::{DataLayer, DnaReader, DnaWriter, UnknownLayerPolicy, VertexLayout};
use rig_instance::Component;
use rig_logic::constants::EXTRA_BONES;
use rig_logic::math::vector_to_f32;
use rig_logic::{SceneMesh, ValidationReport};

use crate::error::CalibrationError;
use crate::options::CalibrationOptions;
use crate::scene::{component_label, CalibrationScene, ExportLods};
use crate::transforms::{
    dna_scale, scene_to_dna, skin_weights, z_up_to_y_up_vector, BoneTransforms,
};
use crate::validation::validate_export;

pub struct DnaExporter<'a> {
    instance: String,
    component: Component,
    reader: &'a dyn DnaReader,
    options: CalibrationOptions,
}

impl<'a> DnaExporter<'a> {
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
        }
    }

    pub fn with_options(mut self, options: CalibrationOptions) -> Self {
        self.options = options;
        self
    }

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
        let rig = scene.rig(self.component);
        let checked = validate_export(
            self.component,
            rig,
            scene.meshes,
            &lods,
            self.options.meshes,
        );
        if self.options.run_validations && !checked.valid {
            return Ok(checked);
        }
        // joints cannot be rebuilt without a rig, validations or not
        let Some(rig) = rig else {
            return Ok(checked);
        };

        writer.clear_mesh_names();
        writer.clear_mesh_indices();
        writer.clear_lod_mesh_mappings();
        writer.clear_meshes();
        writer.clear_joint_names();
        writer.clear_joint_indices();
        writer.clear_lod_joint_mappings();

        let scale = dna_scale(self.reader);
        let ignored: &[&str] = if self.component.includes_head() {
            &EXTRA_BONES
        } else {
            &[]
        };
        let bones = BoneTransforms::from_rig(rig, ignored, scale);
        let joints = self.write_joints(&bones, writer);
        let joint_indices: Vec<u16> = (0..bones.len() as u16).collect();

        for (&lod, meshes) in &lods.lods {
            writer.set_joint_indices(lod, joint_indices.clone());
            writer.set_lod_joint_mapping(lod, lod);
            writer.set_mesh_indices(lod, meshes.iter().map(|m| m.mesh_index).collect());
            writer.set_lod_mesh_mapping(lod, lod);

            for export in meshes {
                log::info!(
                    "exporting mesh '{}' to DNA as '{}'",
                    export.scene_name,
                    export.dna_name
                );
                let index = export.mesh_index;
                writer.clear_face_vertex_layout_indices(index);
                writer.clear_skin_weights(index);
                writer.clear_blend_shape_targets(index);
                writer.set_mesh_name(index, &export.dna_name);

                let Some(mesh) = scene.meshes.mesh(&export.scene_name) else {
                    log::warn!("mesh '{}' has no data in the scene", export.scene_name);
                    continue;
                };
                write_geometry(writer, index, &mesh, scale);
                if self.options.vertex_groups {
                    let weights = skin_weights(&mesh, |group| joints.get(group).copied(), true);
                    for (vertex, (joint_indices, values)) in weights.into_iter().enumerate() {
                        writer.set_skin_weights_joint_indices(index, vertex as u32, joint_indices);
                        writer.set_skin_weights_values(index, vertex as u32, values);
                    }
                }
            }
        }

        log::info!(
            "saving exported {} DNA of '{}'",
            component_label(self.component),
            self.instance
        );
        writer.write();
        writer
            .status()
            .check()
            .map_err(CalibrationError::from_status)?;
        Ok(ValidationReport::success("Success", "Export successful."))
    }

    /// Names, hierarchy and neutral transforms. Rotations of joints past the
    /// exported ones keep their source values.
    fn write_joints(
        &self,
        bones: &BoneTransforms,
        writer: &mut dyn DnaWriter,
    ) -> HashMap<String, u16> {
        let mut joints = HashMap::with_capacity(bones.len());
        let mut rotations = self.reader.neutral_joint_rotations().to_vec();
        if rotations.len() < bones.len() {
            rotations.resize(bones.len(), [0.0; 3]);
        }
        for (index, name) in bones.names.iter().enumerate() {
            writer.set_joint_name(index as u16, name);
            joints.insert(name.clone(), index as u16);
            rotations[index] = vector_to_f32(&bones.rotations[index]);
        }
        writer.set_joint_hierarchy(bones.hierarchy.clone());
        let translations = bones.translations.iter().map(vector_to_f32).collect();
        writer.set_neutral_joint_translations(translations);
        writer.set_neutral_joint_rotations(rotations);
        joints
    }
}

/// Positions, normals, UVs, one vertex layout per face corner and the faces.
fn write_geometry(writer: &mut dyn DnaWriter, index: u16, mesh: &SceneMesh, scale: f64) {
    let positions = mesh
        .vertices
        .iter()
        .map(|vertex| vector_to_f32(&scene_to_dna(vertex, scale)))
        .collect();
    let normals = mesh
        .normals
        .iter()
        .map(|normal| vector_to_f32(&z_up_to_y_up_vector(&Vector3::from(*normal))))
        .collect();
    let uvs: Vec<[f32; 2]> = mesh
        .uvs
        .iter()
        .flatten()
        .map(|uv| [uv[0] as f32, uv[1] as f32])
        .collect();

    let mut layouts = Vec::new();
    let mut corner = 0u32;
    for (face_index, face) in mesh.faces.iter().enumerate() {
        let mut face_layouts = Vec::with_capacity(face.len());
        for &vertex in face {
            let texture_coordinate = if (corner as usize) < uvs.len() { corner } else { 0 };
            face_layouts.push(layouts.len() as u32);
            layouts.push(VertexLayout {
                position: vertex,
                texture_coordinate,
                normal: vertex,
            });
            corner += 1;
        }
        writer.set_face_vertex_layout_indices(index, face_index as u32, face_layouts);
    }

    writer.set_vertex_layouts(index, layouts);
    writer.set_vertex_positions(index, positions);
    writer.set_vertex_normals(index, normals);
    writer.set_vertex_texture_coordinates(index, uvs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_dna::{MemoryReader, MemoryWriter};
    use rig_logic::{neutral_bind_pose, MemoryScene};

    use crate::import::scene_mesh_from_dna;

    #[test]
    fn missing_rig_is_reported_even_without_validations() {
        let reader = MemoryReader::new(rig_test_fixtures::dna::load("body_rbf").unwrap());
        let meshes = MemoryScene::new();
        let scene = CalibrationScene::new(&meshes);
        let mut writer = MemoryWriter::new();
        let exporter = DnaExporter::new("ada", Component::Body, &reader).with_options(
            CalibrationOptions {
                run_validations: false,
                ..CalibrationOptions::default()
            },
        );
        let report = exporter.run(&scene, &mut writer).unwrap();
        assert_eq!(report.title, "No Rig Object");
        assert!(writer.written().is_none());
    }

    #[test]
    fn exported_mesh_uses_one_layout_per_corner() {
        let reader = MemoryReader::new(rig_test_fixtures::dna::load("head_minimal").unwrap());
        let rig = neutral_bind_pose(&reader);
        let mut meshes = MemoryScene::new();
        for mesh in 0..2 {
            meshes.add_mesh(scene_mesh_from_dna(&reader, "ada", mesh).unwrap());
        }
        let scene = CalibrationScene::new(&meshes).with_head_rig(&rig);
        let mut writer = MemoryWriter::new();
        let report = DnaExporter::new("ada", Component::Head, &reader)
            .run(&scene, &mut writer)
            .unwrap();
        assert!(report.valid, "{}", report.message);
        assert_eq!(report.message, "Export successful.");

        let asset = writer.written().unwrap();
        assert_eq!(asset.definition.mesh_names, vec!["head_lod0_mesh", "head_lod1_mesh"]);
        assert_eq!(asset.definition.joint_names, vec!["head", "ctrl", "FACIAL_C_Jaw", "FACIAL_L_Eye"]);
        assert_eq!(asset.definition.joint_hierarchy, vec![0, 0, 0, 0]);

        let lod1 = &asset.geometry.meshes[1];
        assert_eq!(lod1.faces, vec![vec![0, 1, 2]]);
        assert_eq!(lod1.layouts[2].position, 2);
        assert_eq!(lod1.positions, reader.vertex_positions(1));
        assert!(lod1.blend_shape_targets.is_empty());
        // the jaw weight of head vertex 0 survives; zero weights are dropped
        assert_eq!(asset.geometry.meshes[0].skin_weights[0].joint_indices, vec![2]);
    }
}
