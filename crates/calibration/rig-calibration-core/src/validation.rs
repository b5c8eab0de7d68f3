//! Pre-flight checks of the scene before DNA is written.
//!
//! Each check lists every offending mesh so one fix handles them all.

use nalgebra::Vector3;

use rig_instance::Component;
use rig_logic::constants::FLOATING_POINT_PRECISION;
use rig_logic::math::translation;
use rig_logic::{AutoFix, SceneBoneSource, SceneMeshSource, ValidationReport};

use crate::scene::{component_label, ExportLods};

fn quoted(meshes: &[String]) -> String {
    meshes
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every failing check, in the order they are presented.
pub fn export_validations(
    component: Component,
    rig: Option<&dyn SceneBoneSource>,
    meshes: &dyn SceneMeshSource,
    lods: &ExportLods,
    include_meshes: bool,
) -> Vec<ValidationReport> {
    let mut failures = Vec::new();
    let Some(rig) = rig else {
        failures.push(ValidationReport::failure(
            "No Rig Object",
            format!(
                "No rig object found. Must link a {} rig to export DNA.",
                component_label(component)
            ),
        ));
        return failures;
    };
    if !include_meshes {
        return failures;
    }

    if !lods.non_lod.is_empty() {
        failures.push(
            ValidationReport::failure(
                "Invalid LOD names. Fix by renaming to LOD 0 meshes?",
                quoted(&lods.non_lod),
            )
            .with_fix(AutoFix::RenameToLod0 {
                meshes: lods.non_lod.clone(),
            }),
        );
    }

    let rig_origin = translation(&rig.armature_matrix());
    let mut missing_uvs = Vec::new();
    let mut misplaced = Vec::new();
    for (_, export) in lods.meshes() {
        let Some(mesh) = meshes.mesh(&export.scene_name) else {
            continue;
        };
        if !mesh.has_uvs() {
            missing_uvs.push(export.scene_name.clone());
        }
        if (rig_origin - Vector3::from(mesh.location)).norm() > FLOATING_POINT_PRECISION {
            misplaced.push(export.scene_name.clone());
        }
    }

    if !missing_uvs.is_empty() {
        failures.push(
            ValidationReport::failure(
                "Missing UVs. Auto unwrap the following meshes?",
                quoted(&missing_uvs),
            )
            .with_fix(AutoFix::UnwrapUvs {
                meshes: missing_uvs,
            }),
        );
    }
    if !misplaced.is_empty() {
        failures.push(
            ValidationReport::failure(
                "Mesh origin mismatch. Fix by matching and applying to the rig's origin?",
                quoted(&misplaced),
            )
            .with_fix(AutoFix::MatchRigOrigin { meshes: misplaced }),
        );
    }
    failures
}

/// First failing check, or a success report.
pub fn validate_export(
    component: Component,
    rig: Option<&dyn SceneBoneSource>,
    meshes: &dyn SceneMeshSource,
    lods: &ExportLods,
    include_meshes: bool,
) -> ValidationReport {
    export_validations(component, rig, meshes, lods, include_meshes)
        .into_iter()
        .next()
        .unwrap_or_else(|| ValidationReport::success("Success", "All validations passed."))
}
