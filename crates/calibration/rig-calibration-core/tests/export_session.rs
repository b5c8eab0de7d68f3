use std::fs;

use rig_calibration::{
    export_validations, run_calibration, run_export, scene_mesh_from_dna, CalibrationOptions,
    CalibrationScene, DnaExporter, ExportLods,
};
use rig_dna::{DnaAsset, DnaReader, MemoryReader, MemoryWriter};
use rig_instance::{BackupType, Component, DnaProvider, RigInstance};
use rig_logic::{
    neutral_bind_pose, AutoFix, MemoryArmature, MemoryScene, SceneBoneSource, SceneMeshSource,
};

fn asset(name: &str) -> DnaAsset {
    rig_test_fixtures::dna::load(name).expect("load dna fixture")
}

fn meshes_of(readers: &[&MemoryReader]) -> MemoryScene {
    let mut meshes = MemoryScene::new();
    for reader in readers {
        for mesh in 0..reader.mesh_count() {
            meshes.add_mesh(scene_mesh_from_dna(*reader, "ada", mesh).expect("mesh"));
        }
    }
    meshes
}

fn rigs() -> (MemoryReader, MemoryReader, MemoryArmature, MemoryArmature) {
    let head = MemoryReader::new(asset("head_minimal"));
    let body = MemoryReader::new(asset("body_rbf"));
    let head_rig = neutral_bind_pose(&head);
    let body_rig = neutral_bind_pose(&body);
    (head, body, head_rig, body_rig)
}

/// it should list every offending mesh of every failed check
#[test]
fn export_validations_aggregate_failures() {
    let (head, _, head_rig, _) = rigs();
    let mut meshes = meshes_of(&[&head]);
    let mut stray = scene_mesh_from_dna(&head, "ada", 1).unwrap();
    stray.name = "ada_eyelashes".into();
    meshes.add_mesh(stray);
    let mut teeth = scene_mesh_from_dna(&head, "ada", 1).unwrap();
    teeth.name = "ada_teeth_lod0_mesh".into();
    teeth.uvs = None;
    teeth.location = [0.0, 0.0, 0.5];
    meshes.add_mesh(teeth);

    let lods = ExportLods::collect("ada", Component::Head, &meshes, true);
    assert_eq!(lods.non_lod, vec!["ada_eyelashes"]);
    let rig: &dyn SceneBoneSource = &head_rig;
    let failures = export_validations(Component::Head, Some(rig), &meshes, &lods, true);
    let fixes: Vec<_> = failures.iter().filter_map(|report| report.fix.clone()).collect();
    assert_eq!(
        fixes,
        vec![
            AutoFix::RenameToLod0 {
                meshes: vec!["ada_eyelashes".into()]
            },
            AutoFix::UnwrapUvs {
                meshes: vec!["ada_teeth_lod0_mesh".into()]
            },
            AutoFix::MatchRigOrigin {
                meshes: vec!["ada_teeth_lod0_mesh".into()]
            },
        ]
    );
    assert_eq!(failures[1].message, "\"ada_teeth_lod0_mesh\"");
    assert!(failures.iter().all(|report| !report.valid));
}

/// it should import an exported body back into the same scene mesh
#[test]
fn exported_body_imports_back() {
    let (_, body, _, body_rig) = rigs();
    let mut meshes = meshes_of(&[&body]);
    meshes.mesh_mut("ada_body_lod0_mesh").unwrap().vertices[2][0] += 0.05;
    let scene = CalibrationScene::new(&meshes).with_body_rig(&body_rig);

    let mut writer = MemoryWriter::new();
    let report = DnaExporter::new("ada", Component::Body, &body)
        .run(&scene, &mut writer)
        .unwrap();
    assert!(report.valid, "{}", report.message);

    let exported = writer.written_reader().unwrap();
    assert_eq!(exported.joint_count(), 5);
    assert_eq!(exported.joint_parent_index(4), Some(2));
    assert_eq!(exported.mesh_indices_for_lod(0), [0]);
    assert_eq!(exported.joint_indices_for_lod(0), [0, 1, 2, 3, 4]);
    assert!((exported.vertex_positions(0)[2][0] - 45.0).abs() < 1e-4);
    // rbf data is carried over from the source DNA
    assert_eq!(exported.rbf_solver_count(), body.rbf_solver_count());

    let original = meshes.mesh("ada_body_lod0_mesh").unwrap();
    let imported = scene_mesh_from_dna(&exported, "ada", 0).unwrap();
    assert_eq!(imported.faces, original.faces);
    assert_eq!(imported.uvs, original.uvs);
    assert_eq!(imported.normals, original.normals);
    assert_eq!(imported.vertex_groups, original.vertex_groups);
    assert_eq!(imported.vertex_weights, original.vertex_weights);
    for (a, b) in imported.vertices.iter().zip(&original.vertices) {
        for axis in 0..3 {
            assert!((a[axis] - b[axis]).abs() < 1e-6);
        }
    }
}

/// it should calibrate head then body and store both into memory providers
#[test]
fn session_calibrates_all_components() {
    let (head, body, head_rig, body_rig) = rigs();
    let mut instance = RigInstance::new("ada")
        .with_head_dna(DnaProvider::Memory(asset("head_minimal")))
        .with_body_dna(DnaProvider::Memory(asset("body_rbf")));
    let mut meshes = meshes_of(&[&head, &body]);
    meshes.mesh_mut("ada_head_lod1_mesh").unwrap().vertices[2][0] += 0.01;
    meshes.mesh_mut("ada_body_lod0_mesh").unwrap().vertices[0][0] += 0.02;
    let scene = CalibrationScene::new(&meshes)
        .with_head_rig(&head_rig)
        .with_body_rig(&body_rig);

    let report = run_calibration(
        &mut instance,
        Component::All,
        &scene,
        &CalibrationOptions::default(),
        None,
    )
    .unwrap();
    assert!(report.valid, "{}", report.message);
    assert_eq!(report.message, "Calibration of body successful.");

    let head = instance.head_dna().unwrap().open_reader().unwrap();
    let body = instance.body_dna().unwrap().open_reader().unwrap();
    assert!((head.vertex_positions(1)[2][0] - 2.0).abs() < 1e-4);
    assert!((body.vertex_positions(0)[0][0] - 2.0).abs() < 1e-4);
    assert!(instance.head().is_none() && instance.body().is_none());
}

/// it should keep the provider untouched when validations fail
#[test]
fn session_export_stops_on_invalid_scene() {
    let (head, _, head_rig, _) = rigs();
    let source = asset("head_minimal");
    let mut instance =
        RigInstance::new("ada").with_head_dna(DnaProvider::Memory(source.clone()));
    let mut meshes = meshes_of(&[&head]);
    meshes.mesh_mut("ada_head_lod0_mesh").unwrap().location = [1.0, 0.0, 0.0];
    let scene = CalibrationScene::new(&meshes).with_head_rig(&head_rig);

    let report = run_export(
        &mut instance,
        Component::Head,
        &scene,
        &CalibrationOptions::default(),
    )
    .unwrap();
    assert!(!report.valid);
    assert_eq!(
        report.fix,
        Some(AutoFix::MatchRigOrigin {
            meshes: vec!["ada_head_lod0_mesh".into()]
        })
    );
    assert_eq!(instance.head_dna(), Some(&DnaProvider::Memory(source)));
}

/// it should write an export through a file provider
#[test]
fn session_export_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ada_body.json");
    fs::write(&path, rig_test_fixtures::dna::json("body_rbf").unwrap()).unwrap();

    let (_, body, _, body_rig) = rigs();
    let meshes = meshes_of(&[&body]);
    let scene = CalibrationScene::new(&meshes).with_body_rig(&body_rig);
    let mut instance = RigInstance::new("ada").with_body_dna(DnaProvider::file(&path));
    instance.config.backups.root = Some(dir.path().join("backups"));
    let report = run_export(
        &mut instance,
        Component::Body,
        &scene,
        &CalibrationOptions::default(),
    )
    .unwrap();
    assert!(report.valid, "{}", report.message);
    assert_eq!(report.message, "Export successful.");

    let reread = instance.body_dna().unwrap().open_reader().unwrap();
    assert_eq!(reread.mesh_name(0), Some("body_lod0_mesh"));
    assert_eq!(reread.joint_name(4), Some("upperarm_out_l"));

    // the file was backed up before the export overwrote it
    let backups = instance.backups().list("ada").unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].metadata.backup_type, BackupType::Export);
    let copy = backups[0].folder.join("body_ada_body.json");
    assert_eq!(
        fs::read_to_string(copy).unwrap(),
        rig_test_fixtures::dna::json("body_rbf").unwrap()
    );
}
