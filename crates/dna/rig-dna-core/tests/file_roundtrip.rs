use rig_dna::{
    open_reader, DataLayer, DnaAsset, DnaFormat, DnaReader, DnaWriter, FileWriter, MemoryReader,
    Mesh, UnknownLayerPolicy,
};

fn sample_asset() -> DnaAsset {
    let mut asset = DnaAsset::default();
    asset.descriptor.name = "ada_head".into();
    asset.definition.joint_names = vec!["spine_04".into(), "head".into()];
    asset.definition.joint_hierarchy = vec![0, 0];
    asset.definition.neutral_joint_translations = vec![[0.0, 150.0, 0.0], [0.0, 10.0, 0.0]];
    asset.definition.neutral_joint_rotations = vec![[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]];
    asset.definition.mesh_names = vec!["head_lod0_mesh".into()];
    asset.geometry.meshes.push(Mesh {
        positions: vec![[0.0, 160.0, 5.0], [1.0, 161.0, 5.5]],
        ..Mesh::default()
    });
    asset.unknown.insert(
        "mlBehavior".into(),
        serde_json::json!({ "networks": [[0.25, 0.5]] }),
    );
    asset
}

#[test]
fn json_write_then_open_preserves_every_layer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("head.json");
    let source = MemoryReader::new(sample_asset());

    let mut writer = FileWriter::new(&path, DnaFormat::Json);
    writer.set_from(&source, DataLayer::All, UnknownLayerPolicy::Preserve);
    writer.write();
    assert!(writer.status().is_ok(), "status: {:?}", writer.status());

    let reopened = open_reader(&path, DnaFormat::Json).unwrap();
    assert_eq!(reopened.asset(), source.asset());
    assert_eq!(reopened.path(), Some(path.as_path()));
}

#[test]
fn binary_write_then_open_preserves_every_layer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("head.dna");
    let source = MemoryReader::new(sample_asset());

    let mut writer = FileWriter::new(&path, DnaFormat::from_path(&path));
    writer.set_from(&source, DataLayer::All, UnknownLayerPolicy::Preserve);
    writer.write();
    writer.status().check().unwrap();

    let reopened = open_reader(&path, DnaFormat::Binary).unwrap();
    assert_eq!(reopened.joint_name(1), Some("head"));
    assert_eq!(reopened.vertex_positions(0).len(), 2);
    assert!(reopened.asset().unknown.contains_key("mlBehavior"));
}

#[test]
fn writing_into_missing_directory_sets_failed_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("head.dna");

    let mut writer = FileWriter::new(&path, DnaFormat::Binary);
    writer.write();
    assert!(!writer.status().is_ok(), "write into a missing dir must fail");
    assert!(writer.status().check().is_err());
}
