use nalgebra::{Matrix4, Rotation3, Vector3};

use rig_dna::{DnaAsset, DnaError, MemoryReader, MemoryWriter};
use rig_instance::{
    BackupType, Component, DnaProvider, DrivenSource, InstanceError, RigInstance, RigScene,
};
use rig_logic::{neutral_bind_pose, solvers_from_reader, MemoryArmature, SceneBoneSink};

const NEW_POSE: &str = "upperarm_l_fwd_60";

fn asset() -> DnaAsset {
    rig_test_fixtures::dna::load("body_rbf").expect("load dna fixture")
}

fn body_rig() -> MemoryArmature {
    neutral_bind_pose(&MemoryReader::new(asset()))
}

/// Initialize the body, start editing and pose the arm for a new pose.
fn editing(provider: DnaProvider) -> (RigInstance, MemoryArmature) {
    let mut instance = RigInstance::new("ada").with_body_dna(provider);
    let mut rig = body_rig();
    {
        let mut scene = RigScene::new().with_body_rig(&mut rig);
        instance.evaluate(Component::Body, &mut scene).unwrap();
    }
    instance.edit().unwrap();
    assert!(!instance.config.auto_evaluate_body);

    let forward = Rotation3::from_euler_angles(0.0, 60f64.to_radians(), 0.0).to_homogeneous();
    assert!(rig.set_bone_basis("upperarm_l", forward));
    let offset = Matrix4::new_translation(&Vector3::new(0.0, 0.01, 0.0));
    assert!(rig.set_bone_basis("upperarm_out_l", offset));
    (instance, rig)
}

fn add_forward_pose(instance: &mut RigInstance, rig: &MemoryArmature) {
    instance
        .add_pose(
            rig,
            NEW_POSE,
            DrivenSource::Scene(vec!["upperarm_out_l".to_string()]),
        )
        .unwrap();
    let solver = instance.editor().active_solver().unwrap();
    assert_eq!(solver.poses.len(), 3);
    assert_eq!(instance.editor().active_pose().unwrap().name, NEW_POSE);
}

fn pose_names(reader: &MemoryReader) -> Vec<String> {
    solvers_from_reader(reader)[0]
        .poses
        .iter()
        .map(|pose| pose.name.clone())
        .collect()
}

/// it should write the edited solvers back into an in-memory DNA
#[test]
fn commit_writes_new_pose_and_destroys_runtime() {
    let (mut instance, mut rig) = editing(DnaProvider::Memory(asset()));
    add_forward_pose(&mut instance, &rig);

    let report = instance.commit().unwrap();
    assert!(report.valid, "{}", report.message);
    assert!(report.message.starts_with("Committed "));
    assert!(instance.body().is_none());
    assert!(!instance.editor().is_editing());
    assert!(instance.config.auto_evaluate_body);

    let reader = instance.body_dna().unwrap().open_reader().unwrap();
    assert_eq!(pose_names(&reader), ["default", "upperarm_l_up_90", NEW_POSE]);

    // the next evaluation rebuilds the runtime from the committed DNA
    let mut scene = RigScene::new().with_body_rig(&mut rig);
    instance.evaluate(Component::Body, &mut scene).unwrap();
    assert_eq!(instance.body().unwrap().rig_logic().rbf_solvers()[0].poses.len(), 3);
}

/// it should round trip a commit through a JSON file on disk
#[test]
fn commit_to_file_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body.json");
    std::fs::write(&path, serde_json::to_string(&asset()).unwrap()).unwrap();

    let (mut instance, rig) = editing(DnaProvider::file(&path));
    instance.config.backups.root = Some(dir.path().join("backups"));
    add_forward_pose(&mut instance, &rig);
    assert!(instance.commit().unwrap().valid);

    let reader = rig_dna::open_reader(&path, rig_dna::DnaFormat::Json).unwrap();
    assert_eq!(pose_names(&reader).len(), 3);
}

/// it should back up the body DNA before and after a commit
#[test]
fn commit_backs_up_before_and_after_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body.json");
    std::fs::write(&path, serde_json::to_string(&asset()).unwrap()).unwrap();

    let (mut instance, rig) = editing(DnaProvider::file(&path));
    instance.config.backups.root = Some(dir.path().join("backups"));
    add_forward_pose(&mut instance, &rig);
    assert!(instance.commit().unwrap().valid);

    let backups = instance.backups().list("ada").unwrap();
    let types: Vec<BackupType> = backups.iter().map(|b| b.metadata.backup_type).collect();
    assert_eq!(
        types,
        [BackupType::PostRbfEditorCommit, BackupType::PreRbfEditorCommit]
    );
    let copy = backups[1].folder.join("body_body.json");
    assert!(copy.is_file());
    let before = rig_dna::open_reader(&copy, rig_dna::DnaFormat::Json).unwrap();
    assert_eq!(pose_names(&before).len(), 2);
    let after = backups[0].folder.join("body_body.json");
    let after = rig_dna::open_reader(&after, rig_dna::DnaFormat::Json).unwrap();
    assert_eq!(pose_names(&after).len(), 3);

    // restoring the pre-commit copy brings back the original solvers
    let restored = instance.restore_backup(&backups[1].id).unwrap();
    assert_eq!(restored, [path.clone()]);
    let reader = rig_dna::open_reader(&path, rig_dna::DnaFormat::Json).unwrap();
    assert_eq!(pose_names(&reader).len(), 2);
}

/// it should keep only the configured number of commit backups
#[test]
fn commit_backups_rotate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body.json");
    std::fs::write(&path, serde_json::to_string(&asset()).unwrap()).unwrap();

    let mut instance = RigInstance::new("ada").with_body_dna(DnaProvider::file(&path));
    instance.config.backups.root = Some(dir.path().join("backups"));
    instance.config.backups.max_backups = 3;
    for _ in 0..4 {
        assert!(instance.backup(BackupType::PoseEditor).is_some());
    }
    assert_eq!(instance.backups().list("ada").unwrap().len(), 3);

    instance.config.backups.enabled = false;
    assert!(instance.backup(BackupType::PoseEditor).is_none());
}

/// it should refuse to commit a pose without driven bones
#[test]
fn invalid_session_is_reported_not_written() {
    let (mut instance, rig) = editing(DnaProvider::Memory(asset()));
    instance
        .add_pose(&rig, NEW_POSE, DrivenSource::Scene(Vec::new()))
        .unwrap();

    let mut writer = MemoryWriter::new();
    let report = instance.commit_to(&mut writer).unwrap();
    assert!(!report.valid);
    assert_eq!(report.title, "Invalid RBF solver");
    assert!(writer.written().is_none());
    assert!(instance.editor().is_editing());
    assert!(instance.body().is_some());
}

/// it should surface a failed write as a fatal error
#[test]
fn failed_write_is_fatal() {
    let (mut instance, rig) = editing(DnaProvider::Memory(asset()));
    add_forward_pose(&mut instance, &rig);

    let mut writer = MemoryWriter::failing("disk full");
    let err = instance.commit_to(&mut writer).unwrap_err();
    assert!(matches!(err, InstanceError::Dna(DnaError::WriteFailed { .. })));
    assert_eq!(err.category(), "write");
}

/// it should restore the starting solvers and the rest pose
#[test]
fn revert_discards_edits() {
    let (mut instance, mut rig) = editing(DnaProvider::Memory(asset()));
    add_forward_pose(&mut instance, &rig);

    instance.revert(Some(&mut rig)).unwrap();
    assert!(!instance.editor().is_editing());
    assert!(instance.config.auto_evaluate_body);
    assert_eq!(instance.editor().solvers()[0].poses.len(), 2);
    assert_eq!(rig.basis("upperarm_l").unwrap(), Matrix4::identity());
    assert_eq!(instance.revert(None).unwrap_err(), InstanceError::NotEditing);
}

/// it should show a pose on the rig and evaluate the body once editing ends
#[test]
fn selecting_a_pose_previews_it() {
    let (mut instance, mut rig) = editing(DnaProvider::Memory(asset()));
    let mut scene = RigScene::new().with_body_rig(&mut rig);
    let outcome = instance.select_pose(0, 1, &mut scene).unwrap();
    assert!(outcome.is_none(), "editing previews without evaluating");
    drop(scene);

    let driven = rig.basis("upperarm_out_l").unwrap();
    assert!((driven[(0, 3)] - 0.02).abs() < 1e-6);
    assert!(instance
        .select_pose(0, 7, &mut RigScene::new())
        .is_err());
}
