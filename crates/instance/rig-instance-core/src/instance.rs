//! One rig instance: head and body DNA, their evaluators, and the RBF
//! editing session of the body.
//!
//! Runtimes are built lazily on the first evaluation and dropped by
//! [`RigInstance::destroy`], which releases the DNA readers. A committed
//! editing session destroys the instance, so the next evaluation reads the
//! updated DNA.

use std::path::{Path, PathBuf};

use nalgebra::Matrix4;
use rig_dna::{
    open_reader, DataLayer, DnaAsset, DnaError, DnaFormat, DnaReader, DnaWriter, FileWriter,
    MemoryReader, MemoryWriter, UnknownLayerPolicy,
};
use rig_logic::constants::head_to_body_lod;
use rig_logic::{
    apply_blend_shapes, apply_euler_joints, apply_quaternion_joints, apply_texture_masks,
    body_raw_control_values, compute_rest_pose, eye_aim_values, gui_control_values,
    head_raw_control_values, head_switch_influences, reset_raw_controls, solo_blend_shape,
    solvers_to_records, use_eye_aim, ControlOverrides, EvaluatorPhase, LogOnce, RestPoseCache,
    RestRotationPolicy, RigLogic, RigLookups, RigState, RotationMode, SceneBoneSource,
    SceneOutputSink, ValidationReport,
};

use crate::backup::{BackupEntry, BackupManager, BackupSources, BackupType};
use crate::config::{RigBindings, RigInstanceConfig};
use crate::error::InstanceError;
use crate::guard::{EvaluationLatch, Suppression};
use crate::ids::Component;
use crate::rbf_editor::{AvailableBone, DrivenSource, EditContext, RbfEditor};
use crate::scene::{RigArmature, RigScene};

/// Where a component's DNA lives.
#[derive(Clone, Debug, PartialEq)]
pub enum DnaProvider {
    File { path: PathBuf, format: DnaFormat },
    /// An in-memory asset. Commits replace it with the written asset.
    Memory(DnaAsset),
}

impl DnaProvider {
    /// A file provider whose format follows the extension.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DnaFormat::from_path(&path);
        Self::File { path, format }
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Memory(_) => None,
        }
    }

    pub fn open_reader(&self) -> Result<MemoryReader, DnaError> {
        match self {
            Self::File { path, format } => open_reader(path, *format),
            Self::Memory(asset) => Ok(MemoryReader::new(asset.clone())),
        }
    }

    /// Writer targeting this provider. Memory writers only land in the
    /// provider once passed to [`DnaProvider::store`].
    pub fn writer(&self) -> Box<dyn DnaWriter> {
        match self {
            Self::File { path, format } => Box::new(FileWriter::new(path.clone(), *format)),
            Self::Memory(_) => Box::new(MemoryWriter::new()),
        }
    }

    /// Keep an in-memory asset in sync with what `writer` flushed.
    pub fn store(&mut self, writer: &dyn DnaWriter) {
        if let Self::Memory(asset) = self {
            *asset = writer.asset().clone();
        }
    }
}

/// Evaluator and caches of one component.
#[derive(Debug)]
pub struct ComponentRuntime {
    reader: MemoryReader,
    rig_logic: RigLogic,
    state: RigState,
    rest_pose: RestPoseCache,
    lookups: RigLookups,
    phase: EvaluatorPhase,
    log: LogOnce,
}

impl ComponentRuntime {
    fn new(
        reader: MemoryReader,
        lookups: RigLookups,
        rig: &dyn SceneBoneSource,
        policy: RestRotationPolicy,
        log_name: String,
    ) -> Result<Self, InstanceError> {
        let rig_logic = RigLogic::from_reader(&reader)?;
        let state = RigState::new(&rig_logic);
        let report = compute_rest_pose(
            rig,
            |name| {
                if lookups.driver_bones.contains(name) {
                    RotationMode::Quaternion
                } else {
                    RotationMode::EulerXyz
                }
            },
            policy,
        );
        if !report.failures.is_empty() {
            log::warn!(
                "{log_name}: {} bone(s) have no usable rest pose",
                report.failures.len()
            );
        }
        Ok(Self {
            reader,
            rig_logic,
            state,
            rest_pose: report.cache,
            lookups,
            phase: EvaluatorPhase::Initialized,
            log: LogOnce::new(log_name),
        })
    }

    pub fn reader(&self) -> &dyn DnaReader {
        &self.reader
    }

    pub fn rig_logic(&self) -> &RigLogic {
        &self.rig_logic
    }

    pub fn state(&self) -> &RigState {
        &self.state
    }

    pub fn lookups(&self) -> &RigLookups {
        &self.lookups
    }

    pub fn rest_pose(&self) -> &RestPoseCache {
        &self.rest_pose
    }

    pub fn phase(&self) -> EvaluatorPhase {
        self.phase
    }

    fn edit_context(&self) -> EditContext<'_> {
        EditContext {
            reader: &self.reader,
            lookups: &self.lookups,
            rest_pose: &self.rest_pose,
        }
    }

    fn evaluate_body(
        &mut self,
        config: &RigInstanceConfig,
        rig: &mut dyn RigArmature,
        overrides: Option<&ControlOverrides>,
    ) -> Result<usize, InstanceError> {
        if config.evaluate_rbfs {
            body_raw_control_values(
                &self.reader,
                rig.as_source(),
                &self.lookups.driver_bones,
                overrides,
                &mut self.state,
                &mut self.log,
            )?;
        }
        self.state
            .set_lod(head_to_body_lod(config.active_lod).unwrap_or(0));
        self.rig_logic.calculate(&mut self.state);
        if !config.evaluate_bones {
            return Ok(0);
        }
        Ok(apply_quaternion_joints(
            &self.reader,
            self.state.joint_outputs(),
            &self.rest_pose,
            &self.lookups,
            rig.as_sink(),
            &mut self.log,
        ))
    }

    fn evaluate_head(
        &mut self,
        config: &RigInstanceConfig,
        mut rig: Option<&mut (dyn RigArmature + '_)>,
        face_board: Option<&mut (dyn RigArmature + '_)>,
        mut outputs: Option<&mut (dyn SceneOutputSink + '_)>,
        overrides: &EvaluationOverrides,
        outcome: &mut EvaluationOutcome,
    ) -> Result<(), InstanceError> {
        if let Some(face_board) = face_board {
            head_switch_influences(&mut *face_board);
            let eye_aim = match rig.as_deref() {
                Some(rig) if use_eye_aim(face_board.as_source()) => {
                    Some(eye_aim_values(face_board.as_source(), rig.as_source()))
                }
                _ => None,
            };
            gui_control_values(
                &self.reader,
                face_board.as_source(),
                eye_aim.as_ref(),
                overrides.gui.as_ref(),
                &mut self.state,
                &mut self.log,
            )?;
        }
        self.state.set_lod(config.active_lod);
        self.rig_logic.map_gui_to_raw(&mut self.state);

        if config.evaluate_rbfs {
            if let Some(rig) = rig.as_deref() {
                head_raw_control_values(
                    &self.reader,
                    rig.as_source(),
                    &self.lookups.driver_bones,
                    overrides.head_raw.as_ref(),
                    &mut self.state,
                    &mut self.log,
                )?;
            }
        }
        self.rig_logic.calculate(&mut self.state);

        if config.evaluate_bones {
            if let Some(rig) = rig.as_deref_mut() {
                outcome.head_bones = apply_euler_joints(
                    &self.reader,
                    self.state.joint_outputs(),
                    &self.rest_pose,
                    &self.lookups,
                    rig.as_sink(),
                    &mut self.log,
                );
            }
        }
        if config.evaluate_shape_keys {
            if let Some(outputs) = outputs.as_deref_mut() {
                outcome.shape_keys = apply_blend_shapes(
                    self.state.blend_shape_outputs(),
                    &self.lookups.shape_keys,
                    outputs,
                    &mut self.log,
                );
            }
        }
        if config.evaluate_texture_masks {
            if let Some(outputs) = outputs.as_deref_mut() {
                outcome.masks = apply_texture_masks(
                    &self.reader,
                    self.state.animated_map_outputs(),
                    outputs,
                    &mut self.log,
                );
            }
        }
        Ok(())
    }
}

/// Control values that replace what would be read from the scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationOverrides {
    pub gui: Option<ControlOverrides>,
    pub head_raw: Option<ControlOverrides>,
    pub body_raw: Option<ControlOverrides>,
}

/// What one evaluation wrote to the scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub head_bones: usize,
    pub body_bones: usize,
    pub shape_keys: Vec<(String, f64)>,
    pub masks: Vec<(String, f64)>,
}

#[derive(Debug)]
pub struct RigInstance {
    name: String,
    pub config: RigInstanceConfig,
    pub bindings: RigBindings,
    head_dna: Option<DnaProvider>,
    body_dna: Option<DnaProvider>,
    head: Option<ComponentRuntime>,
    body: Option<ComponentRuntime>,
    editor: RbfEditor,
    latch: EvaluationLatch,
    suppression: Suppression,
}

impl RigInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: RigInstanceConfig::default(),
            bindings: RigBindings::default(),
            head_dna: None,
            body_dna: None,
            head: None,
            body: None,
            editor: RbfEditor::new(),
            latch: EvaluationLatch::new(),
            suppression: Suppression::new(),
        }
    }

    pub fn with_head_dna(mut self, provider: DnaProvider) -> Self {
        self.head_dna = Some(provider);
        self
    }

    pub fn with_body_dna(mut self, provider: DnaProvider) -> Self {
        self.body_dna = Some(provider);
        self
    }

    pub fn with_config(mut self, config: RigInstanceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_bindings(mut self, bindings: RigBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head_dna(&self) -> Option<&DnaProvider> {
        self.head_dna.as_ref()
    }

    pub fn body_dna(&self) -> Option<&DnaProvider> {
        self.body_dna.as_ref()
    }

    pub fn head_dna_mut(&mut self) -> Option<&mut DnaProvider> {
        self.head_dna.as_mut()
    }

    pub fn body_dna_mut(&mut self) -> Option<&mut DnaProvider> {
        self.body_dna.as_mut()
    }

    pub fn head(&self) -> Option<&ComponentRuntime> {
        self.head.as_ref()
    }

    pub fn body(&self) -> Option<&ComponentRuntime> {
        self.body.as_ref()
    }

    pub fn editor(&self) -> &RbfEditor {
        &self.editor
    }

    /// Share guard flags with other instances of a registry.
    pub(crate) fn share_guards(&mut self, latch: EvaluationLatch, suppression: Suppression) {
        self.latch = latch;
        self.suppression = suppression;
    }

    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    pub fn is_initialized(&self, component: Component) -> bool {
        (!component.includes_head() || self.head.is_some())
            && (!component.includes_body() || self.body.is_some())
    }

    /// Build the runtimes of every component that has both DNA and a rig.
    /// Components that are already built are left alone.
    pub fn initialize(
        &mut self,
        head_rig: Option<&dyn SceneBoneSource>,
        body_rig: Option<&dyn SceneBoneSource>,
    ) -> Result<(), InstanceError> {
        if self.head.is_none() {
            if let (Some(provider), Some(rig)) = (self.head_dna.as_ref(), head_rig) {
                let reader = provider.open_reader()?;
                let lookups = RigLookups::head(&reader, &self.name);
                self.head = Some(ComponentRuntime::new(
                    reader,
                    lookups,
                    rig,
                    RestRotationPolicy::FollowMode,
                    format!("{}_head", self.name),
                )?);
                log::debug!("initialized head rig logic of '{}'", self.name);
            }
        }
        if self.body.is_none() {
            if let (Some(provider), Some(rig)) = (self.body_dna.as_ref(), body_rig) {
                let reader = provider.open_reader()?;
                let head_reader = self.head.as_ref().map(|h| &h.reader as &dyn DnaReader);
                let lookups = RigLookups::body(&reader, head_reader);
                self.body = Some(ComponentRuntime::new(
                    reader,
                    lookups,
                    rig,
                    RestRotationPolicy::AlwaysEuler,
                    format!("{}_body", self.name),
                )?);
                log::debug!("initialized body rig logic of '{}'", self.name);
            }
        }
        Ok(())
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::from_config(&self.config.backups)
    }

    /// Back up the file-backed DNA of this instance when backups are
    /// enabled. Failures are logged and never stop the caller.
    pub fn backup(&self, backup_type: BackupType) -> Option<BackupEntry> {
        if !self.config.backups.enabled {
            return None;
        }
        let sources = BackupSources {
            head: self.head_dna.as_ref().and_then(DnaProvider::path),
            body: self.body_dna.as_ref().and_then(DnaProvider::path),
        };
        if sources.head.is_none() && sources.body.is_none() {
            return None;
        }
        match self.backups().create(&self.name, sources, backup_type, None) {
            Ok(entry) => entry,
            Err(err) => {
                log::error!("failed to back up DNA of '{}': {err}", self.name);
                None
            }
        }
    }

    /// Copy a backup over the DNA files it was taken from. The runtimes are
    /// destroyed so the next evaluation reads the restored files.
    pub fn restore_backup(&mut self, id: &str) -> Result<Vec<PathBuf>, InstanceError> {
        self.destroy();
        self.backups().restore(&self.name, id)
    }

    /// Drop both runtimes and release their DNA readers.
    pub fn destroy(&mut self) {
        let released = self.head.take().is_some() | self.body.take().is_some();
        if released {
            log::debug!("destroyed rig logic of '{}'", self.name);
        }
    }

    pub fn evaluate(
        &mut self,
        component: Component,
        scene: &mut RigScene<'_>,
    ) -> Result<EvaluationOutcome, InstanceError> {
        self.evaluate_with(component, scene, &EvaluationOverrides::default())
    }

    /// Evaluate `component`, body first. Fails with
    /// [`InstanceError::EvaluationInProgress`] when called from inside
    /// another evaluation.
    ///
    /// The `auto_evaluate*` config flags only gate what the
    /// [`UpdateListener`](crate::listener::UpdateListener) requests; an
    /// explicit call always evaluates.
    pub fn evaluate_with(
        &mut self,
        component: Component,
        scene: &mut RigScene<'_>,
        overrides: &EvaluationOverrides,
    ) -> Result<EvaluationOutcome, InstanceError> {
        let _token = self.latch.acquire()?;
        let _quiet = self.suppression.suppress();

        self.initialize(
            scene.head_rig.as_deref().map(|rig| rig.as_source()),
            scene.body_rig.as_deref().map(|rig| rig.as_source()),
        )?;

        let mut outcome = EvaluationOutcome::default();
        if component.includes_body() {
            if let (Some(body), Some(rig)) = (self.body.as_mut(), scene.body_rig.as_deref_mut()) {
                body.phase = EvaluatorPhase::Evaluating;
                let result = body.evaluate_body(&self.config, rig, overrides.body_raw.as_ref());
                body.phase = EvaluatorPhase::Initialized;
                outcome.body_bones = result?;
            }
        }
        if component.includes_head() {
            if let Some(head) = self.head.as_mut() {
                head.phase = EvaluatorPhase::Evaluating;
                let result = head.evaluate_head(
                    &self.config,
                    scene.head_rig.as_deref_mut(),
                    scene.face_board.as_deref_mut(),
                    scene.outputs.as_deref_mut(),
                    overrides,
                    &mut outcome,
                );
                head.phase = EvaluatorPhase::Initialized;
                result?;
            }
        }
        Ok(outcome)
    }

    /// Turn driver-bone reading on or off. Turning it off puts the driver
    /// raw controls back to the identity rotation.
    pub fn set_evaluate_rbfs(&mut self, enabled: bool) -> Result<(), InstanceError> {
        self.config.evaluate_rbfs = enabled;
        if enabled {
            return Ok(());
        }
        let _quiet = self.suppression.suppress();
        if let Some(head) = self.head.as_mut() {
            let drivers = &head.lookups.driver_bones;
            reset_raw_controls(&head.reader, &mut head.state, |name| {
                name.is_quaternion() && drivers.contains(name.control)
            })?;
        }
        if let Some(body) = self.body.as_mut() {
            reset_raw_controls(&body.reader, &mut body.state, |_| true)?;
        }
        Ok(())
    }

    /// Isolate one shape key on the head meshes, or clear every key.
    pub fn solo_shape_key(
        &self,
        outputs: &mut dyn SceneOutputSink,
        selected: Option<&str>,
    ) -> Result<(), InstanceError> {
        let head = self.head.as_ref().ok_or(InstanceError::MissingComponent {
            component: Component::Head,
        })?;
        let _quiet = self.suppression.suppress();
        solo_blend_shape(&head.lookups.shape_keys, outputs, selected);
        Ok(())
    }

    // -----------------------------------------------------------------
    // RBF editing
    // -----------------------------------------------------------------

    fn body_runtime(&self) -> Result<&ComponentRuntime, InstanceError> {
        self.body.as_ref().ok_or(InstanceError::MissingComponent {
            component: Component::Body,
        })
    }

    /// Start an editing session from the body DNA. Automatic body
    /// evaluation pauses until the session ends.
    pub fn edit(&mut self) -> Result<(), InstanceError> {
        let body = self.body.as_ref().ok_or(InstanceError::MissingComponent {
            component: Component::Body,
        })?;
        self.editor.begin(&body.reader);
        self.config.auto_evaluate_body = false;
        log::info!("started RBF editing of '{}'", self.name);
        Ok(())
    }

    /// The editor together with the body data its operations need.
    pub fn rbf_edit(&mut self) -> Result<(&mut RbfEditor, EditContext<'_>), InstanceError> {
        if !self.editor.is_editing() {
            return Err(InstanceError::NotEditing);
        }
        let body = self.body.as_ref().ok_or(InstanceError::MissingComponent {
            component: Component::Body,
        })?;
        Ok((&mut self.editor, body.edit_context()))
    }

    pub fn available_driven_bones(
        &self,
        body_rig: &dyn SceneBoneSource,
    ) -> Result<Vec<AvailableBone>, InstanceError> {
        let body = self.body_runtime()?;
        Ok(self
            .editor
            .available_driven_bones(body.edit_context(), body_rig))
    }

    /// Add a pose to the active solver from the current body pose.
    pub fn add_pose(
        &mut self,
        body_rig: &dyn SceneBoneSource,
        name: &str,
        source: DrivenSource,
    ) -> Result<i32, InstanceError> {
        let _quiet = self.suppression.suppress();
        let (editor, ctx) = self.rbf_edit()?;
        editor.add_rbf_pose(ctx, body_rig, name, None, source, None)
    }

    pub fn remove_pose(&mut self) -> Result<String, InstanceError> {
        let (editor, _) = self.rbf_edit()?;
        editor.remove_rbf_pose()
    }

    /// Capture edits to the driver and driven bones of the active pose.
    pub fn update_pose(
        &mut self,
        body_rig: &dyn SceneBoneSource,
    ) -> Result<Vec<String>, InstanceError> {
        let (editor, ctx) = self.rbf_edit()?;
        Ok(editor.update_pose(ctx, body_rig))
    }

    /// Make a pose active and show it on the body rig. Evaluates the body
    /// when the preview asks for it.
    pub fn select_pose(
        &mut self,
        solver: usize,
        pose: usize,
        scene: &mut RigScene<'_>,
    ) -> Result<Option<EvaluationOutcome>, InstanceError> {
        if !self.editor.set_active_solver(solver) || !self.editor.set_active_pose(pose) {
            return Err(InstanceError::rejected(format!(
                "Invalid solver or pose index: {solver}, {pose}"
            )));
        }
        let Some(rig) = scene.body_rig.as_deref_mut() else {
            return Ok(None);
        };
        let evaluate = {
            let _quiet = self.suppression.suppress();
            let body = self.body_runtime()?;
            self.editor
                .pose_scene(body.edit_context(), rig, self.config.reset_rbf_pose_on_change)
        };
        if evaluate {
            return self.evaluate(Component::Body, scene).map(Some);
        }
        Ok(None)
    }

    /// Validate the session and write its solvers into the body DNA.
    ///
    /// A failed validation is returned as an invalid report and nothing is
    /// written. File-backed DNA is backed up before and after the write. On
    /// success the instance is destroyed and re-reads the DNA on its next
    /// evaluation.
    pub fn commit(&mut self) -> Result<ValidationReport, InstanceError> {
        let provider = self
            .body_dna
            .as_ref()
            .ok_or(InstanceError::MissingComponent {
                component: Component::Body,
            })?;
        let mut writer = provider.writer();
        let report = self.commit_to(writer.as_mut())?;
        if report.valid {
            if let Some(provider) = self.body_dna.as_mut() {
                provider.store(writer.as_ref());
            }
        }
        Ok(report)
    }

    /// [`RigInstance::commit`] into a caller supplied writer.
    pub fn commit_to(
        &mut self,
        writer: &mut dyn DnaWriter,
    ) -> Result<ValidationReport, InstanceError> {
        if !self.editor.is_editing() {
            return Err(InstanceError::NotEditing);
        }
        for report in [
            self.editor.validate_no_duplicate_driver_bone_values(),
            self.editor.validate_solver_non_default_pose_with_driven_bones(),
        ] {
            if !report.valid {
                return Ok(ValidationReport::failure("Invalid RBF solver", report.message));
            }
        }

        let changes = self.editor.refresh_changes().change_count();
        let body = self.body_runtime()?;
        writer.set_from(&body.reader, DataLayer::All, UnknownLayerPolicy::Preserve);
        let (solvers, poses) = solvers_to_records(self.editor.solvers());
        writer.set_rbf_solvers(solvers);
        writer.set_rbf_poses(poses);

        self.backup(BackupType::PreRbfEditorCommit);
        self.destroy();
        writer.write();
        writer.status().check()?;
        self.backup(BackupType::PostRbfEditorCommit);

        self.editor.end();
        self.config.auto_evaluate_body = true;
        log::info!("committed {changes} RBF change(s) of '{}'", self.name);
        Ok(ValidationReport::success(
            "RBF solvers committed",
            format!("Committed {changes} change(s) to DNA"),
        ))
    }

    /// Drop the session's edits and return the body rig to its rest pose.
    pub fn revert(&mut self, body_rig: Option<&mut dyn RigArmature>) -> Result<(), InstanceError> {
        if !self.editor.is_editing() {
            return Err(InstanceError::NotEditing);
        }
        let _quiet = self.suppression.suppress();
        self.editor.revert();
        self.config.auto_evaluate_body = true;
        if let Some(rig) = body_rig {
            for name in rig.bone_names() {
                rig.set_bone_basis(&name, Matrix4::identity());
            }
        }
        log::info!("reverted RBF edits of '{}'", self.name);
        Ok(())
    }
}
