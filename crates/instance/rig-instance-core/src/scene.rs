//! Scene access for one evaluation or editing call.
//!
//! The host lends its armatures and output targets for the duration of a
//! call; nothing here is retained by the instance.

use rig_logic::{SceneBoneSink, SceneBoneSource, SceneOutputSink};

/// An armature that can be both read and posed.
pub trait RigArmature: SceneBoneSource + SceneBoneSink {
    fn as_source(&self) -> &dyn SceneBoneSource;
    fn as_sink(&mut self) -> &mut dyn SceneBoneSink;
}

impl<T: SceneBoneSource + SceneBoneSink> RigArmature for T {
    fn as_source(&self) -> &dyn SceneBoneSource {
        self
    }

    fn as_sink(&mut self) -> &mut dyn SceneBoneSink {
        self
    }
}

/// Scene objects bound to an instance. Absent entries skip the stages that
/// need them.
#[derive(Default)]
pub struct RigScene<'a> {
    pub head_rig: Option<&'a mut dyn RigArmature>,
    pub body_rig: Option<&'a mut dyn RigArmature>,
    pub face_board: Option<&'a mut dyn RigArmature>,
    pub outputs: Option<&'a mut dyn SceneOutputSink>,
}

impl<'a> RigScene<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head_rig(mut self, rig: &'a mut dyn RigArmature) -> Self {
        self.head_rig = Some(rig);
        self
    }

    pub fn with_body_rig(mut self, rig: &'a mut dyn RigArmature) -> Self {
        self.body_rig = Some(rig);
        self
    }

    pub fn with_face_board(mut self, face_board: &'a mut dyn RigArmature) -> Self {
        self.face_board = Some(face_board);
        self
    }

    pub fn with_outputs(mut self, outputs: &'a mut dyn SceneOutputSink) -> Self {
        self.outputs = Some(outputs);
        self
    }
}
