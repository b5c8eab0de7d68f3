//! rig-instance-core: per-character rig state and the RBF pose editor
//!
//! * [`instance`] owns the head and body DNA of one character together with
//!   their evaluators, and runs evaluation against a borrowed [`RigScene`].
//! * [`registry`] keeps every instance behind generation-checked handles.
//! * [`listener`] turns host scene notifications into evaluation requests.
//! * [`guard`] holds the re-entrancy latch and the update suppression flag.
//! * [`rbf_editor`] is the solver and pose editing session of a body rig.
//! * [`backup`] keeps rotating copies of the DNA files an instance writes.

pub mod backup;
pub mod config;
pub mod error;
pub mod guard;
pub mod ids;
pub mod instance;
pub mod listener;
pub mod rbf_editor;
pub mod registry;
pub mod scene;

pub use backup::{BackupEntry, BackupManager, BackupMetadata, BackupSources, BackupType};
pub use config::{BackupConfig, RigBindings, RigInstanceConfig};
pub use error::InstanceError;
pub use guard::{EvaluationLatch, EvaluationToken, SuppressGuard, Suppression};
pub use ids::{Component, RigHandle};
pub use instance::{
    ComponentRuntime, DnaProvider, EvaluationOutcome, EvaluationOverrides, RigInstance,
};
pub use listener::{SceneUpdate, UpdateListener};
pub use rbf_editor::{
    AvailableBone, ChangeTracker, DrivenSource, DrivenTransform, EditContext, MirrorPatterns,
    RbfEditor,
};
pub use registry::RigInstanceRegistry;
pub use scene::{RigArmature, RigScene};
