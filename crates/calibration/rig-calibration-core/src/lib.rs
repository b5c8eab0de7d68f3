//! rig-calibration-core: writing scene edits back into DNA
//!
//! * [`calibrator`] patches an existing DNA with what moved in the scene.
//! * [`exporter`] rebuilds joints and meshes of a DNA from the scene.
//! * [`validation`] checks a scene is exportable and suggests fixes.
//! * [`import`] builds scene meshes and shape keys from DNA through a
//!   cooperative [`queue`].
//! * [`session`] runs either direction against a [`rig_instance::RigInstance`].
//!
//! Scene data is Z-up in meters; DNA data is Y-up in its translation unit.
//! [`transforms`] holds the conversions.

pub mod calibrator;
pub mod error;
pub mod exporter;
pub mod import;
pub mod options;
pub mod queue;
pub mod scene;
pub mod session;
pub mod transforms;
pub mod validation;

pub use calibrator::{BodyAlignment, DnaCalibrator};
pub use error::CalibrationError;
pub use exporter::DnaExporter;
pub use import::{scene_mesh_from_dna, shape_key_import_items, ShapeKeyImport};
pub use options::CalibrationOptions;
pub use queue::{WorkItem, WorkQueue};
pub use scene::{main_mesh_name, CalibrationScene, ExportLods, ExportMesh};
pub use session::{run_calibration, run_export};
pub use transforms::{BoneTransforms, EdgeLoopMapping};
pub use validation::{export_validations, validate_export};
