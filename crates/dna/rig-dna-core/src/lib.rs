//! rig-dna-core: DNA accessor contract.
//!
//! Rig logic consumes a DNA asset only through [`DnaReader`] and mutates it
//! only through [`DnaWriter`]. The asset itself is a serde model
//! ([`DnaAsset`]) so fixtures and headless hosts can use JSON or a compact
//! binary encoding without a native accessor.

pub mod asset;
pub mod error;
pub mod layers;
pub mod rbf;
pub mod reader;
pub mod units;
pub mod writer;

pub use crate::asset::{
    AnimatedMapBehavior, Behavior, BlendShapeBehavior, BlendShapeTarget, ConditionalTable,
    Definition, Descriptor, DnaAsset, Geometry, JointBehavior, JointGroup, LodMapping, Mesh,
    PsdMatrix, RotationRepresentation, SkinWeights, VertexLayout,
};
pub use crate::error::DnaError;
pub use crate::layers::{DataLayer, UnknownLayerPolicy};
pub use crate::rbf::{
    RbfBehavior, RbfDistanceMethod, RbfDrivenRecord, RbfDriverRecord, RbfFunctionType,
    RbfNormalizeMethod, RbfPoseRecord, RbfSolverMode, RbfSolverRecord, SwingTwistSetup,
    TwistAxis, TwistSwingBehavior,
};
pub use crate::reader::{open_reader, DnaFormat, DnaReader, MemoryReader};
pub use crate::units::{
    CoordinateSystem, Direction, RotationUnit, TranslationUnit, SCALE_FACTOR,
};
pub use crate::writer::{DnaWriter, FileWriter, MemoryWriter, Status};
