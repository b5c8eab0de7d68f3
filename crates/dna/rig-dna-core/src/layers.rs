//! Layer masks used by `set_from` to copy part or all of an asset.

use serde::{Deserialize, Serialize};

use crate::asset::DnaAsset;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DataLayer {
    Descriptor,
    /// Descriptor + definition.
    Definition,
    /// Definition + behavior.
    Behavior,
    /// Definition + geometry.
    Geometry,
    /// Definition + geometry, without blend-shape targets.
    GeometryWithoutBlendShapes,
    /// Behavior + RBF solvers and poses.
    RbfBehavior,
    /// Behavior + twist/swing setups.
    TwistSwingBehavior,
    All,
}

/// What happens to layers the accessor does not interpret.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum UnknownLayerPolicy {
    #[default]
    Preserve,
    Ignore,
}

impl DataLayer {
    fn has_definition(self) -> bool {
        !matches!(self, DataLayer::Descriptor)
    }

    fn has_behavior(self) -> bool {
        matches!(
            self,
            DataLayer::Behavior
                | DataLayer::RbfBehavior
                | DataLayer::TwistSwingBehavior
                | DataLayer::All
        )
    }

    fn has_geometry(self) -> bool {
        matches!(
            self,
            DataLayer::Geometry | DataLayer::GeometryWithoutBlendShapes | DataLayer::All
        )
    }
}

impl DnaAsset {
    /// Copy the layers selected by `layer` from `source`.
    pub fn copy_layers(&mut self, source: &DnaAsset, layer: DataLayer, policy: UnknownLayerPolicy) {
        self.descriptor = source.descriptor.clone();
        if layer.has_definition() {
            self.definition = source.definition.clone();
        }
        if layer.has_behavior() {
            self.behavior = source.behavior.clone();
        }
        if layer.has_geometry() {
            self.geometry = source.geometry.clone();
            if layer == DataLayer::GeometryWithoutBlendShapes {
                for mesh in &mut self.geometry.meshes {
                    mesh.blend_shape_targets.clear();
                }
            }
        }
        if matches!(layer, DataLayer::RbfBehavior | DataLayer::All) {
            self.rbf = source.rbf.clone();
        }
        if matches!(layer, DataLayer::TwistSwingBehavior | DataLayer::All) {
            self.twist_swing = source.twist_swing.clone();
        }
        if policy == UnknownLayerPolicy::Preserve {
            self.unknown = source.unknown.clone();
        }
    }
}
