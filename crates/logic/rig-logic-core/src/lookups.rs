//! Name and index lookups built once per rig component.

use hashbrown::{HashMap, HashSet};

use rig_dna::DnaReader;

use crate::constants::{ATTR_COUNT_PER_EULER_JOINT, SHAPE_KEY_NAME_MAX_LENGTH};
use crate::controls::ControlName;
use crate::scene::SceneMeshSource;

/// Scene object name of a DNA mesh: `"<instance>_<mesh>"`.
pub fn scene_mesh_name(instance: &str, dna_mesh: &str) -> String {
    format!("{instance}_{dna_mesh}")
}

/// Shape key name of a blend-shape channel on a DNA mesh: `"<mesh>__<channel>"`.
pub fn shape_key_name(dna_mesh: &str, channel: &str) -> String {
    format!("{dna_mesh}__{channel}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeKeyTarget {
    pub mesh_index: u16,
    /// Scene mesh object name.
    pub mesh: String,
    pub key: String,
}

/// Blend-shape channel to the scene shape keys it drives. Only LOD 0 meshes
/// carry shape keys.
#[derive(Clone, Debug, Default)]
pub struct ShapeKeyLookup {
    by_channel: HashMap<u16, Vec<ShapeKeyTarget>>,
}

impl ShapeKeyLookup {
    pub fn from_reader(reader: &dyn DnaReader, instance: &str) -> Self {
        let mut by_channel: HashMap<u16, Vec<ShapeKeyTarget>> = HashMap::new();
        for &mesh_index in reader.mesh_indices_for_lod(0) {
            let Some(dna_mesh) = reader.mesh_name(mesh_index) else {
                continue;
            };
            for target in 0..reader.blend_shape_target_count(mesh_index) {
                let Some(channel) = reader.blend_shape_channel_index(mesh_index, target) else {
                    continue;
                };
                let Some(channel_name) = reader.blend_shape_channel_name(channel) else {
                    continue;
                };
                by_channel.entry(channel).or_default().push(ShapeKeyTarget {
                    mesh_index,
                    mesh: scene_mesh_name(instance, dna_mesh),
                    key: shape_key_name(dna_mesh, channel_name),
                });
            }
        }
        Self { by_channel }
    }

    pub fn targets(&self, channel: u16) -> &[ShapeKeyTarget] {
        self.by_channel
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &ShapeKeyTarget)> {
        self.by_channel
            .iter()
            .flat_map(|(&channel, targets)| targets.iter().map(move |t| (channel, t)))
    }

    pub fn len(&self) -> usize {
        self.by_channel.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }

    /// Keys the scene does not have. Names the host cannot store are left out.
    pub fn missing_in(&self, scene: &dyn SceneMeshSource) -> Vec<String> {
        let mut missing: Vec<String> = self
            .iter()
            .map(|(_, target)| target)
            .filter(|t| t.key.len() <= SHAPE_KEY_NAME_MAX_LENGTH)
            .filter(|t| !scene.has_shape_key(&t.mesh, &t.key))
            .map(|t| t.key.clone())
            .collect();
        missing.sort();
        missing
    }
}

/// Bones driven through `q` raw controls on a head rig.
pub fn head_driver_bones(reader: &dyn DnaReader) -> HashSet<String> {
    (0..reader.raw_control_count())
        .filter_map(|i| reader.raw_control_name(i).and_then(ControlName::parse))
        .filter(|name| name.is_quaternion())
        .map(|name| name.control.to_string())
        .collect()
}

/// Every raw control bone of a body rig, plus the head driver bones that
/// also exist as body joints (neck and head).
pub fn body_driver_bones(
    reader: &dyn DnaReader,
    head: Option<&HashSet<String>>,
) -> HashSet<String> {
    let mut bones: HashSet<String> = (0..reader.raw_control_count())
        .filter_map(|i| reader.raw_control_name(i))
        .map(|name| name.split('.').next().unwrap_or(name).to_string())
        .collect();
    if let Some(head) = head {
        let joints: HashSet<&str> = (0..reader.joint_count())
            .filter_map(|j| reader.joint_name(j))
            .collect();
        bones.extend(
            head.iter()
                .filter(|bone| joints.contains(bone.as_str()))
                .cloned(),
        );
    }
    bones
}

/// Joints written by RBF poses.
pub fn driven_bones(reader: &dyn DnaReader) -> HashSet<String> {
    (0..reader.rbf_pose_count())
        .filter_map(|p| reader.rbf_pose(p))
        .flat_map(|pose| pose.driven.iter().map(|d| d.joint_index))
        .filter_map(|joint| reader.joint_name(joint).map(str::to_string))
        .collect()
}

pub fn twist_bones(reader: &dyn DnaReader) -> HashSet<String> {
    (0..reader.twist_count())
        .flat_map(|t| reader.twist_output_joint_indices(t).to_vec())
        .filter_map(|joint| reader.joint_name(joint).map(str::to_string))
        .collect()
}

pub fn swing_bones(reader: &dyn DnaReader) -> HashSet<String> {
    (0..reader.swing_count())
        .flat_map(|s| reader.swing_output_joint_indices(s).to_vec())
        .filter_map(|joint| reader.joint_name(joint).map(str::to_string))
        .collect()
}

/// Lookups shared by evaluation and editing of one rig component.
#[derive(Clone, Debug, Default)]
pub struct RigLookups {
    pub joint_index: HashMap<String, u16>,
    pub channel_index: HashMap<String, u16>,
    pub mesh_index: HashMap<String, u16>,
    /// Joints with at least one child joint.
    pub parent_joints: HashSet<u16>,
    pub shape_keys: ShapeKeyLookup,
    pub driver_bones: HashSet<String>,
    pub driven_bones: HashSet<String>,
    pub twist_bones: HashSet<String>,
    pub swing_bones: HashSet<String>,
}

impl RigLookups {
    fn common(reader: &dyn DnaReader) -> Self {
        let joint_index = (0..reader.joint_count())
            .filter_map(|j| reader.joint_name(j).map(|n| (n.to_string(), j)))
            .collect();
        let channel_index = (0..reader.blend_shape_channel_count())
            .filter_map(|c| reader.blend_shape_channel_name(c).map(|n| (n.to_string(), c)))
            .collect();
        let mesh_index = (0..reader.mesh_count())
            .filter_map(|m| reader.mesh_name(m).map(|n| (n.to_string(), m)))
            .collect();
        let parent_joints = (0..reader.joint_count())
            .filter_map(|j| reader.joint_parent_index(j))
            .collect();
        Self {
            joint_index,
            channel_index,
            mesh_index,
            parent_joints,
            ..Self::default()
        }
    }

    pub fn head(reader: &dyn DnaReader, instance: &str) -> Self {
        Self {
            shape_keys: ShapeKeyLookup::from_reader(reader, instance),
            driver_bones: head_driver_bones(reader),
            driven_bones: driven_bones(reader),
            ..Self::common(reader)
        }
    }

    pub fn body(reader: &dyn DnaReader, head: Option<&dyn DnaReader>) -> Self {
        let head_drivers = head.map(head_driver_bones);
        Self {
            driver_bones: body_driver_bones(reader, head_drivers.as_ref()),
            driven_bones: driven_bones(reader),
            twist_bones: twist_bones(reader),
            swing_bones: swing_bones(reader),
            ..Self::common(reader)
        }
    }

    /// Bones the body applier writes: RBF driven, swing and twist outputs.
    pub fn is_body_output(&self, bone: &str) -> bool {
        self.driven_bones.contains(bone)
            || self.swing_bones.contains(bone)
            || self.twist_bones.contains(bone)
    }

    pub fn has_children(&self, joint: u16) -> bool {
        self.parent_joints.contains(&joint)
    }

    /// Joint owning a Euler joint-output attribute index.
    pub fn joint_of_attribute(attribute: u16) -> u16 {
        attribute / ATTR_COUNT_PER_EULER_JOINT as u16
    }
}
