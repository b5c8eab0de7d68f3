//! Scene inputs of a calibration or export run and the LOD layout of the
//! meshes being written.

use std::collections::BTreeMap;

use rig_instance::Component;
use rig_logic::{scene_mesh_name, SceneBoneSource, SceneMeshSource};

use crate::transforms::lod_index;

/// Borrowed scene a run reads from.
#[derive(Clone, Copy)]
pub struct CalibrationScene<'a> {
    pub meshes: &'a dyn SceneMeshSource,
    pub head_rig: Option<&'a dyn SceneBoneSource>,
    pub body_rig: Option<&'a dyn SceneBoneSource>,
}

impl<'a> CalibrationScene<'a> {
    pub fn new(meshes: &'a dyn SceneMeshSource) -> Self {
        Self {
            meshes,
            head_rig: None,
            body_rig: None,
        }
    }

    pub fn with_head_rig(mut self, rig: &'a dyn SceneBoneSource) -> Self {
        self.head_rig = Some(rig);
        self
    }

    pub fn with_body_rig(mut self, rig: &'a dyn SceneBoneSource) -> Self {
        self.body_rig = Some(rig);
        self
    }

    /// Rig carrying the joints of `component`.
    pub fn rig(&self, component: Component) -> Option<&'a dyn SceneBoneSource> {
        match component {
            Component::Body => self.body_rig,
            Component::Head | Component::All => self.head_rig,
        }
    }
}

pub(crate) fn component_label(component: Component) -> &'static str {
    match component {
        Component::Head => "head",
        Component::Body => "body",
        Component::All => "rig",
    }
}

/// Scene name of the mesh that is always DNA mesh 0.
pub fn main_mesh_name(instance: &str, component: Component) -> String {
    scene_mesh_name(instance, &format!("{}_lod0_mesh", component_label(component)))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportMesh {
    pub scene_name: String,
    /// Name without the instance prefix, as stored in the DNA.
    pub dna_name: String,
    /// Index assigned when exporting.
    pub mesh_index: u16,
}

/// Meshes of one component grouped by LOD.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportLods {
    pub lods: BTreeMap<u16, Vec<ExportMesh>>,
    /// Meshes whose names carry no LOD tag.
    pub non_lod: Vec<String>,
}

impl ExportLods {
    /// The main mesh lands at LOD 0 with index 0. Other meshes of the
    /// instance follow sorted by DNA name; body meshes are the ones named
    /// `"<instance>_body_..."`. With `include_meshes` off only the main mesh
    /// is listed.
    pub fn collect(
        instance: &str,
        component: Component,
        meshes: &dyn SceneMeshSource,
        include_meshes: bool,
    ) -> Self {
        let prefix = format!("{instance}_");
        let body_prefix = format!("{instance}_body_");
        let main = main_mesh_name(instance, component);
        let mut collected = Self::default();

        let scene_names = meshes.mesh_names();
        if scene_names.contains(&main) {
            collected.lods.entry(0).or_default().push(ExportMesh {
                dna_name: main[prefix.len()..].to_string(),
                scene_name: main.clone(),
                mesh_index: 0,
            });
            if lod_index(&main).is_none() {
                collected.non_lod.push(main.clone());
            }
        } else {
            log::warn!("main mesh '{main}' is not in the scene");
        }
        if !include_meshes {
            return collected;
        }

        let mut others: Vec<&String> = scene_names
            .iter()
            .filter(|name| name.starts_with(&prefix) && **name != main)
            .filter(|name| name.starts_with(&body_prefix) == (component == Component::Body))
            .collect();
        // all share the prefix, so this orders by DNA name
        others.sort();

        let mut next_index = 1u16;
        for name in others {
            match lod_index(name) {
                Some(lod) => {
                    collected.lods.entry(lod).or_default().push(ExportMesh {
                        scene_name: name.clone(),
                        dna_name: name[prefix.len()..].to_string(),
                        mesh_index: next_index,
                    });
                    next_index += 1;
                }
                None => collected.non_lod.push(name.clone()),
            }
        }
        collected
    }

    pub fn meshes(&self) -> impl Iterator<Item = (u16, &ExportMesh)> {
        self.lods
            .iter()
            .flat_map(|(&lod, meshes)| meshes.iter().map(move |mesh| (lod, mesh)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_logic::{MemoryScene, SceneMesh};

    fn scene(names: &[&str]) -> MemoryScene {
        let mut scene = MemoryScene::new();
        for name in names {
            scene.add_mesh(SceneMesh {
                name: name.to_string(),
                ..SceneMesh::default()
            });
        }
        scene
    }

    #[test]
    fn head_meshes_are_grouped_by_lod() {
        let scene = scene(&[
            "ada_teeth_lod1_mesh",
            "ada_head_lod0_mesh",
            "ada_eyes_lod0_mesh",
            "ada_body_lod0_mesh",
            "ada_saliva",
            "bo_head_lod0_mesh",
        ]);
        let lods = ExportLods::collect("ada", Component::Head, &scene, true);
        let names: Vec<(u16, &str, u16)> = lods
            .meshes()
            .map(|(lod, m)| (lod, m.dna_name.as_str(), m.mesh_index))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, "head_lod0_mesh", 0),
                (0, "eyes_lod0_mesh", 1),
                (1, "teeth_lod1_mesh", 2)
            ]
        );
        assert_eq!(lods.non_lod, vec!["ada_saliva"]);

        let main_only = ExportLods::collect("ada", Component::Head, &scene, false);
        assert_eq!(main_only.meshes().count(), 1);
    }

    #[test]
    fn body_takes_only_body_meshes() {
        let scene = scene(&["ada_head_lod0_mesh", "ada_body_lod0_mesh", "ada_body_lod1_mesh"]);
        let lods = ExportLods::collect("ada", Component::Body, &scene, true);
        assert_eq!(lods.lods.len(), 2);
        assert_eq!(lods.lods[&1][0].dna_name, "body_lod1_mesh");
        assert!(lods.non_lod.is_empty());
    }
}
