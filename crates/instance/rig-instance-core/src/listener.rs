//! Maps host scene notifications to rig evaluations.
//!
//! The host reports what changed since the last notification; the listener
//! answers with the minimal list of `(instance, component)` evaluations,
//! collapsed so each instance appears at most once.

use crate::guard::Suppression;
use crate::ids::{Component, RigHandle};
use crate::instance::RigInstance;
use crate::registry::RigInstanceRegistry;

/// A change reported by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SceneUpdate {
    /// An action's keys changed or it was re-sampled.
    ActionChanged { name: String },
    /// An armature's pose changed. Duplicated names (`"rig.001"`) match by
    /// their base name.
    ArmatureTransformed { name: String },
    /// A frame is being rendered; every auto-evaluated component runs.
    RenderFrame,
}

#[derive(Debug, Default)]
pub struct UpdateListener {
    suppression: Suppression,
    skip_next: bool,
}

fn base_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// The armature's base name must equal the binding's, or be its last
/// `_`-separated part.
fn bound_to(binding: &Option<String>, armature: &str) -> bool {
    let armature = base_name(armature);
    binding.as_deref().map(base_name).is_some_and(|bound| {
        bound == armature
            || bound
                .strip_suffix(armature)
                .is_some_and(|prefix| prefix.ends_with('_'))
    })
}

fn uses_action(binding: &Option<String>, action: &str) -> bool {
    binding.as_deref() == Some(action)
}

/// Component to evaluate when the body side of `instance` moved. Head
/// driver bones live on the body rig, so the head follows when it reads them.
fn body_component(instance: &RigInstance) -> Component {
    let config = &instance.config;
    if instance.bindings.head_rig.is_some() && config.auto_evaluate_head && config.evaluate_rbfs
    {
        Component::All
    } else {
        Component::Body
    }
}

impl UpdateListener {
    pub fn new(suppression: Suppression) -> Self {
        Self {
            suppression,
            skip_next: false,
        }
    }

    /// Listener sharing the registry's suppression flag.
    pub fn for_registry(registry: &RigInstanceRegistry) -> Self {
        Self::new(registry.suppression().clone())
    }

    /// Undo is about to run: release every runtime and ignore the update
    /// the undo itself produces.
    pub fn pre_undo(&mut self, registry: &mut RigInstanceRegistry) {
        registry.destroy_all();
        self.skip_next = true;
    }

    pub fn collect<'a, I>(
        &mut self,
        instances: I,
        updates: &[SceneUpdate],
        frame_change: bool,
        pose_mode: bool,
    ) -> Vec<(RigHandle, Component)>
    where
        I: IntoIterator<Item = (RigHandle, &'a RigInstance)>,
    {
        if self.suppression.is_suppressed() {
            return Vec::new();
        }
        if std::mem::take(&mut self.skip_next) {
            log::trace!("skipping scene update produced by undo");
            return Vec::new();
        }

        let mut collected: Vec<(RigHandle, Component)> = Vec::new();
        let mut add = |handle: RigHandle, component: Component| {
            match collected.iter_mut().find(|(h, _)| *h == handle) {
                Some((_, existing)) => *existing = existing.merge(component),
                None => collected.push((handle, component)),
            }
        };

        let rendering = updates.contains(&SceneUpdate::RenderFrame);
        let watching = frame_change || pose_mode;
        for (handle, instance) in instances {
            let config = &instance.config;
            if !config.auto_evaluate {
                continue;
            }
            if rendering {
                if config.auto_evaluate_head {
                    add(handle, Component::Head);
                }
                if config.auto_evaluate_body {
                    add(handle, Component::Body);
                }
            }
            if !watching {
                continue;
            }
            let bindings = &instance.bindings;
            for update in updates {
                match update {
                    SceneUpdate::ActionChanged { name } => {
                        if config.auto_evaluate_head
                            && uses_action(&bindings.face_board_action, name)
                        {
                            add(handle, Component::Head);
                        } else if config.auto_evaluate_body
                            && (uses_action(&bindings.body_rig_action, name)
                                || uses_action(&bindings.control_rig_action, name))
                        {
                            add(handle, body_component(instance));
                        }
                    }
                    SceneUpdate::ArmatureTransformed { name } => {
                        if config.auto_evaluate_head && bound_to(&bindings.face_board, name) {
                            add(handle, Component::Head);
                        } else if config.auto_evaluate_body
                            && (bound_to(&bindings.body_rig, name)
                                || bound_to(&bindings.control_rig, name))
                        {
                            add(handle, body_component(instance));
                        }
                    }
                    SceneUpdate::RenderFrame => {}
                }
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigBindings;

    fn bound(name: &str) -> RigInstance {
        RigInstance::new(name).with_bindings(RigBindings {
            head_rig: Some(format!("{name}_head_rig")),
            body_rig: Some(format!("{name}_body_rig")),
            face_board: Some(format!("{name}_face_board")),
            face_board_action: Some(format!("{name}_face_anim")),
            body_rig_action: Some(format!("{name}_body_anim")),
            ..Default::default()
        })
    }

    fn handle(index: u32) -> RigHandle {
        RigHandle {
            index,
            generation: 0,
        }
    }

    fn transformed(name: &str) -> SceneUpdate {
        SceneUpdate::ArmatureTransformed { name: name.into() }
    }

    #[test]
    fn head_and_body_updates_collapse_to_all() {
        let mut ada = bound("ada");
        ada.config.evaluate_rbfs = false;
        let mut listener = UpdateListener::default();
        let updates = [transformed("ada_face_board"), transformed("ada_body_rig.001")];
        let result = listener.collect([(handle(0), &ada)], &updates, false, true);
        assert_eq!(result, vec![(handle(0), Component::All)]);

        let result = listener.collect([(handle(0), &ada)], &updates[1..], false, true);
        assert_eq!(result, vec![(handle(0), Component::Body)]);
    }

    #[test]
    fn body_motion_also_drives_the_head() {
        let ada = bound("ada");
        let mut listener = UpdateListener::default();
        let updates = [SceneUpdate::ActionChanged {
            name: "ada_body_anim".into(),
        }];
        assert!(listener
            .collect([(handle(0), &ada)], &updates, false, false)
            .is_empty());
        assert_eq!(
            listener.collect([(handle(0), &ada)], &updates, true, false),
            vec![(handle(0), Component::All)]
        );
    }

    #[test]
    fn disabled_components_and_other_rigs_are_ignored() {
        let mut ada = bound("ada");
        ada.config.auto_evaluate_head = false;
        let bo = bound("bo");
        let mut listener = UpdateListener::default();
        let result = listener.collect(
            [(handle(0), &ada), (handle(1), &bo)],
            &[transformed("ada_face_board")],
            false,
            true,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn armature_names_match_whole_name_parts() {
        let ada = bound("ada");
        let mut listener = UpdateListener::default();
        for name in ["oard", "a_face_board", "bo_face_board", "ada_face_boards", "xface_board"] {
            let result = listener.collect([(handle(0), &ada)], &[transformed(name)], false, true);
            assert!(result.is_empty(), "{name} matched");
        }
        for name in ["ada_face_board.002", "face_board"] {
            let result = listener.collect([(handle(0), &ada)], &[transformed(name)], false, true);
            assert_eq!(result, vec![(handle(0), Component::Head)], "{name}");
        }
    }

    #[test]
    fn render_frames_evaluate_everything_once() {
        let ada = bound("ada");
        let mut bo = bound("bo");
        bo.config.auto_evaluate = false;
        let mut listener = UpdateListener::default();
        let result = listener.collect(
            [(handle(0), &ada), (handle(1), &bo)],
            &[SceneUpdate::RenderFrame, transformed("ada_face_board")],
            true,
            false,
        );
        assert_eq!(result, vec![(handle(0), Component::All)]);
    }

    #[test]
    fn undo_skips_one_round_and_suppression_skips_all() {
        let mut registry = RigInstanceRegistry::new();
        let h = registry.insert(bound("ada"));
        let mut listener = UpdateListener::for_registry(&registry);
        let updates = [transformed("ada_face_board")];

        listener.pre_undo(&mut registry);
        assert!(listener
            .collect(registry.iter(), &updates, false, true)
            .is_empty());
        assert_eq!(
            listener.collect(registry.iter(), &updates, false, true),
            vec![(h, Component::Head)]
        );

        let _quiet = registry.suppression().suppress();
        assert!(listener
            .collect(registry.iter(), &updates, false, true)
            .is_empty());
    }
}
