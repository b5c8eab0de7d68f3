//! Process-wide set of rig instances.
//!
//! Slots are reused through a free list; each reuse bumps the slot
//! generation so old [`RigHandle`]s are rejected instead of aliasing the new
//! instance. Every instance shares the registry's evaluation latch and
//! suppression flag.

use crate::error::InstanceError;
use crate::guard::{EvaluationLatch, Suppression};
use crate::ids::{Component, RigHandle};
use crate::instance::{EvaluationOutcome, RigInstance};
use crate::scene::RigScene;

#[derive(Debug)]
struct Slot {
    generation: u32,
    instance: Option<RigInstance>,
}

#[derive(Debug, Default)]
pub struct RigInstanceRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    latch: EvaluationLatch,
    suppression: Suppression,
}

impl RigInstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    pub fn latch(&self) -> &EvaluationLatch {
        &self.latch
    }

    pub fn insert(&mut self, mut instance: RigInstance) -> RigHandle {
        instance.share_guards(self.latch.clone(), self.suppression.clone());
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.instance = Some(instance);
            return RigHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            instance: Some(instance),
        });
        RigHandle {
            index,
            generation: 0,
        }
    }

    fn stale(handle: RigHandle) -> InstanceError {
        InstanceError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        }
    }

    pub fn get(&self, handle: RigHandle) -> Result<&RigInstance, InstanceError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.instance.as_ref())
            .ok_or_else(|| Self::stale(handle))
    }

    pub fn get_mut(&mut self, handle: RigHandle) -> Result<&mut RigInstance, InstanceError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.instance.as_mut())
            .ok_or_else(|| Self::stale(handle))
    }

    pub fn find(&self, name: &str) -> Option<RigHandle> {
        self.iter()
            .find(|(_, instance)| instance.name() == name)
            .map(|(handle, _)| handle)
    }

    /// Remove an instance, destroying its runtimes.
    pub fn remove(&mut self, handle: RigHandle) -> Result<RigInstance, InstanceError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or_else(|| Self::stale(handle))?;
        let mut instance = slot.instance.take().ok_or_else(|| Self::stale(handle))?;
        instance.destroy();
        self.free.push(handle.index);
        Ok(instance)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.instance.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live instances in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (RigHandle, &RigInstance)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.instance.as_ref().map(|instance| {
                (
                    RigHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    instance,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RigHandle, &mut RigInstance)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.instance.as_mut().map(|instance| {
                (
                    RigHandle {
                        index: index as u32,
                        generation,
                    },
                    instance,
                )
            })
        })
    }

    /// Release the runtimes of every instance, e.g. before a scene reload.
    pub fn destroy_all(&mut self) {
        for (_, instance) in self.iter_mut() {
            instance.destroy();
        }
    }

    /// Run `init` for every instance. Failures are logged and collected so
    /// one broken rig does not stop the others.
    pub fn initialize_all<F>(&mut self, mut init: F) -> Vec<(RigHandle, InstanceError)>
    where
        F: FnMut(RigHandle, &mut RigInstance) -> Result<(), InstanceError>,
    {
        let mut failures = Vec::new();
        for (handle, instance) in self.iter_mut() {
            if let Err(err) = init(handle, instance) {
                log::error!(
                    "failed to initialize rig '{}': {err} [{}]",
                    instance.name(),
                    err.category()
                );
                failures.push((handle, err));
            }
        }
        failures
    }

    pub fn evaluate(
        &mut self,
        handle: RigHandle,
        component: Component,
        scene: &mut RigScene<'_>,
    ) -> Result<EvaluationOutcome, InstanceError> {
        self.get_mut(handle)?.evaluate(component, scene)
    }

    /// Run `evaluate` for the `(instance, component)` pairs in order. The
    /// closure lends each instance its scene. Nothing runs while updates are
    /// suppressed.
    pub fn dispatch<F>(
        &mut self,
        updates: &[(RigHandle, Component)],
        mut evaluate: F,
    ) -> Vec<(RigHandle, Result<EvaluationOutcome, InstanceError>)>
    where
        F: FnMut(&mut RigInstance, Component) -> Result<EvaluationOutcome, InstanceError>,
    {
        if self.suppression.is_suppressed() {
            log::trace!("skipping {} rig update(s) while suppressed", updates.len());
            return Vec::new();
        }
        updates
            .iter()
            .map(|&(handle, component)| {
                let result = self
                    .get_mut(handle)
                    .and_then(|instance| evaluate(instance, component));
                if let Err(err) = &result {
                    log::warn!("rig update of {handle:?} failed: {err}");
                }
                (handle, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slots_reject_old_handles() {
        let mut registry = RigInstanceRegistry::new();
        let first = registry.insert(RigInstance::new("ada"));
        let second = registry.insert(RigInstance::new("bo"));
        assert_eq!(registry.len(), 2);

        let removed = registry.remove(first).unwrap();
        assert_eq!(removed.name(), "ada");
        assert_eq!(
            registry.get(first).unwrap_err(),
            InstanceError::StaleHandle {
                index: 0,
                generation: 0
            }
        );

        let third = registry.insert(RigInstance::new("cy"));
        assert_eq!(third.index, first.index);
        assert_ne!(third.generation, first.generation);
        assert!(registry.get(first).is_err());
        assert_eq!(registry.get(third).unwrap().name(), "cy");
        assert_eq!(registry.find("bo"), Some(second));
        assert!(registry.remove(first).is_err());
    }

    #[test]
    fn instances_share_the_registry_latch() {
        let mut registry = RigInstanceRegistry::new();
        let handle = registry.insert(RigInstance::new("ada"));
        let _token = registry.latch().acquire().unwrap();
        let mut scene = RigScene::new();
        assert_eq!(
            registry
                .evaluate(handle, Component::All, &mut scene)
                .unwrap_err(),
            InstanceError::EvaluationInProgress
        );
    }

    #[test]
    fn suppressed_dispatch_runs_nothing() {
        let mut registry = RigInstanceRegistry::new();
        let handle = registry.insert(RigInstance::new("ada"));
        let mut calls = 0;
        {
            let _quiet = registry.suppression().suppress();
            let results = registry.dispatch(&[(handle, Component::Head)], |_, _| {
                calls += 1;
                Ok(EvaluationOutcome::default())
            });
            assert!(results.is_empty());
        }
        let results = registry.dispatch(&[(handle, Component::Head)], |_, _| {
            calls += 1;
            Ok(EvaluationOutcome::default())
        });
        assert_eq!(results.len(), 1);
        assert_eq!(calls, 1);
    }
}
