//! Scoped re-entrancy and notification guards.
//!
//! Both guards share their flag between clones so a registry can hand the
//! same latch to every instance. Everything here is single threaded.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::InstanceError;

/// Rejects nested evaluation. Clones share one flag.
#[derive(Clone, Debug, Default)]
pub struct EvaluationLatch {
    busy: Rc<Cell<bool>>,
}

impl EvaluationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the latch for the lifetime of the returned token.
    pub fn acquire(&self) -> Result<EvaluationToken, InstanceError> {
        if self.busy.replace(true) {
            return Err(InstanceError::EvaluationInProgress);
        }
        Ok(EvaluationToken {
            busy: Rc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }
}

/// Held while an evaluation runs; releases the latch on drop.
#[derive(Debug)]
#[must_use = "the latch is released as soon as the token is dropped"]
pub struct EvaluationToken {
    busy: Rc<Cell<bool>>,
}

impl Drop for EvaluationToken {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

/// Turns scene-update handling off while mutations that would retrigger it
/// run. Clones share one flag.
#[derive(Clone, Debug, Default)]
pub struct Suppression {
    suppressed: Rc<Cell<bool>>,
}

impl Suppression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress until the guard drops, then restore the previous state.
    pub fn suppress(&self) -> SuppressGuard {
        SuppressGuard {
            previous: self.suppressed.replace(true),
            suppressed: Rc::clone(&self.suppressed),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.get()
    }
}

#[derive(Debug)]
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressGuard {
    previous: bool,
    suppressed: Rc<Cell<bool>>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.suppressed.set(self.previous);
    }
}
