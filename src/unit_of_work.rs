//! The unit of work a send takes part in.
//!
//! Producers are released when the surrounding unit of work reaches a
//! terminal state, not when the send completes, so several sends inside one
//! unit of work can share a handle.

use futures::future::BoxFuture;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Deferred work run when a unit of work commits or rolls back.
pub type LifecycleHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub trait UnitOfWork: Send + Sync {
    fn on_prepare_commit(&self, hook: LifecycleHook);

    fn on_rollback(&self, hook: LifecycleHook);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Committed,
    RolledBack,
}

#[derive(Default)]
struct Hooks {
    prepare_commit: Vec<LifecycleHook>,
    rollback: Vec<LifecycleHook>,
}

/// A unit of work driven explicitly by its owner.
///
/// Hooks run in registration order when [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) is called. Hooks registered after the unit
/// of work finished are dropped.
pub struct DefaultUnitOfWork {
    hooks: Mutex<Hooks>,
    phase: Mutex<Phase>,
}

impl Default for DefaultUnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultUnitOfWork {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Hooks::default()),
            phase: Mutex::new(Phase::Started),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn commit(&self) {
        let hooks = self.finish(Phase::Committed, |hooks| std::mem::take(&mut hooks.prepare_commit));
        debug!("Committing unit of work ({} hooks)", hooks.len());
        for hook in hooks {
            hook().await;
        }
    }

    pub async fn rollback(&self) {
        let hooks = self.finish(Phase::RolledBack, |hooks| std::mem::take(&mut hooks.rollback));
        debug!("Rolling back unit of work ({} hooks)", hooks.len());
        for hook in hooks {
            hook().await;
        }
    }

    fn finish(
        &self,
        target: Phase,
        select: impl FnOnce(&mut Hooks) -> Vec<LifecycleHook>,
    ) -> Vec<LifecycleHook> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != Phase::Started {
            debug!("Unit of work already finished as {:?}", *phase);
            return Vec::new();
        }
        *phase = target;

        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        let selected = select(&mut hooks);
        *hooks = Hooks::default();
        selected
    }

    fn register(&self, hook: LifecycleHook, select: impl FnOnce(&mut Hooks) -> &mut Vec<LifecycleHook>) {
        let phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != Phase::Started {
            debug!("Ignoring hook registered on finished unit of work");
            return;
        }
        select(&mut self.hooks.lock().unwrap_or_else(PoisonError::into_inner)).push(hook);
    }
}

impl UnitOfWork for DefaultUnitOfWork {
    fn on_prepare_commit(&self, hook: LifecycleHook) {
        self.register(hook, |hooks| &mut hooks.prepare_commit);
    }

    fn on_rollback(&self, hook: LifecycleHook) {
        self.register(hook, |hooks| &mut hooks.rollback);
    }
}
