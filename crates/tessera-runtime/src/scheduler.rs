#![forbid(unsafe_code)]

//! Render scheduler bridge.
//!
//! The membrane needs three things from whoever drives rendering: who is
//! rendering right now, a way to ask for a re-render, and what error to raise
//! when state is mutated mid-render. [`RenderBridge`] is that contract.
//! [`Scheduler`] is the implementation the runtime uses: an observer stack for
//! (possibly nested) render passes plus a deduplicating queue drained by the
//! runtime's flush.
//!
//! # Invariants
//!
//! 1. At most one observer is current: the top of the render stack.
//! 2. An observer is queued at most once between flushes, however many
//!    writes it depends on.
//! 3. Queue order is first-request order.
//! 4. A cancelled observer is removed from the queue and never handed out.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use ahash::AHashSet;

use crate::error::RuntimeError;

/// Identity of a render observer (a component element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// What the membrane consumes from the render scheduler.
pub trait RenderBridge {
    /// The observer whose render pass is executing, if any.
    fn current_observer(&self) -> Option<ObserverId>;

    /// Ask for `observer` to re-render at the next flush.
    fn schedule_rerender(&self, observer: ObserverId);

    /// Error for a write to `target` while a render pass is active.
    fn mutation_during_render(&self, target: &str) -> RuntimeError {
        RuntimeError::RenderPurity {
            component: self
                .current_observer()
                .map(|o| o.to_string())
                .unwrap_or_default(),
            target: target.to_string(),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    stack: Vec<(ObserverId, String)>,
    queue: VecDeque<ObserverId>,
    queued: AHashSet<ObserverId>,
    enqueued_total: u64,
    coalesced_total: u64,
}

/// Observer stack plus microtask-style re-render queue.
#[derive(Default)]
pub struct Scheduler {
    state: RefCell<SchedulerState>,
}

/// Pops the observer pushed by [`Scheduler::enter`] when dropped.
#[must_use = "the render pass ends when the guard is dropped"]
pub struct RenderGuard<'a> {
    scheduler: &'a Scheduler,
    observer: ObserverId,
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.scheduler.state.borrow_mut();
        let popped = state.stack.pop();
        debug_assert_eq!(popped.map(|(o, _)| o), Some(self.observer));
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render pass for `observer`; `label` names it in diagnostics.
    pub fn enter(&self, observer: ObserverId, label: impl Into<String>) -> RenderGuard<'_> {
        self.state
            .borrow_mut()
            .stack
            .push((observer, label.into()));
        RenderGuard {
            scheduler: self,
            observer,
        }
    }

    /// Whether any render pass is active.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        !self.state.borrow().stack.is_empty()
    }

    /// Render nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.borrow().stack.len()
    }

    /// Drain the queue in request order.
    pub fn take_queue(&self) -> Vec<ObserverId> {
        let mut state = self.state.borrow_mut();
        state.queued.clear();
        state.queue.drain(..).collect()
    }

    /// Number of observers waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    #[must_use]
    pub fn is_queued(&self, observer: ObserverId) -> bool {
        self.state.borrow().queued.contains(&observer)
    }

    /// Drop a pending re-render. Returns whether one was queued.
    pub fn cancel(&self, observer: ObserverId) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.queued.remove(&observer) {
            return false;
        }
        state.queue.retain(|o| *o != observer);
        tracing::trace!(message = "scheduler.cancel", observer = %observer);
        true
    }

    /// Total re-render requests that entered the queue.
    #[must_use]
    pub fn enqueued_total(&self) -> u64 {
        self.state.borrow().enqueued_total
    }

    /// Total re-render requests folded into an already-queued entry.
    #[must_use]
    pub fn coalesced_total(&self) -> u64 {
        self.state.borrow().coalesced_total
    }
}

impl RenderBridge for Scheduler {
    fn current_observer(&self) -> Option<ObserverId> {
        self.state.borrow().stack.last().map(|(o, _)| *o)
    }

    fn schedule_rerender(&self, observer: ObserverId) {
        let mut state = self.state.borrow_mut();
        if state.queued.insert(observer) {
            state.queue.push_back(observer);
            state.enqueued_total += 1;
            tracing::trace!(message = "scheduler.enqueue", observer = %observer);
        } else {
            state.coalesced_total += 1;
        }
    }

    fn mutation_during_render(&self, target: &str) -> RuntimeError {
        let state = self.state.borrow();
        let component = state
            .stack
            .last()
            .map(|(_, label)| label.clone())
            .unwrap_or_default();
        RuntimeError::RenderPurity {
            component,
            target: target.to_string(),
        }
    }
}
