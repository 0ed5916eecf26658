#![forbid(unsafe_code)]

//! The runtime: one membrane, one scheduler, one adapter registry, and the
//! elements created from them.
//!
//! A `Runtime` belongs to one UI thread. Writes made in the current turn
//! queue re-renders; [`Runtime::flush`] is the microtask boundary that runs
//! them. Renders that write state are errors when dev checks are on; with
//! them off, a flush that never settles stops after
//! [`RuntimeConfig::max_flush_passes`] passes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tessera_core::{AdapterId, ComponentClass, get_component_def};

use crate::config::RuntimeConfig;
use crate::element::{Behavior, Element, ElementInner};
use crate::error::{Result, RuntimeError};
use crate::reactive::Membrane;
use crate::scheduler::{ObserverId, RenderBridge, Scheduler};
use crate::wire::{AdapterRegistry, WireAdapter};

/// Outcome of one [`Runtime::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Queue drains performed.
    pub passes: usize,
    /// Re-render requests taken from the queue.
    pub queued: usize,
    /// Render passes run.
    pub rendered: usize,
    /// Requests for elements that were gone or disconnected.
    pub dropped: usize,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) scheduler: Rc<Scheduler>,
    pub(crate) membrane: Membrane,
    pub(crate) adapters: RefCell<AdapterRegistry>,
    elements: RefCell<AHashMap<ObserverId, Weak<ElementInner>>>,
    renders_total: Cell<u64>,
    flushes_total: Cell<u64>,
    dropped_total: Cell<u64>,
}

impl RuntimeInner {
    pub(crate) fn remember_element(&self, observer: ObserverId, element: &Rc<ElementInner>) {
        self.elements
            .borrow_mut()
            .insert(observer, Rc::downgrade(element));
    }

    pub(crate) fn forget_element(&self, observer: ObserverId) {
        if let Ok(mut elements) = self.elements.try_borrow_mut() {
            elements.remove(&observer);
        }
    }

    pub(crate) fn record_render(&self) {
        self.renders_total.set(self.renders_total.get() + 1);
    }

    pub(crate) fn record_dropped(&self, n: u64) {
        self.dropped_total.set(self.dropped_total.get() + n);
    }

    fn element(&self, observer: ObserverId) -> Option<Element> {
        let inner = self.elements.borrow().get(&observer).and_then(Weak::upgrade);
        inner.map(Element::from_inner)
    }
}

/// Shared handle to a runtime. Clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("live_elements", &self.live_elements())
            .field("pending", &self.pending())
            .field("membrane", &self.inner.membrane)
            .finish()
    }
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Runtime configured from `TESSERA_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        let scheduler = Rc::new(Scheduler::new());
        let bridge: Rc<dyn RenderBridge> = scheduler.clone();
        let membrane = Membrane::new(bridge, &config);
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                scheduler,
                membrane,
                adapters: RefCell::new(AdapterRegistry::new()),
                elements: RefCell::new(AHashMap::new()),
                renders_total: Cell::new(0),
                flushes_total: Cell::new(0),
                dropped_total: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn membrane(&self) -> &Membrane {
        &self.inner.membrane
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Register a wire adapter constructor. Returns `true` if it replaced an
    /// earlier registration under the same name.
    pub fn register_adapter<F, A>(&self, id: impl Into<AdapterId>, factory: F) -> bool
    where
        F: Fn() -> A + 'static,
        A: WireAdapter + 'static,
    {
        self.inner.adapters.borrow_mut().register(id, factory)
    }

    /// Instantiate `class` as a new element named `tag`.
    ///
    /// Compiles the definition on first use; definition errors abort creation.
    pub fn create_element(
        &self,
        tag: &str,
        class: &ComponentClass,
        behavior: Behavior,
    ) -> Result<Element> {
        let def = get_component_def(class)?;
        Element::create(Rc::clone(&self.inner), tag, def, behavior)
    }

    /// The live element registered for `observer`.
    #[must_use]
    pub fn element(&self, observer: ObserverId) -> Option<Element> {
        self.inner.element(observer)
    }

    /// Elements created and not yet destroyed or dropped.
    #[must_use]
    pub fn live_elements(&self) -> usize {
        self.inner
            .elements
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Re-renders waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.scheduler.pending()
    }

    /// Run queued re-renders until the queue is empty.
    ///
    /// Renders scheduled while flushing run in a later pass of the same
    /// flush. A render error stops the flush; requests not yet handled stay
    /// queued.
    pub fn flush(&self) -> Result<FlushReport> {
        let inner = &self.inner;
        let span = tracing::debug_span!(
            "scheduler.flush",
            queued = tracing::field::Empty,
            rendered = tracing::field::Empty,
            dropped = tracing::field::Empty
        )
        .entered();
        let mut report = FlushReport::default();
        let max_passes = inner.config.max_flush_passes.max(1);

        loop {
            let batch = inner.scheduler.take_queue();
            if batch.is_empty() {
                break;
            }
            if report.passes >= max_passes {
                for observer in batch {
                    inner.scheduler.schedule_rerender(observer);
                }
                tracing::warn!(
                    message = "scheduler.flush_limit",
                    passes = report.passes,
                    pending = inner.scheduler.pending()
                );
                return Err(RuntimeError::FlushLimitExceeded {
                    passes: report.passes,
                });
            }
            report.passes += 1;
            report.queued += batch.len();

            let mut remaining = batch.into_iter();
            while let Some(observer) = remaining.next() {
                match inner.element(observer) {
                    Some(element) if element.is_connected() => {
                        if let Err(err) = element.render() {
                            remaining
                                .by_ref()
                                .for_each(|o| inner.scheduler.schedule_rerender(o));
                            return Err(err);
                        }
                        report.rendered += 1;
                    }
                    _ => {
                        tracing::trace!(message = "scheduler.drop", observer = %observer);
                        report.dropped += 1;
                    }
                }
            }
        }

        span.record("queued", report.queued);
        span.record("rendered", report.rendered);
        span.record("dropped", report.dropped);
        inner.flushes_total.set(inner.flushes_total.get() + 1);
        inner.record_dropped(report.dropped as u64);
        Ok(report)
    }

    /// Render passes run by this runtime, including first renders.
    #[must_use]
    pub fn renders_total(&self) -> u64 {
        self.inner.renders_total.get()
    }

    /// Completed flushes.
    #[must_use]
    pub fn flushes_total(&self) -> u64 {
        self.inner.flushes_total.get()
    }

    /// Re-render requests dropped because their element was gone.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;
    use std::sync::Arc;
    use tessera_core::PropDecl;

    fn class() -> Arc<ComponentClass> {
        ComponentClass::extending_base("Greeting")
            .public_prop("name", PropDecl::inferred())
            .build()
    }

    fn reads_name() -> Behavior {
        Behavior::new().with_render(|el| el.get("name").map(drop))
    }

    #[test]
    fn flush_renders_dirty_elements_once() {
        let runtime = Runtime::new();
        let el = runtime
            .create_element("x-greeting", &class(), reads_name())
            .expect("valid");
        el.connect().expect("connect");
        el.set("name", "a").expect("set");
        el.set("name", "b").expect("set");
        let report = runtime.flush().expect("flush");
        assert_eq!(
            report,
            FlushReport {
                passes: 1,
                queued: 1,
                rendered: 1,
                dropped: 0,
            }
        );
        assert_eq!(el.render_count(), 2);
        assert_eq!(runtime.renders_total(), 2);
        assert_eq!(runtime.flush().expect("idle flush"), FlushReport::default());
        assert_eq!(runtime.flushes_total(), 2);
    }

    #[test]
    fn dropped_element_leaves_registry() {
        let runtime = Runtime::new();
        let el = runtime
            .create_element("x-greeting", &class(), reads_name())
            .expect("valid");
        let observer = el.observer();
        el.connect().expect("connect");
        el.set("name", "a").expect("set");
        assert_eq!(runtime.pending(), 1);
        drop(el);
        assert_eq!(runtime.pending(), 0);
        assert_eq!(runtime.live_elements(), 0);
        assert!(runtime.element(observer).is_none());
        assert_eq!(runtime.dropped_total(), 1);
    }

    #[test]
    fn flush_limit_stops_runaway_renders() {
        let runtime = Runtime::with_config(
            RuntimeConfig::default()
                .with_dev_checks(false)
                .with_max_flush_passes(3),
        );
        let behavior = Behavior::new().with_render(|el| {
            let n = el.get("name")?.as_number().unwrap_or(0.0);
            el.set("name", Value::from(n + 1.0))
        });
        let el = runtime
            .create_element("x-greeting", &class(), behavior)
            .expect("valid");
        el.connect().expect("first render");
        let err = runtime.flush().expect_err("never settles");
        assert!(matches!(err, RuntimeError::FlushLimitExceeded { passes: 3 }));
        assert_eq!(runtime.pending(), 1);
    }

    #[test]
    fn zero_pass_limit_still_renders_one_pass() {
        let runtime = Runtime::with_config(RuntimeConfig {
            max_flush_passes: 0,
            ..RuntimeConfig::default()
        });
        let el = runtime
            .create_element("x-greeting", &class(), reads_name())
            .expect("valid");
        el.connect().expect("first render");
        el.set("name", "a").expect("set");
        let report = runtime.flush().expect("one pass is always allowed");
        assert_eq!(report.passes, 1);
        assert_eq!(report.rendered, 1);
    }

    #[test]
    fn definition_errors_abort_creation() {
        let runtime = Runtime::new();
        let bad = ComponentClass::plain("NotAComponent").build();
        let err = runtime
            .create_element("x-bad", &bad, Behavior::new())
            .expect_err("plain class");
        assert!(matches!(err, RuntimeError::Definition(_)));
        assert_eq!(runtime.live_elements(), 0);
    }
}
