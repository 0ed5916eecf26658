#![forbid(unsafe_code)]

//! The reactive membrane.
//!
//! [`Membrane::wrap`] turns plain containers into [`ReactiveProxy`] handles.
//! Every read through a proxy while an observer is rendering records an edge
//! `(container, key) -> observer`; every write that changes a value schedules
//! each observer on that edge through the [`RenderBridge`].
//!
//! # Architecture
//!
//! The membrane is `Rc`-shared and single-threaded, like the rest of the
//! runtime. The identity cache maps a container id to a `Weak` proxy, so a
//! proxy lives exactly as long as some handle to it does and wrapping the same
//! container again while it lives returns the same proxy. Raw containers only
//! ever store raw values: proxies are unwrapped on write and nested containers
//! are wrapped lazily on read.
//!
//! # Invariants
//!
//! 1. `wrap(x).is_same(&wrap(x))` for any plain container `x` while a handle
//!    to the first proxy is alive.
//! 2. Primitives and non-trackable objects pass through `wrap` unchanged.
//! 3. An observer appears at most once per `(container, key)` edge.
//! 4. Writing a value identical to the current one notifies nobody.
//! 5. Any proxy write while a render pass is active fails with the bridge's
//!    render-purity error and leaves the container untouched.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use super::value::{Container, Key, TargetId, Value};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::scheduler::{ObserverId, RenderBridge};

/// What a dependency edge is recorded against on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    /// A single property or field.
    Prop(Key),
    /// The key set of an object, or the length of an array.
    Shape,
}

#[derive(Default)]
struct DependencyTable {
    forward: AHashMap<(TargetId, Slot), Vec<ObserverId>>,
    reverse: AHashMap<ObserverId, Vec<(TargetId, Slot)>>,
}

impl DependencyTable {
    fn record(&mut self, observer: ObserverId, target: TargetId, slot: Slot) -> bool {
        let observers = self.forward.entry((target, slot.clone())).or_default();
        if observers.contains(&observer) {
            return false;
        }
        observers.push(observer);
        self.reverse.entry(observer).or_default().push((target, slot));
        true
    }

    fn observers_of(&self, target: TargetId, slot: &Slot) -> Vec<ObserverId> {
        self.forward
            .get(&(target, slot.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn reset(&mut self, observer: ObserverId) -> usize {
        let Some(edges) = self.reverse.remove(&observer) else {
            return 0;
        };
        for edge in &edges {
            if let Some(observers) = self.forward.get_mut(edge) {
                observers.retain(|o| *o != observer);
                if observers.is_empty() {
                    self.forward.remove(edge);
                }
            }
        }
        edges.len()
    }

    fn len(&self) -> usize {
        self.reverse.values().map(Vec::len).sum()
    }
}

pub(crate) struct MembraneInner {
    bridge: Rc<dyn RenderBridge>,
    warn_untrackable: bool,
    dev_checks: bool,
    proxies: RefCell<AHashMap<TargetId, Weak<ProxyInner>>>,
    edges: RefCell<DependencyTable>,
    untrackable_total: Cell<u64>,
    notified_total: Cell<u64>,
}

impl MembraneInner {
    fn track(&self, target: TargetId, slot: Slot) {
        if let Some(observer) = self.bridge.current_observer() {
            self.edges.borrow_mut().record(observer, target, slot);
        }
    }

    fn notify(&self, target: TargetId, slot: &Slot) -> usize {
        let observers = self.edges.borrow().observers_of(target, slot);
        for observer in &observers {
            self.bridge.schedule_rerender(*observer);
        }
        self.notified_total
            .set(self.notified_total.get() + observers.len() as u64);
        observers.len()
    }

    fn guard_write(&self, target: impl FnOnce() -> String) -> Result<()> {
        if self.dev_checks && self.bridge.current_observer().is_some() {
            return Err(self.bridge.mutation_during_render(&target()));
        }
        Ok(())
    }
}

/// Shared handle to the interception layer.
#[derive(Clone)]
pub struct Membrane {
    inner: Rc<MembraneInner>,
}

impl fmt::Debug for Membrane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membrane")
            .field("live_proxies", &self.live_proxies())
            .field("edges", &self.edge_count())
            .finish()
    }
}

impl Membrane {
    pub fn new(bridge: Rc<dyn RenderBridge>, config: &RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(MembraneInner {
                bridge,
                warn_untrackable: config.warn_untrackable,
                dev_checks: config.dev_checks,
                proxies: RefCell::new(AHashMap::new()),
                edges: RefCell::new(DependencyTable::default()),
                untrackable_total: Cell::new(0),
                notified_total: Cell::new(0),
            }),
        }
    }

    /// Make `value` safe to store and read reactively.
    pub fn wrap(&self, value: Value) -> Value {
        if let Value::Opaque(opaque) = &value {
            self.report_untrackable(opaque.type_name(), None);
            return value;
        }
        self.view(value)
    }

    /// The raw value behind `value`: proxies yield their container, anything
    /// else is returned as is.
    #[must_use]
    pub fn unwrap(&self, value: Value) -> Value {
        match value {
            Value::Proxy(proxy) => Value::Plain(proxy.target().clone()),
            other => other,
        }
    }

    /// Proxies currently alive for this membrane.
    #[must_use]
    pub fn live_proxies(&self) -> usize {
        self.inner
            .proxies
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Dependency edges currently recorded.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edges.borrow().len()
    }

    /// Edges currently recorded for `observer`.
    #[must_use]
    pub fn edges_of(&self, observer: ObserverId) -> usize {
        self.inner
            .edges
            .borrow()
            .reverse
            .get(&observer)
            .map_or(0, Vec::len)
    }

    /// Non-trackable values seen by `wrap` so far.
    #[must_use]
    pub fn untrackable_total(&self) -> u64 {
        self.inner.untrackable_total.get()
    }

    /// Re-render requests issued by writes so far.
    #[must_use]
    pub fn notified_total(&self) -> u64 {
        self.inner.notified_total.get()
    }

    /// `wrap` for a value assigned into `component.field`.
    pub(crate) fn wrap_field(&self, value: Value, component: &str, field: &str) -> Value {
        if let Value::Opaque(opaque) = &value {
            self.report_untrackable(opaque.type_name(), Some((component, field)));
            return value;
        }
        self.view(value)
    }

    /// Wrap without diagnostics: used on the read path.
    fn view(&self, value: Value) -> Value {
        match value {
            Value::Plain(container) => Value::Proxy(self.proxy_for(container)),
            Value::Proxy(proxy) if !Rc::ptr_eq(&proxy.inner.membrane, &self.inner) => {
                Value::Proxy(self.proxy_for(proxy.target().clone()))
            }
            other => other,
        }
    }

    fn proxy_for(&self, target: Container) -> ReactiveProxy {
        let id = target.id();
        let existing = self.inner.proxies.borrow().get(&id).and_then(Weak::upgrade);
        if let Some(inner) = existing {
            return ReactiveProxy { inner };
        }
        let inner = Rc::new(ProxyInner {
            target,
            membrane: Rc::clone(&self.inner),
        });
        self.inner
            .proxies
            .borrow_mut()
            .insert(id, Rc::downgrade(&inner));
        ReactiveProxy { inner }
    }

    fn report_untrackable(&self, type_name: &'static str, site: Option<(&str, &str)>) {
        let inner = &self.inner;
        inner.untrackable_total.set(inner.untrackable_total.get() + 1);
        if !inner.warn_untrackable {
            return;
        }
        match site {
            Some((component, field)) => tracing::warn!(
                message = "membrane.untrackable",
                component,
                field,
                type_name,
                detail = %format_args!(
                    "property \"{field}\" of {component} is set to a non-trackable object, \
                     which means changes into that object cannot be observed"
                )
            ),
            None => tracing::warn!(
                message = "membrane.untrackable",
                type_name,
                detail = "value is set to a non-trackable object, \
                          which means changes into that object cannot be observed"
            ),
        }
    }

    pub(crate) fn track(&self, target: TargetId, slot: Slot) {
        self.inner.track(target, slot);
    }

    pub(crate) fn notify(&self, target: TargetId, slot: &Slot) -> usize {
        self.inner.notify(target, slot)
    }

    /// Forget every edge recorded for `observer`.
    pub(crate) fn reset_observer(&self, observer: ObserverId) -> usize {
        self.inner.edges.borrow_mut().reset(observer)
    }

    pub(crate) fn bridge(&self) -> &Rc<dyn RenderBridge> {
        &self.inner.bridge
    }

    pub(crate) fn dev_checks(&self) -> bool {
        self.inner.dev_checks
    }
}

struct ProxyInner {
    target: Container,
    membrane: Rc<MembraneInner>,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let id = self.target.id();
        if let Ok(mut proxies) = self.membrane.proxies.try_borrow_mut()
            && proxies.get(&id).is_some_and(|w| w.strong_count() == 0)
        {
            proxies.remove(&id);
        }
    }
}

/// An intercepting handle on one plain object or array.
///
/// Clones are the same proxy. Use [`Value::is_same`] or
/// [`ReactiveProxy::ptr_eq`] for identity.
#[derive(Clone)]
pub struct ReactiveProxy {
    inner: Rc<ProxyInner>,
}

impl fmt::Debug for ReactiveProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy({:?})", self.inner.target)
    }
}

impl ReactiveProxy {
    /// The raw container. Access through it is untracked.
    #[must_use]
    pub fn target(&self) -> &Container {
        &self.inner.target
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.inner.target.is_array()
    }

    fn slot_for(&self, key: &Key) -> Slot {
        if self.is_array() && key.is_length() {
            Slot::Shape
        } else {
            Slot::Prop(key.clone())
        }
    }

    fn membrane(&self) -> Membrane {
        Membrane {
            inner: Rc::clone(&self.inner.membrane),
        }
    }

    /// Tracked read. Nested plain containers come back wrapped.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let target = &self.inner.target;
        self.inner.membrane.track(target.id(), self.slot_for(&key));
        self.membrane().view(target.get(&key))
    }

    /// Tracked membership test.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let target = &self.inner.target;
        self.inner.membrane.track(target.id(), self.slot_for(&key));
        target.has(&key)
    }

    /// Own keys; tracks the key set.
    pub fn keys(&self) -> Vec<Key> {
        let target = &self.inner.target;
        self.inner.membrane.track(target.id(), Slot::Shape);
        target.keys()
    }

    /// Every value in key order, each read tracked.
    pub fn values(&self) -> Vec<Value> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Number of keys or elements; tracks the shape.
    pub fn len(&self) -> usize {
        let target = &self.inner.target;
        self.inner.membrane.track(target.id(), Slot::Shape);
        target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intercepted write.
    ///
    /// Proxies are stored as their raw containers. Observers of the key are
    /// notified when the stored value changes identity or the key is new;
    /// observers of the shape when a key is added or an array's length changes.
    pub fn set(&self, key: impl Into<Key>, value: Value) -> Result<()> {
        let key = key.into();
        let membrane = &self.inner.membrane;
        let target = &self.inner.target;
        membrane.guard_write(|| format!("[{key}]"))?;

        let value = match value {
            Value::Proxy(proxy) => Value::Plain(proxy.target().clone()),
            other => other,
        };
        let outcome = target.set(&key, value.clone())?;
        let id = target.id();

        if target.is_array() && key.is_length() {
            let old_len = outcome.previous.as_number().unwrap_or(0.0) as usize;
            let new_len = target.len();
            for index in new_len..old_len {
                membrane.notify(id, &Slot::Prop(Key::from(index)));
            }
        } else if outcome.shape_changed || !outcome.previous.is_same(&value) {
            membrane.notify(id, &Slot::Prop(key));
        }
        if outcome.shape_changed {
            membrane.notify(id, &Slot::Shape);
        }
        Ok(())
    }

    /// Append to an array. Returns the new length.
    pub fn push(&self, value: Value) -> Result<usize> {
        let index = self.inner.target.len();
        self.set(index, value)?;
        Ok(self.inner.target.len())
    }

    /// Intercepted delete. Returns whether the key was present.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let membrane = &self.inner.membrane;
        let target = &self.inner.target;
        membrane.guard_write(|| format!("[{key}]"))?;

        let Some(previous) = target.delete(&key)? else {
            return Ok(false);
        };
        let id = target.id();
        if target.is_array() {
            // The index stays present as a hole.
            if !previous.is_same(&Value::Undefined) {
                membrane.notify(id, &Slot::Prop(key));
            }
        } else {
            membrane.notify(id, &Slot::Prop(key));
            membrane.notify(id, &Slot::Shape);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::scheduler::Scheduler;

    const A: ObserverId = ObserverId::new(1);
    const B: ObserverId = ObserverId::new(2);

    fn setup() -> (Rc<Scheduler>, Membrane) {
        let scheduler = Rc::new(Scheduler::new());
        let bridge: Rc<dyn RenderBridge> = scheduler.clone();
        let membrane = Membrane::new(bridge, &RuntimeConfig::default());
        (scheduler, membrane)
    }

    fn proxy(value: &Value) -> &ReactiveProxy {
        value.as_proxy().expect("plain values wrap to proxies")
    }

    #[test]
    fn primitives_pass_through() {
        let (_, membrane) = setup();
        for value in [
            Value::Undefined,
            Value::Null,
            Value::from(true),
            Value::from(1.5),
            Value::from("s"),
        ] {
            assert!(membrane.wrap(value.clone()).is_same(&value));
        }
        assert_eq!(membrane.untrackable_total(), 0);
    }

    #[test]
    fn wrapping_is_idempotent() {
        let (_, membrane) = setup();
        let raw = Value::object([("x", Value::from(1))]);
        let first = membrane.wrap(raw.clone());
        let second = membrane.wrap(raw.clone());
        assert!(first.is_same(&second));
        assert!(membrane.wrap(first.clone()).is_same(&first));
        assert!(!first.is_same(&raw));
        assert_eq!(first, raw);
        assert!(membrane.unwrap(first).is_same(&raw));
    }

    #[test]
    fn dead_proxies_leave_the_cache() {
        let (_, membrane) = setup();
        let raw = Value::array([Value::from(1)]);
        let wrapped = membrane.wrap(raw.clone());
        assert_eq!(membrane.live_proxies(), 1);
        drop(wrapped);
        assert_eq!(membrane.live_proxies(), 0);
        assert!(membrane.inner.proxies.borrow().is_empty());
    }

    #[test]
    fn nested_containers_wrap_lazily() {
        let (_, membrane) = setup();
        let inner = Value::object([("x", Value::from(1))]);
        let outer = membrane.wrap(Value::object([("inner", inner.clone())]));
        assert_eq!(membrane.live_proxies(), 1);
        let nested = proxy(&outer).get("inner");
        assert!(nested.as_proxy().is_some());
        assert!(nested.is_same(&membrane.wrap(inner)));
        assert_eq!(membrane.live_proxies(), 2);
    }

    #[test]
    fn reads_record_edges_only_under_an_observer() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        proxy(&obj).get("x");
        assert_eq!(membrane.edge_count(), 0);
        {
            let _render = scheduler.enter(A, "x-a");
            proxy(&obj).get("x");
            proxy(&obj).get("x");
        }
        assert_eq!(membrane.edges_of(A), 1);
    }

    #[test]
    fn writes_schedule_observers_once() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1)), ("y", Value::from(2))]));
        {
            let _render = scheduler.enter(A, "x-a");
            proxy(&obj).get("x");
            proxy(&obj).get("y");
        }
        {
            let _render = scheduler.enter(B, "x-b");
            proxy(&obj).get("y");
        }
        proxy(&obj).set("x", Value::from(10)).expect("write outside render");
        proxy(&obj).set("y", Value::from(20)).expect("write outside render");
        assert_eq!(scheduler.take_queue(), vec![A, B]);
        assert_eq!(proxy(&obj).get("x"), Value::from(10));
    }

    #[test]
    fn identical_write_is_silent() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        {
            let _render = scheduler.enter(A, "x-a");
            proxy(&obj).get("x");
        }
        proxy(&obj).set("x", Value::from(1)).expect("write");
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn write_during_render_fails_and_leaves_state() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        let _render = scheduler.enter(A, "x-a");
        let err = proxy(&obj).set("x", Value::from(2)).expect_err("render is read-only");
        assert!(err.to_string().starts_with("x-a.render() has side effects"));
        assert_eq!(proxy(&obj).get("x"), Value::from(1));
        assert!(proxy(&obj).delete("x").is_err());
    }

    #[test]
    fn dev_checks_off_allows_render_writes() {
        let scheduler = Rc::new(Scheduler::new());
        let bridge: Rc<dyn RenderBridge> = scheduler.clone();
        let membrane = Membrane::new(bridge, &RuntimeConfig::default().with_dev_checks(false));
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        let _render = scheduler.enter(A, "x-a");
        proxy(&obj).set("x", Value::from(2)).expect("checks disabled");
    }

    #[test]
    fn proxies_store_raw_containers() {
        let (_, membrane) = setup();
        let child = membrane.wrap(Value::object([("y", Value::from(1))]));
        let parent = membrane.wrap(Value::object::<_, &str>([]));
        proxy(&parent).set("child", child.clone()).expect("write");
        let stored = proxy(&parent).target().get(&Key::from("child"));
        assert!(matches!(stored, Value::Plain(_)));
        assert!(proxy(&parent).get("child").is_same(&child));
    }

    #[test]
    fn array_shape_tracking() {
        let (scheduler, membrane) = setup();
        let arr = membrane.wrap(Value::array([Value::from(1), Value::from(2)]));
        {
            let _render = scheduler.enter(A, "x-list");
            assert_eq!(proxy(&arr).len(), 2);
        }
        proxy(&arr).set(0usize, Value::from(5)).expect("index write");
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(proxy(&arr).push(Value::from(3)).expect("push"), 3);
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert_eq!(proxy(&arr).get("length"), Value::from(3));
    }

    #[test]
    fn truncation_notifies_removed_indices() {
        let (scheduler, membrane) = setup();
        let arr = membrane.wrap(Value::array([Value::from(1), Value::from(2), Value::from(3)]));
        {
            let _render = scheduler.enter(A, "x-tail");
            proxy(&arr).get(2usize);
        }
        proxy(&arr).set("length", Value::from(1)).expect("truncate");
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert_eq!(proxy(&arr).target().len(), 1);
    }

    #[test]
    fn object_key_set_tracking() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("a", Value::from(1))]));
        {
            let _render = scheduler.enter(A, "x-keys");
            assert_eq!(proxy(&obj).keys(), vec![Key::from("a")]);
        }
        proxy(&obj).set("a", Value::from(2)).expect("existing key");
        assert_eq!(scheduler.pending(), 0);
        proxy(&obj).set("b", Value::from(3)).expect("new key");
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert!(proxy(&obj).delete("b").expect("delete"));
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert!(!proxy(&obj).delete("b").expect("missing key"));
    }

    #[test]
    fn membership_changes_notify_has_readers() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        let read = || {
            let _render = scheduler.enter(A, "x-has");
            proxy(&obj).has("y")
        };
        assert!(!read());

        proxy(&obj).set("y", Value::Undefined).expect("add undefined");
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert!(read());

        proxy(&obj).set("y", Value::Undefined).expect("same value");
        assert_eq!(scheduler.pending(), 0);

        assert!(proxy(&obj).delete("y").expect("delete undefined"));
        assert_eq!(scheduler.take_queue(), vec![A]);
        assert!(!read());
    }

    #[test]
    fn array_holes_do_not_change_membership() {
        let (scheduler, membrane) = setup();
        let arr = membrane.wrap(Value::array([Value::Undefined, Value::from(2)]));
        {
            let _render = scheduler.enter(A, "x-holes");
            assert!(proxy(&arr).has(0usize));
        }
        assert!(proxy(&arr).delete(0usize).expect("delete hole"));
        assert_eq!(scheduler.pending(), 0);
        assert!(proxy(&arr).has(0usize));
    }

    #[test]
    fn oversized_array_writes_fail_without_notifying() {
        let (scheduler, membrane) = setup();
        let arr = membrane.wrap(Value::array([Value::from(1)]));
        {
            let _render = scheduler.enter(A, "x-len");
            assert_eq!(proxy(&arr).len(), 1);
        }
        for key in ["18446744073709551615", "+0"] {
            assert!(matches!(
                proxy(&arr).set(key, Value::from(1)),
                Err(RuntimeError::InvalidKey { .. })
            ));
        }
        assert!(matches!(
            proxy(&arr).set("length", Value::from(1e300)),
            Err(RuntimeError::InvalidKey { .. })
        ));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(proxy(&arr).target().len(), 1);
    }

    #[test]
    fn reset_drops_observer_edges() {
        let (scheduler, membrane) = setup();
        let obj = membrane.wrap(Value::object([("x", Value::from(1))]));
        {
            let _render = scheduler.enter(A, "x-a");
            proxy(&obj).get("x");
            proxy(&obj).has("y");
        }
        assert_eq!(membrane.reset_observer(A), 2);
        assert_eq!(membrane.edge_count(), 0);
        proxy(&obj).set("x", Value::from(2)).expect("write");
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn opaque_values_are_counted_not_wrapped() {
        let (_, membrane) = setup();
        let date = Value::opaque(std::time::SystemTime::UNIX_EPOCH);
        assert!(membrane.wrap(date.clone()).is_same(&date));
        assert_eq!(membrane.untrackable_total(), 1);
    }

    #[test]
    fn foreign_proxies_are_rewrapped() {
        let (_, first) = setup();
        let (_, second) = setup();
        let raw = Value::object([("x", Value::from(1))]);
        let a = first.wrap(raw.clone());
        let b = second.wrap(a.clone());
        assert!(!a.is_same(&b));
        assert!(second.wrap(raw).is_same(&b));
    }
}
