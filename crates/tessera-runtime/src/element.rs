#![forbid(unsafe_code)]

//! Component elements.
//!
//! An [`Element`] is one live instance of a compiled component definition.
//! Every public prop, tracked field and wired field gets a reactive slot;
//! [`Element::get`] and [`Element::set`] are the generated accessors for those
//! slots. Reads during a render pass record a dependency on
//! `(element, field)`, and writes wrap the value through the membrane and
//! notify dependents when the stored value changes identity.
//!
//! # Lifecycle
//!
//! `Created` (constructor hook ran) -> `Connected` (adapters connected, first
//! render done) -> `Destroyed` (adapters disconnected, pending re-render
//! cancelled, dependency edges dropped). Dropping the last handle has the
//! same effect as [`Element::disconnect`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use tessera_core::ComponentDef;

use crate::error::{Result, RuntimeError};
use crate::reactive::{Key, Slot, TargetId, Value};
use crate::runtime::RuntimeInner;
use crate::scheduler::ObserverId;
use crate::wire::{WireAdapter, WireSink};

type Hook = Box<dyn Fn(&Element) -> Result<()>>;
type Method = Box<dyn Fn(&Element, &[Value]) -> Result<Value>>;

/// User code attached to a component: constructor, render and public methods.
#[derive(Default)]
pub struct Behavior {
    constructor: Option<Hook>,
    render: Option<Hook>,
    methods: AHashMap<String, Method>,
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Behavior")
            .field("constructor", &self.constructor.is_some())
            .field("render", &self.render.is_some())
            .field("methods", &methods)
            .finish()
    }
}

impl Behavior {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once after the element's slots exist. Writes are allowed.
    #[must_use]
    pub fn with_constructor(mut self, hook: impl Fn(&Element) -> Result<()> + 'static) -> Self {
        self.constructor = Some(Box::new(hook));
        self
    }

    /// The render pass. Reads are tracked; writes to reactive state fail.
    #[must_use]
    pub fn with_render(mut self, hook: impl Fn(&Element) -> Result<()> + 'static) -> Self {
        self.render = Some(Box::new(hook));
        self
    }

    /// Implementation of a public method. Only names listed in the
    /// definition's `methods` are callable through [`Element::invoke`].
    #[must_use]
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Element, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Box::new(method));
        self
    }
}

/// Where an element is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Connected,
    Destroyed,
}

pub(crate) struct ElementInner {
    observer: ObserverId,
    target: TargetId,
    tag: String,
    def: Arc<ComponentDef>,
    behavior: Behavior,
    runtime: Rc<RuntimeInner>,
    fields: RefCell<AHashMap<String, Value>>,
    lifecycle: Cell<Lifecycle>,
    render_count: Cell<u64>,
    adapters: RefCell<Vec<Box<dyn WireAdapter>>>,
}

impl ElementInner {
    /// Disconnect adapters, cancel pending work and drop edges. Idempotent.
    fn teardown(&self) {
        if self.lifecycle.replace(Lifecycle::Destroyed) == Lifecycle::Destroyed {
            return;
        }
        if self.runtime.scheduler.cancel(self.observer) {
            self.runtime.record_dropped(1);
        }
        self.runtime.membrane.reset_observer(self.observer);
        let adapters = std::mem::take(&mut *self.adapters.borrow_mut());
        for mut adapter in adapters {
            adapter.disconnect();
        }
        self.runtime.forget_element(self.observer);
        tracing::debug!(
            message = "element.destroy",
            component = self.def.name(),
            observer = %self.observer
        );
    }
}

impl Drop for ElementInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Handle to a live component instance. Clones share the instance.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.inner.tag)
            .field("component", &self.inner.def.name())
            .field("observer", &self.inner.observer)
            .field("lifecycle", &self.lifecycle())
            .field("render_count", &self.render_count())
            .finish()
    }
}

impl Element {
    /// Build an element and run its constructor hook.
    pub(crate) fn create(
        runtime: Rc<RuntimeInner>,
        tag: &str,
        def: Arc<ComponentDef>,
        behavior: Behavior,
    ) -> Result<Self> {
        let target = TargetId::next();
        let observer = ObserverId::new(target.get());
        let fields = def
            .reactive_fields()
            .map(|field| (field.to_string(), Value::Undefined))
            .collect();
        let element = Self {
            inner: Rc::new(ElementInner {
                observer,
                target,
                tag: tag.to_string(),
                def,
                behavior,
                runtime,
                fields: RefCell::new(fields),
                lifecycle: Cell::new(Lifecycle::Created),
                render_count: Cell::new(0),
                adapters: RefCell::new(Vec::new()),
            }),
        };
        element
            .inner
            .runtime
            .remember_element(observer, &element.inner);
        tracing::debug!(
            message = "element.create",
            tag,
            component = element.inner.def.name(),
            observer = %observer
        );
        if let Some(constructor) = &element.inner.behavior.constructor {
            constructor(&element)?;
        }
        Ok(element)
    }

    pub(crate) fn from_inner(inner: Rc<ElementInner>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    #[must_use]
    pub fn def(&self) -> &Arc<ComponentDef> {
        &self.inner.def
    }

    #[must_use]
    pub fn observer(&self) -> ObserverId {
        self.inner.observer
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lifecycle() == Lifecycle::Connected
    }

    /// Completed or attempted render passes.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.inner.render_count.get()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn unknown_field(&self, field: &str) -> RuntimeError {
        RuntimeError::UnknownField {
            component: self.inner.def.name().to_string(),
            field: field.to_string(),
        }
    }

    /// Generated getter.
    pub fn get(&self, field: &str) -> Result<Value> {
        let value = self
            .inner
            .fields
            .borrow()
            .get(field)
            .cloned()
            .ok_or_else(|| self.unknown_field(field))?;
        self.inner
            .runtime
            .membrane
            .track(self.inner.target, Slot::Prop(Key::from(field)));
        Ok(value)
    }

    /// Generated setter.
    ///
    /// Fails if this element is the one currently rendering. Plain values are
    /// stored as proxies; non-trackable objects are stored as is with a
    /// warning.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        if !self.inner.fields.borrow().contains_key(field) {
            return Err(self.unknown_field(field));
        }
        let membrane = &self.inner.runtime.membrane;
        let bridge = membrane.bridge();
        if membrane.dev_checks() && bridge.current_observer() == Some(self.inner.observer) {
            return Err(bridge.mutation_during_render(field));
        }

        let value = membrane.wrap_field(value.into(), self.inner.def.name(), field);
        let previous = self
            .inner
            .fields
            .borrow_mut()
            .insert(field.to_string(), value.clone());
        if !previous.is_some_and(|p| p.is_same(&value)) {
            membrane.notify(self.inner.target, &Slot::Prop(Key::from(field)));
        }
        Ok(())
    }

    /// Call a public method.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        let implementation = self
            .inner
            .def
            .methods()
            .contains(method)
            .then(|| self.inner.behavior.methods.get(method))
            .flatten()
            .ok_or_else(|| RuntimeError::NotPublicMethod {
                component: self.inner.def.name().to_string(),
                method: method.to_string(),
            })?;
        implementation(self, args)
    }

    /// Insert into the document: connect wire adapters, then render.
    pub fn connect(&self) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Connected => return Ok(()),
            Lifecycle::Destroyed => {
                return Err(RuntimeError::Destroyed {
                    component: self.inner.def.name().to_string(),
                });
            }
            Lifecycle::Created => {}
        }
        self.inner.lifecycle.set(Lifecycle::Connected);
        if let Err(err) = self.connect_adapters() {
            let adapters = std::mem::take(&mut *self.inner.adapters.borrow_mut());
            for mut adapter in adapters {
                adapter.disconnect();
            }
            self.inner.lifecycle.set(Lifecycle::Created);
            return Err(err);
        }
        self.render()
    }

    /// Remove from the document. Pending re-renders are dropped.
    pub fn disconnect(&self) {
        self.inner.teardown();
    }

    fn connect_adapters(&self) -> Result<()> {
        let runtime = &self.inner.runtime;
        for (field, wire) in self.inner.def.wire() {
            let Some(adapter_id) = &wire.adapter else {
                continue;
            };
            let created = runtime.adapters.borrow().create(adapter_id);
            let mut adapter = created.ok_or_else(|| RuntimeError::UnknownAdapter {
                component: self.inner.def.name().to_string(),
                field: field.clone(),
                adapter: adapter_id.to_string(),
            })?;
            let sink = WireSink::new(&self.inner, field, adapter_id.clone());
            adapter.connect(&wire.config, sink)?;
            self.inner.adapters.borrow_mut().push(adapter);
        }
        Ok(())
    }

    /// One render pass. Edges from the previous pass are discarded first.
    pub(crate) fn render(&self) -> Result<()> {
        let inner = &self.inner;
        let runtime = &inner.runtime;
        runtime.membrane.reset_observer(inner.observer);
        inner.render_count.set(inner.render_count.get() + 1);
        runtime.record_render();

        let _span = tracing::trace_span!(
            "element.render",
            component = inner.def.name(),
            observer = %inner.observer,
            pass = inner.render_count.get()
        )
        .entered();
        let _render = runtime.scheduler.enter(inner.observer, inner.def.name());
        match &inner.behavior.render {
            Some(render) => render(self),
            None => Ok(()),
        }
    }
}
