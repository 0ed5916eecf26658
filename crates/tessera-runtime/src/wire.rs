#![forbid(unsafe_code)]

//! Wire adapter bridge.
//!
//! A wired field names an adapter and a config object. When its element
//! connects, the runtime builds the adapter from the [`AdapterRegistry`] and
//! hands it a [`WireSink`]. Every [`WireSink::emit`] goes through the
//! element's generated setter, so wired data is wrapped by the membrane and
//! notifies dependents exactly like a direct assignment.

use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use serde_json::Value as Json;
use tessera_core::AdapterId;

use crate::element::{Element, ElementInner, Lifecycle};
use crate::error::Result;
use crate::reactive::Value;

/// An external data source bound to one wired field.
pub trait WireAdapter {
    /// Start producing values for `sink`. May emit synchronously.
    fn connect(&mut self, config: &Json, sink: WireSink) -> Result<()>;

    /// Stop producing values. Called once when the element goes away.
    fn disconnect(&mut self) {}
}

type AdapterFactory = Box<dyn Fn() -> Box<dyn WireAdapter>>;

/// Adapter constructors keyed by adapter name.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: AHashMap<AdapterId, AdapterFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(AdapterId::as_str).collect();
        names.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &names)
            .finish()
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `id`. Returns `true` if it replaced an
    /// earlier registration.
    pub fn register<F, A>(&mut self, id: impl Into<AdapterId>, factory: F) -> bool
    where
        F: Fn() -> A + 'static,
        A: WireAdapter + 'static,
    {
        let boxed: AdapterFactory = Box::new(move || Box::new(factory()));
        self.factories.insert(id.into(), boxed).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &AdapterId) -> bool {
        self.factories.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// A fresh adapter instance, if `id` is registered.
    #[must_use]
    pub fn create(&self, id: &AdapterId) -> Option<Box<dyn WireAdapter>> {
        self.factories.get(id).map(|factory| factory())
    }
}

/// Where an adapter delivers values for one element field.
///
/// Holds the element weakly: a sink never keeps a component alive.
#[derive(Clone)]
pub struct WireSink {
    element: Weak<ElementInner>,
    field: Rc<str>,
    adapter: AdapterId,
}

impl fmt::Debug for WireSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireSink")
            .field("field", &self.field)
            .field("adapter", &self.adapter)
            .field("live", &self.is_live())
            .finish()
    }
}

impl WireSink {
    pub(crate) fn new(element: &Rc<ElementInner>, field: &str, adapter: AdapterId) -> Self {
        Self {
            element: Rc::downgrade(element),
            field: Rc::from(field),
            adapter,
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn adapter(&self) -> &AdapterId {
        &self.adapter
    }

    /// Whether emissions would still reach a live element.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.element
            .upgrade()
            .is_some_and(|inner| Element::from_inner(inner).lifecycle() != Lifecycle::Destroyed)
    }

    /// Deliver `value` to the field.
    ///
    /// Returns `Ok(false)` when the element has been destroyed; the value is
    /// dropped. Errors from the setter (for example an emission from inside
    /// the element's own render) propagate.
    pub fn emit(&self, value: impl Into<Value>) -> Result<bool> {
        let Some(inner) = self.element.upgrade() else {
            tracing::trace!(message = "wire.drop", field = %self.field, adapter = %self.adapter);
            return Ok(false);
        };
        let element = Element::from_inner(inner);
        if element.lifecycle() == Lifecycle::Destroyed {
            tracing::trace!(message = "wire.drop", field = %self.field, adapter = %self.adapter);
            return Ok(false);
        }
        tracing::trace!(
            message = "wire.emit",
            component = element.def().name(),
            field = %self.field,
            adapter = %self.adapter
        );
        element.set(&self.field, value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl WireAdapter for Recorder {
        fn connect(&mut self, config: &Json, sink: WireSink) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("connect {} {config}", sink.field()));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.log.borrow_mut().push("disconnect".into());
        }
    }

    #[test]
    fn registry_builds_fresh_adapters() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = AdapterRegistry::new();
        let shared = Rc::clone(&log);
        assert!(!registry.register("record", move || Recorder {
            log: Rc::clone(&shared),
        }));
        assert!(registry.contains(&AdapterId::from("record")));
        assert_eq!(registry.len(), 1);
        assert!(registry.create(&AdapterId::from("missing")).is_none());

        let mut adapter = registry
            .create(&AdapterId::from("record"))
            .expect("registered");
        adapter.disconnect();
        assert_eq!(log.borrow().as_slice(), ["disconnect".to_string()]);
    }

    #[test]
    fn re_registering_replaces() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = AdapterRegistry::new();
        let first = Rc::clone(&log);
        let second = Rc::clone(&log);
        registry.register("record", move || Recorder {
            log: Rc::clone(&first),
        });
        assert!(registry.register("record", move || Recorder {
            log: Rc::clone(&second),
        }));
        assert_eq!(registry.len(), 1);
        assert_eq!(format!("{registry:?}"), r#"AdapterRegistry { adapters: ["record"] }"#);
    }
}
