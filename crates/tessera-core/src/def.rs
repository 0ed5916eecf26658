#![forbid(unsafe_code)]

//! Component definition compiler.
//!
//! [`get_component_def`] turns a [`ComponentClass`] into a [`ComponentDef`]:
//! the normalized metadata element-creation code uses to install accessors.
//!
//! # Algorithm
//!
//! 1. Resolve the ancestor chain. A chain that does not end at the base
//!    element is a [`DefinitionError::NotAComponent`].
//! 2. Fold the chain root-first into `props`, `methods`, `track` and `wire`.
//!    A more-derived entry replaces an ancestor entry with the same key; all
//!    other ancestor entries survive.
//! 3. Props without an explicit config take it from the prototype accessor of
//!    the declaring class. A setter without a getter is fatal.
//! 4. `observedAttrs` comes from the given class's own list only, never from
//!    ancestors. Each entry must not shadow a public accessor property and
//!    must be a global HTML attribute.
//!
//! # Invariants
//!
//! 1. One definition per class for the life of the process: repeated calls
//!    return the same `Arc`.
//! 2. A failed compile publishes nothing; the next call recompiles and fails
//!    the same way.
//! 3. Core keys are read-only. Downstream code may attach derived data through
//!    the expando slot.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use ahash::AHashMap;

use crate::attributes::{attribute_to_property, is_global_attribute, suggest_global_attribute};
use crate::class::{AccessorKind, ClassId, ComponentClass, Heritage, PropDecl};
use crate::decorators::WireDef;
use crate::error::{DefinitionError, ReservedKey, Result};

/// Keys owned by the compiler. The expando slot refuses them.
pub const CORE_KEYS: &[&str] = &["name", "props", "methods", "observedAttrs", "track", "wire"];

/// A compiled public property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropDef {
    pub config: AccessorKind,
}

impl PropDef {
    #[must_use]
    pub const fn new(config: AccessorKind) -> Self {
        Self { config }
    }
}

type ExpandoMap = AHashMap<String, Arc<dyn Any + Send + Sync>>;

/// The compiled, immutable metadata of a component class.
pub struct ComponentDef {
    class_id: ClassId,
    name: String,
    props: BTreeMap<String, PropDef>,
    methods: BTreeSet<String>,
    observed_attrs: BTreeSet<String>,
    track: BTreeSet<String>,
    wire: BTreeMap<String, WireDef>,
    expando: RwLock<ExpandoMap>,
}

impl std::fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("methods", &self.methods)
            .field("observed_attrs", &self.observed_attrs)
            .field("track", &self.track)
            .field("wire", &self.wire)
            .finish_non_exhaustive()
    }
}

impl ComponentDef {
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn props(&self) -> &BTreeMap<String, PropDef> {
        &self.props
    }

    #[must_use]
    pub fn methods(&self) -> &BTreeSet<String> {
        &self.methods
    }

    #[must_use]
    pub fn observed_attrs(&self) -> &BTreeSet<String> {
        &self.observed_attrs
    }

    #[must_use]
    pub fn track(&self) -> &BTreeSet<String> {
        &self.track
    }

    #[must_use]
    pub fn wire(&self) -> &BTreeMap<String, WireDef> {
        &self.wire
    }

    /// Every field that gets a reactive slot on an instance: public props,
    /// tracked fields and wired fields, deduplicated.
    pub fn reactive_fields(&self) -> impl Iterator<Item = &str> {
        let mut seen = BTreeSet::new();
        self.props
            .keys()
            .chain(self.track.iter())
            .chain(self.wire.keys())
            .map(String::as_str)
            .filter(move |name| seen.insert(*name))
    }

    #[must_use]
    pub fn is_reactive_field(&self, name: &str) -> bool {
        self.props.contains_key(name) || self.track.contains(name) || self.wire.contains_key(name)
    }

    /// Attach derived data under `key`, replacing any earlier value.
    ///
    /// Core key names are rejected so derived data can never masquerade as
    /// compiler output.
    pub fn set_expando<T>(&self, key: &str, value: T) -> std::result::Result<(), ReservedKey>
    where
        T: Any + Send + Sync,
    {
        if CORE_KEYS.contains(&key) {
            return Err(ReservedKey(key.to_string()));
        }
        self.expando
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Arc::new(value));
        Ok(())
    }

    /// Read derived data stored under `key`, if it has type `T`.
    #[must_use]
    pub fn expando<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let map = self.expando.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()?.downcast::<T>().ok()
    }
}

static DEFINITIONS: LazyLock<RwLock<AHashMap<ClassId, Arc<ComponentDef>>>> =
    LazyLock::new(|| RwLock::new(AHashMap::new()));

/// Compile (or fetch the memoized) definition for `class`.
///
/// # Errors
///
/// Returns a [`DefinitionError`] when the class does not extend the base
/// element, declares a setter without a getter, or lists an invalid observed
/// attribute.
pub fn get_component_def(class: &ComponentClass) -> Result<Arc<ComponentDef>> {
    if let Some(def) = DEFINITIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&class.id())
    {
        return Ok(Arc::clone(def));
    }

    let compiled = Arc::new(compile(class)?);
    let mut cache = DEFINITIONS.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have won the race; keep the first published copy.
    Ok(Arc::clone(cache.entry(class.id()).or_insert(compiled)))
}

/// Whether a definition for `class` has already been published.
#[must_use]
pub fn is_compiled(class: &ComponentClass) -> bool {
    DEFINITIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&class.id())
}

/// Ancestors of `class`, root first, `class` last.
fn ancestry(class: &ComponentClass) -> Result<Vec<&ComponentClass>> {
    let mut chain = vec![class];
    let mut current = class;
    loop {
        match current.heritage() {
            Heritage::Base => break,
            Heritage::Class(parent) => {
                current = parent.as_ref();
                chain.push(current);
            }
            Heritage::Plain => {
                return Err(DefinitionError::NotAComponent {
                    component: class.name().to_string(),
                });
            }
        }
    }
    chain.reverse();
    Ok(chain)
}

fn resolve_prop(owner: &ComponentClass, name: &str, decl: PropDecl) -> Result<PropDef> {
    let declared = owner.own_accessor(name);
    if let Some(kind) = declared
        && kind.contains(AccessorKind::SETTER)
        && !kind.contains(AccessorKind::GETTER)
    {
        return Err(DefinitionError::AccessorWithoutGetter {
            component: owner.name().to_string(),
            prop: name.to_string(),
        });
    }
    let config = decl.config.or(declared).unwrap_or(AccessorKind::NONE);
    Ok(PropDef::new(config))
}

fn observed_attributes(
    class: &ComponentClass,
    props: &BTreeMap<String, PropDef>,
) -> Result<BTreeSet<String>> {
    let mut observed = BTreeSet::new();
    for attr in class.observed_attributes().unwrap_or_default() {
        let prop_name = attribute_to_property(attr);
        let shadowed = props
            .get(&prop_name)
            .or_else(|| props.get(attr.as_str()))
            .is_some_and(|prop| prop.config.is_accessor());
        if shadowed {
            return Err(DefinitionError::ObservedAccessorCollision {
                component: class.name().to_string(),
                attr: attr.clone(),
                prop: prop_name,
            });
        }
        if !is_global_attribute(attr) {
            return Err(DefinitionError::InvalidObservedAttribute {
                component: class.name().to_string(),
                attr: attr.clone(),
                suggestion: suggest_global_attribute(attr).map(str::to_string),
            });
        }
        observed.insert(attr.clone());
    }
    Ok(observed)
}

fn compile(class: &ComponentClass) -> Result<ComponentDef> {
    let chain = ancestry(class)?;

    let mut props = BTreeMap::new();
    let mut methods = BTreeSet::new();
    let mut track = BTreeSet::new();
    let mut wire = BTreeMap::new();

    for owner in &chain {
        for (name, decl) in owner.public_props().unwrap_or_default() {
            props.insert(name.clone(), resolve_prop(owner, name, *decl)?);
        }
        methods.extend(owner.public_methods().unwrap_or_default().iter().cloned());
        track.extend(owner.track().unwrap_or_default().iter().cloned());
        for (field, def) in owner.wire().unwrap_or_default() {
            wire.insert(field.clone(), def.clone());
        }
    }

    let observed_attrs = observed_attributes(class, &props)?;

    tracing::debug!(
        message = "def.compiled",
        component = class.name(),
        depth = chain.len(),
        props = props.len(),
        methods = methods.len(),
        observed_attrs = observed_attrs.len(),
        wire = wire.len()
    );

    Ok(ComponentDef {
        class_id: class.id(),
        name: class.name().to_string(),
        props,
        methods,
        observed_attrs,
        track,
        wire,
        expando: RwLock::new(AHashMap::new()),
    })
}
