#![forbid(unsafe_code)]

//! Component classes: the user-authored side of a component.
//!
//! A [`ComponentClass`] carries the static metadata the definition compiler
//! reads (public props, public methods, observed attributes, tracked fields,
//! wired fields), the accessor shapes declared on its prototype, and a link to
//! its superclass.
//!
//! Classes are assembled once through [`ClassBuilder`] and then shared as
//! `Arc<ComponentClass>`. There is no mutation API after `build()`, so the
//! metadata a definition was compiled from can never drift from the
//! definition itself.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use crate::decorators::{self, FieldDecorator, WireDef};
use crate::error::WireError;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique class identity. Definitions are memoized by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        Self(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Which accessor halves a property carries.
    ///
    /// The numeric form is the public-prop `config` value:
    /// none = 0, getter = 1, setter = 2, both = 3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessorKind: u8 {
        const GETTER = 0b01;
        const SETTER = 0b10;
        const BOTH = Self::GETTER.bits() | Self::SETTER.bits();
    }
}

impl AccessorKind {
    /// Plain data property, no custom accessor.
    pub const NONE: Self = Self::empty();

    /// The `config` number for this accessor shape.
    #[must_use]
    pub const fn config(self) -> u8 {
        self.bits()
    }

    /// Whether a custom getter or setter is present.
    #[must_use]
    pub const fn is_accessor(self) -> bool {
        !self.is_empty()
    }
}

/// A public property declaration as written on the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropDecl {
    /// Explicit accessor config. `None` means "infer from the prototype".
    pub config: Option<AccessorKind>,
}

impl PropDecl {
    /// Declaration with no explicit config (`foo: {}`).
    #[must_use]
    pub const fn inferred() -> Self {
        Self { config: None }
    }

    /// Declaration with an explicit config (`foo: { config: 1 }`).
    #[must_use]
    pub const fn with_config(config: AccessorKind) -> Self {
        Self {
            config: Some(config),
        }
    }
}

/// What a class extends.
#[derive(Clone)]
pub enum Heritage {
    /// Directly extends the framework's base element.
    Base,
    /// Extends another component class.
    Class(Arc<ComponentClass>),
    /// Extends nothing the framework recognizes.
    Plain,
}

impl fmt::Debug for Heritage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("Base"),
            Self::Class(parent) => write!(f, "Class({})", parent.name),
            Self::Plain => f.write_str("Plain"),
        }
    }
}

/// A user-authored component class.
///
/// Every static list is optional: `None` means the class did not declare it,
/// which matters for `observedAttributes` (never inherited).
#[derive(Debug)]
pub struct ComponentClass {
    id: ClassId,
    name: String,
    heritage: Heritage,
    public_props: Option<Vec<(String, PropDecl)>>,
    public_methods: Option<Vec<String>>,
    observed_attributes: Option<Vec<String>>,
    track: Option<Vec<String>>,
    wire: Option<Vec<(String, WireDef)>>,
    accessors: Vec<(String, AccessorKind)>,
}

impl ComponentClass {
    /// Start a class that extends the base element.
    #[must_use]
    pub fn extending_base(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name.into(), Heritage::Base)
    }

    /// Start a class that extends `parent`.
    #[must_use]
    pub fn extending(parent: &Arc<ComponentClass>, name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name.into(), Heritage::Class(Arc::clone(parent)))
    }

    /// Start a class that does not extend the base element. Compiling it
    /// always fails; this exists so hosts can describe foreign classes.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name.into(), Heritage::Plain)
    }

    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn heritage(&self) -> &Heritage {
        &self.heritage
    }

    /// The superclass, if this class extends another component class.
    #[must_use]
    pub fn superclass(&self) -> Option<&Arc<ComponentClass>> {
        match &self.heritage {
            Heritage::Class(parent) => Some(parent),
            Heritage::Base | Heritage::Plain => None,
        }
    }

    #[must_use]
    pub fn public_props(&self) -> Option<&[(String, PropDecl)]> {
        self.public_props.as_deref()
    }

    #[must_use]
    pub fn public_methods(&self) -> Option<&[String]> {
        self.public_methods.as_deref()
    }

    #[must_use]
    pub fn observed_attributes(&self) -> Option<&[String]> {
        self.observed_attributes.as_deref()
    }

    #[must_use]
    pub fn track(&self) -> Option<&[String]> {
        self.track.as_deref()
    }

    #[must_use]
    pub fn wire(&self) -> Option<&[(String, WireDef)]> {
        self.wire.as_deref()
    }

    /// The accessor shape defined directly on this class's prototype for
    /// `name`, ignoring ancestors.
    #[must_use]
    pub fn own_accessor(&self, name: &str) -> Option<AccessorKind> {
        self.accessors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
    }
}

/// Builder for [`ComponentClass`].
///
/// Repeated calls to a list method append; repeated keys in a map method
/// replace the earlier entry, the way a later object-literal key would.
#[derive(Debug)]
pub struct ClassBuilder {
    name: String,
    heritage: Heritage,
    public_props: Option<Vec<(String, PropDecl)>>,
    public_methods: Option<Vec<String>>,
    observed_attributes: Option<Vec<String>>,
    track: Option<Vec<String>>,
    wire: Option<Vec<(String, WireDef)>>,
    accessors: Vec<(String, AccessorKind)>,
}

fn upsert<V>(entries: &mut Vec<(String, V)>, key: String, value: V) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

impl ClassBuilder {
    fn new(name: String, heritage: Heritage) -> Self {
        Self {
            name,
            heritage,
            public_props: None,
            public_methods: None,
            observed_attributes: None,
            track: None,
            wire: None,
            accessors: Vec::new(),
        }
    }

    /// Declare a public property.
    #[must_use]
    pub fn public_prop(mut self, name: impl Into<String>, decl: PropDecl) -> Self {
        upsert(
            self.public_props.get_or_insert_with(Vec::new),
            name.into(),
            decl,
        );
        self
    }

    /// Declare public methods.
    #[must_use]
    pub fn public_methods<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_methods
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare the observed attribute list. An empty list still counts as a
    /// declaration.
    #[must_use]
    pub fn observed_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observed_attributes
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare tracked (reactive, private) fields.
    #[must_use]
    pub fn track<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.track
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Add an entry to the static wire map.
    #[must_use]
    pub fn wire(mut self, field: impl Into<String>, def: WireDef) -> Self {
        upsert(self.wire.get_or_insert_with(Vec::new), field.into(), def);
        self
    }

    /// Define an accessor on the prototype.
    #[must_use]
    pub fn accessor(mut self, name: impl Into<String>, kind: AccessorKind) -> Self {
        upsert(&mut self.accessors, name.into(), kind);
        self
    }

    /// Apply a field decorator at declaration time.
    ///
    /// `decorator` runs inside a declaration scope for `field`, which is what
    /// lets [`decorators::wire`] succeed. The decorator's output is folded
    /// into the class metadata.
    pub fn decorate<F>(self, field: impl Into<String>, decorator: F) -> Result<Self, WireError>
    where
        F: FnOnce() -> Result<FieldDecorator, WireError>,
    {
        let field = field.into();
        let applied = decorators::with_declaration_scope(&field, decorator)?;
        Ok(match applied {
            FieldDecorator::Wire(def) => self.wire(field, def),
        })
    }

    /// Freeze the class.
    #[must_use]
    pub fn build(self) -> Arc<ComponentClass> {
        Arc::new(ComponentClass {
            id: ClassId::next(),
            name: self.name,
            heritage: self.heritage,
            public_props: self.public_props,
            public_methods: self.public_methods,
            observed_attributes: self.observed_attributes,
            track: self.track,
            wire: self.wire,
            accessors: self.accessors,
        })
    }
}
