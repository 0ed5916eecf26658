#![forbid(unsafe_code)]

//! Dynamic values stored in component state.
//!
//! [`Value`] is what a reactive field holds. Primitives are immutable.
//! [`Container`] is a raw plain object or array: shared, mutable, and
//! invisible to the membrane until wrapped. [`Opaque`] is any other object
//! (a date, a class instance, a host node); the membrane never wraps it.
//!
//! Two notions of equality apply:
//!
//! - [`Value::is_same`] is identity: the same container, proxy or opaque
//!   allocation, or an equal primitive.
//! - `PartialEq` is deep structural equality. It sees through proxies, so a
//!   proxy equals the raw container it wraps (and any structurally equal one).

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value as Json;

use super::membrane::ReactiveProxy;
use crate::error::{Result, RuntimeError};

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of something the dependency table can key on: a raw container
/// or a component element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Most slots a single write may append to an array, holes included.
pub const MAX_ARRAY_GROWTH: usize = 1 << 16;

/// A property name. Array indices are their decimal spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The array index this key names, if any.
    ///
    /// Only canonical decimal spellings below `u32::MAX` are indices; `"+0"`,
    /// `"01"` and larger numbers are ordinary property names.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        let s = self.as_str();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        s.parse::<u32>()
            .ok()
            .filter(|i| *i < u32::MAX)
            .and_then(|i| usize::try_from(i).ok())
    }

    pub(crate) fn is_length(&self) -> bool {
        self.as_str() == "length"
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self(Rc::from(s.as_str()))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self(Rc::from(i.to_string()))
    }
}

#[derive(Debug)]
enum Slots {
    Object(BTreeMap<Key, Value>),
    Array(Vec<Value>),
}

struct ContainerInner {
    id: TargetId,
    slots: RefCell<Slots>,
}

/// What a raw write did to a container's shape.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WriteOutcome {
    pub previous: Value,
    pub shape_changed: bool,
}

/// A raw plain object or array.
///
/// Cloning shares the same storage. Reads and writes on a `Container` are
/// untracked; go through [`ReactiveProxy`] for reactivity.
#[derive(Clone)]
pub struct Container(Rc<ContainerInner>);

impl Container {
    fn with_slots(slots: Slots) -> Self {
        Self(Rc::new(ContainerInner {
            id: TargetId::next(),
            slots: RefCell::new(slots),
        }))
    }

    /// A plain object literal.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        Self::with_slots(Slots::Object(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// A plain array.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::with_slots(Slots::Array(items.into_iter().collect()))
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        self.0.id
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(&*self.0.slots.borrow(), Slots::Array(_))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of own keys (objects) or elements (arrays).
    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.0.slots.borrow() {
            Slots::Object(map) => map.len(),
            Slots::Array(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw read. Missing keys read as `Undefined`.
    #[must_use]
    pub fn get(&self, key: &Key) -> Value {
        match &*self.0.slots.borrow() {
            Slots::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Slots::Array(items) => {
                if key.is_length() {
                    return Value::Number(items.len() as f64);
                }
                key.as_index()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
        }
    }

    #[must_use]
    pub fn has(&self, key: &Key) -> bool {
        match &*self.0.slots.borrow() {
            Slots::Object(map) => map.contains_key(key),
            Slots::Array(items) => {
                key.is_length() || key.as_index().is_some_and(|i| i < items.len())
            }
        }
    }

    /// Own keys in iteration order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.slots.borrow() {
            Slots::Object(map) => map.keys().cloned().collect(),
            Slots::Array(items) => (0..items.len()).map(Key::from).collect(),
        }
    }

    /// Raw write.
    ///
    /// Arrays accept index keys (growing with `Undefined` holes as needed) and
    /// `length` (a non-negative integer that truncates or extends). A single
    /// write may extend an array by at most [`MAX_ARRAY_GROWTH`] slots.
    pub(crate) fn set(&self, key: &Key, value: Value) -> Result<WriteOutcome> {
        match &mut *self.0.slots.borrow_mut() {
            Slots::Object(map) => {
                let previous = map.insert(key.clone(), value);
                Ok(WriteOutcome {
                    shape_changed: previous.is_none(),
                    previous: previous.unwrap_or_default(),
                })
            }
            Slots::Array(items) => {
                if key.is_length() {
                    let new_len = value
                        .as_number()
                        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX))
                        .map(|n| n as usize)
                        .filter(|n| *n <= items.len().saturating_add(MAX_ARRAY_GROWTH))
                        .ok_or_else(|| RuntimeError::InvalidKey {
                            key: format!("length = {value:?}"),
                        })?;
                    let previous = Value::Number(items.len() as f64);
                    let shape_changed = new_len != items.len();
                    items.resize(new_len, Value::Undefined);
                    return Ok(WriteOutcome {
                        previous,
                        shape_changed,
                    });
                }
                let index = key
                    .as_index()
                    .filter(|i| *i < items.len().saturating_add(MAX_ARRAY_GROWTH))
                    .ok_or_else(|| RuntimeError::InvalidKey {
                        key: key.to_string(),
                    })?;
                if index < items.len() {
                    let previous = std::mem::replace(&mut items[index], value);
                    Ok(WriteOutcome {
                        previous,
                        shape_changed: false,
                    })
                } else {
                    items.resize(index, Value::Undefined);
                    items.push(value);
                    Ok(WriteOutcome {
                        previous: Value::Undefined,
                        shape_changed: true,
                    })
                }
            }
        }
    }

    /// Raw delete. Deleting an array element leaves an `Undefined` hole.
    pub(crate) fn delete(&self, key: &Key) -> Result<Option<Value>> {
        match &mut *self.0.slots.borrow_mut() {
            Slots::Object(map) => Ok(map.remove(key)),
            Slots::Array(items) => {
                let index = key.as_index().ok_or_else(|| RuntimeError::InvalidKey {
                    key: key.to_string(),
                })?;
                Ok(items
                    .get_mut(index)
                    .map(|slot| std::mem::replace(slot, Value::Undefined)))
            }
        }
    }

    fn slots(&self) -> Ref<'_, Slots> {
        self.0.slots.borrow()
    }

    fn deep_eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&*self.slots(), &*other.slots()) {
            (Slots::Object(a), Slots::Object(b)) => a == b,
            (Slots::Array(a), Slots::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.slots() {
            Slots::Object(map) => f
                .debug_map()
                .entries(map.iter().map(|(k, v)| (k.as_str(), v)))
                .finish(),
            Slots::Array(items) => f.debug_list().entries(items).finish(),
        }
    }
}

/// A non-trackable object: held by reference, never wrapped.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Rc::new(value),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.type_name)
    }
}

/// A value held in component state.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// A raw plain object or array.
    Plain(Container),
    /// A non-trackable object.
    Opaque(Opaque),
    /// A membrane wrapper around a plain container.
    Proxy(ReactiveProxy),
}

impl Value {
    /// A fresh plain object.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        Self::Plain(Container::object(entries))
    }

    /// A fresh plain array.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::Plain(Container::array(items))
    }

    /// A non-trackable object.
    pub fn opaque<T: Any>(value: T) -> Self {
        Self::Opaque(Opaque::new(value))
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    /// Plain containers and proxies can be observed; everything else cannot.
    #[must_use]
    pub fn is_trackable(&self) -> bool {
        matches!(self, Self::Plain(_) | Self::Proxy(_))
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_proxy(&self) -> Option<&ReactiveProxy> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Self::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// The raw container behind a plain value or a proxy.
    #[must_use]
    pub fn container(&self) -> Option<&Container> {
        match self {
            Self::Plain(c) => Some(c),
            Self::Proxy(p) => Some(p.target()),
            _ => None,
        }
    }

    /// Identity comparison (`===`).
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Plain(a), Self::Plain(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            (Self::Proxy(a), Self::Proxy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Short type label used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Plain(_) | Self::Proxy(_) => match self.container() {
                Some(c) if c.is_array() => "array",
                _ => "object",
            },
            Self::Opaque(o) => o.type_name(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self.container(), other.container()) {
            (Some(a), Some(b)) => a.deep_eq(b),
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => self.is_same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Plain(c) => c.fmt(f),
            Self::Opaque(o) => o.fmt(f),
            Self::Proxy(p) => write!(f, "Proxy({:?})", p.target()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Container> for Value {
    fn from(c: Container) -> Self {
        Self::Plain(c)
    }
}

impl From<ReactiveProxy> for Value {
    fn from(p: ReactiveProxy) -> Self {
        Self::Proxy(p)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Self::Opaque(o)
    }
}

/// JSON maps onto fresh plain containers, so adapter payloads become
/// trackable state.
impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Json::String(s) => Self::from(s.as_str()),
            Json::Array(items) => Self::array(items.iter().map(Self::from)),
            Json::Object(map) => Self::object(map.iter().map(|(k, v)| (k.as_str(), Self::from(v)))),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::from(&json)
    }
}
