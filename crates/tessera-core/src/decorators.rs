#![forbid(unsafe_code)]

//! Declaration-time field decorators.
//!
//! `@wire(adapter, config?)` is only meaningful while a class is being
//! declared. The declaration path ([`ClassBuilder::decorate`]) opens a scope
//! for the field being decorated; [`wire`] checks for that scope and fails
//! with [`WireError::NotADecorator`] everywhere else, e.g. when a component
//! constructor calls it directly.
//!
//! [`ClassBuilder::decorate`]: crate::class::ClassBuilder::decorate

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::WireError;

/// Name of a wire adapter, resolved by the runtime's adapter registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(Arc<str>);

impl AdapterId {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterId({})", self.0)
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One wired field's configuration: the adapter that feeds it (if any) and
/// the config object handed to that adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct WireDef {
    pub adapter: Option<AdapterId>,
    pub config: Json,
}

impl WireDef {
    /// A wire entry with only a config object, as in a static
    /// `wire = { x: { type: 'record' } }` map.
    #[must_use]
    pub fn new(config: Json) -> Self {
        Self {
            adapter: None,
            config,
        }
    }

    /// A wire entry fed by `adapter`.
    #[must_use]
    pub fn with_adapter(adapter: impl Into<AdapterId>, config: Json) -> Self {
        Self {
            adapter: Some(adapter.into()),
            config,
        }
    }
}

impl Default for WireDef {
    fn default() -> Self {
        Self::new(Json::Object(serde_json::Map::new()))
    }
}

/// Output of a field decorator, folded into the class by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDecorator {
    Wire(WireDef),
}

thread_local! {
    static DECLARING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Pops the declaration scope even if the decorator body unwinds.
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        DECLARING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn with_declaration_scope<R>(field: &str, body: impl FnOnce() -> R) -> R {
    DECLARING.with(|stack| stack.borrow_mut().push(field.to_string()));
    let _guard = ScopeGuard;
    body()
}

/// The field currently being declared on this thread, if any.
#[must_use]
pub fn declaring_field() -> Option<String> {
    DECLARING.with(|stack| stack.borrow().last().cloned())
}

/// `@wire(adapter, config?)`.
///
/// Succeeds only inside [`ClassBuilder::decorate`]; a direct call is a
/// protocol misuse.
///
/// ```
/// use tessera_core::class::ComponentClass;
/// use tessera_core::decorators::wire;
/// use tessera_core::error::WireError;
///
/// assert_eq!(wire("record", None), Err(WireError::NotADecorator));
///
/// let class = ComponentClass::extending_base("Detail")
///     .decorate("record", || wire("record", None))
///     .unwrap()
///     .build();
/// assert_eq!(class.wire().map(|w| w.len()), Some(1));
/// ```
///
/// [`ClassBuilder::decorate`]: crate::class::ClassBuilder::decorate
pub fn wire(
    adapter: impl Into<AdapterId>,
    config: Option<Json>,
) -> Result<FieldDecorator, WireError> {
    let Some(field) = declaring_field() else {
        return Err(WireError::NotADecorator);
    };
    let adapter = adapter.into();
    tracing::trace!(message = "wire.declare", field = %field, adapter = %adapter);
    Ok(FieldDecorator::Wire(WireDef {
        adapter: Some(adapter),
        config: config.unwrap_or_else(|| Json::Object(serde_json::Map::new())),
    }))
}
