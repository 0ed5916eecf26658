#![forbid(unsafe_code)]

//! Tessera public facade crate.
//!
//! Re-exports the component model and, with the default `runtime` feature,
//! the reactive runtime.

pub use tessera_core as core;
#[cfg(feature = "runtime")]
pub use tessera_runtime as runtime;

pub mod prelude {
    pub use tessera_core::{
        AccessorKind, ComponentClass, ComponentDef, DefinitionError, PropDecl, WireDef, WireError,
        get_component_def, wire,
    };
    #[cfg(feature = "runtime")]
    pub use tessera_runtime::{
        Behavior, Element, Lifecycle, ReactiveProxy, Runtime, RuntimeConfig, RuntimeError, Value,
        WireAdapter, WireSink,
    };
}
