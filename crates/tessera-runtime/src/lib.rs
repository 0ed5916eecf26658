#![forbid(unsafe_code)]

//! Runtime: the reactive membrane, the render scheduler bridge, component
//! elements and the wire adapter bridge.
//!
//! # Example
//!
//! ```
//! use tessera_core::{ComponentClass, PropDecl};
//! use tessera_runtime::{Behavior, Runtime, Value};
//!
//! let class = ComponentClass::extending_base("Greeting")
//!     .public_prop("name", PropDecl::inferred())
//!     .build();
//! let runtime = Runtime::new();
//! let el = runtime
//!     .create_element(
//!         "x-greeting",
//!         &class,
//!         Behavior::new().with_render(|el| el.get("name").map(drop)),
//!     )
//!     .unwrap();
//! el.connect().unwrap();
//!
//! el.set("name", "world").unwrap();
//! el.set("name", "tessera").unwrap();
//! runtime.flush().unwrap();
//! assert_eq!(el.render_count(), 2);
//! assert_eq!(el.get("name").unwrap(), Value::from("tessera"));
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod reactive;
pub mod runtime;
pub mod scheduler;
pub mod wire;

pub use config::RuntimeConfig;
pub use element::{Behavior, Element, Lifecycle};
pub use error::{Result, RuntimeError};
pub use reactive::{
    Container, Key, MAX_ARRAY_GROWTH, Membrane, Opaque, ReactiveProxy, TargetId, Value,
};
pub use runtime::{FlushReport, Runtime};
pub use scheduler::{ObserverId, RenderBridge, RenderGuard, Scheduler};
pub use wire::{AdapterRegistry, WireAdapter, WireSink};
