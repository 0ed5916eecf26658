#![forbid(unsafe_code)]

//! Reactive state for component elements.
//!
//! - [`Value`]: what a reactive field holds. Plain objects and arrays live in
//!   shared [`Container`]s; other objects are [`Opaque`].
//! - [`Membrane`]: wraps containers in [`ReactiveProxy`] handles, records
//!   reads against the current render observer and schedules re-renders on
//!   writes.
//!
//! # Architecture
//!
//! Everything here is `Rc`-shared and single-threaded. The membrane talks to
//! the render scheduler only through [`RenderBridge`](crate::RenderBridge),
//! so it can be driven by the runtime's [`Scheduler`](crate::Scheduler) or by
//! any other host.

pub mod membrane;
pub mod value;

pub(crate) use membrane::Slot;
pub use membrane::{Membrane, ReactiveProxy};
pub use value::{Container, Key, MAX_ARRAY_GROWTH, Opaque, TargetId, Value};
