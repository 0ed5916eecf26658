#![forbid(unsafe_code)]

//! Core: component classes, the global attribute namespace, declaration-time
//! decorators, and the definition compiler.

pub mod attributes;
pub mod class;
pub mod decorators;
pub mod def;
pub mod error;

pub use class::{AccessorKind, ClassBuilder, ClassId, ComponentClass, Heritage, PropDecl};
pub use decorators::{AdapterId, FieldDecorator, WireDef, wire};
pub use def::{ComponentDef, PropDef, get_component_def};
pub use error::{DefinitionError, ReservedKey, WireError};
