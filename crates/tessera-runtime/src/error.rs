#![forbid(unsafe_code)]

//! Runtime error types.

use tessera_core::{DefinitionError, WireError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by the element host, membrane and scheduler.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// A render pass tried to mutate reactive state.
    #[error(
        "{component}.render() has side effects on the state of {target}: \
         rendering must not mutate reactive state"
    )]
    RenderPurity { component: String, target: String },

    #[error("\"{field}\" is not a reactive field of component {component}")]
    UnknownField { component: String, field: String },

    #[error("\"{method}\" is not a public method of component {component}")]
    NotPublicMethod { component: String, method: String },

    #[error(
        "no wire adapter registered as \"{adapter}\" (field \"{field}\" of component {component})"
    )]
    UnknownAdapter {
        component: String,
        field: String,
        adapter: String,
    },

    #[error("invalid array key \"{key}\"")]
    InvalidKey { key: String },

    #[error("component {component} has been destroyed")]
    Destroyed { component: String },

    #[error("render flush did not settle after {passes} passes")]
    FlushLimitExceeded { passes: usize },
}
