use thiserror::Error;

use crate::attributes::GLOBAL_ATTRIBUTES_URL;

pub type Result<T> = std::result::Result<T, DefinitionError>;

/// Fatal problems found while compiling a component definition.
///
/// Raised once, at the first definition build for a class. No partial
/// definition is ever published when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("{component} is not a valid component: it must extend the base element")]
    NotAComponent { component: String },

    #[error(
        "invalid public property \"{prop}\" in component {component}: \
         accessor declares a setter without a getter"
    )]
    AccessorWithoutGetter { component: String, prop: String },

    #[error(
        "Invalid entry \"{attr}\" in component {component} observedAttributes. \
         Use existing \"{prop}\" setter to track changes."
    )]
    ObservedAccessorCollision {
        component: String,
        attr: String,
        prop: String,
    },

    #[error(
        "Invalid entry \"{attr}\" in component {component} observedAttributes. \
         \"{attr}\" is not a valid global HTML Attribute. {}See {}",
        did_you_mean(.suggestion.as_deref()),
        GLOBAL_ATTRIBUTES_URL
    )]
    InvalidObservedAttribute {
        component: String,
        attr: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: Option<&str>) -> String {
    suggestion
        .map(|s| format!("Did you mean \"{s}\"? "))
        .unwrap_or_default()
}

impl DefinitionError {
    /// Name of the component whose definition failed.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::NotAComponent { component }
            | Self::AccessorWithoutGetter { component, .. }
            | Self::ObservedAccessorCollision { component, .. }
            | Self::InvalidObservedAttribute { component, .. } => component,
        }
    }
}

/// Misuse of a declaration-time protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("@wire(adapter, config?) may only be used as a decorator.")]
    NotADecorator,
}

/// Attempt to overwrite a compiler-owned definition key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("\"{0}\" is a reserved component definition key")]
pub struct ReservedKey(pub String);
