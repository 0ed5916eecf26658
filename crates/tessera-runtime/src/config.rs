#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Defaults suit development builds. Each knob can be overridden from the
//! environment:
//!
//! | Variable                    | Field              |
//! |-----------------------------|--------------------|
//! | `TESSERA_WARN_UNTRACKABLE`  | `warn_untrackable` |
//! | `TESSERA_MAX_FLUSH_PASSES`  | `max_flush_passes` |
//! | `TESSERA_DEV_CHECKS`        | `dev_checks`       |

use std::env;

/// Runtime knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Emit a warning when a non-trackable object is stored in a field.
    pub warn_untrackable: bool,
    /// Upper bound on flush passes before the scheduler gives up. Values
    /// below one are treated as one.
    pub max_flush_passes: usize,
    /// Reject writes to reactive state from inside a render pass.
    pub dev_checks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            warn_untrackable: true,
            max_flush_passes: 100,
            dev_checks: true,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_warn_untrackable(mut self, enabled: bool) -> Self {
        self.warn_untrackable = enabled;
        self
    }

    /// Clamped to at least one pass.
    #[must_use]
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }

    #[must_use]
    pub fn with_dev_checks(mut self, enabled: bool) -> Self {
        self.dev_checks = enabled;
        self
    }

    /// Defaults overridden by `TESSERA_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup("TESSERA_WARN_UNTRACKABLE")
            && let Some(enabled) = parse_flag(&val)
        {
            config.warn_untrackable = enabled;
        }
        if let Some(val) = lookup("TESSERA_MAX_FLUSH_PASSES")
            && let Ok(n) = val.trim().parse::<usize>()
        {
            config = config.with_max_flush_passes(n);
        }
        if let Some(val) = lookup("TESSERA_DEV_CHECKS")
            && let Some(enabled) = parse_flag(&val)
        {
            config.dev_checks = enabled;
        }
        config
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    let val = val.trim();
    if val == "1" || val.eq_ignore_ascii_case("true") || val.eq_ignore_ascii_case("on") {
        Some(true)
    } else if val == "0" || val.eq_ignore_ascii_case("false") || val.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}
