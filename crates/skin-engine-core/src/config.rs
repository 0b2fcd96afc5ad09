//! Engine configuration.
//!
//! The host usually keeps these settings in its own configuration store and
//! hands them to the engine as TOML:
//!
//! ```
//! use skin_engine_core::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(
//!     r#"
//!     strict_focus = false
//!     dispatcher_capacity = 256
//!     "#,
//! )
//! .unwrap();
//! assert!(!config.strict_focus);
//! assert!(config.lazy_bindings);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::thread_check::set_thread_checks_enabled;

/// Runtime switches for the skin engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject focus candidates that are not predominantly in the requested direction.
    pub strict_focus: bool,
    /// Defer binding activation until a node is attached to a live root.
    pub lazy_bindings: bool,
    /// Report property writes from threads other than the owner thread.
    pub thread_checks: bool,
    /// Bound for the UI dispatcher queue; `None` means unbounded.
    pub dispatcher_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_focus: true,
            lazy_bindings: true,
            thread_checks: cfg!(debug_assertions),
            dispatcher_capacity: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Apply process-wide settings (currently the thread check switch).
    pub fn apply_global(&self) {
        set_thread_checks_enabled(self.thread_checks);
    }
}
