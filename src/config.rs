//! Configuration options for the luarecord bridge.

use std::time::Duration;

/// Attribute names never shown by the inspection view.
pub const DEFAULT_INSPECT_EXCLUDE: &[&str] =
    &["site_id", "id", "search_text", "created_at", "updated_at", "password", "salt"];

/// Configuration options for a bridge and its script runtime.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name of the Lua global table holding the verb table.
    /// Default: "bridge"
    pub namespace: String,

    /// Name of the Lua global function receiving lifecycle events.
    /// Default: "run_event_hooks"
    pub event_entry_point: String,

    /// Maximum rendered length of string attributes in the inspection view,
    /// ellipsis included.
    /// Default: 64
    pub inspect_max_len: usize,

    /// Attribute names omitted from the inspection view.
    /// Default: `DEFAULT_INSPECT_EXCLUDE`
    pub inspect_exclude: Vec<String>,

    /// Maximum wall-clock time for a single script execution.
    /// Default: None (no limit)
    pub script_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            namespace: "bridge".to_string(),
            event_entry_point: "run_event_hooks".to_string(),
            inspect_max_len: 64,
            inspect_exclude: DEFAULT_INSPECT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
            script_timeout: None,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Lua namespace table name.
    pub fn namespace(mut self, name: impl Into<String>) -> Self {
        self.namespace = name.into();
        self
    }

    /// Sets the Lua event entry point name.
    pub fn event_entry_point(mut self, name: impl Into<String>) -> Self {
        self.event_entry_point = name.into();
        self
    }

    /// Sets the string truncation length of the inspection view.
    pub fn inspect_max_len(mut self, len: usize) -> Self {
        self.inspect_max_len = len;
        self
    }

    /// Adds an attribute name to the inspection exclusion list.
    pub fn exclude_from_inspect(mut self, name: impl Into<String>) -> Self {
        self.inspect_exclude.push(name.into());
        self
    }

    /// Sets the script execution timeout.
    pub fn script_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if !is_lua_identifier(&self.namespace) {
            return Err(crate::Error::invalid_argument(format!(
                "namespace must be a Lua identifier, got {:?}",
                self.namespace
            )));
        }
        if !is_lua_identifier(&self.event_entry_point) {
            return Err(crate::Error::invalid_argument(format!(
                "event_entry_point must be a Lua identifier, got {:?}",
                self.event_entry_point
            )));
        }
        if self.inspect_max_len <= 3 {
            return Err(crate::Error::invalid_argument("inspect_max_len must be > 3"));
        }
        if self.script_timeout == Some(Duration::ZERO) {
            return Err(crate::Error::invalid_argument("script_timeout must be > 0"));
        }
        Ok(())
    }
}

fn is_lua_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
