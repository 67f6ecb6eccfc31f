use std::fmt;

use serde::{Deserialize, Serialize};

/// Name docker uses for the local context. Settings that carry it, or carry
/// nothing at all, resolve to [`ContextKey::Default`].
pub const DEFAULT_CONTEXT_NAME: &str = "default";

/// Identifies the Docker endpoint a command targets.
///
/// Every store, queue and cache in this crate is partitioned by this key;
/// two keys never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ContextKey {
    /// The local/default context: commands run without `--context`.
    #[default]
    Default,
    /// A named context from `docker context ls`.
    Named(String),
}

impl ContextKey {
    /// Resolve a per-instance setting. Empty and `"default"` mean the local context.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some(DEFAULT_CONTEXT_NAME) => ContextKey::Default,
            Some(name) => ContextKey::Named(name.to_string()),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_setting(Some(&name.into()))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ContextKey::Default => None,
            ContextKey::Named(name) => Some(name),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ContextKey::Default)
    }

    /// Global flags to prepend to a docker invocation targeting this context.
    pub fn cli_args(&self) -> Vec<String> {
        match self {
            ContextKey::Default => Vec::new(),
            ContextKey::Named(name) => vec!["--context".to_string(), name.clone()],
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or(DEFAULT_CONTEXT_NAME))
    }
}

impl From<Option<String>> for ContextKey {
    fn from(value: Option<String>) -> Self {
        Self::from_setting(value.as_deref())
    }
}

impl From<ContextKey> for Option<String> {
    fn from(value: ContextKey) -> Self {
        match value {
            ContextKey::Default => None,
            ContextKey::Named(name) => Some(name),
        }
    }
}
