use dockdeck_core::ContextKey;
use serde::{Deserialize, Serialize};

/// Status filter value meaning "count every container".
pub const ALL_STATUS: &str = "all";

/// Settings the host persists for one UI element.
///
/// They are opaque lookup keys here; the host owns storage and the property
/// inspector edits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSettings {
    pub container_name: Option<String>,
    pub image_name: Option<String>,
    pub stack_name: Option<String>,
    pub status: Option<String>,
    pub context_name: Option<String>,
    pub remote_host: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl InstanceSettings {
    pub fn context(&self) -> ContextKey {
        ContextKey::from_setting(self.context_name.as_deref())
    }

    pub fn container(&self) -> Option<&str> {
        non_empty(&self.container_name)
    }

    pub fn image(&self) -> Option<&str> {
        non_empty(&self.image_name)
    }

    pub fn stack(&self) -> Option<&str> {
        non_empty(&self.stack_name)
    }

    /// Container state to count, [`ALL_STATUS`] when unset.
    pub fn status(&self) -> &str {
        non_empty(&self.status).unwrap_or(ALL_STATUS)
    }

    /// `self` with every field set in `newer` taking precedence.
    pub fn merged_with(&self, newer: &InstanceSettings) -> InstanceSettings {
        InstanceSettings {
            container_name: newer.container_name.clone().or_else(|| self.container_name.clone()),
            image_name: newer.image_name.clone().or_else(|| self.image_name.clone()),
            stack_name: newer.stack_name.clone().or_else(|| self.stack_name.clone()),
            status: newer.status.clone().or_else(|| self.status.clone()),
            context_name: newer.context_name.clone().or_else(|| self.context_name.clone()),
            remote_host: newer.remote_host.clone().or_else(|| self.remote_host.clone()),
        }
    }
}
