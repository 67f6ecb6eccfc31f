//! Messages exchanged with the host application.
//!
//! The bridge speaks one JSON object per line in both directions. Every
//! message names its kind in the `event` field:
//!
//! ```json
//! {"event":"willAppear","instance":"key-1","action":"container-toggle","settings":{"containerName":"web"}}
//! {"event":"setTitle","instance":"key-1","title":"web"}
//! ```

use serde::{Deserialize, Serialize};

use crate::settings::InstanceSettings;

/// The kinds of UI element this plugin provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Key starting or stopping one container.
    ContainerToggle,
    /// Key starting or stopping a compose project or swarm stack.
    StackToggle,
    /// Key running an image under a fixed name, or removing that container.
    RunOrRemove,
    /// Key showing how many containers are in a given state.
    ContainersCount,
    /// Dial cycling through containers and toggling the selected one.
    SelectToggle,
}

/// Lists the property inspector can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListKind {
    GetContainers,
    GetImages,
    GetStacks,
    GetDockerContexts,
}

/// One entry of a drop-down in the property inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub label: String,
    pub value: String,
}

impl ListItem {
    /// Item whose label and value are both `name`.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            value: name,
        }
    }
}

/// Lifecycle and input notifications sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    WillAppear {
        instance: String,
        action: ActionKind,
        #[serde(default)]
        settings: InstanceSettings,
    },
    WillDisappear {
        instance: String,
    },
    DidReceiveSettings {
        instance: String,
        #[serde(default)]
        settings: InstanceSettings,
    },
    KeyDown {
        instance: String,
    },
    DialRotate {
        instance: String,
        ticks: i32,
    },
    DialDown {
        instance: String,
    },
    /// The property inspector asks for a list, possibly with settings the
    /// user has not saved yet.
    SendToPlugin {
        instance: String,
        request: ListKind,
        #[serde(default)]
        settings: Option<InstanceSettings>,
    },
}

impl HostEvent {
    pub fn instance(&self) -> &str {
        match self {
            HostEvent::WillAppear { instance, .. }
            | HostEvent::WillDisappear { instance }
            | HostEvent::DidReceiveSettings { instance, .. }
            | HostEvent::KeyDown { instance }
            | HostEvent::DialRotate { instance, .. }
            | HostEvent::DialDown { instance }
            | HostEvent::SendToPlugin { instance, .. } => instance,
        }
    }
}

/// Rendering requests sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostCommand {
    SetTitle {
        instance: String,
        title: String,
    },
    SetState {
        instance: String,
        state: u8,
    },
    SetFeedback {
        instance: String,
        icon: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    SendToPropertyInspector {
        instance: String,
        request: ListKind,
        items: Vec<ListItem>,
    },
}
