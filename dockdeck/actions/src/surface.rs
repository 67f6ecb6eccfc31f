use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::protocol::{HostCommand, ListItem, ListKind};

/// What a controller may do to the UI element it drives.
///
/// Calls are fire-and-forget; rendering failures are the host's business.
pub trait Surface: Send + Sync + 'static {
    fn set_title(&self, title: &str);
    /// Select the visual state of a key (0 or 1).
    fn set_state(&self, state: u8);
    /// Update the touch strip of a dial.
    fn set_feedback(&self, icon: &str, title: Option<&str>);
    /// Answer a property inspector list request.
    fn push_list(&self, request: ListKind, items: Vec<ListItem>);
}

/// Surface turning every call into a [`HostCommand`] on a channel.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    instance: String,
    tx: UnboundedSender<HostCommand>,
}

impl ChannelSurface {
    pub fn new(instance: impl Into<String>, tx: UnboundedSender<HostCommand>) -> Self {
        Self {
            instance: instance.into(),
            tx,
        }
    }

    fn send(&self, command: HostCommand) {
        if self.tx.send(command).is_err() {
            debug!(instance = %self.instance, "Host channel closed, dropping command");
        }
    }
}

impl Surface for ChannelSurface {
    fn set_title(&self, title: &str) {
        self.send(HostCommand::SetTitle {
            instance: self.instance.clone(),
            title: title.to_string(),
        });
    }

    fn set_state(&self, state: u8) {
        self.send(HostCommand::SetState {
            instance: self.instance.clone(),
            state,
        });
    }

    fn set_feedback(&self, icon: &str, title: Option<&str>) {
        self.send(HostCommand::SetFeedback {
            instance: self.instance.clone(),
            icon: icon.to_string(),
            title: title.map(str::to_string),
        });
    }

    fn push_list(&self, request: ListKind, items: Vec<ListItem>) {
        self.send(HostCommand::SendToPropertyInspector {
            instance: self.instance.clone(),
            request,
            items,
        });
    }
}
