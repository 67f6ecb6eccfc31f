use std::sync::Arc;

use async_trait::async_trait;
use dockdeck_core::ToggleOutcome;
use tracing::{error, info, instrument};

use super::{
    apply_settings, format_title, unwatch, watch, Action, Instance, Source, View, NOT_FOUND_TITLE,
    NO_STACK_TITLE, RUNNING_STATE, STOPPED_STATE,
};
use crate::{protocol::ListKind, settings::InstanceSettings};

const SOURCES: &[Source] = &[Source::Health, Source::Stacks];

/// Key bringing a compose project or swarm stack up or down as a whole.
pub struct StackToggle(Arc<Inner>);

struct Inner {
    instance: Instance,
}

impl View for Inner {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn render(&self) {
        let instance = &self.instance;
        if instance.is_down() {
            return self.render_down();
        }
        let surface = instance.surface();
        let Some(name) = instance.settings().stack().map(str::to_string) else {
            surface.set_title(NO_STACK_TITLE);
            surface.set_state(STOPPED_STATE);
            return;
        };
        let Some(stacks) = instance.engine().stacks().snapshot(&instance.context()) else {
            return;
        };

        match stacks.get(&name) {
            Some(stack) => {
                surface.set_title(&format_title(&name));
                surface.set_state(if stack.all_running() {
                    RUNNING_STATE
                } else {
                    STOPPED_STATE
                });
            }
            None => {
                surface.set_title(NOT_FOUND_TITLE);
                surface.set_state(STOPPED_STATE);
            }
        }
    }
}

impl StackToggle {
    pub fn new(instance: Instance) -> Self {
        Self(Arc::new(Inner { instance }))
    }
}

#[async_trait]
impl Action for StackToggle {
    async fn appear(&self) {
        if let Some(name) = self.0.instance.settings().stack() {
            self.0.instance.surface().set_title(&format_title(name));
        }
        watch(&self.0, SOURCES);
    }

    async fn disappear(&self) {
        unwatch(self.0.as_ref(), SOURCES);
    }

    async fn settings_changed(&self, settings: InstanceSettings) {
        apply_settings(&self.0, SOURCES, settings);
    }

    #[instrument(skip(self), fields(instance = %self.0.instance.id()))]
    async fn key_down(&self) {
        let instance = &self.0.instance;
        if !instance.ping().await {
            return instance.render_key_down();
        }
        let Some(name) = instance.settings().stack().map(str::to_string) else {
            error!("No stack selected");
            return;
        };
        let context = instance.context();

        match instance.engine().toggler().toggle(&context, &name).await {
            Ok(ToggleOutcome::NotFound) => instance.surface().set_title(NOT_FOUND_TITLE),
            Ok(outcome) => info!(stack = %name, %outcome, "Toggled stack"),
            Err(e) => error!(stack = %name, error = %e, "Error toggling stack"),
        }

        instance.engine().containers().poll_now(&context).await;
    }

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>) {
        self.0.instance.answer_list(request, pending).await;
    }
}
