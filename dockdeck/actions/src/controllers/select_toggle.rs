use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use super::{
    apply_settings, unwatch, watch, Action, Instance, Source, View, ICON_RUNNING, ICON_STOPPED,
    NO_CONTAINER_TITLE,
};
use crate::{protocol::ListKind, settings::InstanceSettings};

const SOURCES: &[Source] = &[Source::Health, Source::Containers];

/// Dial cycling through the containers of a context; pressing it toggles the
/// selected one.
pub struct SelectToggle(Arc<Inner>);

struct Inner {
    instance: Instance,
    selected: Mutex<usize>,
}

impl Inner {
    fn selected_index(&self) -> usize {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Name under the cursor, clamped to the current container list.
    fn selected_name(&self) -> Option<String> {
        let instance = &self.instance;
        let snapshot = instance.engine().containers().snapshot(&instance.context())?;
        if snapshot.is_empty() {
            return None;
        }
        let index = self.selected_index().min(snapshot.len() - 1);
        snapshot.keys().nth(index).cloned()
    }

    fn rotate(&self, ticks: i32) {
        let instance = &self.instance;
        let Some(snapshot) = instance.engine().containers().snapshot(&instance.context()) else {
            return;
        };
        let len = snapshot.len() as i64;
        if len == 0 {
            return;
        }
        let mut selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
        *selected = (*selected as i64 + i64::from(ticks)).rem_euclid(len) as usize;
    }
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
        let Some(snapshot) = instance.engine().containers().snapshot(&instance.context()) else {
            return;
        };

        match self.selected_name() {
            Some(name) => {
                let running = snapshot
                    .get(&name)
                    .is_some_and(|record| record.state.is_running());
                let icon = if running { ICON_RUNNING } else { ICON_STOPPED };
                instance.surface().set_feedback(icon, Some(&name));
            }
            None => instance
                .surface()
                .set_feedback(ICON_STOPPED, Some(NO_CONTAINER_TITLE)),
        }
    }

    fn render_down(&self) {
        self.instance.render_dial_down();
    }
}

impl SelectToggle {
    pub fn new(instance: Instance) -> Self {
        Self(Arc::new(Inner {
            instance,
            selected: Mutex::new(0),
        }))
    }

    /// Container currently under the cursor.
    pub fn selected(&self) -> Option<String> {
        self.0.selected_name()
    }
}

#[async_trait]
impl Action for SelectToggle {
    async fn appear(&self) {
        watch(&self.0, SOURCES);
    }

    async fn disappear(&self) {
        unwatch(self.0.as_ref(), SOURCES);
    }

    async fn settings_changed(&self, settings: InstanceSettings) {
        apply_settings(&self.0, SOURCES, settings);
    }

    async fn dial_rotate(&self, ticks: i32) {
        self.0.rotate(ticks);
        debug!(instance = %self.0.instance.id(), ticks, index = self.0.selected_index(), "Dial rotated");
        self.0.render();
    }

    #[instrument(skip(self), fields(instance = %self.0.instance.id()))]
    async fn dial_down(&self) {
        let instance = &self.0.instance;
        if !instance.ping().await {
            return instance.render_dial_down();
        }
        let Some(name) = self.0.selected_name() else {
            error!("No container selected");
            return;
        };
        let context = instance.context();
        let docker = instance.engine().docker();

        let Some(state) = docker.container_state(&context, &name).await else {
            error!(container = %name, "Selected container no longer exists");
            instance.engine().containers().poll_now(&context).await;
            return;
        };

        let result = if state.is_running() {
            info!(container = %name, "Stopping container");
            match docker.stop(&context, &name).await {
                Ok(()) => docker.wait(&context, &name).await,
                Err(e) => Err(e),
            }
        } else {
            info!(container = %name, "Starting container");
            docker.start(&context, &name).await
        };
        if let Err(e) = result {
            error!(container = %name, error = %e, "Error toggling container");
        }

        instance.engine().containers().poll_now(&context).await;
    }

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>) {
        self.0.instance.answer_list(request, pending).await;
    }
}
