use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::{
    apply_settings, format_title, unwatch, watch, Action, Instance, Source, View, NOT_FOUND_TITLE,
    RUNNING_STATE, STOPPED_STATE,
};
use crate::{protocol::ListKind, settings::InstanceSettings};

const SOURCES: &[Source] = &[Source::Health, Source::Containers];

/// Key starting a stopped container and stopping a running one.
pub struct ContainerToggle(Arc<Inner>);

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
        let Some(name) = instance.settings().container().map(str::to_string) else {
            return;
        };
        let Some(snapshot) = instance.engine().containers().snapshot(&instance.context()) else {
            return;
        };

        let surface = instance.surface();
        match snapshot.get(&name) {
            Some(record) => {
                surface.set_title(&format_title(&name));
                surface.set_state(if record.state.is_running() {
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

impl ContainerToggle {
    pub fn new(instance: Instance) -> Self {
        Self(Arc::new(Inner { instance }))
    }
}

#[async_trait]
impl Action for ContainerToggle {
    async fn appear(&self) {
        let instance = &self.0.instance;
        let context = instance.context();
        let name = instance.settings().container().map(str::to_string);

        // Nothing polled yet for this context; ask once so the key does not
        // stay blank until the first poll.
        if let Some(name) = name {
            if instance.engine().containers().snapshot(&context).is_none() {
                match instance.engine().docker().container_state(&context, &name).await {
                    Some(state) => {
                        instance.surface().set_title(&format_title(&name));
                        instance.surface().set_state(if state.is_running() {
                            RUNNING_STATE
                        } else {
                            STOPPED_STATE
                        });
                    }
                    None => instance.surface().set_title(NOT_FOUND_TITLE),
                }
            }
        }

        watch(&self.0, SOURCES);
    }

    async fn disappear(&self) {
        unwatch(self.0.as_ref(), SOURCES);
    }

    async fn settings_changed(&self, settings: InstanceSettings) {
        if let Some(name) = settings.container() {
            self.0.instance.surface().set_title(&format_title(name));
        }
        apply_settings(&self.0, SOURCES, settings);
    }

    #[instrument(skip(self), fields(instance = %self.0.instance.id()))]
    async fn key_down(&self) {
        let instance = &self.0.instance;
        if !instance.ping().await {
            return instance.render_key_down();
        }
        let Some(name) = instance.settings().container().map(str::to_string) else {
            error!("No container selected");
            return;
        };
        let context = instance.context();
        let engine = instance.engine();
        let docker = engine.docker();

        let Some(state) = docker.container_state(&context, &name).await else {
            instance.surface().set_title(NOT_FOUND_TITLE);
            return;
        };

        if state.is_running() {
            info!(container = %name, context = %context, "Stopping container");
            let stopped = match docker.stop(&context, &name).await {
                Ok(()) => docker.wait(&context, &name).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stopped {
                error!(container = %name, context = %context, error = %e, "Error stopping container");
            }
        } else {
            // Swarm tasks come back by scaling their service, not by `start`.
            let service = engine
                .containers()
                .snapshot(&context)
                .and_then(|snapshot| {
                    snapshot
                        .get(&name)
                        .and_then(|record| record.swarm_service().map(str::to_string))
                });
            let started = match service {
                Some(service) => {
                    info!(container = %name, %service, "Scaling swarm service up");
                    docker.scale_service(&context, &service, 1).await
                }
                None => {
                    info!(container = %name, context = %context, "Starting container");
                    docker.start(&context, &name).await
                }
            };
            if let Err(e) = started {
                error!(container = %name, context = %context, error = %e, "Error starting container");
            }
        }

        engine.containers().poll_now(&context).await;
    }

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>) {
        self.0.instance.answer_list(request, pending).await;
    }
}
