use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::{
    apply_settings, unwatch, watch, Action, Instance, Source, View, RUNNING_STATE, STOPPED_STATE,
};
use crate::{protocol::ListKind, settings::InstanceSettings};

const SOURCES: &[Source] = &[Source::Health, Source::Containers];

/// Key creating a container from an image, or removing it when it exists.
pub struct RunOrRemove(Arc<Inner>);

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
        let Some(snapshot) = instance.engine().containers().snapshot(&instance.context()) else {
            return;
        };
        let exists = instance
            .settings()
            .container()
            .is_some_and(|name| snapshot.contains_key(name));
        instance
            .surface()
            .set_state(if exists { RUNNING_STATE } else { STOPPED_STATE });
    }
}

impl RunOrRemove {
    pub fn new(instance: Instance) -> Self {
        Self(Arc::new(Inner { instance }))
    }
}

#[async_trait]
impl Action for RunOrRemove {
    async fn appear(&self) {
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
        let settings = instance.settings();
        let Some(image) = settings.image() else {
            error!("No image name specified");
            return;
        };
        let Some(name) = settings.container() else {
            error!("No container name specified");
            return;
        };
        let context = instance.context();
        let docker = instance.engine().docker();

        let result = if docker.container_state(&context, name).await.is_some() {
            info!(container = %name, "Removing container");
            docker.remove(&context, name).await
        } else {
            info!(container = %name, %image, "Running container");
            docker.run_detached(&context, image, name).await
        };
        if let Err(e) = result {
            error!(container = %name, error = %e, "Error handling container");
        }

        instance.engine().containers().poll_now(&context).await;
    }

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>) {
        self.0.instance.answer_list(request, pending).await;
    }
}
