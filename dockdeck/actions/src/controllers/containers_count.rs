use std::sync::Arc;

use async_trait::async_trait;
use dockdeck_core::docker::ContainerSnapshot;

use super::{apply_settings, unwatch, watch, Action, Instance, Source, View, RUNNING_STATE};
use crate::{
    protocol::ListKind,
    settings::{InstanceSettings, ALL_STATUS},
};

const SOURCES: &[Source] = &[Source::Health, Source::Containers];

/// Containers of `snapshot` in state `status`, or all of them for
/// [`ALL_STATUS`].
pub fn count_containers(snapshot: &ContainerSnapshot, status: &str) -> usize {
    if status.eq_ignore_ascii_case(ALL_STATUS) {
        return snapshot.len();
    }
    snapshot
        .values()
        .filter(|record| record.state.as_str().eq_ignore_ascii_case(status))
        .count()
}

/// Key displaying `"<status>\n<count>"`.
pub struct ContainersCount(Arc<Inner>);

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
        let settings = instance.settings();
        let status = settings.status();
        let count = count_containers(&snapshot, status);

        instance.surface().set_state(RUNNING_STATE);
        instance.surface().set_title(&format!("{status}\n{count}"));
    }
}

impl ContainersCount {
    pub fn new(instance: Instance) -> Self {
        Self(Arc::new(Inner { instance }))
    }
}

#[async_trait]
impl Action for ContainersCount {
    async fn appear(&self) {
        watch(&self.0, SOURCES);
    }

    async fn disappear(&self) {
        unwatch(self.0.as_ref(), SOURCES);
    }

    async fn settings_changed(&self, settings: InstanceSettings) {
        apply_settings(&self.0, SOURCES, settings);
    }

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>) {
        self.0.instance.answer_list(request, pending).await;
    }
}
