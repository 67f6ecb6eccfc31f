//! One controller object per visible UI element.
//!
//! Controllers never poll on their own. They subscribe to the engine's
//! stores under their instance id and redraw from the shared snapshots
//! whenever a store reports a change.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use dockdeck_core::{
    docker::{ContainerSnapshot, StackSnapshot},
    ContextKey, Engine,
};
use tracing::{debug, warn};

use crate::{
    protocol::{ListItem, ListKind},
    settings::InstanceSettings,
    surface::Surface,
};

mod container_toggle;
mod containers_count;
mod run_or_remove;
mod select_toggle;
mod stack_toggle;

pub use container_toggle::ContainerToggle;
pub use containers_count::ContainersCount;
pub use run_or_remove::RunOrRemove;
pub use select_toggle::SelectToggle;
pub use stack_toggle::StackToggle;

/// Key state of a running container or fully running stack.
pub const RUNNING_STATE: u8 = 0;
/// Key state of anything else.
pub const STOPPED_STATE: u8 = 1;
/// Key state shown while the daemon is unreachable.
pub const ERROR_STATE: u8 = 1;

pub const DOCKER_DOWN_TITLE: &str = "Please, launch Docker";
pub const DIAL_DOCKER_DOWN_TITLE: &str = "Docker is down";
pub const NOT_FOUND_TITLE: &str = "Not\nFound";
pub const NO_STACK_TITLE: &str = "No\nStack";
pub const NO_CONTAINER_TITLE: &str = "No Container";

pub const ICON_RUNNING: &str = "imgs/actions/docker-running/key";
pub const ICON_STOPPED: &str = "imgs/actions/docker-stopped/key";
pub const ICON_ERROR: &str = "imgs/actions/error/key";

/// Names are split on `-` so they wrap on the small key display.
pub fn format_title(name: &str) -> String {
    name.replace('-', "\n")
}

/// Entry points the dispatcher calls for host events.
#[async_trait]
pub trait Action: Send + Sync {
    async fn appear(&self);

    async fn disappear(&self);

    async fn settings_changed(&self, settings: InstanceSettings);

    async fn key_down(&self) {}

    async fn dial_rotate(&self, _ticks: i32) {}

    async fn dial_down(&self) {}

    async fn list_request(&self, request: ListKind, pending: Option<InstanceSettings>);
}

/// Stores a controller listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Health,
    Containers,
    Stacks,
}

/// State every controller carries.
pub struct Instance {
    id: String,
    engine: Engine,
    surface: Arc<dyn Surface>,
    settings: Mutex<InstanceSettings>,
    /// Context the store subscriptions are registered under.
    subscribed: Mutex<Option<ContextKey>>,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        engine: Engine,
        surface: Arc<dyn Surface>,
        settings: InstanceSettings,
    ) -> Self {
        Self {
            id: id.into(),
            engine,
            surface,
            settings: Mutex::new(settings),
            subscribed: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    fn settings_guard(&self) -> MutexGuard<'_, InstanceSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscribed(&self) -> MutexGuard<'_, Option<ContextKey>> {
        self.subscribed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> InstanceSettings {
        self.settings_guard().clone()
    }

    pub fn context(&self) -> ContextKey {
        self.settings_guard().context()
    }

    /// Swap in new settings, returning the previous ones.
    pub fn replace_settings(&self, settings: InstanceSettings) -> InstanceSettings {
        std::mem::replace(&mut *self.settings_guard(), settings)
    }

    /// Daemon known to be unreachable by the health monitor.
    pub fn is_down(&self) -> bool {
        self.engine.health().state(&self.context()) == Some(false)
    }

    /// Ask the daemon directly (through the ping cache) before acting.
    pub async fn ping(&self) -> bool {
        self.engine.ping_cache().cached_ping(&self.context()).await
    }

    pub fn render_key_down(&self) {
        self.surface.set_state(ERROR_STATE);
        self.surface.set_title(DOCKER_DOWN_TITLE);
    }

    pub fn render_dial_down(&self) {
        self.surface
            .set_feedback(ICON_ERROR, Some(DIAL_DOCKER_DOWN_TITLE));
    }

    /// Answer a property inspector list, preferring store snapshots over
    /// fresh CLI calls.
    pub async fn answer_list(&self, request: ListKind, pending: Option<InstanceSettings>) {
        let settings = match pending {
            Some(pending) => self.settings().merged_with(&pending),
            None => self.settings(),
        };
        let context = settings.context();
        let docker = self.engine.docker();

        let names: Vec<String> = match request {
            ListKind::GetContainers => match self.engine.containers().snapshot(&context) {
                Some(snapshot) => snapshot.keys().cloned().collect(),
                None => docker
                    .list_containers(&context, true, &[])
                    .await
                    .map(|records| records.into_iter().map(|r| r.name).collect())
                    .unwrap_or_else(|e| {
                        warn!(instance = %self.id, error = %e, "Listing containers failed");
                        Vec::new()
                    }),
            },
            ListKind::GetImages => docker.list_images(&context).await.unwrap_or_else(|e| {
                warn!(instance = %self.id, error = %e, "Listing images failed");
                Vec::new()
            }),
            ListKind::GetStacks => docker.list_projects(&context).await.unwrap_or_else(|e| {
                warn!(instance = %self.id, error = %e, "Listing stacks failed");
                Vec::new()
            }),
            ListKind::GetDockerContexts => match self.engine.contexts().snapshot() {
                Some(snapshot) => snapshot.keys().cloned().collect(),
                None => docker
                    .list_contexts()
                    .await
                    .into_iter()
                    .map(|c| c.name)
                    .collect(),
            },
        };

        debug!(instance = %self.id, ?request, items = names.len(), "Answering list request");
        self.surface
            .push_list(request, names.into_iter().map(ListItem::named).collect());
    }
}

/// A controller that can redraw itself from the current snapshots.
pub(crate) trait View: Send + Sync + 'static {
    fn instance(&self) -> &Instance;

    fn render(&self);

    fn render_down(&self) {
        self.instance().render_key_down();
    }
}

/// Subscribe `view` to `sources` under its instance id for its current
/// context. Callbacks hold a weak reference, so a dropped controller simply
/// stops reacting.
pub(crate) fn watch<V: View>(view: &Arc<V>, sources: &[Source]) {
    let instance = view.instance();
    let context = instance.context();
    let engine = instance.engine();
    let id = instance.id().to_string();

    for source in sources {
        let weak: Weak<V> = Arc::downgrade(view);
        match source {
            Source::Health => engine.health().subscribe(
                &context,
                id.clone(),
                Arc::new(move |up: &bool| {
                    if let Some(view) = weak.upgrade() {
                        if *up {
                            view.render();
                        } else {
                            view.render_down();
                        }
                    }
                }),
            ),
            Source::Containers => engine.containers().subscribe(
                &context,
                id.clone(),
                Arc::new(move |_: &Arc<ContainerSnapshot>| {
                    if let Some(view) = weak.upgrade() {
                        view.render();
                    }
                }),
            ),
            Source::Stacks => engine.stacks().subscribe(
                &context,
                id.clone(),
                Arc::new(move |_: &Arc<StackSnapshot>| {
                    if let Some(view) = weak.upgrade() {
                        view.render();
                    }
                }),
            ),
        }
    }

    *instance.subscribed() = Some(context);
}

/// Drop every subscription [`watch`] registered.
pub(crate) fn unwatch<V: View>(view: &V, sources: &[Source]) {
    let instance = view.instance();
    let Some(context) = instance.subscribed().take() else {
        return;
    };
    let engine = instance.engine();
    for source in sources {
        match source {
            Source::Health => engine.health().unsubscribe(&context, instance.id()),
            Source::Containers => engine.containers().unsubscribe(&context, instance.id()),
            Source::Stacks => engine.stacks().unsubscribe(&context, instance.id()),
        };
    }
}

/// Apply new settings; resubscribe when they point at another context.
pub(crate) fn apply_settings<V: View>(view: &Arc<V>, sources: &[Source], settings: InstanceSettings) {
    let instance = view.instance();
    let previous = instance.replace_settings(settings);
    if previous.context() != instance.context() {
        debug!(instance = %instance.id(), from = %previous.context(), to = %instance.context(), "Context changed");
        unwatch(view.as_ref(), sources);
        watch(view, sources);
    }
    if instance.is_down() {
        view.render_down();
    } else {
        view.render();
    }
}
