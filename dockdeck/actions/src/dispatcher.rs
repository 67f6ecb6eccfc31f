use std::{collections::HashMap, future::Future, sync::Arc};

use dockdeck_core::Engine;
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet};
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::{
    controllers::{
        Action, ContainerToggle, ContainersCount, Instance, RunOrRemove, SelectToggle,
        StackToggle,
    },
    protocol::{ActionKind, HostCommand, HostEvent},
    settings::InstanceSettings,
    surface::{ChannelSurface, Surface},
};

/// Builds the surface a new instance renders to.
pub type SurfaceFactory = Arc<dyn Fn(&str) -> Arc<dyn Surface> + Send + Sync>;

/// Routes host events to the controller owning the instance.
///
/// Lifecycle events (appear, disappear, settings) are handled in order before
/// the next event is read. Key presses, dial presses and list requests run on
/// their own tasks so a slow docker command never holds up other keys.
pub struct Dispatcher {
    engine: Engine,
    surfaces: SurfaceFactory,
    actions: HashMap<String, Arc<dyn Action>>,
    inputs: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(engine: Engine, surfaces: SurfaceFactory) -> Self {
        Self {
            engine,
            surfaces,
            actions: HashMap::new(),
            inputs: JoinSet::new(),
        }
    }

    /// Dispatcher whose controllers emit [`HostCommand`]s on `tx`.
    pub fn with_channel(engine: Engine, tx: UnboundedSender<HostCommand>) -> Self {
        Self::new(
            engine,
            Arc::new(move |instance: &str| -> Arc<dyn Surface> {
                Arc::new(ChannelSurface::new(instance, tx.clone()))
            }),
        )
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn contains(&self, instance: &str) -> bool {
        self.actions.contains_key(instance)
    }

    /// Input handlers still running.
    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    fn build(&self, instance: &str, kind: ActionKind, settings: InstanceSettings) -> Arc<dyn Action> {
        let instance = Instance::new(
            instance,
            self.engine.clone(),
            (self.surfaces)(instance),
            settings,
        );
        match kind {
            ActionKind::ContainerToggle => Arc::new(ContainerToggle::new(instance)),
            ActionKind::StackToggle => Arc::new(StackToggle::new(instance)),
            ActionKind::RunOrRemove => Arc::new(RunOrRemove::new(instance)),
            ActionKind::ContainersCount => Arc::new(ContainersCount::new(instance)),
            ActionKind::SelectToggle => Arc::new(SelectToggle::new(instance)),
        }
    }

    #[instrument(skip_all, fields(instance = %event.instance()))]
    pub async fn handle(&mut self, event: HostEvent) {
        while let Some(result) = self.inputs.try_join_next() {
            report(result);
        }

        match event {
            HostEvent::WillAppear {
                instance,
                action,
                settings,
            } => {
                if let Some(previous) = self.actions.remove(&instance) {
                    debug!("Instance reappeared, replacing controller");
                    previous.disappear().await;
                }
                info!(?action, "Instance appeared");
                let controller = self.build(&instance, action, settings);
                controller.appear().await;
                self.actions.insert(instance, controller);
            }
            HostEvent::WillDisappear { instance } => match self.actions.remove(&instance) {
                Some(controller) => {
                    info!("Instance disappeared");
                    controller.disappear().await;
                }
                None => debug!("Unknown instance disappeared"),
            },
            HostEvent::DidReceiveSettings { instance, settings } => {
                if let Some(controller) = self.lookup(&instance) {
                    controller.settings_changed(settings).await;
                }
            }
            HostEvent::KeyDown { instance } => {
                if let Some(controller) = self.lookup(&instance) {
                    self.spawn_input(async move { controller.key_down().await });
                }
            }
            HostEvent::DialRotate { instance, ticks } => {
                if let Some(controller) = self.lookup(&instance) {
                    controller.dial_rotate(ticks).await;
                }
            }
            HostEvent::DialDown { instance } => {
                if let Some(controller) = self.lookup(&instance) {
                    self.spawn_input(async move { controller.dial_down().await });
                }
            }
            HostEvent::SendToPlugin {
                instance,
                request,
                settings,
            } => {
                if let Some(controller) = self.lookup(&instance) {
                    self.spawn_input(async move {
                        controller.list_request(request, settings).await
                    });
                }
            }
        }
    }

    fn lookup(&self, instance: &str) -> Option<Arc<dyn Action>> {
        let controller = self.actions.get(instance).cloned();
        if controller.is_none() {
            debug!("Event for unknown instance");
        }
        controller
    }

    fn spawn_input(&mut self, input: impl Future<Output = ()> + Send + 'static) {
        self.inputs.spawn(input.instrument(Span::current()));
    }

    /// Wait for every running input handler to finish.
    pub async fn finish_inputs(&mut self) {
        while let Some(result) = self.inputs.join_next().await {
            report(result);
        }
    }

    /// Cancel input handlers that are still running.
    pub fn abort_inputs(&mut self) {
        self.inputs.abort_all();
    }

    /// Drop every controller and its store subscriptions.
    pub async fn clear(&mut self) {
        for (_, controller) in self.actions.drain() {
            controller.disappear().await;
        }
    }
}

fn report(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "Input handler panicked");
        }
    }
}
