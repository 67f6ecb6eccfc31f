//! Controllers turning host events into Docker actions and key renders.
//!
//! A [`Dispatcher`] owns one controller per visible key or dial. Controllers
//! subscribe to the shared stores of a [`dockdeck_core::Engine`] and redraw
//! through a [`Surface`], which in the bridge binary becomes a stream of
//! [`HostCommand`]s.
//!
//! ```no_run
//! use dockdeck_actions::{Dispatcher, HostEvent};
//! use dockdeck_core::{Config, Engine};
//!
//! # async fn run() {
//! let engine = Engine::new(Config::default());
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut dispatcher = Dispatcher::with_channel(engine, tx);
//!
//! let line = r#"{"event":"willAppear","instance":"k1","action":"container-toggle","settings":{"containerName":"web"}}"#;
//! let event: HostEvent = serde_json::from_str(line).unwrap();
//! dispatcher.handle(event).await;
//!
//! while let Some(command) = rx.recv().await {
//!     println!("{}", serde_json::to_string(&command).unwrap());
//! }
//! # }
//! ```

pub mod controllers;
pub mod dispatcher;
pub mod protocol;
pub mod settings;
pub mod surface;

pub use controllers::Action;
pub use dispatcher::{Dispatcher, SurfaceFactory};
pub use protocol::{ActionKind, HostCommand, HostEvent, ListItem, ListKind};
pub use settings::InstanceSettings;
pub use surface::{ChannelSurface, Surface};
