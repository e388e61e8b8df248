//! Plugin composition and event dispatch for service workers.
//!
//! Plugins are small named bundles of optional event handlers. At
//! [`initialize`] time they are merged into one ordered handler list per
//! event kind, and the [`Dispatcher`] runs those lists with a fixed
//! concurrency contract per kind:
//!
//! - `fetch`: sequential, first response wins, network fallback.
//! - `install`/`activate`/`sync`/`periodicsync`/`backgroundfetch*`:
//!   concurrent, wait for every handler.
//! - `message`: sequential and synchronous.
//! - `push`: sequential, then one notification side effect.
//! - global error channels: straight to the user's error callback.
//!
//! A failing plugin never stops its siblings and never surfaces to the
//! host; errors are classified and routed to the optional `on_error`
//! callback.

pub mod api;
pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod init;
pub mod options;
pub mod registry;

pub use api::{
    FetchHandler, Handlers, LifecycleHandler, MessageHandler, Plugin, PushHandler, PushOutcome,
};
pub use context::{Logger, PluginContext, TracingLogger, in_engine_fetch};
pub use dispatch::Dispatcher;
pub use errors::{DispatchError, ErrorKind};
pub use init::{InitGuard, initialize, initialize_with};
pub use options::{ErrorCallback, WorkerOptions};
pub use registry::HandlerTable;
