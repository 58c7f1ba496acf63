//! Device adapter ports: the capability set each device family implements.
//!
//! A family (telnet line protocol, UPnP push, ...) provides:
//! 1. [`DeviceAdapter`] so the command processor can build wire commands
//! 2. [`EventProducer`] when the device pushes or streams state changes
//! 3. [`EventConsumer`] when the device answers report requests by polling
//!
//! New families add an implementation; the command processor never changes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::{broadcast, mpsc, watch};

use homewire_domain::command::Command;
use homewire_domain::error::HubError;
use homewire_domain::event::Event;

/// The deferred wire-level side effect of a [`CommandFunc`].
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<(), HubError>> + Send>>;

/// An executable unit produced by a [`DeviceAdapter`] from a [`Command`].
///
/// Nothing happens until [`execute`](Self::execute) is awaited. A
/// `CommandFunc` runs at most once and is never retried.
pub struct CommandFunc {
    label: String,
    future: CommandFuture,
}

impl CommandFunc {
    /// Wrap a lazy future; `label` identifies the command in logs.
    pub fn new<F>(label: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<(), HubError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            future: Box::pin(future),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Perform the wire-level side effect.
    ///
    /// # Errors
    ///
    /// Returns whatever transport error the adapter reports.
    pub async fn execute(self) -> Result<(), HubError> {
        self.future.await
    }
}

impl fmt::Debug for CommandFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFunc")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Translates domain commands into wire commands for one device.
pub trait DeviceAdapter: Send + Sync {
    /// Device family name, e.g. `"telnet"`.
    fn family(&self) -> &'static str;

    /// Build the wire-level action for `command`.
    ///
    /// Pure translation: no IO happens until the returned function runs.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnsupportedCommand`] when this family has no
    /// wire form for the command.
    fn build_command(&self, command: &Command) -> Result<CommandFunc, HubError>;
}

/// Channels handed out by [`EventProducer::start_producing`].
#[derive(Debug)]
pub struct ProducedEvents {
    /// Domain events and observed commands, in arrival order.
    pub events: mpsc::Receiver<Event>,
    /// Flips to `true` once the producer loop has exited.
    pub done: watch::Receiver<bool>,
}

/// Surfaces device-side changes as domain events.
pub trait EventProducer {
    fn producer_name(&self) -> &str;

    /// Spawn the background loop and return its output channels.
    ///
    /// # Errors
    ///
    /// Returns an error when the producer is already running or is not
    /// configured to produce.
    fn start_producing(&self) -> Result<ProducedEvents, HubError>;

    /// Cancel the loop and release what it holds. Best-effort.
    fn stop_producing(&self) -> impl Future<Output = ()> + Send;
}

/// Reacts to `*Report` requests published on the bus.
pub trait EventConsumer {
    fn consumer_name(&self) -> &str;

    /// Spawn a task reading `events` until stopped or the bus closes.
    fn start_consuming(&self, events: broadcast::Receiver<Event>);

    fn stop_consuming(&self);
}
