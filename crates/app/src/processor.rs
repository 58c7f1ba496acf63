//! Command processor: the single serialization point for wire commands.
//!
//! [`CommandProcessor::enqueue`] resolves a command against the bound
//! [`SystemRegistry`], asks the owning device's adapter to build it and
//! queues the result. [`CommandProcessor::process`] drains the queue with
//! exactly one worker, so no two [`CommandFunc`]s ever run concurrently.
//!
//! Resolution and build failures are returned to the caller and nothing is
//! queued for that command. Execution failures are only logged.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;

use homewire_domain::command::Command;
use homewire_domain::error::{HubError, NotFoundError};
use homewire_domain::id::DeviceId;

use crate::ports::{CommandFunc, SystemRegistry};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Nested `SceneSet` expansion deeper than this fails with
/// [`HubError::SceneTooDeep`].
pub const MAX_SCENE_DEPTH: usize = 8;

/// Bounded FIFO of [`CommandFunc`]s with a single executor.
///
/// When the queue is full, `enqueue` waits for room; it never drops a
/// command.
pub struct CommandProcessor {
    sender: mpsc::Sender<CommandFunc>,
    receiver: Mutex<Option<mpsc::Receiver<CommandFunc>>>,
    system: RwLock<Option<Arc<dyn SystemRegistry>>>,
}

impl CommandProcessor {
    /// Create a processor whose queue holds at most `capacity` commands.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            system: RwLock::new(None),
        }
    }

    /// Bind (or rebind) the live registry.
    pub fn set_system(&self, system: Arc<dyn SystemRegistry>) {
        *self.system.write().unwrap_or_else(PoisonError::into_inner) = Some(system);
    }

    /// Number of commands queued and not yet picked up by the worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn registry(&self) -> Result<Arc<dyn SystemRegistry>, HubError> {
        self.system
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HubError::CannotProcess)
    }

    /// Resolve, build and queue `command`.
    ///
    /// A `SceneSet` expands into its commands in declared order. If one of
    /// them fails, the ones before it stay queued and the rest are skipped.
    ///
    /// # Errors
    ///
    /// - [`HubError::CannotProcess`] if no registry is bound
    /// - [`HubError::NotFound`] for an unknown zone, scene or button ID
    /// - [`HubError::UnsupportedCommand`] if the owning adapter rejects it
    /// - [`HubError::SceneTooDeep`] if scenes nest past [`MAX_SCENE_DEPTH`]
    /// - [`HubError::QueueClosed`] if the worker is gone
    #[tracing::instrument(skip(self, command), fields(command = %command))]
    pub async fn enqueue(&self, command: Command) -> Result<(), HubError> {
        let registry = self.registry()?;
        let mut stack = vec![(command, 0_usize)];

        while let Some((command, depth)) = stack.pop() {
            if let Command::SceneSet { scene_id } = &command {
                let scene = registry
                    .resolve_scene(scene_id)
                    .ok_or_else(|| NotFoundError::new("scene", scene_id))?;
                if depth >= MAX_SCENE_DEPTH {
                    return Err(HubError::SceneTooDeep {
                        scene_id: scene_id.to_string(),
                        limit: MAX_SCENE_DEPTH,
                    });
                }
                tracing::debug!(scene = %scene.name, commands = scene.commands.len(), "expanding scene");
                stack.extend(
                    scene
                        .commands
                        .iter()
                        .rev()
                        .map(|inner| (inner.clone(), depth + 1)),
                );
                continue;
            }

            let func = build(registry.as_ref(), &command)?;
            tracing::debug!(label = func.label(), "queueing command");
            self.sender
                .send(func)
                .await
                .map_err(|_| HubError::QueueClosed)?;
        }
        Ok(())
    }

    /// Drain the queue until every sender is gone.
    ///
    /// Only the first caller gets the queue; later calls log and return
    /// immediately, which keeps execution on a single worker.
    pub async fn process(&self) {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            tracing::warn!("command processor already running");
            return;
        };

        tracing::info!("command processor started");
        while let Some(func) = receiver.recv().await {
            let label = func.label().to_string();
            match func.execute().await {
                Ok(()) => tracing::debug!(command = %label, "command executed"),
                Err(err) => tracing::warn!(command = %label, error = %err, "command failed"),
            }
        }
        tracing::info!("command processor stopped");
    }
}

/// Canonicalise `command` from the registry and hand it to the owning adapter.
fn build(registry: &dyn SystemRegistry, command: &Command) -> Result<CommandFunc, HubError> {
    let (device_id, canonical) = match command {
        Command::ZoneSetLevel { zone_id, level, .. } => {
            let zone = registry
                .resolve_zone(zone_id)
                .ok_or_else(|| NotFoundError::new("zone", zone_id))?;
            (zone.device_id.clone(), Command::set_zone(zone, *level))
        }
        Command::ButtonPress { button_id, .. } | Command::ButtonRelease { button_id, .. } => {
            let button = registry
                .resolve_button(button_id)
                .ok_or_else(|| NotFoundError::new("button", button_id))?;
            let device = registry
                .resolve_device(&button.device_id)
                .ok_or_else(|| NotFoundError::new("device", &button.device_id))?;
            let canonical = if matches!(command, Command::ButtonPress { .. }) {
                Command::press(device, button)
            } else {
                Command::release(device, button)
            };
            (button.device_id.clone(), canonical)
        }
        Command::SceneSet { .. } => return Err(HubError::CannotProcess),
    };

    adapter_for(registry, &device_id)?.build_command(&canonical)
}

fn adapter_for(
    registry: &dyn SystemRegistry,
    device_id: &DeviceId,
) -> Result<Arc<dyn crate::ports::DeviceAdapter>, HubError> {
    registry
        .adapter(device_id)
        .ok_or_else(|| NotFoundError::new("device", device_id).into())
}
