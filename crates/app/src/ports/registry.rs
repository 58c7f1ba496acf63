//! System registry port: resolves global IDs against live system state.

use std::sync::Arc;

use homewire_domain::device::{Button, Device, Sensor, Zone};
use homewire_domain::id::{ButtonId, DeviceId, SceneId, SensorId, ZoneId};
use homewire_domain::scene::Scene;

use super::adapter::DeviceAdapter;

/// Read-only view over configured devices, scenes and their adapters.
///
/// The command processor consults a registry, it never owns one; it is
/// handed in through [`CommandProcessor::set_system`](crate::processor::CommandProcessor::set_system).
pub trait SystemRegistry: Send + Sync {
    fn resolve_zone(&self, id: &ZoneId) -> Option<&Zone>;

    fn resolve_scene(&self, id: &SceneId) -> Option<&Scene>;

    fn resolve_button(&self, id: &ButtonId) -> Option<&Button>;

    fn resolve_sensor(&self, id: &SensorId) -> Option<&Sensor>;

    fn resolve_device(&self, id: &DeviceId) -> Option<&Device>;

    /// Adapter that owns the wire connection of device `id`.
    fn adapter(&self, id: &DeviceId) -> Option<Arc<dyn DeviceAdapter>>;
}
