//! The live system: configured devices, their adapters, and scenes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use homewire_domain::command::Command;
use homewire_domain::device::{Button, Device, Sensor, Zone};
use homewire_domain::error::{HubError, ValidationError};
use homewire_domain::id::{ButtonId, DeviceId, SceneId, SensorId, ZoneId};
use homewire_domain::scene::Scene;

use crate::ports::{DeviceAdapter, SystemRegistry};

/// Immutable index over every configured device, zone, sensor, button and
/// scene, keyed by global ID.
///
/// Built once at startup and replaced wholesale on reload.
pub struct System {
    devices: HashMap<DeviceId, Arc<Device>>,
    adapters: HashMap<DeviceId, Arc<dyn DeviceAdapter>>,
    zones: HashMap<ZoneId, Zone>,
    sensors: HashMap<SensorId, Sensor>,
    buttons: HashMap<ButtonId, Button>,
    scenes: HashMap<SceneId, Scene>,
}

impl System {
    #[must_use]
    pub fn builder() -> SystemBuilder {
        SystemBuilder::default()
    }

    /// Shared handle on a configured device.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id).cloned()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    /// Global IDs of every zone, sorted.
    #[must_use]
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut ids: Vec<_> = self.zones.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Global IDs of every sensor, sorted.
    #[must_use]
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        let mut ids: Vec<_> = self.sensors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("devices", &self.devices.len())
            .field("zones", &self.zones.len())
            .field("sensors", &self.sensors.len())
            .field("buttons", &self.buttons.len())
            .field("scenes", &self.scenes.len())
            .finish()
    }
}

impl SystemRegistry for System {
    fn resolve_zone(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    fn resolve_scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    fn resolve_button(&self, id: &ButtonId) -> Option<&Button> {
        self.buttons.get(id)
    }

    fn resolve_sensor(&self, id: &SensorId) -> Option<&Sensor> {
        self.sensors.get(id)
    }

    fn resolve_device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id).map(AsRef::as_ref)
    }

    fn adapter(&self, id: &DeviceId) -> Option<Arc<dyn DeviceAdapter>> {
        self.adapters.get(id).cloned()
    }
}

/// Collects devices and scenes, then checks cross-references in [`build`](Self::build).
#[derive(Default)]
pub struct SystemBuilder {
    devices: Vec<(Arc<Device>, Arc<dyn DeviceAdapter>)>,
    scenes: Vec<Scene>,
}

impl SystemBuilder {
    /// Register a device together with the adapter that drives it.
    #[must_use]
    pub fn device(mut self, device: Arc<Device>, adapter: Arc<dyn DeviceAdapter>) -> Self {
        self.devices.push((device, adapter));
        self
    }

    #[must_use]
    pub fn scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    /// Index everything and validate global uniqueness and scene references.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] on a duplicate global ID or a scene
    /// command pointing at an unknown zone, button or scene.
    pub fn build(self) -> Result<System, HubError> {
        let mut system = System {
            devices: HashMap::new(),
            adapters: HashMap::new(),
            zones: HashMap::new(),
            sensors: HashMap::new(),
            buttons: HashMap::new(),
            scenes: HashMap::new(),
        };

        for (device, adapter) in self.devices {
            for zone in device.zones() {
                insert_unique(&mut system.zones, "zone", zone.id.clone(), zone.clone())?;
            }
            for sensor in device.sensors() {
                insert_unique(&mut system.sensors, "sensor", sensor.id.clone(), sensor.clone())?;
            }
            for button in device.buttons() {
                insert_unique(&mut system.buttons, "button", button.id.clone(), button.clone())?;
            }
            system.adapters.insert(device.id.clone(), adapter);
            insert_unique(&mut system.devices, "device", device.id.clone(), device)?;
        }

        for scene in self.scenes {
            insert_unique(&mut system.scenes, "scene", scene.id.clone(), scene)?;
        }

        for scene in system.scenes.values() {
            for command in &scene.commands {
                let (kind, known, id) = match command {
                    Command::ZoneSetLevel { zone_id, .. } => {
                        ("zone", system.zones.contains_key(zone_id), zone_id.to_string())
                    }
                    Command::ButtonPress { button_id, .. }
                    | Command::ButtonRelease { button_id, .. } => (
                        "button",
                        system.buttons.contains_key(button_id),
                        button_id.to_string(),
                    ),
                    Command::SceneSet { scene_id } => (
                        "scene",
                        system.scenes.contains_key(scene_id),
                        scene_id.to_string(),
                    ),
                };
                if !known {
                    return Err(ValidationError::DanglingReference {
                        scene: scene.id.to_string(),
                        kind,
                        id,
                    }
                    .into());
                }
            }
        }

        Ok(system)
    }
}

fn insert_unique<K, V>(
    map: &mut HashMap<K, V>,
    kind: &'static str,
    key: K,
    value: V,
) -> Result<(), HubError>
where
    K: std::hash::Hash + Eq + fmt::Display,
{
    if map.contains_key(&key) {
        return Err(ValidationError::DuplicateId {
            kind,
            id: key.to_string(),
        }
        .into());
    }
    map.insert(key, value);
    Ok(())
}
