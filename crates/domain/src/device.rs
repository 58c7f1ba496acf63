//! Device: a physical unit reachable over one wire protocol.
//!
//! A device owns the [`Zone`]s, [`Sensor`]s and [`Button`]s it exposes.
//! Each of them is keyed by the *local* identifier the device uses on the
//! wire, which is unrelated to its system-wide global identifier. The
//! lookup tables are built once by [`DeviceBuilder::build`] and never
//! change afterwards.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::{ButtonId, DeviceId, SensorId, ZoneId};

/// Wire protocol spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Line-oriented telnet control protocol (`#OUTPUT,…` / `~DEVICE,…` frames).
    Telnet,
    /// UPnP push device reporting a switch and a sensor through attribute lists.
    UpnpMaker,
    /// UPnP push device reporting its switch through `BinaryState`.
    UpnpInsight,
}

impl Protocol {
    /// Adapter family name used in logs and errors.
    #[must_use]
    pub fn family(self) -> &'static str {
        match self {
            Self::Telnet => "telnet",
            Self::UpnpMaker | Self::UpnpInsight => "upnp",
        }
    }
}

/// An addressable, continuously-valued control point (e.g. a dimmer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub local_id: String,
    pub name: String,
    pub device_id: DeviceId,
}

/// A momentary control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub id: ButtonId,
    pub local_id: String,
    pub name: String,
    pub device_id: DeviceId,
}

/// A read-only attribute source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub local_id: String,
    pub name: String,
    pub device_id: DeviceId,
    pub attr: SensorAttr,
}

/// Data type of a [`SensorAttr`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorDataType {
    Int,
    Float,
    Bool,
    #[default]
    String,
}

/// Current value of a sensor, string-encoded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorAttr {
    pub name: String,
    pub value: String,
    pub data_type: SensorDataType,
    /// Optional human-readable labels for enumerated values (`"0" → "closed"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<BTreeMap<String, String>>,
}

impl SensorAttr {
    /// Copy of this attribute carrying a new value.
    #[must_use]
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }
}

/// A controllable unit and the components it owns.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: DeviceId,
    /// Identifier of this device on its own wire protocol.
    pub local_id: String,
    pub name: String,
    pub address: String,
    pub protocol: Protocol,
    zones: HashMap<String, Zone>,
    sensors: HashMap<String, Sensor>,
    buttons: HashMap<String, Button>,
    /// Local → global lookup for devices this one reports on (itself included).
    devices: HashMap<String, DeviceId>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Zone with the given local ID.
    #[must_use]
    pub fn zone(&self, local_id: &str) -> Option<&Zone> {
        self.zones.get(local_id)
    }

    /// Sensor with the given local ID.
    #[must_use]
    pub fn sensor(&self, local_id: &str) -> Option<&Sensor> {
        self.sensors.get(local_id)
    }

    /// Button with the given local ID.
    #[must_use]
    pub fn button(&self, local_id: &str) -> Option<&Button> {
        self.buttons.get(local_id)
    }

    /// Global ID of the device known locally as `local_id`.
    #[must_use]
    pub fn device(&self, local_id: &str) -> Option<&DeviceId> {
        self.devices.get(local_id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.buttons.values()
    }

    /// Global IDs of every device this one reports on, itself included.
    pub fn bridged(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.values()
    }

    /// The subset of `ids` that belongs to this device.
    #[must_use]
    pub fn owned_zones(&self, ids: &[ZoneId]) -> Vec<&Zone> {
        self.zones
            .values()
            .filter(|zone| ids.contains(&zone.id))
            .collect()
    }

    /// The subset of `ids` that belongs to this device.
    #[must_use]
    pub fn owned_sensors(&self, ids: &[SensorId]) -> Vec<&Sensor> {
        self.sensors
            .values()
            .filter(|sensor| ids.contains(&sensor.id))
            .collect()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the name, global ID or local ID
    /// is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId("device").into());
        }
        if self.local_id.is_empty() {
            return Err(ValidationError::EmptyId("local device").into());
        }
        Ok(())
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    local_id: Option<String>,
    name: Option<String>,
    address: Option<String>,
    protocol: Protocol,
    zones: Vec<(String, ZoneId, String)>,
    sensors: Vec<(String, SensorId, String, SensorAttr)>,
    buttons: Vec<(String, ButtonId, String)>,
    bridges: Vec<(String, DeviceId)>,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self {
            id: None,
            local_id: None,
            name: None,
            address: None,
            protocol: Protocol::Telnet,
            zones: Vec::new(),
            sensors: Vec::new(),
            buttons: Vec::new(),
            bridges: Vec::new(),
        }
    }
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn zone(
        mut self,
        local_id: impl Into<String>,
        id: impl Into<ZoneId>,
        name: impl Into<String>,
    ) -> Self {
        self.zones.push((local_id.into(), id.into(), name.into()));
        self
    }

    #[must_use]
    pub fn sensor(
        mut self,
        local_id: impl Into<String>,
        id: impl Into<SensorId>,
        name: impl Into<String>,
        attr: SensorAttr,
    ) -> Self {
        self.sensors
            .push((local_id.into(), id.into(), name.into(), attr));
        self
    }

    #[must_use]
    pub fn button(
        mut self,
        local_id: impl Into<String>,
        id: impl Into<ButtonId>,
        name: impl Into<String>,
    ) -> Self {
        self.buttons.push((local_id.into(), id.into(), name.into()));
        self
    }

    /// Declare another device whose frames this device relays, known on
    /// this device's wire as `local_id`.
    #[must_use]
    pub fn bridge(mut self, local_id: impl Into<String>, id: impl Into<DeviceId>) -> Self {
        self.bridges.push((local_id.into(), id.into()));
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if a name or identifier is missing,
    /// or if two components of the same kind share a local ID.
    pub fn build(self) -> Result<Device, HubError> {
        let id = self.id.unwrap_or_else(|| DeviceId::new(""));
        let local_id = self.local_id.unwrap_or_default();
        let name = self.name.unwrap_or_default();

        let mut zones = HashMap::with_capacity(self.zones.len());
        for (local, zone_id, zone_name) in self.zones {
            check_component("zone", &local, zone_id.as_str(), &zone_name)?;
            let zone = Zone {
                id: zone_id,
                local_id: local.clone(),
                name: zone_name,
                device_id: id.clone(),
            };
            if zones.insert(local.clone(), zone).is_some() {
                return Err(duplicate_local("zone", local, &name));
            }
        }

        let mut sensors = HashMap::with_capacity(self.sensors.len());
        for (local, sensor_id, sensor_name, attr) in self.sensors {
            check_component("sensor", &local, sensor_id.as_str(), &sensor_name)?;
            let sensor = Sensor {
                id: sensor_id,
                local_id: local.clone(),
                name: sensor_name,
                device_id: id.clone(),
                attr,
            };
            if sensors.insert(local.clone(), sensor).is_some() {
                return Err(duplicate_local("sensor", local, &name));
            }
        }

        let mut buttons = HashMap::with_capacity(self.buttons.len());
        for (local, button_id, button_name) in self.buttons {
            check_component("button", &local, button_id.as_str(), &button_name)?;
            let button = Button {
                id: button_id,
                local_id: local.clone(),
                name: button_name,
                device_id: id.clone(),
            };
            if buttons.insert(local.clone(), button).is_some() {
                return Err(duplicate_local("button", local, &name));
            }
        }

        let mut devices = HashMap::with_capacity(self.bridges.len() + 1);
        devices.insert(local_id.clone(), id.clone());
        for (local, device_id) in self.bridges {
            if devices.insert(local.clone(), device_id).is_some() {
                return Err(duplicate_local("device", local, &name));
            }
        }

        let device = Device {
            id,
            local_id,
            name,
            address: self.address.unwrap_or_default(),
            protocol: self.protocol,
            zones,
            sensors,
            buttons,
            devices,
        };
        device.validate()?;
        Ok(device)
    }
}

fn check_component(
    kind: &'static str,
    local_id: &str,
    global_id: &str,
    name: &str,
) -> Result<(), HubError> {
    if local_id.is_empty() {
        return Err(ValidationError::EmptyId("local").into());
    }
    if global_id.is_empty() {
        return Err(ValidationError::EmptyId(kind).into());
    }
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(())
}

fn duplicate_local(kind: &'static str, local_id: String, device: &str) -> HubError {
    ValidationError::DuplicateLocalId {
        kind,
        local_id,
        device: device.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeater() -> Device {
        Device::builder()
            .id("repeater")
            .local_id("1")
            .name("Main Repeater")
            .address("192.168.0.10:23")
            .zone("12", "kitchen", "Kitchen")
            .button("2", "scene-btn", "Scene 1")
            .bridge("5", "keypad")
            .build()
            .unwrap()
    }

    #[test]
    fn should_lookup_components_by_local_id() {
        let device = repeater();
        assert_eq!(device.zone("12").unwrap().id, ZoneId::new("kitchen"));
        assert_eq!(device.button("2").unwrap().name, "Scene 1");
        assert!(device.zone("13").is_none());
    }

    #[test]
    fn should_stamp_owning_device_on_components() {
        let device = repeater();
        assert_eq!(device.zone("12").unwrap().device_id, device.id);
        assert_eq!(device.button("2").unwrap().device_id, device.id);
    }

    #[test]
    fn should_include_itself_in_device_table() {
        let device = repeater();
        assert_eq!(device.device("1"), Some(&DeviceId::new("repeater")));
        assert_eq!(device.device("5"), Some(&DeviceId::new("keypad")));
        assert_eq!(device.bridged().count(), 2);
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Device::builder().id("d").local_id("1").build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_duplicate_local_zone_ids() {
        let result = Device::builder()
            .id("d")
            .local_id("1")
            .name("Dimmers")
            .zone("1", "a", "A")
            .zone("1", "b", "B")
            .build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::DuplicateLocalId { kind: "zone", .. }))
        ));
    }

    #[test]
    fn should_filter_owned_zones() {
        let device = repeater();
        let owned = device.owned_zones(&[ZoneId::new("kitchen"), ZoneId::new("garage")]);
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].local_id, "12");
    }

    #[test]
    fn should_copy_sensor_attr_with_new_value() {
        let attr = SensorAttr {
            name: "sensor".to_string(),
            value: "0".to_string(),
            data_type: SensorDataType::Int,
            states: None,
        };
        let updated = attr.with_value("1");
        assert_eq!(updated.value, "1");
        assert_eq!(updated.data_type, SensorDataType::Int);
    }

    #[test]
    fn should_map_protocols_to_families() {
        assert_eq!(Protocol::Telnet.family(), "telnet");
        assert_eq!(Protocol::UpnpInsight.family(), "upnp");
    }
}
