//! Event: something that happened or is being asked for.
//!
//! `*Changed` variants are notifications about device state. `*Report`
//! variants are requests: whoever owns the referenced zones or sensors
//! should poll them and answer with `*Changed` notifications.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::device::SensorAttr;
use crate::id::{DeviceId, SensorId, ZoneId};

/// A closed set of events flowing over the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ZoneLevelChanged {
        zone_id: ZoneId,
        zone_name: String,
        level: f32,
    },
    SensorAttrChanged {
        sensor_id: SensorId,
        sensor_name: String,
        attr: SensorAttr,
    },
    /// Request: report the current level of these zones.
    ZonesReport { zone_ids: Vec<ZoneId> },
    /// Request: report the current value of these sensors.
    SensorsReport { sensor_ids: Vec<SensorId> },
    /// A command seen on a device's wire, e.g. a keypad press or a level
    /// change made at the wall.
    CommandObserved {
        device_id: DeviceId,
        command: Command,
        /// The raw frame, CRLF stripped.
        raw: String,
    },
}

impl Event {
    /// Short tag naming the variant, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ZoneLevelChanged { .. } => "zone_level_changed",
            Self::SensorAttrChanged { .. } => "sensor_attr_changed",
            Self::ZonesReport { .. } => "zones_report",
            Self::SensorsReport { .. } => "sensors_report",
            Self::CommandObserved { .. } => "command_observed",
        }
    }
}
