//! Command: a domain-level intent addressed to a zone, button or scene.
//!
//! Commands always carry the global ID of their target. Zone and button
//! commands also carry the local IDs the owning device needs on the wire;
//! callers that only know the global ID may leave those empty, the command
//! processor fills them in from the registry before handing the command to
//! an adapter.

use serde::{Deserialize, Serialize};

use crate::device::{Button, Device, Zone};
use crate::id::{ButtonId, SceneId, ZoneId};

/// A closed set of intents the hub can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Set a zone to a level (`0.0`–`1.0` or the device-native scale).
    ZoneSetLevel {
        zone_id: ZoneId,
        #[serde(default)]
        zone_local_id: String,
        level: f32,
    },
    ButtonPress {
        button_id: ButtonId,
        #[serde(default)]
        button_local_id: String,
        #[serde(default)]
        device_local_id: String,
    },
    ButtonRelease {
        button_id: ButtonId,
        #[serde(default)]
        button_local_id: String,
        #[serde(default)]
        device_local_id: String,
    },
    /// Run every command of a scene, in order.
    SceneSet { scene_id: SceneId },
}

impl Command {
    /// Set a zone by global ID only.
    #[must_use]
    pub fn zone_set_level(zone_id: impl Into<ZoneId>, level: f32) -> Self {
        Self::ZoneSetLevel {
            zone_id: zone_id.into(),
            zone_local_id: String::new(),
            level,
        }
    }

    /// Press a button by global ID only.
    #[must_use]
    pub fn button_press(button_id: impl Into<ButtonId>) -> Self {
        Self::ButtonPress {
            button_id: button_id.into(),
            button_local_id: String::new(),
            device_local_id: String::new(),
        }
    }

    /// Release a button by global ID only.
    #[must_use]
    pub fn button_release(button_id: impl Into<ButtonId>) -> Self {
        Self::ButtonRelease {
            button_id: button_id.into(),
            button_local_id: String::new(),
            device_local_id: String::new(),
        }
    }

    #[must_use]
    pub fn scene_set(scene_id: impl Into<SceneId>) -> Self {
        Self::SceneSet {
            scene_id: scene_id.into(),
        }
    }

    /// Fully-resolved level command for a known zone.
    #[must_use]
    pub fn set_zone(zone: &Zone, level: f32) -> Self {
        Self::ZoneSetLevel {
            zone_id: zone.id.clone(),
            zone_local_id: zone.local_id.clone(),
            level,
        }
    }

    /// Fully-resolved press command for a button of `device`.
    #[must_use]
    pub fn press(device: &Device, button: &Button) -> Self {
        Self::ButtonPress {
            button_id: button.id.clone(),
            button_local_id: button.local_id.clone(),
            device_local_id: device.local_id.clone(),
        }
    }

    /// Fully-resolved release command for a button of `device`.
    #[must_use]
    pub fn release(device: &Device, button: &Button) -> Self {
        Self::ButtonRelease {
            button_id: button.id.clone(),
            button_local_id: button.local_id.clone(),
            device_local_id: device.local_id.clone(),
        }
    }

    /// Short tag naming the variant, used in logs and errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ZoneSetLevel { .. } => "zone_set_level",
            Self::ButtonPress { .. } => "button_press",
            Self::ButtonRelease { .. } => "button_release",
            Self::SceneSet { .. } => "scene_set",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZoneSetLevel { zone_id, level, .. } => {
                write!(f, "zone_set_level({zone_id}, {level})")
            }
            Self::ButtonPress { button_id, .. } => write!(f, "button_press({button_id})"),
            Self::ButtonRelease { button_id, .. } => write!(f, "button_release({button_id})"),
            Self::SceneSet { scene_id } => write!(f, "scene_set({scene_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypad() -> Device {
        Device::builder()
            .id("keypad")
            .local_id("1")
            .name("Hall Keypad")
            .zone("12", "hall", "Hall")
            .button("2", "hall-btn", "Hall Button")
            .build()
            .unwrap()
    }

    #[test]
    fn should_fill_local_ids_when_built_from_components() {
        let device = keypad();
        let cmd = Command::press(&device, device.button("2").unwrap());
        assert_eq!(
            cmd,
            Command::ButtonPress {
                button_id: ButtonId::new("hall-btn"),
                button_local_id: "2".to_string(),
                device_local_id: "1".to_string(),
            }
        );

        let cmd = Command::set_zone(device.zone("12").unwrap(), 0.5);
        assert!(matches!(cmd, Command::ZoneSetLevel { ref zone_local_id, .. } if zone_local_id == "12"));
    }

    #[test]
    fn should_display_command() {
        assert_eq!(
            Command::zone_set_level("hall", 0.75).to_string(),
            "zone_set_level(hall, 0.75)"
        );
        assert_eq!(Command::scene_set("night").to_string(), "scene_set(night)");
    }

    #[test]
    fn should_deserialize_with_global_id_only() {
        let json = r#"{"type":"button_release","button_id":"hall-btn"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd, Command::button_release("hall-btn"));
        assert_eq!(cmd.kind(), "button_release");
    }
}
