//! Resolve inbound frames against a device's local ID tables.
//!
//! Unknown local IDs, unknown command numbers and unparsable values all
//! resolve to `None`: the frame is dropped without an error.

use std::collections::HashMap;
use std::sync::Arc;

use homewire_domain::command::Command;
use homewire_domain::device::Device;
use homewire_domain::id::DeviceId;

use crate::codec::{Frame, Verb};

const CMD_SET_LEVEL: &str = "1";
const CMD_PRESS: &str = "3";
const CMD_RELEASE: &str = "4";

/// Maps frames read from one streaming device to domain commands.
///
/// `DEVICE` frames may reference another device the streaming one bridges;
/// those are resolved against the bridged device's button table.
#[derive(Debug, Clone)]
pub struct FrameResolver {
    device: Arc<Device>,
    bridged: HashMap<DeviceId, Arc<Device>>,
}

impl FrameResolver {
    pub fn new(device: Arc<Device>, bridged: impl IntoIterator<Item = Arc<Device>>) -> Self {
        let bridged = bridged
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();
        Self { device, bridged }
    }

    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The command a frame reports, if it refers to something we know.
    #[must_use]
    pub fn resolve(&self, frame: &Frame) -> Option<Command> {
        let [first, second, third] = frame.fields.as_slice() else {
            return None;
        };
        match frame.verb {
            Verb::Output => self.resolve_output(first, second, third),
            Verb::Device => self.resolve_device(first, second, third),
        }
    }

    /// `OUTPUT,<zone>,<cmd>,<value>`
    fn resolve_output(&self, zone_local_id: &str, cmd: &str, value: &str) -> Option<Command> {
        if cmd != CMD_SET_LEVEL {
            return None;
        }
        let level: f32 = value.trim().parse().ok()?;
        let zone = self.device.zone(zone_local_id)?;
        Some(Command::set_zone(zone, level))
    }

    /// `DEVICE,<device>,<component>,<cmd>`
    fn resolve_device(&self, device_local_id: &str, button_local_id: &str, cmd: &str) -> Option<Command> {
        let global_id = self.device.device(device_local_id)?;
        let source = if *global_id == self.device.id {
            &self.device
        } else {
            self.bridged.get(global_id)?
        };
        let button = source.button(button_local_id)?;
        match cmd {
            CMD_PRESS => Some(Command::press(source, button)),
            CMD_RELEASE => Some(Command::release(source, button)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use bytes::BytesMut;
    use homewire_domain::id::{ButtonId, ZoneId};
    use tokio_util::codec::Decoder;

    fn resolver() -> FrameResolver {
        let keypad = Device::builder()
            .id("keypad")
            .local_id("7")
            .name("Keypad")
            .button("4", "kitchen-btn", "Kitchen")
            .build()
            .unwrap();
        let repeater = Device::builder()
            .id("repeater")
            .local_id("1")
            .name("Repeater")
            .zone("12", "hall", "Hall")
            .button("2", "hall-btn", "Hall Button")
            .bridge("7", "keypad")
            .build()
            .unwrap();
        FrameResolver::new(Arc::new(repeater), [Arc::new(keypad)])
    }

    fn frame(raw: &str) -> Frame {
        let mut buf = BytesMut::from(raw.as_bytes());
        FrameCodec::new(4096).decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn should_resolve_level_frame_to_zone_set_level() {
        let cmd = resolver().resolve(&frame("~OUTPUT,12,1,0.75\r\n"));
        assert_eq!(
            cmd,
            Some(Command::ZoneSetLevel {
                zone_id: ZoneId::new("hall"),
                zone_local_id: "12".to_string(),
                level: 0.75,
            })
        );
    }

    #[test]
    fn should_round_trip_built_level_frame() {
        let resolver = resolver();
        let zone = resolver.device().zone("12").unwrap();
        let wire = crate::codec::encode(&Command::set_zone(zone, 0.75)).unwrap();

        let Some(Command::ZoneSetLevel { zone_local_id, level, .. }) = resolver.resolve(&frame(&wire)) else {
            panic!("expected a level command");
        };
        assert_eq!(zone_local_id, "12");
        assert!((level - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn should_resolve_press_and_release() {
        let resolver = resolver();
        let press = resolver.resolve(&frame("~DEVICE,1,2,3\r\n"));
        assert_eq!(
            press,
            Some(Command::ButtonPress {
                button_id: ButtonId::new("hall-btn"),
                button_local_id: "2".to_string(),
                device_local_id: "1".to_string(),
            })
        );
        let release = resolver.resolve(&frame("~DEVICE,1,2,4\r\n"));
        assert!(matches!(release, Some(Command::ButtonRelease { .. })));
    }

    #[test]
    fn should_resolve_button_on_bridged_device() {
        let cmd = resolver().resolve(&frame("~DEVICE,7,4,3\r\n"));
        assert_eq!(
            cmd,
            Some(Command::ButtonPress {
                button_id: ButtonId::new("kitchen-btn"),
                button_local_id: "4".to_string(),
                device_local_id: "7".to_string(),
            })
        );
    }

    #[test]
    fn should_drop_frames_with_unknown_ids() {
        let resolver = resolver();
        for raw in [
            "~OUTPUT,99,1,0.50\r\n",
            "~DEVICE,9,2,3\r\n",
            "~DEVICE,1,99,3\r\n",
        ] {
            assert_eq!(resolver.resolve(&frame(raw)), None, "{raw}");
        }
    }

    #[test]
    fn should_drop_unparsable_or_unhandled_frames() {
        let resolver = resolver();
        for raw in [
            "~OUTPUT,12,1,bright\r\n",
            "~OUTPUT,12,2,0.50\r\n",
            "~DEVICE,1,2,9\r\n",
            "~OUTPUT,12,1\r\n",
        ] {
            assert_eq!(resolver.resolve(&frame(raw)), None, "{raw}");
        }
    }
}
