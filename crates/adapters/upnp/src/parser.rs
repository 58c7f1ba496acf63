//! Decoding of pushed notifications and SOAP responses.
//!
//! Bodies arrive HTML-escaped, sometimes twice, so they are unescaped twice
//! before matching. A body carries either an `<attributeList>` (Maker:
//! switch and sensor) or a `<BinaryState>` (Insight: on/off plus power
//! readings). Anything else is ignored.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use homewire_domain::device::{Device, SensorAttr};
use homewire_domain::event::Event;

/// Local ID of the single zone and single sensor a UPnP switch exposes.
pub const LOCAL_ID: &str = "1";

/// Insight reports `8` when the relay is on but the load is idle.
const STANDBY: i32 = 8;
const ON: i32 = 1;

static ATTRIBUTE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<attributeList>.*</attributeList>").expect("attribute list pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<attribute>\s*<name>([^<]+)</name>\s*<value>([^<]*)</value>\s*</attribute>")
        .expect("attribute pattern is valid")
});

static BINARY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<BinaryState>(.*?)</BinaryState>").expect("binary state pattern is valid")
});

/// Unescape `body` twice; a pass that fails leaves the text as it was.
#[must_use]
pub fn decode(body: &str) -> String {
    let once = unescape(body);
    unescape(&once).into_owned()
}

fn unescape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(text).unwrap_or(Cow::Borrowed(text))
}

/// Values of interest from a Maker attribute list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeList {
    /// Relay state.
    pub switch: Option<i32>,
    /// Input sensor state.
    pub sensor: Option<i32>,
}

impl AttributeList {
    /// Find and parse the `<attributeList>` fragment of a decoded body.
    #[must_use]
    pub fn find(decoded: &str) -> Option<Self> {
        let fragment = ATTRIBUTE_LIST.find(decoded)?.as_str();
        let mut attrs = Self::default();
        for caps in ATTRIBUTE.captures_iter(fragment) {
            let value = caps[2].trim().parse().ok();
            match caps[1].trim() {
                "Switch" => attrs.switch = value,
                "Sensor" => attrs.sensor = value,
                _ => {}
            }
        }
        Some(attrs)
    }
}

/// The on/off field of a `<BinaryState>` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryState {
    pub on_off: i32,
}

impl BinaryState {
    /// Find and parse the `<BinaryState>` element of a decoded body.
    ///
    /// Insight devices append `|`-separated power readings after the
    /// on/off field.
    #[must_use]
    pub fn find(decoded: &str) -> Option<Self> {
        let caps = BINARY_STATE.captures(decoded)?;
        let on_off = caps[1].split('|').next()?.trim().parse().ok()?;
        Some(Self { on_off })
    }

    /// Zone level with the standby value folded into "on".
    #[must_use]
    pub fn level(self) -> f32 {
        level_of(if self.on_off == STANDBY { ON } else { self.on_off })
    }
}

/// The event a pushed notification implies for `device`, if any.
///
/// Attribute lists take precedence: a sensor reading wins over a switch
/// reading when both are present. Binary state is only considered when
/// the body has no attribute list.
#[must_use]
pub fn notification_event(device: &Device, body: &str) -> Option<Event> {
    let decoded = decode(body);
    let zone = device.zone(LOCAL_ID);
    let sensor = device.sensor(LOCAL_ID);

    if let Some(attrs) = AttributeList::find(&decoded) {
        if let (Some(value), Some(sensor)) = (attrs.sensor, sensor) {
            return Some(Event::SensorAttrChanged {
                sensor_id: sensor.id.clone(),
                sensor_name: sensor.name.clone(),
                attr: sensor_reading(&sensor.attr, value),
            });
        }
        if let (Some(value), Some(zone)) = (attrs.switch, zone) {
            return Some(Event::ZoneLevelChanged {
                zone_id: zone.id.clone(),
                zone_name: zone.name.clone(),
                level: level_of(value),
            });
        }
        return None;
    }

    let zone = zone?;
    let state = BinaryState::find(&decoded)?;
    Some(Event::ZoneLevelChanged {
        zone_id: zone.id.clone(),
        zone_name: zone.name.clone(),
        level: state.level(),
    })
}

/// `attr` carrying a fresh integer reading.
#[must_use]
pub fn sensor_reading(attr: &SensorAttr, value: i32) -> SensorAttr {
    attr.with_value(value.to_string())
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn level_of(value: i32) -> f32 {
    value as f32
}
