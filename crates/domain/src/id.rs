//! Typed global identifier newtypes.
//!
//! Global IDs are unique across the whole system and come from the system
//! configuration. They are distinct from the *local* IDs a device uses on
//! its own wire protocol, which stay plain strings.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Global identifier of a [`Device`](crate::device::Device).
    DeviceId
);

define_id!(
    /// Global identifier of a [`Zone`](crate::device::Zone).
    ZoneId
);

define_id!(
    /// Global identifier of a [`Sensor`](crate::device::Sensor).
    SensorId
);

define_id!(
    /// Global identifier of a [`Button`](crate::device::Button).
    ButtonId
);

define_id!(
    /// Global identifier of a [`Scene`](crate::scene::Scene).
    SceneId
);
