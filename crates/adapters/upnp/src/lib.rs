//! # homewire-adapter-upnp
//!
//! Adapter for UPnP devices that push state changes over GENA event
//! subscriptions (Belkin Maker and Insight style switches).
//!
//! ## Roles
//!
//! - [`UpnpProducer`] holds a subscription lease on the device's
//!   `basicevent1` service, renews it before it expires and turns pushed
//!   notifications into domain events.
//! - [`UpnpConsumer`] answers `ZonesReport`/`SensorsReport` requests by
//!   polling the device over SOAP and publishing what it reads.
//! - [`UpnpAdapter`] builds `ZoneSetLevel` into a SOAP `SetBinaryState` call.
//! - [`callback`] hosts the HTTP endpoint devices `NOTIFY`.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `homewire-app` and `homewire-domain`.

mod adapter;
pub mod callback;
mod config;
mod consumer;
mod error;
pub mod parser;
mod producer;
pub mod soap;
pub mod subscription;

pub use adapter::UpnpAdapter;
pub use callback::CallbackRoutes;
pub use config::UpnpConfig;
pub use consumer::UpnpConsumer;
pub use error::UpnpError;
pub use producer::UpnpProducer;
pub use soap::{DeviceClient, SoapClient};
pub use subscription::{GenaClient, SubscribeRequest, Subscriber};
