//! Turn configuration into devices, adapters and the system registry.

use std::collections::HashMap;
use std::sync::Arc;

use homewire_adapter_telnet::{TelnetAdapter, TelnetConnector};
use homewire_adapter_upnp::{
    CallbackRoutes, GenaClient, SoapClient, UpnpAdapter, UpnpConsumer, UpnpProducer,
};
use homewire_app::event_bus::InProcessEventBus;
use homewire_app::ports::DeviceAdapter;
use homewire_app::system::System;
use homewire_domain::command::Command;
use homewire_domain::device::{Device, Protocol};
use homewire_domain::error::{HubError, NotFoundError};
use homewire_domain::id::DeviceId;
use homewire_domain::scene::Scene;

use crate::config::{Config, DeviceConfig, SceneConfig};

pub type Telnet = TelnetAdapter<TelnetConnector>;
pub type Producer = UpnpProducer<GenaClient>;
pub type Consumer = UpnpConsumer<SoapClient, InProcessEventBus>;

/// Everything the daemon starts and stops.
pub struct Hub {
    pub system: Arc<System>,
    pub telnet: Vec<Arc<Telnet>>,
    pub producers: Vec<Arc<Producer>>,
    pub consumers: Vec<Arc<Consumer>>,
}

/// Build every configured device.
///
/// # Errors
///
/// Returns [`HubError::Validation`] for an invalid device and
/// [`HubError::NotFound`] when a device bridges an unknown one.
pub fn build_devices(configs: &[DeviceConfig]) -> Result<Vec<Arc<Device>>, HubError> {
    let by_id: HashMap<&str, &DeviceConfig> = configs.iter().map(|d| (d.id.as_str(), d)).collect();
    configs
        .iter()
        .map(|config| {
            let mut builder = Device::builder()
                .id(config.id.as_str())
                .local_id(config.local_id.as_str())
                .name(config.name.as_str())
                .address(config.address.as_str())
                .protocol(config.protocol);
            for zone in &config.zones {
                builder = builder.zone(zone.local_id.as_str(), zone.id.as_str(), zone.name.as_str());
            }
            for sensor in &config.sensors {
                builder = builder.sensor(
                    sensor.local_id.as_str(),
                    sensor.id.as_str(),
                    sensor.name.as_str(),
                    sensor.attr(),
                );
            }
            for button in &config.buttons {
                builder = builder.button(button.local_id.as_str(), button.id.as_str(), button.name.as_str());
            }
            for bridged in &config.bridges {
                let other = by_id
                    .get(bridged.as_str())
                    .ok_or_else(|| NotFoundError::new("device", bridged))?;
                builder = builder.bridge(other.local_id.as_str(), bridged.as_str());
            }
            builder.build().map(Arc::new)
        })
        .collect()
}

fn build_scene(config: &SceneConfig) -> Result<Scene, HubError> {
    config
        .commands
        .iter()
        .map(Command::from)
        .fold(Scene::builder().id(config.id.as_str()).name(config.name.as_str()), |builder, command| {
            builder.command(command)
        })
        .build()
}

/// Create adapters for every device and index them in a [`System`].
///
/// Telnet connection pools are created here but connect lazily; UPnP
/// producers and consumers are created but not started.
///
/// # Errors
///
/// Returns an error when a device or scene is invalid, or an HTTP client
/// cannot be built.
pub fn assemble(
    config: &Config,
    bus: &Arc<InProcessEventBus>,
    routes: &CallbackRoutes,
) -> anyhow::Result<Hub> {
    let devices = build_devices(&config.devices)?;
    let by_id: HashMap<DeviceId, Arc<Device>> = devices
        .iter()
        .map(|device| (device.id.clone(), Arc::clone(device)))
        .collect();
    let soap = Arc::new(SoapClient::new(config.upnp.fetch_timeout())?);
    let gena = Arc::new(GenaClient::new(config.upnp.fetch_timeout())?);

    let mut system = System::builder();
    let mut telnet = Vec::new();
    let mut producers = Vec::new();
    let mut consumers = Vec::new();

    for (device, device_config) in devices.iter().zip(&config.devices) {
        match device.protocol {
            Protocol::Telnet => {
                let settings = &device_config.telnet;
                if settings.stream && settings.pool_size == 1 {
                    tracing::warn!(
                        device = %device.name,
                        "streaming holds the only pooled connection, commands will time out while it streams"
                    );
                }
                let bridged = device_config
                    .bridges
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).cloned());
                let adapter = Arc::new(Telnet::new(Arc::clone(device), bridged, settings.clone()));
                adapter.init_connections(TelnetConnector::new(device.address.as_str(), settings))?;
                let command_side: Arc<dyn DeviceAdapter> = adapter.clone();
                system = system.device(Arc::clone(device), command_side);
                telnet.push(adapter);
            }
            Protocol::UpnpMaker | Protocol::UpnpInsight => {
                let adapter = Arc::new(UpnpAdapter::new(Arc::clone(device), Arc::clone(&soap)));
                system = system.device(Arc::clone(device), adapter);
                producers.push(Arc::new(UpnpProducer::new(
                    Arc::clone(device),
                    config.upnp.clone(),
                    Arc::clone(&gena),
                    routes.clone(),
                )));
                consumers.push(Arc::new(UpnpConsumer::new(
                    Arc::clone(device),
                    Arc::clone(&soap),
                    Arc::clone(bus),
                )));
            }
        }
    }

    for scene in &config.scenes {
        system = system.scene(build_scene(scene)?);
    }
    let system = Arc::new(system.build()?);
    tracing::info!(
        devices = devices.len(),
        zones = system.zone_ids().len(),
        sensors = system.sensor_ids().len(),
        scenes = config.scenes.len(),
        "system assembled"
    );

    Ok(Hub {
        system,
        telnet,
        producers,
        consumers,
    })
}
