//! Answers report requests for one UPnP device by polling it over SOAP.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewire_app::ports::{EventConsumer, EventPublisher};
use homewire_domain::device::{Device, Protocol, Sensor, Zone};
use homewire_domain::event::Event;
use homewire_domain::id::{SensorId, ZoneId};

use crate::error::UpnpError;
use crate::parser;
use crate::soap::DeviceClient;

/// Report consumer for one device.
///
/// A failed poll is logged and skipped; the report simply goes
/// unanswered for that zone or sensor. Stopping and starting again is
/// allowed.
pub struct UpnpConsumer<D, P> {
    device: Arc<Device>,
    client: Arc<D>,
    publisher: Arc<P>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<D, P> UpnpConsumer<D, P>
where
    D: DeviceClient,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(device: Arc<Device>, client: Arc<D>, publisher: Arc<P>) -> Self {
        Self {
            device,
            client,
            publisher,
            running: Mutex::new(None),
        }
    }
}

impl<D, P> EventConsumer for UpnpConsumer<D, P>
where
    D: DeviceClient,
    P: EventPublisher + Send + Sync + 'static,
{
    fn consumer_name(&self) -> &str {
        &self.device.name
    }

    fn start_consuming(&self, events: broadcast::Receiver<Event>) {
        let poller = Poller {
            device: Arc::clone(&self.device),
            client: Arc::clone(&self.client),
            publisher: Arc::clone(&self.publisher),
        };
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(events, cancel.clone()));
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((cancel, handle));
        if let Some((cancel, handle)) = previous {
            tracing::debug!(device = %self.device.name, "replacing running report consumer");
            cancel.cancel();
            handle.abort();
        }
    }

    fn stop_consuming(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            handle.abort();
        }
    }
}

struct Poller<D, P> {
    device: Arc<Device>,
    client: Arc<D>,
    publisher: Arc<P>,
}

impl<D, P> Poller<D, P>
where
    D: DeviceClient,
    P: EventPublisher + Send + Sync + 'static,
{
    async fn run(self, mut events: broadcast::Receiver<Event>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(Event::ZonesReport { zone_ids }) => self.report_zones(&zone_ids).await,
                Ok(Event::SensorsReport { sensor_ids }) => self.report_sensors(&sensor_ids).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(device = %self.device.name, skipped, "report consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn report_zones(&self, zone_ids: &[ZoneId]) {
        for zone in self.device.owned_zones(zone_ids) {
            match self.zone_level().await {
                Ok(level) => self.publish(zone_changed(zone, level)).await,
                Err(err) => {
                    tracing::warn!(device = %self.device.name, zone = %zone.id, error = %err, "failed to poll zone level");
                }
            }
        }
    }

    async fn report_sensors(&self, sensor_ids: &[SensorId]) {
        for sensor in self.device.owned_sensors(sensor_ids) {
            match self.sensor_value().await {
                Ok(value) => self.publish(sensor_changed(sensor, value)).await,
                Err(err) => {
                    tracing::warn!(device = %self.device.name, sensor = %sensor.id, error = %err, "failed to poll sensor");
                }
            }
        }
    }

    /// Insight reports its relay through `BinaryState`; Maker through the
    /// `Switch` attribute.
    async fn zone_level(&self) -> Result<f32, UpnpError> {
        let address = &self.device.address;
        if self.device.protocol == Protocol::UpnpInsight {
            let state = self.client.fetch_binary_state(address).await?;
            return Ok(state.level());
        }
        let attrs = self.client.fetch_attributes(address).await?;
        attrs
            .switch
            .map(parser::level_of)
            .ok_or(UpnpError::UnexpectedResponse {
                action: "GetAttributes",
            })
    }

    async fn sensor_value(&self) -> Result<i32, UpnpError> {
        let attrs = self.client.fetch_attributes(&self.device.address).await?;
        attrs.sensor.ok_or(UpnpError::UnexpectedResponse {
            action: "GetAttributes",
        })
    }

    async fn publish(&self, event: Event) {
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(device = %self.device.name, error = %err, "failed to publish report");
        }
    }
}

fn zone_changed(zone: &Zone, level: f32) -> Event {
    Event::ZoneLevelChanged {
        zone_id: zone.id.clone(),
        zone_name: zone.name.clone(),
        level,
    }
}

fn sensor_changed(sensor: &Sensor, value: i32) -> Event {
    Event::SensorAttrChanged {
        sensor_id: sensor.id.clone(),
        sensor_name: sensor.name.clone(),
        attr: parser::sensor_reading(&sensor.attr, value),
    }
}
