//! # homewired, the homewire daemon
//!
//! Composition root that wires the hub together and runs it until Ctrl-C.
//!
//! ## Responsibilities
//! - Load configuration (file, env vars) and initialise logging
//! - Build devices, adapters and the system registry
//! - Run the command processor worker
//! - Start producers (telnet streams, UPnP subscriptions) and relay their
//!   events onto the bus
//! - Start report consumers and ask every device for its current state
//! - Serve UPnP notifications
//! - Stop everything on shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod setup;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use homewire_adapter_upnp::{CallbackRoutes, callback};
use homewire_app::event_bus::InProcessEventBus;
use homewire_app::ports::{
    EventConsumer, EventProducer, EventPublisher, ProducedEvents, SystemRegistry,
};
use homewire_app::processor::CommandProcessor;
use homewire_app::services::event_relay::EventRelay;
use homewire_domain::event::Event;

use crate::config::Config;

type Relay = EventRelay<Arc<InProcessEventBus>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bus = Arc::new(InProcessEventBus::new(config.bus.capacity));
    let routes = CallbackRoutes::new();
    let hub = setup::assemble(&config, &bus, &routes)?;
    let registry: Arc<dyn SystemRegistry> = hub.system.clone();

    let processor = Arc::new(CommandProcessor::new(config.processor.queue_capacity));
    processor.set_system(Arc::clone(&registry));
    let relay = Arc::new(EventRelay::new(Arc::clone(&bus), registry));
    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    {
        let processor = Arc::clone(&processor);
        tasks.spawn(async move { processor.process().await });
    }

    if config.has_upnp_devices() {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.upnp.callback_port));
        let cancel = shutdown.clone();
        let routes = routes.clone();
        tasks.spawn(async move {
            if let Err(err) = callback::serve(routes, addr, cancel).await {
                tracing::error!(error = %err, "notification server stopped");
            }
        });
    }

    for adapter in &hub.telnet {
        adapter.start_consuming(bus.subscribe());
        relay_events(&mut tasks, &relay, adapter.producer_name(), adapter.start_producing());
    }
    for consumer in &hub.consumers {
        consumer.start_consuming(bus.subscribe());
    }
    for producer in &hub.producers {
        relay_events(&mut tasks, &relay, producer.producer_name(), producer.start_producing());
    }

    bus.publish(Event::ZonesReport {
        zone_ids: hub.system.zone_ids(),
    })
    .await?;
    bus.publish(Event::SensorsReport {
        sensor_ids: hub.system.sensor_ids(),
    })
    .await?;
    tracing::info!(subscribers = bus.subscriber_count(), "homewired running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    for producer in &hub.producers {
        producer.stop_producing().await;
    }
    for consumer in &hub.consumers {
        consumer.stop_consuming();
    }
    for adapter in &hub.telnet {
        adapter.shutdown().await;
    }
    shutdown.cancel();
    tasks.shutdown().await;
    tracing::info!(pending = processor.pending(), "homewired stopped");
    Ok(())
}

/// Forward a producer's events onto the bus. A producer that fails to
/// start is logged and left out.
fn relay_events(
    tasks: &mut JoinSet<()>,
    relay: &Arc<Relay>,
    name: &str,
    started: Result<ProducedEvents, homewire_domain::error::HubError>,
) {
    match started {
        Ok(produced) => {
            let relay = Arc::clone(relay);
            let name = name.to_string();
            tasks.spawn(async move { relay.run(&name, produced.events).await });
        }
        Err(err) => tracing::warn!(producer = name, error = %err, "failed to start producer"),
    }
}
