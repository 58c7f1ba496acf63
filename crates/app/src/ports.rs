//! Port definitions: the traits adapters and the registry implement.
//!
//! They live in `app` so the processor and the adapter crates can both
//! depend on them without a cycle.

pub mod adapter;
pub mod event_bus;
pub mod registry;

pub use adapter::{
    CommandFunc, CommandFuture, DeviceAdapter, EventConsumer, EventProducer, ProducedEvents,
};
pub use event_bus::EventPublisher;
pub use registry::SystemRegistry;
