//! # homewire-app
//!
//! Application layer: the command pipeline and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `DeviceAdapter` turns a domain command into an executable `CommandFunc`
//!   - `EventProducer` surfaces device-side changes as domain events
//!   - `EventConsumer` reacts to report requests on the bus
//!   - `EventPublisher` appends events to the bus
//!   - `SystemRegistry` resolves global IDs to zones, scenes, buttons and devices
//! - Provide the `CommandProcessor`, the single serialization point for
//!   wire-level command execution
//! - Provide **in-process infrastructure** (event bus, event relay, the
//!   `System` registry) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `homewire-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod processor;
pub mod services;
pub mod system;
