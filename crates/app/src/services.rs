//! Application services built on top of the ports.

pub mod event_relay;
