//! # homewire-domain
//!
//! Pure domain model for the homewire home automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions
//! - Define **Devices** (physical units reachable over one wire protocol) and
//!   the **Zones**, **Sensors** and **Buttons** they own
//! - Define **Scenes** (named, ordered command lists)
//! - Define **Commands** (intents: set a level, press a button, run a scene)
//! - Define **Events** (state-change notifications and report requests)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod command;
pub mod device;
pub mod event;
pub mod scene;
