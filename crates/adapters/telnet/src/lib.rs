//! # homewire-adapter-telnet
//!
//! Adapter for devices speaking a line-oriented telnet control protocol
//! (lighting repeaters and keypads).
//!
//! ## How it works
//!
//! Each device gets a small pool of authenticated TCP connections. Commands
//! are written as CRLF-terminated frames on a pooled connection. When the
//! device is configured to stream, one pooled connection is held open and
//! every `~OUTPUT`/`~DEVICE` frame read from it is resolved against the
//! device's local ID tables and surfaced as an observed command.
//!
//! ```text
//! Disconnected ──connect──▶ Authenticating ──login/password──▶ Streaming
//!      ▲                                                          │
//!      └──────────────── retry delay ◀──── read error / EOF ──────┘
//! ```
//!
//! ## Wire grammar
//!
//! | Direction | Frame | Meaning |
//! |-----------|-------|---------|
//! | out | `#OUTPUT,<zone>,1,<level>` | set zone level |
//! | out | `#DEVICE,<device>,<button>,3` / `,4` | press / release |
//! | out | `?OUTPUT,<zone>,1` | query zone level |
//! | out | `#PING` | keep-alive |
//! | in  | `~OUTPUT,...` / `~DEVICE,...` (or `#`) | observed change |
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `homewire-app` and `homewire-domain`.

mod adapter;
pub mod codec;
mod config;
mod error;
pub mod parser;
pub mod pool;
pub mod session;
pub mod transport;

pub use adapter::TelnetAdapter;
pub use config::TelnetConfig;
pub use error::TelnetError;
pub use session::{Credentials, TelnetConnector};
