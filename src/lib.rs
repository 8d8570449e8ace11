//! # Flightgate
//!
//! HTTP bridge in front of an Arrow Flight data service. Browser clients
//! speak plain HTTP; the bridge issues the Flight RPCs and streams the
//! replies back as Arrow IPC bytes or JSON.
//!
//! ## Request Flow
//!
//! ```text
//! POST /execute {query, criteria}
//!     ↓
//! [Descriptor Builder]   → FlightDescriptor (JSON command)
//!     ↓
//! [Service Client]       → GetFlightInfo → first endpoint ticket → DoGet
//!     ↓
//! [Frame Reassembler]    → continuation | length | header | body ... | EOS
//!     ↓
//! [Streaming Responder]  → chunked HTTP body (cancels upstream on disconnect)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flightgate::{protocol::{rest, Handler}, Config};
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let http = config.http.clone();
//! let handler = Arc::new(Handler::from_config(config)?);
//! rest::start_http_server(handler, &http).await?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | figment-backed configuration |
//! | `protocol::wire` | Arrow IPC stream framing |
//! | `protocol::client` | Flight connection seam |
//! | `protocol::responder` | streaming with guarded termination |
//! | `protocol::rest` | axum routes |

// Configuration system
pub mod config;

// Flight bridge: wire format, client, handler, HTTP
pub mod protocol;

pub use config::Config;
pub use protocol::{BridgeError, BridgeResult, Handler};
