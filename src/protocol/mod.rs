//! Flight bridge protocol
//!
//! Translates HTTP requests into Arrow Flight calls and Flight replies back
//! into plain HTTP bodies.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  HTTP (axum)                                                |
//! |    POST /execute   -> GetFlightInfo + DoGet -> IPC stream   |
//! |    POST /action    -> DoAction -> JSON                      |
//! |    POST /refresh   -> DoAction (refresh_table|refresh_all)  |
//! |    GET  /schema    -> introspection DoGet -> {name, tables} |
//! |    GET  /list      -> ListFlights -> [template]             |
//! +-------------------------------------------------------------+
//! |  Handler: one fresh Flight connection per request           |
//! +-------------------------------------------------------------+
//! |  Wire: FlightData -> continuation | length | header | body  |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `wire` - IPC stream framing (`FrameReassembler`)
//! - `client` - `Connector`/`DataService` seam and the tonic implementation
//! - `descriptor` - command descriptors and actions
//! - `responder` - pumps a `DoGet` call into a guarded sink
//! - `action`, `schema`, `catalog` - reply decoding per mode
//! - `templates`, `local` - template store and local executor
//! - `scripted` - in-memory data service for tests (`test-util` feature)
//! - `handler` - request-level operations
//! - `rest` - HTTP handlers and routing

pub mod action;
pub mod catalog;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod local;
pub mod responder;
pub mod rest;
pub mod schema;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod templates;
pub mod wire;

// Re-export error types
pub use error::{BridgeError, BridgeResult};

// Re-export wire types
pub use wire::{DataFrame, FrameReassembler, WireSegment};

// Re-export client seam
pub use client::{Connector, DataService, FlightConnector, Location};

// Re-export handler
pub use handler::Handler;
