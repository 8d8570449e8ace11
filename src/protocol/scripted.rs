//! Scripted data service
//!
//! An in-memory [`Connector`] that answers every RPC from a fixed [`Script`]
//! and records what it was asked. Used by the HTTP tests and handy for
//! exercising the bridge without a Flight server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow_flight::{Action, Criteria, FlightDescriptor, FlightEndpoint, FlightInfo, Ticket};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::client::{
    ByteStream, Connector, DataService, FlightInfoStream, FrameStream, Location,
};
use super::error::{BridgeError, BridgeResult};
use super::wire::DataFrame;

/// Canned replies for a [`ScriptedConnector`]
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Frames returned by `DoGet`
    pub frames: Vec<DataFrame>,
    /// Error raised after `frames` are exhausted
    pub stream_error: Option<String>,
    /// Keep `DoGet` open after `frames` until cancelled
    pub hold_open: bool,
    /// Resolve descriptors to a FlightInfo without endpoints
    pub no_endpoints: bool,
    /// Body fragments returned by `DoAction`
    pub action_reply: Vec<Bytes>,
    /// Reject `DoAction` with this message
    pub action_error: Option<String>,
    /// Entries returned by `ListFlights`
    pub flights: Vec<FlightInfo>,
    /// Refuse to connect
    pub connect_error: bool,
}

impl Script {
    /// Script whose `DoGet` replies with `batches` encoded as Flight frames.
    pub fn with_batches(schema: &Schema, batches: Vec<RecordBatch>) -> BridgeResult<Self> {
        Ok(Self {
            frames: encode_batches(schema, batches)?,
            ..Self::default()
        })
    }
}

/// Encode record batches the way a Flight server would send them.
pub fn encode_batches(schema: &Schema, batches: Vec<RecordBatch>) -> BridgeResult<Vec<DataFrame>> {
    Ok(arrow_flight::utils::batches_to_flight_data(schema, batches)?
        .into_iter()
        .map(DataFrame::from)
        .collect())
}

/// Everything a [`ScriptedConnector`] was asked to do
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub connections: usize,
    /// Command bytes of every resolved descriptor
    pub descriptors: Vec<Bytes>,
    /// `(type, body)` of every action
    pub actions: Vec<(String, Bytes)>,
    /// Criteria expressions of every listing
    pub criteria: Vec<Bytes>,
    /// `DoGet` streams released after cancellation
    pub cancellations: usize,
}

impl Recorded {
    /// Last descriptor command decoded as JSON.
    pub fn last_command(&self) -> Option<serde_json::Value> {
        self.descriptors
            .last()
            .and_then(|cmd| serde_json::from_slice(cmd).ok())
    }
}

#[derive(Debug)]
pub struct ScriptedConnector {
    location: Location,
    script: Script,
    recorded: Arc<Mutex<Recorded>>,
    cancellations: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            location: Location::default(),
            script,
            recorded: Arc::new(Mutex::new(Recorded::default())),
            cancellations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Snapshot of the calls seen so far
    pub fn recorded(&self) -> Recorded {
        let mut recorded = self.recorded.lock().clone();
        recorded.cancellations = self.cancellations.load(Ordering::SeqCst);
        recorded
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> BridgeResult<Box<dyn DataService>> {
        if self.script.connect_error {
            return Err(BridgeError::Connection {
                address: self.location.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.recorded.lock().connections += 1;
        Ok(Box::new(ScriptedService {
            script: self.script.clone(),
            recorded: self.recorded.clone(),
            cancellations: self.cancellations.clone(),
        }))
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

struct ScriptedService {
    script: Script,
    recorded: Arc<Mutex<Recorded>>,
    cancellations: Arc<AtomicUsize>,
}

/// Counts a cancellation when a cancelled stream is released.
struct CancelProbe {
    token: CancellationToken,
    cancellations: Arc<AtomicUsize>,
}

impl Drop for CancelProbe {
    fn drop(&mut self) {
        if self.token.is_cancelled() {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl DataService for ScriptedService {
    async fn get_flight_info(&mut self, descriptor: FlightDescriptor) -> BridgeResult<FlightInfo> {
        self.recorded.lock().descriptors.push(descriptor.cmd.clone());
        let info = FlightInfo::new().with_descriptor(descriptor);
        if self.script.no_endpoints {
            Ok(info)
        } else {
            Ok(info.with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new("scripted"))))
        }
    }

    async fn do_get(
        &mut self,
        _ticket: Ticket,
        cancel: CancellationToken,
    ) -> BridgeResult<FrameStream> {
        let mut items: Vec<BridgeResult<DataFrame>> =
            self.script.frames.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.script.stream_error {
            items.push(Err(BridgeError::Upstream(tonic::Status::internal(
                message.clone(),
            ))));
        }
        let tail = if self.script.hold_open {
            futures_util::stream::pending().boxed()
        } else {
            futures_util::stream::empty().boxed()
        };
        let probe = CancelProbe {
            token: cancel.clone(),
            cancellations: self.cancellations.clone(),
        };
        Ok(futures_util::stream::iter(items)
            .chain(tail)
            .take_until(cancel.cancelled_owned())
            .map(move |item| {
                let _ = &probe;
                item
            })
            .boxed())
    }

    async fn do_action(&mut self, action: Action) -> BridgeResult<ByteStream> {
        self.recorded
            .lock()
            .actions
            .push((action.r#type.clone(), action.body.clone()));
        if let Some(message) = &self.script.action_error {
            return Err(tonic::Status::not_found(message.clone()).into());
        }
        let fragments: Vec<BridgeResult<Bytes>> =
            self.script.action_reply.iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(fragments).boxed())
    }

    async fn list_flights(&mut self, criteria: Criteria) -> BridgeResult<FlightInfoStream> {
        self.recorded.lock().criteria.push(criteria.expression.clone());
        let flights: Vec<BridgeResult<FlightInfo>> =
            self.script.flights.iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(flights).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::client::open_stream;
    use crate::protocol::descriptor::{query_descriptor, QueryCommand};
    use crate::protocol::responder::collect_stream;

    #[tokio::test]
    async fn test_records_descriptor_and_streams_frames() {
        let connector = ScriptedConnector::new(Script {
            frames: vec![DataFrame::header_only(vec![1u8; 8])],
            ..Script::default()
        });
        let service = connector.connect().await.unwrap();
        let descriptor = query_descriptor(&QueryCommand::new("SELECT 1")).unwrap();
        let call = open_stream(service, descriptor).await.unwrap();
        let bytes = collect_stream(call).await.unwrap();
        assert_eq!(bytes.len(), 8 + 8 + 8);

        let recorded = connector.recorded();
        assert_eq!(recorded.connections, 1);
        assert_eq!(recorded.last_command().unwrap()["query"], "SELECT 1");
        assert_eq!(recorded.cancellations, 0);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_counted() {
        let connector = ScriptedConnector::new(Script {
            hold_open: true,
            ..Script::default()
        });
        let service = connector.connect().await.unwrap();
        let descriptor = query_descriptor(&QueryCommand::new("q")).unwrap();
        let call = open_stream(service, descriptor).await.unwrap();
        call.cancel();
        assert_eq!(connector.recorded().cancellations, 1);
    }

    #[tokio::test]
    async fn test_connect_error() {
        let connector = ScriptedConnector::new(Script {
            connect_error: true,
            ..Script::default()
        });
        assert!(matches!(
            connector.connect().await,
            Err(BridgeError::Connection { .. })
        ));
    }
}
