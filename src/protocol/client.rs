//! Service Client
//!
//! Connection to the Flight data service. A [`Connector`] builds one fresh
//! [`DataService`] per request; nothing is pooled or shared between requests.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, Criteria, FlightDescriptor, FlightInfo, Ticket};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};

use super::error::{BridgeError, BridgeResult};
use super::wire::DataFrame;

/// Default data service host
pub const DEFAULT_FLIGHT_HOST: &str = "localhost";

/// Default data service port
pub const DEFAULT_FLIGHT_PORT: u16 = 8815;

/// Frames of a `DoGet` call
pub type FrameStream = BoxStream<'static, BridgeResult<DataFrame>>;

/// Result bodies of a `DoAction` call
pub type ByteStream = BoxStream<'static, BridgeResult<Bytes>>;

/// Entries of a `ListFlights` call
pub type FlightInfoStream = BoxStream<'static, BridgeResult<FlightInfo>>;

// ============================================================================
// Location
// ============================================================================

/// Network location of the data service.
///
/// `localhost` and `127.0.0.1` name the same service and compare equal.
#[derive(Debug, Clone, Eq)]
pub struct Location {
    host: String,
    port: u16,
}

impl Location {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, optionally prefixed with `grpc://`, `grpc+tcp://` or `http://`.
    pub fn parse(location: &str) -> BridgeResult<Self> {
        let invalid = |reason: &str| BridgeError::InvalidLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = location.trim();
        let rest = ["grpc+tcp://", "grpc://", "http://"]
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(scheme))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URI handed to the gRPC transport
    pub fn endpoint_uri(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    fn canonical_host(&self) -> &str {
        if self.host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            &self.host
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.canonical_host() == other.canonical_host()
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(DEFAULT_FLIGHT_HOST, DEFAULT_FLIGHT_PORT)
    }
}

impl FromStr for Location {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Data Service
// ============================================================================

/// The subset of Flight RPCs the bridge issues.
#[async_trait]
pub trait DataService: Send {
    async fn get_flight_info(&mut self, descriptor: FlightDescriptor) -> BridgeResult<FlightInfo>;

    /// Start retrieval; the returned stream ends once `cancel` fires.
    async fn do_get(&mut self, ticket: Ticket, cancel: CancellationToken)
        -> BridgeResult<FrameStream>;

    async fn do_action(&mut self, action: Action) -> BridgeResult<ByteStream>;

    async fn list_flights(&mut self, criteria: Criteria) -> BridgeResult<FlightInfoStream>;
}

/// Builds a fresh [`DataService`] connection for each request.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> BridgeResult<Box<dyn DataService>>;

    fn location(&self) -> &Location;
}

/// Ticket of the first endpoint. Further endpoints are ignored.
pub fn first_ticket(info: &FlightInfo) -> BridgeResult<Ticket> {
    let endpoint = info.endpoint.first().ok_or(BridgeError::NoEndpoints)?;
    if info.endpoint.len() > 1 {
        tracing::debug!(
            endpoints = info.endpoint.len(),
            "using_first_endpoint_only"
        );
    }
    endpoint.ticket.clone().ok_or(BridgeError::MissingTicket)
}

// ============================================================================
// Upstream Call
// ============================================================================

/// A running `DoGet` call together with the connection that issued it.
pub struct UpstreamCall {
    frames: FrameStream,
    cancel: CancellationToken,
    connection: Option<Box<dyn DataService>>,
}

impl UpstreamCall {
    pub fn new(frames: FrameStream, cancel: CancellationToken) -> Self {
        Self {
            frames,
            cancel,
            connection: None,
        }
    }

    /// Keep the issuing connection alive for as long as the call runs.
    pub fn with_connection(mut self, connection: Box<dyn DataService>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub async fn next(&mut self) -> Option<BridgeResult<DataFrame>> {
        self.frames.next().await
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request upstream cancellation and release the call.
    pub fn cancel(self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for UpstreamCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCall")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("owns_connection", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolve `descriptor` and start retrieval of its first endpoint.
pub async fn open_stream(
    mut service: Box<dyn DataService>,
    descriptor: FlightDescriptor,
) -> BridgeResult<UpstreamCall> {
    let info = service.get_flight_info(descriptor).await?;
    let ticket = first_ticket(&info)?;
    let cancel = CancellationToken::new();
    let frames = service.do_get(ticket, cancel.clone()).await?;
    Ok(UpstreamCall::new(frames, cancel).with_connection(service))
}

// ============================================================================
// Flight implementation
// ============================================================================

/// Connects to an Arrow Flight server over gRPC.
#[derive(Debug, Clone)]
pub struct FlightConnector {
    location: Location,
    connect_timeout: Duration,
}

impl FlightConnector {
    pub fn new(location: Location, connect_timeout: Duration) -> Self {
        Self {
            location,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for FlightConnector {
    async fn connect(&self) -> BridgeResult<Box<dyn DataService>> {
        let uri = self.location.endpoint_uri();
        let endpoint = Endpoint::from_shared(uri).map_err(|e| BridgeError::InvalidLocation {
            location: self.location.to_string(),
            reason: e.to_string(),
        })?;
        let channel = endpoint
            .connect_timeout(self.connect_timeout)
            .connect()
            .await
            .map_err(|e| BridgeError::Connection {
                address: self.location.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(location = %self.location, "flight_connected");
        Ok(Box::new(FlightDataService {
            client: FlightServiceClient::new(channel),
        }))
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

/// [`DataService`] backed by a tonic Flight client.
#[derive(Debug, Clone)]
pub struct FlightDataService {
    client: FlightServiceClient<Channel>,
}

#[async_trait]
impl DataService for FlightDataService {
    async fn get_flight_info(&mut self, descriptor: FlightDescriptor) -> BridgeResult<FlightInfo> {
        Ok(self.client.get_flight_info(descriptor).await?.into_inner())
    }

    async fn do_get(
        &mut self,
        ticket: Ticket,
        cancel: CancellationToken,
    ) -> BridgeResult<FrameStream> {
        let stream = self.client.do_get(ticket).await?.into_inner();
        Ok(stream
            .map(|item| item.map(DataFrame::from).map_err(BridgeError::from))
            .take_until(cancel.cancelled_owned())
            .boxed())
    }

    async fn do_action(&mut self, action: Action) -> BridgeResult<ByteStream> {
        let stream = self.client.do_action(action).await?.into_inner();
        Ok(stream
            .map(|item| item.map(|r| r.body).map_err(BridgeError::from))
            .boxed())
    }

    async fn list_flights(&mut self, criteria: Criteria) -> BridgeResult<FlightInfoStream> {
        let stream = self.client.list_flights(criteria).await?.into_inner();
        Ok(stream.map(|item| item.map_err(BridgeError::from)).boxed())
    }
}
