//! Execute Handlers
//!
//! Streaming query endpoints. The response body is fed by a background task
//! through a bounded channel; dropping the body (client disconnect) revokes
//! the sink and cancels the upstream call.

use std::sync::Arc;

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::protocol::descriptor::QueryCommand;
use crate::protocol::responder::{pump, BodyChunk, ChannelSink, GuardedSink};
use crate::protocol::rest::dto::ExecuteRequest;
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

/// Media type of an Arrow IPC stream
pub const ARROW_STREAM_CONTENT_TYPE: &str = "application/vnd.apache.arrow.stream";

/// Media type of local executor output
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

fn streaming_response(content_type: &'static str, rx: mpsc::Receiver<BodyChunk>) -> Response {
    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Run a query against the data service and stream the Arrow IPC reply
pub async fn execute(
    Extension(handler): Extension<Arc<Handler>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Response, RestError> {
    let command = QueryCommand::from(request);
    let call = handler.open_query(&command).await?;

    let (sink, rx) = ChannelSink::channel(handler.config().http.stream_buffer);
    tokio::spawn(
        async move {
            let mut sink = GuardedSink::new(sink);
            let outcome = pump(call, &mut sink).await;
            tracing::debug!(?outcome, "execute_stream_finished");
        }
        .in_current_span(),
    );

    Ok(streaming_response(ARROW_STREAM_CONTENT_TYPE, rx))
}

/// Run a query through the local executor and stream its stdout
pub async fn execute_local(
    Extension(handler): Extension<Arc<Handler>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Response, RestError> {
    let command = QueryCommand::from(request);
    let run = handler.spawn_local(&command)?;

    let (sink, rx) = ChannelSink::channel(handler.config().http.stream_buffer);
    tokio::spawn(
        async move {
            let mut sink = GuardedSink::new(sink);
            let outcome = run.pump(&mut sink).await;
            tracing::debug!(?outcome, "local_stream_finished");
        }
        .in_current_span(),
    );

    Ok(streaming_response(NDJSON_CONTENT_TYPE, rx))
}
