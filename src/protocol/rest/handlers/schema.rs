//! Schema Handler

use std::sync::Arc;

use axum::{extract::Query, http::HeaderMap, Extension, Json};

use crate::protocol::rest::dto::SchemaQuery;
use crate::protocol::rest::error::RestError;
use crate::protocol::schema::DatabaseSchema;
use crate::protocol::Handler;

use super::session_from_headers;

/// Catalog of the session named by `x-session-id` or `?session_id=`
pub async fn get_schema(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<DatabaseSchema>, RestError> {
    let session_id = session_from_headers(&headers).or(query.session_id);
    let schema = handler.schema(session_id.as_deref()).await?;
    tracing::debug!(tables = schema.tables.len(), "schema_served");
    Ok(Json(schema))
}
