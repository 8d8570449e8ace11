//! Catalog Handler
//!
//! Lists the named queries the data service advertises.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::protocol::descriptor::TemplateDescriptor;
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

pub async fn list(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<Vec<TemplateDescriptor>>, RestError> {
    Ok(Json(handler.list_templates().await?))
}
