//! Template Store Handlers
//!
//! File access runs on the blocking pool.

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};

use crate::protocol::descriptor::TemplateDescriptor;
use crate::protocol::rest::dto::{SavedTemplateDto, TemplateEntryDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

pub async fn list_templates(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<Vec<TemplateEntryDto>>, RestError> {
    let store = handler.templates().clone();
    let templates = tokio::task::spawn_blocking(move || store.list()).await??;
    Ok(Json(
        templates
            .into_iter()
            .map(|(slug, template)| TemplateEntryDto { slug, template })
            .collect(),
    ))
}

pub async fn get_template(
    Extension(handler): Extension<Arc<Handler>>,
    Path(slug): Path<String>,
) -> Result<Json<TemplateDescriptor>, RestError> {
    let store = handler.templates().clone();
    let template = tokio::task::spawn_blocking(move || store.get(&slug)).await??;
    Ok(Json(template))
}

pub async fn save_template(
    Extension(handler): Extension<Arc<Handler>>,
    Json(template): Json<TemplateDescriptor>,
) -> Result<(StatusCode, Json<SavedTemplateDto>), RestError> {
    let store = handler.templates().clone();
    let slug = tokio::task::spawn_blocking(move || store.save(&template)).await??;
    Ok((StatusCode::CREATED, Json(SavedTemplateDto { slug })))
}
