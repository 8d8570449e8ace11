//! REST API Data Transfer Objects
//!
//! Request/response types for the HTTP endpoints. Field names follow the
//! JSON the browser client sends (`actionType`, `tableName`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::descriptor::{QueryCommand, TemplateDescriptor};

/// Body of `POST /execute` and `POST /execute/local`
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub query: String,
    #[serde(default)]
    pub criteria: Map<String, Value>,
}

impl From<ExecuteRequest> for QueryCommand {
    fn from(request: ExecuteRequest) -> Self {
        QueryCommand::new(request.query).with_criteria(request.criteria)
    }
}

/// Body of `POST /action`
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "actionType")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Body of `POST /refresh`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "tableName", default)]
    pub table_name: Option<String>,
}

/// Query string of `GET /schema`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessDto {
    pub success: bool,
}

impl SuccessDto {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    /// Data service the bridge forwards to
    pub location: String,
    pub uptime_secs: u64,
    pub streams_opened: u64,
    pub actions_issued: u64,
}

/// Stored template with its slug
#[derive(Debug, Serialize)]
pub struct TemplateEntryDto {
    pub slug: String,
    #[serde(flatten)]
    pub template: TemplateDescriptor,
}

#[derive(Debug, Serialize)]
pub struct SavedTemplateDto {
    pub slug: String,
}
