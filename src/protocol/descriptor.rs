//! Descriptor Builder
//!
//! Turns logical requests into Flight command descriptors and action
//! invocations. Command bytes are always JSON; query text is never validated
//! here.

use arrow_flight::{Action, FlightDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::BridgeResult;

/// Session id used when the caller supplies none
pub const DEFAULT_SESSION_ID: &str = "default";

/// Catalog introspection query issued by the schema deriver
pub const INTROSPECTION_QUERY: &str = "SELECT table_name, column_name, data_type, is_nullable \
     FROM information_schema.columns ORDER BY table_name, ordinal_position";

/// Action refreshing a single table
pub const REFRESH_TABLE_ACTION: &str = "refresh_table";

/// Action refreshing every table of a session
pub const REFRESH_ALL_ACTION: &str = "refresh_all";

/// Query plus parameter criteria, carried as a command descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCommand {
    pub query: String,
    #[serde(default)]
    pub criteria: Map<String, Value>,
}

impl QueryCommand {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            criteria: Map::new(),
        }
    }

    pub fn with_criteria(mut self, criteria: Map<String, Value>) -> Self {
        self.criteria = criteria;
        self
    }
}

/// Introspection query bound to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionCommand {
    pub query: String,
    pub session_id: String,
}

/// A named query advertised by the data service or kept in the template store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

/// Command descriptor for a user query.
pub fn query_descriptor(command: &QueryCommand) -> BridgeResult<FlightDescriptor> {
    let bytes = serde_json::to_vec(command)?;
    Ok(FlightDescriptor::new_cmd(bytes))
}

/// Command descriptor for the fixed introspection query.
pub fn introspection_descriptor(session_id: Option<&str>) -> BridgeResult<FlightDescriptor> {
    let command = IntrospectionCommand {
        query: INTROSPECTION_QUERY.to_string(),
        session_id: session_id.unwrap_or(DEFAULT_SESSION_ID).to_string(),
    };
    let bytes = serde_json::to_vec(&command)?;
    Ok(FlightDescriptor::new_cmd(bytes))
}

/// Named action whose body is the JSON encoding of `payload` (`{}` when absent).
pub fn action(action_type: &str, payload: Option<&Value>) -> BridgeResult<Action> {
    let body = match payload {
        Some(value) => serde_json::to_vec(value)?,
        None => b"{}".to_vec(),
    };
    Ok(Action::new(action_type, body))
}

/// `refresh_table` when a table is named, `refresh_all` otherwise.
pub fn refresh_action(session_id: &str, table_name: Option<&str>) -> BridgeResult<Action> {
    match table_name {
        Some(table) => action(
            REFRESH_TABLE_ACTION,
            Some(&serde_json::json!({ "session_id": session_id, "table_name": table })),
        ),
        None => action(
            REFRESH_ALL_ACTION,
            Some(&serde_json::json!({ "session_id": session_id })),
        ),
    }
}
