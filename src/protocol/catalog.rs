//! Catalog Lister
//!
//! Collects the named queries a data service advertises through
//! `ListFlights`. Each flight's command bytes hold a JSON template.

use arrow_flight::{Criteria, FlightInfo};
use futures_util::StreamExt;

use super::client::FlightInfoStream;
use super::descriptor::TemplateDescriptor;
use super::error::{BridgeError, BridgeResult};

/// Criteria with an empty filter expression (list everything).
pub fn list_all_criteria() -> Criteria {
    Criteria::default()
}

/// Template carried in a flight's descriptor command.
pub fn template_from_flight(info: &FlightInfo) -> BridgeResult<TemplateDescriptor> {
    let descriptor = info
        .flight_descriptor
        .as_ref()
        .ok_or_else(|| BridgeError::decode("flight has no descriptor"))?;
    Ok(serde_json::from_slice(&descriptor.cmd)?)
}

/// Decode every listed flight, skipping entries that are not templates.
pub async fn collect_templates(
    mut flights: FlightInfoStream,
) -> BridgeResult<Vec<TemplateDescriptor>> {
    let mut templates = Vec::new();
    let mut skipped = 0usize;
    while let Some(info) = flights.next().await {
        let info = info?;
        match template_from_flight(&info) {
            Ok(template) => templates.push(template),
            Err(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "skipping_undecodable_flight");
            }
        }
    }
    tracing::debug!(templates = templates.len(), skipped, "catalog_listed");
    Ok(templates)
}
