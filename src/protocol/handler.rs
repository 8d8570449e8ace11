//! Handler for the Flight bridge
//!
//! Request-level operations used by the REST API. Every operation opens its
//! own data service connection through the [`Connector`]; the handler holds
//! no per-request state. Counters are `AtomicU64` (lock-free).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::Config;

use super::action::{await_first_reply, collect_action, ActionReply};
use super::catalog::{collect_templates, list_all_criteria};
use super::client::{open_stream, Connector, FlightConnector, Location, UpstreamCall};
use super::descriptor::{
    action, introspection_descriptor, query_descriptor, refresh_action, QueryCommand,
    TemplateDescriptor,
};
use super::error::{BridgeError, BridgeResult};
use super::local::{LocalExecutor, LocalRun};
use super::responder::collect_stream;
use super::schema::{derive_schema, DatabaseSchema};
use super::templates::TemplateStore;

pub struct Handler {
    config: Config,
    connector: Arc<dyn Connector>,
    templates: TemplateStore,
    local: Option<LocalExecutor>,
    start_time: Instant,
    stream_count: AtomicU64,
    action_count: AtomicU64,
}

impl Handler {
    /// Create a handler talking to the data service through `connector`.
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let templates = TemplateStore::new(config.templates.dir.clone());
        let local = config
            .local_executor
            .is_active()
            .then(|| {
                LocalExecutor::new(
                    config.local_executor.program.clone(),
                    config.local_executor.args.clone(),
                )
            });
        Self {
            config,
            connector,
            templates,
            local,
            start_time: Instant::now(),
            stream_count: AtomicU64::new(0),
            action_count: AtomicU64::new(0),
        }
    }

    /// Create a handler for the Flight server named in the configuration.
    pub fn from_config(config: Config) -> BridgeResult<Self> {
        let connector = FlightConnector::new(
            config.flight.location()?,
            config.flight.connect_timeout(),
        );
        Ok(Self::new(config, Arc::new(connector)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn location(&self) -> &Location {
        self.connector.location()
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Streams opened so far (queries and introspection).
    pub fn total_streams(&self) -> u64 {
        self.stream_count.load(Ordering::Relaxed)
    }

    /// Actions issued so far (including refreshes).
    pub fn total_actions(&self) -> u64 {
        self.action_count.load(Ordering::Relaxed)
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    // ========================================================================
    // Data service operations
    // ========================================================================

    /// Resolve a query and start streaming its first endpoint.
    pub async fn open_query(&self, command: &QueryCommand) -> BridgeResult<UpstreamCall> {
        self.stream_count.fetch_add(1, Ordering::Relaxed);
        let descriptor = query_descriptor(command)?;
        let service = self.connector.connect().await?;
        open_stream(service, descriptor).await
    }

    /// Named queries advertised by the data service.
    pub async fn list_templates(&self) -> BridgeResult<Vec<TemplateDescriptor>> {
        let mut service = self.connector.connect().await?;
        let flights = service.list_flights(list_all_criteria()).await?;
        collect_templates(flights).await
    }

    /// Invoke a named action and decode its collected reply.
    pub async fn run_action(
        &self,
        action_type: &str,
        payload: Option<&Value>,
    ) -> BridgeResult<ActionReply> {
        self.action_count.fetch_add(1, Ordering::Relaxed);
        let request = action(action_type, payload)?;
        let mut service = self.connector.connect().await?;
        let replies = service.do_action(request).await?;
        let reply = collect_action(replies).await?;
        tracing::debug!(action_type, "action_completed");
        Ok(reply)
    }

    /// Refresh one table, or every table of the session when none is named.
    ///
    /// Succeeds on the first reply fragment; the rest of the reply is ignored.
    pub async fn refresh(&self, session_id: &str, table_name: Option<&str>) -> BridgeResult<()> {
        self.action_count.fetch_add(1, Ordering::Relaxed);
        let request = refresh_action(session_id, table_name)?;
        let mut service = self.connector.connect().await?;
        let replies = service.do_action(request).await?;
        await_first_reply(replies).await?;
        tracing::info!(session_id, table = ?table_name, "refresh_acknowledged");
        Ok(())
    }

    /// Introspect the catalog of a session.
    pub async fn schema(&self, session_id: Option<&str>) -> BridgeResult<DatabaseSchema> {
        self.stream_count.fetch_add(1, Ordering::Relaxed);
        let descriptor = introspection_descriptor(session_id)?;
        let service = self.connector.connect().await?;
        let call = open_stream(service, descriptor).await?;
        let stream = collect_stream(call).await?;
        derive_schema(&stream)
    }

    // ========================================================================
    // Local executor
    // ========================================================================

    pub fn local_executor(&self) -> Option<&LocalExecutor> {
        self.local.as_ref()
    }

    /// Start the local executor for `command`.
    pub fn spawn_local(&self, command: &QueryCommand) -> BridgeResult<LocalRun> {
        let executor = self
            .local
            .as_ref()
            .ok_or(BridgeError::LocalExecutorDisabled)?;
        executor.spawn(command)
    }
}
