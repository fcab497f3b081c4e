//! Remote content gateway.
//!
//! [`RemoteDataService`] is the raw collaborator contract (row queries and a
//! per-table change feed). [`ContentGateway`] sits on top of it and turns
//! untyped rows into validated [`ContentRow`]s and [`SettingsRow`]s, dropping
//! malformed rows with a log entry instead of trusting arbitrary JSON.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::change::ChangeEvent;
use crate::domain::rows::{ContentRow, RemoteRow, SettingsRow};

pub(crate) const METRIC_SHAPE_ERROR: &str = "vitrine_gateway_shape_error_total";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote transport error: {0}")]
    Transport(String),
    #[error("remote service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode remote response: {0}")]
    Decode(String),
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Equality-filtered row query against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub filters: Vec<(String, Value)>,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// Whether `row` satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }
}

/// Stream of change events for one table.
///
/// Dropping the feed closes the channel; producers observe that and stop.
#[derive(Debug)]
pub struct ChangeFeed {
    table: String,
    receiver: mpsc::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(table: impl Into<String>, receiver: mpsc::Receiver<ChangeEvent>) -> Self {
        Self {
            table: table.into(),
            receiver,
        }
    }

    /// Create a feed together with the sender a producer publishes into.
    pub fn channel(table: impl Into<String>, buffer: usize) -> (mpsc::Sender<ChangeEvent>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self::new(table, receiver))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Next event, or `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }
}

/// Contract of the remote queryable data service.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    async fn query_rows(&self, query: &RowQuery) -> Result<Vec<Value>, GatewayError>;

    async fn subscribe(&self, table: &str) -> Result<ChangeFeed, GatewayError>;
}

/// Table names the gateway reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTables {
    pub content: String,
    pub settings: String,
}

impl Default for GatewayTables {
    fn default() -> Self {
        Self {
            content: "site_content".to_string(),
            settings: "site_settings".to_string(),
        }
    }
}

/// Typed boundary over a [`RemoteDataService`].
#[derive(Clone)]
pub struct ContentGateway {
    service: Arc<dyn RemoteDataService>,
    tables: GatewayTables,
}

impl ContentGateway {
    pub fn new(service: Arc<dyn RemoteDataService>, tables: GatewayTables) -> Self {
        Self { service, tables }
    }

    pub fn tables(&self) -> &GatewayTables {
        &self.tables
    }

    /// Active content rows, optionally scoped to one page.
    pub async fn fetch_content(
        &self,
        page_key: Option<&str>,
    ) -> Result<Vec<ContentRow>, GatewayError> {
        let mut query = RowQuery::table(&self.tables.content).eq("is_active", true);
        if let Some(page_key) = page_key {
            query = query.eq("page_key", page_key);
        }
        let rows = self.service.query_rows(&query).await?;
        let parsed = parse_rows(&self.tables.content, rows)
            .into_iter()
            .filter_map(|row| match row {
                RemoteRow::Content(row) => Some(row),
                RemoteRow::Settings(_) => {
                    shape_error(&self.tables.content, "settings row in content table");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(table = %self.tables.content, page_key, rows = parsed.len(), "Fetched content rows");
        Ok(parsed)
    }

    /// Every settings row.
    pub async fn fetch_settings(&self) -> Result<Vec<SettingsRow>, GatewayError> {
        let query = RowQuery::table(&self.tables.settings);
        let rows = self.service.query_rows(&query).await?;
        let parsed = parse_rows(&self.tables.settings, rows)
            .into_iter()
            .filter_map(|row| match row {
                RemoteRow::Settings(row) => Some(row),
                RemoteRow::Content(_) => {
                    shape_error(&self.tables.settings, "content row in settings table");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(table = %self.tables.settings, rows = parsed.len(), "Fetched settings rows");
        Ok(parsed)
    }

    pub async fn subscribe_content(&self) -> Result<ChangeFeed, GatewayError> {
        self.service.subscribe(&self.tables.content).await
    }

    pub async fn subscribe_settings(&self) -> Result<ChangeFeed, GatewayError> {
        self.service.subscribe(&self.tables.settings).await
    }

    /// Change feed for an arbitrary table, used by the change monitor.
    pub async fn subscribe(&self, table: &str) -> Result<ChangeFeed, GatewayError> {
        self.service.subscribe(table).await
    }
}

fn parse_rows(table: &str, rows: Vec<Value>) -> Vec<RemoteRow> {
    rows.iter()
        .filter_map(|row| match RemoteRow::parse(table, row) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                shape_error(table, &err.to_string());
                None
            }
        })
        .collect()
}

fn shape_error(table: &str, reason: &str) {
    counter!(METRIC_SHAPE_ERROR, "table" => table.to_string()).increment(1);
    warn!(table, reason, "Skipping malformed remote row");
}
