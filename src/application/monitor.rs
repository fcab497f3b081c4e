//! Change monitor.
//!
//! Watches remote tables for records entering a target state (a blog post
//! becoming `published`, for instance) and forwards each such record to an
//! external [`Notifier`] after a short settling delay. Delivery is best
//! effort: failures are logged and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::change::ChangeEvent;
use crate::domain::types::ChangeOperation;

use super::gateway::{ChangeFeed, ContentGateway, GatewayError};
use super::tasks::TaskSet;

pub const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_secs(1);

/// A field transition that should trigger a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRule {
    pub table: String,
    pub field: String,
    pub target: Value,
    /// Treat an update whose previous row lacks `field` as a transition.
    ///
    /// Feeds that only report the primary key of the old row need this.
    #[serde(default)]
    pub notify_without_previous: bool,
}

impl WatchRule {
    pub fn new(table: impl Into<String>, field: impl Into<String>, target: impl Into<Value>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            target: target.into(),
            notify_without_previous: false,
        }
    }

    pub fn notify_without_previous(mut self, enabled: bool) -> Self {
        self.notify_without_previous = enabled;
        self
    }

    /// Whether `event` moves a record into the target state.
    ///
    /// Inserts qualify when the new row already holds the target value.
    /// Updates qualify when the previous row carried the field with a
    /// different value. An update that does not report the previous value
    /// qualifies only under `notify_without_previous`. Deletes never qualify.
    pub fn should_notify(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        let after = event.new_field(&self.field);
        if after != Some(&self.target) {
            return false;
        }
        match event.operation {
            ChangeOperation::Insert => true,
            ChangeOperation::Update => match event.previous_field(&self.field) {
                Some(before) => before != &self.target,
                None => self.notify_without_previous,
            },
            ChangeOperation::Delete => false,
        }
    }
}

impl Default for WatchRule {
    fn default() -> Self {
        Self::new("blog_posts", "status", "published")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub rules: Vec<WatchRule>,
    pub notify_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rules: vec![WatchRule::default()],
            notify_delay: DEFAULT_NOTIFY_DELAY,
        }
    }
}

/// Response body of the external notification function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyReceipt {
    pub success: bool,
    pub sent: u64,
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notifier transport error: {0}")]
    Transport(String),
    #[error("notifier returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("notifier response could not be decoded: {0}")]
    Decode(String),
}

impl NotifierError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// External notification function receiving the full record.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &Value) -> Result<NotifyReceipt, NotifierError>;
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to subscribe to `{table}`: {source}")]
    Subscribe {
        table: String,
        #[source]
        source: GatewayError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
}

pub struct ChangeMonitor {
    gateway: ContentGateway,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    running: Mutex<Option<TaskSet>>,
}

impl ChangeMonitor {
    pub fn new(gateway: ContentGateway, notifier: Arc<dyn Notifier>, config: MonitorConfig) -> Self {
        Self {
            gateway,
            notifier,
            config,
            running: Mutex::new(None),
        }
    }

    /// Subscribe to every watched table.
    ///
    /// Starting an active monitor opens no additional subscription. If any
    /// subscription fails, the ones already opened are closed again.
    pub async fn start_monitoring(&self) -> Result<StartOutcome, MonitorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Change monitor already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        let mut tasks = TaskSet::new();
        for rule in &self.config.rules {
            let feed = self
                .gateway
                .subscribe(&rule.table)
                .await
                .map_err(|source| {
                    error!(table = %rule.table, error = %source, "Change monitor subscription failed");
                    MonitorError::Subscribe {
                        table: rule.table.clone(),
                        source,
                    }
                })?;
            tasks.spawn(watch_feed(
                feed,
                rule.clone(),
                self.notifier.clone(),
                self.config.notify_delay,
            ));
        }

        info!(rules = tasks.len(), "Change monitoring started");
        *running = Some(tasks);
        Ok(StartOutcome::Started)
    }

    /// Close every subscription. Returns `false` when the monitor was not active.
    pub async fn stop_monitoring(&self) -> bool {
        match self.running.lock().await.take() {
            Some(mut tasks) => {
                tasks.abort_all();
                info!("Change monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn watch_feed(
    mut feed: ChangeFeed,
    rule: WatchRule,
    notifier: Arc<dyn Notifier>,
    delay: Duration,
) {
    while let Some(event) = feed.next().await {
        if !rule.should_notify(&event) {
            debug!(table = %event.table, operation = %event.operation, "Change ignored");
            continue;
        }
        info!(
            table = %event.table,
            field = %rule.field,
            "Record reached watched state; notifying"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        dispatch(notifier.as_ref(), &event.new_row).await;
    }
    debug!(table = feed.table(), "Monitored change feed closed");
}

async fn dispatch(notifier: &dyn Notifier, record: &Value) {
    match notifier.notify(record).await {
        Ok(receipt) if receipt.success => {
            metrics::counter!("vitrine_notify_total", "outcome" => "sent").increment(1);
            info!(sent = receipt.sent, message = ?receipt.message, "Notification sent");
        }
        Ok(receipt) => {
            metrics::counter!("vitrine_notify_total", "outcome" => "rejected").increment(1);
            warn!(message = ?receipt.message, "Notifier reported failure");
        }
        Err(err) => {
            metrics::counter!("vitrine_notify_total", "outcome" => "error").increment(1);
            error!(error = %err, "Notification failed");
        }
    }
}
