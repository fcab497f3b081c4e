//! In-process remote data service.
//!
//! Keeps tables as ordered row lists and emits a [`ChangeEvent`] to every live
//! subscriber of a table on each mutation. Used by tests and local demos;
//! failures can be injected per service or per table.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::gateway::{ChangeFeed, GatewayError, RemoteDataService, RowQuery};
use crate::cache::lock::mutex_lock;
use crate::domain::change::ChangeEvent;

const SOURCE: &str = "infra::remote::memory";
const FEED_BUFFER: usize = 64;

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    feeds: HashMap<String, Vec<mpsc::Sender<ChangeEvent>>>,
    failing: bool,
    failing_subscriptions: HashSet<String>,
    queries: usize,
}

#[derive(Default)]
pub struct InMemoryDataService {
    state: Mutex<State>,
}

impl InMemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows of `table` without emitting change events.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = mutex_lock(&self.state, SOURCE, "seed");
        state.tables.insert(table.to_string(), rows);
    }

    pub fn insert(&self, table: &str, row: Value) {
        let mut state = mutex_lock(&self.state, SOURCE, "insert");
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        state.emit(ChangeEvent::insert(table, row));
    }

    /// Replace the row sharing `row`'s `id`. Returns `false` when none matches.
    pub fn update(&self, table: &str, row: Value) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "update");
        let Some(id) = row.get("id").cloned() else {
            return false;
        };
        let Some(slot) = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|existing| existing.get("id") == Some(&id)))
        else {
            return false;
        };
        let previous = std::mem::replace(slot, row.clone());
        state.emit(ChangeEvent::update(table, Some(previous), row));
        true
    }

    /// Remove the row with the given `id`. Returns `false` when none matches.
    pub fn delete(&self, table: &str, id: &Value) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "delete");
        let Some(rows) = state.tables.get_mut(table) else {
            return false;
        };
        let Some(index) = rows.iter().position(|row| row.get("id") == Some(id)) else {
            return false;
        };
        let previous = rows.remove(index);
        state.emit(ChangeEvent::delete(table, previous));
        true
    }

    /// Deliver `event` to subscribers without touching stored rows.
    pub fn emit(&self, event: ChangeEvent) {
        mutex_lock(&self.state, SOURCE, "emit").emit(event);
    }

    /// Make every query and subscription fail until reset.
    pub fn set_failing(&self, failing: bool) {
        mutex_lock(&self.state, SOURCE, "set_failing").failing = failing;
    }

    pub fn fail_subscriptions_to(&self, table: &str) {
        mutex_lock(&self.state, SOURCE, "fail_subscriptions_to")
            .failing_subscriptions
            .insert(table.to_string());
    }

    /// Number of open change feeds for `table`.
    pub fn subscriber_count(&self, table: &str) -> usize {
        let state = mutex_lock(&self.state, SOURCE, "subscriber_count");
        state
            .feeds
            .get(table)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn query_count(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "query_count").queries
    }
}

impl State {
    fn emit(&mut self, event: ChangeEvent) {
        let Some(senders) = self.feeds.get_mut(&event.table) else {
            return;
        };
        senders.retain(|tx| !tx.is_closed());
        for tx in senders.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(table = %event.table, "Change feed full; dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        debug!(
            table = %event.table,
            operation = %event.operation,
            subscribers = senders.len(),
            "Change event emitted"
        );
    }
}

#[async_trait]
impl RemoteDataService for InMemoryDataService {
    async fn query_rows(&self, query: &RowQuery) -> Result<Vec<Value>, GatewayError> {
        let mut state = mutex_lock(&self.state, SOURCE, "query_rows");
        state.queries += 1;
        if state.failing {
            return Err(GatewayError::unavailable("in-memory service set to fail"));
        }
        Ok(state
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default())
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeFeed, GatewayError> {
        let mut state = mutex_lock(&self.state, SOURCE, "subscribe");
        if state.failing || state.failing_subscriptions.contains(table) {
            return Err(GatewayError::unavailable(format!(
                "subscriptions to `{table}` are failing"
            )));
        }
        let (tx, feed) = ChangeFeed::channel(table, FEED_BUFFER);
        state.feeds.entry(table.to_string()).or_default().push(tx);
        Ok(feed)
    }
}
