//! PostgREST-style HTTP data service.
//!
//! Rows are read with `GET {base}/{table}?column=eq.value`. The service has
//! no push channel, so change feeds are produced by polling the table and
//! diffing consecutive row sets by their `id` column.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::application::gateway::{ChangeFeed, GatewayError, RemoteDataService, RowQuery};
use crate::domain::change::ChangeEvent;

const FEED_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct RestOptions {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Clone)]
pub struct RestDataService {
    client: reqwest::Client,
    base_url: Url,
    poll_interval: Duration,
}

impl RestDataService {
    pub fn new(options: RestOptions) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .default_headers(auth_headers(options.api_key.as_deref())?)
            .build()
            .map_err(GatewayError::transport)?;

        let mut base_url = options.base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            poll_interval: options.poll_interval,
        })
    }

    fn table_url(&self, query: &RowQuery) -> Result<Url, GatewayError> {
        let mut url = self
            .base_url
            .join(&query.table)
            .map_err(|err| GatewayError::transport(format!("invalid table `{}`: {err}", query.table)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in &query.filters {
                pairs.append_pair(column, &format!("eq.{}", filter_literal(value)));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl RemoteDataService for RestDataService {
    async fn query_rows(&self, query: &RowQuery) -> Result<Vec<Value>, GatewayError> {
        let url = self.table_url(query)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(GatewayError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Vec<Value>>()
            .await
            .map_err(GatewayError::decode)
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeFeed, GatewayError> {
        let query = RowQuery::table(table);
        let baseline = self.query_rows(&query).await?;
        let (tx, feed) = ChangeFeed::channel(table, FEED_BUFFER);
        tokio::spawn(poll_table(self.clone(), query, baseline, tx));
        debug!(table, interval_ms = self.poll_interval.as_millis() as u64, "Polling change feed opened");
        Ok(feed)
    }
}

async fn poll_table(
    service: RestDataService,
    query: RowQuery,
    mut previous: Vec<Value>,
    tx: mpsc::Sender<ChangeEvent>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(service.poll_interval) => {}
        }
        let current = match service.query_rows(&query).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(table = %query.table, error = %err, "Change feed poll failed");
                continue;
            }
        };
        for event in diff_rows(&query.table, &previous, &current) {
            if tx.send(event).await.is_err() {
                debug!(table = %query.table, "Polling change feed closed");
                return;
            }
        }
        previous = current;
    }
    debug!(table = %query.table, "Polling change feed closed");
}

/// Change events turning `before` into `after`, keyed by each row's `id`.
///
/// Rows without an `id` cannot be tracked and are ignored.
pub fn diff_rows(table: &str, before: &[Value], after: &[Value]) -> Vec<ChangeEvent> {
    let before = index_by_id(before);
    let after = index_by_id(after);
    let mut events = Vec::new();

    for (id, row) in &after {
        match before.get(id) {
            None => events.push(ChangeEvent::insert(table, (*row).clone())),
            Some(previous) if previous != row => events.push(ChangeEvent::update(
                table,
                Some((*previous).clone()),
                (*row).clone(),
            )),
            Some(_) => {}
        }
    }
    for (id, row) in &before {
        if !after.contains_key(id) {
            events.push(ChangeEvent::delete(table, (*row).clone()));
        }
    }
    events
}

fn index_by_id(rows: &[Value]) -> BTreeMap<String, &Value> {
    rows.iter()
        .filter_map(|row| row.get("id").map(|id| (id.to_string(), row)))
        .collect()
}

fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn auth_headers(api_key: Option<&str>) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let apikey = HeaderValue::from_str(key)
            .map_err(|err| GatewayError::transport(format!("invalid api key header: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|err| GatewayError::transport(format!("invalid authorization header: {err}")))?;
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);
    }
    Ok(headers)
}
