//! HTTP adapter for the downstream notification function.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::application::monitor::{Notifier, NotifierError, NotifyReceipt};

/// Posts `{"record": <row>}` as JSON and decodes the function's receipt.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: Url,
}

impl HttpNotifier {
    pub fn new(url: Url, api_key: Option<&str>, timeout: Duration) -> Result<Self, NotifierError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(NotifierError::transport)?;
            headers.insert(AUTHORIZATION, bearer);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(NotifierError::transport)?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, record: &Value) -> Result<NotifyReceipt, NotifierError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "record": record }))
            .send()
            .await
            .map_err(NotifierError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifierError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let receipt = response
            .json::<NotifyReceipt>()
            .await
            .map_err(NotifierError::decode)?;
        debug!(url = %self.url, success = receipt.success, "Notifier responded");
        Ok(receipt)
    }
}
