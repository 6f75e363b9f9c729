use async_trait::async_trait;
use std::time::Duration;

use crate::error::SettlementError;
use crate::traits::{CallbackChannel, CallbackResponse, LnurlStatus};

/// [`CallbackChannel`] over HTTPS.
#[derive(Clone)]
pub struct HttpCallbackChannel {
    client: reqwest::Client,
}

impl HttpCallbackChannel {
    pub fn new(timeout: Duration) -> Result<Self, SettlementError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read(response: reqwest::Response) -> CallbackResponse {
        let http_status = response.status().as_u16();
        // Non-JSON bodies are kept as `None`; the caller decides on status alone.
        let body = response.json::<LnurlStatus>().await.ok();
        tracing::debug!(http_status, body = ?body, "callback response");
        CallbackResponse { http_status, body }
    }
}

#[async_trait]
impl CallbackChannel for HttpCallbackChannel {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<CallbackResponse, SettlementError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;
        Ok(Self::read(response).await)
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<CallbackResponse, SettlementError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;
        Ok(Self::read(response).await)
    }
}
