use std::time::Duration;

use async_trait::async_trait;
use pedimentos_core::error::{DownstreamError, PedimentoError, Result};
use pedimentos_core::orchestrator::DownstreamInvoker;
use pedimentos_core::{CompletionProcessor, PedimentoKey, PrimaryRequest, ServiceKind};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Calls `POST {base}/services/{endpoint}` for a dependent service.
#[derive(Clone)]
pub struct HttpServiceInvoker {
    http: reqwest::Client,
    base_url: String,
}

impl HttpServiceInvoker {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PedimentoError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl DownstreamInvoker for HttpServiceInvoker {
    async fn invoke(
        &self,
        kind: ServiceKind,
        key: &PedimentoKey,
    ) -> std::result::Result<(), DownstreamError> {
        let endpoint = kind
            .endpoint()
            .ok_or_else(|| DownstreamError::new(format!("{kind} has no service endpoint")))?;
        let url = format!(
            "{}/services/{endpoint}",
            self.base_url.trim_end_matches('/')
        );
        let body = json!({
            "pedimento": key.pedimento_id,
            "organizacion": key.organization_id,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DownstreamError::new(format!("{kind} request failed: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            debug!(kind = %kind, pedimento = %key, "dependent service accepted");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        warn!(kind = %kind, pedimento = %key, status = status.as_u16(), "dependent service failed");
        Err(DownstreamError::with_status(
            status.as_u16(),
            format!("{kind} returned {status}: {text}"),
        ))
    }
}

/// Forwards the primary request to the external pedimento-completo processor.
#[derive(Clone)]
pub struct HttpCompletionProcessor {
    http: reqwest::Client,
    url: String,
}

impl HttpCompletionProcessor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PedimentoError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CompletionProcessor for HttpCompletionProcessor {
    async fn process(&self, request: &PrimaryRequest) -> Result<Value> {
        let resp = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| PedimentoError::Processor(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PedimentoError::Processor(format!("{status}: {text}")));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| PedimentoError::Processor(format!("unreadable result: {e}")))
    }
}
