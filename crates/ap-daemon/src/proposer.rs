//! HTTP client for the reasoning provider.

use std::time::Duration;

use ap_action::ProposedAction;
use ap_engine::{ActionProposer, ProposerContext, ProviderError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

/// POSTs the aggregated context to a provider endpoint.
///
/// `generate_actions` sends `{context, desired_count}` and accepts either a
/// bare array of proposals or `{"actions": [...]}`. `observe` sends
/// `{context}` and accepts `{"observation": "..."}` or a plain text body.
pub struct HttpProposer {
    client: reqwest::Client,
    endpoint: String,
    observe_endpoint: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProposalsBody {
    Bare(Vec<ProposedAction>),
    Wrapped { actions: Vec<ProposedAction> },
}

impl HttpProposer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            observe_endpoint: None,
            api_key: None,
            timeout,
        })
    }

    pub fn with_observe_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.observe_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn post(&self, url: &str, body: &Value) -> Result<String, ProviderError> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(format!("no answer within {}s", self.timeout.as_secs()))
            } else {
                ProviderError::Upstream(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(format!("body not received within {}s", self.timeout.as_secs()))
            } else {
                ProviderError::Upstream(format!("failed reading response: {}", e))
            }
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(text.trim().to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Upstream(format!("HTTP {}: {}", status, text.trim())));
        }
        Ok(text)
    }
}

#[async_trait]
impl ActionProposer for HttpProposer {
    async fn generate_actions(
        &self,
        context: &ProposerContext,
        desired_count: usize,
    ) -> Result<Vec<ProposedAction>, ProviderError> {
        let body = json!({ "context": context, "desired_count": desired_count });
        let text = self.post(&self.endpoint, &body).await?;
        let proposals = parse_proposals(&text)?;
        tracing::debug!(count = proposals.len(), "proposer answered");
        Ok(proposals)
    }

    async fn observe(&self, context: &ProposerContext) -> Result<String, ProviderError> {
        let url = self.observe_endpoint.as_deref().unwrap_or(&self.endpoint);
        let text = self.post(url, &json!({ "context": context })).await?;
        Ok(parse_observation(&text))
    }
}

fn parse_proposals(body: &str) -> Result<Vec<ProposedAction>, ProviderError> {
    match serde_json::from_str::<ProposalsBody>(body) {
        Ok(ProposalsBody::Bare(actions)) | Ok(ProposalsBody::Wrapped { actions }) => Ok(actions),
        Err(e) => Err(ProviderError::InvalidResponse(e.to_string())),
    }
}

fn parse_observation(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("observation")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
