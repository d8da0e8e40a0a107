//! Workers AI REST client, optionally routed through an AI gateway.

use async_trait::async_trait;
use futures::StreamExt;
use palisade_core::{ChatMessage, GatewayError, GatewayRoute};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use crate::backend::{InferenceBackend, InferenceRequest, RawResponse};

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_GATEWAY_BASE: &str = "https://gateway.ai.cloudflare.com/v1";

const SKIP_CACHE_HEADER: &str = "cf-aig-skip-cache";
const CACHE_TTL_HEADER: &str = "cf-aig-cache-ttl";

#[derive(Serialize)]
struct RunBody<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

/// Client for the hosted model runner.
pub struct WorkersAiClient {
    client: Client,
    account_id: String,
    api_token: String,
    api_base: String,
    gateway_base: String,
}

impl WorkersAiClient {
    /// Creates a client for the given account using the public endpoints.
    pub fn new(account_id: &str, api_token: &str) -> Self {
        Self {
            client: Client::new(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            gateway_base: DEFAULT_GATEWAY_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_gateway_base(mut self, base: &str) -> Self {
        self.gateway_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Returns the run URL for `model`, through the gateway when one is set.
    pub fn endpoint(&self, model: &str, gateway: Option<&GatewayRoute>) -> String {
        match gateway {
            Some(gw) => format!(
                "{}/{}/{}/workers-ai/{}",
                self.gateway_base, self.account_id, gw.id, model
            ),
            None => format!("{}/accounts/{}/ai/run/{}", self.api_base, self.account_id, model),
        }
    }
}

#[async_trait]
impl InferenceBackend for WorkersAiClient {
    async fn run(&self, request: InferenceRequest) -> Result<RawResponse, GatewayError> {
        let url = self.endpoint(&request.model, request.gateway.as_ref());
        debug!(%url, messages = request.messages.len(), "Running inference");

        let body = RunBody {
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: request.stream,
        };

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body);
        if let Some(gw) = &request.gateway {
            if gw.skip_cache {
                builder = builder.header(SKIP_CACHE_HEADER, "true");
            }
            if let Some(ttl) = gw.cache_ttl {
                builder = builder.header(CACHE_TTL_HEADER, ttl.to_string());
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Inference(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Inference endpoint returned {}: {}", status, body);
            return Err(GatewayError::Upstream { status, body });
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| GatewayError::Inference(e.to_string())));

        Ok(RawResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
