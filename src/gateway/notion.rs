//! Notion REST API gateway.
//!
//! Implements [`SourceGateway`] over `reqwest` against the public v1 API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | search | `POST /v1/search` |
//! | list_blocks | `GET /v1/blocks/{id}/children` |
//! | retrieve_page | `GET /v1/pages/{id}` |
//!
//! The integration token is read from the environment variable named by
//! `[notion].token_env` (default `NOTION_TOKEN`). A `.env` file in the
//! working directory is honored.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::NotionConfig;
use crate::models::{Block, RawRecord};

use super::{GatewayError, SearchPage, SearchRequest, SourceGateway};

/// HTTP client for one Notion integration.
pub struct NotionGateway {
    client: reqwest::Client,
    api_base: String,
    token: String,
    api_version: String,
}

impl NotionGateway {
    pub fn new(config: &NotionConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            api_version: config.api_version.clone(),
        })
    }

    /// Build a gateway with the token taken from the configured env var.
    pub fn from_env(config: &NotionConfig) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let token = std::env::var(&config.token_env).with_context(|| {
            format!("{} environment variable is required", config.token_env)
        })?;
        Self::new(config, token)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let resp = builder.send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// JSON body for `POST /v1/search`.
pub fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({ "page_size": request.page_size });
    if let Some(q) = request.query.as_deref().filter(|q| !q.is_empty()) {
        body["query"] = json!(q);
    }
    if let Some(kind) = request.filter {
        body["filter"] = json!({ "property": "object", "value": kind.as_str() });
    }
    if let Some(ref cursor) = request.cursor {
        body["start_cursor"] = json!(cursor);
    }
    body
}

#[derive(Deserialize)]
struct BlockList {
    #[serde(default)]
    results: Vec<Value>,
}

/// Decode a block listing, skipping blocks that do not parse.
pub fn decode_blocks(value: Value) -> Result<Vec<Block>, GatewayError> {
    let list: BlockList =
        serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
    Ok(list
        .results
        .into_iter()
        .filter_map(|b| serde_json::from_value(b).ok())
        .collect())
}

#[async_trait]
impl SourceGateway for NotionGateway {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, GatewayError> {
        let builder = self
            .request(reqwest::Method::POST, "/search")
            .json(&search_body(request));
        let value = self.send_json(builder).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>, GatewayError> {
        let builder = self
            .request(
                reqwest::Method::GET,
                &format!("/blocks/{}/children", page_id),
            )
            .query(&[("page_size", "100")]);
        let value = self.send_json(builder).await?;
        decode_blocks(value)
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<RawRecord, GatewayError> {
        let builder = self.request(reqwest::Method::GET, &format!("/pages/{}", page_id));
        let value = match self.send_json(builder).await {
            Err(GatewayError::Status { status: 404, .. }) => {
                return Err(GatewayError::NotFound(page_id.to_string()))
            }
            other => other?,
        };
        serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
