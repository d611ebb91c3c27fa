//! Thin async client for the gateway's HTTP API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{RequestBuilder, Url};
use serde_json::{Value, json};

/// Gateway API client. Every call returns the decoded JSON body.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base: Url,
}

impl GatewayClient {
    pub fn new(server: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(server).with_context(|| format!("invalid server URL: {server}"))?;
        if base.cannot_be_a_base() {
            bail!("server URL cannot be used as a base: {server}");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("server URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await.context("request to gateway failed")?;
        let status = response.status();
        let bytes = response.bytes().await.context("failed to read gateway response")?;
        let body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };

        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "gateway call succeeded");
            return Ok(body);
        }

        let message = body["message"].as_str().unwrap_or("no details");
        match body["retry_after"].as_u64() {
            Some(secs) => bail!("{} ({status}): {message}; retry after {secs}s", body["error"].as_str().unwrap_or("error")),
            None => bail!("{} ({status}): {message}", body["error"].as_str().unwrap_or("error")),
        }
    }

    pub async fn crawl(&self, url: &str, use_cache: bool) -> Result<Value> {
        let endpoint = self.endpoint(&["crawl"])?;
        self.send(self.http.post(endpoint).json(&json!({ "url": url, "use_cache": use_cache })))
            .await
    }

    pub async fn generate(&self, prompt: &str, use_cache: bool) -> Result<Value> {
        let endpoint = self.endpoint(&["generate"])?;
        self.send(self.http.post(endpoint).json(&json!({ "prompt": prompt, "use_cache": use_cache })))
            .await
    }

    pub async fn cag(
        &self, url: &str, query: &str, user_id: Option<&str>, include_history: bool, use_cache: bool,
    ) -> Result<Value> {
        let endpoint = self.endpoint(&["cag"])?;
        let body = json!({
            "url": url,
            "query": query,
            "user_id": user_id,
            "use_cache": use_cache,
            "include_history": include_history,
        });
        self.send(self.http.post(endpoint).json(&body)).await
    }

    pub async fn add_history(&self, user_id: &str, role: &str, message: &str) -> Result<Value> {
        let endpoint = self.endpoint(&["history", "add"])?;
        let body = json!({ "user_id": user_id, "role": role, "message": message });
        self.send(self.http.post(endpoint).json(&body)).await
    }

    pub async fn history(&self, user_id: &str) -> Result<Value> {
        let endpoint = self.endpoint(&["history", "get", user_id])?;
        self.send(self.http.get(endpoint)).await
    }

    pub async fn clear_history(&self, user_id: &str) -> Result<Value> {
        let endpoint = self.endpoint(&["history", "clear", user_id])?;
        self.send(self.http.delete(endpoint)).await
    }

    pub async fn health(&self) -> Result<Value> {
        let endpoint = self.endpoint(&["admin", "health", "detailed"])?;
        self.send(self.http.get(endpoint)).await
    }
}
