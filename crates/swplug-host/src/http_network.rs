//! Real network access through `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use swplug_core::error::SwplugError;
use swplug_core::request::{Request, Response};
use swplug_core::scope::Network;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swplug/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        debug!(method = %request.method, url = %request.url, "HTTP fetch");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| SwplugError::Network(format!("{}: {e}", request.url)))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let url = resp.url().to_string();
        let body = resp.bytes().await?;

        let mut response = Response::new(status, body).with_url(url);
        response.headers = headers;
        Ok(response)
    }
}

impl std::fmt::Debug for HttpNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNetwork").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let network = HttpNetwork::with_timeout(Duration::from_millis(500)).unwrap();
        let result = network.fetch(&Request::get("http://127.0.0.1:9/")).await;
        assert!(result.is_err());
    }
}
