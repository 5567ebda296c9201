//! Outbound HTTP for every upstream service.
//!
//! The pipeline talks to a [`Transport`] so tests can swap in canned
//! responses. [`UreqTransport`] is the real thing: a blocking `ureq` agent
//! driven from tokio's blocking pool.

pub mod jsonp;

use crate::config::HttpSettings;
use crate::error::{FinderError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the body as text.
    async fn get_text(&self, url: &Url) -> Result<String>;

    /// GET `url` and parse the body as JSON.
    async fn get_json(&self, url: &Url) -> Result<Value> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| FinderError::MalformedResponse(format!("{}: {}", url, e)))
    }
}

/// Production transport backed by a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(settings: &HttpSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn get_text(&self, url: &Url) -> Result<String> {
        let agent = self.agent.clone();
        let url = url.to_string();
        debug!(%url, "GET");

        tokio::task::spawn_blocking(move || match agent.get(&url).call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| FinderError::MalformedResponse(format!("{}: {}", url, e))),
            Err(ureq::Error::Status(code, _)) => Err(FinderError::NetworkFailure(format!(
                "{} returned HTTP {}",
                url, code
            ))),
            Err(e) => Err(FinderError::NetworkFailure(e.to_string())),
        })
        .await
        .map_err(|e| FinderError::NetworkFailure(format!("transport task failed: {}", e)))?
    }
}

/// Build `base?k=v&...` with proper percent-encoding.
pub fn endpoint_url<K, V>(base: &str, params: &[(K, V)]) -> Result<Url>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let parsed = if params.is_empty() {
        Url::parse(base)
    } else {
        Url::parse_with_params(base, params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
    };
    parsed.map_err(|e| FinderError::Config(format!("invalid endpoint '{}': {}", base, e)))
}
