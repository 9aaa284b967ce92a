//! Blocking HTTP client for the daemon API.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use tradesync_core::TradesyncConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Client {
    base: String,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl Client {
    /// Use `--server` when given, otherwise the bind address in config.yaml.
    pub fn connect(server: Option<&str>) -> Result<Self> {
        let base = match server {
            Some(url) => url.to_string(),
            None => {
                let config = TradesyncConfig::load().context("failed to load config.yaml")?;
                format!("http://{}", config.server.bind)
            }
        };
        Ok(Self::new(base))
    }

    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { base, agent }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.agent.get(&url).call();
        self.decode(&url, response)
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = self.url(path);
        let response = self.agent.post(&url).send_json(body.clone());
        self.decode(&url, response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Result<ureq::Response, ureq::Error>,
    ) -> Result<T> {
        match response {
            Ok(response) => response
                .into_json::<T>()
                .with_context(|| format!("unexpected response body from {url}")),
            Err(ureq::Error::Status(code, response)) => {
                let detail = response
                    .into_json::<ErrorBody>()
                    .map(|body| body.error)
                    .unwrap_or_else(|_| "no error detail".to_string());
                bail!("daemon answered {code}: {detail}")
            }
            Err(ureq::Error::Transport(err)) => Err(anyhow!(err)).with_context(|| {
                format!(
                    "could not reach the daemon at {} (is `tradesync serve` running?)",
                    self.base
                )
            }),
        }
    }
}
