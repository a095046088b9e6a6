use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::error::{FetchError, Result, ScrapeError};

/// Source of product page HTML.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Plain GET over a shared connection pool, rotating user agents per request.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(user_agents: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Config(format!("http client: {}", e)))?;
        Ok(HttpFetcher { client, user_agents })
    }

    fn pick_user_agent(&self) -> &str {
        let i = rand::rng().random_range(0..self.user_agents.len());
        &self.user_agents[i]
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
