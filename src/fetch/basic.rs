use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::client::HttpClient;

/// User-Agent sent with every upstream request, so feed providers can tell
/// this poller apart from browser traffic.
const USER_AGENT: &str = concat!("transit-tracker/", env!("CARGO_PKG_VERSION"));

/// Plain [`HttpClient`] over a shared `reqwest::Client` with the timeouts
/// a 15-second polling cadence can live with.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
