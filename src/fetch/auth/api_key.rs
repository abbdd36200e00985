use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

use crate::fetch::client::HttpClient;

/// An [`HttpClient`] wrapper that injects the feed API key as an HTTP header.
///
/// `header_name` is the header field to set; providers vary between
/// `x-api-key`, `Authorization` and their own inventions, so it is
/// configuration rather than a constant. Name and key are parsed once at
/// construction; the request path cannot fail on them.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> ApiKey<C> {
    /// Fails when `header_name` is not a legal HTTP header name or the key
    /// cannot be carried as a header value.
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .with_context(|| format!("invalid auth header name {header_name:?}"))?;
        let key = HeaderValue::from_str(key).context("API key is not a valid header value")?;

        Ok(Self {
            inner,
            header_name,
            key,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(&self.header_name, self.key.clone());
        self.inner.execute(req).await
    }
}
