use async_trait::async_trait;

use crate::fetch::client::HttpClient;

/// An [`HttpClient`] wrapper that appends the feed API key as a URL query
/// parameter, the auth style of `?key=...` providers.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: String, key: String) -> Self {
        Self {
            inner,
            param_name,
            key,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}
