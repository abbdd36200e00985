use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam between the polling loop and the network. Auth decorators wrap an
/// inner client and mutate the request on the way through; tests substitute
/// an implementation serving canned feed bytes.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl HttpClient for Box<dyn HttpClient> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
