use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a prepared HTTP request. Feed refreshes go through this seam so
/// tests can serve canned responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
