mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use tracing::debug;

use crate::error::FetchError;

/// GETs `url` and returns the body. Non-2xx statuses are errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let parsed = url.parse().map_err(|_| FetchError::Url(url.to_string()))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let http = |source| FetchError::Http {
        url: url.to_string(),
        source,
    };
    let resp = client.execute(req).await.map_err(http)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = resp.bytes().await.map_err(http)?;
    debug!(url, bytes = bytes.len(), "fetched");
    Ok(bytes.to_vec())
}

/// Whether `source` names a remote resource rather than a local path.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(skip(client), fields(source = %source))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>, FetchError> {
    if is_remote(source) {
        fetch_bytes(client, source).await
    } else {
        tokio::fs::read(source).await.map_err(|e| FetchError::Io {
            path: source.to_string(),
            source: e,
        })
    }
}
