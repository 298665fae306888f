mod client;
mod basic;
pub mod auth;
#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpClient;
pub use basic::BasicClient;

use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

/// Executes `req` and decodes a JSON body, treating any non-2xx status
/// as a failure.
pub async fn fetch_json<C: HttpClient + ?Sized>(
    client: &C,
    req: reqwest::Request,
) -> Result<Value, FetchError> {
    let method = req.method().clone();
    let url = req.url().clone();

    let resp = client.execute(req).await?;
    let status = resp.status();
    debug!(%method, %url, %status, "Live ETA response");
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
