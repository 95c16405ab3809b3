use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, Request, Response};

/// Transport seam for every remote load (points CSV, region boundaries).
///
/// Tests and alternative transports only need to implement [`execute`];
/// [`get`] layers URL parsing and status checking on top.
///
/// [`execute`]: HttpClient::execute
/// [`get`]: HttpClient::get
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;

    /// Issues a GET and fails on any non-success status.
    async fn get(&self, url: &str) -> Result<Response> {
        let parsed: reqwest::Url = url
            .parse()
            .with_context(|| format!("Invalid source URL '{url}'"))?;
        let resp = self
            .execute(Request::new(Method::GET, parsed))
            .await
            .with_context(|| format!("Request to '{url}' failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("GET {url} returned status {status}: {body}"));
        }

        Ok(resp)
    }
}
