use std::time::Duration;

use url::Url;

use crate::{
    errors::{RestError, RestResult},
    history::RawHistoryPoint,
    protocol::{parse_snapshot, Snapshot},
    types::{ExpiryDate, Range, RequestId, Symbol},
};

/// Thin wrapper over the collaborator REST endpoints: liveness, initial
/// snapshot, and historical series.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: Url, timeout: Duration) -> RestResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /health`. Success needs no body.
    pub async fn health(&self) -> RestResult<()> {
        let response = self.http.get(self.endpoint("/health")).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `GET /api/snapshot`, the full-state baseline loaded before the push
    /// channel attaches. Same body shape as a snapshot frame.
    pub async fn snapshot(&self) -> RestResult<Snapshot> {
        let response = self.http.get(self.endpoint("/api/snapshot")).send().await?;
        let value: serde_json::Value = Self::check(response).await?.json().await?;
        Ok(parse_snapshot(value)?)
    }

    /// `GET /api/history`. `request_id` tags the request so the caller can
    /// discard responses that resolve after a newer selection.
    pub async fn history(
        &self,
        symbol: &Symbol,
        expiry: &ExpiryDate,
        range: Range,
        request_id: RequestId,
    ) -> RestResult<Vec<RawHistoryPoint>> {
        let response = self
            .http
            .get(self.endpoint("/api/history"))
            .query(&[
                ("symbol", symbol.as_str()),
                ("expiry", expiry.as_str()),
                ("range", range.as_str()),
                ("reqId", &request_id.to_string()),
            ])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    async fn check(response: reqwest::Response) -> RestResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RestError::Http {
            status: status.as_u16(),
            body,
        })
    }
}
