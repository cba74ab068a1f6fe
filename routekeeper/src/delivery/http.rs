//! HTTP implementation of [`DeliveryApi`] using `reqwest`.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::api::{
    decode_envelope, DeliveryApi, DeliveryApiError, LocationReport, StatusUpdateRequest,
};
use super::record::DeliveryTrackingRecord;

/// Default timeout for a single API request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivery API client over HTTP.
///
/// Uses a reusable `reqwest::Client` with connection pooling and timeouts.
pub struct HttpDeliveryApi {
    /// Base URL, without a trailing slash.
    base_url: String,
    http: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpDeliveryApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeliveryApiError> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryApiError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, id: &str, suffix: &str) -> String {
        format!("{}/delivery/{}{}", self.base_url, id, suffix)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, DeliveryApiError> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryApiError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| DeliveryApiError::Unreachable(e.to_string()))?;

        tracing::debug!(status, bytes = body.len(), "Delivery API response");
        decode_envelope(status, &body)
    }
}

impl DeliveryApi for HttpDeliveryApi {
    fn get_delivery<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryTrackingRecord, DeliveryApiError>> {
        async move {
            let request = self.http.get(self.url(id, ""));
            self.send::<DeliveryTrackingRecord>(request)
                .await?
                .ok_or_else(|| DeliveryApiError::Decode("response has no delivery".to_string()))
        }
        .boxed()
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
        async move {
            let builder = self.http.put(self.url(id, "/status")).json(request);
            self.send::<Value>(builder).await.map(|_| ())
        }
        .boxed()
    }

    fn update_location<'a>(
        &'a self,
        id: &'a str,
        report: &'a LocationReport,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
        async move {
            let builder = self.http.put(self.url(id, "/location")).json(report);
            self.send::<Value>(builder).await.map(|_| ())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = HttpDeliveryApi::new("https://api.example.com/v1/").unwrap();
        assert_eq!(api.base_url(), "https://api.example.com/v1");
        assert_eq!(
            api.url("d-1", "/status"),
            "https://api.example.com/v1/delivery/d-1/status"
        );
        assert_eq!(api.url("d-1", ""), "https://api.example.com/v1/delivery/d-1");
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let api = HttpDeliveryApi::with_timeout("http://127.0.0.1:9", Duration::from_secs(2))
            .unwrap();
        let err = api.get_delivery("d-1").await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err:?}");
    }
}
