//! REST client wrapper around reqwest.

use crate::error::RestError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client bound to one base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for `base_url` (e.g. "https://api.probit.com/api/exchange/v1").
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path?query` and decode the JSON body.
    ///
    /// `query` is an already encoded query string without the leading '?'.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<T, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(url = %url, "GET request");

        let request = with_headers(self.client.get(&url), headers);
        let response = request.send().await?;
        handle_response(response).await
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<T, RestError> {
        let url = self.build_url(path, None);
        tracing::debug!(url = %url, "POST request");

        let request = with_headers(self.client.post(&url).json(body), headers);
        let response = request.send().await?;
        handle_response(response).await
    }

    /// POST a JSON body with HTTP basic credentials (token endpoints).
    pub async fn post_json_basic_auth<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        username: &str,
        password: &str,
    ) -> Result<T, RestError> {
        let url = self.build_url(path, None);
        tracing::debug!(url = %url, "POST request (basic auth)");

        let request = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .json(body);
        let response = request.send().await?;
        handle_response(response).await
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }
}

fn with_headers(mut request: RequestBuilder, headers: Option<&[(&str, &str)]>) -> RequestBuilder {
    if let Some(hdrs) = headers {
        for (key, value) in hdrs {
            request = request.header(*key, *value);
        }
    }
    request
}

/// Retry-After in seconds, converted to milliseconds.
fn retry_after_ms(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RestError::RateLimited {
            retry_after_ms: retry_after_ms(&response),
        });
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(RestError::HttpError {
            status: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(body = %body, error = %e, "Failed to parse response");
        RestError::Parse(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_no_query() {
        let client = RestClient::with_default_timeout("https://api.probit.com/api/exchange/v1").unwrap();
        assert_eq!(
            client.build_url("/balance", None),
            "https://api.probit.com/api/exchange/v1/balance"
        );
    }

    #[test]
    fn test_build_url_with_query() {
        let client = RestClient::with_default_timeout("https://api.example.com").unwrap();
        assert_eq!(
            client.build_url("/order_book", Some("market_id=ETH-USDT")),
            "https://api.example.com/order_book?market_id=ETH-USDT"
        );
    }

    #[test]
    fn test_build_url_strips_trailing_slash_and_empty_query() {
        let client = RestClient::with_default_timeout("https://api.example.com/").unwrap();
        assert_eq!(
            client.build_url("/market", Some("")),
            "https://api.example.com/market"
        );
    }
}
