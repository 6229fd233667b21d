//! Common utilities for the Hetzner Cloud API client
//!
//! Provides the authenticated HTTP wrapper, status mapping and pagination
//! shared by all API operations.

use crate::error::HcloudError;
use crate::models::ErrorBody;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Page size requested for list endpoints
pub const PER_PAGE: u32 = 50;

/// Pagination metadata returned by list endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    #[serde(default)]
    pub next_page: Option<u64>,
    #[serde(default)]
    pub total_entries: Option<u64>,
}

/// Just the `meta` part of a list response
#[derive(Debug, Deserialize)]
struct MetaOnly {
    #[serde(default)]
    meta: Option<Meta>,
}

/// HTTP client wrapper with bearer authentication
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, HcloudError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = check_status("GET", path, response).await?;
        decode(response).await
    }

    /// Fetch every page of a list endpoint, extracting items with `extract`
    pub async fn get_all<P, T, F>(&self, path: &str, extract: F) -> Result<Vec<T>, HcloudError>
    where
        P: for<'de> Deserialize<'de>,
        F: Fn(P) -> Vec<T>,
    {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut page = 1;
        let mut all_results = Vec::new();

        loop {
            let paged = format!("{}{}page={}&per_page={}", path, separator, page, PER_PAGE);
            let value: serde_json::Value = self.get(&paged).await?;
            let meta: MetaOnly = serde_json::from_value(value.clone())?;
            let items: P = serde_json::from_value(value)?;
            all_results.extend(extract(items));

            match meta.meta.and_then(|m| m.pagination.next_page) {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(all_results)
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, HcloudError> {
        let url = self.build_url(path);
        debug!("POST {} with body: {}", url, redact(body));

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let response = check_status("POST", path, response).await?;
        decode(response).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), HcloudError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self.authorized(self.client.delete(&url)).send().await?;
        check_status("DELETE", path, response).await?;
        Ok(())
    }

    /// Make a DELETE request whose response carries a body (e.g. an action)
    pub async fn delete_with_response<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, HcloudError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self.authorized(self.client.delete(&url)).send().await?;
        let response = check_status("DELETE", path, response).await?;
        decode(response).await
    }

    /// Build query string from filters
    pub fn build_query_string(&self, filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Map a non-success response to the matching error variant
async fn check_status(method: &str, path: &str, response: Response) -> Result<Response, HcloudError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => format!("{}: {}", parsed.error.code, parsed.error.message),
        Err(_) => body,
    };
    let message = format!("{} {} failed: {} - {}", method, path, status, detail);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HcloudError::Authentication(message),
        StatusCode::NOT_FOUND => HcloudError::NotFound(message),
        StatusCode::CONFLICT => HcloudError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => HcloudError::RateLimited(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => HcloudError::InvalidRequest(message),
        _ => HcloudError::Api(message),
    })
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, HcloudError> {
    let response_text = response.text().await?;
    serde_json::from_str(&response_text).map_err(|e| {
        HcloudError::Api(format!(
            "error decoding response body: {} - Response (first 500 chars): {}",
            e,
            response_text.chars().take(500).collect::<String>()
        ))
    })
}

/// Request bodies may carry machine configuration in `user_data`
fn redact(body: &serde_json::Value) -> String {
    let mut body = body.clone();
    if let Some(user_data) = body.get_mut("user_data") {
        *user_data = serde_json::Value::String("<redacted>".to_string());
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_and_query() {
        let http = HttpClient::new(Client::new(), "https://api.hetzner.cloud/v1/".to_string(), "t".to_string());
        assert_eq!(http.build_url("/servers"), "https://api.hetzner.cloud/v1/servers");
        assert_eq!(http.auth_header(), "Bearer t");
        assert_eq!(
            http.build_query_string(&[("label_selector", "type=worker"), ("name", "a b")]),
            "label_selector=type%3Dworker&name=a%20b"
        );
    }

    #[test]
    fn test_redact_user_data() {
        let body = serde_json::json!({"name": "worker-0", "user_data": "machine: secret"});
        let out = redact(&body);
        assert!(out.contains("worker-0"));
        assert!(!out.contains("secret"));
    }
}
