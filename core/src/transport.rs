/*
    spotify-mcp-rs | Spotify playback, search and playlist tools for AI agents.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, RETRY_AFTER};
use serde_json::Value;

use crate::error::SpotifyError;

pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A Web API call, relative to [`API_BASE_URL`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw outcome of a call; status interpretation is left to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl ApiResponse {
    #[cfg(test)]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Bearer-authenticated HTTP access to the Web API.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs the call. Only transport-level failures are errors; any HTTP
    /// status comes back as an [`ApiResponse`].
    async fn send(&self, request: &ApiRequest, access_token: &str)
        -> Result<ApiResponse, SpotifyError>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, SpotifyError> {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SpotifyError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, SpotifyError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Put => self.http.put(&url),
            HttpMethod::Delete => self.http.delete(&url),
        }
        .bearer_auth(access_token)
        .query(&request.query);

        builder = match &request.body {
            Some(body) => builder.json(body),
            // Spotify answers 411 to body-less writes without a length.
            None if request.method != HttpMethod::Get => builder.header(CONTENT_LENGTH, "0"),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| SpotifyError::Network(format!("{} {}: {}", request.method, request.path, e)))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .map_err(|e| SpotifyError::Network(format!("{} {}: {}", request.method, request.path, e)))?;

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_response, serve_once};
    use serde_json::json;

    #[test]
    fn test_request_builder_collects_query_and_body() {
        let request = ApiRequest::put("/me/player/play")
            .query("device_id", "dev-1")
            .query_opt("market", None::<&str>)
            .json(json!({ "uris": ["spotify:track:abc"] }));

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.query_value("device_id"), Some("dev-1"));
        assert_eq!(request.query_value("market"), None);
        assert_eq!(request.body.unwrap()["uris"][0], "spotify:track:abc");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport = ReqwestTransport::with_base_url("http://127.0.0.1:9/v1/").unwrap();
        assert_eq!(transport.base_url, "http://127.0.0.1:9/v1");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::with_base_url(format!("http://{}/v1", addr)).unwrap();
        let err = transport
            .send(&ApiRequest::get("/me/player"), "token")
            .await
            .unwrap_err();

        assert!(matches!(err, SpotifyError::Network(_)), "got {:?}", err);
        assert_eq!(err.kind(), "network_error");
    }

    #[tokio::test]
    async fn test_retry_after_header_is_read() {
        let body = r#"{"error":{"status":429,"message":"API rate limit exceeded"}}"#;
        let (base_url, server) =
            serve_once(http_response("429 Too Many Requests", &[("Retry-After", "12")], body)).await;

        let transport = ReqwestTransport::with_base_url(format!("{}/v1", base_url)).unwrap();
        let response = transport
            .send(&ApiRequest::get("/me/player/devices"), "token-abc")
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after, Some(12));
        assert_eq!(response.body, body);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /v1/me/player/devices "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer token-abc"));
    }

    #[tokio::test]
    async fn test_body_less_write_sends_zero_length() {
        let (base_url, server) = serve_once(http_response("200 OK", &[], "")).await;

        let transport = ReqwestTransport::with_base_url(format!("{}/v1", base_url)).unwrap();
        let response = transport
            .send(&ApiRequest::put("/me/player/pause"), "token")
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.retry_after, None);
        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("content-length: 0"));
    }
}
