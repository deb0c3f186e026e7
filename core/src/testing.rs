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

//! Scripted stand-ins for the accounts service and the Web API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::OAuthFlow;
use crate::client::SpotifyClient;
use crate::error::SpotifyError;
use crate::token::{Token, TokenCache, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport};

pub fn valid_token() -> Token {
    Token::new(
        "valid-access".to_string(),
        Some("valid-refresh".to_string()),
        Utc::now() + Duration::hours(1),
    )
}

pub fn expired_token() -> Token {
    Token::new(
        "expired-access".to_string(),
        Some("expired-refresh".to_string()),
        Utc::now() - Duration::minutes(5),
    )
}

/// Hands out `fresh-1`, `fresh-2`, ... on each refresh.
pub struct FakeOAuth {
    refreshes: AtomicUsize,
    exchanges: AtomicUsize,
    fail_refresh: bool,
}

impl FakeOAuth {
    pub fn new() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
            exchanges: AtomicUsize::new(0),
            fail_refresh: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_refresh: true,
            ..Self::new()
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthFlow for FakeOAuth {
    fn authorize_url(&self) -> Result<String, SpotifyError> {
        Ok("https://accounts.spotify.com/authorize?client_id=test".to_string())
    }

    fn parse_redirect(&self, url: &str) -> Option<String> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("code="))
            .map(str::to_string)
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, SpotifyError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(Token::new(
            format!("access-{}", code),
            Some("initial-refresh".to_string()),
            Utc::now() + Duration::hours(1),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Token, SpotifyError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        // Give concurrent callers a chance to pile up on the store's lock.
        tokio::task::yield_now().await;
        if self.fail_refresh {
            return Err(SpotifyError::Authentication(
                "refresh token revoked".to_string(),
            ));
        }
        Ok(Token::new(
            format!("fresh-{}", n),
            None,
            Utc::now() + Duration::hours(1),
        ))
    }
}

/// Routes by method and path. Queued responses are served in order and the
/// last one keeps being served once the queue is down to it.
pub struct FakeTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<ApiResponse>>>,
    requests: Mutex<Vec<(ApiRequest, String)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_raw(&self, method: HttpMethod, path: &str, response: ApiResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        self.respond_raw(method, path, ApiResponse::new(status, body.to_string()));
    }

    pub fn respond_empty(&self, method: HttpMethod, path: &str, status: u16) {
        self.respond_raw(method, path, ApiResponse::new(status, ""));
    }

    pub fn requests(&self) -> Vec<(ApiRequest, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, method: HttpMethod, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .map(|(request, _)| request)
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, SpotifyError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), access_token.to_string()));

        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(request.method, request.path.clone()));
        let response = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(response.unwrap_or_else(|| {
            ApiResponse::new(
                404,
                format!(
                    r#"{{"error":{{"status":404,"message":"no fake route for {} {}"}}}}"#,
                    request.method, request.path
                ),
            )
        }))
    }
}

/// Client over the fakes with `token` already cached. The directory guard
/// must outlive the client.
pub fn fake_client(
    transport: Arc<FakeTransport>,
    oauth: Arc<FakeOAuth>,
    token: Option<Token>,
) -> (SpotifyClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = TokenCache::new(dir.path().join("token.json"));
    if let Some(token) = token {
        cache.save(&token).unwrap();
    }
    let store = Arc::new(TokenStore::open(oauth, cache));
    (SpotifyClient::new(store, transport), dir)
}

/// Answers a single HTTP exchange on a loopback port with `response`, a
/// complete raw HTTP message. Returns the base URL and a handle resolving to
/// the raw request that was received.
pub async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if request_complete(&received) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&received).into_owned()
    });

    (base_url, handle)
}

/// Raw HTTP/1.1 response with a JSON body.
pub fn http_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        status_line,
        body.len()
    );
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
}

fn request_complete(received: &[u8]) -> bool {
    let text = String::from_utf8_lossy(received);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    received.len() >= header_end + 4 + content_length
}
