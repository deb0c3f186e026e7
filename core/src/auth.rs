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

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use rspotify::{prelude::*, scopes, AuthCodeSpotify, ClientError, Config, Credentials, OAuth};
use serde::Deserialize;

use crate::client::remote_message;
use crate::config::SpotifyConfig;
use crate::error::SpotifyError;
use crate::token::{Token, TokenCache, TokenStore};
use crate::transport::{ApiResponse, REQUEST_TIMEOUT};

pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// The accounts-service half of the Authorization Code Flow.
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// URL the user opens to grant access.
    fn authorize_url(&self) -> Result<String, SpotifyError>;

    /// Pulls the `code` out of the URL the user was redirected to.
    fn parse_redirect(&self, url: &str) -> Option<String>;

    async fn exchange_code(&self, code: &str) -> Result<Token, SpotifyError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Token, SpotifyError>;
}

/// [`OAuthFlow`] backed by `rspotify`'s Authorization Code client.
///
/// Caching and automatic refreshing are switched off in `rspotify`: the
/// [`TokenStore`] owns both, so the client here only performs the exchanges.
/// Refreshes go straight to the token endpoint, since `rspotify` drops a
/// rotated refresh token.
pub struct SpotifyOAuth {
    spotify: AuthCodeSpotify,
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

/// Token endpoint answer to a `refresh_token` grant.
#[derive(Debug, Deserialize)]
struct RefreshGrant {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl SpotifyOAuth {
    pub fn new(config: &SpotifyConfig) -> Self {
        Self::with_token_url(config, TOKEN_URL)
    }

    pub fn with_token_url(config: &SpotifyConfig, token_url: impl Into<String>) -> Self {
        let creds = Credentials::new(&config.client_id, &config.client_secret);

        // - user-read-*/user-modify-playback-state: playback and devices.
        // - playlist-*: reading and editing the user's playlists.
        // - user-library-*/user-top-read: library lookups.
        let scopes = scopes!(
            "user-read-currently-playing",
            "user-read-playback-state",
            "user-modify-playback-state",
            "app-remote-control",
            "streaming",
            "playlist-read-private",
            "playlist-read-collaborative",
            "playlist-modify-private",
            "playlist-modify-public",
            "user-read-playback-position",
            "user-top-read",
            "user-read-recently-played",
            "user-library-modify",
            "user-library-read"
        );

        let oauth = OAuth {
            redirect_uri: config.redirect_uri.clone(),
            scopes,
            ..Default::default()
        };

        let rspotify_config = Config {
            token_cached: false,
            token_refreshing: false,
            ..Default::default()
        };

        Self {
            spotify: AuthCodeSpotify::with_config(creds, oauth, rspotify_config),
            http: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    async fn stored_token(&self) -> Result<rspotify::Token, SpotifyError> {
        let guard = self.spotify.token.lock().await.map_err(|_| {
            SpotifyError::Authentication("OAuth client token state is unavailable".to_string())
        })?;

        (*guard).clone().ok_or_else(|| {
            SpotifyError::Authentication("Spotify returned no token".to_string())
        })
    }
}

fn convert(token: rspotify::Token) -> Token {
    let expires_at = token
        .expires_at
        .unwrap_or_else(|| Utc::now() + token.expires_in);
    Token::new(token.access_token, token.refresh_token, expires_at)
}

fn rejected(err: ClientError) -> SpotifyError {
    SpotifyError::Authentication(format!("Spotify accounts service: {}", err))
}

#[async_trait]
impl OAuthFlow for SpotifyOAuth {
    fn authorize_url(&self) -> Result<String, SpotifyError> {
        self.spotify.get_authorize_url(false).map_err(rejected)
    }

    fn parse_redirect(&self, url: &str) -> Option<String> {
        self.spotify.parse_response_code(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, SpotifyError> {
        debug!("Exchanging authorization code for tokens");
        self.spotify.request_token(code).await.map_err(rejected)?;
        Ok(convert(self.stored_token().await?))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, SpotifyError> {
        debug!("Refreshing access token at {}", self.token_url);
        let unreachable = |e: reqwest::Error| SpotifyError::Network(format!("token refresh: {}", e));

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;
        if !(200..300).contains(&status) {
            let failed = ApiResponse {
                status,
                retry_after: None,
                body,
            };
            return Err(SpotifyError::Authentication(format!(
                "Spotify accounts service refused the refresh ({}): {}",
                status,
                remote_message(&failed)
            )));
        }

        let grant: RefreshGrant = serde_json::from_str(&body).map_err(|e| {
            SpotifyError::Authentication(format!("unreadable token response: {}", e))
        })?;

        Ok(Token::new(
            grant.access_token,
            grant.refresh_token,
            Utc::now() + Duration::seconds(grant.expires_in),
        ))
    }
}

/// Builds the token store used by the server: `rspotify` for the OAuth
/// exchanges, the configured JSON file for persistence.
pub fn token_store(config: &SpotifyConfig) -> TokenStore {
    let oauth: Arc<dyn OAuthFlow> = Arc::new(SpotifyOAuth::new(config));
    TokenStore::open(oauth, TokenCache::new(config.token_cache_path.clone()))
}
