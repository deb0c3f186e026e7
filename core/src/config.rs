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

use std::env;
use std::path::PathBuf;

use reqwest::Url;

use crate::error::ConfigError;

pub const CLIENT_ID_VAR: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SPOTIFY_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "SPOTIFY_REDIRECT_URI";
pub const TOKEN_CACHE_VAR: &str = "SPOTIFY_TOKEN_CACHE";

pub const DEFAULT_TOKEN_CACHE: &str = ".spotify_token_cache.json";

/// Application credentials and local state location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_cache_path: PathBuf,
}

impl SpotifyConfig {
    /// Reads the configuration from the process environment.
    ///
    /// The caller is expected to have loaded any `.env` file beforehand.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let client_id = required(CLIENT_ID_VAR)?;
        let client_secret = required(CLIENT_SECRET_VAR)?;
        let redirect_uri = normalize_redirect_uri(&required(REDIRECT_URI_VAR)?)?;
        let token_cache_path = lookup(TOKEN_CACHE_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_CACHE.to_string())
            .into();

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            token_cache_path,
        })
    }

    /// `host:port` the browser is sent back to after authorizing.
    pub fn redirect_address(&self) -> Result<String, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRedirectUri {
            uri: self.redirect_uri.clone(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(&self.redirect_uri).map_err(|e| invalid(&e.to_string()))?;
        let host = parsed.host_str().ok_or_else(|| invalid("no host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("no port"))?;
        Ok(format!("{}:{}", host, port))
    }
}

/// Spotify refuses `localhost` redirect URIs, so the host is rewritten to the
/// loopback address. Port, path and query are kept exactly as given.
pub fn normalize_redirect_uri(uri: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(uri).map_err(|e| ConfigError::InvalidRedirectUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.host_str() != Some("localhost") {
        return Ok(uri.to_string());
    }

    let scheme_end = uri.find("://").map(|i| i + 3).unwrap_or(0);
    let (scheme, rest) = uri.split_at(scheme_end);
    Ok(format!("{}{}", scheme, rest.replacen("localhost", "127.0.0.1", 1)))
}
