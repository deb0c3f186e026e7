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
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::OAuthFlow;
use crate::error::SpotifyError;

/// Tokens are retired this many seconds before Spotify would reject them.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth access/refresh pair as persisted in the token cache file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

// Never print the secrets themselves.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// JSON file holding the latest [`Token`].
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means "not authorized yet". An unreadable or corrupt
    /// file is reported and treated the same way.
    pub fn load(&self) -> Option<Token> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read token cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring corrupt token cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, token: &Token) -> Result<(), SpotifyError> {
        let persist_error = |e: String| {
            SpotifyError::Authentication(format!(
                "failed to persist token cache {}: {}",
                self.path.display(),
                e
            ))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persist_error(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(token).map_err(|e| persist_error(e.to_string()))?;

        // Staged beside the cache, then renamed over it.
        let staging = self.staging_path();
        let written = write_private(&staging, content.as_bytes())
            .and_then(|()| fs::rename(&staging, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            return Err(persist_error(e.to_string()));
        }

        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // A leftover staging file keeps its old mode; tighten it before writing.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.sync_all()
}

/// Snapshot of the cached credentials, reported without refreshing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub cache_path: PathBuf,
    pub cached: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// Owns the OAuth credential lifecycle.
///
/// All access goes through one async mutex which is held across a refresh,
/// so concurrent requests that find an expired token wait for the single
/// refresh in flight instead of starting their own.
pub struct TokenStore {
    oauth: Arc<dyn OAuthFlow>,
    cache: TokenCache,
    current: Mutex<Option<Token>>,
}

impl TokenStore {
    /// Opens the store, picking up whatever the cache file holds.
    pub fn open(oauth: Arc<dyn OAuthFlow>, cache: TokenCache) -> Self {
        let current = cache.load();
        if current.is_some() {
            info!("Loaded cached Spotify token from {}", cache.path().display());
        } else {
            info!("No cached Spotify token at {}", cache.path().display());
        }

        Self {
            oauth,
            cache,
            current: Mutex::new(current),
        }
    }

    pub fn authorize_url(&self) -> Result<String, SpotifyError> {
        self.oauth.authorize_url()
    }

    /// Extracts the authorization code from the URL the browser was
    /// redirected to. A bare code is accepted as-is.
    pub fn code_from_redirect(&self, input: &str) -> Result<String, SpotifyError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SpotifyError::Validation(
                "authorization code must not be empty".to_string(),
            ));
        }

        if !input.contains("://") {
            return Ok(input.to_string());
        }

        self.oauth.parse_redirect(input).ok_or_else(|| {
            SpotifyError::Authentication(
                "redirect URL carries no valid authorization code (access denied or state mismatch)"
                    .to_string(),
            )
        })
    }

    /// Exchanges an authorization code for the initial token pair.
    pub async fn complete_authorization(&self, code: &str) -> Result<(), SpotifyError> {
        if code.trim().is_empty() {
            return Err(SpotifyError::Validation(
                "authorization code must not be empty".to_string(),
            ));
        }

        let mut current = self.current.lock().await;
        let token = self.oauth.exchange_code(code.trim()).await?;
        self.cache.save(&token)?;
        info!(
            "Spotify authorization complete, token cached at {}",
            self.cache.path().display()
        );
        *current = Some(token);
        Ok(())
    }

    /// Returns an access token that is not expired, refreshing first when
    /// needed.
    pub async fn get_valid_token(&self) -> Result<String, SpotifyError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        self.refresh_locked(&mut current).await
    }

    /// Called after Spotify answered 401 for `rejected`. When another request
    /// has already replaced that token, the replacement is returned instead of
    /// refreshing a second time.
    pub async fn refresh_rejected(&self, rejected: &str) -> Result<String, SpotifyError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current
            .as_ref()
            .filter(|t| t.access_token != rejected && !t.is_expired())
        {
            return Ok(token.access_token.clone());
        }

        self.refresh_locked(&mut current).await
    }

    pub async fn status(&self) -> TokenStatus {
        let current = self.current.lock().await;
        TokenStatus {
            cache_path: self.cache.path().to_path_buf(),
            cached: current.is_some(),
            has_refresh_token: current
                .as_ref()
                .map(|t| t.refresh_token.is_some())
                .unwrap_or(false),
            expires_at: current.as_ref().map(|t| t.expires_at),
            expired: current.as_ref().map(|t| t.is_expired()).unwrap_or(true),
        }
    }

    async fn refresh_locked(&self, slot: &mut Option<Token>) -> Result<String, SpotifyError> {
        let refresh_token = slot
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| {
                SpotifyError::Authentication(
                    "no refresh token available; run `spotify-mcp auth` to authorize".to_string(),
                )
            })?;

        info!("Refreshing Spotify access token");
        let mut fresh = self.oauth.refresh(&refresh_token).await.map_err(|e| {
            error!("Token refresh failed: {}", e);
            e
        })?;

        // Spotify only sometimes rotates the refresh token.
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }

        if let Err(e) = self.cache.save(&fresh) {
            error!("{}; continuing with the in-memory token", e);
        }

        let access_token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access_token)
    }
}
