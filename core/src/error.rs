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

use serde_json::{json, Value};
use thiserror::Error;

/// Failures surfaced by the token store, the API client and the tool layer.
///
/// Every variant is recoverable: a failed tool call never takes the server
/// down, it is reported back to the caller through [`SpotifyError::to_payload`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpotifyError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Rate limited by Spotify{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },
    #[error("Spotify API error ({status}): {message}")]
    RemoteService { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

impl SpotifyError {
    /// Stable tag used in the error payload handed back to agents.
    pub fn kind(&self) -> &'static str {
        match self {
            SpotifyError::Authentication(_) => "authentication_error",
            SpotifyError::Validation(_) => "validation_error",
            SpotifyError::RateLimited { .. } => "rate_limited",
            SpotifyError::RemoteService { .. } => "remote_service_error",
            SpotifyError::Network(_) => "network_error",
        }
    }

    pub fn no_active_device() -> Self {
        SpotifyError::RemoteService {
            status: 404,
            message: "No active device. Is Spotify open?".to_string(),
        }
    }

    /// Message without the kind prefix; `kind` and `status` carry that part
    /// in the payload.
    pub fn detail(&self) -> String {
        match self {
            SpotifyError::Authentication(message)
            | SpotifyError::Validation(message)
            | SpotifyError::RemoteService { message, .. }
            | SpotifyError::Network(message) => message.clone(),
            SpotifyError::RateLimited { .. } => self.to_string(),
        }
    }

    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.detail(),
        });
        match self {
            SpotifyError::RateLimited {
                retry_after: Some(secs),
            } => {
                error["retry_after"] = json!(secs);
            }
            SpotifyError::RemoteService { status, .. } => {
                error["status"] = json!(status);
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },
}
