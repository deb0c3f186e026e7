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

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod token;
pub mod tools;
pub mod transport;
pub mod uri;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key items for convenience
pub use auth::{token_store, OAuthFlow, SpotifyOAuth};
pub use client::SpotifyClient;
pub use config::SpotifyConfig;
pub use error::{ConfigError, SpotifyError};
pub use token::{Token, TokenCache, TokenStatus, TokenStore};
pub use tools::{definitions, ToolDefinition, ToolHandlers, ToolName, ToolResponse};
