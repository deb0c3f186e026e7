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

//! The six agent-facing tools.
//!
//! A call is first parsed into a [`ToolCall`], which does all input
//! validation without touching the network, and only then executed against
//! the [`SpotifyClient`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::SpotifyClient;
use crate::error::SpotifyError;
use crate::uri::{playlist_id, track_uris, ItemKind, ItemUri, QueueTarget, SearchType};

const MAX_SKIPS: u32 = 50;
const MAX_SEARCH_LIMIT: u32 = 50;
const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Playback,
    Search,
    Queue,
    GetInfo,
    Playlist,
    Devices,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Playback,
        ToolName::Search,
        ToolName::Queue,
        ToolName::GetInfo,
        ToolName::Playlist,
        ToolName::Devices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Playback => "SpotifyPlayback",
            ToolName::Search => "SpotifySearch",
            ToolName::Queue => "SpotifyQueue",
            ToolName::GetInfo => "SpotifyGetInfo",
            ToolName::Playlist => "SpotifyPlaylist",
            ToolName::Devices => "SpotifyDevices",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = SpotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| SpotifyError::Validation(format!("unknown tool '{}'", s)))
    }
}

/// Entry of the protocol's tool listing.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.into_iter().map(definition).collect()
}

fn definition(tool: ToolName) -> ToolDefinition {
    let (description, input_schema) = match tool {
        ToolName::Playback => (
            "Manages the current playback with the following actions:\n\
             - get: Get the current playback state and track.\n\
             - start: Start playing an item, or resume playback if called without a uri.\n\
             - pause: Pause playback.\n\
             - skip: Skip forward num_skips tracks.\n\
             - previous: Go back to the previous track.\n\
             - seek: Jump to position_ms in the current track.\n\
             - volume: Set the volume to volume_percent.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["get", "start", "pause", "skip", "previous", "seek", "volume"],
                        "description": "Action to perform."
                    },
                    "spotify_uri": {
                        "type": "string",
                        "description": "Spotify uri of the item to play for 'start'. If omitted, resumes current playback."
                    },
                    "num_skips": {
                        "type": "integer", "minimum": 1, "maximum": MAX_SKIPS, "default": 1,
                        "description": "Number of tracks to skip for 'skip'."
                    },
                    "position_ms": {
                        "type": "integer", "minimum": 0,
                        "description": "Position in milliseconds for 'seek'."
                    },
                    "volume_percent": {
                        "type": "integer", "minimum": 0, "maximum": 100,
                        "description": "Volume for 'volume'."
                    }
                },
                "required": ["action"],
                "additionalProperties": false
            }),
        ),
        ToolName::Search => (
            "Search for tracks, albums, artists, or playlists on Spotify.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "minLength": 1, "description": "Query term." },
                    "qtype": {
                        "type": "string", "default": "track",
                        "description": "Type of items to search for (track, album, artist, playlist, or comma-separated combination)."
                    },
                    "limit": {
                        "type": "integer", "minimum": 1, "maximum": MAX_SEARCH_LIMIT, "default": DEFAULT_SEARCH_LIMIT,
                        "description": "Maximum number of items to return per type."
                    },
                    "artist": { "type": "string", "description": "Only match this artist." },
                    "album": { "type": "string", "description": "Only match this album." },
                    "year": { "type": "string", "description": "Release year, or a range such as 1990-1999." },
                    "genre": { "type": "string", "description": "Only match this genre." }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        ),
        ToolName::Queue => (
            "Manage the playback queue: get the queue or add a track or album.",
            json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["get", "add"], "description": "Action to perform." },
                    "track_id": {
                        "type": "string",
                        "description": "Track id or uri to add (required for 'add'). An album uri queues the whole album."
                    }
                },
                "required": ["action"],
                "additionalProperties": false
            }),
        ),
        ToolName::GetInfo => (
            "Get detailed information about a Spotify item (track, album, artist, or playlist).",
            json!({
                "type": "object",
                "properties": {
                    "item_uri": {
                        "type": "string",
                        "description": "URI of the item. Playlists and albums include their tracks; artists include albums and top tracks."
                    }
                },
                "required": ["item_uri"],
                "additionalProperties": false
            }),
        ),
        ToolName::Playlist => (
            "Manage Spotify playlists.\n\
             - get: List the user's playlists.\n\
             - get_tracks: List the tracks of a playlist.\n\
             - add_tracks: Add tracks to a playlist.\n\
             - remove_tracks: Remove tracks from a playlist.\n\
             - change_details: Change the name or description of a playlist.\n\
             - create: Create a new playlist.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["get", "get_tracks", "add_tracks", "remove_tracks", "change_details", "create"],
                        "description": "Action to perform."
                    },
                    "playlist_id": { "type": "string", "description": "ID or uri of the playlist to manage." },
                    "track_ids": {
                        "type": "array", "items": { "type": "string" },
                        "description": "Track ids or uris to add or remove."
                    },
                    "name": { "type": "string", "description": "Playlist name for 'change_details' or 'create'." },
                    "description": { "type": "string", "description": "Playlist description." },
                    "public": { "type": "boolean", "default": false, "description": "Visibility for 'create'." }
                },
                "required": ["action"],
                "additionalProperties": false
            }),
        ),
        ToolName::Devices => (
            "Get available Spotify devices.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        ),
    };

    ToolDefinition {
        name: tool.as_str(),
        description,
        input_schema,
    }
}

// ---- argument shapes ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PlaybackAction {
    Get,
    Start,
    Pause,
    Skip,
    Previous,
    Seek,
    Volume,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaybackArgs {
    action: PlaybackAction,
    #[serde(default)]
    spotify_uri: Option<String>,
    #[serde(default)]
    num_skips: Option<u32>,
    #[serde(default)]
    position_ms: Option<u64>,
    #[serde(default)]
    volume_percent: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    #[serde(default, alias = "type")]
    qtype: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    genre: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum QueueAction {
    Get,
    Add,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueueArgs {
    action: QueueAction,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetInfoArgs {
    item_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PlaylistAction {
    Get,
    GetTracks,
    AddTracks,
    RemoveTracks,
    ChangeDetails,
    Create,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaylistArgs {
    action: PlaylistAction,
    #[serde(default)]
    playlist_id: Option<String>,
    #[serde(default)]
    track_ids: Option<Vec<String>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    public: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DevicesArgs {}

fn parse_args<T: DeserializeOwned>(tool: ToolName, args: Value) -> Result<T, SpotifyError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| SpotifyError::Validation(format!("invalid arguments for {}: {}", tool, e)))
}

fn required<T>(value: Option<T>, field: &str, action: &str) -> Result<T, SpotifyError> {
    value.ok_or_else(|| SpotifyError::Validation(format!("{} is required for the '{}' action", field, action)))
}

/// Empty or whitespace-only strings count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn in_range(value: u32, min: u32, max: u32, field: &str) -> Result<u32, SpotifyError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(SpotifyError::Validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )))
    }
}

/// Appends Spotify field filters (`artist:`, `album:`, `year:`, `genre:`) to
/// the free-text query.
pub fn build_search_query(
    query: &str,
    artist: Option<&str>,
    album: Option<&str>,
    year: Option<&str>,
    genre: Option<&str>,
) -> String {
    let mut parts = vec![query.trim().to_string()];
    for (field, value) in [("artist", artist), ("album", album), ("year", year), ("genre", genre)] {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            parts.push(format!("{}:{}", field, value));
        }
    }
    parts.join(" ")
}

// ---- validated calls ----

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Get,
    Start(Option<ItemUri>),
    Pause,
    Skip(u32),
    Previous,
    Seek(u64),
    Volume(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueCommand {
    Get,
    Add(QueueTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistCommand {
    List,
    Tracks {
        playlist_id: String,
    },
    AddTracks {
        playlist_id: String,
        track_uris: Vec<String>,
    },
    RemoveTracks {
        playlist_id: String,
        track_uris: Vec<String>,
    },
    ChangeDetails {
        playlist_id: String,
        name: Option<String>,
        description: Option<String>,
    },
    Create {
        name: String,
        description: Option<String>,
        public: bool,
    },
}

/// A fully validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Playback(PlaybackCommand),
    Search {
        query: String,
        types: Vec<SearchType>,
        limit: u32,
    },
    Queue(QueueCommand),
    GetInfo(ItemUri),
    Playlist(PlaylistCommand),
    Devices,
}

impl ToolCall {
    /// `args` may be `null` for tools without required fields.
    pub fn parse(tool: ToolName, args: Value) -> Result<Self, SpotifyError> {
        match tool {
            ToolName::Playback => Self::parse_playback(parse_args(tool, args)?),
            ToolName::Search => Self::parse_search(parse_args(tool, args)?),
            ToolName::Queue => {
                let args: QueueArgs = parse_args(tool, args)?;
                let command = match args.action {
                    QueueAction::Get => QueueCommand::Get,
                    QueueAction::Add => {
                        let track_id = required(non_blank(args.track_id), "track_id", "add")?;
                        QueueCommand::Add(QueueTarget::parse(&track_id)?)
                    }
                };
                Ok(ToolCall::Queue(command))
            }
            ToolName::GetInfo => {
                let args: GetInfoArgs = parse_args(tool, args)?;
                let uri = ItemUri::parse(&args.item_uri)?;
                if matches!(uri.kind, ItemKind::Episode | ItemKind::Show) {
                    return Err(SpotifyError::Validation(format!(
                        "item_uri must be a track, album, artist or playlist, not a {}",
                        uri.kind.as_str()
                    )));
                }
                Ok(ToolCall::GetInfo(uri))
            }
            ToolName::Playlist => Self::parse_playlist(parse_args(tool, args)?),
            ToolName::Devices => {
                let _: DevicesArgs = parse_args(tool, args)?;
                Ok(ToolCall::Devices)
            }
        }
    }

    fn parse_playback(args: PlaybackArgs) -> Result<Self, SpotifyError> {
        let command = match args.action {
            PlaybackAction::Get => PlaybackCommand::Get,
            PlaybackAction::Start => {
                let uri = non_blank(args.spotify_uri)
                    .map(|uri| ItemUri::parse(&uri))
                    .transpose()?;
                PlaybackCommand::Start(uri)
            }
            PlaybackAction::Pause => PlaybackCommand::Pause,
            PlaybackAction::Skip => {
                PlaybackCommand::Skip(in_range(args.num_skips.unwrap_or(1), 1, MAX_SKIPS, "num_skips")?)
            }
            PlaybackAction::Previous => PlaybackCommand::Previous,
            PlaybackAction::Seek => PlaybackCommand::Seek(required(args.position_ms, "position_ms", "seek")?),
            PlaybackAction::Volume => {
                let volume = required(args.volume_percent, "volume_percent", "volume")?;
                let volume = in_range(volume, 0, 100, "volume_percent")?;
                PlaybackCommand::Volume(volume as u8)
            }
        };
        Ok(ToolCall::Playback(command))
    }

    fn parse_search(args: SearchArgs) -> Result<Self, SpotifyError> {
        if args.query.trim().is_empty() {
            return Err(SpotifyError::Validation("query must not be empty".to_string()));
        }

        let types = SearchType::parse_list(args.qtype.as_deref().unwrap_or("track"))?;
        let limit = in_range(
            args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            1,
            MAX_SEARCH_LIMIT,
            "limit",
        )?;
        let query = build_search_query(
            &args.query,
            args.artist.as_deref(),
            args.album.as_deref(),
            args.year.as_deref(),
            args.genre.as_deref(),
        );

        Ok(ToolCall::Search { query, types, limit })
    }

    fn parse_playlist(args: PlaylistArgs) -> Result<Self, SpotifyError> {
        let playlist = |action: &str| -> Result<String, SpotifyError> {
            let id = required(non_blank(args.playlist_id.clone()), "playlist_id", action)?;
            playlist_id(&id)
        };
        let tracks = |action: &str| -> Result<Vec<String>, SpotifyError> {
            let ids = args.track_ids.clone().filter(|ids| !ids.is_empty());
            track_uris(&required(ids, "track_ids", action)?)
        };

        let command = match args.action {
            PlaylistAction::Get => PlaylistCommand::List,
            PlaylistAction::GetTracks => PlaylistCommand::Tracks {
                playlist_id: playlist("get_tracks")?,
            },
            PlaylistAction::AddTracks => PlaylistCommand::AddTracks {
                playlist_id: playlist("add_tracks")?,
                track_uris: tracks("add_tracks")?,
            },
            PlaylistAction::RemoveTracks => PlaylistCommand::RemoveTracks {
                playlist_id: playlist("remove_tracks")?,
                track_uris: tracks("remove_tracks")?,
            },
            PlaylistAction::ChangeDetails => {
                let playlist_id = playlist("change_details")?;
                let name = non_blank(args.name.clone());
                let description = args.description.clone();
                if name.is_none() && description.is_none() {
                    return Err(SpotifyError::Validation(
                        "at least one of name or description is required for 'change_details'".to_string(),
                    ));
                }
                PlaylistCommand::ChangeDetails {
                    playlist_id,
                    name,
                    description,
                }
            }
            PlaylistAction::Create => PlaylistCommand::Create {
                name: required(non_blank(args.name.clone()), "name", "create")?,
                description: args.description.clone(),
                public: args.public.unwrap_or(false),
            },
        };
        Ok(ToolCall::Playlist(command))
    }
}

/// Result of a tool call as handed to the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolResponse {
    fn ok(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn message(message: impl Into<String>) -> Self {
        Self::ok(json!({ "message": message.into() }))
    }

    fn failed(err: &SpotifyError) -> Self {
        Self {
            payload: err.to_payload(),
            is_error: true,
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, SpotifyError> {
    serde_json::to_value(value)
        .map_err(|e| SpotifyError::Validation(format!("failed to encode tool result: {}", e)))
}

pub struct ToolHandlers {
    client: Arc<SpotifyClient>,
}

impl ToolHandlers {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        Self { client }
    }

    /// Validates and runs one call. Failures come back as error payloads,
    /// never as `Err`.
    pub async fn call(&self, tool: ToolName, args: Value) -> ToolResponse {
        info!("Tool {} invoked", tool);

        let result = match ToolCall::parse(tool, args) {
            Ok(call) => self.execute(call).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                info!("Tool {} succeeded", tool);
                response
            }
            Err(e) => {
                error!("Tool {} failed ({}): {}", tool, e.kind(), e);
                ToolResponse::failed(&e)
            }
        }
    }

    pub async fn execute(&self, call: ToolCall) -> Result<ToolResponse, SpotifyError> {
        let client = &self.client;

        let response = match call {
            ToolCall::Playback(command) => match command {
                PlaybackCommand::Get => match client.playback_state().await? {
                    Some(state) => ToolResponse::ok(to_payload(&state)?),
                    None => ToolResponse::message("No track playing."),
                },
                PlaybackCommand::Start(uri) => {
                    client.start_playback(uri.as_ref()).await?;
                    ToolResponse::message("Playback starting.")
                }
                PlaybackCommand::Pause => {
                    client.pause_playback().await?;
                    ToolResponse::message("Playback paused.")
                }
                PlaybackCommand::Skip(count) => {
                    client.skip(count).await?;
                    ToolResponse::message(if count == 1 {
                        "Skipped to next track.".to_string()
                    } else {
                        format!("Skipped {} tracks.", count)
                    })
                }
                PlaybackCommand::Previous => {
                    client.previous().await?;
                    ToolResponse::message("Went back to previous track.")
                }
                PlaybackCommand::Seek(position_ms) => {
                    client.seek(position_ms).await?;
                    ToolResponse::message(format!("Seeked to {} ms.", position_ms))
                }
                PlaybackCommand::Volume(volume) => {
                    client.set_volume(volume).await?;
                    ToolResponse::message(format!("Volume set to {}%.", volume))
                }
            },
            ToolCall::Search { query, types, limit } => {
                let results = client.search(&query, &types, limit).await?;
                ToolResponse::ok(to_payload(&results)?)
            }
            ToolCall::Queue(QueueCommand::Get) => ToolResponse::ok(to_payload(&client.queue().await?)?),
            ToolCall::Queue(QueueCommand::Add(target)) => {
                let queued = client.add_to_queue(&target).await?;
                ToolResponse::message(match target {
                    QueueTarget::Item(_) => "Track added to queue.".to_string(),
                    QueueTarget::Album(_) => format!("Added {} album tracks to queue.", queued),
                })
            }
            ToolCall::GetInfo(uri) => ToolResponse::ok(to_payload(&client.item_info(&uri).await?)?),
            ToolCall::Playlist(command) => match command {
                PlaylistCommand::List => ToolResponse::ok(to_payload(&client.user_playlists().await?)?),
                PlaylistCommand::Tracks { playlist_id } => {
                    ToolResponse::ok(to_payload(&client.playlist_tracks(&playlist_id).await?)?)
                }
                PlaylistCommand::AddTracks {
                    playlist_id,
                    track_uris,
                } => {
                    client.add_tracks_to_playlist(&playlist_id, &track_uris).await?;
                    ToolResponse::message("Tracks added to playlist.")
                }
                PlaylistCommand::RemoveTracks {
                    playlist_id,
                    track_uris,
                } => {
                    client.remove_tracks_from_playlist(&playlist_id, &track_uris).await?;
                    ToolResponse::message("Tracks removed from playlist.")
                }
                PlaylistCommand::ChangeDetails {
                    playlist_id,
                    name,
                    description,
                } => {
                    client
                        .change_playlist_details(&playlist_id, name.as_deref(), description.as_deref())
                        .await?;
                    ToolResponse::message("Playlist details changed.")
                }
                PlaylistCommand::Create {
                    name,
                    description,
                    public,
                } => {
                    let created = client.create_playlist(&name, description.as_deref(), public).await?;
                    ToolResponse::ok(to_payload(&created)?)
                }
            },
            ToolCall::Devices => ToolResponse::ok(to_payload(&client.devices().await?)?),
        };

        Ok(response)
    }
}
