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

use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::SpotifyConfig;
use crate::error::SpotifyError;
use crate::models::{
    AlbumSummary, ApiAlbum, ApiArtist, ApiPlayback, ApiPlaylist, ApiQueue, ApiTrack, Device,
    DeviceList, ItemInfo, Paging, PlaybackState, PlaylistEntry, PlaylistSummary, QueueSummary,
    SearchResponse, SearchResults, TopTracks, TrackSummary, UserProfile,
};
use crate::normalize::summarize_tracks;
use crate::token::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use crate::uri::{ItemKind, ItemUri, QueueTarget, SearchType};

/// Spotify caps playlist item writes at 100 per request.
const PLAYLIST_BATCH: usize = 100;
const ARTIST_ALBUMS_LIMIT: u32 = 20;
const PLAYLIST_PAGE_LIMIT: u32 = 50;
const PLAYLIST_TRACKS_LIMIT: u32 = 100;
const TOP_TRACKS_MARKET: &str = "US";

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Code(String),
}

/// Best human-readable message for a failed response.
pub(crate) fn remote_message(response: &ApiResponse) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&response.body) {
        return match (body.error, body.error_description) {
            (ErrorDetail::Object { message }, _) => message,
            (ErrorDetail::Code(_), Some(description)) => description,
            (ErrorDetail::Code(code), None) => code,
        };
    }

    StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown error")
        .to_string()
}

/// Typed access to the Spotify Web API.
///
/// Every call goes out with a token from the [`TokenStore`]. A 401 triggers
/// exactly one refresh-and-retry; nothing else is retried.
pub struct SpotifyClient {
    tokens: Arc<TokenStore>,
    transport: Arc<dyn HttpTransport>,
    profile: OnceCell<UserProfile>,
}

impl SpotifyClient {
    pub fn new(tokens: Arc<TokenStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            tokens,
            transport,
            profile: OnceCell::new(),
        }
    }

    /// Production client: `rspotify` OAuth, file token cache and `reqwest`.
    pub fn connect(config: &SpotifyConfig) -> Result<Self, SpotifyError> {
        let tokens = Arc::new(crate::auth::token_store(config));
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::new(tokens, transport))
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SpotifyError> {
        debug!("{} {}", request.method, request.path);

        let token = self.tokens.get_valid_token().await?;
        let mut response = self.transport.send(&request, &token).await?;

        if response.status == 401 {
            warn!(
                "Spotify rejected the access token for {} {}; refreshing once",
                request.method, request.path
            );
            let token = self.tokens.refresh_rejected(&token).await?;
            response = self.transport.send(&request, &token).await?;

            if response.status == 401 {
                return Err(SpotifyError::Authentication(format!(
                    "access token rejected after refresh: {}",
                    remote_message(&response)
                )));
            }
        }

        match response.status {
            429 => {
                warn!(
                    "Rate limited on {} {} (retry after {:?}s)",
                    request.method, request.path, response.retry_after
                );
                Err(SpotifyError::RateLimited {
                    retry_after: response.retry_after,
                })
            }
            status if status >= 400 => Err(SpotifyError::RemoteService {
                status,
                message: remote_message(&response),
            }),
            _ => Ok(response),
        }
    }

    /// `None` for empty bodies (204 and friends).
    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Option<T>, SpotifyError> {
        let response = self.execute(request).await?;
        if response.body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| SpotifyError::RemoteService {
                status: response.status,
                message: format!("unexpected response body: {}", e),
            })
    }

    async fn fetch_required<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, SpotifyError> {
        let path = request.path.clone();
        self.fetch(request)
            .await?
            .ok_or_else(|| SpotifyError::RemoteService {
                status: 204,
                message: format!("empty response from {}", path),
            })
    }

    async fn send(&self, request: ApiRequest) -> Result<(), SpotifyError> {
        self.execute(request).await.map(|_| ())
    }

    // ---- profile ----

    /// The signed-in user, fetched once and then reused.
    pub async fn current_user(&self) -> Result<&UserProfile, SpotifyError> {
        self.profile
            .get_or_try_init(|| self.fetch_required(ApiRequest::get("/me")))
            .await
    }

    // ---- playback ----

    pub async fn playback_state(&self) -> Result<Option<PlaybackState>, SpotifyError> {
        let playback: Option<ApiPlayback> = self.fetch(ApiRequest::get("/me/player")).await?;
        Ok(playback.map(|p| p.summarize()))
    }

    pub async fn current_track(&self) -> Result<Option<TrackSummary>, SpotifyError> {
        let playing: Option<ApiPlayback> = self
            .fetch(ApiRequest::get("/me/player/currently-playing"))
            .await?;

        let track = playing.as_ref().and_then(ApiPlayback::current_track);
        match &track {
            Some(t) => debug!("Current track: {} ({})", t.name, t.id),
            None => debug!("No track currently playing"),
        }
        Ok(track)
    }

    /// Device to target explicitly, or `None` when one is already active.
    async fn target_device(&self) -> Result<Option<String>, SpotifyError> {
        let devices = self.devices().await?;
        if devices.iter().any(|d| d.is_active) {
            return Ok(None);
        }

        let candidate = devices
            .into_iter()
            .find(|d| d.id.is_some())
            .ok_or_else(SpotifyError::no_active_device)?;
        info!("No active device, assigning {}", candidate);
        Ok(candidate.id)
    }

    /// Plays `uri`, or resumes when `None`. Resuming while something is
    /// already playing does nothing.
    pub async fn start_playback(&self, uri: Option<&ItemUri>) -> Result<(), SpotifyError> {
        let body = match uri {
            Some(uri) if uri.kind.is_playable_item() => Some(json!({ "uris": [uri.to_string()] })),
            Some(uri) => Some(json!({ "context_uri": uri.to_string() })),
            None => {
                match self.current_track().await? {
                    Some(track) if track.is_playing == Some(true) => {
                        info!("Playback already active, nothing to resume");
                        return Ok(());
                    }
                    Some(_) => None,
                    None => {
                        return Err(SpotifyError::Validation(
                            "no spotify_uri provided and no current playback to resume".to_string(),
                        ))
                    }
                }
            }
        };

        let device = self.target_device().await?;
        let mut request = ApiRequest::put("/me/player/play").query_opt("device_id", device);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await?;
        info!(
            "Playback started{}",
            uri.map(|u| format!(" for {}", u)).unwrap_or_default()
        );
        Ok(())
    }

    pub async fn pause_playback(&self) -> Result<(), SpotifyError> {
        let playing = self
            .playback_state()
            .await?
            .map(|state| state.is_playing)
            .unwrap_or(false);
        if !playing {
            info!("Nothing playing, pause skipped");
            return Ok(());
        }

        let device = self.target_device().await?;
        self.send(ApiRequest::put("/me/player/pause").query_opt("device_id", device))
            .await
    }

    pub async fn skip(&self, count: u32) -> Result<(), SpotifyError> {
        let device = self.target_device().await?;
        for _ in 0..count {
            self.send(ApiRequest::post("/me/player/next").query_opt("device_id", device.as_deref()))
                .await?;
        }
        info!("Skipped {} track(s)", count);
        Ok(())
    }

    pub async fn previous(&self) -> Result<(), SpotifyError> {
        let device = self.target_device().await?;
        self.send(ApiRequest::post("/me/player/previous").query_opt("device_id", device))
            .await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<(), SpotifyError> {
        let device = self.target_device().await?;
        self.send(
            ApiRequest::put("/me/player/seek")
                .query("position_ms", position_ms)
                .query_opt("device_id", device),
        )
        .await
    }

    pub async fn set_volume(&self, volume_percent: u8) -> Result<(), SpotifyError> {
        let device = self.target_device().await?;
        self.send(
            ApiRequest::put("/me/player/volume")
                .query("volume_percent", volume_percent)
                .query_opt("device_id", device),
        )
        .await
    }

    // ---- search ----

    pub async fn search(
        &self,
        query: &str,
        types: &[SearchType],
        limit: u32,
    ) -> Result<SearchResults, SpotifyError> {
        let response: SearchResponse = self
            .fetch(
                ApiRequest::get("/search")
                    .query("q", query)
                    .query("type", SearchType::join(types))
                    .query("limit", limit),
            )
            .await?
            .unwrap_or_default();

        let user_id = if types.contains(&SearchType::Playlist) {
            Some(self.current_user().await?.id.as_str())
        } else {
            None
        };

        let results = response.summarize(types, limit as usize, user_id);
        info!("Search for '{}' returned {} item(s)", query, results.total());
        Ok(results)
    }

    // ---- queue ----

    pub async fn queue(&self) -> Result<QueueSummary, SpotifyError> {
        let queue: ApiQueue = self.fetch_required(ApiRequest::get("/me/player/queue")).await?;
        let mut summary = queue.summarize();
        summary.currently_playing = self.current_track().await?;
        Ok(summary)
    }

    /// Queues a track/episode, or every track of an album in order. Returns
    /// how many items were queued.
    pub async fn add_to_queue(&self, target: &QueueTarget) -> Result<usize, SpotifyError> {
        let uris = match target {
            QueueTarget::Item(uri) => vec![uri.clone()],
            QueueTarget::Album(id) => {
                let album: ApiAlbum = self.fetch_required(ApiRequest::get(format!("/albums/{}", id))).await?;
                album
                    .tracks
                    .iter()
                    .flat_map(|page| page.present())
                    .filter_map(|t| t.id.as_ref())
                    .map(|id| format!("spotify:track:{}", id))
                    .collect()
            }
        };

        let device = self.target_device().await?;
        for uri in &uris {
            self.send(
                ApiRequest::post("/me/player/queue")
                    .query("uri", uri)
                    .query_opt("device_id", device.as_deref()),
            )
            .await?;
        }
        info!("Queued {} item(s)", uris.len());
        Ok(uris.len())
    }

    // ---- lookups ----

    pub async fn item_info(&self, uri: &ItemUri) -> Result<ItemInfo, SpotifyError> {
        let id = uri.id.as_str();
        let missing = || SpotifyError::RemoteService {
            status: 404,
            message: format!("{} has no usable id in the response", uri),
        };

        let info = match uri.kind {
            ItemKind::Track => {
                let track: ApiTrack = self.fetch_required(ApiRequest::get(format!("/tracks/{}", id))).await?;
                ItemInfo::Track(track.summarize(true).ok_or_else(missing)?)
            }
            ItemKind::Album => {
                let album: ApiAlbum = self.fetch_required(ApiRequest::get(format!("/albums/{}", id))).await?;
                ItemInfo::Album(album.summarize(true).ok_or_else(missing)?)
            }
            ItemKind::Artist => {
                let (artist, albums, top) = futures::try_join!(
                    self.fetch_required::<ApiArtist>(ApiRequest::get(format!("/artists/{}", id))),
                    self.fetch_required::<Paging<ApiAlbum>>(
                        ApiRequest::get(format!("/artists/{}/albums", id)).query("limit", ARTIST_ALBUMS_LIMIT)
                    ),
                    self.fetch_required::<TopTracks>(
                        ApiRequest::get(format!("/artists/{}/top-tracks", id)).query("market", TOP_TRACKS_MARKET)
                    ),
                )?;

                let mut summary = artist.summarize(true).ok_or_else(missing)?;
                summary.top_tracks = Some(summarize_tracks(top.tracks.iter().flatten()));
                summary.albums = Some(
                    albums
                        .present()
                        .filter_map(|a| a.summarize(false))
                        .collect::<Vec<AlbumSummary>>(),
                );
                ItemInfo::Artist(summary)
            }
            ItemKind::Playlist => {
                let playlist: ApiPlaylist = self
                    .fetch_required(ApiRequest::get(format!("/playlists/{}", id)))
                    .await?;
                let user_id = self.current_user().await?.id.as_str();
                info!("Retrieved playlist '{}'", playlist.name);
                ItemInfo::Playlist(playlist.summarize(Some(user_id), true).ok_or_else(missing)?)
            }
            ItemKind::Episode | ItemKind::Show => {
                return Err(SpotifyError::Validation(format!(
                    "item lookups support tracks, albums, artists and playlists, not {}",
                    uri.kind.as_str()
                )))
            }
        };

        Ok(info)
    }

    // ---- playlists ----

    pub async fn user_playlists(&self) -> Result<Vec<PlaylistSummary>, SpotifyError> {
        let page: Paging<ApiPlaylist> = self
            .fetch_required(ApiRequest::get("/me/playlists").query("limit", PLAYLIST_PAGE_LIMIT))
            .await?;
        let user_id = self.current_user().await?.id.as_str();

        Ok(page
            .present()
            .filter_map(|p| p.summarize(Some(user_id), false))
            .collect())
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackSummary>, SpotifyError> {
        let page: Paging<PlaylistEntry> = self
            .fetch_required(
                ApiRequest::get(format!("/playlists/{}/tracks", playlist_id))
                    .query("limit", PLAYLIST_TRACKS_LIMIT),
            )
            .await?;

        Ok(summarize_tracks(page.present().filter_map(|e| e.track.as_ref())))
    }

    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> Result<PlaylistSummary, SpotifyError> {
        let user_id = self.current_user().await?.id.clone();
        let mut body = json!({ "name": name, "public": public });
        if let Some(description) = description {
            body["description"] = json!(description);
        }

        let playlist: ApiPlaylist = self
            .fetch_required(ApiRequest::post(format!("/users/{}/playlists", user_id)).json(body))
            .await?;
        info!("Created playlist '{}'", playlist.name);

        playlist
            .summarize(Some(user_id.as_str()), false)
            .ok_or_else(|| SpotifyError::RemoteService {
                status: 201,
                message: "created playlist has no id".to_string(),
            })
    }

    pub async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        track_uris: &[String],
    ) -> Result<(), SpotifyError> {
        for chunk in track_uris.chunks(PLAYLIST_BATCH) {
            self.send(
                ApiRequest::post(format!("/playlists/{}/tracks", playlist_id))
                    .json(json!({ "uris": chunk })),
            )
            .await?;
        }
        info!("Added {} track(s) to playlist {}", track_uris.len(), playlist_id);
        Ok(())
    }

    /// Removes every occurrence of each track.
    pub async fn remove_tracks_from_playlist(
        &self,
        playlist_id: &str,
        track_uris: &[String],
    ) -> Result<(), SpotifyError> {
        for chunk in track_uris.chunks(PLAYLIST_BATCH) {
            let tracks: Vec<Value> = chunk.iter().map(|uri| json!({ "uri": uri })).collect();
            self.send(
                ApiRequest::delete(format!("/playlists/{}/tracks", playlist_id))
                    .json(json!({ "tracks": tracks })),
            )
            .await?;
        }
        info!("Removed {} track(s) from playlist {}", track_uris.len(), playlist_id);
        Ok(())
    }

    pub async fn change_playlist_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let mut body = json!({});
        if let Some(name) = name {
            body["name"] = json!(name);
        }
        if let Some(description) = description {
            body["description"] = json!(description);
        }

        self.send(ApiRequest::put(format!("/playlists/{}", playlist_id)).json(body))
            .await
    }

    // ---- devices ----

    pub async fn devices(&self) -> Result<Vec<Device>, SpotifyError> {
        let list: Option<DeviceList> = self.fetch(ApiRequest::get("/me/player/devices")).await?;
        Ok(list.map(|l| l.devices).unwrap_or_default())
    }
}
