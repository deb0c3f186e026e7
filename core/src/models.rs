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

use serde::{Deserialize, Serialize};
use std::fmt;

// Web API payloads. Deserialization is lenient: optional fields may be
// absent and result pages may contain `null` entries.

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    // A path default keeps serde from demanding `T: Default`.
    #[serde(default = "Vec::new")]
    pub items: Vec<Option<T>>,
    #[serde(default)]
    pub total: Option<u32>,
}

impl<T> Paging<T> {
    pub fn present(&self) -> impl Iterator<Item = &T> {
        self.items.iter().flatten()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Followers {
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub followers: Option<Followers>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAlbum {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub tracks: Option<Paging<ApiTrack>>,
}

/// Tracks, and the episodes that show up where tracks are expected.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    #[serde(default)]
    pub album: Option<ApiAlbum>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub is_playable: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub track: Option<ApiTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPlaylist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: Option<bool>,
    #[serde(default)]
    pub owner: Option<UserProfile>,
    #[serde(default)]
    pub tracks: Option<Paging<PlaylistEntry>>,
}

/// Playback snapshot as returned by both `/me/player` and
/// `/me/player/currently-playing`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPlayback {
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub shuffle_state: Option<bool>,
    #[serde(default)]
    pub repeat_state: Option<String>,
    #[serde(default)]
    pub currently_playing_type: Option<String>,
    #[serde(default)]
    pub item: Option<ApiTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiQueue {
    #[serde(default)]
    pub currently_playing: Option<ApiTrack>,
    #[serde(default)]
    pub queue: Vec<Option<ApiTrack>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<Paging<ApiTrack>>,
    #[serde(default)]
    pub artists: Option<Paging<ApiArtist>>,
    #[serde(default)]
    pub albums: Option<Paging<ApiAlbum>>,
    #[serde(default)]
    pub playlists: Option<Paging<ApiPlaylist>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopTracks {
    #[serde(default)]
    pub tracks: Vec<Option<ApiTrack>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

// Shapes handed back to the calling agent.

/// The signed-in user. Also used for playlist owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_percent: Option<u32>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}){}",
            self.name,
            self.kind,
            if self.is_active { " [active]" } else { "" }
        )
    }
}

/// Artists are listed by name in brief summaries and as objects in detailed
/// ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtistRef {
    Name(String),
    Detail(ArtistSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistSummary {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_tracks: Option<Vec<TrackSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albums: Option<Vec<AlbumSummary>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit: Option<bool>,
    /// Only present (as `false`) when Spotify reports the track unplayable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<ArtistRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumSummary {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<ArtistRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<ArtistRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<TrackSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tracks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistSummary {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub user_is_owner: bool,
    pub total_tracks: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<TrackSummary>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSummary {
    pub currently_playing: Option<TrackSummary>,
    pub queue: Vec<TrackSummary>,
}

/// Only the requested kinds are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<TrackSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artists: Option<Vec<ArtistSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albums: Option<Vec<AlbumSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlists: Option<Vec<PlaylistSummary>>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.tracks.as_ref().map_or(0, Vec::len)
            + self.artists.as_ref().map_or(0, Vec::len)
            + self.albums.as_ref().map_or(0, Vec::len)
            + self.playlists.as_ref().map_or(0, Vec::len)
    }
}

/// Detailed lookup result for any supported item type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemInfo {
    Track(TrackSummary),
    Album(AlbumSummary),
    Artist(ArtistSummary),
    Playlist(PlaylistSummary),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paging_skips_null_entries() {
        let page: Paging<ApiArtist> = serde_json::from_value(json!({
            "items": [null, { "id": "a1", "name": "Artist" }, null],
            "total": 3
        }))
        .unwrap();

        let present: Vec<_> = page.present().collect();
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].name, "Artist");
        assert_eq!(page.total, Some(3));
    }

    #[test]
    fn test_device_round_trips_type_field() {
        let device: Device = serde_json::from_value(json!({
            "id": "dev-1",
            "name": "Kitchen",
            "type": "Speaker",
            "is_active": true,
            "volume_percent": 40,
            "is_private_session": false
        }))
        .unwrap();

        assert_eq!(device.kind, "Speaker");
        assert_eq!(device.to_string(), "Kitchen (Speaker) [active]");

        let back = serde_json::to_value(&device).unwrap();
        assert_eq!(back["type"], "Speaker");
        assert!(back.get("kind").is_none());
    }

    #[test]
    fn test_search_results_omit_unrequested_kinds() {
        let results = SearchResults {
            tracks: Some(Vec::new()),
            ..Default::default()
        };

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value, json!({ "tracks": [] }));
        assert_eq!(results.total(), 0);
    }

    #[test]
    fn test_episode_shaped_item_deserializes_as_track() {
        let item: ApiTrack = serde_json::from_value(json!({
            "id": "ep1",
            "name": "Episode One",
            "duration_ms": 1200000,
            "type": "episode"
        }))
        .unwrap();

        assert!(item.artists.is_empty());
        assert_eq!(item.duration_ms, Some(1_200_000));
    }
}
