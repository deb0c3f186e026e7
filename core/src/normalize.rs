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

//! Reshapes Web API payloads into the compact summaries returned to agents.
//!
//! Brief summaries keep just enough to identify an item and act on it; the
//! detailed variants are used for single-item lookups.

use crate::models::{
    AlbumSummary, ApiAlbum, ApiArtist, ApiPlayback, ApiPlaylist, ApiQueue, ApiTrack, ArtistRef,
    ArtistSummary, PlaybackState, PlaylistSummary, QueueSummary, SearchResponse, SearchResults,
    TrackSummary,
};
use crate::uri::SearchType;

/// Formats milliseconds as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration(duration_ms: u64) -> String {
    let total_seconds = duration_ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Splits artists into the `artist` / `artists` pair used by the summaries.
fn attribute(artists: Vec<ArtistRef>) -> (Option<ArtistRef>, Vec<ArtistRef>) {
    if artists.len() == 1 {
        (artists.into_iter().next(), Vec::new())
    } else {
        (None, artists)
    }
}

fn artist_refs(artists: &[ApiArtist], detailed: bool) -> Vec<ArtistRef> {
    if detailed {
        artists
            .iter()
            .filter_map(|a| a.summarize(false))
            .map(ArtistRef::Detail)
            .collect()
    } else {
        artists
            .iter()
            .map(|a| ArtistRef::Name(a.name.clone()))
            .collect()
    }
}

pub fn summarize_tracks<'a>(tracks: impl IntoIterator<Item = &'a ApiTrack>) -> Vec<TrackSummary> {
    tracks
        .into_iter()
        .filter_map(|t| t.summarize(false))
        .collect()
}

impl ApiArtist {
    pub fn summarize(&self, detailed: bool) -> Option<ArtistSummary> {
        let id = self.id.clone()?;
        let mut summary = ArtistSummary {
            name: self.name.clone(),
            id,
            genres: None,
            popularity: None,
            followers: None,
            top_tracks: None,
            albums: None,
        };

        if detailed {
            summary.genres = self.genres.clone();
            summary.popularity = self.popularity;
            summary.followers = self.followers.as_ref().and_then(|f| f.total);
        }

        Some(summary)
    }
}

impl ApiTrack {
    /// `None` for items without an id, such as local files.
    pub fn summarize(&self, detailed: bool) -> Option<TrackSummary> {
        let id = self.id.clone()?;
        let (artist, artists) = attribute(artist_refs(&self.artists, detailed));

        let mut summary = TrackSummary {
            name: self.name.clone(),
            id,
            is_playing: None,
            album: None,
            track_number: None,
            duration_ms: None,
            duration: None,
            popularity: None,
            explicit: None,
            is_playable: self.is_playable.filter(|playable| !playable),
            artist,
            artists,
        };

        if detailed {
            summary.album = self.album.as_ref().and_then(|a| a.summarize(false));
            summary.track_number = self.track_number;
            summary.duration_ms = self.duration_ms;
            summary.duration = self.duration_ms.map(format_duration);
            summary.popularity = self.popularity;
            summary.explicit = self.explicit;
        }

        Some(summary)
    }
}

impl ApiAlbum {
    pub fn summarize(&self, detailed: bool) -> Option<AlbumSummary> {
        let id = self.id.clone()?;
        let (artist, artists) = attribute(artist_refs(&self.artists, detailed));

        let mut summary = AlbumSummary {
            name: self.name.clone(),
            id,
            artist,
            artists,
            tracks: None,
            total_tracks: None,
            release_date: None,
            genres: None,
            popularity: None,
            album_type: None,
        };

        if detailed {
            summary.tracks = Some(
                self.tracks
                    .as_ref()
                    .map(|page| summarize_tracks(page.present()))
                    .unwrap_or_default(),
            );
            summary.total_tracks = self.total_tracks;
            summary.release_date = self.release_date.clone();
            summary.genres = self.genres.clone();
            summary.popularity = self.popularity;
            summary.album_type = self.album_type.clone();
        }

        Some(summary)
    }
}

impl ApiPlaylist {
    /// `user_id` decides `user_is_owner`; pass `None` when unknown.
    pub fn summarize(&self, user_id: Option<&str>, detailed: bool) -> Option<PlaylistSummary> {
        let id = self.id.clone()?;
        let owner = self.owner.as_ref();
        let entries = self.tracks.as_ref();

        let mut summary = PlaylistSummary {
            name: self.name.clone(),
            id,
            owner: owner.map(|o| o.display_name.clone().unwrap_or_else(|| o.id.clone())),
            user_is_owner: matches!((owner, user_id), (Some(o), Some(user)) if o.id == user),
            total_tracks: entries
                .and_then(|p| p.total)
                .unwrap_or_else(|| entries.map_or(0, |p| p.present().count() as u32)),
            description: None,
            public: None,
            collaborative: None,
            tracks: None,
        };

        if detailed {
            summary.description = self.description.clone();
            summary.public = self.public;
            summary.collaborative = self.collaborative;
            summary.tracks = Some(
                entries
                    .map(|page| summarize_tracks(page.present().filter_map(|e| e.track.as_ref())))
                    .unwrap_or_default(),
            );
        }

        Some(summary)
    }
}

impl ApiPlayback {
    /// Currently playing item as a brief track summary carrying `is_playing`.
    /// `None` when the item is not a track (ads, episodes) or nothing plays.
    pub fn current_track(&self) -> Option<TrackSummary> {
        if let Some(kind) = self.currently_playing_type.as_deref() {
            if kind != "track" {
                return None;
            }
        }

        let mut track = self.item.as_ref()?.summarize(false)?;
        track.is_playing = Some(self.is_playing);
        Some(track)
    }

    pub fn summarize(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing,
            track: self.current_track(),
            device: self.device.clone(),
            progress_ms: self.progress_ms,
            progress: self.progress_ms.map(format_duration),
            shuffle: self.shuffle_state,
            repeat: self.repeat_state.clone(),
        }
    }
}

impl ApiQueue {
    pub fn summarize(&self) -> QueueSummary {
        QueueSummary {
            currently_playing: self.currently_playing.as_ref().and_then(|t| t.summarize(false)),
            queue: summarize_tracks(self.queue.iter().flatten()),
        }
    }
}

impl SearchResponse {
    /// Keeps the requested kinds only, each capped at `limit` entries.
    pub fn summarize(&self, types: &[SearchType], limit: usize, user_id: Option<&str>) -> SearchResults {
        let mut results = SearchResults::default();

        for kind in types {
            match kind {
                SearchType::Track => {
                    results.tracks = Some(
                        self.tracks
                            .iter()
                            .flat_map(|p| p.present())
                            .filter_map(|t| t.summarize(false))
                            .take(limit)
                            .collect(),
                    );
                }
                SearchType::Artist => {
                    results.artists = Some(
                        self.artists
                            .iter()
                            .flat_map(|p| p.present())
                            .filter_map(|a| a.summarize(false))
                            .take(limit)
                            .collect(),
                    );
                }
                SearchType::Album => {
                    results.albums = Some(
                        self.albums
                            .iter()
                            .flat_map(|p| p.present())
                            .filter_map(|a| a.summarize(false))
                            .take(limit)
                            .collect(),
                    );
                }
                SearchType::Playlist => {
                    results.playlists = Some(
                        self.playlists
                            .iter()
                            .flat_map(|p| p.present())
                            .filter_map(|p| p.summarize(user_id, false))
                            .take(limit)
                            .collect(),
                    );
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse<T: serde::de::DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    fn track_json() -> Value {
        json!({
            "id": "4iV5W9uYEdYUVa79Axb7Rh",
            "name": "Never Gonna Give You Up",
            "artists": [{ "id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley" }],
            "album": {
                "id": "6N9PS4QXF1D0OWPk0Sxtb4",
                "name": "Whenever You Need Somebody",
                "artists": [{ "id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley" }]
            },
            "duration_ms": 213573,
            "popularity": 77,
            "explicit": false,
            "track_number": 1,
            "is_playable": true
        })
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(213_573), "3:33");
        assert_eq!(format_duration(3_723_000), "1:02:03");
    }

    #[test]
    fn test_brief_track_has_single_artist_name() {
        let track: ApiTrack = parse(track_json());
        let summary = serde_json::to_value(track.summarize(false).unwrap()).unwrap();

        assert_eq!(
            summary,
            json!({
                "name": "Never Gonna Give You Up",
                "id": "4iV5W9uYEdYUVa79Axb7Rh",
                "artist": "Rick Astley"
            })
        );
    }

    #[test]
    fn test_detailed_track_includes_album_and_metadata() {
        let track: ApiTrack = parse(track_json());
        let summary = serde_json::to_value(track.summarize(true).unwrap()).unwrap();

        assert_eq!(summary["album"]["name"], "Whenever You Need Somebody");
        assert_eq!(summary["album"]["artist"], "Rick Astley");
        assert_eq!(summary["duration"], "3:33");
        assert_eq!(summary["popularity"], 77);
        assert_eq!(summary["artist"]["id"], "0gxyHStUsqpMadRV0Di1Qt");
        assert!(summary.get("is_playable").is_none());
    }

    #[test]
    fn test_unplayable_and_multi_artist_track() {
        let track: ApiTrack = parse(json!({
            "id": "t1",
            "name": "Duet",
            "artists": [{ "id": "a1", "name": "One" }, { "id": "a2", "name": "Two" }],
            "is_playable": false
        }));
        let summary = serde_json::to_value(track.summarize(false).unwrap()).unwrap();

        assert_eq!(summary["is_playable"], false);
        assert_eq!(summary["artists"], json!(["One", "Two"]));
        assert!(summary.get("artist").is_none());
    }

    #[test]
    fn test_local_track_without_id_is_dropped() {
        let track: ApiTrack = parse(json!({ "id": null, "name": "Local file" }));
        assert!(track.summarize(false).is_none());
    }

    #[test]
    fn test_detailed_artist_flattens_followers() {
        let artist: ApiArtist = parse(json!({
            "id": "a1",
            "name": "Band",
            "genres": ["rock"],
            "popularity": 50,
            "followers": { "href": null, "total": 1234 }
        }));

        let summary = artist.summarize(true).unwrap();
        assert_eq!(summary.followers, Some(1234));
        assert_eq!(summary.genres, Some(vec!["rock".to_string()]));
        assert!(artist.summarize(false).unwrap().followers.is_none());
    }

    #[test]
    fn test_detailed_album_lists_tracks() {
        let album: ApiAlbum = parse(json!({
            "id": "al1",
            "name": "Album",
            "artists": [{ "id": "a1", "name": "Band" }],
            "album_type": "album",
            "release_date": "1999-01-01",
            "total_tracks": 2,
            "tracks": { "items": [
                { "id": "t1", "name": "First", "artists": [{ "id": "a1", "name": "Band" }] },
                null,
                { "id": "t2", "name": "Second", "artists": [{ "id": "a1", "name": "Band" }] }
            ], "total": 2 }
        }));

        let summary = album.summarize(true).unwrap();
        let tracks = summary.tracks.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].name, "Second");
        assert_eq!(summary.release_date.as_deref(), Some("1999-01-01"));
    }

    #[test]
    fn test_playlist_ownership_and_totals() {
        let playlist: ApiPlaylist = parse(json!({
            "id": "p1",
            "name": "Mine",
            "owner": { "id": "user-1", "display_name": "User One" },
            "tracks": { "href": "https://api.spotify.com/v1/playlists/p1/tracks", "total": 42 }
        }));

        let owned = playlist.summarize(Some("user-1"), false).unwrap();
        assert!(owned.user_is_owner);
        assert_eq!(owned.owner.as_deref(), Some("User One"));
        assert_eq!(owned.total_tracks, 42);
        assert!(owned.tracks.is_none());

        let foreign = playlist.summarize(Some("someone-else"), false).unwrap();
        assert!(!foreign.user_is_owner);
        assert!(!playlist.summarize(None, false).unwrap().user_is_owner);
    }

    #[test]
    fn test_detailed_playlist_skips_missing_tracks() {
        let playlist: ApiPlaylist = parse(json!({
            "id": "p1",
            "name": "Mixed",
            "description": "desc",
            "public": false,
            "collaborative": true,
            "owner": { "id": "user-1" },
            "tracks": { "total": 3, "items": [
                { "track": { "id": "t1", "name": "One", "artists": [] } },
                { "track": null },
                { "track": { "id": null, "name": "Local" } }
            ]}
        }));

        let summary = playlist.summarize(None, true).unwrap();
        assert_eq!(summary.owner.as_deref(), Some("user-1"));
        assert_eq!(summary.tracks.as_ref().unwrap().len(), 1);
        assert_eq!(summary.total_tracks, 3);
        assert_eq!(summary.collaborative, Some(true));
    }

    #[test]
    fn test_non_track_playback_has_no_current_track() {
        let playback: ApiPlayback = parse(json!({
            "is_playing": true,
            "currently_playing_type": "episode",
            "item": { "id": "e1", "name": "Podcast" }
        }));
        assert!(playback.current_track().is_none());

        let playback: ApiPlayback = parse(json!({
            "is_playing": false,
            "progress_ms": 61000,
            "shuffle_state": true,
            "repeat_state": "context",
            "currently_playing_type": "track",
            "device": { "id": "d1", "name": "Desk", "type": "Computer", "is_active": true },
            "item": track_json()
        }));
        let state = playback.summarize();
        assert_eq!(state.track.unwrap().is_playing, Some(false));
        assert_eq!(state.progress.as_deref(), Some("1:01"));
        assert_eq!(state.device.unwrap().name, "Desk");
        assert_eq!(state.repeat.as_deref(), Some("context"));
    }

    #[test]
    fn test_search_summary_caps_each_kind() {
        let response: SearchResponse = parse(json!({
            "tracks": { "items": [
                { "id": "t1", "name": "A" },
                { "id": "t2", "name": "B" },
                { "id": "t3", "name": "C" }
            ]},
            "artists": { "items": [{ "id": "a1", "name": "Artist" }] }
        }));

        let results = response.summarize(&[SearchType::Track], 2, None);
        assert_eq!(results.tracks.as_ref().unwrap().len(), 2);
        assert!(results.artists.is_none());

        let results = response.summarize(&[SearchType::Artist, SearchType::Album], 10, None);
        assert_eq!(results.artists.unwrap().len(), 1);
        assert_eq!(results.albums, Some(Vec::new()));
    }
}
