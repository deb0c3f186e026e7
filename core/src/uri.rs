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

//! Spotify URI and id handling, validated through `rspotify`'s typed ids.

use std::fmt;
use std::str::FromStr;

use rspotify::model::{AlbumId, ArtistId, EpisodeId, PlaylistId, ShowId, TrackId};
use rspotify::prelude::*;

use crate::error::SpotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Track,
    Episode,
    Album,
    Artist,
    Playlist,
    Show,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Track => "track",
            ItemKind::Episode => "episode",
            ItemKind::Album => "album",
            ItemKind::Artist => "artist",
            ItemKind::Playlist => "playlist",
            ItemKind::Show => "show",
        }
    }

    /// Tracks and episodes are played as `uris`, everything else as a
    /// `context_uri`.
    pub fn is_playable_item(&self) -> bool {
        matches!(self, ItemKind::Track | ItemKind::Episode)
    }
}

impl FromStr for ItemKind {
    type Err = SpotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(ItemKind::Track),
            "episode" => Ok(ItemKind::Episode),
            "album" => Ok(ItemKind::Album),
            "artist" => Ok(ItemKind::Artist),
            "playlist" => Ok(ItemKind::Playlist),
            "show" => Ok(ItemKind::Show),
            other => Err(SpotifyError::Validation(format!(
                "unsupported Spotify item type '{}'",
                other
            ))),
        }
    }
}

/// A validated `spotify:<kind>:<id>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUri {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemUri {
    pub fn parse(uri: &str) -> Result<Self, SpotifyError> {
        let invalid = || {
            SpotifyError::Validation(format!(
                "'{}' is not a Spotify URI of the form spotify:<type>:<id>",
                uri
            ))
        };

        let mut parts = uri.trim().split(':');
        let (Some("spotify"), Some(kind), Some(id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let kind: ItemKind = kind.parse()?;
        let valid = match kind {
            ItemKind::Track => TrackId::from_id(id).is_ok(),
            ItemKind::Episode => EpisodeId::from_id(id).is_ok(),
            ItemKind::Album => AlbumId::from_id(id).is_ok(),
            ItemKind::Artist => ArtistId::from_id(id).is_ok(),
            ItemKind::Playlist => PlaylistId::from_id(id).is_ok(),
            ItemKind::Show => ShowId::from_id(id).is_ok(),
        };

        if !valid || id.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ItemUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spotify:{}:{}", self.kind.as_str(), self.id)
    }
}

/// Accepts a bare track id or a track URI and returns the track URI.
pub fn track_uri(id_or_uri: &str) -> Result<String, SpotifyError> {
    TrackId::from_id_or_uri(id_or_uri.trim())
        .map(|id| id.uri())
        .map_err(|_| SpotifyError::Validation(format!("'{}' is not a valid track id", id_or_uri)))
}

pub fn track_uris(ids: &[String]) -> Result<Vec<String>, SpotifyError> {
    ids.iter().map(|id| track_uri(id)).collect()
}

/// Accepts a bare playlist id or a playlist URI and returns the bare id.
pub fn playlist_id(id_or_uri: &str) -> Result<String, SpotifyError> {
    PlaylistId::from_id_or_uri(id_or_uri.trim())
        .map(|id| id.id().to_string())
        .map_err(|_| {
            SpotifyError::Validation(format!("'{}' is not a valid playlist id", id_or_uri))
        })
}

/// What `add_to_queue` should enqueue: one playable item, or a whole album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    Item(String),
    Album(String),
}

impl QueueTarget {
    /// Bare ids are taken to be tracks.
    pub fn parse(id_or_uri: &str) -> Result<Self, SpotifyError> {
        let trimmed = id_or_uri.trim();
        if !trimmed.contains(':') {
            return track_uri(trimmed).map(QueueTarget::Item);
        }

        let uri = ItemUri::parse(trimmed)?;
        match uri.kind {
            ItemKind::Album => Ok(QueueTarget::Album(uri.id)),
            kind if kind.is_playable_item() => Ok(QueueTarget::Item(uri.to_string())),
            kind => Err(SpotifyError::Validation(format!(
                "cannot queue a {}; use a track, episode or album",
                kind.as_str()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Track,
    Album,
    Artist,
    Playlist,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Track => "track",
            SearchType::Album => "album",
            SearchType::Artist => "artist",
            SearchType::Playlist => "playlist",
        }
    }

    /// Parses a comma-separated list such as `"track, album"`.
    pub fn parse_list(qtype: &str) -> Result<Vec<Self>, SpotifyError> {
        let mut types = Vec::new();
        for raw in qtype.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let kind = match raw {
                "track" => SearchType::Track,
                "album" => SearchType::Album,
                "artist" => SearchType::Artist,
                "playlist" => SearchType::Playlist,
                other => {
                    return Err(SpotifyError::Validation(format!(
                        "unknown query type '{}'; expected track, album, artist or playlist",
                        other
                    )))
                }
            };
            if !types.contains(&kind) {
                types.push(kind);
            }
        }

        if types.is_empty() {
            return Err(SpotifyError::Validation(
                "qtype must name at least one of track, album, artist, playlist".to_string(),
            ));
        }
        Ok(types)
    }

    pub fn join(types: &[SearchType]) -> String {
        types
            .iter()
            .map(SearchType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = "4iV5W9uYEdYUVa79Axb7Rh";

    #[test]
    fn test_item_uri_parses_known_kinds() {
        let uri = ItemUri::parse(&format!("spotify:track:{}", TRACK)).unwrap();
        assert_eq!(uri.kind, ItemKind::Track);
        assert_eq!(uri.id, TRACK);
        assert_eq!(uri.to_string(), format!("spotify:track:{}", TRACK));

        let uri = ItemUri::parse("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap();
        assert_eq!(uri.kind, ItemKind::Playlist);
    }

    #[test]
    fn test_item_uri_rejects_malformed_input() {
        for bad in [
            "",
            TRACK,
            "invalid:uri",
            "spotify:track",
            "spotify:track:",
            "spotify:track:abc:def",
            "spotify:user:someone",
            "spotify:track:not-an-id!",
        ] {
            assert!(
                matches!(ItemUri::parse(bad), Err(SpotifyError::Validation(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_track_uri_accepts_id_or_uri() {
        let expected = format!("spotify:track:{}", TRACK);
        assert_eq!(track_uri(TRACK).unwrap(), expected);
        assert_eq!(track_uri(&expected).unwrap(), expected);
        assert!(track_uri("spotify:album:6N9PS4QXF1D0OWPk0Sxtb4").is_err());
    }

    #[test]
    fn test_playlist_id_strips_uri() {
        assert_eq!(
            playlist_id("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(playlist_id("37i9dQZF1DXcBWIGoYBM5M").unwrap(), "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn test_queue_target() {
        assert_eq!(
            QueueTarget::parse(TRACK).unwrap(),
            QueueTarget::Item(format!("spotify:track:{}", TRACK))
        );
        assert_eq!(
            QueueTarget::parse("spotify:album:6N9PS4QXF1D0OWPk0Sxtb4").unwrap(),
            QueueTarget::Album("6N9PS4QXF1D0OWPk0Sxtb4".to_string())
        );
        assert!(QueueTarget::parse("spotify:artist:0gxyHStUsqpMadRV0Di1Qt").is_err());
    }

    #[test]
    fn test_search_type_list() {
        assert_eq!(
            SearchType::parse_list("track, album,track").unwrap(),
            vec![SearchType::Track, SearchType::Album]
        );
        assert_eq!(SearchType::join(&[SearchType::Artist, SearchType::Playlist]), "artist,playlist");
        assert!(SearchType::parse_list("track,podcast").is_err());
        assert!(SearchType::parse_list(" , ").is_err());
    }
}
