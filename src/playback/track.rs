use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(rename = "preview", default, deserialize_with = "blank_as_none")]
    pub preview_uri: Option<String>,
    #[serde(default)]
    pub link: String,
}

impl Track {
    pub fn new(id: i64, title: &str, artist: &str, preview_uri: Option<&str>, link: &str) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            preview_uri: preview_uri.filter(|p| !p.trim().is_empty()).map(Into::into),
            link: link.into(),
        }
    }

    pub fn is_playable(&self) -> bool {
        self.preview_uri.is_some()
    }
}

fn blank_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

/// Ordered track list returned for one speed query. Ids are unique: the first
/// occurrence of an id wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut seen = HashSet::with_capacity(tracks.len());
        let before = tracks.len();
        let tracks: Vec<Track> = tracks.into_iter().filter(|t| seen.insert(t.id)).collect();
        if tracks.len() != before {
            warn!(dropped = before - tracks.len(), "playlist contained duplicate track ids");
        }
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// First playable index at or after `from`.
    pub fn playable_from(&self, from: usize) -> Option<usize> {
        (from..self.tracks.len()).find(|&i| self.tracks[i].is_playable())
    }

    /// Last playable index at or before `from`.
    pub fn playable_before(&self, from: usize) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let upper = from.min(self.tracks.len() - 1);
        (0..=upper).rev().find(|&i| self.tracks[i].is_playable())
    }
}

impl From<Vec<Track>> for Playlist {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}

impl<'de> Deserialize<'de> for Playlist {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Track>::deserialize(de).map(Playlist::new)
    }
}
