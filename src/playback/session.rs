use serde::{Deserialize, Serialize};

use crate::playback::track::{Playlist, Track};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Tag attached to every renderer play request. `seq` is unique per controller,
/// so a replay of the same index still gets a fresh cue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Cue {
    pub index: usize,
    pub seq: u64,
}

/// `current_index` is `None` exactly when `status` is `Stopped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackSession {
    pub playlist: Playlist,
    pub current_index: Option<usize>,
    pub status: PlaybackStatus,
}

impl PlaybackSession {
    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.playlist.get(i))
    }

    pub fn is_active(&self) -> bool {
        self.status != PlaybackStatus::Stopped
    }

    pub(crate) fn reset(&mut self) {
        self.current_index = None;
        self.status = PlaybackStatus::Stopped;
    }
}
