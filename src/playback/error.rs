use thiserror::Error;

/// Failure reported by an audio renderer, either synchronously from `play` or
/// later through its event channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("source blocked by config patterns: {uri}")]
    Blocked { uri: String },
    #[error("failed to fetch preview audio: {message}")]
    Fetch { message: String },
    #[error("failed to decode preview audio: {message}")]
    Decode { message: String },
    #[error("renderer unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("track index {index} out of range for playlist of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no preview available for track {track_id} at index {index}")]
    NoPreviewAvailable { index: usize, track_id: i64 },
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl ControlError {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::IndexOutOfRange { .. } => "index_out_of_range",
            ControlError::NoPreviewAvailable { .. } => "no_preview_available",
            ControlError::Playback(_) => "playback_error",
        }
    }
}
