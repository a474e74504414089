pub mod controller;
pub mod error;
pub mod renderer;
pub mod session;
pub mod track;

pub use controller::{MissingPreviewPolicy, PlaybackController};
pub use error::{ControlError, PlaybackError};
pub use renderer::{AudioRenderer, RendererEvent};
pub use session::{Cue, PlaybackSession, PlaybackStatus};
pub use track::{Playlist, Track};
