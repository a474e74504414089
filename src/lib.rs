//! Speed-aware preview player: a playlist sequencing controller plus the node
//! that feeds it playlists fetched for the listener's current speed.

pub mod api;
pub mod audio;
pub mod cli;
pub mod config;
pub mod location;
pub mod middleware;
pub mod node;
pub mod playback;
pub mod playlist;
pub mod state;
