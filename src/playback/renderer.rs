use crate::playback::error::PlaybackError;
use crate::playback::session::Cue;

/// Audio output driven by the controller. Every call is fire-and-forget:
/// completion and late failures come back as [`RendererEvent`]s.
pub trait AudioRenderer {
    fn play(&mut self, cue: Cue, uri: &str) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

impl<R: AudioRenderer + ?Sized> AudioRenderer for Box<R> {
    fn play(&mut self, cue: Cue, uri: &str) -> Result<(), PlaybackError> {
        (**self).play(cue, uri)
    }
    fn pause(&mut self) {
        (**self).pause()
    }
    fn resume(&mut self) {
        (**self).resume()
    }
    fn stop(&mut self) {
        (**self).stop()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    Finished(Cue),
    Failed { cue: Cue, error: PlaybackError },
}
