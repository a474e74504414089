use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::playback::error::ControlError;
use crate::playback::renderer::AudioRenderer;
use crate::playback::session::{Cue, PlaybackSession, PlaybackStatus};
use crate::playback::track::Playlist;

/// What to do when the selected track has no preview.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingPreviewPolicy {
    /// Surface `NoPreviewAvailable` and do not move.
    #[default]
    Halt,
    /// Move on to the nearest playable track in the direction of travel.
    Skip,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Owns the single playback session and the renderer handle. Commands and
/// renderer events must be dispatched from one place, one at a time.
pub struct PlaybackController<R: AudioRenderer> {
    renderer: R,
    session: PlaybackSession,
    policy: MissingPreviewPolicy,
    active: Option<Cue>,
    next_seq: u64,
}

impl<R: AudioRenderer> PlaybackController<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            session: PlaybackSession::default(),
            policy: MissingPreviewPolicy::default(),
            active: None,
            next_seq: 0,
        }
    }

    pub fn with_policy(mut self, policy: MissingPreviewPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn active_cue(&self) -> Option<Cue> {
        self.active
    }

    pub fn policy(&self) -> MissingPreviewPolicy {
        self.policy
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn load_playlist(&mut self, playlist: Playlist) {
        if self.session.is_active() {
            self.renderer.stop();
        }
        info!(tracks = playlist.len(), "loading playlist");
        self.session.playlist = playlist;
        self.session.reset();
        self.active = None;
    }

    pub fn play(&mut self, index: usize) -> Result<(), ControlError> {
        let len = self.session.playlist.len();
        if index >= len {
            return Err(ControlError::IndexOutOfRange { index, len });
        }
        if self.session.status == PlaybackStatus::Paused && self.session.current_index == Some(index) {
            self.resume();
            return Ok(());
        }
        let target = self.resolve_target(index, Direction::Forward)?;
        self.start(target)
    }

    pub fn pause(&mut self) {
        if self.session.status == PlaybackStatus::Playing {
            self.renderer.pause();
            self.session.status = PlaybackStatus::Paused;
            debug!(index = ?self.session.current_index, "paused");
        }
    }

    pub fn resume(&mut self) {
        if self.session.status == PlaybackStatus::Paused {
            self.renderer.resume();
            self.session.status = PlaybackStatus::Playing;
            debug!(index = ?self.session.current_index, "resumed");
        }
    }

    pub fn next(&mut self) -> Result<(), ControlError> {
        let Some(current) = self.session.current_index else { return Ok(()) };
        let target = current + 1;
        if target >= self.session.playlist.len() {
            debug!(current, "already at last track");
            return Ok(());
        }
        let target = self.resolve_target(target, Direction::Forward)?;
        self.start(target)
    }

    pub fn previous(&mut self) -> Result<(), ControlError> {
        let Some(current) = self.session.current_index else { return Ok(()) };
        if current == 0 {
            debug!("already at first track");
            return Ok(());
        }
        let target = self.resolve_target(current - 1, Direction::Backward)?;
        self.start(target)
    }

    pub fn stop(&mut self) {
        if self.session.is_active() {
            self.renderer.stop();
        }
        self.session.reset();
        self.active = None;
    }

    /// Completion of the track at `index`. Ignored unless `index` is still current.
    pub fn track_finished(&mut self, index: usize) -> Result<(), ControlError> {
        if !self.session.is_active() || self.session.current_index != Some(index) {
            debug!(index, current = ?self.session.current_index, "discarding stale completion");
            return Ok(());
        }
        self.advance(index)
    }

    /// Completion of a specific play request. Ignored unless `cue` is the active one.
    pub fn cue_finished(&mut self, cue: Cue) -> Result<(), ControlError> {
        if self.active != Some(cue) {
            debug!(index = cue.index, seq = cue.seq, "discarding stale completion");
            return Ok(());
        }
        self.advance(cue.index)
    }

    fn advance(&mut self, finished: usize) -> Result<(), ControlError> {
        let next = finished + 1;
        if next >= self.session.playlist.len() {
            info!(finished, "reached end of playlist");
            self.stop();
            return Ok(());
        }
        match self.resolve_target(next, Direction::Forward) {
            Ok(target) => self.start(target),
            Err(err) => {
                // the finished track is over, nothing is left to keep playing
                self.stop();
                match self.policy {
                    MissingPreviewPolicy::Halt => Err(err),
                    MissingPreviewPolicy::Skip => {
                        info!(finished, "no playable track left");
                        Ok(())
                    }
                }
            }
        }
    }

    /// `index` must be in bounds.
    fn resolve_target(&self, index: usize, dir: Direction) -> Result<usize, ControlError> {
        let playlist = &self.session.playlist;
        let Some(track) = playlist.get(index) else {
            return Err(ControlError::IndexOutOfRange { index, len: playlist.len() });
        };
        if track.is_playable() {
            return Ok(index);
        }
        let err = ControlError::NoPreviewAvailable { index, track_id: track.id };
        match self.policy {
            MissingPreviewPolicy::Halt => Err(err),
            MissingPreviewPolicy::Skip => {
                let found = match dir {
                    Direction::Forward => playlist.playable_from(index + 1),
                    Direction::Backward => index.checked_sub(1).and_then(|i| playlist.playable_before(i)),
                };
                match found {
                    Some(target) => {
                        info!(from = index, to = target, "skipping tracks without preview");
                        Ok(target)
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn start(&mut self, index: usize) -> Result<(), ControlError> {
        let (uri, track_id) = match self.session.playlist.get(index) {
            Some(track) => match &track.preview_uri {
                Some(uri) => (uri.clone(), track.id),
                None => return Err(ControlError::NoPreviewAvailable { index, track_id: track.id }),
            },
            None => return Err(ControlError::IndexOutOfRange { index, len: self.session.playlist.len() }),
        };

        if self.session.is_active() {
            self.renderer.stop();
        }

        self.next_seq += 1;
        let cue = Cue { index, seq: self.next_seq };
        match self.renderer.play(cue, &uri) {
            Ok(()) => {
                info!(index, seq = cue.seq, track_id, %uri, "playing track");
                self.session.current_index = Some(index);
                self.session.status = PlaybackStatus::Playing;
                self.active = Some(cue);
                Ok(())
            }
            Err(e) => {
                warn!(index, track_id, %uri, error = %e, "renderer refused track");
                self.session.reset();
                self.active = None;
                Err(e.into())
            }
        }
    }
}

impl<R: AudioRenderer> Drop for PlaybackController<R> {
    fn drop(&mut self) {
        if self.session.is_active() {
            self.renderer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::playback::error::PlaybackError;
    use crate::playback::track::Track;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Play(Cue, String),
        Pause,
        Resume,
        Stop,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        refuse: Arc<Mutex<Option<PlaybackError>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl AudioRenderer for Recorder {
        fn play(&mut self, cue: Cue, uri: &str) -> Result<(), PlaybackError> {
            if let Some(e) = self.refuse.lock().unwrap().take() {
                return Err(e);
            }
            self.calls.lock().unwrap().push(Call::Play(cue, uri.into()));
            Ok(())
        }
        fn pause(&mut self) {
            self.calls.lock().unwrap().push(Call::Pause);
        }
        fn resume(&mut self) {
            self.calls.lock().unwrap().push(Call::Resume);
        }
        fn stop(&mut self) {
            self.calls.lock().unwrap().push(Call::Stop);
        }
    }

    fn playlist(previews: &[Option<&str>]) -> Playlist {
        Playlist::new(
            previews
                .iter()
                .enumerate()
                .map(|(i, p)| Track::new(i as i64 + 1, &format!("t{i}"), "artist", *p, ""))
                .collect(),
        )
    }

    fn controller(previews: &[Option<&str>]) -> (PlaybackController<Recorder>, Recorder) {
        let rec = Recorder::default();
        let mut ctl = PlaybackController::new(rec.clone());
        ctl.load_playlist(playlist(previews));
        (ctl, rec)
    }

    fn state<R: AudioRenderer>(ctl: &PlaybackController<R>) -> (PlaybackStatus, Option<usize>) {
        (ctl.session().status, ctl.session().current_index)
    }

    #[test]
    fn play_sets_playing_at_index() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b"), Some("c")]);

        ctl.play(1).unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));
        assert_eq!(rec.calls(), vec![Call::Play(Cue { index: 1, seq: 1 }, "b".into())]);
    }

    #[test]
    fn play_out_of_range_leaves_state_alone() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);

        let err = ctl.play(5).unwrap_err();

        assert_eq!(err, ControlError::IndexOutOfRange { index: 5, len: 2 });
        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn play_without_preview_halts_by_default() {
        let (mut ctl, rec) = controller(&[Some("a"), None]);
        ctl.play(0).unwrap();
        rec.clear();

        let err = ctl.play(1).unwrap_err();

        assert_eq!(err, ControlError::NoPreviewAvailable { index: 1, track_id: 2 });
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(0)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn replay_stops_previous_instance_first() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(0).unwrap();
        ctl.play(1).unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                Call::Play(Cue { index: 0, seq: 1 }, "a".into()),
                Call::Stop,
                Call::Play(Cue { index: 1, seq: 2 }, "b".into()),
            ]
        );
    }

    #[test]
    fn pause_and_resume() {
        let (mut ctl, rec) = controller(&[Some("a")]);
        ctl.pause();
        assert!(rec.calls().is_empty());

        ctl.play(0).unwrap();
        ctl.pause();
        assert_eq!(state(&ctl), (PlaybackStatus::Paused, Some(0)));

        ctl.play(0).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(0)));
        assert_eq!(rec.calls()[1..], [Call::Pause, Call::Resume]);

        ctl.resume();
        assert_eq!(rec.calls().len(), 3);
    }

    #[test]
    fn next_at_end_is_noop() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(1).unwrap();
        rec.clear();

        ctl.next().unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn previous_at_start_is_noop() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(0).unwrap();
        rec.clear();

        ctl.previous().unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(0)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn next_and_previous_without_current_do_nothing() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);

        ctl.next().unwrap();
        ctl.previous().unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn next_from_paused_plays_following_track() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(0).unwrap();
        ctl.pause();
        rec.clear();

        ctl.next().unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));
        assert_eq!(rec.calls(), vec![Call::Stop, Call::Play(Cue { index: 1, seq: 2 }, "b".into())]);
    }

    #[test]
    fn finished_walks_playlist_then_stops() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);

        ctl.play(0).unwrap();
        ctl.track_finished(0).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));

        ctl.track_finished(1).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert_eq!(rec.calls().last(), Some(&Call::Stop));
    }

    #[test]
    fn stale_index_completion_is_discarded() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b"), Some("c")]);
        ctl.play(0).unwrap();
        ctl.next().unwrap();
        rec.clear();

        // late completion of track 0 after the user already skipped to 1
        ctl.track_finished(0).unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn stale_cue_is_discarded_even_for_same_index() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b"), Some("c")]);
        ctl.play(1).unwrap();
        let first = ctl.active_cue().unwrap();
        ctl.previous().unwrap();
        ctl.next().unwrap();
        rec.clear();

        ctl.cue_finished(first).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(1)));
        assert!(rec.calls().is_empty());

        let current = ctl.active_cue().unwrap();
        ctl.cue_finished(current).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(2)));
    }

    #[test]
    fn finished_while_stopped_is_ignored() {
        let (mut ctl, rec) = controller(&[Some("a")]);

        ctl.track_finished(0).unwrap();

        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn advance_onto_missing_preview_halts_and_stops() {
        let (mut ctl, rec) = controller(&[Some("a"), None, Some("c")]);
        ctl.play(0).unwrap();

        let err = ctl.track_finished(0).unwrap_err();

        assert_eq!(err, ControlError::NoPreviewAvailable { index: 1, track_id: 2 });
        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert_eq!(rec.calls().last(), Some(&Call::Stop));
    }

    #[test]
    fn skip_policy_moves_past_missing_previews() {
        let rec = Recorder::default();
        let mut ctl = PlaybackController::new(rec.clone()).with_policy(MissingPreviewPolicy::Skip);
        ctl.load_playlist(playlist(&[Some("a"), None, Some("c"), None]));

        ctl.play(1).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(2)));

        ctl.previous().unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(0)));

        ctl.track_finished(0).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Playing, Some(2)));

        // only a preview-less track remains
        ctl.track_finished(2).unwrap();
        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));

        let err = ctl.play(3).unwrap_err();
        assert_eq!(err, ControlError::NoPreviewAvailable { index: 3, track_id: 4 });
    }

    #[test]
    fn load_playlist_resets_from_any_state() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(1).unwrap();
        ctl.pause();
        rec.clear();

        ctl.load_playlist(playlist(&[Some("x")]));

        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert_eq!(ctl.session().playlist.len(), 1);
        assert_eq!(rec.calls(), vec![Call::Stop]);

        ctl.load_playlist(playlist(&[]));
        assert_eq!(rec.calls(), vec![Call::Stop]);
    }

    #[test]
    fn renderer_refusal_stops_session() {
        let (mut ctl, rec) = controller(&[Some("a"), Some("b")]);
        ctl.play(0).unwrap();
        *rec.refuse.lock().unwrap() = Some(PlaybackError::Blocked { uri: "b".into() });

        let err = ctl.next().unwrap_err();

        assert_eq!(err, ControlError::Playback(PlaybackError::Blocked { uri: "b".into() }));
        assert_eq!(state(&ctl), (PlaybackStatus::Stopped, None));
        assert!(ctl.active_cue().is_none());
    }

    #[test]
    fn dropping_active_controller_stops_renderer() {
        let (mut ctl, rec) = controller(&[Some("a")]);
        ctl.play(0).unwrap();

        drop(ctl);

        assert_eq!(rec.calls().last(), Some(&Call::Stop));
    }
}
