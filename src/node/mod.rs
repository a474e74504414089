use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::playback::{AudioRenderer, ControlError, PlaybackController, PlaybackSession, Playlist, RendererEvent};

#[derive(Debug, Clone)]
pub enum Command {
    LoadPlaylist(Playlist),
    Play(usize),
    Pause,
    Resume,
    Next,
    Previous,
    Stop,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    Session { session: PlaybackSession },
    Error { kind: &'static str, message: String, index: Option<usize> },
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("playback node is not running")]
    Closed,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<PlaybackSession, ControlError>>,
}

#[derive(Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<Request>,
    session: watch::Receiver<PlaybackSession>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeHandle {
    /// Queue `command` behind any in-flight work and wait for the resulting session.
    pub async fn send(&self, command: Command) -> Result<PlaybackSession, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Request { command, reply }).await.map_err(|_| NodeError::Closed)?;
        rx.await.map_err(|_| NodeError::Closed)?.map_err(NodeError::from)
    }

    pub fn snapshot(&self) -> PlaybackSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}

/// Move `controller` into its own task. Commands from every [`NodeHandle`] and
/// events from the renderer are applied one at a time in arrival order.
pub fn spawn_node<R>(
    controller: PlaybackController<R>,
    renderer_events: mpsc::UnboundedReceiver<RendererEvent>,
) -> (NodeHandle, JoinHandle<()>)
where
    R: AudioRenderer + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);
    let (session_tx, session_rx) = watch::channel(controller.session().clone());
    let (events, _) = broadcast::channel(64);
    let handle = NodeHandle { tx, session: session_rx, events: events.clone() };
    let task = tokio::spawn(run(controller, rx, renderer_events, session_tx, events));
    (handle, task)
}

async fn run<R: AudioRenderer>(
    mut controller: PlaybackController<R>,
    mut requests: mpsc::Receiver<Request>,
    mut renderer_events: mpsc::UnboundedReceiver<RendererEvent>,
    session_tx: watch::Sender<PlaybackSession>,
    events: broadcast::Sender<NodeEvent>,
) {
    let mut renderer_open = true;
    loop {
        tokio::select! {
            req = requests.recv() => {
                let Some(Request { command, reply }) = req else { break };
                debug!(?command, "applying command");
                let result = apply(&mut controller, command);
                publish(&controller, &session_tx, &events);
                let _ = reply.send(result.map(|()| controller.session().clone()));
            }
            ev = renderer_events.recv(), if renderer_open => {
                match ev {
                    None => {
                        warn!("renderer event channel closed");
                        renderer_open = false;
                    }
                    Some(RendererEvent::Finished(cue)) => {
                        if let Err(e) = controller.cue_finished(cue) {
                            warn!(index = cue.index, %e, "could not advance after track finished");
                            let _ = events.send(error_event(&e, Some(cue.index)));
                        }
                    }
                    Some(RendererEvent::Failed { cue, error }) => {
                        if controller.active_cue() == Some(cue) {
                            warn!(index = cue.index, seq = cue.seq, %error, "playback failed; stopping");
                            controller.stop();
                            let _ = events.send(error_event(&ControlError::Playback(error), Some(cue.index)));
                        } else {
                            debug!(index = cue.index, seq = cue.seq, %error, "ignoring failure of superseded track");
                        }
                    }
                }
                publish(&controller, &session_tx, &events);
            }
        }
    }
    info!("playback node stopped");
}

fn apply<R: AudioRenderer>(controller: &mut PlaybackController<R>, command: Command) -> Result<(), ControlError> {
    match command {
        Command::LoadPlaylist(playlist) => {
            controller.load_playlist(playlist);
            Ok(())
        }
        Command::Play(index) => controller.play(index),
        Command::Pause => {
            controller.pause();
            Ok(())
        }
        Command::Resume => {
            controller.resume();
            Ok(())
        }
        Command::Next => controller.next(),
        Command::Previous => controller.previous(),
        Command::Stop => {
            controller.stop();
            Ok(())
        }
    }
}

fn publish<R: AudioRenderer>(
    controller: &PlaybackController<R>,
    session_tx: &watch::Sender<PlaybackSession>,
    events: &broadcast::Sender<NodeEvent>,
) {
    let current = controller.session();
    let changed = session_tx.send_if_modified(|s| {
        if s != current {
            *s = current.clone();
            true
        } else {
            false
        }
    });
    if changed {
        let _ = events.send(NodeEvent::Session { session: current.clone() });
    }
}

fn error_event(e: &ControlError, index: Option<usize>) -> NodeEvent {
    NodeEvent::Error { kind: e.kind(), message: e.to_string(), index }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::playback::{Cue, PlaybackError, PlaybackStatus, Track};

    pub(crate) struct Silent;

    impl AudioRenderer for Silent {
        fn play(&mut self, _cue: Cue, _uri: &str) -> Result<(), PlaybackError> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {}
    }

    pub(crate) fn spawn_recording_node() -> (NodeHandle, mpsc::UnboundedSender<RendererEvent>) {
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let (handle, _task) = spawn_node(PlaybackController::new(Silent), ev_rx);
        (handle, ev_tx)
    }

    fn two_tracks() -> Playlist {
        Playlist::new(vec![Track::new(1, "a", "x", Some("a.mp3"), ""), Track::new(2, "b", "y", Some("b.mp3"), "")])
    }

    async fn next_session(events: &mut broadcast::Receiver<NodeEvent>) -> PlaybackSession {
        loop {
            if let NodeEvent::Session { session } = events.recv().await.unwrap() {
                return session;
            }
        }
    }

    #[tokio::test]
    async fn commands_return_resulting_session() {
        let (node, _ev) = spawn_recording_node();

        node.send(Command::LoadPlaylist(two_tracks())).await.unwrap();
        let session = node.send(Command::Play(1)).await.unwrap();

        assert_eq!(session.status, PlaybackStatus::Playing);
        assert_eq!(session.current_index, Some(1));
        assert_eq!(node.snapshot(), session);
    }

    #[tokio::test]
    async fn control_errors_reach_the_caller() {
        let (node, _ev) = spawn_recording_node();
        node.send(Command::LoadPlaylist(two_tracks())).await.unwrap();

        let err = node.send(Command::Play(9)).await.unwrap_err();

        assert!(matches!(err, NodeError::Control(ControlError::IndexOutOfRange { index: 9, len: 2 })));
        assert_eq!(node.snapshot().status, PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn finished_events_advance_and_stale_ones_are_dropped() {
        let (node, ev) = spawn_recording_node();
        let mut events = node.subscribe();
        node.send(Command::LoadPlaylist(two_tracks())).await.unwrap();
        node.send(Command::Play(0)).await.unwrap();
        let _ = next_session(&mut events).await;
        let _ = next_session(&mut events).await;

        // seq 1 was the only cue issued so far
        ev.send(RendererEvent::Finished(Cue { index: 0, seq: 7 })).unwrap();
        ev.send(RendererEvent::Finished(Cue { index: 0, seq: 1 })).unwrap();

        let session = next_session(&mut events).await;
        assert_eq!(session.current_index, Some(1));
        assert_eq!(session.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn failure_of_active_track_stops_and_is_broadcast() {
        let (node, ev) = spawn_recording_node();
        let mut events = node.subscribe();
        node.send(Command::LoadPlaylist(two_tracks())).await.unwrap();
        node.send(Command::Play(0)).await.unwrap();

        let error = PlaybackError::Fetch { message: "timed out".into() };
        ev.send(RendererEvent::Failed { cue: Cue { index: 0, seq: 1 }, error }).unwrap();

        let mut saw_error = false;
        loop {
            match events.recv().await.unwrap() {
                NodeEvent::Error { kind, index, .. } => {
                    assert_eq!(kind, "playback_error");
                    assert_eq!(index, Some(0));
                    saw_error = true;
                }
                NodeEvent::Session { session } if session.status == PlaybackStatus::Stopped && saw_error => break,
                NodeEvent::Session { .. } => {}
            }
        }
        assert!(node.snapshot().current_index.is_none());
    }
}
