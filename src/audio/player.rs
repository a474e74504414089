use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::decoder::PreviewDecoder;
use crate::audio::source::{is_uri_allowed, prepare_source};
use crate::config::EffectiveConfig;
use crate::playback::{AudioRenderer, Cue, PlaybackError, RendererEvent};

const CHANNELS: usize = 2;
const FRAMES_PER_SECOND: u32 = 50;

/// What goes out on the PCM stream: a `Start` header per track, then 20 ms
/// frames of interleaved stereo s16le.
#[derive(Debug, Clone)]
pub enum StreamPacket {
    Start { cue: Cue, sample_rate: u32, channels: u16 },
    Pcm(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Playing,
    Paused,
    Stopped,
}

enum Outcome {
    Completed,
    Stopped,
}

/// One track's worth of playback. Runs until end of stream or `stop()`.
pub struct PreviewPlayer {
    id: Uuid,
    cue: Cue,
    uri: String,
    transport: watch::Sender<Transport>,
    out_tx: broadcast::Sender<StreamPacket>,
    events: mpsc::UnboundedSender<RendererEvent>,
    http: reqwest::Client,
}

impl PreviewPlayer {
    fn new(
        cue: Cue,
        uri: &str,
        out_tx: broadcast::Sender<StreamPacket>,
        events: mpsc::UnboundedSender<RendererEvent>,
        http: reqwest::Client,
    ) -> Self {
        let (transport, _) = watch::channel(Transport::Playing);
        Self { id: Uuid::new_v4(), cue, uri: uri.into(), transport, out_tx, events, http }
    }

    pub fn pause(&self) {
        self.set(Transport::Paused);
    }

    pub fn resume(&self) {
        self.set(Transport::Playing);
    }

    pub fn stop(&self) {
        self.set(Transport::Stopped);
    }

    fn set(&self, next: Transport) {
        self.transport.send_if_modified(|t| {
            if *t == Transport::Stopped || *t == next {
                return false;
            }
            *t = next;
            true
        });
    }

    pub async fn run(self: Arc<Self>) {
        info!(id = %self.id, index = self.cue.index, seq = self.cue.seq, uri = %self.uri, "Starting preview player");
        let event = match self.stream().await {
            Ok(Outcome::Completed) => Some(RendererEvent::Finished(self.cue)),
            Ok(Outcome::Stopped) => None,
            Err(error) => {
                warn!(id = %self.id, %error, "preview player failed");
                Some(RendererEvent::Failed { cue: self.cue, error })
            }
        };
        if let Some(event) = event {
            let _ = self.events.send(event);
        }
        info!(id = %self.id, "Preview player stopped");
    }

    async fn stream(&self) -> Result<Outcome, PlaybackError> {
        let mut transport = self.transport.subscribe();

        let source = tokio::select! {
            res = prepare_source(&self.http, &self.uri) => {
                res.map_err(|e| PlaybackError::Fetch { message: format!("{e:#}") })?
            }
            _ = wait_stopped(&mut transport) => return Ok(Outcome::Stopped),
        };
        let mut decoder =
            PreviewDecoder::open(source.path()).map_err(|e| PlaybackError::Decode { message: format!("{e:#}") })?;

        let sample_rate = decoder.sample_rate();
        let frame_samples = (sample_rate / FRAMES_PER_SECOND).max(1) as usize;
        let samples_per_frame = frame_samples * CHANNELS;
        let _ = self.out_tx.send(StreamPacket::Start { cue: self.cue, sample_rate, channels: CHANNELS as u16 });

        let mut interleaved_i16: Vec<i16> = Vec::with_capacity(samples_per_frame * 8);
        let mut head: usize = 0;
        let mut sent_frames: u64 = 0;
        let mut eos = false;
        let mut tick = tokio::time::interval(Duration::from_millis(1000 / FRAMES_PER_SECOND as u64));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            let state = *transport.borrow_and_update();
            match state {
                Transport::Stopped => return Ok(Outcome::Stopped),
                Transport::Paused => continue,
                Transport::Playing => {}
            }

            while !eos && interleaved_i16.len().saturating_sub(head) < samples_per_frame * 2 {
                match decoder.next_pcm_block() {
                    Ok(Some(block)) => {
                        interleaved_i16.reserve(block.l.len() * CHANNELS);
                        for (l, r) in block.l.iter().zip(block.r.iter()) {
                            interleaved_i16.push((l * 32767.0).clamp(-32768.0, 32767.0) as i16);
                            interleaved_i16.push((r * 32767.0).clamp(-32768.0, 32767.0) as i16);
                        }
                    }
                    Ok(None) => eos = true,
                    Err(e) => return Err(PlaybackError::Decode { message: format!("{e:#}") }),
                }
            }

            let available = interleaved_i16.len().saturating_sub(head);
            if available == 0 && eos {
                debug!(id = %self.id, sent_frames, "End of stream");
                return Ok(Outcome::Completed);
            }

            let take = available.min(samples_per_frame);
            let frame_slice = &interleaved_i16[head..head + take];
            let _ = self.out_tx.send(StreamPacket::Pcm(Bytes::copy_from_slice(bytemuck::cast_slice(frame_slice))));
            sent_frames += 1;
            if sent_frames % 2000 == 0 {
                info!(id = %self.id, sent_frames, "PCM sent (summary)");
            }
            head += take;
            if head >= samples_per_frame * 8 && head > interleaved_i16.len() / 2 {
                interleaved_i16.drain(0..head);
                head = 0;
            }
        }
    }
}

async fn wait_stopped(rx: &mut watch::Receiver<Transport>) {
    loop {
        let state = *rx.borrow_and_update();
        if state == Transport::Stopped {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// [`AudioRenderer`] that plays one [`PreviewPlayer`] at a time and fans its
/// PCM out to every stream subscriber.
pub struct StreamRenderer {
    cfg: Arc<EffectiveConfig>,
    http: reqwest::Client,
    out_tx: broadcast::Sender<StreamPacket>,
    events: mpsc::UnboundedSender<RendererEvent>,
    current: Option<Arc<PreviewPlayer>>,
}

impl StreamRenderer {
    pub fn new(cfg: Arc<EffectiveConfig>, events: mpsc::UnboundedSender<RendererEvent>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("Speedtune/{}", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.fetch_timeout)
            .build()?;
        let (out_tx, _rx) = broadcast::channel::<StreamPacket>(1024);
        Ok(Self { cfg, http, out_tx, events, current: None })
    }

    pub fn stream(&self) -> broadcast::Sender<StreamPacket> {
        self.out_tx.clone()
    }
}

impl AudioRenderer for StreamRenderer {
    fn play(&mut self, cue: Cue, uri: &str) -> Result<(), PlaybackError> {
        if !is_uri_allowed(&self.cfg, uri) {
            warn!(%uri, "URI blocked by config patterns");
            return Err(PlaybackError::Blocked { uri: uri.into() });
        }
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::Unavailable { message: e.to_string() })?;

        if let Some(old) = self.current.take() {
            old.stop();
        }
        let player = Arc::new(PreviewPlayer::new(cue, uri, self.out_tx.clone(), self.events.clone(), self.http.clone()));
        self.current = Some(player.clone());
        rt.spawn(player.run());
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(p) = &self.current {
            p.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(p) = &self.current {
            p.resume();
        }
    }

    fn stop(&mut self) {
        if let Some(p) = self.current.take() {
            p.stop();
        }
    }
}
