use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::audio::StreamPacket;
use crate::config::EffectiveConfig;
use crate::location::PushedLocation;
use crate::node::NodeHandle;

#[derive(Clone)]
pub struct AppState {
    pub node: NodeHandle,
    pub location: Arc<PushedLocation>,
    pub speed: watch::Receiver<f64>,
    pub stream: broadcast::Sender<StreamPacket>,
    pub cfg: Arc<EffectiveConfig>,
}
