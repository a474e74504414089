use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

const MPS_TO_MPH: f64 = 2.23694;
const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Mph,
    Kmh,
    Mps,
}

impl SpeedUnit {
    pub fn from_mps(self, mps: f64) -> f64 {
        match self {
            SpeedUnit::Mph => mps * MPS_TO_MPH,
            SpeedUnit::Kmh => mps * MPS_TO_KMH,
            SpeedUnit::Mps => mps,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kmh => "km/h",
            SpeedUnit::Mps => "m/s",
        }
    }
}

/// A position report pushed by the client device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LocationFix {
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

impl LocationFix {
    /// Devices report unknown speed as null or a negative value.
    pub fn speed_mps(&self) -> f64 {
        match self.speed_mps {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => 0.0,
        }
    }
}

pub trait LocationSource {
    /// Current speed in this source's unit.
    fn current_speed(&self) -> f64;
}

pub struct PushedLocation {
    latest: Mutex<Option<LocationFix>>,
    unit: SpeedUnit,
}

impl PushedLocation {
    pub fn new(unit: SpeedUnit) -> Self {
        Self { latest: Mutex::new(None), unit }
    }

    pub fn record(&self, fix: LocationFix) {
        debug!(speed_mps = ?fix.speed_mps, accuracy_m = ?fix.accuracy_m, "location fix");
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(fix);
        }
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    pub fn latest(&self) -> Option<LocationFix> {
        self.latest.lock().ok().and_then(|l| *l)
    }
}

impl LocationSource for PushedLocation {
    fn current_speed(&self) -> f64 {
        let mps = self.latest().map(|f| f.speed_mps()).unwrap_or(0.0);
        self.unit.from_mps(mps)
    }
}

/// Publish `source.current_speed()` on `speed` every `every`, only when it changes.
pub async fn run_sampler<S: LocationSource>(
    source: &S,
    speed: watch::Sender<f64>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let sample = source.current_speed();
                let changed = speed.send_if_modified(|current| {
                    if *current != sample {
                        *current = sample;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    info!(speed = %format!("{sample:.1}"), "speed sample changed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("location sampler stopped");
}
