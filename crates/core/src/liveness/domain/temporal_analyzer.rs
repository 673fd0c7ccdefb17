use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::shared::config::TemporalConfig;

const MIN_HISTORY_FOR_VARIANCE: usize = 3;
const MIN_HISTORY_FOR_MOVEMENT: usize = 4;
const MIN_HISTORY_FOR_PERIODICITY: usize = 5;
const SPOOF_VERDICT_FLOOR: f64 = 0.80;
const REAL_VERDICT_FLOOR: f64 = 0.70;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalVerdict {
    Real,
    Spoof,
    Uncertain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    StaticScores,
    LowVariance,
    NaturalVariance,
    NoMicroMovement,
    NaturalMovement,
    ReplayLoop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub verdict: TemporalVerdict,
    pub confidence: f64,
    /// The strongest indicator behind a `Real` or `Spoof` verdict.
    pub reason: Option<Indicator>,
    pub live_variance: f64,
    pub mean_live: f64,
    pub movement_std: Option<f64>,
    pub periodicity: Option<f64>,
}

impl TemporalAnalysis {
    fn uncertain() -> Self {
        Self {
            verdict: TemporalVerdict::Uncertain,
            confidence: 0.5,
            reason: None,
            live_variance: 0.0,
            mean_live: 0.0,
            movement_std: None,
            periodicity: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ScoreSample {
    timestamp_ms: u64,
    live: f64,
    spoof: f64,
}

/// Per-track history of liveness probabilities, used to catch printed
/// photos (scores too steady) and replayed video (scores periodic).
pub struct TemporalAnalyzer {
    config: TemporalConfig,
    histories: HashMap<u32, VecDeque<ScoreSample>>,
}

impl TemporalAnalyzer {
    pub fn new(config: TemporalConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    pub fn update(&mut self, track: u32, live: f64, spoof: f64, now_ms: u64) {
        let capacity = self.config.history_size.max(1);
        let timeout = self.config.history_timeout_ms;
        let history = self
            .histories
            .entry(track)
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        while history
            .front()
            .is_some_and(|s| now_ms.saturating_sub(s.timestamp_ms) > timeout)
        {
            history.pop_front();
        }
        if history.len() == capacity {
            history.pop_front();
        }
        history.push_back(ScoreSample {
            timestamp_ms: now_ms,
            live,
            spoof,
        });
    }

    pub fn analyze(&self, track: u32) -> TemporalAnalysis {
        let history = match self.histories.get(&track) {
            Some(h) if h.len() >= MIN_HISTORY_FOR_VARIANCE => h,
            _ => return TemporalAnalysis::uncertain(),
        };

        let live: Vec<f64> = history.iter().map(|s| s.live).collect();
        let mean_live = mean(&live);
        let live_variance = variance(&live);
        let threshold = self.config.score_variance_threshold;

        let mut spoof_indicators: Vec<(Indicator, f64)> = Vec::new();
        let mut real_indicators: Vec<(Indicator, f64)> = Vec::new();

        if live_variance < threshold * 0.5 && mean_live > 0.6 {
            spoof_indicators.push((Indicator::StaticScores, 0.95));
        } else if live_variance < threshold && mean_live > 0.7 {
            spoof_indicators.push((Indicator::LowVariance, 0.85));
        }
        if live_variance > threshold * 1.5 {
            real_indicators.push((Indicator::NaturalVariance, 0.80));
        }

        let mut movement_std = None;
        if live.len() >= MIN_HISTORY_FOR_MOVEMENT {
            let diffs: Vec<f64> = live.windows(2).map(|w| w[1] - w[0]).collect();
            let std = variance(&diffs).sqrt();
            movement_std = Some(std);
            if std < self.config.micro_movement_threshold {
                spoof_indicators.push((Indicator::NoMicroMovement, 0.88));
            }
            if std > self.config.micro_movement_threshold * 3.0 {
                real_indicators.push((Indicator::NaturalMovement, 0.70));
            }
        }

        let mut periodicity = None;
        if live.len() >= MIN_HISTORY_FOR_PERIODICITY {
            let p = max_autocorrelation(&live);
            periodicity = Some(p);
            if p > self.config.periodicity_threshold {
                spoof_indicators.push((Indicator::ReplayLoop, 0.90));
            }
        }

        let strongest = |indicators: &[(Indicator, f64)]| {
            indicators
                .iter()
                .copied()
                .fold(None, |best: Option<(Indicator, f64)>, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                })
        };
        let spoof = strongest(&spoof_indicators);
        let real = strongest(&real_indicators);
        let spoof_conf = spoof.map_or(0.0, |s| s.1);
        let real_conf = real.map_or(0.0, |r| r.1);

        let (verdict, confidence, reason) =
            if spoof_conf > real_conf && spoof_conf > SPOOF_VERDICT_FLOOR {
                (TemporalVerdict::Spoof, spoof_conf, spoof.map(|s| s.0))
            } else if real_conf > spoof_conf && real_conf > REAL_VERDICT_FLOOR {
                (TemporalVerdict::Real, real_conf, real.map(|r| r.0))
            } else {
                (TemporalVerdict::Uncertain, 0.5, None)
            };

        TemporalAnalysis {
            verdict,
            confidence,
            reason,
            live_variance,
            mean_live,
            movement_std,
            periodicity,
        }
    }

    pub fn clear_track(&mut self, track: u32) {
        self.histories.remove(&track);
    }

    /// Drop histories for tracks not accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.histories.retain(|&id, _| keep(id));
    }

    pub fn clear_all(&mut self) {
        self.histories.clear();
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Largest normalized autocorrelation at a positive lag.
fn max_autocorrelation(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let std = variance(values).sqrt() + 1e-6;
    let norm: Vec<f64> = values.iter().map(|v| (v - m) / std).collect();

    let lag = |k: usize| -> f64 { (0..n - k).map(|i| norm[i] * norm[i + k]).sum() };
    let zero = lag(0);
    if zero <= 0.0 {
        return 0.0;
    }
    (1..n).map(|k| lag(k) / zero).fold(f64::NEG_INFINITY, f64::max)
}
