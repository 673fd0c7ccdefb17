use std::collections::HashMap;
use std::time::Instant;

use crate::attendance::domain::attendance_event::AttendanceEvent;

/// Observer for the attendance frame loop.
///
/// Keeps stage timing and counters out of the orchestration code so the
/// CLI, a long-running service and tests can each watch the loop their own
/// way.
pub trait PipelineLogger: Send {
    /// Called once per incoming frame, processed or skipped.
    fn frame(&mut self, index: usize, skipped: bool);

    /// How long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Point-in-time value such as face or session count.
    fn metric(&mut self, name: &str, value: f64);

    fn attendance(&mut self, event: &AttendanceEvent);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame(&mut self, _index: usize, _skipped: bool) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn attendance(&mut self, _event: &AttendanceEvent) {}
}

/// Collects per-stage timings and metrics and reports them through `log`.
///
/// A heartbeat line is written every `heartbeat_frames` processed frames.
pub struct StdoutPipelineLogger {
    heartbeat_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    processed: usize,
    skipped: usize,
    events: usize,
}

impl StdoutPipelineLogger {
    pub fn new(heartbeat_frames: usize) -> Self {
        Self {
            heartbeat_frames: heartbeat_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            processed: 0,
            skipped: 0,
            events: 0,
        }
    }

    /// Formatted report, or `None` if nothing was processed.
    pub fn summary_string(&self) -> Option<String> {
        if self.processed == 0 && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Attendance summary ({} processed, {} skipped, {} event(s), {:.1}s):",
            self.processed,
            self.skipped,
            self.events,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {max_ms:6.1}ms  total {total_ms:7.0}ms",
                average(durations)
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let peak = values.iter().copied().fold(0.0, f64::max);
            lines.push(format!("  {name}: avg {:.1}  peak {peak:.0}", average(values)));
        }

        if self.processed > 0 && elapsed_ms > 0.0 {
            let fps = self.processed as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn processed_frames(&self) -> usize {
        self.processed
    }

    pub fn skipped_frames(&self) -> usize {
        self.skipped
    }

    pub fn events(&self) -> usize {
        self.events
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn frame(&mut self, index: usize, skipped: bool) {
        if skipped {
            self.skipped += 1;
            return;
        }
        self.processed += 1;
        if self.processed % self.heartbeat_frames == 0 {
            log::info!(
                "frame {index}: {} processed, {} skipped, {} event(s)",
                self.processed,
                self.skipped,
                self.events
            );
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn attendance(&mut self, event: &AttendanceEvent) {
        self.events += 1;
        log::info!(
            "attendance: {} at {} ms ({})",
            event.person_id,
            event.timestamp_ms,
            event.session_id
        );
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
