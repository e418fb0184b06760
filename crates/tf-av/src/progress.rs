//! Decoder for ffmpeg's `-progress` key=value stream.
//!
//! [`ProgressParser`] turns stdout lines into [`ProgressEvent`]s and
//! [`ProgressThrottle`] decides which of them reach the caller.

use std::time::{Duration, Instant};

use tf_core::ProgressEvent;

/// Stateful line decoder for one transcode invocation.
///
/// Recognized keys:
///
/// - `duration_ms`: total duration of the target. The first positive value
///   is latched and later ones are ignored.
/// - `out_time_ms`: elapsed output time, turned into a percentage of the
///   latched duration.
/// - `progress=end`: terminal marker, yields a finished event at 100%.
///
/// Everything else (other keys, blank lines, lines without `=`) is skipped.
/// Percentages never go down within one invocation.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration_ms: Option<u64>,
    last_percent: Option<f64>,
    finished: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a duration already known (e.g. from a probe). ffmpeg does
    /// not always announce one on the progress stream.
    pub fn with_duration_hint(seconds: Option<f64>) -> Self {
        let duration_ms = seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| (s * 1000.0).round() as u64)
            .filter(|ms| *ms > 0);
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one stdout line; returns an event when the line produces one.
    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "duration_ms" => {
                if self.duration_ms.is_none() {
                    self.duration_ms = value.parse::<u64>().ok().filter(|d| *d > 0);
                }
                None
            }
            "out_time_ms" => {
                let out_ms = value.parse::<i64>().ok()?;
                let Some(total) = self.duration_ms else {
                    return Some(ProgressEvent::running(None));
                };

                let pct = (out_ms as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                let pct = self.last_percent.map_or(pct, |last| pct.max(last));
                self.last_percent = Some(pct);
                Some(ProgressEvent::running(Some(pct)))
            }
            "progress" if value == "end" => {
                self.finished = true;
                self.last_percent = Some(100.0);
                Some(ProgressEvent::finished())
            }
            _ => None,
        }
    }
}

/// Rate limiter for progress delivery.
///
/// The first event and every finished event always pass; other events pass
/// only when at least `interval` has elapsed since the last delivered one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_delivered: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_delivered: None,
        }
    }

    /// Whether `event`, observed at `now`, should be delivered.
    pub fn admit(&mut self, event: &ProgressEvent, now: Instant) -> bool {
        let due = match self.last_delivered {
            Some(prev) => now.saturating_duration_since(prev) >= self.interval,
            None => true,
        };
        if due || event.is_finished() {
            self.last_delivered = Some(now);
            true
        } else {
            false
        }
    }
}
