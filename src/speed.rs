// Throughput sampling for the worker loop.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Keep the last N samples for averaging; min/max track the whole run.
const WINDOW_CAPACITY: usize = 256;

/// One throughput observation, timestamped relative to session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub elapsed_seconds: f64,
    pub mb_per_sec: f64,
}

/// Converts per-chunk byte/time deltas into samples and rolling aggregates.
#[derive(Debug)]
pub struct SpeedSampler {
    window: VecDeque<SpeedSample>,
    max_mbps: f64,
    min_mbps: f64,
}

impl SpeedSampler {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
            max_mbps: 0.0,
            min_mbps: f64::INFINITY,
        }
    }

    /// Record one chunk's worth of I/O. `chunk_duration` is the time spent
    /// on this chunk alone; `session_elapsed` stamps the sample.
    pub fn record(
        &mut self,
        bytes: u64,
        chunk_duration: Duration,
        session_elapsed: Duration,
    ) -> SpeedSample {
        // Sub-millisecond chunk times produce garbage rates; floor them.
        let secs = chunk_duration.as_secs_f64().max(0.001);
        let mb_per_sec = bytes as f64 / (1024.0 * 1024.0) / secs;

        let sample = SpeedSample {
            elapsed_seconds: session_elapsed.as_secs_f64(),
            mb_per_sec,
        };

        if self.window.len() == WINDOW_CAPACITY {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        if mb_per_sec > self.max_mbps {
            self.max_mbps = mb_per_sec;
        }
        if mb_per_sec < self.min_mbps {
            self.min_mbps = mb_per_sec;
        }

        sample
    }

    /// Average over the rolling window.
    pub fn avg_mbps(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().map(|s| s.mb_per_sec).sum::<f64>() / self.window.len() as f64
    }

    /// Fastest chunk seen over the whole run.
    pub fn max_mbps(&self) -> f64 {
        self.max_mbps
    }

    /// Slowest chunk seen over the whole run; 0.0 before the first sample.
    pub fn min_mbps(&self) -> f64 {
        if self.min_mbps.is_finite() {
            self.min_mbps
        } else {
            0.0
        }
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }
}

impl Default for SpeedSampler {
    fn default() -> Self {
        Self::new()
    }
}
