// Per-run session state: status machine, session aggregates, statistics
// snapshots. Owned by the worker; external readers only ever see copies.

use crate::patterns;
use crate::{DriveInfo, TestMode, TestParams, TestPattern, WipeMethod, WipeParams};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Session lifecycle. Transitions are monotonic except Running↔Paused.
///
/// `Cancelling` is the window between a stop request and the worker
/// observing it at the next chunk boundary. The worker never stores it:
/// statistics snapshots derive it from the cancel flag, which keeps the
/// worker the only writer of the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }

    /// Whether the worker may store `self → to`.
    pub fn may_transition(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (*self, to) {
            (Idle, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running | Paused, Completed | Cancelled | Failed) => true,
            // A session that failed before its loop started
            (Idle, Failed) => true,
            _ => false,
        }
    }
}

/// Immutable statistics snapshot handed to external readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_bytes: u64,
    pub tested_bytes: u64,
    pub current_pass: u32,
    pub total_passes: u32,
    pub avg_speed_mbs: f64,
    pub max_speed_mbs: f64,
    pub min_speed_mbs: f64,
    pub elapsed_seconds: f64,
    pub bad_sector_count: usize,
    pub status: SessionStatus,
}

impl Statistics {
    pub fn idle() -> Self {
        Self {
            total_bytes: 0,
            tested_bytes: 0,
            current_pass: 0,
            total_passes: 0,
            avg_speed_mbs: 0.0,
            max_speed_mbs: 0.0,
            min_speed_mbs: 0.0,
            elapsed_seconds: 0.0,
            bad_sector_count: 0,
            status: SessionStatus::Idle,
        }
    }

    /// Elapsed time as `HH:MM:SS` for display surfaces.
    pub fn elapsed_display(&self) -> String {
        let total = self.elapsed_seconds as u64;
        format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

/// The worker-side mutable statistics cell. The worker is the only writer;
/// readers take copies.
pub(crate) struct StatsCell {
    inner: Mutex<Statistics>,
}

impl StatsCell {
    pub(crate) fn new(initial: Statistics) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Statistics)) {
        let mut stats = self.inner.lock().unwrap();
        f(&mut stats);
    }

    pub(crate) fn set_status(&self, to: SessionStatus) {
        let mut stats = self.inner.lock().unwrap();
        debug_assert!(
            stats.status.may_transition(to),
            "illegal status transition {:?} -> {:?}",
            stats.status,
            to
        );
        stats.status = to;
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub(crate) fn snapshot(&self) -> Statistics {
        self.inner.lock().unwrap().clone()
    }
}

/// Aggregate state for one test run, owned by the worker thread.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub drive_path: PathBuf,
    pub mode: TestMode,
    pub total_bytes: u64,
    pub sector_size: u32,
    pub pass_count: u32,
    pub patterns: Vec<TestPattern>,
    pub verify_on_write: bool,
    pub chunk_size_bytes: u64,
    pub adaptive_chunk: bool,
    pub auto_format_requested: bool,
    pub filesystem_hint: String,
}

impl TestSession {
    pub fn new(drive: &DriveInfo, params: &TestParams, total_bytes: u64) -> Self {
        Self {
            drive_path: drive.path.clone(),
            mode: params.mode,
            total_bytes,
            sector_size: drive.sector_size(),
            pass_count: params.passes,
            patterns: params.patterns.clone(),
            verify_on_write: params.verify_on_write,
            chunk_size_bytes: params.chunk_size_mb as u64 * 1024 * 1024,
            adaptive_chunk: params.adaptive_chunk,
            auto_format_requested: params.auto_format_requested,
            filesystem_hint: params.filesystem_hint.clone(),
        }
    }

    /// Bytes the whole run will write: every pass slice once per pattern.
    pub fn planned_bytes(&self) -> u64 {
        self.total_bytes * self.patterns.len() as u64
    }
}

/// Aggregate state for one wipe run.
#[derive(Debug, Clone)]
pub struct WipePlan {
    pub method: WipeMethod,
    /// Ordered byte values, one per pass.
    pub pass_patterns: Vec<u8>,
    pub verify_last_pass: bool,
}

impl WipePlan {
    pub fn build<R: Rng>(params: &WipeParams, rng: &mut R) -> Self {
        Self {
            method: params.method,
            pass_patterns: patterns::wipe_sequence(params.method, params.passes, rng),
            verify_last_pass: params.verify,
        }
    }

    pub fn pass_count(&self) -> u32 {
        self.pass_patterns.len() as u32
    }
}
