// Engine core - owns the single background worker per session and exposes
// the start/pause/stop/poll/statistics operation surface.

pub(crate) mod test_worker;
pub(crate) mod wipe_worker;

use crate::device::{platform_resolver, DeviceResolver};
use crate::events::{EventChannel, LogLevel, ProgressEvent};
use crate::sectors::{BadSectorLog, BadSectorRecord, SectorErrorKind};
use crate::session::{SessionStatus, StatsCell, Statistics, TestSession, WipePlan};
use crate::speed::SpeedSampler;
use crate::{DriveInfo, EngineError, EngineResult, TestMode, TestParams, WipeParams};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Minimum spacing between Speed/Progress emissions.
const EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Opaque handle to a session. Stale handles (from a finished, replaced
/// session) are rejected with `InvalidHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle(u64);

/// Cooperative pause/cancel flags, observed at chunk boundaries only.
pub(crate) struct Control {
    cancel: AtomicBool,
    paused: AtomicBool,
}

impl Control {
    fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn toggle_pause(&self) -> bool {
        let now_paused = !self.paused.load(Ordering::SeqCst);
        self.paused.store(now_paused, Ordering::SeqCst);
        now_paused
    }
}

/// State shared between a worker and its polling caller.
pub(crate) struct SessionShared {
    pub(crate) channel: EventChannel,
    pub(crate) stats: StatsCell,
    pub(crate) bad: BadSectorLog,
}

impl SessionShared {
    fn new(device_path: String, initial: Statistics) -> Self {
        Self {
            channel: EventChannel::new(),
            stats: StatsCell::new(initial),
            bad: BadSectorLog::new(device_path),
        }
    }

    pub(crate) fn log(&self, level: LogLevel, text: impl Into<String>) {
        self.channel.publish(ProgressEvent::Log {
            text: text.into(),
            level,
        });
    }

    /// Record a failed chunk: append the record, refresh the statistics
    /// counter, and publish the must-deliver event pair.
    pub(crate) fn record_bad_sector(
        &self,
        offset_bytes: u64,
        sector_size: u32,
        kind: SectorErrorKind,
        pass: u32,
    ) -> BadSectorRecord {
        let record = self.bad.record(offset_bytes, sector_size, kind, pass);
        let count = self.bad.count();
        self.stats.update(|s| s.bad_sector_count = count);
        self.channel.publish(ProgressEvent::BadSector {
            record: record.clone(),
        });
        self.log(
            LogLevel::Error,
            format!("Bad sector {}: {:?}", record.sector_index, kind),
        );
        record
    }
}

/// Flow decision taken at each chunk boundary.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Cancelled,
}

/// The only place pause and cancel are observed. Blocks while paused,
/// returns `Cancelled` once a stop was requested.
pub(crate) fn chunk_gate(shared: &SessionShared, control: &Control) -> Flow {
    if control.cancel_requested() {
        return Flow::Cancelled;
    }

    if control.is_paused() {
        if shared.stats.status() == SessionStatus::Running {
            shared.stats.set_status(SessionStatus::Paused);
        }
        while control.is_paused() && !control.cancel_requested() {
            std::thread::sleep(PAUSE_POLL);
        }
        if control.cancel_requested() {
            return Flow::Cancelled;
        }
        if shared.stats.status() == SessionStatus::Paused {
            shared.stats.set_status(SessionStatus::Running);
        }
    }

    Flow::Continue
}

/// Allocate a chunk buffer without aborting the process on OOM; the worker
/// turns the error into a `Failed` event.
pub(crate) fn alloc_chunk_buffer(len: usize) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| format!("chunk buffer allocation of {} bytes failed: {}", len, e))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Rate limiter for the lossy event stream.
pub(crate) struct Emitter {
    last: Instant,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self {
            // Backdate so the first sample goes out immediately
            last: Instant::now()
                .checked_sub(EMIT_INTERVAL)
                .unwrap_or_else(Instant::now),
        }
    }

    pub(crate) fn maybe_emit(
        &mut self,
        shared: &SessionShared,
        percent: f64,
        mbps: f64,
        elapsed_secs: f64,
        force: bool,
    ) {
        if !force && self.last.elapsed() < EMIT_INTERVAL {
            return;
        }
        self.last = Instant::now();
        shared.channel.publish(ProgressEvent::Speed {
            mbps,
            elapsed_secs,
        });
        shared.channel.publish(ProgressEvent::Progress {
            percent: percent.clamp(0.0, 100.0),
        });
    }
}

/// Push the sampler's rolling aggregates into the statistics cell.
pub(crate) fn sync_speed_stats(shared: &SessionShared, sampler: &SpeedSampler, elapsed: Duration) {
    let (avg, max, min) = (sampler.avg_mbps(), sampler.max_mbps(), sampler.min_mbps());
    shared.stats.update(|s| {
        s.avg_speed_mbs = avg;
        s.max_speed_mbs = max;
        s.min_speed_mbs = min;
        s.elapsed_seconds = elapsed.as_secs_f64();
    });
}

struct ActiveSession {
    id: u64,
    shared: Arc<SessionShared>,
    control: Arc<Control>,
    join: Option<JoinHandle<()>>,
}

/// The disk-test and secure-wipe engine. One background worker at a time;
/// callers drive it through opaque handles and non-blocking polls.
pub struct Engine {
    resolver: Box<dyn DeviceResolver>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_resolver(platform_resolver())
    }

    /// Inject a resolver; used by tests and exotic platforms.
    pub fn with_resolver(resolver: Box<dyn DeviceResolver>) -> Self {
        Self {
            resolver,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a test session. Fails fast on invalid parameters, unsafe or
    /// unresolvable targets, and when another session is still running.
    pub fn start_test(
        &self,
        drive: &DriveInfo,
        mut params: TestParams,
    ) -> EngineResult<SessionHandle> {
        params.validate()?;
        self.check_target(drive)?;

        let mut active = self.active.lock().unwrap();
        Self::ensure_idle(&mut active)?;

        let target = self.resolver.resolve(drive, params.mode)?;
        if target.bytes == 0 {
            return Err(EngineError::ZeroSizeTarget(drive.path.display().to_string()));
        }

        let session = TestSession::new(drive, &params, target.bytes);
        let mut initial = Statistics::idle();
        initial.total_bytes = session.total_bytes;
        initial.total_passes = session.pass_count;

        let shared = Arc::new(SessionShared::new(
            drive.path.display().to_string(),
            initial,
        ));
        let control = Arc::new(Control::new());

        let worker_shared = Arc::clone(&shared);
        let worker_control = Arc::clone(&control);
        let join = std::thread::Builder::new()
            .name("mediatest-test".to_string())
            .spawn(move || test_worker::run(session, target, worker_shared, worker_control))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *active = Some(ActiveSession {
            id,
            shared,
            control,
            join: Some(join),
        });
        Ok(SessionHandle(id))
    }

    /// Start a wipe session over the full device.
    pub fn start_wipe(
        &self,
        drive: &DriveInfo,
        params: WipeParams,
    ) -> EngineResult<SessionHandle> {
        params.validate()?;
        self.check_target(drive)?;

        let mut active = self.active.lock().unwrap();
        Self::ensure_idle(&mut active)?;

        let target = self.resolver.resolve(drive, TestMode::FullDevice)?;
        if target.bytes == 0 {
            return Err(EngineError::ZeroSizeTarget(drive.path.display().to_string()));
        }

        let plan = WipePlan::build(&params, &mut rand::thread_rng());
        let run = wipe_worker::WipeRun::new(drive, plan, target.bytes);

        let mut initial = Statistics::idle();
        initial.total_bytes = run.total_bytes;
        initial.total_passes = run.plan.pass_count();

        let shared = Arc::new(SessionShared::new(
            drive.path.display().to_string(),
            initial,
        ));
        let control = Arc::new(Control::new());

        let worker_shared = Arc::clone(&shared);
        let worker_control = Arc::clone(&control);
        let join = std::thread::Builder::new()
            .name("mediatest-wipe".to_string())
            .spawn(move || wipe_worker::run(run, target, worker_shared, worker_control))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *active = Some(ActiveSession {
            id,
            shared,
            control,
            join: Some(join),
        });
        Ok(SessionHandle(id))
    }

    /// Toggle pause. Returns the new paused state; a session that already
    /// ended is left untouched and reports `false`.
    pub fn pause_test(&self, handle: SessionHandle) -> EngineResult<bool> {
        let active = self.active.lock().unwrap();
        let session = Self::session_for(&active, handle)?;

        if session.shared.stats.status().is_terminal() || session.control.cancel_requested() {
            return Ok(false);
        }

        let now_paused = session.control.toggle_pause();
        session.shared.log(
            LogLevel::Info,
            if now_paused {
                "Session paused"
            } else {
                "Session resumed"
            },
        );
        Ok(now_paused)
    }

    /// Request cancellation. Idempotent: repeated calls (and calls after
    /// the session ended) are no-ops. Cancellation is cooperative and takes
    /// effect at the next chunk boundary.
    pub fn stop_test(&self, handle: SessionHandle) {
        let active = self.active.lock().unwrap();
        let Ok(session) = Self::session_for(&active, handle) else {
            return;
        };

        if session.shared.stats.status().is_terminal() || session.control.cancel_requested() {
            return;
        }

        session.control.request_cancel();
        session
            .shared
            .log(LogLevel::Warning, "Stop requested, finishing current chunk");
    }

    /// Non-blocking event poll. `None` means no event right now.
    pub fn poll(&self, handle: SessionHandle) -> EngineResult<Option<ProgressEvent>> {
        let active = self.active.lock().unwrap();
        let session = Self::session_for(&active, handle)?;
        Ok(session.shared.channel.poll())
    }

    /// Copy-on-read statistics snapshot.
    ///
    /// The worker owns the status; `Cancelling` is the window between a
    /// stop request and the worker observing it, so it is derived here
    /// rather than written from the caller's thread.
    pub fn statistics(&self, handle: SessionHandle) -> EngineResult<Statistics> {
        let active = self.active.lock().unwrap();
        let session = Self::session_for(&active, handle)?;
        let mut snapshot = session.shared.stats.snapshot();
        if session.control.cancel_requested() && !snapshot.status.is_terminal() {
            snapshot.status = SessionStatus::Cancelling;
        }
        Ok(snapshot)
    }

    /// Snapshot of the bad-sector list, exportable verbatim.
    pub fn bad_sectors(&self, handle: SessionHandle) -> EngineResult<Vec<BadSectorRecord>> {
        let active = self.active.lock().unwrap();
        let session = Self::session_for(&active, handle)?;
        Ok(session.shared.bad.snapshot())
    }

    /// Whether a session is currently live.
    pub fn is_running(&self) -> bool {
        let active = self.active.lock().unwrap();
        active
            .as_ref()
            .map(|s| !s.shared.stats.status().is_terminal())
            .unwrap_or(false)
    }

    fn check_target(&self, drive: &DriveInfo) -> EngineResult<()> {
        // Defensive re-check; enumeration collaborators already filter
        if drive.is_system_drive {
            return Err(EngineError::UnsafeTarget(drive.path.display().to_string()));
        }
        Ok(())
    }

    /// Reject a start while a session runs; reap a finished one.
    fn ensure_idle(active: &mut Option<ActiveSession>) -> EngineResult<()> {
        if let Some(session) = active.as_mut() {
            if !session.shared.stats.status().is_terminal() {
                return Err(EngineError::AlreadyRunning);
            }
            if let Some(join) = session.join.take() {
                let _ = join.join();
            }
        }
        *active = None;
        Ok(())
    }

    fn session_for<'a>(
        active: &'a Option<ActiveSession>,
        handle: SessionHandle,
    ) -> EngineResult<&'a ActiveSession> {
        active
            .as_ref()
            .filter(|s| s.id == handle.0)
            .ok_or(EngineError::InvalidHandle)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
