// The wipe worker: sequential overwrite passes over the full device range,
// optionally closed by a read-verify sweep of the final pass byte.

use super::test_worker::{read_chunk, write_chunk};
use super::{
    alloc_chunk_buffer, chunk_gate, sync_speed_stats, Control, Emitter, Flow, SessionShared,
};
use crate::device::ResolvedTarget;
use crate::events::{FailureKind, LogLevel, ProgressEvent};
use crate::planner::{self, ChunkRange};
use crate::sectors::SectorErrorKind;
use crate::session::{SessionStatus, WipePlan};
use crate::speed::SpeedSampler;
use crate::DriveInfo;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Fixed wipe chunk size. Wipes favor predictable sequential throughput
/// over fault localization, so the adaptive sizer stays out of this path.
const WIPE_CHUNK_BYTES: u64 = 32 * 1024 * 1024;

/// Everything the wipe worker needs, assembled before the thread spawns.
pub(crate) struct WipeRun {
    pub drive_path: PathBuf,
    pub total_bytes: u64,
    pub sector_size: u32,
    pub plan: WipePlan,
}

impl WipeRun {
    pub(crate) fn new(drive: &DriveInfo, plan: WipePlan, total_bytes: u64) -> Self {
        Self {
            drive_path: drive.path.clone(),
            total_bytes,
            sector_size: drive.sector_size(),
            plan,
        }
    }
}

pub(crate) fn run(
    run: WipeRun,
    mut target: ResolvedTarget,
    shared: Arc<SessionShared>,
    control: Arc<Control>,
) {
    let passes = run.plan.pass_count() as u64;
    let verify_bytes = if run.plan.verify_last_pass {
        run.total_bytes
    } else {
        0
    };
    let worker = WipeWorker {
        planned: run.total_bytes * passes + verify_bytes,
        run,
        shared,
        control,
        sampler: SpeedSampler::new(),
        emitter: Emitter::new(),
        start: Instant::now(),
        processed: 0,
    };
    worker.run(&mut target);
    // `target` drops here, removing any proxy file
}

struct WipeWorker {
    run: WipeRun,
    shared: Arc<SessionShared>,
    control: Arc<Control>,
    sampler: SpeedSampler,
    emitter: Emitter,
    start: Instant,
    planned: u64,
    processed: u64,
}

impl WipeWorker {
    fn run(mut self, target: &mut ResolvedTarget) {
        self.shared.stats.set_status(SessionStatus::Running);
        self.shared.log(
            LogLevel::Info,
            format!(
                "Wiping {}: {} bytes via {:?}, {:?} method, {} pass(es)",
                self.run.drive_path.display(),
                self.run.total_bytes,
                target.access,
                self.run.plan.method,
                self.run.plan.pass_count()
            ),
        );

        let pass_patterns = self.run.plan.pass_patterns.clone();
        let mut cancelled = false;

        for (index, &byte) in pass_patterns.iter().enumerate() {
            let pass = index as u32 + 1;
            self.shared.stats.update(|s| s.current_pass = pass);
            self.shared.log(
                LogLevel::Info,
                format!(
                    "Pass {}/{}: writing 0x{:02X}",
                    pass,
                    pass_patterns.len(),
                    byte
                ),
            );

            match self.write_pass(target.file_mut(), byte, pass) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(message) => {
                    self.fail(message);
                    return;
                }
            }
        }

        if !cancelled && self.run.plan.verify_last_pass {
            if let Some(&expected) = pass_patterns.last() {
                self.shared.log(
                    LogLevel::Info,
                    format!("Verifying final pass (0x{:02X})", expected),
                );
                match self.verify_sweep(target.file_mut(), expected) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Cancelled) => cancelled = true,
                    Err(message) => {
                        self.fail(message);
                        return;
                    }
                }
            }
        }

        sync_speed_stats(&self.shared, &self.sampler, self.start.elapsed());

        // A partial wipe is security-relevant: it must never read as done.
        // Events go out before the status flips so a terminal status
        // guarantees the terminal events are already queued.
        if cancelled || self.control.cancel_requested() {
            self.shared.log(
                LogLevel::Warning,
                "Wipe cancelled: target may be only partially overwritten",
            );
            self.shared.stats.set_status(SessionStatus::Cancelled);
        } else {
            let summary = format!(
                "Wipe completed: {} pass(es), {} bad sector(s)",
                pass_patterns.len(),
                self.shared.bad.count()
            );
            self.shared.log(LogLevel::Success, summary.clone());
            self.shared
                .channel
                .publish(ProgressEvent::Completed { summary });
            self.shared.stats.set_status(SessionStatus::Completed);
        }
    }

    /// One full sweep writing `byte` across the device.
    fn write_pass(&mut self, file: &mut File, byte: u8, pass: u32) -> Result<Flow, String> {
        let range = ChunkRange {
            offset_bytes: 0,
            len_bytes: self.run.total_bytes,
        };
        let mut buf: Vec<u8> = Vec::new();
        let mut cursor = range.offset_bytes;

        while let Some(chunk) = planner::next_chunk(cursor, range.end(), WIPE_CHUNK_BYTES) {
            cursor = chunk.end();

            if chunk_gate(&self.shared, &self.control) == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }

            let len = chunk.len_bytes as usize;
            if buf.len() != len {
                buf = alloc_chunk_buffer(len)?;
            }
            buf.fill(byte);

            let chunk_start = Instant::now();
            if let Err(e) = write_chunk(file, chunk.offset_bytes, &buf) {
                tracing::debug!(
                    offset = chunk.offset_bytes,
                    error = %e,
                    "wipe chunk write failed"
                );
                self.shared.record_bad_sector(
                    chunk.offset_bytes,
                    self.run.sector_size,
                    SectorErrorKind::WriteFailed,
                    pass,
                );
                continue;
            }

            self.account_chunk(chunk.len_bytes, chunk_start, cursor >= range.end());
        }

        Ok(Flow::Continue)
    }

    /// Read sweep checking the final pass byte. A sampling confidence
    /// check, not a forensic guarantee.
    fn verify_sweep(&mut self, file: &mut File, expected: u8) -> Result<Flow, String> {
        let final_pass = self.run.plan.pass_count();
        let range = ChunkRange {
            offset_bytes: 0,
            len_bytes: self.run.total_bytes,
        };
        let mut buf: Vec<u8> = Vec::new();
        let mut cursor = range.offset_bytes;

        while let Some(chunk) = planner::next_chunk(cursor, range.end(), WIPE_CHUNK_BYTES) {
            cursor = chunk.end();

            if chunk_gate(&self.shared, &self.control) == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }

            let len = chunk.len_bytes as usize;
            if buf.len() != len {
                buf = alloc_chunk_buffer(len)?;
            }

            let chunk_start = Instant::now();
            match read_chunk(file, chunk.offset_bytes, &mut buf) {
                Err(e) => {
                    tracing::debug!(
                        offset = chunk.offset_bytes,
                        error = %e,
                        "verify read failed"
                    );
                    self.shared.record_bad_sector(
                        chunk.offset_bytes,
                        self.run.sector_size,
                        SectorErrorKind::ReadFailed,
                        final_pass,
                    );
                }
                Ok(()) => {
                    if let Some(mismatch) = buf.iter().position(|&b| b != expected) {
                        self.shared.record_bad_sector(
                            chunk.offset_bytes + mismatch as u64,
                            self.run.sector_size,
                            SectorErrorKind::VerifyMismatch,
                            final_pass,
                        );
                    }
                }
            }

            self.account_chunk(chunk.len_bytes, chunk_start, cursor >= range.end());
        }

        Ok(Flow::Continue)
    }

    fn account_chunk(&mut self, bytes: u64, chunk_start: Instant, last_of_sweep: bool) {
        self.processed += bytes;
        let sample = self
            .sampler
            .record(bytes, chunk_start.elapsed(), self.start.elapsed());

        let processed = self.processed;
        self.shared.stats.update(|s| s.tested_bytes = processed);
        sync_speed_stats(&self.shared, &self.sampler, self.start.elapsed());

        let percent = if self.planned > 0 {
            processed as f64 / self.planned as f64 * 100.0
        } else {
            100.0
        };
        self.emitter.maybe_emit(
            &self.shared,
            percent,
            sample.mb_per_sec,
            sample.elapsed_seconds,
            last_of_sweep,
        );
    }

    fn fail(self, message: String) {
        tracing::error!(device = %self.run.drive_path.display(), %message, "wipe failed");
        self.shared.channel.publish(ProgressEvent::Failed {
            kind: FailureKind::Internal,
            message,
        });
        self.shared.stats.set_status(SessionStatus::Failed);
    }
}
