// The test worker: multi-pass pattern write/verify loop over a resolved
// target, publishing progress to the session channel.

use super::{
    alloc_chunk_buffer, chunk_gate, sync_speed_stats, Control, Emitter, Flow, SessionShared,
};
use crate::device::ResolvedTarget;
use crate::events::{FailureKind, LogLevel, ProgressEvent};
use crate::patterns;
use crate::planner::{self, AdaptiveChunkSizer, ChunkRange};
use crate::sectors::SectorErrorKind;
use crate::session::{SessionStatus, TestSession};
use crate::speed::SpeedSampler;
use crate::TestPattern;
use rand::rngs::ThreadRng;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Instant;

pub(crate) fn run(
    session: TestSession,
    mut target: ResolvedTarget,
    shared: Arc<SessionShared>,
    control: Arc<Control>,
) {
    let planned = session.planned_bytes();
    let worker = TestWorker {
        session,
        shared,
        control,
        sampler: SpeedSampler::new(),
        emitter: Emitter::new(),
        sizer: None,
        rng: rand::thread_rng(),
        start: Instant::now(),
        planned,
        tested: 0,
    };
    worker.run(&mut target);
    // `target` drops here: a proxy file is removed on every exit path
}

struct TestWorker {
    session: TestSession,
    shared: Arc<SessionShared>,
    control: Arc<Control>,
    sampler: SpeedSampler,
    emitter: Emitter,
    sizer: Option<AdaptiveChunkSizer>,
    rng: ThreadRng,
    start: Instant,
    planned: u64,
    tested: u64,
}

impl TestWorker {
    fn run(mut self, target: &mut ResolvedTarget) {
        if self.session.adaptive_chunk {
            self.sizer = Some(AdaptiveChunkSizer::new(self.session.chunk_size_bytes));
        }

        self.shared.stats.set_status(SessionStatus::Running);
        self.shared.log(
            LogLevel::Info,
            format!(
                "Testing {}: {} bytes via {:?}, {} pass(es)",
                self.session.drive_path.display(),
                self.session.total_bytes,
                target.access,
                self.session.pass_count
            ),
        );

        let mut cancelled = false;

        'run: for pass in 1..=self.session.pass_count {
            self.shared.stats.update(|s| s.current_pass = pass);
            self.shared.log(
                LogLevel::Info,
                format!("Pass {} of {}", pass, self.session.pass_count),
            );

            let range =
                planner::plan_pass(self.session.total_bytes, pass - 1, self.session.pass_count);

            for pattern in self.session.patterns.clone() {
                match self.run_pattern(target.file_mut(), range, pattern, pass) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Cancelled) => {
                        cancelled = true;
                        break 'run;
                    }
                    Err(message) => {
                        self.fail(message);
                        return;
                    }
                }
            }

            if let Some(sizer) = self.sizer.as_mut() {
                sizer.on_pass_boundary();
            }
        }

        sync_speed_stats(&self.shared, &self.sampler, self.start.elapsed());
        if cancelled || self.control.cancel_requested() {
            self.finish_cancelled();
        } else {
            self.finish_completed();
        }
    }

    /// One full sweep of `range` with a single fill pattern.
    fn run_pattern(
        &mut self,
        file: &mut File,
        range: ChunkRange,
        pattern: TestPattern,
        pass: u32,
    ) -> Result<Flow, String> {
        self.shared
            .log(LogLevel::Info, format!("Pattern: {:?}", pattern));

        let pattern_start = Instant::now();
        let bad_before = self.shared.bad.count();
        let mut pattern_bytes: u64 = 0;
        let mut buf: Vec<u8> = Vec::new();
        let mut read_buf: Vec<u8> = Vec::new();
        let mut cursor = range.offset_bytes;

        while let Some(chunk) = planner::next_chunk(cursor, range.end(), self.chunk_size()) {
            cursor = chunk.end();

            if chunk_gate(&self.shared, &self.control) == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }

            let len = chunk.len_bytes as usize;
            if buf.len() != len {
                buf = alloc_chunk_buffer(len)?;
            }
            patterns::fill_chunk(pattern, &mut buf, &mut self.rng);

            let chunk_start = Instant::now();
            if let Err(e) = write_chunk(file, chunk.offset_bytes, &buf) {
                tracing::debug!(
                    offset = chunk.offset_bytes,
                    error = %e,
                    "chunk write failed"
                );
                // No retry: the tool locates weaknesses, it does not heal them
                self.record_bad(chunk.offset_bytes, SectorErrorKind::WriteFailed, pass);
                continue;
            }

            if self.session.verify_on_write {
                if read_buf.len() != len {
                    read_buf = alloc_chunk_buffer(len)?;
                }
                match read_chunk(file, chunk.offset_bytes, &mut read_buf) {
                    Err(e) => {
                        tracing::debug!(
                            offset = chunk.offset_bytes,
                            error = %e,
                            "chunk read-back failed"
                        );
                        self.record_bad(chunk.offset_bytes, SectorErrorKind::ReadFailed, pass);
                    }
                    Ok(()) => {
                        if read_buf != buf {
                            let mismatch = buf
                                .iter()
                                .zip(read_buf.iter())
                                .position(|(a, b)| a != b)
                                .unwrap_or(0) as u64;
                            self.record_bad(
                                chunk.offset_bytes + mismatch,
                                SectorErrorKind::VerifyMismatch,
                                pass,
                            );
                        }
                    }
                }
            }

            pattern_bytes += chunk.len_bytes;
            self.account_chunk(chunk.len_bytes, chunk_start, cursor >= range.end());
        }

        // Per-pattern summary
        let elapsed = pattern_start.elapsed().as_secs_f64().max(0.001);
        let avg_mbps = pattern_bytes as f64 / (1024.0 * 1024.0) / elapsed;
        let found = self.shared.bad.count() - bad_before;
        let sectors = pattern_bytes / self.session.sector_size as u64;
        self.shared.log(
            if found == 0 {
                LogLevel::Success
            } else {
                LogLevel::Warning
            },
            format!(
                "Pattern {:?} done: {} sectors written, {:.1} MB/s average, {} bad sector(s)",
                pattern, sectors, avg_mbps, found
            ),
        );

        Ok(Flow::Continue)
    }

    fn chunk_size(&self) -> u64 {
        self.sizer
            .as_ref()
            .map_or(self.session.chunk_size_bytes, |s| s.chunk_size())
    }

    fn record_bad(&mut self, offset_bytes: u64, kind: SectorErrorKind, pass: u32) {
        self.shared
            .record_bad_sector(offset_bytes, self.session.sector_size, kind, pass);
        if let Some(sizer) = self.sizer.as_mut() {
            sizer.on_bad_sector();
        }
    }

    fn account_chunk(&mut self, bytes: u64, chunk_start: Instant, last_of_pattern: bool) {
        self.tested += bytes;
        let sample = self
            .sampler
            .record(bytes, chunk_start.elapsed(), self.start.elapsed());
        if let Some(sizer) = self.sizer.as_mut() {
            sizer.record_throughput(sample.mb_per_sec);
        }

        let tested = self.tested;
        self.shared.stats.update(|s| s.tested_bytes = tested);
        sync_speed_stats(&self.shared, &self.sampler, self.start.elapsed());

        let percent = if self.planned > 0 {
            tested as f64 / self.planned as f64 * 100.0
        } else {
            100.0
        };
        self.emitter.maybe_emit(
            &self.shared,
            percent,
            sample.mb_per_sec,
            sample.elapsed_seconds,
            last_of_pattern,
        );
    }

    fn finish_cancelled(self) {
        // Events first, status second: a terminal status guarantees the
        // terminal events are already queued
        self.shared.log(LogLevel::Warning, "Test stopped by user");
        self.shared.stats.set_status(SessionStatus::Cancelled);
    }

    fn finish_completed(self) {
        if self.session.auto_format_requested {
            self.shared.log(
                LogLevel::Info,
                format!("Requesting format to {}", self.session.filesystem_hint),
            );
            self.shared.channel.publish(ProgressEvent::FormatRequested {
                path: self.session.drive_path.clone(),
                filesystem: self.session.filesystem_hint.clone(),
            });
        }

        let stats = self.shared.stats.snapshot();
        let summary = format!(
            "Testing completed in {}, {} bad sector(s)",
            stats.elapsed_display(),
            self.shared.bad.count()
        );
        self.shared.log(LogLevel::Success, summary.clone());
        self.shared
            .channel
            .publish(ProgressEvent::Completed { summary });
        self.shared.stats.set_status(SessionStatus::Completed);
    }

    fn fail(self, message: String) {
        tracing::error!(device = %self.session.drive_path.display(), %message, "session failed");
        self.shared.channel.publish(ProgressEvent::Failed {
            kind: FailureKind::Internal,
            message,
        });
        self.shared.stats.set_status(SessionStatus::Failed);
    }
}

/// Seek, write, and flush one chunk. The sync keeps the device honest:
/// without it a fast page cache would absorb the whole run.
pub(crate) fn write_chunk(file: &mut File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    file.sync_data()
}

/// Seek and read one chunk back for verification.
pub(crate) fn read_chunk(file: &mut File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}
