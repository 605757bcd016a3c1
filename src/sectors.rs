/// Bad sector tracking - accumulates immutable failure records during a run
/// and exports them verbatim for reporting.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// How a sector-aligned region failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorErrorKind {
    WriteFailed,
    ReadFailed,
    VerifyMismatch,
}

/// One failure record. Immutable once created; the worker appends them in
/// strictly increasing offset order within a pass (sequential scan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadSectorRecord {
    pub sector_index: u64,
    pub kind: SectorErrorKind,
    pub pass_number: u32,
    pub timestamp: DateTime<Utc>,
    /// Write attempts made. Always 1: the engine locates weaknesses, it
    /// does not retry them; the field survives for report compatibility.
    pub attempts: u32,
}

/// Append-only failure log, owned by one session.
pub struct BadSectorLog {
    records: Mutex<Vec<BadSectorRecord>>,
    device_path: String,
}

impl BadSectorLog {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            device_path: device_path.into(),
        }
    }

    /// Record a failed region. `offset_bytes` is the start of the failed
    /// range; the stored index is sector-aligned.
    pub fn record(
        &self,
        offset_bytes: u64,
        sector_size: u32,
        kind: SectorErrorKind,
        pass_number: u32,
    ) -> BadSectorRecord {
        let record = BadSectorRecord {
            sector_index: offset_bytes / sector_size.max(1) as u64,
            kind,
            pass_number,
            timestamp: Utc::now(),
            attempts: 1,
        };

        tracing::warn!(
            device = %self.device_path,
            sector = record.sector_index,
            kind = ?kind,
            pass = pass_number,
            "Bad sector recorded"
        );

        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        record
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Copy-on-read snapshot for external consumers.
    pub fn snapshot(&self) -> Vec<BadSectorRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Build the exportable report.
    pub fn report(&self) -> BadSectorReport {
        let records = self.snapshot();
        BadSectorReport {
            device_path: self.device_path.clone(),
            total_bad_sectors: records.len(),
            records,
        }
    }
}

/// Bad sector report for documentation and external reporting collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadSectorReport {
    pub device_path: String,
    pub total_bad_sectors: usize,
    pub records: Vec<BadSectorRecord>,
}

impl BadSectorReport {
    /// Format report as human-readable string
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Bad Sector Report for {}\n", self.device_path));
        output.push_str(&format!("{}\n", "=".repeat(60)));
        output.push_str(&format!("Total bad sectors: {}\n", self.total_bad_sectors));

        if !self.records.is_empty() {
            output.push_str("\nSector    Pass  Kind\n");
            for record in &self.records {
                output.push_str(&format!(
                    "{:<9} {:<5} {:?}\n",
                    record.sector_index, record.pass_number, record.kind
                ));
            }
        }

        output
    }
}
