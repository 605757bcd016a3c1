// Allow uppercase acronyms for industry-standard terms like DoD
#![allow(clippy::upper_case_acronyms)]

pub mod device;
pub mod events;
pub mod patterns;
pub mod planner;
pub mod sectors;
pub mod session;
pub mod speed;
pub mod ui;
pub mod worker;

// Re-export the operation surface for convenience
pub use events::{LogLevel, ProgressEvent};
pub use sectors::{BadSectorRecord, SectorErrorKind};
pub use session::{SessionStatus, Statistics};
pub use worker::{Engine, SessionHandle};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine's operation surface.
///
/// These cover the setup taxonomy only: anything that aborts a session
/// before its worker loop starts. Chunk-level I/O failures during a run are
/// data, not errors: they become [`BadSectorRecord`]s and the loop
/// continues.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("a session is already running")]
    AlreadyRunning,

    #[error("refusing to operate on system drive: {0}")]
    UnsafeTarget(String),

    #[error("device not accessible in any mode: {0}")]
    AccessDenied(String),

    #[error("target resolves to zero bytes: {0}")]
    ZeroSizeTarget(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unknown or expired session handle")]
    InvalidHandle,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Resolved drive descriptor, supplied by an external enumeration
/// collaborator. The engine never scans for drives itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveInfo {
    pub path: PathBuf,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub is_system_drive: bool,
    /// Logical sector size if the enumerator knows it; 512 otherwise.
    pub sector_size_hint: Option<u32>,
}

impl DriveInfo {
    pub fn sector_size(&self) -> u32 {
        self.sector_size_hint.unwrap_or(512)
    }
}

/// What portion of the drive a test session exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestMode {
    /// Write into a proxy file bounded by the volume's free space.
    FreeSpace,
    /// Write the raw device across its entire reported capacity.
    FullDevice,
}

/// Fill rule for a test pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestPattern {
    Ones,   // 0xFF
    Zeros,  // 0x00
    Random, // fresh bytes per chunk
}

/// Named overwrite standard for wipe sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WipeMethod {
    /// Single zero-fill pass.
    Simple,
    /// DoD 5220.22-M: 0x00, 0xFF, random.
    DoD,
    /// Gutmann 35-pass sequence.
    Gutmann,
    /// N independently random passes.
    Custom,
}

/// Test session parameters, validated once at `start_test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestParams {
    pub passes: u32,
    pub patterns: Vec<TestPattern>,
    pub verify_on_write: bool,
    pub mode: TestMode,
    pub chunk_size_mb: u32,
    pub adaptive_chunk: bool,
    pub auto_format_requested: bool,
    pub filesystem_hint: String,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            passes: 1,
            patterns: vec![TestPattern::Random],
            verify_on_write: true,
            mode: TestMode::FreeSpace,
            chunk_size_mb: 32,
            adaptive_chunk: false,
            auto_format_requested: false,
            filesystem_hint: "FAT32".to_string(),
        }
    }
}

impl TestParams {
    /// Bounds-check every recognized option. An empty pattern set falls
    /// back to `Random` rather than failing.
    pub fn validate(&mut self) -> EngineResult<()> {
        if self.passes < 1 {
            return Err(EngineError::InvalidParams(
                "passes must be at least 1".to_string(),
            ));
        }
        if !(planner::MIN_CHUNK_MB..=planner::MAX_CHUNK_MB).contains(&self.chunk_size_mb) {
            return Err(EngineError::InvalidParams(format!(
                "chunk_size_mb {} outside [{}, {}]",
                self.chunk_size_mb,
                planner::MIN_CHUNK_MB,
                planner::MAX_CHUNK_MB
            )));
        }
        if self.patterns.is_empty() {
            self.patterns.push(TestPattern::Random);
        }
        Ok(())
    }
}

/// Wipe session parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeParams {
    pub method: WipeMethod,
    /// Pass count; consulted only when `method == Custom`.
    pub passes: u32,
    /// Read-verify sweep of the final pass byte after the last pass.
    pub verify: bool,
}

impl Default for WipeParams {
    fn default() -> Self {
        Self {
            method: WipeMethod::Simple,
            passes: 1,
            verify: true,
        }
    }
}

impl WipeParams {
    pub fn validate(&self) -> EngineResult<()> {
        if self.method == WipeMethod::Custom && self.passes < 1 {
            return Err(EngineError::InvalidParams(
                "custom wipe needs at least 1 pass".to_string(),
            ));
        }
        Ok(())
    }
}
