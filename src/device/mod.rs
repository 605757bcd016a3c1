// Device resolution - maps a drive descriptor to the most direct I/O
// target available and reports the access mode obtained.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use crate::{DriveInfo, EngineError, EngineResult, TestMode};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Space left to the filesystem when sizing a free-space proxy file.
const PROXY_RESERVE_BYTES: u64 = 1024 * 1024;

/// How the target was obtained, in decreasing order of directness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AccessMode {
    /// Raw block device handle (needs elevated privileges).
    RawDevice,
    /// Volume opened directly without going through a mounted filesystem.
    UnmountedVolume,
    /// Temporary file inside the mounted filesystem.
    ProxyFile,
}

#[derive(Debug)]
enum TargetHandle {
    Device(File),
    // NamedTempFile removes the proxy on drop, so cleanup holds on every
    // exit path: completion, cancel, and panic-unwind alike.
    Proxy(NamedTempFile),
}

/// An opened I/O target plus the byte region the session may touch.
#[derive(Debug)]
pub struct ResolvedTarget {
    handle: TargetHandle,
    pub access: AccessMode,
    pub bytes: u64,
}

impl ResolvedTarget {
    pub fn file_mut(&mut self) -> &mut File {
        match &mut self.handle {
            TargetHandle::Device(file) => file,
            TargetHandle::Proxy(tmp) => tmp.as_file_mut(),
        }
    }

    pub fn proxy_path(&self) -> Option<&Path> {
        match &self.handle {
            TargetHandle::Proxy(tmp) => Some(tmp.path()),
            TargetHandle::Device(_) => None,
        }
    }
}

/// Platform strategy for turning a mounted-volume path into an I/O target.
pub trait DeviceResolver: Send + Sync {
    /// Resolve `drive` for a session over `mode`. Implementations try the
    /// rawest access first and fall back to a proxy file; they fail with
    /// `AccessDenied` when neither is usable.
    fn resolve(&self, drive: &DriveInfo, mode: TestMode) -> EngineResult<ResolvedTarget>;
}

/// The resolver for the platform we were built for.
pub fn platform_resolver() -> Box<dyn DeviceResolver> {
    #[cfg(unix)]
    {
        Box::new(unix::UnixResolver)
    }
    #[cfg(windows)]
    {
        Box::new(windows::WindowsResolver)
    }
}

/// Cheap write probe on the mount point: create and remove a marker file
/// before committing to a multi-gigabyte proxy allocation.
pub(crate) fn probe_writable(dir: &Path) -> EngineResult<()> {
    let marker = dir.join(".mediatest_probe");
    let mut file = File::create(&marker)
        .map_err(|e| EngineError::AccessDenied(format!("{}: {}", dir.display(), e)))?;
    file.write_all(b"probe")
        .map_err(|e| EngineError::AccessDenied(format!("{}: {}", dir.display(), e)))?;
    drop(file);
    std::fs::remove_file(&marker)?;
    Ok(())
}

/// Create a proxy file inside the mounted filesystem, sized to the region
/// the session will exercise.
pub(crate) fn create_proxy(drive: &DriveInfo, mode: TestMode) -> EngineResult<ResolvedTarget> {
    let dir = &drive.path;
    probe_writable(dir)?;

    let bytes = proxy_region_bytes(drive, mode);
    if bytes == 0 {
        return Err(EngineError::ZeroSizeTarget(dir.display().to_string()));
    }

    let tmp = tempfile::Builder::new()
        .prefix(".mediatest_")
        .suffix(".dat")
        .tempfile_in(dir)
        .map_err(|e| EngineError::AccessDenied(format!("{}: {}", dir.display(), e)))?;
    tmp.as_file().set_len(bytes)?;

    Ok(ResolvedTarget {
        handle: TargetHandle::Proxy(tmp),
        access: AccessMode::ProxyFile,
        bytes,
    })
}

fn proxy_region_bytes(drive: &DriveInfo, mode: TestMode) -> u64 {
    match mode {
        // Bounded by available free space, minus a filesystem reserve
        TestMode::FreeSpace => drive.free_bytes.saturating_sub(PROXY_RESERVE_BYTES),
        // Full-device run that fell back to a proxy: the file still cannot
        // exceed what the filesystem has free
        TestMode::FullDevice => drive
            .total_bytes
            .min(drive.free_bytes.saturating_sub(PROXY_RESERVE_BYTES)),
    }
}

pub(crate) fn open_device(path: &Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new().read(true).write(true).open(path)
}
