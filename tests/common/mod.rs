/// Common test utilities: disposable drive fixtures and session polling
/// helpers shared by the integration suites.
use mediatest::{DriveInfo, Engine, SessionHandle, SessionStatus, Statistics};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const MIB: u64 = 1024 * 1024;

/// A mounted-volume stand-in: a temp directory posing as the mount point.
/// Free-space sessions create their proxy file inside it.
pub fn mount_drive(free_bytes: u64) -> (TempDir, DriveInfo) {
    let dir = TempDir::new().expect("failed to create temp mount");
    let drive = DriveInfo {
        path: dir.path().to_path_buf(),
        total_bytes: free_bytes * 2,
        free_bytes,
        is_system_drive: false,
        sector_size_hint: Some(512),
    };
    (dir, drive)
}

/// A volume-image stand-in: a regular file the resolver opens directly,
/// giving full-device semantics without a block device.
pub fn image_drive(size_bytes: u64) -> (TempDir, DriveInfo) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let image = dir.path().join("volume.img");
    let file = std::fs::File::create(&image).expect("failed to create image");
    file.set_len(size_bytes).expect("failed to size image");
    drop(file);

    let drive = DriveInfo {
        path: image,
        total_bytes: size_bytes,
        free_bytes: 0,
        is_system_drive: false,
        sector_size_hint: Some(512),
    };
    (dir, drive)
}

/// Poll until the session reaches a terminal status.
pub fn wait_terminal(engine: &Engine, handle: SessionHandle) -> Statistics {
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        let stats = engine.statistics(handle).expect("handle went stale");
        if stats.status.is_terminal() {
            return stats;
        }
        assert!(
            Instant::now() < deadline,
            "session did not terminate within 60s (status {:?})",
            stats.status
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Poll until the session reports the wanted status.
pub fn wait_status(engine: &Engine, handle: SessionHandle, wanted: SessionStatus) -> Statistics {
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        let stats = engine.statistics(handle).expect("handle went stale");
        if stats.status == wanted {
            return stats;
        }
        assert!(
            !stats.status.is_terminal(),
            "session ended as {:?} while waiting for {:?}",
            stats.status,
            wanted
        );
        assert!(
            Instant::now() < deadline,
            "status never became {:?} (currently {:?})",
            wanted,
            stats.status
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Drain every queued event.
pub fn drain_events(engine: &Engine, handle: SessionHandle) -> Vec<mediatest::ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = engine.poll(handle).expect("handle went stale") {
        events.push(event);
    }
    events
}

/// Leftover proxy files under a mount point, by prefix.
pub fn proxy_leftovers(dir: &TempDir) -> Vec<PathBuf> {
    std::fs::read_dir(dir.path())
        .expect("mount dir unreadable")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(".mediatest_"))
                .unwrap_or(false)
        })
        .collect()
}
