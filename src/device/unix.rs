use super::{create_proxy, open_device, AccessMode, DeviceResolver, ResolvedTarget, TargetHandle};
use crate::{DriveInfo, EngineError, EngineResult, TestMode};
use std::os::unix::fs::FileTypeExt;

pub struct UnixResolver;

impl UnixResolver {
    fn is_elevated() -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
}

impl DeviceResolver for UnixResolver {
    fn resolve(&self, drive: &DriveInfo, mode: TestMode) -> EngineResult<ResolvedTarget> {
        // Free-space runs always go through the mounted filesystem
        if mode == TestMode::FreeSpace {
            return create_proxy(drive, mode);
        }

        let metadata = std::fs::metadata(&drive.path)?;
        let file_type = metadata.file_type();

        if file_type.is_block_device() || file_type.is_char_device() {
            match open_device(&drive.path) {
                Ok(file) => {
                    if drive.total_bytes == 0 {
                        return Err(EngineError::ZeroSizeTarget(
                            drive.path.display().to_string(),
                        ));
                    }
                    tracing::info!(
                        device = %drive.path.display(),
                        elevated = Self::is_elevated(),
                        "opened raw block device"
                    );
                    return Ok(ResolvedTarget {
                        handle: TargetHandle::Device(file),
                        access: AccessMode::RawDevice,
                        bytes: drive.total_bytes,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        device = %drive.path.display(),
                        error = %e,
                        "raw device open failed, no filesystem to fall back to"
                    );
                    return Err(EngineError::AccessDenied(format!(
                        "{}: {}",
                        drive.path.display(),
                        e
                    )));
                }
            }
        }

        if file_type.is_file() {
            // A plain file target (volume image, loopback backing file):
            // write it directly rather than nesting a proxy inside nothing
            let file = open_device(&drive.path).map_err(|e| {
                EngineError::AccessDenied(format!("{}: {}", drive.path.display(), e))
            })?;
            let bytes = if drive.total_bytes > 0 {
                drive.total_bytes
            } else {
                metadata.len()
            };
            if bytes == 0 {
                return Err(EngineError::ZeroSizeTarget(
                    drive.path.display().to_string(),
                ));
            }
            return Ok(ResolvedTarget {
                handle: TargetHandle::Device(file),
                access: AccessMode::UnmountedVolume,
                bytes,
            });
        }

        // Mount point: proxy file sized to the tested region
        create_proxy(drive, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn plain_file_targets_open_directly() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("volume.img");
        let mut file = std::fs::File::create(&image).unwrap();
        file.write_all(&[0u8; 4096]).unwrap();
        drop(file);

        let drive = DriveInfo {
            path: image,
            total_bytes: 4096,
            free_bytes: 0,
            is_system_drive: false,
            sector_size_hint: Some(512),
        };

        let target = UnixResolver.resolve(&drive, TestMode::FullDevice).unwrap();
        assert_eq!(target.access, AccessMode::UnmountedVolume);
        assert_eq!(target.bytes, 4096);
    }

    #[test]
    fn mount_point_falls_back_to_proxy() {
        let dir = TempDir::new().unwrap();
        let drive = DriveInfo {
            path: dir.path().to_path_buf(),
            total_bytes: 16 * 1024 * 1024,
            free_bytes: 16 * 1024 * 1024,
            is_system_drive: false,
            sector_size_hint: None,
        };

        let target = UnixResolver.resolve(&drive, TestMode::FullDevice).unwrap();
        assert_eq!(target.access, AccessMode::ProxyFile);
        assert!(target.proxy_path().is_some());
    }

    #[test]
    fn missing_target_is_an_io_error() {
        let drive = DriveInfo {
            path: "/definitely/not/here".into(),
            total_bytes: 1,
            free_bytes: 1,
            is_system_drive: false,
            sector_size_hint: None,
        };
        assert!(UnixResolver.resolve(&drive, TestMode::FullDevice).is_err());
    }
}
