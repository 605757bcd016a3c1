use super::{create_proxy, AccessMode, DeviceResolver, ResolvedTarget, TargetHandle};
use crate::{DriveInfo, EngineError, EngineResult, TestMode};
use std::fs::OpenOptions;
use std::os::windows::fs::OpenOptionsExt;
use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE};

pub struct WindowsResolver;

impl WindowsResolver {
    /// `C:\` → `\\.\C:` volume handle path.
    fn volume_device_path(drive: &DriveInfo) -> Option<String> {
        let mount = drive.path.to_string_lossy();
        let letter = mount.chars().next()?;
        if !letter.is_ascii_alphabetic() {
            return None;
        }
        Some(format!(r"\\.\{}:", letter.to_ascii_uppercase()))
    }
}

impl DeviceResolver for WindowsResolver {
    fn resolve(&self, drive: &DriveInfo, mode: TestMode) -> EngineResult<ResolvedTarget> {
        if mode == TestMode::FreeSpace {
            return create_proxy(drive, mode);
        }

        if let Some(device_path) = Self::volume_device_path(drive) {
            // Volume handles must be opened with both share flags or the
            // open fails while the filesystem holds the volume
            let opened = OpenOptions::new()
                .read(true)
                .write(true)
                .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE)
                .open(&device_path);

            match opened {
                Ok(file) => {
                    if drive.total_bytes == 0 {
                        return Err(EngineError::ZeroSizeTarget(device_path));
                    }
                    tracing::info!(device = %device_path, "opened raw volume handle");
                    return Ok(ResolvedTarget {
                        handle: TargetHandle::Device(file),
                        access: AccessMode::RawDevice,
                        bytes: drive.total_bytes,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        device = %device_path,
                        error = %e,
                        "raw volume open failed, falling back to proxy file"
                    );
                }
            }
        }

        create_proxy(drive, mode)
    }
}
