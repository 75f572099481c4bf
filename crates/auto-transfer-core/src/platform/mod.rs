#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::Path;

pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Free space available to the current user on the volume holding a path.
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;

    fn available_gb(&self, path: &Path) -> io::Result<f64> {
        Ok(self.available_bytes(path)? as f64 / BYTES_PER_GB)
    }
}

/// Queries the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        available_disk_space(path)
    }
}

/// Reports a fixed amount, for embedding where the volume is known.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub u64);

impl FixedSpace {
    pub fn gb(gb: f64) -> Self {
        FixedSpace((gb * BYTES_PER_GB) as u64)
    }
}

impl SpaceProbe for FixedSpace {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

#[cfg(unix)]
pub fn available_disk_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    // Field widths differ between Linux and macOS.
    let bavail: u64 = stat.f_bavail as _;
    let frsize: u64 = stat.f_frsize as _;
    Ok(bavail.wrapping_mul(frsize))
}

#[cfg(target_os = "windows")]
pub fn available_disk_space(path: &Path) -> io::Result<u64> {
    windows::available_disk_space(path)
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn available_disk_space(_path: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}
