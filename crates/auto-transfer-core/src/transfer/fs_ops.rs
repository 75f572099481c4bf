use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};

/// File system primitives used while executing a run. Swappable so tests can
/// inject short copies, slow copies and drive errors.
pub trait FileOps: Send + Sync {
    /// Copy content, then carry over modification and access times.
    /// Returns the number of bytes copied.
    fn copy_with_metadata(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Size of a regular file, `None` when nothing is there.
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileOps for LocalFs {
    fn copy_with_metadata(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let bytes = fs::copy(from, to)?;
        let source_meta = fs::metadata(from)?;
        let mut times = FileTimes::new().set_modified(source_meta.modified()?);
        if let Ok(accessed) = source_meta.accessed() {
            times = times.set_accessed(accessed);
        }
        // Read-only sources produce read-only copies.
        let target = File::options()
            .write(true)
            .open(to)
            .or_else(|_| File::open(to))?;
        target.set_times(times)?;
        Ok(bytes)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(m) if m.is_file() => Ok(Some(m.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// First free destination path for `file_name`: the name itself, then
/// `stem_copy1.ext`, `stem_copy2.ext`, ...
pub fn unique_destination(dest_dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let candidate = dest_dir.join(file_name);
    if !candidate.try_exists()? {
        return Ok(candidate);
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    let mut counter = 1u64;
    loop {
        let name = match ext {
            Some(ext) => format!("{}_copy{}.{}", stem, counter, ext),
            None => format!("{}_copy{}", stem, counter),
        };
        let candidate = dest_dir.join(name);
        if !candidate.try_exists()? {
            return Ok(candidate);
        }
        counter += 1;
    }
}
