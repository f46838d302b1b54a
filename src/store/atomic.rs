use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::IoStep;
use crate::{AppError, AppResult};

pub const TMP_SUFFIX: &str = ".tmp";

/// `<path>.tmp`, the write buffer that sits next to the committed file.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(TMP_SUFFIX);
    PathBuf::from(os)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn write_and_sync(tmp: &Path, bytes: &[u8]) -> AppResult<()> {
    let mut file = File::create(tmp).io_step("write_tmp", tmp)?;
    file.write_all(bytes).io_step("write_tmp", tmp)?;
    file.sync_all().io_step("sync_tmp", tmp)
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Replace `path` with `bytes` so readers only ever see the old or the new
/// contents.
///
/// The bytes are written and fsynced to `<path>.tmp`, renamed over `path`, and
/// the parent directory is fsynced. The parent directory must already exist.
/// If anything fails before the rename the previous file is left untouched and
/// the temporary file is removed. Once the rename succeeds the new contents
/// are committed and `Ok` is returned; a failed directory fsync after that
/// point is only logged.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    commit(path, bytes, sync_dir)
}

fn commit(
    path: &Path,
    bytes: &[u8],
    sync_parent: fn(&Path) -> io::Result<()>,
) -> AppResult<()> {
    let tmp = tmp_path_for(path);

    if let Err(err) = write_and_sync(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(AppError::from(err)
            .with_context("operation", "rename_tmp")
            .with_context("from", tmp.display().to_string())
            .with_context("to", path.display().to_string()));
    }

    let parent = parent_dir(path);
    if let Err(err) = sync_parent(parent) {
        warn!(
            target: "fleetkeeper",
            event = "fleet_store_dir_sync_failed",
            path = %parent.display(),
            error = %err
        );
    }
    Ok(())
}
