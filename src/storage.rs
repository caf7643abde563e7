//! Crash-safe output files.

use anyhow::{Context, Result, bail};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An output file that only appears at its final path once complete.
///
/// Data is written to a randomly named temporary file next to the target.
/// [`OutputFile::commit`] syncs it and atomically renames it over the target.
/// Dropping an uncommitted `OutputFile` removes the temporary file, so a
/// failed encode or decode never leaves a truncated result behind.
pub struct OutputFile {
    path: PathBuf,
    tmp_path: PathBuf,
    file: Option<File>,
}

impl OutputFile {
    /// Creates the temporary file for `path`.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` exists and `overwrite` is false, or if the
    /// temporary file cannot be created.
    pub fn create(path: impl Into<PathBuf>, overwrite: bool) -> Result<Self> {
        let path = path.into();
        if path.exists() && !overwrite {
            bail!("output file {} already exists", path.display());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = random_tmp_path(&path)?;

        // securely create temp file (fail if exists)
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        debug!(tmp = %tmp_path.display(), "temporary output created");

        Ok(Self {
            path,
            tmp_path,
            file: Some(file),
        })
    }

    /// Returns the final path of the output.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the data and moves it to the final path.
    ///
    /// If a crash occurs during commit, either the old file or the new one
    /// will be present, never a partial write.
    pub fn commit(mut self) -> Result<()> {
        self.file()?.sync_all()?; //fsync file
        self.file = None;

        //atomic replace
        if let Err(e) = atomic_replace(&self.tmp_path, &self.path) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e);
        }

        sync_parent_dir(&self.path)?;

        debug!(path = %self.path.display(), "output committed");
        Ok(())
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("output already committed"))
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Generates a unique temporary file path in the same directory.
///
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

    let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

    let file_name = path
        .file_name()
        .with_context(|| format!("{} is not a file path", path.display()))?
        .to_string_lossy();

    let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

    Ok(path.with_file_name(tmp_name))
}

/// Syncs the directory holding `path` so the rename is persisted.
#[cfg(not(target_os = "windows"))]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

/// `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` already flushes the rename.
#[cfg(target_os = "windows")]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// Atomically replaces the target file with the temporary file.
///
/// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
/// when the target exists, since it refuses to replace a missing file.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !target.exists() {
        fs::rename(tmp_path, target)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context("atomic replace failed");
    }

    Ok(())
}

/// Atomically replaces the target file with the temporary file.
///
/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}
