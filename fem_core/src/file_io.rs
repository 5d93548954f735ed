//! # File I/O Module
//!
//! Handles project file operations with safety features:
//! - **Atomic saves**: Write to .tmp, sync, rename to prevent corruption
//! - **File locking**: Prevent concurrent edits on shared drives
//! - **Version handling**: Older files are migrated, newer ones refused
//!
//! ## File Format
//!
//! Projects are saved as `.tmf` files containing JSON (see
//! [`crate::serializer`]). Lock files use the `.tmf.lock` extension with
//! metadata about who holds the lock. The same lock guards the writer of a
//! results run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fem_core::file_io::{save_project, load_project, FileLock};
//! use fem_core::project::Project;
//! use std::path::Path;
//!
//! let project = Project::new("Engineer");
//! let path = Path::new("bridge.tmf");
//!
//! // Acquire lock before saving
//! let lock = FileLock::acquire(path, "engineer@company.com").unwrap();
//!
//! // Save with atomic write
//! save_project(&project, path).unwrap();
//!
//! // Lock is released when dropped
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
#[cfg(not(target_arch = "wasm32"))]
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{ModelError, ModelResult};
use crate::project::Project;
use crate::serializer::Serializer;

/// Locks older than this are considered abandoned.
const STALE_LOCK_HOURS: i64 = 24;

/// Lock file metadata stored in .lock files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    /// Machine name where lock was acquired
    pub machine: String,
    /// Process ID that holds the lock
    pub pid: u32,
    /// When the lock was acquired
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    /// Create new lock info for the current process
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }

    /// Whether the holder has gone away (dead process on this machine, or
    /// a lock older than a day).
    pub fn is_stale(&self) -> bool {
        if Some(&self.machine) == hostname().as_ref() && !process_alive(self.pid) {
            return true;
        }
        (Utc::now() - self.locked_at).num_hours() > STALE_LOCK_HOURS
    }
}

/// Get the hostname of the current machine
fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::env::var("HOST").ok())
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    use std::process::Command;
    match Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => true,
    }
}

#[cfg(not(any(unix, windows)))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// File lock guard that releases the lock when dropped.
///
/// Uses both:
/// 1. OS-level file locking (via fs2) for process safety
/// 2. .lock file with metadata for user visibility
#[derive(Debug)]
pub struct FileLock {
    /// Path to the locked file
    target_path: PathBuf,
    lock_path: PathBuf,
    /// Keeps the OS lock alive
    _lock_file: File,
    pub info: LockInfo,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`.
    ///
    /// Fails with `FileLocked` if another live process holds it. A stale
    /// lock is taken over.
    ///
    /// ```rust,no_run
    /// use fem_core::file_io::FileLock;
    /// use std::path::Path;
    ///
    /// let lock = FileLock::acquire(Path::new("bridge.tmf"), "user@email.com")?;
    /// // ... do work ...
    /// drop(lock); // releases lock
    /// # Ok::<(), fem_core::errors::ModelError>(())
    /// ```
    pub fn acquire(path: &Path, user_id: impl Into<String>) -> ModelResult<Self> {
        let lock_path = lock_path_for(path);
        let info = LockInfo::new(user_id);

        if let Some(existing) = FileLock::check(path) {
            return Err(ModelError::file_locked(
                path.display().to_string(),
                format!("{} ({})", existing.user_id, existing.machine),
                existing.locked_at.to_rfc3339(),
            ));
        }
        if lock_path.exists() {
            warn!(path = %lock_path.display(), "taking over stale lock");
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| ModelError::file_error("create lock", lock_path.display().to_string(), e.to_string()))?;

        #[cfg(not(target_arch = "wasm32"))]
        lock_file.try_lock_exclusive().map_err(|_| {
            ModelError::file_locked(
                path.display().to_string(),
                "another process".to_string(),
                "unknown".to_string(),
            )
        })?;

        let lock_json = serde_json::to_string_pretty(&info).map_err(ModelError::serialization)?;
        lock_file
            .write_all(lock_json.as_bytes())
            .map_err(|e| ModelError::file_error("write lock", lock_path.display().to_string(), e.to_string()))?;
        lock_file
            .sync_all()
            .map_err(|e| ModelError::file_error("sync lock", lock_path.display().to_string(), e.to_string()))?;

        Ok(FileLock {
            target_path: path.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Check if a file is locked without acquiring the lock.
    ///
    /// Returns `Some(LockInfo)` if a live lock exists, `None` if available.
    pub fn check(path: &Path) -> Option<LockInfo> {
        let lock_path = lock_path_for(path);
        if !lock_path.exists() {
            return None;
        }
        read_lock_info(&lock_path).ok().filter(|info| !info.is_stale())
    }

    /// Path of the locked file
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // OS lock is released when _lock_file is dropped
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Lock file path for a file: `bridge.tmf` -> `bridge.tmf.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock_path = path.to_path_buf();
    let extension = lock_path
        .extension()
        .map(|e| format!("{}.lock", e.to_string_lossy()))
        .unwrap_or_else(|| "lock".to_string());
    lock_path.set_extension(extension);
    lock_path
}

fn read_lock_info(lock_path: &Path) -> ModelResult<LockInfo> {
    let contents = read_to_string(lock_path)?;
    serde_json::from_str(&contents).map_err(ModelError::serialization)
}

pub(crate) fn read_to_string(path: &Path) -> ModelResult<String> {
    let mut file =
        File::open(path).map_err(|e| ModelError::file_error("open", path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ModelError::file_error("read", path.display().to_string(), e.to_string()))?;
    Ok(contents)
}

/// Write `bytes` to `path` atomically: write a `.tmp` sibling, sync it to
/// disk, then rename it over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ModelResult<()> {
    let tmp_path = tmp_path_for(path);

    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| ModelError::file_error("create temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .write_all(bytes)
        .map_err(|e| ModelError::file_error("write temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .sync_all()
        .map_err(|e| ModelError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string()))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        ModelError::file_error("rename to final", path.display().to_string(), e.to_string())
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp_path = path.to_path_buf();
    let extension = tmp_path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    tmp_path.set_extension(extension);
    tmp_path
}

/// Save a project with atomic write semantics. Always writes the current
/// schema version.
///
/// ```rust,no_run
/// use fem_core::file_io::save_project;
/// use fem_core::project::Project;
/// use std::path::Path;
///
/// let project = Project::new("Engineer");
/// save_project(&project, Path::new("bridge.tmf"))?;
/// # Ok::<(), fem_core::errors::ModelError>(())
/// ```
pub fn save_project(project: &Project, path: &Path) -> ModelResult<()> {
    let json = Serializer::new().to_string(project)?;
    write_atomic(path, json.as_bytes())?;
    info!(path = %path.display(), entities = project.document.len(), "saved project");
    Ok(())
}

/// Load a project, migrating older schema versions.
///
/// # Returns
///
/// * `Ok(Project)` - Successfully loaded project
/// * `Err(ModelError::UnsupportedVersion)` - File is newer than this build
/// * `Err(ModelError::MigrationFailed)` - An older file could not be upgraded
/// * `Err(ModelError::SerializationError)` - Invalid JSON
/// * `Err(ModelError::FileError)` - I/O error
pub fn load_project(path: &Path) -> ModelResult<Project> {
    let contents = read_to_string(path)?;
    let mut project = Serializer::new().from_str(&contents).map_err(|e| match e {
        ModelError::SerializationError { reason } => ModelError::SerializationError {
            reason: format!("{}: {}", path.display(), reason),
        },
        other => other,
    })?;
    project.meta.file_path = Some(path.display().to_string());
    info!(path = %path.display(), "opened project");
    Ok(project)
}

/// Load a project, returning whether it's read-only due to a lock.
///
/// # Returns
///
/// * `Ok((Project, None))` - Loaded successfully, no lock
/// * `Ok((Project, Some(LockInfo)))` - Loaded, but another user has the lock
/// * `Err(_)` - Failed to load
pub fn load_project_with_lock_check(path: &Path) -> ModelResult<(Project, Option<LockInfo>)> {
    let project = load_project(path)?;
    let lock_info = FileLock::check(path);
    Ok((project, lock_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use std::env::temp_dir;

    fn temp_project_path(name: &str) -> PathBuf {
        temp_dir().join(format!("trellis_test_{}_{}.tmf", name, std::process::id()))
    }

    #[test]
    fn test_lock_path_generation() {
        let project_path = Path::new("/path/to/project.tmf");
        assert_eq!(lock_path_for(project_path), Path::new("/path/to/project.tmf.lock"));
        assert_eq!(lock_path_for(Path::new("/runs/run")), Path::new("/runs/run.lock"));
    }

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("test@example.com");
        assert_eq!(info.user_id, "test@example.com");
        assert!(info.pid > 0);
        assert!(!info.is_stale());
    }

    #[test]
    fn test_old_lock_is_stale() {
        let mut info = LockInfo::new("someone");
        info.machine = "elsewhere".to_string();
        info.locked_at = Utc::now() - chrono::Duration::hours(STALE_LOCK_HOURS + 1);
        assert!(info.is_stale());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = temp_project_path("roundtrip");

        let mut project = Project::new("Test Engineer").with_description("portal");
        project.document.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
        save_project(&project, &path).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.meta.created_by, "Test Engineer");
        assert_eq!(loaded.meta.description.as_deref(), Some("portal"));
        assert_eq!(loaded.meta.file_path, Some(path.display().to_string()));
        assert_eq!(loaded.document, project.document);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_atomic_save_creates_no_tmp_file() {
        let path = temp_project_path("atomic");
        let tmp_path = path.with_extension("tmf.tmp");

        save_project(&Project::new("Test"), &path).unwrap();

        assert!(!tmp_path.exists());
        assert!(path.exists());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_lock_acquire_and_release() {
        let path = temp_project_path("lock_test");
        File::create(&path).unwrap();

        let lock = FileLock::acquire(&path, "test@example.com").unwrap();
        assert_eq!(lock.info.user_id, "test@example.com");
        assert_eq!(lock.target_path(), path.as_path());

        let lock_path = lock_path_for(&path);
        assert!(lock_path.exists());
        assert!(FileLock::check(&path).is_some());

        drop(lock);
        assert!(!lock_path.exists());
        assert!(FileLock::check(&path).is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_newer_file_is_refused() {
        let path = temp_project_path("newer");
        let json = r#"{ "metadata": { "file_format_version": "9.0.0" }, "model": {} }"#;
        fs::write(&path, json).unwrap();

        let err = load_project(&path).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_VERSION");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_with_lock_check() {
        let path = temp_project_path("lock_check");
        save_project(&Project::new("Test"), &path).unwrap();

        let (loaded, lock_info) = load_project_with_lock_check(&path).unwrap();
        assert_eq!(loaded.meta.created_by, "Test");
        assert!(lock_info.is_none());

        let _ = fs::remove_file(&path);
    }
}
