//! Atomic call-file publication.
//!
//! Asterisk executes any complete file that appears in its outgoing
//! directory. A call file is therefore written and synced in the staging
//! directory first, stamped with its scheduled time, and only then renamed
//! into `outgoing/`. Staging and outgoing directories must live on the same
//! filesystem so the rename is atomic.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use outcall_core::Schedule;
use tracing::{debug, error, warn};

use crate::config::ApiConfig;
use crate::error::CallError;

/// Prefix of every call-file name.
pub const CALL_FILE_PREFIX: &str = "outgoing-call-";

/// How many fresh names to try when a staging name is already taken.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Writes call files into the spool and publishes them atomically.
#[derive(Debug, Clone)]
pub struct CallFilePublisher {
    staging_dir: PathBuf,
    outgoing_dir: PathBuf,
}

impl CallFilePublisher {
    /// Creates a publisher with explicit staging and outgoing directories.
    pub fn new(staging_dir: impl Into<PathBuf>, outgoing_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            outgoing_dir: outgoing_dir.into(),
        }
    }

    /// Creates a publisher for the configured spool root.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.staging_dir(), config.outgoing_dir())
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn outgoing_dir(&self) -> &Path {
        &self.outgoing_dir
    }

    /// Logs a warning for spool directories that do not exist yet.
    pub fn check_dirs(&self) {
        for dir in [&self.staging_dir, &self.outgoing_dir] {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "Spool directory missing; calls will fail");
            }
        }
    }

    /// Publishes `contents` on the blocking pool.
    ///
    /// Returns the call-file name on success.
    pub async fn publish(&self, contents: String, schedule: Schedule) -> Result<String, CallError> {
        let publisher = self.clone();
        tokio::task::spawn_blocking(move || publisher.publish_blocking(&contents, schedule))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Call file publication task failed");
                Err(CallError::CreateCallFile)
            })
    }

    /// Stages, stamps and renames one call file.
    ///
    /// On failure nothing is left in either directory.
    pub fn publish_blocking(&self, contents: &str, schedule: Schedule) -> Result<String, CallError> {
        let (name, staging_path, file) = self.create_staging_file()?;

        if let Err(e) = write_staged(file, contents, schedule) {
            error!(path = %staging_path.display(), error = %e, "Failed to write call file");
            discard(&staging_path);
            return Err(CallError::CreateCallFile);
        }

        let final_path = self.outgoing_dir.join(&name);
        if fs::symlink_metadata(&final_path).is_ok() {
            error!(path = %final_path.display(), "Call file name already published");
            discard(&staging_path);
            return Err(CallError::MoveCallFile);
        }
        if let Err(e) = fs::rename(&staging_path, &final_path) {
            error!(
                from = %staging_path.display(),
                to = %final_path.display(),
                error = %e,
                "Failed to move call file into outgoing directory"
            );
            discard(&staging_path);
            return Err(CallError::MoveCallFile);
        }

        debug!(path = %final_path.display(), ?schedule, "Published call file");
        Ok(name)
    }

    fn create_staging_file(&self) -> Result<(String, PathBuf, File), CallError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = format!("{}{}", CALL_FILE_PREFIX, rand::random::<u64>());
            let path = self.staging_dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(%name, "Call file name taken, drawing another");
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to create call file");
                    return Err(CallError::CreateCallFile);
                }
            }
        }
        error!("Exhausted call file name attempts");
        Err(CallError::CreateCallFile)
    }
}

fn write_staged(mut file: File, contents: &str, schedule: Schedule) -> io::Result<()> {
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    if let Some(at) = schedule.instant() {
        let at = SystemTime::from(at);
        file.set_times(FileTimes::new().set_accessed(at).set_modified(at))?;
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged call file");
        }
    }
}
