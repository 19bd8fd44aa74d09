use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use nix::unistd::{chown, Group};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::model::RuntimeConfig;
use crate::error::{CryptbakError, Result};
use crate::util::paths::ensure_dir;

/// Path of the run log that would be discarded if the process stopped now.
/// Shared with the signal handler.
pub type LogTracker = Arc<Mutex<Option<PathBuf>>>;

/// Log of one backup run. Removed on drop unless committed, so only runs
/// whose copy step finished leave a log behind.
pub struct BackupLog {
    path: PathBuf,
    file: File,
    keep: usize,
    committed: bool,
    tracker: LogTracker,
}

impl BackupLog {
    pub fn create(config: &RuntimeConfig, tracker: &LogTracker) -> Result<Self> {
        ensure_dir(&config.log_dir, 0o750)?;

        let stamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();
        let (path, file) = create_unique(&config.log_dir, &stamp)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640))
            .map_err(|e| CryptbakError::message(format!("chmod {}: {}", path.display(), e)))?;
        match Group::from_name(&config.log_group) {
            Ok(Some(group)) => {
                if let Err(err) = chown(&path, None, Some(group.gid)) {
                    warn!("chgrp {} {}: {}", config.log_group, path.display(), err);
                }
            }
            Ok(None) => warn!("log group {} does not exist", config.log_group),
            Err(err) => warn!("look up group {}: {}", config.log_group, err),
        }
        if let Ok(mut current) = tracker.lock() {
            *current = Some(path.clone());
        }
        debug!("logging to {}", path.display());
        Ok(Self {
            path,
            file,
            keep: config.log_keep,
            committed: false,
            tracker: tracker.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.file, "{}", text)?;
        Ok(())
    }

    pub fn writer(&mut self) -> &mut dyn Write {
        &mut self.file
    }

    /// Keep this log, then trim the directory to the newest `logKeep`
    /// logs, this one included.
    pub fn commit(&mut self) -> Result<()> {
        self.committed = true;
        if let Ok(mut current) = self.tracker.lock() {
            *current = None;
        }
        self.file.flush()?;
        if let Some(dir) = self.path.parent() {
            prune_logs(dir, self.keep)?;
        }
        Ok(())
    }
}

impl Drop for BackupLog {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let _ = fs::remove_file(&self.path);
        if let Ok(mut current) = self.tracker.lock() {
            if current.as_deref() == Some(self.path.as_path()) {
                *current = None;
            }
        }
    }
}

fn create_unique(dir: &Path, stamp: &str) -> Result<(PathBuf, File)> {
    for attempt in 0..100 {
        let name = if attempt == 0 {
            format!("{}.log", stamp)
        } else {
            format!("{}-{}.log", stamp, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(CryptbakError::message(format!(
                    "create {}: {}",
                    path.display(),
                    err
                )))
            }
        }
    }
    Err(CryptbakError::message(format!(
        "no free log file name for {} in {}",
        stamp,
        dir.display()
    )))
}

/// Delete the oldest `*.log` files in `dir` until at most `keep` remain.
/// Names are timestamps, so name order is age order.
pub fn prune_logs(dir: &Path, keep: usize) -> Result<usize> {
    let mut logs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| CryptbakError::message(format!("read {}: {}", dir.display(), e)))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "log") {
            logs.push(entry.into_path());
        }
    }
    if logs.len() <= keep {
        return Ok(0);
    }
    let excess = logs.len() - keep;
    for path in logs.iter().take(excess) {
        debug!("removing old log {}", path.display());
        fs::remove_file(path)
            .map_err(|e| CryptbakError::message(format!("remove {}: {}", path.display(), e)))?;
    }
    Ok(excess)
}
