pub mod log;
pub mod rsync;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::backup::log::BackupLog;
use crate::backup::rsync::rsync_command;
use crate::context::Context;
use crate::error::{CryptbakError, Result};
use crate::util::command::ToolCommand;
use crate::util::paths::{ensure_dir, ensure_writable_dir, list_entries};

pub const MARKER_DIR: &str = ".cryptbak";

pub fn marker_dir(volume_root: &Path) -> PathBuf {
    volume_root.join(MARKER_DIR)
}

/// One completed-backup record on a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub host: String,
    pub completed: DateTime<Local>,
}

pub struct BackupJob<'a> {
    pub source: &'a Path,
    pub dest: &'a Path,
    pub excludes_file: &'a Path,
    pub extra: &'a [String],
    pub host: &'a str,
}

/// Sync `job.source` into `job.dest`. The host's marker in the
/// destination's parent is refreshed only when rsync exits 0.
pub fn backup(ctx: &Context, job: &BackupJob, log: &mut BackupLog) -> Result<Duration> {
    let volume_root = job.dest.parent().ok_or_else(|| {
        CryptbakError::message(format!("backup destination {} has no parent", job.dest.display()))
    })?;
    ensure_writable_dir(volume_root)?;
    if !job.excludes_file.is_file() {
        return Err(CryptbakError::message(format!(
            "exclude list {} is missing",
            job.excludes_file.display()
        )));
    }
    if !ctx.run_mode.is_dry_run() {
        ensure_dir(job.dest, 0o755)?;
    }

    let cmd = rsync_command(job.source, job.dest, job.excludes_file, job.extra);
    log.line(&format!("{} {}", Local::now().format("%d-%m-%Y %H:%M:%S"), cmd.display()))?;
    info!("backing up {} to {}", job.source.display(), job.dest.display());

    let started = Instant::now();
    let code = ctx.runner.stream(&cmd, log.writer())?;
    let elapsed = started.elapsed();
    if code != 0 {
        return Err(CryptbakError::message(format!(
            "rsync failed with exit code {} after {}",
            code,
            format_duration(elapsed)
        )));
    }

    log.line(&format!("backup completed in {}", format_duration(elapsed)))?;
    log.commit()?;
    if ctx.run_mode.is_dry_run() {
        info!("dry run; marker for {} left untouched", job.host);
    } else {
        touch_marker(volume_root, job.host)?;
    }
    println!("Backup completed in {}", format_duration(elapsed));
    Ok(elapsed)
}

/// Create the host's marker or bump its mtime to now.
pub fn touch_marker(volume_root: &Path, host: &str) -> Result<PathBuf> {
    let dir = marker_dir(volume_root);
    ensure_dir(&dir, 0o755)?;
    let path = dir.join(host);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| CryptbakError::message(format!("open {}: {}", path.display(), e)))?;
    file.set_modified(SystemTime::now())
        .map_err(|e| CryptbakError::message(format!("touch {}: {}", path.display(), e)))?;
    Ok(path)
}

pub fn read_markers(volume_root: &Path) -> Result<Vec<BackupRecord>> {
    let dir = marker_dir(volume_root);
    if !dir.is_dir() {
        return Err(CryptbakError::not_found(format!(
            "{} is not a backup volume (missing {})",
            volume_root.display(),
            dir.display()
        )));
    }
    let mut records = Vec::new();
    for host in list_entries(&dir)? {
        let path = dir.join(&host);
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|e| CryptbakError::message(format!("stat {}: {}", path.display(), e)))?;
        records.push(BackupRecord {
            host,
            completed: DateTime::<Local>::from(modified),
        });
    }
    Ok(records)
}

/// Print every host's last backup time followed by disk usage.
pub fn list_backups(ctx: &Context, mountpoint: &Path) -> Result<Vec<BackupRecord>> {
    let records = read_markers(mountpoint)?;
    println!("Backups on {}:", mountpoint.display());
    if records.is_empty() {
        println!("  (none)");
    }
    for record in &records {
        println!(
            "  {:<24} {}",
            record.host,
            record.completed.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    let df = ToolCommand::new("df")
        .arg("-h")
        .arg("-l")
        .args(["-x", "tmpfs", "-x", "devtmpfs", "-x", "squashfs", "-x", "overlay"]);
    let code = ctx.runner.status(&df)?;
    if code != 0 {
        warn!("df exited with code {}", code);
    }
    Ok(records)
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// "1 hour, 2 minutes and 3 seconds"; leading zero units are left out.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if hours > 0 || minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    parts.push(plural(seconds, "second"));
    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}
