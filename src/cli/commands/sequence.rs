use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::backup::log::{BackupLog, LogTracker};
use crate::backup::{backup, list_backups, BackupJob};
use crate::cli::commands::Step;
use crate::context::Context;
use crate::disk::registry::Registry;
use crate::disk::{mountpoints_for_device, open_mapping_for_raw_device, uuid_for_device};
use crate::error::{CryptbakError, Result, ToolError};
use crate::volume::{self, check_filesystem, mount_safe, open_disk, open_safe};

/// Inputs shared by every step of one run.
pub struct SequenceOptions {
    pub device: Option<PathBuf>,
    pub source: PathBuf,
    pub host: String,
    pub rsync_extra: Vec<String>,
    pub tracker: LogTracker,
}

/// Where the target device stands between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub raw_device: PathBuf,
    pub open_device: Option<PathBuf>,
    pub encrypted: bool,
    pub mountpoint: Option<PathBuf>,
}

impl Session {
    /// Pick up whatever an earlier run left open or mounted.
    pub fn discover(ctx: &Context, raw: &Path) -> Result<Self> {
        let mut session = Session {
            raw_device: raw.to_path_buf(),
            open_device: None,
            encrypted: false,
            mountpoint: None,
        };
        if let Some(mapped) = open_mapping_for_raw_device(ctx, raw)? {
            session.mountpoint = mountpoints_for_device(ctx, &mapped)?.into_iter().next();
            session.open_device = Some(mapped);
            session.encrypted = true;
        } else if let Some(mountpoint) = mountpoints_for_device(ctx, raw)?.into_iter().next() {
            session.open_device = Some(raw.to_path_buf());
            session.mountpoint = Some(mountpoint);
        }
        Ok(session)
    }

    fn require_mountpoint(&self, step: Step) -> Result<PathBuf> {
        self.mountpoint.clone().ok_or_else(|| {
            CryptbakError::usage(format!(
                "`{}` needs a mounted backup volume; run `mount` first",
                step
            ))
        })
    }
}

pub fn run_sequence(
    ctx: &Context,
    registry: &Registry,
    steps: &[Step],
    options: &SequenceOptions,
) -> Result<Session> {
    let raw = match &options.device {
        Some(device) => device.clone(),
        None => registry.first_available_device(ctx)?,
    };
    let mut session = Session::discover(ctx, &raw)?;
    for step in steps {
        info!("{}: {}", step, raw.display());
        session = run_step(ctx, registry, options, session, *step)?;
    }
    Ok(session)
}

fn run_step(
    ctx: &Context,
    registry: &Registry,
    options: &SequenceOptions,
    session: Session,
    step: Step,
) -> Result<Session> {
    match step {
        Step::Open => step_open(ctx, session),
        Step::Mount => step_mount(ctx, session),
        Step::Backup => step_backup(ctx, registry, options, session),
        Step::ListBackups => {
            let mountpoint = session.require_mountpoint(step)?;
            list_backups(ctx, &mountpoint)?;
            Ok(session)
        }
        Step::Fsck => step_fsck(ctx, session),
        Step::Unmount => step_unmount(ctx, session),
        Step::Close => step_close(ctx, session),
    }
}

fn step_open(ctx: &Context, mut session: Session) -> Result<Session> {
    if let Some(device) = &session.open_device {
        info!("{} is already open as {}", session.raw_device.display(), device.display());
        return Ok(session);
    }
    match open_safe(ctx, &session.raw_device, None)? {
        Some(mapped) => {
            session.open_device = Some(mapped);
            session.encrypted = true;
        }
        None => {
            info!(
                "{} is not a LUKS container; using it directly",
                session.raw_device.display()
            );
            session.open_device = Some(session.raw_device.clone());
            session.encrypted = false;
        }
    }
    Ok(session)
}

fn step_mount(ctx: &Context, mut session: Session) -> Result<Session> {
    let Some(device) = session.open_device.clone() else {
        let volume = open_disk(ctx, &session.raw_device, None)?;
        session.open_device = Some(volume.device);
        session.encrypted = volume.encrypted;
        session.mountpoint = volume.mountpoint;
        return Ok(session);
    };
    let mountpoint = mount_safe(ctx, &device)?
        .ok_or_else(|| CryptbakError::message(format!("failed to mount {}", device.display())))?;
    session.mountpoint = Some(mountpoint);
    Ok(session)
}

fn step_backup(
    ctx: &Context,
    registry: &Registry,
    options: &SequenceOptions,
    session: Session,
) -> Result<Session> {
    let mountpoint = session.require_mountpoint(Step::Backup)?;
    let uuid = uuid_for_device(ctx, &session.raw_device)?;
    let excludes_file = registry.excludes_file_for(&uuid);
    let dest = mountpoint.join(&options.host);
    let mut log = BackupLog::create(ctx.config, &options.tracker)?;
    let job = BackupJob {
        source: &options.source,
        dest: &dest,
        excludes_file: &excludes_file,
        extra: &options.rsync_extra,
        host: &options.host,
    };
    backup(ctx, &job, &mut log)?;
    Ok(session)
}

fn step_fsck(ctx: &Context, session: Session) -> Result<Session> {
    let device = session
        .open_device
        .clone()
        .ok_or_else(|| CryptbakError::usage("`fsck` needs an open device; run `open` first"))?;
    if let Some(mountpoint) = &session.mountpoint {
        return Err(CryptbakError::usage(format!(
            "{} is mounted at {}; unmount it before `fsck`",
            device.display(),
            mountpoint.display()
        )));
    }
    check_filesystem(ctx, &device, true)?;
    Ok(session)
}

fn step_unmount(ctx: &Context, mut session: Session) -> Result<Session> {
    if volume::unmount(ctx, session.open_device.as_deref())? {
        session.mountpoint = None;
    }
    Ok(session)
}

fn step_close(ctx: &Context, mut session: Session) -> Result<Session> {
    let Some(device) = session.open_device.clone() else {
        info!("{} is not open; nothing to close", session.raw_device.display());
        return Ok(session);
    };
    if let Some(mountpoint) = &session.mountpoint {
        return Err(CryptbakError::message(format!(
            "{} is still mounted at {}; not closing",
            device.display(),
            mountpoint.display()
        )));
    }
    if !session.encrypted {
        info!("{} is not encrypted; nothing to close", device.display());
        session.open_device = None;
        return Ok(session);
    }
    let code = volume::close(ctx, &device)?;
    if code != 0 {
        warn!("closing {} failed", device.display());
        return Err(ToolError::failed("cryptsetup luksClose", code, "").into());
    }
    info!("closed {}", device.display());
    session.open_device = None;
    session.encrypted = false;
    Ok(session)
}
