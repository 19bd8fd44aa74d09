pub mod luks;

use std::path::{Path, PathBuf};
use std::thread;

use tracing::{info, warn};

use crate::context::Context;
use crate::disk::{mountpoints_for_device, open_mapping_for_raw_device, uuid_for_device};
use crate::error::{CryptbakError, Result, ToolError};
use crate::util::command::ToolCommand;

// e2fsck: 4 and above means errors left uncorrected.
const FSCK_UNCORRECTED: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub device: PathBuf,
    pub encrypted: bool,
    pub mountpoint: Option<PathBuf>,
}

/// `None` means `raw` is not a LUKS container.
pub fn open_safe(ctx: &Context, raw: &Path, passphrase: Option<&str>) -> Result<Option<PathBuf>> {
    if let Some(mapped) = open_mapping_for_raw_device(ctx, raw)? {
        info!("{} already opened as {}", raw.display(), mapped.display());
        return Ok(Some(mapped));
    }
    if !luks::is_luks(ctx, raw)? {
        return Ok(None);
    }
    let uuid = uuid_for_device(ctx, raw)?;
    let name = luks::mapping_name(&uuid);
    let mapped = match passphrase {
        Some(passphrase) => luks::open(ctx, raw, &name, passphrase)?,
        None => {
            let passphrase = ctx
                .console
                .passphrase(&format!("Passphrase for {}: ", raw.display()))?;
            luks::open(ctx, raw, &name, &passphrase)?
        }
    };
    info!("opened {} as {}", raw.display(), mapped.display());
    Ok(Some(mapped))
}

pub fn check_filesystem(ctx: &Context, device: &Path, force: bool) -> Result<()> {
    let mut cmd = ToolCommand::new("e2fsck");
    cmd = if force {
        cmd.arg("-f").arg("-C").arg("0")
    } else {
        cmd.arg("-p")
    };
    let code = ctx.runner.status(&cmd.arg(device))?;
    if code >= FSCK_UNCORRECTED {
        return Err(ToolError::failed("e2fsck", code, "").into());
    }
    if code != 0 {
        warn!("e2fsck corrected errors on {} (exit code {})", device.display(), code);
    }
    Ok(())
}

pub fn mount_safe(ctx: &Context, device: &Path) -> Result<Option<PathBuf>> {
    if let Some(existing) = mountpoints_for_device(ctx, device)?.into_iter().next() {
        info!("{} already mounted at {}", device.display(), existing.display());
        return Ok(Some(existing));
    }
    check_filesystem(ctx, device, false)?;
    let output = ctx
        .runner
        .output(&ctx.manager.mount_command(device, &ctx.config.mount_options))?;
    if !output.success() {
        warn!(
            "mounting {} failed with exit code {}: {}",
            device.display(),
            output.code,
            output.stderr.trim()
        );
        return Ok(None);
    }
    match ctx.manager.parse_mounted(&output.stdout) {
        Some(mountpoint) => {
            info!("mounted {} at {}", device.display(), mountpoint.display());
            Ok(Some(mountpoint))
        }
        None => {
            warn!(
                "{} gave no recognizable mount confirmation: {}",
                ctx.manager.tool(),
                output.stdout.trim()
            );
            Ok(None)
        }
    }
}

pub fn unmount(ctx: &Context, device: Option<&Path>) -> Result<bool> {
    let device = device.ok_or_else(|| CryptbakError::usage("no open device to unmount"))?;
    if mountpoints_for_device(ctx, device)?.is_empty() {
        return Err(CryptbakError::usage(format!(
            "{} is not mounted",
            device.display()
        )));
    }
    let output = ctx.runner.output(&ctx.manager.unmount_command(device))?;
    if ctx.manager.unmount_failed(&output) {
        let reason = [output.stdout.trim(), output.stderr.trim()]
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        warn!("unmounting {} failed: {}", device.display(), reason);
        return Ok(false);
    }
    // Give the block layer a moment to flush before the mapping goes away.
    if !ctx.config.settle.is_zero() {
        thread::sleep(ctx.config.settle);
    }
    info!("unmounted {}", device.display());
    Ok(true)
}

pub fn close(ctx: &Context, device: &Path) -> Result<i32> {
    luks::close(ctx, device)
}

pub fn open_disk(ctx: &Context, raw: &Path, passphrase: Option<&str>) -> Result<Volume> {
    let (device, encrypted) = match open_safe(ctx, raw, passphrase)? {
        Some(mapped) => (mapped, true),
        None => {
            info!("{} is not a LUKS container; using it directly", raw.display());
            (raw.to_path_buf(), false)
        }
    };
    let mountpoint = mount_safe(ctx, &device)?
        .ok_or_else(|| CryptbakError::message(format!("failed to mount {}", device.display())))?;
    Ok(Volume {
        device,
        encrypted,
        mountpoint: Some(mountpoint),
    })
}

pub fn close_disk(ctx: &Context, volume: Volume) -> Result<()> {
    if volume.mountpoint.is_some() && !unmount(ctx, Some(volume.device.as_path()))? {
        return Err(CryptbakError::message(format!(
            "failed to unmount {}",
            volume.device.display()
        )));
    }
    if volume.encrypted {
        let code = close(ctx, &volume.device)?;
        if code != 0 {
            return Err(ToolError::failed("cryptsetup luksClose", code, "").into());
        }
        info!("closed {}", volume.device.display());
    }
    Ok(())
}
