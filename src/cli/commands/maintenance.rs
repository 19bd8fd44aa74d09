use std::path::{Path, PathBuf};

use tracing::info;

use crate::backup::marker_dir;
use crate::cli::commands::Maintenance;
use crate::context::Context;
use crate::disk::device_for_uuid;
use crate::disk::registry::Registry;
use crate::error::{CryptbakError, Result, ToolError};
use crate::util::command::ToolCommand;
use crate::util::console::new_passphrase;
use crate::util::paths::{ensure_dir, is_block_device};
use crate::volume::{close_disk, luks, mount_safe, open_safe, Volume};

pub struct MaintenanceOptions<'a> {
    pub device: Option<&'a Path>,
    pub label: Option<&'a str>,
}

pub fn run_maintenance(
    ctx: &Context,
    registry: &Registry,
    command: Maintenance,
    options: &MaintenanceOptions,
) -> Result<()> {
    match command {
        Maintenance::Add => {
            registry.add_device(ctx, require_device(command, options.device)?)?;
        }
        Maintenance::Delete => {
            registry.remove_device(ctx, require_device(command, options.device)?)?;
        }
        Maintenance::Initialize => {
            let device = require_device(command, options.device)?;
            initialize(ctx, registry, device, options.label)?;
        }
        Maintenance::ListDevices => list_devices(ctx, registry)?,
        Maintenance::FindDevice => {
            let device = registry.first_available_device(ctx)?;
            println!("{}", device.display());
        }
    }
    Ok(())
}

fn require_device(command: Maintenance, device: Option<&Path>) -> Result<&Path> {
    device.ok_or_else(|| CryptbakError::usage(format!("`{}` requires -d <device>", command)))
}

fn list_devices(ctx: &Context, registry: &Registry) -> Result<()> {
    let known = registry.list_known_uuids()?;
    if known.is_empty() {
        println!("no backup devices registered");
    }
    for uuid in known {
        match device_for_uuid(ctx, &uuid)? {
            Some(device) => println!("{}  {}", uuid, device.display()),
            None => println!("{}  not attached", uuid),
        }
    }
    Ok(())
}

fn confirm(ctx: &Context, device: &Path) -> Result<()> {
    let answer = ctx.console.ask(&format!(
        "All data on {} will be destroyed. Type yes to continue: ",
        device.display()
    ))?;
    if answer != "yes" {
        return Err(CryptbakError::message("initialize aborted"));
    }
    let answer = ctx
        .console
        .ask("Type the device path again to confirm: ")?;
    if Path::new(&answer) != device {
        return Err(CryptbakError::message(format!(
            "initialize aborted: {} does not match {}",
            answer,
            device.display()
        )));
    }
    Ok(())
}

fn run_checked(ctx: &Context, cmd: ToolCommand) -> Result<()> {
    let code = ctx.runner.status(&cmd)?;
    if code != 0 {
        return Err(ToolError::failed(cmd.program(), code, "").into());
    }
    Ok(())
}

/// Format `device` as a fresh encrypted backup volume and register it.
pub fn initialize(
    ctx: &Context,
    registry: &Registry,
    device: &Path,
    label: Option<&str>,
) -> Result<PathBuf> {
    if !is_block_device(device) {
        return Err(CryptbakError::usage(format!(
            "{} is not a block device",
            device.display()
        )));
    }
    confirm(ctx, device)?;
    let passphrase = new_passphrase(ctx.console, &device.display().to_string())?;
    let mapped = build_volume(ctx, registry, device, label, &passphrase)?;
    println!("initialized {}", device.display());
    Ok(mapped)
}

fn build_volume(
    ctx: &Context,
    registry: &Registry,
    device: &Path,
    label: Option<&str>,
    passphrase: &str,
) -> Result<PathBuf> {
    info!("formatting {} as LUKS", device.display());
    luks::format(ctx, device, passphrase)?;
    let mapped = open_safe(ctx, device, Some(passphrase))?.ok_or_else(|| {
        CryptbakError::message(format!("{} is not a LUKS container after formatting", device.display()))
    })?;

    let mut mkfs = ToolCommand::new("mkfs.ext4");
    if let Some(label) = label {
        mkfs = mkfs.arg("-L").arg(label);
    }
    run_checked(ctx, mkfs.arg(&mapped))?;
    run_checked(
        ctx,
        ToolCommand::new("tune2fs").args(["-c", "0", "-i", "0"]).arg(&mapped),
    )?;

    let mountpoint = mount_safe(ctx, &mapped)?
        .ok_or_else(|| CryptbakError::message(format!("failed to mount {}", mapped.display())))?;
    ensure_dir(&marker_dir(&mountpoint), 0o755)?;
    close_disk(
        ctx,
        Volume {
            device: mapped.clone(),
            encrypted: true,
            mountpoint: Some(mountpoint),
        },
    )?;

    registry.add_device(ctx, device)?;
    Ok(mapped)
}
