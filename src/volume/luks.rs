use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::Context;
use crate::error::{CryptbakError, Result, ToolError};
use crate::types::FsUuid;
use crate::util::command::ToolCommand;

const CRYPTSETUP: &str = "cryptsetup";
/// cryptsetup's exit code for "no usable key slot", i.e. a wrong passphrase.
const EXIT_NO_PERMISSION: i32 = 2;

pub fn mapping_name(uuid: &FsUuid) -> String {
    format!("luks-{}", uuid)
}

pub fn is_luks(ctx: &Context, device: &Path) -> Result<bool> {
    let output = ctx
        .runner
        .output(&ToolCommand::new(CRYPTSETUP).arg("isLuks").arg(device))?;
    Ok(output.success())
}

pub fn open(ctx: &Context, raw: &Path, name: &str, passphrase: &str) -> Result<PathBuf> {
    debug!("opening {} as {}", raw.display(), name);
    let cmd = ToolCommand::new(CRYPTSETUP)
        .arg("luksOpen")
        .arg("--key-file=-")
        .arg(raw)
        .arg(name)
        .stdin(passphrase);
    let output = ctx.runner.output(&cmd)?;
    if output.code == EXIT_NO_PERMISSION {
        return Err(CryptbakError::message(format!(
            "wrong passphrase for {}",
            raw.display()
        )));
    }
    if !output.success() {
        return Err(ToolError::failed("cryptsetup luksOpen", output.code, &output.stderr).into());
    }
    Ok(ctx.config.mapper_dir.join(name))
}

/// Exit code of `cryptsetup luksClose`, uninterpreted.
pub fn close(ctx: &Context, mapped: &Path) -> Result<i32> {
    debug!("closing {}", mapped.display());
    ctx.runner
        .status(&ToolCommand::new(CRYPTSETUP).arg("luksClose").arg(mapped))
}

pub fn format(ctx: &Context, raw: &Path, passphrase: &str) -> Result<()> {
    let cmd = ToolCommand::new(CRYPTSETUP)
        .arg("luksFormat")
        .arg("-q")
        .arg("--key-file=-")
        .arg(raw)
        .stdin(passphrase);
    let output = ctx.runner.output(&cmd)?;
    if !output.success() {
        return Err(ToolError::failed("cryptsetup luksFormat", output.code, &output.stderr).into());
    }
    Ok(())
}
