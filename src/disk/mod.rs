pub mod dialect;
pub mod registry;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::Context;
use crate::disk::dialect::DeviceInfo;
use crate::error::{CryptbakError, Result, ToolError};
use crate::types::FsUuid;
use crate::util::command::ToolCommand;
use crate::util::paths::list_entries;

/// blkid exits with 2 when the probe found nothing to report.
const BLKID_NOTHING_FOUND: i32 = 2;

pub fn uuid_for_device(ctx: &Context, device: &Path) -> Result<FsUuid> {
    let output = ctx
        .runner
        .output(&ToolCommand::new("blkid").arg("-o").arg("export").arg(device))?;
    if output.code == BLKID_NOTHING_FOUND {
        return Err(CryptbakError::not_found(format!(
            "no UUID found for device {}",
            device.display()
        )));
    }
    if !output.success() {
        return Err(ToolError::failed("blkid", output.code, &output.stderr).into());
    }
    let value = output
        .stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("UUID="))
        .ok_or_else(|| {
            CryptbakError::not_found(format!("no UUID found for device {}", device.display()))
        })?;
    value.parse::<FsUuid>().map_err(|e| {
        CryptbakError::from(ToolError::Unrecognized {
            tool: "blkid".to_string(),
            detail: e,
        })
    })
}

pub fn device_for_uuid(ctx: &Context, uuid: &FsUuid) -> Result<Option<PathBuf>> {
    let output = ctx
        .runner
        .output(&ToolCommand::new("blkid").arg("-U").arg(uuid.as_str()))?;
    if output.code == BLKID_NOTHING_FOUND {
        return Ok(None);
    }
    if !output.success() {
        return Err(ToolError::failed("blkid", output.code, &output.stderr).into());
    }
    let device = output.stdout.trim();
    if device.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(device)))
}

pub fn device_info(ctx: &Context, device: &Path) -> Result<DeviceInfo> {
    let output = ctx.runner.output(&ctx.manager.info_command(device))?;
    if !output.success() {
        return Err(ToolError::failed(ctx.manager.tool(), output.code, &output.stderr).into());
    }
    ctx.manager.parse_info(&output.stdout)
}

pub fn mountpoints_for_device(ctx: &Context, device: &Path) -> Result<Vec<PathBuf>> {
    Ok(device_info(ctx, device)?.mountpoints)
}

/// Find the decrypted mapping whose LUKS container is `raw`.
pub fn open_mapping_for_raw_device(ctx: &Context, raw: &Path) -> Result<Option<PathBuf>> {
    let raw_uuid = match uuid_for_device(ctx, raw) {
        Ok(uuid) => uuid,
        Err(CryptbakError::NotFound(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    let mapper_dir = &ctx.config.mapper_dir;
    if !mapper_dir.is_dir() {
        return Ok(None);
    }
    for name in list_entries(mapper_dir)? {
        if name == "control" {
            continue;
        }
        let node = mapper_dir.join(&name);
        let info = device_info(ctx, &node)?;
        debug!("{} is backed by {:?}", node.display(), info.backing_uuid);
        if info
            .backing_uuid
            .as_ref()
            .is_some_and(|uuid| uuid.matches(&raw_uuid))
        {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConsole, FakeRunner, TestEnv};
    use crate::util::command::ToolOutput;

    const UUID: &str = "0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e";

    fn ctl_info(backing: Option<&str>, mountpoint: &str) -> String {
        let symlink = backing
            .map(|uuid| {
                format!(
                    "    Symlinks:                   /dev/disk/by-id/dm-uuid-CRYPT-LUKS2-{}-luks-{}\n",
                    uuid.replace('-', ""),
                    uuid
                )
            })
            .unwrap_or_default();
        format!(
            "/org/freedesktop/UDisks2/block_devices/dm_2d0:\n  org.freedesktop.UDisks2.Block:\n{}  org.freedesktop.UDisks2.Filesystem:\n    MountPoints:                {}\n",
            symlink, mountpoint
        )
    }

    #[test]
    fn uuid_lookup_distinguishes_missing_key_from_tool_failure() {
        let env = TestEnv::new();
        let runner = FakeRunner::new(|cmd| match cmd.get_args().last().map(String::as_str) {
            Some("/dev/sdb1") => ToolOutput {
                code: 0,
                stdout: format!("DEVNAME=/dev/sdb1\nUUID={}\nTYPE=crypto_LUKS\n", UUID),
                ..ToolOutput::default()
            },
            Some("/dev/sdc") => ToolOutput {
                code: 0,
                stdout: "DEVNAME=/dev/sdc\nPTTYPE=gpt\n".to_string(),
                ..ToolOutput::default()
            },
            Some("/dev/sdd") => ToolOutput {
                code: 2,
                ..ToolOutput::default()
            },
            _ => ToolOutput {
                code: 4,
                stderr: "blkid: permission denied".to_string(),
                ..ToolOutput::default()
            },
        });
        let console = FakeConsole::default();
        let ctx = env.context(&runner, &console);

        assert_eq!(
            uuid_for_device(&ctx, Path::new("/dev/sdb1")).expect("uuid").as_str(),
            UUID
        );
        assert!(matches!(
            uuid_for_device(&ctx, Path::new("/dev/sdc")),
            Err(CryptbakError::NotFound(_))
        ));
        assert!(matches!(
            uuid_for_device(&ctx, Path::new("/dev/sdd")),
            Err(CryptbakError::NotFound(_))
        ));
        assert!(matches!(
            uuid_for_device(&ctx, Path::new("/dev/sde")),
            Err(CryptbakError::Tool(ToolError::Failed { code: 4, .. }))
        ));
    }

    #[test]
    fn device_lookup_returns_none_when_detached() {
        let env = TestEnv::new();
        let runner = FakeRunner::new(|cmd| {
            if cmd.get_args().last().map(String::as_str) == Some(UUID) {
                ToolOutput {
                    code: 0,
                    stdout: "/dev/sdb1\n".to_string(),
                    ..ToolOutput::default()
                }
            } else {
                ToolOutput {
                    code: 2,
                    ..ToolOutput::default()
                }
            }
        });
        let console = FakeConsole::default();
        let ctx = env.context(&runner, &console);
        let attached: FsUuid = UUID.parse().expect("uuid");
        let detached: FsUuid = "11111111-2222-3333-4444-555555555555".parse().expect("uuid");
        assert_eq!(
            device_for_uuid(&ctx, &attached).expect("lookup"),
            Some(PathBuf::from("/dev/sdb1"))
        );
        assert_eq!(device_for_uuid(&ctx, &detached).expect("lookup"), None);
    }

    #[test]
    fn open_mapping_scans_mapper_nodes() {
        let env = TestEnv::new();
        for name in ["control", "luks-other", "luks-target"] {
            std::fs::write(env.config.mapper_dir.join(name), b"").expect("node");
        }
        let runner = FakeRunner::new(|cmd| {
            let last = cmd.get_args().last().cloned().unwrap_or_default();
            if cmd.program() == "blkid" {
                return ToolOutput {
                    code: 0,
                    stdout: format!("UUID={}\n", UUID),
                    ..ToolOutput::default()
                };
            }
            let backing = if last.ends_with("luks-target") {
                Some(UUID)
            } else {
                Some("11111111-2222-3333-4444-555555555555")
            };
            ToolOutput {
                code: 0,
                stdout: ctl_info(backing, ""),
                ..ToolOutput::default()
            }
        });
        let console = FakeConsole::default();
        let ctx = env.context(&runner, &console);
        let found = open_mapping_for_raw_device(&ctx, Path::new("/dev/sdb1")).expect("scan");
        assert_eq!(found, Some(env.config.mapper_dir.join("luks-target")));
        assert!(!runner
            .calls()
            .iter()
            .any(|cmd| cmd.get_args().last().is_some_and(|arg| arg.ends_with("control"))));
    }

    #[test]
    fn mountpoints_come_from_info_output() {
        let env = TestEnv::new();
        let runner = FakeRunner::new(|_| ToolOutput {
            code: 0,
            stdout: ctl_info(None, "/media/backup"),
            ..ToolOutput::default()
        });
        let console = FakeConsole::default();
        let ctx = env.context(&runner, &console);
        assert_eq!(
            mountpoints_for_device(&ctx, Path::new("/dev/dm-0")).expect("info"),
            vec![PathBuf::from("/media/backup")]
        );
    }
}
