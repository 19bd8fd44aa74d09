use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ToolError};
use crate::types::FsUuid;
use crate::util::command::{ToolCommand, ToolOutput};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub mountpoints: Vec<PathBuf>,
    pub backing_uuid: Option<FsUuid>,
}

pub trait VolumeManager {
    fn tool(&self) -> &'static str;
    fn info_command(&self, device: &Path) -> ToolCommand;
    fn mount_command(&self, device: &Path, options: &str) -> ToolCommand;
    fn unmount_command(&self, device: &Path) -> ToolCommand;
    /// Output that does not look like this dialect is an error.
    fn parse_info(&self, text: &str) -> Result<DeviceInfo>;
    fn parse_mounted(&self, text: &str) -> Option<PathBuf>;
    fn unmount_failed(&self, output: &ToolOutput) -> bool;
}

pub fn detect() -> Result<Box<dyn VolumeManager>> {
    if which::which(Udisksctl.tool()).is_ok() {
        return Ok(Box::new(Udisksctl));
    }
    if which::which(LegacyUdisks.tool()).is_ok() {
        return Ok(Box::new(LegacyUdisks));
    }
    Err(ToolError::Missing("udisksctl or udisks".to_string()).into())
}

fn crypt_uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"dm-uuid-CRYPT-LUKS\d+-([0-9a-fA-F]{32})-").expect("valid dm-uuid regex")
    })
}

// dm-uuid-CRYPT-LUKS<version>-<uuid without dashes>-<name>
fn backing_uuid(text: &str) -> Option<FsUuid> {
    crypt_uuid_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|hex| FsUuid::from_compact(hex.as_str()))
}

fn unrecognized(tool: &str, text: &str) -> ToolError {
    let first = text.lines().next().unwrap_or("").trim();
    let detail = if first.is_empty() {
        "empty output".to_string()
    } else {
        first.to_string()
    };
    ToolError::Unrecognized {
        tool: tool.to_string(),
        detail,
    }
}

pub struct LegacyUdisks;

impl VolumeManager for LegacyUdisks {
    fn tool(&self) -> &'static str {
        "udisks"
    }

    fn info_command(&self, device: &Path) -> ToolCommand {
        ToolCommand::new(self.tool()).arg("--show-info").arg(device)
    }

    fn mount_command(&self, device: &Path, options: &str) -> ToolCommand {
        ToolCommand::new(self.tool())
            .arg("--mount")
            .arg(device)
            .arg("--mount-options")
            .arg(options)
    }

    fn unmount_command(&self, device: &Path) -> ToolCommand {
        ToolCommand::new(self.tool()).arg("--unmount").arg(device)
    }

    fn parse_info(&self, text: &str) -> Result<DeviceInfo> {
        if !text.trim_start().starts_with("Showing information for") {
            return Err(unrecognized(self.tool(), text).into());
        }
        let mut info = DeviceInfo {
            backing_uuid: backing_uuid(text),
            ..DeviceInfo::default()
        };
        for line in text.lines() {
            if let Some(value) = line.trim_start().strip_prefix("mount paths:") {
                info.mountpoints = value
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
                    .collect();
                break;
            }
        }
        Ok(info)
    }

    fn parse_mounted(&self, text: &str) -> Option<PathBuf> {
        text.lines().find_map(|line| {
            let rest = line.trim().strip_prefix("Mounted ")?;
            let (_, mountpoint) = rest.split_once(" on ")?;
            Some(PathBuf::from(mountpoint.trim()))
        })
    }

    fn unmount_failed(&self, output: &ToolOutput) -> bool {
        output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .any(|line| line.starts_with("Unmount failed"))
    }
}

pub struct Udisksctl;

impl VolumeManager for Udisksctl {
    fn tool(&self) -> &'static str {
        "udisksctl"
    }

    fn info_command(&self, device: &Path) -> ToolCommand {
        ToolCommand::new(self.tool()).arg("info").arg("-b").arg(device)
    }

    fn mount_command(&self, device: &Path, options: &str) -> ToolCommand {
        ToolCommand::new(self.tool())
            .arg("mount")
            .arg("--no-user-interaction")
            .arg("-b")
            .arg(device)
            .arg("-o")
            .arg(options)
    }

    fn unmount_command(&self, device: &Path) -> ToolCommand {
        ToolCommand::new(self.tool())
            .arg("unmount")
            .arg("--no-user-interaction")
            .arg("-b")
            .arg(device)
    }

    fn parse_info(&self, text: &str) -> Result<DeviceInfo> {
        if !text.contains("org.freedesktop.UDisks2.Block:") {
            return Err(unrecognized(self.tool(), text).into());
        }
        let mut info = DeviceInfo {
            backing_uuid: backing_uuid(text),
            ..DeviceInfo::default()
        };
        // MountPoints lists one path per line; continuation lines carry
        // only the indented value.
        let mut lines = text.lines().peekable();
        while let Some(line) = lines.next() {
            let Some(value) = line.trim_start().strip_prefix("MountPoints:") else {
                continue;
            };
            let value = value.trim();
            if !value.is_empty() {
                info.mountpoints.push(PathBuf::from(value));
            }
            while let Some(next) = lines.peek() {
                let next = next.trim();
                if next.starts_with('/') && !next.contains(':') {
                    info.mountpoints.push(PathBuf::from(next));
                    lines.next();
                } else {
                    break;
                }
            }
            break;
        }
        Ok(info)
    }

    fn parse_mounted(&self, text: &str) -> Option<PathBuf> {
        text.lines().find_map(|line| {
            let rest = line.trim().strip_prefix("Mounted ")?;
            let (_, mountpoint) = rest.split_once(" at ")?;
            let mountpoint = mountpoint.trim();
            let mountpoint = mountpoint.strip_suffix('.').unwrap_or(mountpoint);
            Some(PathBuf::from(mountpoint))
        })
    }

    fn unmount_failed(&self, output: &ToolOutput) -> bool {
        !output.success()
            || output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .any(|line| line.starts_with("Error unmounting"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptbakError;

    const LEGACY_MAPPED: &str = "Showing information for /org/freedesktop/UDisks/devices/dm_2d0
  native-path:                 /sys/devices/virtual/block/dm-0
  device-file:                 /dev/dm-0
    presentation:              /dev/mapper/luks-0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e
    by-id:                     /dev/disk/by-id/dm-name-luks-0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e
    by-id:                     /dev/disk/by-id/dm-uuid-CRYPT-LUKS1-0b1e2c3d4f5a6b7c8d9e0f1a2b3c4d5e-luks-0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e
  is mounted:                  1
  mount paths:             /media/backup
  presentation name:           backup
";

    const UDISKSCTL_MAPPED: &str = "/org/freedesktop/UDisks2/block_devices/dm_2d0:
  org.freedesktop.UDisks2.Block:
    CryptoBackingDevice:        '/org/freedesktop/UDisks2/block_devices/sdb1'
    Device:                     /dev/dm-0
    IdType:                     ext4
    Symlinks:                   /dev/disk/by-id/dm-name-luks-0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e
                                /dev/disk/by-id/dm-uuid-CRYPT-LUKS2-0b1e2c3d4f5a6b7c8d9e0f1a2b3c4d5e-luks-0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e
  org.freedesktop.UDisks2.Filesystem:
    MountPoints:                /media/root/backup
                                /mnt/second
    Size:                       1000203837440
";

    #[test]
    fn legacy_info_reports_mountpoint_and_backing_uuid() {
        let info = LegacyUdisks.parse_info(LEGACY_MAPPED).expect("parse");
        assert_eq!(info.mountpoints, vec![PathBuf::from("/media/backup")]);
        assert_eq!(
            info.backing_uuid.expect("uuid").as_str(),
            "0b1e2c3d-4f5a-6b7c-8d9e-0f1a2b3c4d5e"
        );
    }

    #[test]
    fn udisksctl_info_reports_every_mountpoint() {
        let info = Udisksctl.parse_info(UDISKSCTL_MAPPED).expect("parse");
        assert_eq!(
            info.mountpoints,
            vec![PathBuf::from("/media/root/backup"), PathBuf::from("/mnt/second")]
        );
        assert!(info.backing_uuid.is_some());
    }

    #[test]
    fn unmounted_filesystem_has_no_mountpoints() {
        let text = "/org/freedesktop/UDisks2/block_devices/sdc1:
  org.freedesktop.UDisks2.Block:
    Device:                     /dev/sdc1
  org.freedesktop.UDisks2.Filesystem:
    MountPoints:
    Size:                       1000
";
        let info = Udisksctl.parse_info(text).expect("parse");
        assert!(info.mountpoints.is_empty());
        assert!(info.backing_uuid.is_none());
    }

    #[test]
    fn foreign_output_is_unrecognized_not_empty() {
        for manager in [&LegacyUdisks as &dyn VolumeManager, &Udisksctl] {
            match manager.parse_info("Usage: something else entirely\n") {
                Err(CryptbakError::Tool(ToolError::Unrecognized { .. })) => {}
                other => panic!("{}: unexpected {:?}", manager.tool(), other),
            }
        }
    }

    #[test]
    fn mount_confirmation_lines() {
        assert_eq!(
            LegacyUdisks.parse_mounted("Mounted /org/freedesktop/UDisks/devices/dm_2d0 on /media/backup\n"),
            Some(PathBuf::from("/media/backup"))
        );
        assert_eq!(
            Udisksctl.parse_mounted("Mounted /dev/dm-0 at /media/root/backup.\n"),
            Some(PathBuf::from("/media/root/backup"))
        );
        assert_eq!(Udisksctl.parse_mounted("Error mounting /dev/dm-0: busy\n"), None);
    }

    #[test]
    fn unmount_failure_detection() {
        let legacy_failed = ToolOutput {
            code: 0,
            stdout: "Unmount failed: Device is busy\n".to_string(),
            stderr: String::new(),
        };
        assert!(LegacyUdisks.unmount_failed(&legacy_failed));
        assert!(!LegacyUdisks.unmount_failed(&ToolOutput::default()));

        let ctl_failed = ToolOutput {
            code: 1,
            stdout: String::new(),
            stderr: "Error unmounting /dev/dm-0: target is busy\n".to_string(),
        };
        assert!(Udisksctl.unmount_failed(&ctl_failed));
        let ctl_ok = ToolOutput {
            code: 0,
            stdout: "Unmounted /dev/dm-0.\n".to_string(),
            stderr: String::new(),
        };
        assert!(!Udisksctl.unmount_failed(&ctl_ok));
    }
}
