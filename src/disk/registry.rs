use std::fs;
use std::io::Write;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::context::Context;
use crate::disk::{device_for_uuid, uuid_for_device};
use crate::error::{CryptbakError, Result};
use crate::types::FsUuid;
use crate::util::paths::{ensure_dir, list_entries};

pub const DEFAULT_EXCLUDES: &str = "excludes.default";

const DEFAULT_EXCLUDE_PATTERNS: [&str; 11] = [
    "/dev/*",
    "/proc/*",
    "/sys/*",
    "/run/*",
    "/tmp/*",
    "/mnt/*",
    "/media/*",
    "/lost+found",
    "/var/tmp/*",
    "/var/cache/apt/archives/*.deb",
    "/swapfile",
];

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\.conf$",
        )
        .expect("valid registry entry regex")
    })
}

pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn entry_path(&self, uuid: &FsUuid) -> PathBuf {
        self.dir.join(format!("{}.conf", uuid))
    }

    pub fn default_excludes(&self) -> PathBuf {
        self.dir.join(DEFAULT_EXCLUDES)
    }

    pub fn list_known_uuids(&self) -> Result<Vec<FsUuid>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut uuids = Vec::new();
        for name in list_entries(&self.dir)? {
            let Some(caps) = entry_pattern().captures(&name) else {
                continue;
            };
            if let Ok(uuid) = caps[1].parse::<FsUuid>() {
                uuids.push(uuid);
            }
        }
        Ok(uuids)
    }

    pub fn first_available_device(&self, ctx: &Context) -> Result<PathBuf> {
        let known = self.list_known_uuids()?;
        for uuid in &known {
            if let Some(device) = device_for_uuid(ctx, uuid)? {
                info!("using backup device {} ({})", device.display(), uuid);
                return Ok(device);
            }
        }
        if known.is_empty() {
            return Err(CryptbakError::not_found(format!(
                "no backup devices registered in {}; use `add -d <device>`",
                self.dir.display()
            )));
        }
        Err(CryptbakError::not_found(
            "none of the registered backup devices is attached",
        ))
    }

    /// Returns false when `device` was already registered.
    pub fn add_device(&self, ctx: &Context, device: &Path) -> Result<bool> {
        let uuid = uuid_for_device(ctx, device)?;
        let entry = self.entry_path(&uuid);
        if fs::symlink_metadata(&entry).is_ok() {
            info!("{} ({}) is already registered", device.display(), uuid);
            return Ok(false);
        }
        ensure_dir(&self.dir, 0o755)?;
        self.ensure_default_excludes()?;
        symlink(DEFAULT_EXCLUDES, &entry)
            .map_err(|e| CryptbakError::message(format!("create {}: {}", entry.display(), e)))?;
        println!("registered {} ({})", device.display(), uuid);
        Ok(true)
    }

    pub fn remove_device(&self, ctx: &Context, device: &Path) -> Result<bool> {
        let uuid = uuid_for_device(ctx, device)?;
        let entry = self.entry_path(&uuid);
        if fs::symlink_metadata(&entry).is_err() {
            info!("{} ({}) is not registered; nothing removed", device.display(), uuid);
            return Ok(false);
        }
        fs::remove_file(&entry)
            .map_err(|e| CryptbakError::message(format!("remove {}: {}", entry.display(), e)))?;
        println!("removed {} ({})", device.display(), uuid);
        Ok(true)
    }

    pub fn excludes_file_for(&self, uuid: &FsUuid) -> PathBuf {
        let entry = self.entry_path(uuid);
        if entry.exists() {
            entry
        } else {
            self.default_excludes()
        }
    }

    fn ensure_default_excludes(&self) -> Result<()> {
        let path = self.default_excludes();
        if path.exists() {
            return Ok(());
        }
        let mut file = fs::File::create(&path)
            .map_err(|e| CryptbakError::message(format!("create {}: {}", path.display(), e)))?;
        for pattern in DEFAULT_EXCLUDE_PATTERNS {
            writeln!(file, "{}", pattern)?;
        }
        info!("created default exclude list {}", path.display());
        Ok(())
    }
}
