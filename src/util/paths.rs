use std::fs;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;

use nix::unistd::{access, AccessFlags};

use crate::error::{CryptbakError, Result};

pub fn is_block_device(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.file_type().is_block_device())
        .unwrap_or(false)
}

pub fn ensure_writable_dir(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).map_err(|e| {
        CryptbakError::message(format!("backup destination {} is missing: {}", path.display(), e))
    })?;
    if !meta.is_dir() {
        return Err(CryptbakError::message(format!(
            "backup destination {} is not a directory",
            path.display()
        )));
    }
    access(path, AccessFlags::W_OK).map_err(|e| {
        CryptbakError::message(format!("backup destination {} is not writable: {}", path.display(), e))
    })?;
    Ok(())
}

pub fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path)
            .map_err(|e| CryptbakError::message(format!("create {}: {}", path.display(), e)))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| CryptbakError::message(format!("chmod {}: {}", path.display(), e)))?;
    }
    Ok(())
}

pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(path)
        .map_err(|e| CryptbakError::message(format!("read {}: {}", path.display(), e)))?
    {
        let entry = entry
            .map_err(|e| CryptbakError::message(format!("read {}: {}", path.display(), e)))?;
        out.push(entry.file_name().to_string_lossy().to_string());
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn regular_file_is_not_a_block_device() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("disk.img");
        fs::write(&file, b"").expect("write");
        assert!(!is_block_device(&file));
        assert!(!is_block_device(&dir.path().join("missing")));
    }

    #[test]
    fn missing_destination_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        assert!(ensure_writable_dir(dir.path()).is_ok());
        assert!(ensure_writable_dir(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn entries_come_back_sorted() {
        let dir = TempDir::new().expect("tempdir");
        for name in ["b", "c", "a"] {
            fs::write(dir.path().join(name), b"").expect("write");
        }
        assert_eq!(list_entries(dir.path()).expect("list"), vec!["a", "b", "c"]);
    }
}
