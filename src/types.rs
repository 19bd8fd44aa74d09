use std::fmt;
use std::str::FromStr;

/// Filesystem (or LUKS container) UUID in canonical 8-4-4-4-12 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsUuid(String);

impl FsUuid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a dashed UUID from the 32 hex digits device-mapper embeds in
    /// `CRYPT-LUKS` identifiers.
    pub fn from_compact(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let dashed = format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        );
        dashed.parse().ok()
    }

    pub fn matches(&self, other: &FsUuid) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl FromStr for FsUuid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let groups: Vec<&str> = s.split('-').collect();
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        if lengths != [8, 4, 4, 4, 12] {
            return Err(format!("{} is not a UUID", s));
        }
        if !groups
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(format!("{} is not a UUID", s));
        }
        Ok(FsUuid(s.to_string()))
    }
}

impl fmt::Display for FsUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    pub dry_run: u8,
    pub verbose: bool,
}

impl RunMode {
    pub fn is_dry_run(&self) -> bool {
        self.dry_run > 0
    }
}
