use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "cryptbak",
    version,
    about = "Back up to an encrypted external drive",
    after_help = "Commands (any unambiguous prefix):\n  \
        open, mount, backup|rsync, list-backups, fsck, unmount|umount, close\n  \
        add, delete|remove, initialize|initialise, list-devices, find-device\n\n\
        With no command: open mount backup list-backups unmount close"
)]
pub struct Cli {
    /// Filesystem label used by `initialize`
    #[arg(long, short = 'l')]
    pub label: Option<String>,
    /// Backup device; defaults to the first attached registered device
    #[arg(long, short = 'd')]
    pub device: Option<PathBuf>,
    /// Directory to back up
    #[arg(long, short = 's', default_value = "/")]
    pub src: PathBuf,
    /// Pass --dry-run to rsync; repeat for more
    #[arg(long, short = 'n', action = ArgAction::Count)]
    pub dry_run: u8,
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Print every external command before running it
    #[arg(long, short = 'v')]
    pub verbose: bool,

    pub commands: Vec<String>,
}
