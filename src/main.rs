use std::env;
use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::{Context, Result};
use nix::unistd::geteuid;

/// Re-run through sudo unless already root. Only returns on failure or
/// when no elevation is needed.
fn elevate() -> Result<()> {
    if geteuid().is_root() {
        return Ok(());
    }
    let exe = env::current_exe().context("locate cryptbak executable")?;
    let err = Command::new("sudo")
        .arg("--")
        .arg(exe)
        .args(env::args_os().skip(1))
        .exec();
    Err(err).context("re-run through sudo")
}

fn main() {
    if let Err(err) = elevate().and_then(|_| cryptbak::cli::run()) {
        println!("Error: {:#}", err);
        std::process::exit(1);
    }
}
