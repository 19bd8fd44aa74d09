use std::path::Path;

use crate::util::command::ToolCommand;

pub fn rsync_command(source: &Path, dest: &Path, excludes_file: &Path, extra: &[String]) -> ToolCommand {
    // Trailing slash: copy the contents of the source, not the directory.
    let source = source.to_string_lossy();
    let source = format!("{}/", source.trim_end_matches('/'));
    ToolCommand::new("rsync")
        .arg("-a")
        .arg("-v")
        .arg("--delete")
        .arg("--delete-excluded")
        .arg(format!("--exclude-from={}", excludes_file.display()))
        .args(extra)
        .arg(source)
        .arg(dest)
}
