//! Command vocabulary and planning.
//!
//! Tokens match by unambiguous prefix. Device steps run in the order given;
//! registry maintenance commands must run alone.

pub mod maintenance;
pub mod sequence;

use std::fmt;

use crate::error::{CryptbakError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Mount,
    Backup,
    ListBackups,
    Fsck,
    Unmount,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maintenance {
    Add,
    Delete,
    Initialize,
    ListDevices,
    FindDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Step(Step),
    Maintenance(Maintenance),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Sequence(Vec<Step>),
    Exclusive(Maintenance),
}

const VOCABULARY: [(&str, Command); 16] = [
    ("open", Command::Step(Step::Open)),
    ("close", Command::Step(Step::Close)),
    ("mount", Command::Step(Step::Mount)),
    ("unmount", Command::Step(Step::Unmount)),
    ("umount", Command::Step(Step::Unmount)),
    ("backup", Command::Step(Step::Backup)),
    ("rsync", Command::Step(Step::Backup)),
    ("list-backups", Command::Step(Step::ListBackups)),
    ("fsck", Command::Step(Step::Fsck)),
    ("add", Command::Maintenance(Maintenance::Add)),
    ("delete", Command::Maintenance(Maintenance::Delete)),
    ("remove", Command::Maintenance(Maintenance::Delete)),
    ("initialize", Command::Maintenance(Maintenance::Initialize)),
    ("initialise", Command::Maintenance(Maintenance::Initialize)),
    ("list-devices", Command::Maintenance(Maintenance::ListDevices)),
    ("find-device", Command::Maintenance(Maintenance::FindDevice)),
];

pub const DEFAULT_SEQUENCE: [Step; 6] = [
    Step::Open,
    Step::Mount,
    Step::Backup,
    Step::ListBackups,
    Step::Unmount,
    Step::Close,
];

impl Command {
    pub fn name(self) -> &'static str {
        VOCABULARY
            .iter()
            .find(|(_, command)| *command == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Command::Step(*self).name())
    }
}

impl fmt::Display for Maintenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Command::Maintenance(*self).name())
    }
}

pub fn parse_command(token: &str) -> Result<Command> {
    if token.is_empty() {
        return Err(CryptbakError::usage("empty command"));
    }
    let mut matches: Vec<(&str, Command)> = Vec::new();
    for (name, command) in VOCABULARY {
        if name == token {
            return Ok(command);
        }
        if name.starts_with(token) && !matches.iter().any(|(_, seen)| *seen == command) {
            matches.push((name, command));
        }
    }
    match matches.as_slice() {
        [] => Err(CryptbakError::usage(format!("unknown command `{}`", token))),
        [(_, command)] => Ok(*command),
        _ => {
            let names: Vec<&str> = matches.iter().map(|(name, _)| *name).collect();
            Err(CryptbakError::usage(format!(
                "ambiguous command `{}` (could be {})",
                token,
                names.join(", ")
            )))
        }
    }
}

/// Turn command tokens into a plan. Fails before any device is touched.
pub fn plan(tokens: &[String]) -> Result<Plan> {
    if tokens.is_empty() {
        return Ok(Plan::Sequence(DEFAULT_SEQUENCE.to_vec()));
    }
    let commands = tokens
        .iter()
        .map(|token| parse_command(token))
        .collect::<Result<Vec<_>>>()?;

    let exclusive = commands.iter().find_map(|command| match command {
        Command::Maintenance(maintenance) => Some(*maintenance),
        Command::Step(_) => None,
    });
    if let Some(maintenance) = exclusive {
        if commands.len() > 1 {
            return Err(CryptbakError::usage(format!(
                "`{}` cannot be combined with other commands",
                maintenance
            )));
        }
        return Ok(Plan::Exclusive(maintenance));
    }

    let steps = commands
        .into_iter()
        .filter_map(|command| match command {
            Command::Step(step) => Some(step),
            Command::Maintenance(_) => None,
        })
        .collect();
    Ok(Plan::Sequence(steps))
}

pub fn exit_for_error(err: &CryptbakError) -> ! {
    println!("Error: {}", err);
    std::process::exit(1);
}
