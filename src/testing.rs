//! Scripted stand-ins for the outside world.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::model::RuntimeConfig;
use crate::context::Context;
use crate::disk::dialect::Udisksctl;
use crate::error::{CryptbakError, Result};
use crate::types::RunMode;
use crate::util::command::{Runner, ToolCommand, ToolOutput};
use crate::util::console::Console;

type Handler = Box<dyn Fn(&ToolCommand) -> ToolOutput>;

pub struct FakeRunner {
    handler: Handler,
    calls: RefCell<Vec<ToolCommand>>,
}

impl FakeRunner {
    pub fn new(handler: impl Fn(&ToolCommand) -> ToolOutput + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|cmd| match cmd.get_args().first() {
                Some(first) => format!("{} {}", cmd.program(), first),
                None => cmd.program().to_string(),
            })
            .collect()
    }

    fn call(&self, cmd: &ToolCommand) -> ToolOutput {
        self.calls.borrow_mut().push(cmd.clone());
        (self.handler)(cmd)
    }
}

impl Runner for FakeRunner {
    fn output(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        Ok(self.call(cmd))
    }

    fn stream(&self, cmd: &ToolCommand, sink: &mut dyn Write) -> Result<i32> {
        let output = self.call(cmd);
        sink.write_all(output.stdout.as_bytes())?;
        sink.write_all(output.stderr.as_bytes())?;
        Ok(output.code)
    }

    fn status(&self, cmd: &ToolCommand) -> Result<i32> {
        Ok(self.call(cmd).code)
    }
}

#[derive(Default)]
pub struct FakeConsole {
    passphrases: RefCell<VecDeque<String>>,
    answers: RefCell<VecDeque<String>>,
}

impl FakeConsole {
    pub fn with_passphrases(passphrases: &[&str]) -> Self {
        let console = Self::default();
        console
            .passphrases
            .borrow_mut()
            .extend(passphrases.iter().map(|p| p.to_string()));
        console
    }

    pub fn answer(self, answers: &[&str]) -> Self {
        self.answers
            .borrow_mut()
            .extend(answers.iter().map(|a| a.to_string()));
        self
    }
}

impl Console for FakeConsole {
    fn passphrase(&self, _prompt: &str) -> Result<String> {
        self.passphrases
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CryptbakError::message("unexpected passphrase prompt"))
    }

    fn ask(&self, _prompt: &str) -> Result<String> {
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CryptbakError::message("unexpected question"))
    }
}

/// Scratch registry, log and mapper directories.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: RuntimeConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = RuntimeConfig {
            registry_dir: dir.path().join("etc"),
            log_dir: dir.path().join("log"),
            log_keep: 3,
            log_group: "cryptbak-no-such-group".to_string(),
            mapper_dir: dir.path().join("mapper"),
            mount_options: "noatime".to_string(),
            settle: Duration::ZERO,
        };
        for path in [&config.registry_dir, &config.log_dir, &config.mapper_dir] {
            std::fs::create_dir_all(path).expect("mkdir");
        }
        Self { dir, config }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn context<'a>(&'a self, runner: &'a FakeRunner, console: &'a FakeConsole) -> Context<'a> {
        Context {
            runner,
            console,
            manager: &Udisksctl,
            config: &self.config,
            run_mode: RunMode::default(),
        }
    }
}

pub fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn exit(code: i32) -> ToolOutput {
    ToolOutput {
        code,
        ..ToolOutput::default()
    }
}
