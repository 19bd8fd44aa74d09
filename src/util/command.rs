use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::{Result, ToolError};
use crate::types::RunMode;

/// An external tool invocation. Secret input (passphrases) rides along in
/// `stdin` and is never printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn stdin(mut self, input: &str) -> Self {
        self.stdin = Some(input.to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn input(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl From<&ToolCommand> for Command {
    fn from(tool: &ToolCommand) -> Self {
        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args);
        cmd
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Every external process goes through a `Runner`.
pub trait Runner {
    /// Run to completion, capturing stdout and stderr.
    fn output(&self, cmd: &ToolCommand) -> Result<ToolOutput>;

    /// Run to completion, copying combined stdout/stderr into `sink` line by
    /// line as it arrives. Returns the exit code.
    fn stream(&self, cmd: &ToolCommand, sink: &mut dyn Write) -> Result<i32>;

    /// Run attached to the terminal. Returns the exit code.
    fn status(&self, cmd: &ToolCommand) -> Result<i32>;
}

pub struct SystemRunner {
    run_mode: RunMode,
}

impl SystemRunner {
    pub fn new(run_mode: RunMode) -> Self {
        Self { run_mode }
    }

    fn maybe_print_command(&self, cmd: &ToolCommand) {
        if self.run_mode.verbose {
            println!("{}", cmd.display());
        }
    }
}

fn spawn_error(cmd: &ToolCommand, err: std::io::Error) -> ToolError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ToolError::Missing(cmd.program().to_string())
    } else {
        ToolError::Spawn {
            tool: cmd.program().to_string(),
            source: err,
        }
    }
}

impl Runner for SystemRunner {
    fn output(&self, tool: &ToolCommand) -> Result<ToolOutput> {
        self.maybe_print_command(tool);
        let mut cmd: Command = tool.into();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if tool.input().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = cmd.spawn().map_err(|e| spawn_error(tool, e))?;
        if let (Some(input), Some(mut stdin)) = (tool.input(), child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| spawn_error(tool, e))?;
        }
        let output = child.wait_with_output().map_err(|e| spawn_error(tool, e))?;
        Ok(ToolOutput {
            code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn stream(&self, tool: &ToolCommand, sink: &mut dyn Write) -> Result<i32> {
        self.maybe_print_command(tool);
        let mut cmd: Command = tool.into();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| spawn_error(tool, e))?;

        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);
        let copied = copy_lines(rx, sink);
        if copied.is_err() {
            let _ = child.kill();
        }
        let status = child.wait().map_err(|e| spawn_error(tool, e));
        for reader in readers {
            let _ = reader.join();
        }
        copied?;
        Ok(status?.code().unwrap_or(1))
    }

    fn status(&self, tool: &ToolCommand) -> Result<i32> {
        self.maybe_print_command(tool);
        let mut cmd: Command = tool.into();
        let status = cmd.status().map_err(|e| spawn_error(tool, e))?;
        Ok(status.code().unwrap_or(1))
    }
}

fn copy_lines(rx: mpsc::Receiver<String>, sink: &mut dyn Write) -> io::Result<()> {
    for line in rx {
        writeln!(sink, "{}", line)?;
    }
    sink.flush()
}

fn forward_lines<R: Read + Send + 'static>(
    pipe: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}
