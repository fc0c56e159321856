//! Running external tools (venv, virtualenv, pip)

use crate::error::{InvenvError, InvenvResult};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Maximum number of output lines kept for error reporting
const ERROR_TAIL_LINES: usize = 50;

/// What happens to a tool's output while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Forward each line to stderr as it arrives
    Stream,
    /// Buffer output; surface it only if the tool fails
    #[default]
    Capture,
}

/// A single tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Human-readable command line for messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }
}

/// Runs tool commands in one output mode
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    mode: OutputMode,
}

impl CommandRunner {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    /// Run a tool to completion.
    ///
    /// A non-zero exit yields [`InvenvError::ToolFailed`] carrying the tail of
    /// the output, or no output when it was already streamed.
    pub async fn run(&self, tool: &ToolCommand) -> InvenvResult<()> {
        let command_line = tool.display();
        debug!("Running: {}", command_line);

        match self.mode {
            OutputMode::Stream => {
                let mut child = tool
                    .command()
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|e| InvenvError::command_failed(&command_line, e))?;

                stream_child_output(&mut child, &|line| eprintln!("{}", line)).await;

                let status = child
                    .wait()
                    .await
                    .map_err(|e| InvenvError::command_failed(&command_line, e))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(InvenvError::ToolFailed {
                        command: command_line,
                        code: status.code().unwrap_or(-1),
                        output: String::new(),
                    })
                }
            }
            OutputMode::Capture => {
                let output = tool
                    .command()
                    .output()
                    .await
                    .map_err(|e| InvenvError::command_failed(&command_line, e))?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(InvenvError::ToolFailed {
                        command: command_line,
                        code: output.status.code().unwrap_or(-1),
                        output: error_tail(
                            &String::from_utf8_lossy(&output.stdout),
                            &String::from_utf8_lossy(&output.stderr),
                        ),
                    })
                }
            }
        }
    }

    /// Run a tool silently and report only whether it succeeded
    pub async fn succeeds(&self, tool: &ToolCommand) -> bool {
        let status = tool
            .command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("{} could not run: {}", tool.display(), e);
                false
            }
        }
    }
}

/// Last lines of stdout followed by stderr
pub(crate) fn error_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Forward stdout+stderr of a child line by line until both are closed
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return;
    };

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            line = stdout_reader.next_line(), if !stdout_done => match line {
                Ok(Some(line)) => on_output(line),
                _ => stdout_done = true,
            },
            line = stderr_reader.next_line(), if !stderr_done => match line {
                Ok(Some(line)) => on_output(line),
                _ => stderr_done = true,
            },
        }
    }
}
