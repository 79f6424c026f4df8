//! Single seam for external process invocation.
//!
//! Every child process the pipeline spawns (build trace, both
//! preprocessor passes, assembler, base compile) goes through
//! [`ToolRunner`], so alternate build systems and toolchains can be
//! substituted, and tests can script results, without touching resolver
//! or preprocessor logic.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Captured result of one external tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    /// Captured standard output. Standard error is left attached to the
    /// terminal so toolchain diagnostics reach the user directly.
    pub stdout: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// A successful run producing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
        }
    }

    /// A failed run with the given exit code.
    pub fn failed(code: i32) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command exited with {status}:\n{command}")]
    Failed { command: String, status: String },
}

/// Runs one external command to completion, capturing its stdout.
///
/// `stdin`, when given, is fed to the child verbatim. Implementations
/// block until the child exits; the pipeline is strictly sequential and
/// applies no timeout.
pub trait ToolRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        stdin: Option<&str>,
    ) -> Result<ToolOutput, ToolError>;
}

/// Runs `argv` and turns a nonzero exit into a [`ToolError::Failed`]
/// carrying the shell-quoted command line.
pub fn run_checked(
    runner: &dyn ToolRunner,
    argv: &[String],
    cwd: &Path,
    stdin: Option<&str>,
) -> Result<ToolOutput, ToolError> {
    let output = runner.run(argv, cwd, stdin)?;
    if !output.success() {
        let status = match output.status {
            Some(code) => format!("code {code}"),
            None => "a signal".to_string(),
        };
        return Err(ToolError::Failed {
            command: format_command(argv),
            status,
        });
    }
    Ok(output)
}

/// Shell-quoted rendering of a command line for diagnostics and scripts.
pub fn format_command(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

/// Shell-quoted rendering of a single word.
pub fn quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| word.to_string())
}

/// [`ToolRunner`] backed by [`std::process::Command`].
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        stdin: Option<&str>,
    ) -> Result<ToolOutput, ToolError> {
        let (program, args) = argv.split_first().ok_or_else(|| ToolError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
        })?;

        let spawn_error = |source| ToolError::Spawn {
            command: format_command(argv),
            source,
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(spawn_error)?;

        // Feed stdin from a separate thread: writing a large input while
        // the child is blocked writing stdout would deadlock otherwise.
        let writer = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.to_owned();
                Some(std::thread::spawn(move || pipe.write_all(input.as_bytes())))
            }
            _ => None,
        };

        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Some(handle) = writer {
            // A broken pipe from a failing child surfaces via exit status.
            let _ = handle.join();
        }

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// One invocation observed by a [`ScriptedToolRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: Option<String>,
}

/// [`ToolRunner`] that replays canned outputs instead of spawning
/// processes. Responses are matched by the program's file name (the last
/// path component of `argv[0]`) and consumed in FIFO order per program.
#[derive(Default)]
pub struct ScriptedToolRunner {
    responses: RefCell<HashMap<String, VecDeque<ToolOutput>>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `output` as the next result for invocations of `program`.
    pub fn respond(&self, program: &str, output: ToolOutput) {
        self.responses
            .borrow_mut()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl ToolRunner for ScriptedToolRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        stdin: Option<&str>,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.borrow_mut().push(RecordedCall {
            argv: argv.to_vec(),
            cwd: cwd.to_path_buf(),
            stdin: stdin.map(str::to_owned),
        });

        let program = argv
            .first()
            .map(|p| {
                Path::new(p)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.clone())
            })
            .unwrap_or_default();

        self.responses
            .borrow_mut()
            .get_mut(&program)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ToolError::Spawn {
                command: format_command(argv),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for `{program}`"),
                ),
            })
    }
}
