//! Utilities for running host commands through [`std::process::Command`].
//!
//! Every host effect goes through an [`Executor`], so node code can be exercised against an
//! in-memory host in tests. Execution is synchronous: a call blocks the calling thread until
//! the process exits, and there is no timeout.

use std::{fmt, io, process};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program} {}` returned non-zero status: {}", .args.join(" "), .output.stderr.trim())]
    NonZero { program: String, args: Vec<String>, output: Output },
}

#[derive(Debug, Clone)]
pub struct Output {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            status: value.status.code(),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs a program with arguments on the host and reports its output.
///
/// Implementations must return [`Error::NonZero`] when the program exits unsuccessfully.
pub trait Executor: Send + Sync + fmt::Debug {
    fn execute(&self, program: &str, args: &[&str]) -> Result<Output>;
}

/// The [`Executor`] backed by real host processes.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    /// Optional privilege prefix, e.g. `sudo`.
    prefix: Option<String>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every command through `prefix` (e.g. `sudo`).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }

    /// Runs the command provided as strings, separating args with whitespaces.
    pub fn by_str(&self, cmd: &str) -> Result<Output> {
        let mut iter = cmd.split_ascii_whitespace();
        let program = iter.next().ok_or(Error::Empty)?;
        let args: Vec<&str> = iter.collect();
        self.execute(program, &args)
    }
}

impl Executor for Runner {
    fn execute(&self, program: &str, args: &[&str]) -> Result<Output> {
        let mut cmd = match &self.prefix {
            Some(prefix) => {
                let mut cmd = process::Command::new(prefix);
                cmd.arg(program);
                cmd
            }
            None => process::Command::new(program),
        };
        cmd.args(args).stderr(process::Stdio::piped()).stdout(process::Stdio::piped());

        tracing::debug!(?cmd, "running command");

        let output: Output = cmd
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(|source| Error::Io { program: program.to_owned(), source })?
            .into();

        if !output.success() {
            tracing::debug!(?output.stderr, ?output.status, ?cmd, "command returned non-zero status");
            return Err(Error::NonZero {
                program: program.to_owned(),
                args: args.iter().map(|a| a.to_string()).collect(),
                output,
            });
        }

        Ok(output)
    }
}
