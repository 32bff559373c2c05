use std::time::Duration;

use thiserror::Error;

use crate::{ExecutionResult, StreamKind};

// NOTE: There is intentionally no `From<std::io::Error>` here. An I/O error
// means something different depending on whether it came from spawning,
// waiting, reading a pipe or writing the log, and callers branch on that.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Command string is empty or contains only whitespace")]
    EmptyCommand,

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "The command '{command}' failed with status {exit_status}\nstdout: {out}\nstderr: {err}",
        out = String::from_utf8_lossy(.stdout),
        err = String::from_utf8_lossy(.stderr)
    )]
    NonZeroExit {
        command: String,
        exit_status: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("Failed to write command output to the log destination: {source}")]
    LogWrite {
        #[source]
        source: std::io::Error,
        result: Box<ExecutionResult>,
    },

    #[error("Failed to read {stream} of the child process: {source}")]
    StreamRead {
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "The command '{command}' timed out after {timeout:?}\nstdout: {out}\nstderr: {err}",
        out = String::from_utf8_lossy(.stdout),
        err = String::from_utf8_lossy(.stderr)
    )]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("Failed to wait for the child process: {0}")]
    Wait(#[source] std::io::Error),
}

impl Error {
    /// True when no process was started for the command.
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, Error::EmptyCommand | Error::Spawn { .. })
    }

    /// The exit status of the child, for errors raised after it terminated.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Error::NonZeroExit { exit_status, .. } => Some(*exit_status),
            Error::LogWrite { result, .. } => Some(result.exit_status),
            _ => None,
        }
    }
}

pub type Result<A> = std::result::Result<A, Error>;
