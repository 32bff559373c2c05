use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use derive_setters::Setters;

use crate::LogSink;

/// A single command to run.
#[derive(Debug, Clone, Setters)]
#[setters(into, strip_option)]
pub struct CommandSpec {
    /// The command line. Plain lines run directly, others through the shell.
    #[setters(skip)]
    pub command: String,
    /// Variables merged over the inherited environment.
    pub environment: BTreeMap<String, String>,
    /// Mirror live output to the console.
    pub echo: bool,
    /// Turn a non-zero exit into [`crate::Error::NonZeroExit`].
    pub raise_on_failure: bool,
    /// Receives a verbatim copy of stdout and stderr as they arrive.
    pub log_destination: Option<LogSink>,
    /// Current directory of the child, defaults to the caller's.
    pub working_directory: Option<PathBuf>,
    /// Kill the child once this much time has passed.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            environment: BTreeMap::new(),
            echo: true,
            raise_on_failure: true,
            log_destination: None,
            working_directory: None,
            timeout: None,
        }
    }

    /// Adds or replaces a single environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}
