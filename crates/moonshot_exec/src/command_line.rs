use tokio::process::Command;

use crate::{Error, Result};

/// Characters that make a command line depend on shell interpretation.
const SHELL_META_CHARACTERS: &[char] = &[
    '*', '?', '{', '}', '[', ']', '<', '>', '(', ')', '~', '&', '|', '\\', '$', ';', '\'', '`',
    '"', '\n', '#', '=', '%',
];

/// Leading words that only the shell understands: reserved words and special
/// builtins.
const SHELL_KEYWORDS: &[&str] = &[
    "!", ".", ":", "break", "case", "continue", "do", "done", "elif", "else", "esac", "eval",
    "exec", "exit", "export", "fi", "for", "if", "in", "readonly", "return", "set", "shift",
    "then", "times", "trap", "until", "unset", "while", "{", "}",
];

/// How a command string is launched.
///
/// Plain command lines such as `aws cloudformation describe-stacks` are executed
/// directly so that a missing program is reported as a spawn failure. Anything
/// that needs the shell (pipes, redirections, variables, builtins) is run
/// through it with `-c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Direct { program: String, args: Vec<String> },
    Shell(String),
}

impl CommandLine {
    pub fn parse(command: &str) -> Result<Self> {
        let line = command.trim();
        if line.is_empty() {
            return Err(Error::EmptyCommand);
        }

        if line.contains(SHELL_META_CHARACTERS) {
            return Ok(CommandLine::Shell(line.to_string()));
        }

        let mut words = line.split_whitespace().map(str::to_string);
        match words.next() {
            Some(program) if !SHELL_KEYWORDS.contains(&program.as_str()) => {
                Ok(CommandLine::Direct { program, args: words.collect() })
            }
            _ => Ok(CommandLine::Shell(line.to_string())),
        }
    }

    /// Builds the process command, using `shell` for shell command lines.
    pub fn to_command(&self, shell: &str) -> Command {
        match self {
            CommandLine::Direct { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            CommandLine::Shell(line) => {
                let mut command = Command::new(shell);
                let parameter = if cfg!(target_os = "windows") { "/C" } else { "-c" };
                command.arg(parameter).arg(line);
                command
            }
        }
    }
}
