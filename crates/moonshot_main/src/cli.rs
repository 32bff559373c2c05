use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"))]
/// Run a command the way deployment hooks do: output is echoed live and
/// captured, input is forwarded, and a non-zero exit fails the run.
pub struct Cli {
    /// Environment override for the command, as KEY=VALUE. Repeatable.
    #[arg(long = "env", short = 'e', value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Directory to run the command in.
    #[arg(long, short = 'C')]
    pub cwd: Option<PathBuf>,

    /// Do not echo the command's output.
    #[arg(long, short = 'q', default_value_t = false)]
    pub quiet: bool,

    /// Report a non-zero exit in the result instead of failing.
    #[arg(long, default_value_t = false)]
    pub allow_failure: bool,

    /// Append a copy of stdout and stderr to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Kill the command after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the execution result as JSON once the command finished.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write debug level traces to the log directory.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// The command to run. A single argument is taken as a command line and
    /// may use shell syntax; several arguments are run as that exact argv.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    pub fn command_line(&self) -> String {
        match self.command.as_slice() {
            [line] => line.clone(),
            argv => shell_words::join(argv),
        }
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
