mod cli;
mod log;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
pub use cli::*;
use colored::Colorize;
pub use log::*;
use moonshot_exec::{CommandSpec, Error, ExecutionResult, LogSink, ProcessRunner, RunnerConfig};
use serde_json::json;

/// Exit code for a command killed after `--timeout`, the same as coreutils `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Translates the command line flags into a [`CommandSpec`].
pub async fn spec_from(cli: &Cli) -> anyhow::Result<CommandSpec> {
    let environment: BTreeMap<String, String> = cli.env.iter().cloned().collect();
    let mut spec = CommandSpec::new(cli.command_line())
        .echo(!cli.quiet)
        .raise_on_failure(!cli.allow_failure)
        .environment(environment);

    if let Some(dir) = &cli.cwd {
        spec = spec.working_directory(dir.clone());
    }

    if let Some(secs) = cli.timeout {
        spec = spec.timeout(Duration::from_secs(secs));
    }

    if let Some(path) = &cli.log_file {
        let sink = LogSink::file(path)
            .await
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        spec = spec.log_destination(sink);
    }

    Ok(spec)
}

/// Runs the command and returns the exit code this process should exit with.
pub async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let spec = spec_from(&cli).await?;
    let runner = ProcessRunner::new(RunnerConfig::from_env());

    tracing::info!(command = %spec.command, "Running command");

    let outcome = runner.run(spec).await;
    if cli.json {
        if let Some(report) = failure_report(&outcome) {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    match outcome {
        Ok(result) => {
            report(&cli, &result)?;
            Ok(result.exit_status)
        }
        Err(error @ Error::NonZeroExit { .. }) => {
            let exit_status = error.exit_status().unwrap_or(1);
            tracing::info!(exit_status, "Command failed");
            if cli.quiet {
                // Nothing was echoed, so the captured output goes with the error.
                eprintln!("{error}");
            } else {
                eprintln!(
                    "{} exited with status {exit_status}",
                    "Command failed:".red().bold()
                );
            }
            Ok(exit_status)
        }
        Err(error @ Error::Timeout { timeout, .. }) => {
            tracing::info!(?timeout, "Command timed out");
            if cli.quiet {
                eprintln!("{error}");
            } else {
                eprintln!("{} killed after {timeout:?}", "Command timed out:".red().bold());
            }
            Ok(TIMEOUT_EXIT_CODE)
        }
        Err(Error::LogWrite { source, result }) => {
            tracing::warn!(%source, "Log file write failed");
            eprintln!(
                "{} could not write the log file: {source}",
                "Warning:".yellow().bold()
            );
            report(&cli, &result)?;
            Ok(result.exit_status)
        }
        Err(error) => Err(error.into()),
    }
}

fn report(cli: &Cli, result: &ExecutionResult) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

/// The JSON report for a command that ran but did not succeed. Results that
/// came back as `Ok` or inside `LogWrite` go through [`report`] instead.
fn failure_report(outcome: &moonshot_exec::Result<ExecutionResult>) -> Option<serde_json::Value> {
    let error = outcome.as_ref().err()?;
    match error {
        Error::NonZeroExit { exit_status, stdout, stderr, .. } => Some(json!({
            "succeeded": false,
            "exitStatus": exit_status,
            "capturedOutput": String::from_utf8_lossy(stdout),
            "capturedError": String::from_utf8_lossy(stderr),
            "timedOut": false,
            "error": error.to_string(),
        })),
        Error::Timeout { stdout, stderr, .. } => Some(json!({
            "succeeded": false,
            "exitStatus": TIMEOUT_EXIT_CODE,
            "capturedOutput": String::from_utf8_lossy(stdout),
            "capturedError": String::from_utf8_lossy(stderr),
            "timedOut": true,
            "error": error.to_string(),
        })),
        _ => None,
    }
}
