use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::relay::{forward_input, OutputRelay, RelayOutcome};
use crate::{
    CommandLine, CommandSpec, Console, Error, ExecutionResult, Result, RunnerConfig, SharedBuffer,
    StreamKind,
};

/// Runs commands with their output relayed live to the console while it is
/// being captured.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: RunnerConfig,
    console: Console,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config, console: Console::inherit() }
    }

    /// Replaces the console that input is read from and output echoed to.
    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn prepare_command(&self, line: &CommandLine, spec: &CommandSpec) -> Command {
        let mut command = line.to_command(&self.config.shell);

        command.envs(&spec.environment);

        if let Some(dir) = &spec.working_directory {
            command.current_dir(dir);
        }

        command.kill_on_drop(true);

        // Every stream is piped: output is captured and echoed by the relays,
        // input is forwarded by one so that it can be stopped with the child.
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command
    }

    fn output_relay(
        &self,
        kind: StreamKind,
        capture: &SharedBuffer,
        spec: &CommandSpec,
    ) -> OutputRelay {
        let relay = OutputRelay::new(kind, capture.clone()).log(spec.log_destination.clone());
        if !spec.echo {
            return relay;
        }
        let console = match kind {
            StreamKind::Stdout => &self.console.stdout,
            StreamKind::Stderr => &self.console.stderr,
        };
        relay.echo(console.writer())
    }

    /// Executes `spec` and returns once the child has exited and its output
    /// has been drained.
    pub async fn run(&self, spec: CommandSpec) -> Result<ExecutionResult> {
        let line = CommandLine::parse(&spec.command)?;
        let mut command = self.prepare_command(&line, &spec);

        tracing::debug!(command = %spec.command, ?line, "Spawning command");
        let mut child = command
            .spawn()
            .map_err(|source| Error::Spawn { command: spec.command.clone(), source })?;

        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();

        let stdout_relay = child.stdout.take().map(|pipe| {
            tokio::spawn(self.output_relay(StreamKind::Stdout, &stdout, &spec).run(pipe))
        });
        let stderr_relay = child.stderr.take().map(|pipe| {
            tokio::spawn(self.output_relay(StreamKind::Stderr, &stderr, &spec).run(pipe))
        });
        let stdin_relay = child
            .stdin
            .take()
            .map(|pipe| tokio::spawn(forward_input(self.console.input.clone(), pipe)));

        let waited = wait(&mut child, spec.timeout).await;

        // Input has no end tied to the child, so it is never waited for.
        stop(stdin_relay).await;

        let (status, timed_out) = match waited {
            Ok(waited) => waited,
            Err(error) => {
                stop(stdout_relay).await;
                stop(stderr_relay).await;
                return Err(Error::Wait(error));
            }
        };

        let deadline = Instant::now() + self.config.drain_grace;
        let stdout_outcome = drain(stdout_relay, StreamKind::Stdout, deadline).await;
        let stderr_outcome = drain(stderr_relay, StreamKind::Stderr, deadline).await;

        let result = ExecutionResult::new(exit_code(status), stdout.contents(), stderr.contents());
        tracing::debug!(
            command = %spec.command,
            exit_status = result.exit_status,
            "Command finished"
        );

        finalize(spec, result, timed_out, stdout_outcome, stderr_outcome)
    }
}

/// Waits for the child, killing it if `timeout` expires first. Returns the
/// exit status and the timeout when it did expire.
async fn wait(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<(ExitStatus, Option<Duration>)> {
    let Some(limit) = timeout else {
        return Ok((child.wait().await?, None));
    };
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok((status?, None)),
        Err(_) => {
            tracing::debug!(?limit, "Killing command after timeout");
            child.kill().await?;
            Ok((child.wait().await?, Some(limit)))
        }
    }
}

/// Aborts a relay and waits until it has actually stopped.
async fn stop<T>(relay: Option<JoinHandle<T>>) {
    if let Some(handle) = relay {
        handle.abort();
        let _ = handle.await;
    }
}

/// Waits for an output relay to reach end-of-stream, giving up at `deadline`.
///
/// The child has exited, so its end of the pipe is closed unless a process it
/// left behind still holds it. Whatever was read before the deadline stays
/// captured.
async fn drain(
    relay: Option<JoinHandle<RelayOutcome>>,
    kind: StreamKind,
    deadline: Instant,
) -> RelayOutcome {
    let Some(mut handle) = relay else {
        return RelayOutcome::default();
    };
    let drained = tokio::time::timeout_at(deadline, &mut handle).await;
    match drained {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => {
            tracing::warn!(stream = %kind, %error, "Output relay did not complete");
            // The capture may be missing a tail, so this counts as a failed read.
            RelayOutcome {
                read_error: Some(std::io::Error::other(error.to_string())),
                log_error: None,
            }
        }
        Err(_) => {
            tracing::warn!(
                stream = %kind,
                "Output still open after the command exited, a background process may hold it"
            );
            stop(Some(handle)).await;
            RelayOutcome::default()
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn finalize(
    spec: CommandSpec,
    result: ExecutionResult,
    timed_out: Option<Duration>,
    stdout: RelayOutcome,
    stderr: RelayOutcome,
) -> Result<ExecutionResult> {
    if let Some(timeout) = timed_out {
        return Err(Error::Timeout {
            command: spec.command,
            timeout,
            stdout: result.captured_output,
            stderr: result.captured_error,
        });
    }

    let read_error = stdout
        .read_error
        .map(|source| (StreamKind::Stdout, source))
        .or(stderr.read_error.map(|source| (StreamKind::Stderr, source)));
    if let Some((stream, source)) = read_error {
        return Err(Error::StreamRead { stream, source });
    }

    let log_error = stdout.log_error.or(stderr.log_error);

    if !result.succeeded && spec.raise_on_failure {
        if let Some(error) = &log_error {
            tracing::warn!(%error, "Command failed and its output could not be fully logged");
        }
        return Err(Error::NonZeroExit {
            command: spec.command,
            exit_status: result.exit_status,
            stdout: result.captured_output,
            stderr: result.captured_error,
        });
    }

    match log_error {
        Some(source) => Err(Error::LogWrite { source, result: Box::new(result) }),
        None => Ok(result),
    }
}
