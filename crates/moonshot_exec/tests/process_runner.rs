#![cfg(unix)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use moonshot_exec::{
    CommandSpec, Console, Error, Input, InputPipe, LogSink, ProcessRunner, RunnerConfig,
    SharedBuffer,
};
use pretty_assertions::assert_eq;
use tokio::io::AsyncWrite;

fn fixture(input: Input) -> (ProcessRunner, SharedBuffer, SharedBuffer) {
    let (console, stdout, stderr) = Console::captured(input);
    let runner = ProcessRunner::new(RunnerConfig::default()).console(console);
    (runner, stdout, stderr)
}

/// A log destination that always fails, like a full disk.
struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::other("no space left on device")))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_success_never_raises() {
    for raise_on_failure in [true, false] {
        let (runner, _, _) = fixture(Input::Empty);

        let actual = runner
            .run(CommandSpec::new("echo 'hello world'").raise_on_failure(raise_on_failure))
            .await
            .unwrap();

        assert!(actual.succeeded);
        assert_eq!(actual.exit_status, 0);
        assert_eq!(actual.output_text(), "hello world\n");
        assert_eq!(actual.error_text(), "");
    }
}

#[tokio::test]
async fn test_non_zero_exit_raises_with_code_and_output() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("echo partial; echo broken >&2; exit 3"))
        .await
        .unwrap_err();

    match actual {
        Error::NonZeroExit { command, exit_status, stdout, stderr } => {
            assert_eq!(command, "echo partial; echo broken >&2; exit 3");
            assert_eq!(exit_status, 3);
            assert_eq!(stdout, b"partial\n".to_vec());
            assert_eq!(stderr, b"broken\n".to_vec());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_non_zero_exit_returned_when_not_raising() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("exit 3").raise_on_failure(false))
        .await
        .unwrap();

    assert!(!actual.succeeded);
    assert_eq!(actual.exit_status, 3);
}

#[tokio::test]
async fn test_output_is_captured_byte_for_byte() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner.run(CommandSpec::new("printf 'abc\\ndef'")).await.unwrap();

    assert_eq!(actual.output_text(), "abc\ndef");
}

#[tokio::test]
async fn test_invalid_utf8_is_captured_as_written() {
    let (runner, _, _) = fixture(Input::Empty);
    let (log, buffer) = LogSink::buffer();

    let actual = runner
        .run(CommandSpec::new("printf '\\377\\376ok'").log_destination(log))
        .await
        .unwrap();

    let expected = vec![0xff, 0xfe, b'o', b'k'];
    assert_eq!(actual.captured_output, expected);
    assert_eq!(buffer.contents(), expected);
}

#[tokio::test]
async fn test_invalid_utf8_is_kept_on_failure() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("printf '\\377' >&2; exit 1"))
        .await
        .unwrap_err();

    match actual {
        Error::NonZeroExit { stderr, .. } => assert_eq!(stderr, vec![0xff]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_large_output_is_fully_drained() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("seq 1 20000").echo(false))
        .await
        .unwrap();

    let expected: String = (1..=20000).map(|n| format!("{n}\n")).collect();
    assert_eq!(actual.captured_output.len(), expected.len());
    assert_eq!(actual.output_text(), expected);
}

#[tokio::test]
async fn test_log_mirrors_each_stream() {
    let (runner, _, _) = fixture(Input::Empty);

    let (log, buffer) = LogSink::buffer();
    let stdout_only = runner
        .run(CommandSpec::new("printf 'line one\\nline two\\n'").log_destination(log))
        .await
        .unwrap();
    assert_eq!(buffer.contents(), stdout_only.captured_output);

    let (log, buffer) = LogSink::buffer();
    let stderr_only = runner
        .run(CommandSpec::new("echo warning >&2").log_destination(log))
        .await
        .unwrap();
    assert_eq!(buffer.contents(), stderr_only.captured_error);
}

#[tokio::test]
async fn test_log_receives_both_streams() {
    let (runner, _, _) = fixture(Input::Empty);
    let (log, buffer) = LogSink::buffer();

    let actual = runner
        .run(CommandSpec::new("echo out; echo err >&2").log_destination(log))
        .await
        .unwrap();

    let logged = buffer.to_string_lossy();
    assert_eq!(
        logged.len(),
        actual.captured_output.len() + actual.captured_error.len()
    );
    assert!(logged.contains("out\n"));
    assert!(logged.contains("err\n"));
}

#[tokio::test]
async fn test_log_file_destination() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotation.log");
    let (runner, _, _) = fixture(Input::Empty);

    let log = LogSink::file(&path).await.unwrap();
    runner
        .run(CommandSpec::new("echo rotated").log_destination(log))
        .await
        .unwrap();

    let actual = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(actual, "rotated\n");
}

#[tokio::test]
async fn test_log_failure_is_reported_with_the_result() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("echo hi").log_destination(LogSink::new(FailingWriter)))
        .await
        .unwrap_err();

    match actual {
        Error::LogWrite { result, .. } => {
            assert!(result.succeeded);
            assert_eq!(result.output_text(), "hi\n");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_log_failure_does_not_mask_command_failure() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("echo hi; exit 4").log_destination(LogSink::new(FailingWriter)))
        .await
        .unwrap_err();

    assert_eq!(actual.exit_status(), Some(4));
    assert!(matches!(actual, Error::NonZeroExit { .. }));
}

#[tokio::test]
async fn test_echo_suppression() {
    let (runner, stdout, stderr) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("echo out; echo err >&2").echo(false))
        .await
        .unwrap();

    assert!(stdout.is_empty());
    assert!(stderr.is_empty());
    assert_eq!(actual.output_text(), "out\n");
    assert_eq!(actual.error_text(), "err\n");
}

#[tokio::test]
async fn test_echo_mirrors_to_console() {
    let (runner, stdout, stderr) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("printf 'a\\r\\nb\\rc'; printf 'Password:\\r' >&2"))
        .await
        .unwrap();

    assert_eq!(actual.output_text(), "a\r\nb\rc");
    assert_eq!(stdout.to_string_lossy(), "a\nb\nc");
    assert_eq!(stderr.to_string_lossy(), "Password:\r");
}

#[tokio::test]
async fn test_stdin_is_forwarded() {
    let (runner, _, _) = fixture(Input::Bytes(Bytes::from_static(b"hunter2\n")));

    let actual = runner
        .run(CommandSpec::new("read line; echo \"got $line\""))
        .await
        .unwrap();

    assert_eq!(actual.output_text(), "got hunter2\n");
}

#[tokio::test]
async fn test_open_input_does_not_outlive_the_child() {
    let (tx, pipe) = InputPipe::channel(8);
    let (runner, _, _) = fixture(Input::Pipe(pipe));
    tx.send(Bytes::from_static(b"first\n")).await.unwrap();
    let started = Instant::now();

    let actual = runner
        .run(CommandSpec::new("read line; echo \"got $line\""))
        .await
        .unwrap();

    assert_eq!(actual.output_text(), "got first\n");
    assert!(started.elapsed() < Duration::from_secs(2));
    drop(tx);
}

#[tokio::test]
async fn test_input_pipe_is_reusable_after_a_run() {
    let (tx, pipe) = InputPipe::channel(8);
    let (runner, _, _) = fixture(Input::Pipe(pipe));

    runner.run(CommandSpec::new("true")).await.unwrap();
    tx.send(Bytes::from_static(b"second\n")).await.unwrap();
    let actual = runner
        .run(CommandSpec::new("read line; echo \"got $line\""))
        .await
        .unwrap();

    assert_eq!(actual.output_text(), "got second\n");
}

#[tokio::test]
async fn test_child_is_gone_when_run_returns() {
    let (_tx, pipe) = InputPipe::channel(8);
    let (runner, _, _) = fixture(Input::Pipe(pipe));

    let actual = runner.run(CommandSpec::new("echo $$")).await.unwrap();
    let pid = actual.output_text().trim().to_string();

    let alive = std::process::Command::new("kill")
        .args(["-0", &pid])
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(!alive.success(), "process {pid} is still running");
}

#[tokio::test]
async fn test_process_stdin_does_not_block_return() {
    let (runner, _, _) = fixture(Input::Stdin);
    let started = Instant::now();

    let actual = runner.run(CommandSpec::new("true")).await.unwrap();

    assert!(actual.succeeded);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_missing_command_is_a_spawn_error() {
    for (echo, raise_on_failure) in [(true, true), (true, false), (false, true), (false, false)] {
        let (runner, _, _) = fixture(Input::Empty);

        let actual = runner
            .run(
                CommandSpec::new("this-command-does-not-exist-xyz")
                    .echo(echo)
                    .raise_on_failure(raise_on_failure),
            )
            .await
            .unwrap_err();

        assert!(matches!(actual, Error::Spawn { .. }), "{actual}");
    }
}

#[tokio::test]
async fn test_empty_command_is_rejected() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner.run(CommandSpec::new("   ")).await.unwrap_err();

    assert!(matches!(actual, Error::EmptyCommand));
    assert!(actual.is_spawn_error());
}

#[tokio::test]
async fn test_streams_drain_independently() {
    let (runner, _, _) = fixture(Input::Empty);

    let stderr_only = runner.run(CommandSpec::new("echo oops >&2")).await.unwrap();
    assert_eq!(stderr_only.output_text(), "");
    assert_eq!(stderr_only.error_text(), "oops\n");

    let stdout_only = runner.run(CommandSpec::new("echo fine")).await.unwrap();
    assert_eq!(stdout_only.output_text(), "fine\n");
    assert_eq!(stdout_only.error_text(), "");
}

#[tokio::test]
async fn test_environment_overrides() {
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("echo \"$STACK_NAME:$HOME\"").env("STACK_NAME", "workers"))
        .await
        .unwrap();

    let home = std::env::var("HOME").unwrap_or_default();
    assert_eq!(actual.output_text(), format!("workers:{home}\n"));
}

#[tokio::test]
async fn test_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let expected = std::fs::canonicalize(dir.path()).unwrap();
    let (runner, _, _) = fixture(Input::Empty);

    let actual = runner
        .run(CommandSpec::new("pwd -P").working_directory(expected.clone()))
        .await
        .unwrap();

    assert_eq!(actual.output_text(), format!("{}\n", expected.display()));
}

#[tokio::test]
async fn test_timeout_kills_the_child() {
    let (runner, _, _) = fixture(Input::Empty);
    let started = Instant::now();

    let actual = runner
        .run(CommandSpec::new("sleep 10").timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(actual, Error::Timeout { .. }), "{actual}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_background_process_holding_output_does_not_hang() {
    let (console, _, _) = Console::captured(Input::Empty);
    let runner = ProcessRunner::new(RunnerConfig::default().drain_grace(Duration::from_millis(100)))
        .console(console);
    let started = Instant::now();

    let actual = runner.run(CommandSpec::new("sleep 3 & echo done")).await.unwrap();

    assert_eq!(actual.output_text(), "done\n");
    assert!(started.elapsed() < Duration::from_secs(2));
}
