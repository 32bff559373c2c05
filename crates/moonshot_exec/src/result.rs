use serde::{Serialize, Serializer};

/// Outcome of a single command invocation.
///
/// Captures hold the exact bytes the child wrote; use [`Self::output_text`]
/// and [`Self::error_text`] for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// True iff the child exited with status 0.
    pub succeeded: bool,
    /// Exit code of the child. A child killed by signal `n` reports `128 + n`.
    pub exit_status: i32,
    /// Everything the child wrote to stdout, in arrival order.
    #[serde(serialize_with = "lossy")]
    pub captured_output: Vec<u8>,
    /// Everything the child wrote to stderr, in arrival order.
    #[serde(serialize_with = "lossy")]
    pub captured_error: Vec<u8>,
}

impl ExecutionResult {
    pub fn new(exit_status: i32, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            succeeded: exit_status == 0,
            exit_status,
            captured_output: stdout,
            captured_error: stderr,
        }
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.captured_output).into_owned()
    }

    pub fn error_text(&self) -> String {
        String::from_utf8_lossy(&self.captured_error).into_owned()
    }
}

fn lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}
