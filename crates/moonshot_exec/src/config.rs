use std::time::Duration;

use derive_setters::Setters;

const DEFAULT_DRAIN_GRACE_MS: u64 = 250;

/// Runner-wide settings shared by every invocation.
#[derive(Debug, Clone, PartialEq, Setters)]
#[setters(into)]
pub struct RunnerConfig {
    /// Shell used for command lines that need shell interpretation.
    pub shell: String,
    /// How long the output relays may keep draining after the child exited.
    pub drain_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            drain_grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
        }
    }
}

impl RunnerConfig {
    /// Reads `MOONSHOT_SHELL` and `MOONSHOT_DRAIN_GRACE_MS`, loading `.env`
    /// first when present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(shell) = var("MOONSHOT_SHELL").filter(|shell| !shell.trim().is_empty()) {
            config.shell = shell;
        }

        if let Some(raw) = var("MOONSHOT_DRAIN_GRACE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.drain_grace = Duration::from_millis(ms),
                Err(error) => tracing::warn!(
                    value = %raw,
                    %error,
                    "Ignoring invalid MOONSHOT_DRAIN_GRACE_MS"
                ),
            }
        }

        config
    }
}

fn default_shell() -> String {
    if cfg!(target_os = "windows") {
        std::env::var("COMSPEC").unwrap_or("cmd.exe".to_string())
    } else {
        "/bin/sh".to_string()
    }
}
