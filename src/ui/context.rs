//! UI context for detecting interactive vs CI environments

use crate::error::{LodeError, LodeResult};
use std::io::IsTerminal;

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Whether running in an interactive terminal
    interactive: bool,
    /// Whether --yes was passed (auto-approve prompts)
    auto_yes: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: Self::detect_interactive(),
            auto_yes: false,
        }
    }

    /// Create a non-interactive context (for testing or explicit CI mode)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    /// Set auto-yes mode (bypass prompts with approval)
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    /// Check if we should use fancy output (spinners, progress bars)
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Ask the user to confirm a destructive action.
    ///
    /// Auto-yes approves immediately. In a non-interactive environment the
    /// answer is an error rather than a silent default, so scripts must
    /// pass --yes explicitly.
    pub fn confirm(&self, message: &str) -> LodeResult<bool> {
        if self.auto_yes {
            return Ok(true);
        }
        if !self.interactive {
            return Err(LodeError::User(format!(
                "{} requires confirmation; pass --yes in non-interactive environments",
                message
            )));
        }
        cliclack::confirm(message)
            .interact()
            .map_err(|e| LodeError::io("reading confirmation", e))
    }

    fn detect_interactive() -> bool {
        if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
            return false;
        }

        let ci_vars = ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE", "JENKINS_URL"];
        !ci_vars.iter().any(|v| std::env::var_os(v).is_some())
    }
}
