//! Progress spinner on stderr with plain fallback

use super::context::UiContext;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// A task spinner.
///
/// Draws on stderr so that stdout stays clean for the script and for
/// `invenv which`. Without a terminal (or with -v) messages become `info`
/// log lines instead.
pub struct TaskSpinner {
    bar: Option<ProgressBar>,
    enabled: bool,
}

impl TaskSpinner {
    /// Create a new spinner (nothing is drawn until `start`)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            bar: None,
            enabled: ctx.show_progress(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if !self.enabled {
            info!("{}", message);
            return;
        }

        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
        bar.set_style(spinner_style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    /// Update the spinner message
    pub fn message(&mut self, message: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(message.to_string()),
            None => info!("{}", message),
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for TaskSpinner {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Resolving interpreter...");
        spinner.message("Installing requirements...");
        spinner.clear();
        assert!(spinner.bar.is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut spinner = TaskSpinner::new(&UiContext::non_interactive());
        spinner.clear();
        spinner.clear();
    }
}
