//! Terminal output
//!
//! Progress and prompts go to stderr, results to stdout. Spinners fall back
//! to log lines when stderr is not a terminal or in CI.
//!
//! # Example
//!
//! ```rust,ignore
//! use invenv::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect().with_silent(args.silent);
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Configuring virtual environment...");
//! // ... do work ...
//! spinner.clear();
//!
//! ui::step_ok(&ctx, "Removed 3 environment(s)");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{remark, step_ok, step_remove, step_warn};
pub use progress::TaskSpinner;
pub use prompts::confirm;
