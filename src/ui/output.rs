//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.is_interactive() {
        println!("  {} {}", style("✓").green(), message);
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

/// Display a warning step
pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.is_interactive() {
        println!("  {} {}", style("!").yellow(), message);
    } else {
        println!("  {} {}", style("[WARN]").yellow(), message);
    }
}

/// Display a list item marked for removal
pub fn step_remove(ctx: &UiContext, message: &str) {
    if ctx.is_interactive() {
        println!("  {} {}", style("•").red(), message);
    } else {
        println!("  - {}", message);
    }
}

/// Display a remark/hint
pub fn remark(_ctx: &UiContext, message: &str) {
    println!("{}", style(message).dim());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        // These should not panic
        step_ok(&ctx, "Removed 2 environment(s)");
        step_warn(&ctx, "1 environment in use");
        step_remove(&ctx, "/tmp/envs/abc");
        remark(&ctx, "Dry run");
    }
}
