//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{InvenvError, InvenvResult};
use console::{style, Term};

/// Prompt for confirmation on stderr, returns `default` if non-interactive
/// and `true` with --yes
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> InvenvResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    let prompt = format!(
        "{} {} ",
        style(message).bold(),
        style(if default { "[Y/n]" } else { "[y/N]" }).dim()
    );

    // Term::read_line blocks
    let answer = tokio::task::spawn_blocking(move || {
        let term = Term::stderr();
        term.write_str(&prompt)?;
        term.read_line()
    })
    .await
    .map_err(|e| InvenvError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| InvenvError::io("reading confirmation", e))?;

    Ok(parse_answer(&answer, default))
}

fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
