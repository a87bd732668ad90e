//! Markdown fix-ups for partial answers.

const FENCE: &str = "```";

/// Closes an unbalanced code fence and then an unbalanced inline code span,
/// so a half-streamed answer still parses as Telegram Markdown.
pub fn ensure_formatting(text: &str) -> String {
    let fences = text.matches(FENCE).count();
    let inline = text.replace(FENCE, "").matches('`').count();

    let mut out = text.to_string();
    if fences % 2 == 1 {
        out.push_str(FENCE);
    }
    if inline % 2 == 1 {
        out.push('`');
    }
    out
}
