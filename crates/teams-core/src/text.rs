//! Text shaping for summaries and pane prompts

/// Collapse whitespace runs and cap at `limit` chars, eliding with `...`.
pub fn summarize(raw: &str, limit: usize) -> String {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&text, limit)
}

/// Cap `raw` (trimmed, whitespace preserved) at `limit` chars.
pub fn trim_text(raw: &str, limit: usize) -> String {
    truncate_chars(raw.trim(), limit)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
