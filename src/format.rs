//! Display formatting helpers
//!
//! Pure string formatting shared by the update pipeline and the poll loop:
//! thousands-grouped token counts, reset countdowns, and the reverse parse of
//! a previously rendered cost line.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Group a token count with comma separators, e.g. `1234567` -> `"1,234,567"`.
pub fn format_tokens(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the countdown to a usage reset.
///
/// A target at or before `now` renders as pending: the reset has passed but
/// the collaborator has not yet observed it and zeroed the counters. Otherwise
/// whole hours and minutes remain, no seconds precision.
pub fn format_time_remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff_ms = target.timestamp_millis() - now.timestamp_millis();
    if diff_ms <= 0 {
        return "Reset pending...".to_string();
    }

    let hours = diff_ms / 3_600_000;
    let minutes = (diff_ms % 3_600_000) / 60_000;
    if hours > 0 {
        format!("Reset in: {hours}h {minutes}m")
    } else {
        format!("Reset in: {minutes}m")
    }
}

fn cost_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Current cost:\s*([\d\s.,]+)\s*tokens").unwrap())
}

/// Recover an integer token count from a previously rendered cost line.
///
/// Fallback path for updates that omit `conversationLength`: strips whitespace
/// and every `.`/`,` from the matched digits before parsing. Lossy: a rendered
/// decimal like `1.5` reads back as `15`. Known limitation, kept until the
/// collaborator always supplies the length.
pub fn parse_rendered_cost(text: &str) -> Option<u64> {
    let captures = cost_line_regex().captures(text)?;
    let cleaned: String = captures[1]
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != ',')
        .collect();
    cleaned.parse().ok()
}
