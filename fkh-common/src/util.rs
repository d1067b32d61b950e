//! Shared utilities for FKH.

use std::time::Duration;

/// Render a wall-clock duration the way pass summaries show it.
///
/// Under a minute renders whole seconds (`12s`), under an hour renders
/// minutes with two decimals (`3.40m`), anything longer renders hours with
/// two decimals (`1.25h`).
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.0}s")
    } else if secs < 3600.0 {
        format!("{:.2}m", secs / 60.0)
    } else {
        format!("{:.2}h", secs / 3600.0)
    }
}

/// `word` with an `s` appended unless `count` is exactly one.
pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
