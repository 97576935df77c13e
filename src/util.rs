use std::time;

/// Get the current system time in epoch format.
///
/// # Returns
///
/// Current system time in fractional seconds from epoch. A system clock set
/// before the epoch yields `0.0`.
///
/// # Examples
///
/// ```rust
/// assert!(now_from_epoch() > 0.0);
/// ```
#[must_use]
pub fn now_from_epoch() -> f64 {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map_or(0.0, |since| since.as_secs_f64())
}

/// Interprets an environment-style switch.
///
/// `1`, `true` and `yes` are truthy, regardless of case. Anything else,
/// including an empty value or one with surrounding whitespace, is falsy.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
