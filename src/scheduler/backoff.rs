use std::time::Duration;

/// Delay before the first retry.
pub const MIN_BACKOFF: Duration = Duration::from_secs(10);
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

/// Exponential backoff applied after attempt `attempt_number` asked for a retry:
/// 10 s, 20 s, 40 s, ... capped at five hours.
pub fn backoff_delay(attempt_number: u32) -> Duration {
    let exponent = attempt_number.saturating_sub(1).min(31);
    MIN_BACKOFF
        .checked_mul(1u32 << exponent)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}
