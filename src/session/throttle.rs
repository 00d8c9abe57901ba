//! Sliding cooldown for rate-limited side actions

use chrono::{DateTime, Utc};
use std::time::Duration;

/// An action is allowed when nothing was recorded yet or strictly more than
/// `cooldown` has passed since the last recorded action.
pub fn allows(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    match last {
        None => true,
        // A clock that went backwards yields a negative delta, which is blocked
        Some(last) => now
            .signed_duration_since(last)
            .to_std()
            .is_ok_and(|elapsed| elapsed > cooldown),
    }
}
