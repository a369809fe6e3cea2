//! Plan and quota decisions
//!
//! Pure functions over a `User` record; callers supply the clock.

use chrono::{DateTime, Utc};

use crate::models::{Plan, User};

/// Premium counts only while the plan is `PREMIUM` and the expiry is in the future
pub fn is_premium_active(user: &User, now: DateTime<Utc>) -> bool {
    user.plan == Plan::Premium && user.premium_until.is_some_and(|until| until > now)
}

/// Whether the user may record one more transaction
pub fn can_record(user: &User, free_limit: i64, now: DateTime<Utc>) -> bool {
    is_premium_active(user, now) || user.free_tx_count < free_limit
}

/// Free transactions left, or `None` when unlimited
pub fn remaining_free(user: &User, free_limit: i64, now: DateTime<Utc>) -> Option<i64> {
    if is_premium_active(user, now) {
        None
    } else {
        Some((free_limit - user.free_tx_count).max(0))
    }
}
