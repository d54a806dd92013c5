//! Tombstone boundary rule (spec §4.G step 3, §9 Open Question
//! "Tombstone boundary").
//!
//! A tombstone whose `time_of_death` is at or after the newly projected
//! expiration makes the new publish redundant: some other, not-yet-expired
//! copy of this label is already authoritative in the DHT. The boundary is
//! `>=`, not `>`, so a republish at the exact same expiration is also
//! skipped.

use chrono::{DateTime, Utc};

pub fn should_skip(existing: Option<DateTime<Utc>>, projected_expiration: DateTime<Utc>) -> bool {
    existing.is_some_and(|time_of_death| time_of_death >= projected_expiration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn no_tombstone_never_skips() {
        assert!(!should_skip(None, Utc::now()));
    }

    #[test]
    fn tombstone_strictly_before_projected_expiration_does_not_skip() {
        let now = Utc::now();
        assert!(!should_skip(Some(now), now + Duration::seconds(1)));
    }

    #[test]
    fn tombstone_exactly_at_projected_expiration_skips() {
        // The resolved Open Question: boundary is `>=`.
        let t = Utc::now();
        assert!(should_skip(Some(t), t));
    }

    #[test]
    fn tombstone_after_projected_expiration_skips() {
        let now = Utc::now();
        assert!(should_skip(Some(now + Duration::seconds(5)), now));
    }
}
