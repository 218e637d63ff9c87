//! Ordering guard for progress notifications.

/// Whether a progress notification stamped `timestamp` may be applied on top
/// of a record whose last applied notification was `last_applied`.
///
/// Equal timestamps are rejected, so redelivered duplicates are no-ops.
pub fn accepts(last_applied: Option<i64>, timestamp: i64) -> bool {
    last_applied.is_none_or(|last| timestamp > last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_is_always_accepted() {
        assert!(accepts(None, 0));
        assert!(accepts(None, -5));
    }

    #[test]
    fn only_strictly_newer_updates_are_accepted() {
        assert!(accepts(Some(1_000), 1_001));
        assert!(!accepts(Some(1_000), 1_000));
        assert!(!accepts(Some(1_000), 999));
    }
}
