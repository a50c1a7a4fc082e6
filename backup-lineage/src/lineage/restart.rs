//! Time-based chain restart for the always-level policy.

/// Whether a chain started at `chain_start` must restart at level 0 by `now`.
///
/// A non-positive `restart_interval` disables restarts.
pub fn should_restart(chain_start: i64, now: i64, restart_interval: i64) -> bool {
    if restart_interval <= 0 {
        return false;
    }
    now.saturating_sub(chain_start) >= restart_interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_at_threshold() {
        assert!(!should_restart(100, 100 + 3599, 3600));
        assert!(should_restart(100, 100 + 3600, 3600));
        assert!(should_restart(100, 100 + 7200, 3600));
    }

    #[test]
    fn test_disabled_interval_never_restarts() {
        assert!(!should_restart(0, i64::MAX, 0));
        assert!(!should_restart(0, i64::MAX, -1));
    }

    #[test]
    fn test_clock_behind_chain_start() {
        assert!(!should_restart(500, 100, 60));
    }
}
