//! Rate limiter (C12): monotonic lockout on failed unlock attempts.
//!
//! Modeled as a plain struct rather than a process-wide singleton, since
//! spec.md §6 places its storage in a trust domain outside this engine (the
//! "trusted-domain rate-limit bridge"); callers own one instance per trust
//! boundary and persist/restore its counters themselves.

const MAX_ATTEMPTS: u32 = 5;
const BASE_LOCKOUT_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub is_limited: bool,
    pub remaining_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedResult {
    pub is_locked: bool,
    pub lockout_ms: i64,
    pub attempts_remaining: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiter {
    attempts: u32,
    locked_until_ms: Option<i64>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores state persisted by the trusted-domain bridge.
    pub fn restore(attempts: u32, locked_until_ms: Option<i64>) -> Self {
        RateLimiter { attempts, locked_until_ms }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn locked_until_ms(&self) -> Option<i64> {
        self.locked_until_ms
    }

    /// `checkLimit` from spec.md §4.12/§6.
    pub fn check_limit(&self, now_ms: i64) -> CheckResult {
        match self.locked_until_ms {
            Some(until) if until > now_ms => CheckResult { is_limited: true, remaining_ms: until - now_ms },
            _ => CheckResult { is_limited: false, remaining_ms: 0 },
        }
    }

    /// `recordFailed`. The lockout doubles for each attempt past
    /// `MAX_ATTEMPTS`, so a persistent attacker faces an ever-growing delay
    /// rather than a fixed one.
    pub fn record_failed(&mut self, now_ms: i64) -> FailedResult {
        self.attempts += 1;

        if self.attempts <= MAX_ATTEMPTS {
            return FailedResult {
                is_locked: false,
                lockout_ms: 0,
                attempts_remaining: MAX_ATTEMPTS - self.attempts,
            };
        }

        let excess = self.attempts - MAX_ATTEMPTS;
        let lockout_ms = BASE_LOCKOUT_MS.saturating_mul(1i64 << excess.min(20));
        self.locked_until_ms = Some(now_ms + lockout_ms);

        FailedResult {
            is_locked: true,
            lockout_ms,
            attempts_remaining: 0,
        }
    }

    /// Successful unlock clears the counter entirely.
    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.locked_until_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_under_the_cap_do_not_lock() {
        let mut limiter = RateLimiter::new();
        for _ in 0..MAX_ATTEMPTS {
            let result = limiter.record_failed(0);
            assert!(!result.is_locked);
        }
        assert!(!limiter.check_limit(0).is_limited);
    }

    #[test]
    fn exceeding_the_cap_locks_out_and_grows_monotonically() {
        let mut limiter = RateLimiter::new();
        for _ in 0..MAX_ATTEMPTS {
            limiter.record_failed(0);
        }
        let first = limiter.record_failed(0);
        assert!(first.is_locked);

        let second = limiter.record_failed(first.lockout_ms);
        assert!(second.lockout_ms > first.lockout_ms);
    }

    #[test]
    fn check_limit_reports_remaining_time() {
        let mut limiter = RateLimiter::new();
        for _ in 0..=MAX_ATTEMPTS {
            limiter.record_failed(1_000);
        }
        let check = limiter.check_limit(1_000);
        assert!(check.is_limited);
        assert_eq!(check.remaining_ms, BASE_LOCKOUT_MS);
    }

    #[test]
    fn success_clears_the_counter() {
        let mut limiter = RateLimiter::new();
        for _ in 0..=MAX_ATTEMPTS {
            limiter.record_failed(0);
        }
        limiter.record_success();
        assert!(!limiter.check_limit(0).is_limited);
        assert_eq!(limiter.attempts(), 0);
    }

    #[test]
    fn lockout_expires_after_its_window() {
        let mut limiter = RateLimiter::new();
        for _ in 0..=MAX_ATTEMPTS {
            limiter.record_failed(0);
        }
        let check = limiter.check_limit(BASE_LOCKOUT_MS + 1);
        assert!(!check.is_limited);
    }
}
