//! Fee policy (C3): sats/byte rate selection, tx-size estimation, and
//! max-send coin accumulation.
//!
//! The rate cache follows the same shape as `ln-dlc-node`'s
//! `FeeRateEstimator`: an `RwLock`-guarded value refreshed from a network
//! quote, with a fallback default when the network hasn't been consulted
//! (or its quote has gone stale).

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Floor below which a quoted or user-set fee rate is clamped.
pub const MIN_FEE_RATE: f64 = 0.5;
/// Ceiling above which a quoted or user-set fee rate is clamped.
pub const MAX_FEE_RATE: f64 = 1000.0;
/// Rate used when there is no override and no fresh network quote.
const DEFAULT_FEE_RATE: f64 = 1.0;
/// A cached network quote older than this is treated as absent.
const QUOTE_TTL: Duration = Duration::from_secs(5 * 60);

const INPUT_VBYTES: u64 = 148;
const OUTPUT_VBYTES: u64 = 34;
const HEADER_VBYTES: u64 = 10;

struct CachedQuote {
    sats_per_byte: f64,
    fetched_at: Instant,
}

/// Holds the user's fee-rate override (if any) and the last network quote.
/// One instance is shared per process; callers needn't synchronize beyond
/// what's built in.
pub struct FeePolicy {
    user_override: RwLock<Option<f64>>,
    cached_quote: RwLock<Option<CachedQuote>>,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            user_override: RwLock::new(None),
            cached_quote: RwLock::new(None),
        }
    }
}

impl FeePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_override(&self, sats_per_byte: Option<f64>) {
        *self.user_override.write().unwrap() = sats_per_byte.map(clamp);
    }

    pub fn set_network_quote(&self, sats_per_byte: f64) {
        *self.cached_quote.write().unwrap() = Some(CachedQuote {
            sats_per_byte: clamp(sats_per_byte),
            fetched_at: Instant::now(),
        });
    }

    /// Explicit override, else a network quote fresher than [`QUOTE_TTL`],
    /// else [`DEFAULT_FEE_RATE`] — always clamped to `[MIN_FEE_RATE,
    /// MAX_FEE_RATE]`.
    pub fn rate(&self) -> f64 {
        if let Some(rate) = *self.user_override.read().unwrap() {
            return rate;
        }

        if let Some(quote) = self.cached_quote.read().unwrap().as_ref() {
            if quote.fetched_at.elapsed() < QUOTE_TTL {
                return quote.sats_per_byte;
            }
        }

        clamp(DEFAULT_FEE_RATE)
    }

    pub fn calculate_tx_fee(&self, n_in: u64, n_out: u64, extra_bytes: u64) -> u64 {
        let vsize = HEADER_VBYTES + n_in * INPUT_VBYTES + n_out * OUTPUT_VBYTES + extra_bytes;
        (vsize as f64 * self.rate()).ceil() as u64
    }

    /// Like [`Self::calculate_tx_fee`] but with the actual timelock script
    /// size substituted for a standard P2PKH output.
    pub fn calculate_lock_fee(&self, n_in: u64, lock_script_size: u64) -> u64 {
        let vsize = HEADER_VBYTES + n_in * INPUT_VBYTES + lock_script_size;
        (vsize as f64 * self.rate()).ceil() as u64
    }

    /// Sorts `utxo_values` ascending and accumulates until the marginal fee
    /// of including one more input would exceed its value. BSV has no dust
    /// limit, so the only bound is this break-even point.
    pub fn calculate_max_send(&self, utxo_values: &[u64]) -> u64 {
        let mut sorted = utxo_values.to_vec();
        sorted.sort_unstable();

        let marginal_fee = (INPUT_VBYTES as f64 * self.rate()).ceil() as u64;

        let mut total = 0u64;
        for value in sorted {
            if value <= marginal_fee {
                break;
            }
            total += value;
        }

        let base_fee = self.calculate_tx_fee(0, 2, 0);
        total.saturating_sub(base_fee)
    }
}

fn clamp(rate: f64) -> f64 {
    rate.clamp(MIN_FEE_RATE, MAX_FEE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_one_sat_per_byte() {
        let policy = FeePolicy::new();
        assert_eq!(policy.rate(), 1.0);
    }

    #[test]
    fn user_override_takes_precedence_over_quote() {
        let policy = FeePolicy::new();
        policy.set_network_quote(5.0);
        policy.set_user_override(Some(2.0));
        assert_eq!(policy.rate(), 2.0);
    }

    #[test]
    fn quote_is_clamped() {
        let policy = FeePolicy::new();
        policy.set_network_quote(10_000.0);
        assert_eq!(policy.rate(), MAX_FEE_RATE);
    }

    #[test]
    fn calculate_tx_fee_matches_vsize_table() {
        let policy = FeePolicy::new();
        let fee = policy.calculate_tx_fee(2, 2, 0);
        // 10 header + 2*148 input + 2*34 output = 374 vbytes @ 1 sat/byte
        assert_eq!(fee, 374);
    }

    #[test]
    fn max_send_excludes_uneconomical_inputs() {
        let policy = FeePolicy::new();
        let values = vec![100, 50_000, 100_000];
        let max = policy.calculate_max_send(&values);
        assert!(max > 0);
        assert!(max < 150_100);
    }
}
