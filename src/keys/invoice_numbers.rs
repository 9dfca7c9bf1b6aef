//! Deterministic invoice-number candidate generation used to scan for
//! BRC-42-derived receive addresses (spec.md §4.1).
//!
//! The candidate set is a pure function of the current date; per
//! spec.md §9 it must never leak into global state, so callers pass
//! `today` in explicitly rather than this module reading the clock.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use time::{Date, Duration};

/// Output-index suffixes considered for each day in the BRC-29 lookback
/// window. BRC-29 wallets address multiple possible payment outputs per
/// day; five covers the common case without an unbounded scan.
const BRC29_SUFFIXES: &[&str] = &["1", "2", "3", "4", "5"];

/// Number of days of BRC-29 history to scan, per spec.md §4.1.
const BRC29_LOOKBACK_DAYS: i64 = 30;

/// Numeric invoice numbers `"0"` through `"20"` inclusive.
const NUMERIC_UPPER_BOUND: u32 = 20;

/// A small BRC-43 `securityLevel-protocol keyID` grid covering the
/// protocols this wallet itself uses for tagged keys.
const BRC43_PROTOCOL_GRID: &[(&str, &str)] = &[
    ("1-simplysats", "1"),
    ("2-simplysats", "1"),
    ("1-identity", "1"),
];

/// Builds the canonical, finite, deterministic list of invoice-number
/// candidates used when scanning for derived addresses as of `today`.
pub fn generate_invoice_numbers(today: Date) -> Vec<String> {
    let mut candidates = Vec::new();

    for days_ago in 0..BRC29_LOOKBACK_DAYS {
        let date = today - Duration::days(days_ago);
        let date_str = format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        );
        let encoded_date = BASE64.encode(date_str.as_bytes());

        for suffix in BRC29_SUFFIXES {
            let encoded_suffix = BASE64.encode(suffix.as_bytes());
            candidates.push(format!("{encoded_date} {encoded_suffix}"));
        }
    }

    for n in 0..=NUMERIC_UPPER_BOUND {
        candidates.push(n.to_string());
    }

    for (protocol, key_id) in BRC43_PROTOCOL_GRID {
        candidates.push(format!("{protocol} {key_id}"));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic_given_the_same_date() {
        let today = Date::from_calendar_date(2024, time::Month::March, 15).unwrap();
        assert_eq!(generate_invoice_numbers(today), generate_invoice_numbers(today));
    }

    #[test]
    fn includes_the_numeric_grid() {
        let today = Date::from_calendar_date(2024, time::Month::March, 15).unwrap();
        let candidates = generate_invoice_numbers(today);
        assert!(candidates.contains(&"0".to_string()));
        assert!(candidates.contains(&"20".to_string()));
        assert!(!candidates.contains(&"21".to_string()));
    }

    #[test]
    fn covers_thirty_days_of_brc29_prefixes() {
        let today = Date::from_calendar_date(2024, time::Month::March, 15).unwrap();
        let candidates = generate_invoice_numbers(today);
        let brc29_count = BRC29_LOOKBACK_DAYS as usize * BRC29_SUFFIXES.len();
        let numeric_count = (NUMERIC_UPPER_BOUND + 1) as usize;
        let brc43_count = BRC43_PROTOCOL_GRID.len();
        assert_eq!(candidates.len(), brc29_count + numeric_count + brc43_count);
    }
}
