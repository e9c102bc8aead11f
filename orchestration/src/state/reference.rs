//! Human-readable concern reference numbers.
//!
//! Format: `CNR<year><month><seq>` with a 4-digit zero-padded sequence that
//! resets at each month boundary and is strictly monotonic within a month.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::sync::{Mutex, OnceLock};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^CNR(\d{4})(0[1-9]|1[0-2])(\d{4,})$").expect("reference pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequenceState {
    year: i32,
    month: u32,
    seq: u32,
}

/// Generates monthly-resetting, monotonic concern references.
pub struct ReferenceGenerator {
    state: Mutex<Option<SequenceState>>,
}

impl ReferenceGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Resume from the highest previously issued reference, if any.
    ///
    /// Lets a restarted orchestrator continue the current month's sequence
    /// without gaps or repeats.
    pub fn resuming_from(reference: &str) -> Self {
        let state = Self::parse(reference).map(|(year, month, seq)| SequenceState {
            year,
            month,
            seq,
        });
        Self {
            state: Mutex::new(state),
        }
    }

    /// Issue the next reference for the month containing `now`.
    pub fn next(&self, now: DateTime<Utc>) -> String {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let (year, month) = (now.year(), now.month());
        let seq = match *guard {
            Some(state) if state.year == year && state.month == month => state.seq + 1,
            _ => 1,
        };
        *guard = Some(SequenceState { year, month, seq });

        format!("CNR{year:04}{month:02}{seq:04}")
    }

    /// Whether `reference` is a well-formed concern reference.
    pub fn is_valid(reference: &str) -> bool {
        reference_pattern().is_match(reference)
    }

    /// Split a reference into (year, month, sequence).
    pub fn parse(reference: &str) -> Option<(i32, u32, u32)> {
        let caps = reference_pattern().captures(reference)?;
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let seq = caps.get(3)?.as_str().parse().ok()?;
        Some((year, month, seq))
    }
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_sequence_is_monotonic_within_month() {
        let generator = ReferenceGenerator::new();
        let refs: Vec<String> = (0..5).map(|_| generator.next(at(2024, 5, 10))).collect();

        assert_eq!(refs[0], "CNR2024050001");
        assert_eq!(refs[4], "CNR2024050005");
        for pair in refs.windows(2) {
            let (_, _, a) = ReferenceGenerator::parse(&pair[0]).unwrap();
            let (_, _, b) = ReferenceGenerator::parse(&pair[1]).unwrap();
            assert_eq!(b, a + 1, "no gaps or repeats");
        }
    }

    #[test]
    fn test_sequence_resets_on_month_change() {
        let generator = ReferenceGenerator::new();
        generator.next(at(2024, 5, 28));
        generator.next(at(2024, 5, 30));
        let first_of_june = generator.next(at(2024, 6, 1));
        assert_eq!(first_of_june, "CNR2024060001");
    }

    #[test]
    fn test_sequence_resets_on_year_change() {
        let generator = ReferenceGenerator::new();
        generator.next(at(2024, 12, 31));
        let january = generator.next(at(2025, 1, 1));
        assert_eq!(january, "CNR2025010001");
    }

    #[test]
    fn test_resuming_continues_sequence() {
        let generator = ReferenceGenerator::resuming_from("CNR2024050017");
        assert_eq!(generator.next(at(2024, 5, 20)), "CNR2024050018");
    }

    #[test]
    fn test_validation() {
        assert!(ReferenceGenerator::is_valid("CNR2024050001"));
        assert!(ReferenceGenerator::is_valid("CNR2024120042"));
        assert!(!ReferenceGenerator::is_valid("CNR2024130001"), "month 13");
        assert!(!ReferenceGenerator::is_valid("CNR202405001"), "short seq");
        assert!(!ReferenceGenerator::is_valid("TKT2024050001"), "prefix");
        assert!(!ReferenceGenerator::is_valid(""));
    }

    #[test]
    fn test_parse_round_trip() {
        let generator = ReferenceGenerator::new();
        let reference = generator.next(at(2024, 7, 4));
        assert_eq!(ReferenceGenerator::parse(&reference), Some((2024, 7, 1)));
    }
}
