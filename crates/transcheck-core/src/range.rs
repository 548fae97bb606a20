//! Natural-language range parsing for metadata values.
//!
//! Authors write ranges loosely: `80-120`, `3 to 5`, `above 50`, `up to 30`,
//! or a bare number. Parsing is total: malformed text yields `None` and the
//! caller reports it.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound used for open-ended ranges ("above 50").
pub const UPPER_SENTINEL: u64 = 999_999;

const LOWER_BOUND_MARKERS: [&str; 4] = ["above", "over", ">", "min"];
const UPPER_BOUND_MARKERS: [&str; 5] = ["up to", "below", "under", "<", "max"];

lazy_static! {
    static ref NUMBER_PATTERN: Regex = Regex::new(r"\d+").unwrap();
    static ref SPAN_PATTERN: Regex = Regex::new(r"(\d+)\s*(?:-|–|to)\s*(\d+)").unwrap();
}

/// A closed interval `[min, max]`.
///
/// `min <= max` is not enforced: an author who writes `120-80` gets an
/// interval nothing falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: u64,
    pub max: u64,
}

impl Range {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Parse a range from free text.
///
/// Rules, in priority order (case-insensitive, commas stripped):
/// 1. a lower-bound marker plus a number `k` gives `(k, UPPER_SENTINEL)`
/// 2. an upper-bound marker plus a number `k` gives `(0, k)`
/// 3. `a-b`, `a–b` or `a to b` gives `(a, b)` as written
/// 4. otherwise one number is an exact match, two or more take the first two
pub fn parse_range(text: &str) -> Option<Range> {
    if text.is_empty() {
        return None;
    }

    let clean = text.to_lowercase().replace(',', "");
    let numbers = numbers(&clean);

    if LOWER_BOUND_MARKERS.iter().any(|m| clean.contains(m)) {
        if let Some(&k) = numbers.first() {
            return Some(Range::new(k, UPPER_SENTINEL));
        }
    }

    if UPPER_BOUND_MARKERS.iter().any(|m| clean.contains(m)) {
        if let Some(&k) = numbers.first() {
            return Some(Range::new(0, k));
        }
    }

    if let Some(caps) = SPAN_PATTERN.captures(&clean) {
        if let (Ok(min), Ok(max)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) {
            return Some(Range::new(min, max));
        }
    }

    match numbers.as_slice() {
        [] => None,
        [k] => Some(Range::new(*k, *k)),
        [first, second, ..] => Some(Range::new(*first, *second)),
    }
}

/// Every embedded integer that fits in 64 bits, in order of appearance.
fn numbers(text: &str) -> Vec<u64> {
    NUMBER_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}
