//! Exact comparison of Slack timestamp strings.
//!
//! Slack timestamps are fixed-point decimal strings like `"1727000000.000100"`.
//! They must never be compared through a float parse: rounding at the margin
//! could break the strict greater-than filter that keeps incremental sync from
//! re-indexing the boundary message. This module compares the integer and
//! fractional parts digit-by-digit instead.

use std::cmp::Ordering;

/// Compare two ordering keys as exact fixed-point decimals.
///
/// Non-numeric input degrades gracefully: an empty or malformed integer part
/// compares as zero, which keeps the comparison total. An absent fractional
/// part is treated as all zeros (`"17.5" > "17"`, `"17.0" == "17"`).
pub fn cmp_ts(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = split_fixed_point(a);
    let (b_int, b_frac) = split_fixed_point(b);

    match cmp_integer(a_int, b_int) {
        Ordering::Equal => cmp_fraction(a_frac, b_frac),
        other => other,
    }
}

fn split_fixed_point(s: &str) -> (&str, &str) {
    match s.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (s, ""),
    }
}

/// Compare integer parts numerically: strip leading zeros, then a longer
/// digit string is larger, then fall back to lexicographic order.
fn cmp_integer(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare fractional parts digit-by-digit, treating missing digits as zero.
fn cmp_fraction(a: &str, b: &str) -> Ordering {
    let len = a.len().max(b.len());
    let mut a_digits = a.bytes().chain(std::iter::repeat(b'0'));
    let mut b_digits = b.bytes().chain(std::iter::repeat(b'0'));
    for _ in 0..len {
        let (da, db) = (a_digits.next().unwrap(), b_digits.next().unwrap());
        match da.cmp(&db) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// The larger of two ordering keys under [`cmp_ts`].
pub fn max_ts<'a>(a: &'a str, b: &'a str) -> &'a str {
    if cmp_ts(b, a) == Ordering::Greater {
        b
    } else {
        a
    }
}
