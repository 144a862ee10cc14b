//! Duration strings in the `1m30s` notation
//!
//! A duration is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
//! The bare string `0` is also accepted. Negative durations are rejected.

use std::time::Duration;

const NANOS_PER_UNIT: [(&str, u128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a duration string such as `"100ms"`, `"1.5h"` or `"1h2m3s"`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.starts_with('-') {
        return Err(format!("negative duration {:?}", input));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(format!("invalid duration {:?}", input));
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(format!("invalid duration {:?}", input));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit {:?} in duration {:?}", unit, input))?;

        total = total
            .checked_add(scaled(number, scale).ok_or_else(|| overflow(input))?)
            .ok_or_else(|| overflow(input))?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| overflow(input))?;
    Ok(Duration::from_nanos(nanos))
}

/// `number` (digits with an optional fraction) times `scale` nanoseconds
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    // digits past the scale's precision cannot contribute whole nanoseconds
    let mut divisor: u128 = 1;
    for digit in fraction.chars() {
        divisor = divisor.checked_mul(10)?;
        if divisor > scale {
            break;
        }
        let digit = u128::from(digit.to_digit(10)?);
        nanos = nanos.checked_add(digit * scale / divisor)?;
    }
    Some(nanos)
}

fn overflow(input: &str) -> String {
    format!("duration {:?} out of range", input)
}
