//! # Score Module
//!
//! Fixed-point numeric values for evidence and gate thresholds.
//!
//! - One unit is one millionth (`SCORE_SCALE`)
//! - Parsed from decimal text, percentages, integers and config floats
//! - No floating-point arithmetic anywhere: `0.80 >= 0.80` is exact
//!
//! Values finer than a millionth are rounded down (toward negative
//! infinity), which preserves the outcome of every `>=` comparison against
//! a threshold expressed in at most six decimals.

use crate::ProtogateError;
use crate::primitives::{SCORE_DECIMALS, SCORE_SCALE};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest decimal exponent accepted while parsing.
const MAX_EXPONENT: i64 = 64;

/// A fixed-point score in millionths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Score(i64);

impl Score {
    /// Zero.
    pub const ZERO: Score = Score(0);

    /// One (100%).
    pub const ONE: Score = Score(SCORE_SCALE);

    /// Create a score from a raw millionths value.
    #[must_use]
    pub const fn from_millionths(millionths: i64) -> Self {
        Self(millionths)
    }

    /// Get the raw millionths value.
    #[must_use]
    pub const fn millionths(self) -> i64 {
        self.0
    }

    /// Create a score from a whole number, saturating on overflow.
    #[must_use]
    pub const fn from_integer(value: i64) -> Self {
        Self(value.saturating_mul(SCORE_SCALE))
    }

    /// Create a score from a whole percentage (`80` -> `0.8`).
    #[must_use]
    pub const fn from_percent(percent: i64) -> Self {
        Self(percent.saturating_mul(SCORE_SCALE / 100))
    }

    /// Parse a score from text.
    ///
    /// Accepts `0.8`, `.8`, `+0.80`, `-1`, `8e-1`, `80%` and `80.5 %`.
    pub fn parse(raw: &str) -> Result<Self, ProtogateError> {
        let invalid = || ProtogateError::DeserializationError(format!("invalid score '{}'", raw));

        let mut text = raw.trim();
        let mut exponent: i64 = 0;

        if let Some(stripped) = text.strip_suffix('%') {
            text = stripped.trim_end();
            exponent -= 2;
        }

        let (negative, text) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exp_part) = match text.find(['e', 'E']) {
            Some(i) => (&text[..i], Some(&text[i + 1..])),
            None => (text, None),
        };

        if let Some(exp) = exp_part {
            let parsed: i64 = exp.parse().map_err(|_| invalid())?;
            if parsed.abs() > MAX_EXPONENT {
                return Err(invalid());
            }
            exponent += parsed;
        }

        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut digits: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            digits = digits
                .checked_mul(10)
                .and_then(|d| d.checked_add(i128::from(b - b'0')))
                .ok_or_else(invalid)?;
        }

        exponent = exponent
            .saturating_sub(frac_part.len() as i64)
            .saturating_add(i64::from(SCORE_DECIMALS));

        let magnitude = if exponent >= 0 {
            let factor = 10_i128.checked_pow(exponent as u32).ok_or_else(invalid)?;
            digits.checked_mul(factor).ok_or_else(invalid)?
        } else {
            match 10_i128.checked_pow(exponent.unsigned_abs() as u32) {
                Some(divisor) => {
                    let quotient = digits / divisor;
                    // round toward negative infinity
                    if negative && digits % divisor != 0 {
                        quotient + 1
                    } else {
                        quotient
                    }
                }
                None => i128::from(negative && digits != 0),
            }
        };

        let signed = if negative { -magnitude } else { magnitude };
        i64::try_from(signed).map(Self).map_err(|_| invalid())
    }
}

impl FromStr for Score {
    type Err = ProtogateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCORE_SCALE as u64;
        let whole = abs / scale;
        let frac = abs % scale;

        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }

        let frac_text = format!("{:0width$}", frac, width = SCORE_DECIMALS as usize);
        write!(f, "{}{}.{}", sign, whole, frac_text.trim_end_matches('0'))
    }
}

// =============================================================================
// SERDE
// =============================================================================

// Human-readable formats (JSON, TOML) carry scores as decimal text;
// binary formats (postcard) carry the raw millionths.

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ScoreVisitor)
        } else {
            i64::deserialize(deserializer).map(Score)
        }
    }
}

struct ScoreVisitor;

impl Visitor<'_> for ScoreVisitor {
    type Value = Score;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number, percentage or numeric string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Score, E> {
        Score::parse(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Score, E> {
        v.checked_mul(SCORE_SCALE)
            .map(Score)
            .ok_or_else(|| E::custom(format!("score {} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Score, E> {
        let signed =
            i64::try_from(v).map_err(|_| E::custom(format!("score {} out of range", v)))?;
        self.visit_i64(signed)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Score, E> {
        if !v.is_finite() {
            return Err(E::custom("score must be finite"));
        }
        // Display for f64 never uses exponent notation
        Score::parse(&v.to_string()).map_err(E::custom)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn score(s: &str) -> Score {
        Score::parse(s).expect("parse")
    }

    #[test]
    fn parses_decimal_forms() {
        assert_eq!(score("0.80").millionths(), 800_000);
        assert_eq!(score(".8").millionths(), 800_000);
        assert_eq!(score("+0.8").millionths(), 800_000);
        assert_eq!(score("1"), Score::ONE);
        assert_eq!(score("8e-1").millionths(), 800_000);
        assert_eq!(score("-0.25").millionths(), -250_000);
    }

    #[test]
    fn parses_percentages() {
        assert_eq!(score("80%"), score("0.8"));
        assert_eq!(score("80.5 %").millionths(), 805_000);
        assert_eq!(Score::from_percent(80), score("0.80"));
    }

    #[test]
    fn threshold_boundary_is_exact() {
        let threshold = score("0.80");
        assert!(score("0.80") >= threshold);
        assert!(score("0.8000") >= threshold);
        assert!(score("0.7999") < threshold);
    }

    #[test]
    fn sub_millionth_values_round_down() {
        assert_eq!(score("0.7999999").millionths(), 799_999);
        assert_eq!(score("-0.0000001").millionths(), -1);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", ".", "abc", "1.2.3", "0x10", "--1", "1e", "1e999", "%"] {
            assert!(Score::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(score("0.80").to_string(), "0.8");
        assert_eq!(score("12").to_string(), "12");
        assert_eq!(score("-0.125").to_string(), "-0.125");
        assert_eq!(Score::from_millionths(1).to_string(), "0.000001");
    }

    #[test]
    fn deserializes_json_numbers_and_strings() {
        let from_float: Score = serde_json::from_str("0.82").expect("float");
        let from_int: Score = serde_json::from_str("1").expect("int");
        let from_text: Score = serde_json::from_str("\"82%\"").expect("text");
        assert_eq!(from_float.millionths(), 820_000);
        assert_eq!(from_int, Score::ONE);
        assert_eq!(from_text, from_float);
    }

    #[test]
    fn binary_encoding_keeps_millionths() {
        let bytes = postcard::to_allocvec(&score("0.75")).expect("encode");
        let decoded: Score = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded.millionths(), 750_000);
    }
}
