//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Protogate CORE.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Fixed-point scale for scores: one unit is one millionth.
///
/// `0.80` is stored as `800_000`. All numeric evidence and thresholds use
/// this scale so comparisons are exact integer comparisons.
pub const SCORE_SCALE: i64 = 1_000_000;

/// Number of decimal digits represented by `SCORE_SCALE`.
pub const SCORE_DECIMALS: u32 = 6;

/// Maximum length for mode, protocol, artifact, gate and phase names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of modes visited while resolving one request.
///
/// - All resolutions must be computationally bounded.
/// - Fallback cycles are additionally cut by the visited set.
pub const MAX_FALLBACK_DEPTH: usize = 64;

/// Maximum number of criteria in a single gate.
pub const MAX_CRITERIA_PER_GATE: usize = 256;

/// Maximum size of a single artifact's content (16 MB).
///
/// Artifacts larger than this are rejected by every store.
pub const MAX_ARTIFACT_SIZE: usize = 16 * 1024 * 1024;

/// Separator between an artifact name and a field path in an evidence key.
///
/// `coverage.json:totals.line_pct` reads `totals.line_pct` from the JSON
/// artifact `coverage.json`.
pub const EVIDENCE_FIELD_SEPARATOR: char = ':';

/// Magic bytes for the exported execution record format.
pub const RECORD_MAGIC: [u8; 4] = *b"PGRX";

/// Current record export format version.
///
/// Increment this when making breaking changes to the record format.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Maximum number of phase entries accepted when importing a record.
pub const MAX_IMPORT_PHASES: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_scale_matches_decimals() {
        assert_eq!(SCORE_SCALE, 10_i64.pow(SCORE_DECIMALS));
    }

    #[test]
    fn record_magic_correct() {
        assert_eq!(&RECORD_MAGIC, b"PGRX");
    }
}
