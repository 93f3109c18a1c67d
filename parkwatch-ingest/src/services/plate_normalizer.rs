//! Plate text canonicalization
//!
//! OCR output is noisy around spacing and hyphenation; this module maps raw
//! recognized text to one canonical representation per accepted format, or
//! rejects it. The modern `LL-NNN-LL` format is matched first because it is
//! the least ambiguous.

use regex::Regex;
use std::sync::LazyLock;

/// Modern format: two letters, three digits, two letters
static MODERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2})(\d{3})([A-Z]{2})$").expect("invalid plate pattern"));

/// Legacy format: 1-4 digits, 1-3 letters, 2 digits
static LEGACY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,4})([A-Z]{1,3})(\d{2})$").expect("invalid plate pattern"));

/// Temporary/export variant, same canonical shape as the legacy format
static TEMPORARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3,4})([A-Z]{1,3})(\d{2})$").expect("invalid plate pattern"));

/// Canonicalize raw recognized text, or reject it.
///
/// Strips whitespace and hyphens, uppercases, then tries the patterns in
/// order; the first match wins. `None` means the photo is quarantined with a
/// format-rejected reason (not fatal to the batch).
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if let Some(caps) = MODERN.captures(&cleaned) {
        return Some(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]));
    }

    if let Some(caps) = LEGACY.captures(&cleaned) {
        return Some(format!("{} {} {}", &caps[1], &caps[2], &caps[3]));
    }

    if let Some(caps) = TEMPORARY.captures(&cleaned) {
        return Some(format!("{} {} {}", &caps[1], &caps[2], &caps[3]));
    }

    None
}
