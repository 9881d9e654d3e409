//! Common utilities for generated files.
//!
//! Shared helpers for output naming and date formatting.

use chrono::{Local, NaiveDate};

const NAME_FALLBACK: &str = "document";

/// Format a date as `dd/mm/YYYY` (e.g., "19/10/2026").
pub fn format_submission_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Today's date in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Sanitize a display name for use in filenames.
///
/// Keeps letters, digits, spaces, `-` and `_`, trims, then turns each space
/// into `_`.
pub fn safe_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();

    let result = kept.trim().replace(' ', "_");
    if result.is_empty() {
        return NAME_FALLBACK.to_string();
    }
    result
}

/// Sanitize an email address for use as a filename suffix.
pub fn safe_email_for_filename(email: &str) -> String {
    email
        .replace('@', "_at_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// File stem of a generated document, e.g. `01_Alice_Dupont`.
pub fn document_stem(name: &str, sequence: Option<usize>) -> String {
    match sequence {
        Some(sequence) => format!("{:02}_{}", sequence, safe_filename(name)),
        None => safe_filename(name),
    }
}
