//! Input validation for merge runs.
//!
//! Template checks are hard failures. Record checks are advisory: they produce
//! clear, user-facing messages that the pipeline logs as warnings.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::Path;

use crate::error::MergeError;
use crate::records::Record;

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex");
}

const TEMPLATE_EXTENSION: &str = "docx";

/// Trait for validating input objects.
pub trait Validator {
    /// Validate the state of the object.
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Validation error with a user-facing message.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation, e.g. `ligne 3 / email`
    pub field: String,
    /// Human-readable error message in French
    pub message: String,
    /// Suggestion for how to fix the error
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create error for a blank name
    pub fn missing_name(line: usize) -> Self {
        Self::new(
            format!("ligne {}", line),
            format!("Ligne {}: nom manquant ou invalide", line),
        )
        .with_suggestion("Renseignez la colonne 'nom'")
    }

    /// Create error for a malformed email address
    pub fn invalid_email(line: usize, email: &str) -> Self {
        Self::new(
            format!("ligne {}", line),
            format!("Ligne {}: email invalide '{}'", line, email),
        )
        .with_suggestion("Utilisez le format nom@domaine.com")
    }

    /// Create error for an input table without any usable row
    pub fn no_records() -> Self {
        Self::new("csv", "Aucune donnée trouvée dans le CSV")
            .with_suggestion("Vérifiez la présence de la colonne 'nom'")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Get a formatted report of every error, one per line.
    pub fn to_report(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }

        let mut parts = vec![format!(
            "Validation échouée: {} erreur(s)",
            self.errors.len()
        )];
        for (i, error) in self.errors.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, error));
        }
        parts.join("\n")
    }

    /// Convert to Result - Ok if no errors, Err with the collection otherwise
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_report())
    }
}

// ============================================================================
// Validation functions
// ============================================================================

/// Check an email address against the accepted pattern. Empty is invalid.
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && EMAIL_PATTERN.is_match(email)
}

/// Check that a name is not blank.
pub fn validate_name(name: &str) -> bool {
    !name.trim().is_empty()
}

/// Check that the template exists and is a DOCX document.
pub fn validate_template(path: &Path) -> Result<(), MergeError> {
    if !path.exists() {
        return Err(MergeError::TemplateNotFound(path.to_path_buf()));
    }

    let is_docx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TEMPLATE_EXTENSION));
    if !is_docx {
        return Err(MergeError::InvalidTemplate(path.to_path_buf()));
    }

    Ok(())
}

/// Validate every record, numbering lines from 1.
///
/// An empty email is allowed; a present but malformed one is reported.
pub fn validate_records(records: &[Record]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if records.is_empty() {
        errors.add(ValidationError::no_records());
        return errors;
    }

    for (i, record) in records.iter().enumerate() {
        let line = i + 1;
        if !validate_name(&record.name) {
            errors.add(ValidationError::missing_name(line));
        }

        let email = record.email.trim();
        if !email.is_empty() && !validate_email(email) {
            errors.add(ValidationError::invalid_email(line, email));
        }
    }

    errors
}

impl Validator for [Record] {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_records(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_suggestion() {
        let error = ValidationError::invalid_email(2, "foo");
        assert_eq!(
            error.to_string(),
            "Ligne 2: email invalide 'foo'. Utilisez le format nom@domaine.com"
        );
    }

    #[test]
    fn test_report_numbers_errors() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::missing_name(1));
        errors.add(ValidationError::invalid_email(2, "x"));

        let report = errors.to_report();
        assert!(report.contains("2 erreur(s)"));
        assert!(report.contains("1. Ligne 1: nom manquant"));
        assert!(report.contains("2. Ligne 2: email invalide 'x'"));
    }

    #[test]
    fn test_slice_validator() {
        let records = vec![Record::new("Bob Wilson", "")];
        assert!(records.as_slice().validate().is_ok());
    }
}
