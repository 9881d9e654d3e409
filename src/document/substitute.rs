//! Placeholder replacement across fragmented text runs.
//!
//! Editors split text into runs wherever formatting or revision data changes,
//! so a placeholder typed once may end up spread over several runs. Each
//! paragraph goes through two tiers:
//!
//! 1. targeted: occurrences lying entirely inside one run are replaced there,
//!    keeping that run's formatting;
//! 2. destructive: if some occurrence straddled a run boundary, the paragraph
//!    text is rebuilt with every occurrence replaced and written back as one
//!    plain run.

use super::model::{DocumentModel, ParagraphModel, TextRun};

/// What happened to one paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// The placeholder does not occur in the paragraph.
    Untouched,
    /// Every occurrence was replaced inside its run.
    InRuns,
    /// At least one occurrence spanned runs; the paragraph was rebuilt.
    Rebuilt,
}

/// Paragraph counts per replacement tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionStats {
    pub in_runs: usize,
    pub rebuilt: usize,
}

impl SubstitutionStats {
    fn record(&mut self, replacement: Replacement) {
        match replacement {
            Replacement::Untouched => {}
            Replacement::InRuns => self.in_runs += 1,
            Replacement::Rebuilt => self.rebuilt += 1,
        }
    }

    /// Number of paragraphs that contained the placeholder.
    pub fn paragraphs(&self) -> usize {
        self.in_runs + self.rebuilt
    }
}

/// Replace every occurrence of `placeholder` in one paragraph.
///
/// Occurrences are counted on the paragraph text before any edit, so a
/// replacement value that itself contains the placeholder is never expanded
/// twice.
pub fn replace_in_paragraph<P: ParagraphModel>(
    paragraph: &mut P,
    placeholder: &str,
    replacement: &str,
) -> Replacement {
    if placeholder.is_empty() {
        return Replacement::Untouched;
    }

    let original = paragraph.text();
    let expected = original.matches(placeholder).count();
    if expected == 0 {
        return Replacement::Untouched;
    }

    let mut replaced = 0;
    for run in paragraph.runs_mut() {
        let text = run.text();
        let found = text.matches(placeholder).count();
        if found > 0 {
            run.set_text(&text.replace(placeholder, replacement));
            replaced += found;
        }
    }

    if replaced >= expected {
        return Replacement::InRuns;
    }

    log::debug!(
        "Placeholder split across runs ({} of {} found in single runs), rebuilding paragraph",
        replaced,
        expected
    );
    paragraph.replace_content(&original.replace(placeholder, replacement));
    Replacement::Rebuilt
}

/// Replace `placeholder` in body paragraphs, then in every table cell.
pub fn replace_in_document<D: DocumentModel>(
    document: &mut D,
    placeholder: &str,
    replacement: &str,
) -> SubstitutionStats {
    let mut stats = SubstitutionStats::default();

    for paragraph in document.paragraphs_mut() {
        stats.record(replace_in_paragraph(paragraph, placeholder, replacement));
    }

    for table in document.tables_mut() {
        for paragraph in table.paragraphs_mut() {
            stats.record(replace_in_paragraph(paragraph, placeholder, replacement));
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Run {
        text: String,
        bold: bool,
    }

    impl TextRun for Run {
        fn text(&self) -> String {
            self.text.clone()
        }

        fn set_text(&mut self, text: &str) {
            self.text = text.to_string();
        }
    }

    #[derive(Debug, Default)]
    struct Paragraph {
        runs: Vec<Run>,
    }

    impl Paragraph {
        fn of(parts: &[(&str, bool)]) -> Self {
            Self {
                runs: parts
                    .iter()
                    .map(|(text, bold)| Run {
                        text: text.to_string(),
                        bold: *bold,
                    })
                    .collect(),
            }
        }
    }

    impl ParagraphModel for Paragraph {
        type Run = Run;

        fn runs(&self) -> &[Run] {
            &self.runs
        }

        fn runs_mut(&mut self) -> &mut [Run] {
            &mut self.runs
        }

        fn replace_content(&mut self, text: &str) {
            self.runs = vec![Run {
                text: text.to_string(),
                bold: false,
            }];
        }
    }

    #[test]
    fn test_replace_within_single_run_keeps_formatting() {
        let mut p = Paragraph::of(&[("Bonjour ", false), ("{{VENDEUR}}", true), (",", false)]);

        let result = replace_in_paragraph(&mut p, "{{VENDEUR}}", "Alice");

        assert_eq!(result, Replacement::InRuns);
        assert_eq!(p.text(), "Bonjour Alice,");
        assert_eq!(p.runs.len(), 3);
        assert!(p.runs[1].bold);
    }

    #[test]
    fn test_replace_split_placeholder_rebuilds() {
        let mut p = Paragraph::of(&[("Hello {{VEN", false), ("DEUR}}", true), (" world", false)]);

        let result = replace_in_paragraph(&mut p, "{{VENDEUR}}", "John Doe");

        assert_eq!(result, Replacement::Rebuilt);
        assert_eq!(p.text(), "Hello John Doe world");
        assert_eq!(p.runs.len(), 1);
    }

    #[test]
    fn test_mixed_occurrences_all_replaced() {
        let mut p = Paragraph::of(&[("{{VENDEUR}} et {{VEN", false), ("DEUR}}", false)]);

        replace_in_paragraph(&mut p, "{{VENDEUR}}", "X");

        assert_eq!(p.text(), "X et X");
    }

    #[test]
    fn test_replacement_containing_placeholder_not_expanded_twice() {
        let mut p = Paragraph::of(&[("A {{VENDEUR}} B", false)]);

        let result = replace_in_paragraph(&mut p, "{{VENDEUR}}", "[{{VENDEUR}}]");

        assert_eq!(result, Replacement::InRuns);
        assert_eq!(p.text(), "A [{{VENDEUR}}] B");
    }

    #[test]
    fn test_untouched_without_placeholder() {
        let mut p = Paragraph::of(&[("Rien à remplacer", true)]);
        assert_eq!(
            replace_in_paragraph(&mut p, "{{VENDEUR}}", "X"),
            Replacement::Untouched
        );
        assert!(p.runs[0].bold);
    }

    #[test]
    fn test_empty_placeholder_is_ignored() {
        let mut p = Paragraph::of(&[("abc", false)]);
        assert_eq!(replace_in_paragraph(&mut p, "", "X"), Replacement::Untouched);
        assert_eq!(p.text(), "abc");
    }
}
