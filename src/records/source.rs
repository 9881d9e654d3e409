//! CSV input table parsing.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::path::Path;

use super::encoding::decode_text;
use super::{Record, RecordSet, SourceError};

const NAME_COLUMN: &str = "nom";
const EMAIL_COLUMN: &str = "email";

/// Read the input table at `path`.
///
/// Rows whose trimmed name is empty are dropped without being reported; they
/// still count in [`RecordSet::total_rows`].
pub fn read_records(path: &Path) -> Result<RecordSet, SourceError> {
    let bytes = fs::read(path).map_err(|source| {
        log::error!("Input table not found: {} ({})", path.display(), source);
        SourceError::MissingInput {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(parse_records(&decode_text(&bytes)))
}

/// Parse already-decoded table text.
pub fn parse_records(text: &str) -> RecordSet {
    let delimiter = sniff_delimiter(text);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            log::error!("Failed to read input table header: {}", e);
            return RecordSet::default();
        }
    };

    let Some(name_column) = column_index(&headers, NAME_COLUMN) else {
        log::error!("Input table has no '{}' column", NAME_COLUMN);
        return RecordSet::default();
    };
    let email_column = column_index(&headers, EMAIL_COLUMN);

    let mut set = RecordSet::default();
    for result in reader.records() {
        set.total_rows += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                match e.position() {
                    Some(position) => {
                        log::warn!("Skipping unreadable row at line {}: {}", position.line(), e)
                    }
                    None => log::warn!("Skipping unreadable row: {}", e),
                }
                continue;
            }
        };

        let name = row.get(name_column).unwrap_or_default().trim();
        if name.is_empty() {
            // quoted fields may span lines
            let line = row.position().map(|position| position.line()).unwrap_or_default();
            log::debug!("Dropping row at line {}: empty name", line);
            set.dropped_lines.push(line);
            continue;
        }

        let email = email_column
            .and_then(|column| row.get(column))
            .unwrap_or_default()
            .trim();

        set.records.push(Record::new(name, email));
    }

    log::debug!(
        "Parsed {} record(s) out of {} row(s)",
        set.records.len(),
        set.total_rows
    );
    set
}

fn column_index(headers: &StringRecord, column: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(column))
}

/// Spreadsheet exports in French locales separate columns with `;`.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("nom;email\nA;a@b.fr"), b';');
        assert_eq!(sniff_delimiter("nom,email\nA,a@b.fr"), b',');
        assert_eq!(sniff_delimiter("nom\nA"), b',');
    }

    #[test]
    fn test_missing_email_column() {
        let set = parse_records("nom\nAlice\nBob\n");
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|record| record.email.is_empty()));
    }

    #[test]
    fn test_dropped_lines_follow_multiline_fields() {
        let set = parse_records(concat!(
            "nom,email,adresse\n",
            "Alice,alice@example.com,\"1 rue Haute\n75001 Paris\"\n",
            ",x@example.com,\n",
            "Bruno,,\n",
            " ,,\n",
        ));

        assert_eq!(set.total_rows, 4);
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[0].name, "Alice");
        assert_eq!(set.dropped_lines, vec![4, 6]);
    }

    #[test]
    fn test_missing_name_column() {
        let set = parse_records("email\nalice@example.com\n");
        assert!(set.is_empty());
    }
}
