//! Upload decoding: raw bytes plus a format hint to issue records.
//!
//! Three textual formats are supported. Tabular input maps columns by
//! header name, case-insensitively and with common aliases, so exports
//! from different trackers decode without per-tool configuration.
use triage_core::contract::{FileKind, IssueRecord};
use triage_core::traits::{NormalizeError, RecordSource};

const ID_ALIASES: &[&str] = &["id", "issue_id", "key"];
const TITLE_ALIASES: &[&str] = &["title", "summary", "name"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "details", "desc"];
const REPRO_ALIASES: &[&str] = &["repro_steps", "steps", "reproduction"];
const SEVERITY_ALIASES: &[&str] = &["severity", "priority"];

pub struct FileDecoder;

impl RecordSource for FileDecoder {
    fn normalize(&self, bytes: &[u8], kind: FileKind) -> Result<Vec<IssueRecord>, NormalizeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| NormalizeError::Malformed(format!("upload is not UTF-8: {e}")))?;
        match kind {
            FileKind::Tabular => decode_tabular(text),
            FileKind::MarkdownTable => decode_markdown(text),
            FileKind::PlainText => Ok(decode_plain(text)),
        }
    }
}

/// Positions of the known columns in a header row.
struct ColumnMap {
    id: usize,
    title: usize,
    description: usize,
    repro_steps: Option<usize>,
    severity: Option<usize>,
}

impl ColumnMap {
    fn from_header(cells: &[String]) -> Result<Self, NormalizeError> {
        let find = |aliases: &[&str]| {
            cells
                .iter()
                .position(|c| aliases.contains(&c.trim().to_ascii_lowercase().as_str()))
        };
        let required = |aliases: &[&str], field: &str| {
            find(aliases).ok_or_else(|| NormalizeError::MissingField {
                field: field.to_string(),
                row: 1,
            })
        };
        Ok(Self {
            id: required(ID_ALIASES, "id")?,
            title: required(TITLE_ALIASES, "title")?,
            description: required(DESCRIPTION_ALIASES, "description")?,
            repro_steps: find(REPRO_ALIASES),
            severity: find(SEVERITY_ALIASES),
        })
    }

    fn record(&self, cells: &[String], row: usize) -> Result<IssueRecord, NormalizeError> {
        let cell = |index: usize| cells.get(index).map(|c| c.trim().to_string());
        let required = |index: usize, field: &str| {
            cell(index)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| NormalizeError::MissingField {
                    field: field.to_string(),
                    row,
                })
        };
        Ok(IssueRecord {
            id: required(self.id, "id")?,
            title: required(self.title, "title")?,
            description: required(self.description, "description")?,
            repro_steps: self.repro_steps.and_then(cell).unwrap_or_default(),
            severity: self.severity.and_then(cell).unwrap_or_default(),
        })
    }
}

/// Split one delimited row, honoring double-quoted cells.
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => {
                cells.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn decode_tabular(text: &str) -> Result<Vec<IssueRecord>, NormalizeError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| NormalizeError::Malformed("empty tabular upload".to_string()))?;
    let delimiter = if header.contains('\t') { '\t' } else { ',' };

    let columns = ColumnMap::from_header(&split_row(header, delimiter))?;
    let mut records = Vec::new();
    for (offset, line) in lines.enumerate() {
        let cells = split_row(line, delimiter);
        records.push(columns.record(&cells, offset + 2)?);
    }
    Ok(records)
}

fn decode_markdown(text: &str) -> Result<Vec<IssueRecord>, NormalizeError> {
    let mut rows = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('|'))
        .map(|l| {
            l.trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect::<Vec<_>>()
        });

    let header = rows
        .next()
        .ok_or_else(|| NormalizeError::Malformed("no table rows in markdown upload".to_string()))?;
    let columns = ColumnMap::from_header(&header)?;

    let mut records = Vec::new();
    for (offset, cells) in rows.enumerate() {
        // the |---|---| separator row
        if cells.iter().all(|c| c.chars().all(|ch| ch == '-' || ch == ':') && !c.is_empty()) {
            continue;
        }
        records.push(columns.record(&cells, offset + 2)?);
    }
    Ok(records)
}

fn decode_plain(text: &str) -> Vec<IssueRecord> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(index, line)| IssueRecord {
            id: format!("line-{}", index + 1),
            title: line.to_string(),
            description: line.to_string(),
            repro_steps: String::new(),
            severity: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_with_aliased_headers_and_quoted_commas() {
        let csv = "Key,Summary,Details,Steps,Priority\n\
                   QA-1,\"Totals, off by one\",Export disagrees,Open export,high\n\
                   QA-2,Login slow,Takes 30s,,low\n";
        let records = FileDecoder.normalize(csv.as_bytes(), FileKind::Tabular).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "QA-1");
        assert_eq!(records[0].title, "Totals, off by one");
        assert_eq!(records[0].repro_steps, "Open export");
        assert_eq!(records[1].severity, "low");
        assert_eq!(records[1].repro_steps, "");
    }

    #[test]
    fn test_tsv_is_detected_from_the_header() {
        let tsv = "id\ttitle\tdescription\n1\tslow page\tloads forever\n";
        let records = FileDecoder.normalize(tsv.as_bytes(), FileKind::Tabular).unwrap();
        assert_eq!(records[0].title, "slow page");
    }

    #[test]
    fn test_missing_required_column_names_the_field() {
        let csv = "id,description\n1,no title column\n";
        let error = FileDecoder
            .normalize(csv.as_bytes(), FileKind::Tabular)
            .unwrap_err();
        match error {
            NormalizeError::MissingField { field, .. } => assert_eq!(field, "title"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_required_cell_names_the_row() {
        let csv = "id,title,description\n1,ok,fine\n2,,missing title\n";
        let error = FileDecoder
            .normalize(csv.as_bytes(), FileKind::Tabular)
            .unwrap_err();
        match error {
            NormalizeError::MissingField { field, row } => {
                assert_eq!(field, "title");
                assert_eq!(row, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_markdown_pipe_table() {
        let md = "Weekly issues:\n\n\
                  | id | title | description |\n\
                  |----|-------|-------------|\n\
                  | 1  | wrong total | export off |\n\
                  | 2  | crash | on save |\n";
        let records = FileDecoder
            .normalize(md.as_bytes(), FileKind::MarkdownTable)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title, "crash");
    }

    #[test]
    fn test_plain_text_generates_line_ids() {
        let txt = "checkout button greyed out\n\nwrong tax on invoices\n";
        let records = FileDecoder
            .normalize(txt.as_bytes(), FileKind::PlainText)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "line-1");
        assert_eq!(records[1].id, "line-2");
        assert_eq!(records[1].title, "wrong tax on invoices");
    }
}
