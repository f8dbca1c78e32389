//! Delimited text extraction
//!
//! Detects the delimiter from the first line, then parses the whole file
//! into a single table.

use anyhow::{Context, Result};

use super::{ContentExtractor, ExtractedContent};

/// Delimiters tried during detection, in preference order
const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

pub struct CsvExtractor;

impl CsvExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Pick the candidate delimiter occurring most often in the first line
    /// (comma wins ties).
    fn detect_delimiter(bytes: &[u8]) -> u8 {
        let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or(b"");

        let mut best = b',';
        let mut best_count = 0;
        for &candidate in CANDIDATE_DELIMITERS {
            let count = first_line.iter().filter(|&&b| b == candidate).count();
            if count > best_count {
                best = candidate;
                best_count = count;
            }
        }
        best
    }
}

impl Default for CsvExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for CsvExtractor {
    fn extensions(&self) -> &[&str] {
        &[".csv", ".tsv"]
    }

    fn file_type(&self) -> &str {
        "csv"
    }

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedContent> {
        let delimiter = Self::detect_delimiter(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut table: Vec<Vec<String>> = Vec::new();
        for result in reader.records() {
            let record = result.with_context(|| format!("Failed to parse {filename}"))?;
            table.push(record.iter().map(str::to_string).collect());
        }

        let mut content = ExtractedContent::new(self.file_type());
        content.insert_meta("rows", table.len());
        content.insert_meta("columns", table.first().map(Vec::len).unwrap_or(0));
        content.insert_meta("delimiter", (delimiter as char).to_string());

        content.text = table
            .iter()
            .map(|row| row.join(&(delimiter as char).to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        if !table.is_empty() {
            content.tables.push(table);
        }
        Ok(content)
    }
}
