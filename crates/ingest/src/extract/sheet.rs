//! Spreadsheet extraction via calamine
//!
//! Each worksheet becomes one table (rows of stringified cells) plus a
//! plain-text rendering, mirroring what downstream consumers expect from
//! tabular attachments.

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::io::Cursor;

use super::{ContentExtractor, ExtractedContent};

pub struct SheetExtractor;

impl SheetExtractor {
    pub fn new() -> Self {
        Self
    }

    fn render_cell(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            other => other.to_string(),
        }
    }
}

impl Default for SheetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for SheetExtractor {
    fn extensions(&self) -> &[&str] {
        &[".xlsx", ".xls", ".xlsb", ".ods"]
    }

    fn file_type(&self) -> &str {
        "spreadsheet"
    }

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedContent> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .with_context(|| format!("Failed to open workbook {filename}"))?;

        let mut content = ExtractedContent::new(self.file_type());
        let sheet_names = workbook.sheet_names().to_owned();
        content.insert_meta(
            "sheets",
            serde_json::Value::Array(
                sheet_names
                    .iter()
                    .map(|n| serde_json::Value::String(n.clone()))
                    .collect(),
            ),
        );

        let mut text = String::new();
        for name in &sheet_names {
            let range = workbook
                .worksheet_range(name)
                .with_context(|| format!("Failed to read sheet '{name}' in {filename}"))?;

            let table: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(Self::render_cell).collect())
                .collect();

            text.push_str(&format!("Sheet: {name}\n"));
            for row in &table {
                text.push_str(&row.join("\t"));
                text.push('\n');
            }
            text.push('\n');

            if !table.is_empty() {
                content.tables.push(table);
            }
        }

        content.text = text;
        Ok(content)
    }
}
