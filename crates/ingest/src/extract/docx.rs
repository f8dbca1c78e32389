//! Word document extraction
//!
//! A .docx file is a zip container; the document body lives in
//! `word/document.xml`. Paragraph and table text is scraped from the XML
//! run elements (`<w:t>`), which is all the structure this pipeline needs.

use anyhow::{Context, Result};
use regex::Regex;
use std::io::Read;
use std::sync::LazyLock;

use super::{ContentExtractor, ExtractedContent};

static RUN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap());
static TABLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:tbl>.*?</w:tbl>").unwrap());
static ROW_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<w:tr[ >].*?</w:tr>").unwrap());
static CELL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:tc>.*?</w:tc>").unwrap());

pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }

    fn read_document_xml(bytes: &[u8]) -> Result<String> {
        let cursor = std::io::Cursor::new(bytes);
        let mut archive =
            zip::ZipArchive::new(cursor).context("Failed to open docx container")?;
        let mut entry = archive
            .by_name("word/document.xml")
            .context("docx container has no word/document.xml")?;
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .context("Failed to read word/document.xml")?;
        Ok(xml)
    }

    /// Concatenate the text runs of one XML fragment
    fn fragment_text(fragment: &str) -> String {
        RUN_TEXT
            .captures_iter(fragment)
            .map(|cap| decode_entities(&cap[1]))
            .collect::<Vec<_>>()
            .join("")
    }

    fn extract_paragraphs(xml: &str) -> Vec<String> {
        xml.split("</w:p>")
            .map(Self::fragment_text)
            .filter(|p| !p.is_empty())
            .collect()
    }

    fn extract_tables(xml: &str) -> Vec<Vec<Vec<String>>> {
        TABLE_BLOCK
            .find_iter(xml)
            .map(|table| {
                ROW_BLOCK
                    .find_iter(table.as_str())
                    .map(|row| {
                        CELL_BLOCK
                            .find_iter(row.as_str())
                            .map(|cell| Self::fragment_text(cell.as_str()))
                            .collect()
                    })
                    .collect()
            })
            .filter(|t: &Vec<Vec<String>>| !t.is_empty())
            .collect()
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for DocxExtractor {
    fn extensions(&self) -> &[&str] {
        &[".docx"]
    }

    fn file_type(&self) -> &str {
        "docx"
    }

    fn extract(&self, bytes: &[u8], _filename: &str) -> Result<ExtractedContent> {
        let xml = Self::read_document_xml(bytes)?;

        let paragraphs = Self::extract_paragraphs(&xml);
        let tables = Self::extract_tables(&xml);

        let mut content = ExtractedContent::new(self.file_type());
        content.insert_meta("paragraphs", paragraphs.len());
        content.insert_meta("tables", tables.len());
        content.text = paragraphs.join("\n");
        content.tables = tables;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build an in-memory docx container around the given document body
    fn make_docx(body: &str) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            let xml = format!(
                r#"<?xml version="1.0"?><w:document><w:body>{body}</w:body></w:document>"#
            );
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_paragraph_text() {
        let docx = make_docx(
            "<w:p><w:r><w:t>First paragraph</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph</w:t></w:r></w:p>",
        );
        let content = DocxExtractor::new().extract(&docx, "doc.docx").unwrap();
        assert_eq!(content.text, "First paragraph\nSecond paragraph");
        assert_eq!(content.metadata.get("paragraphs").unwrap(), 2);
    }

    #[test]
    fn test_table_rows_and_cells() {
        let docx = make_docx(
            "<w:tbl>\
               <w:tr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc>\
                     <w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc></w:tr>\
               <w:tr><w:tc><w:p><w:r><w:t>Widget</w:t></w:r></w:p></w:tc>\
                     <w:tc><w:p><w:r><w:t>3</w:t></w:r></w:p></w:tc></w:tr>\
             </w:tbl>",
        );
        let content = DocxExtractor::new().extract(&docx, "doc.docx").unwrap();
        assert_eq!(content.tables.len(), 1);
        assert_eq!(content.tables[0][0], vec!["Item", "Qty"]);
        assert_eq!(content.tables[0][1], vec!["Widget", "3"]);
    }

    #[test]
    fn test_entities_decoded() {
        let docx = make_docx("<w:p><w:r><w:t>Smith &amp; Sons</w:t></w:r></w:p>");
        let content = DocxExtractor::new().extract(&docx, "doc.docx").unwrap();
        assert_eq!(content.text, "Smith & Sons");
    }

    #[test]
    fn test_not_a_zip_fails() {
        assert!(DocxExtractor::new().extract(b"plain bytes", "x.docx").is_err());
    }
}
