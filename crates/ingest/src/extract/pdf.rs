//! PDF text and metadata extraction
//!
//! Text comes from `pdf-extract`; page count and document-info metadata
//! from `lopdf`. PDFs carry no explicit table structure, so tables are
//! recovered from the text via pattern detection.

use anyhow::{Context, Result};
use lopdf::Document as PdfDocument;

use super::{ContentExtractor, ExtractedContent};

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn document_metadata(pdf: &PdfDocument, content: &mut ExtractedContent) {
        content.insert_meta("pages", pdf.get_pages().len());
        content.insert_meta("encrypted", pdf.is_encrypted());

        // Document info dictionary: Title, Author, Producer, ...
        if let Ok((_, info_obj)) = pdf
            .trailer
            .get(b"Info")
            .and_then(|obj| pdf.dereference(obj))
            && let Ok(dict) = info_obj.as_dict()
        {
            for (key, value) in dict.iter() {
                if let Ok(value_bytes) = value.as_str() {
                    let key = String::from_utf8_lossy(key).to_lowercase();
                    let value = String::from_utf8_lossy(value_bytes).to_string();
                    content.insert_meta(&key, value);
                }
            }
        }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for PdfExtractor {
    fn extensions(&self) -> &[&str] {
        &[".pdf"]
    }

    fn file_type(&self) -> &str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedContent> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .with_context(|| format!("Failed to extract text from {filename}"))?;

        let mut content = ExtractedContent::new(self.file_type());

        match PdfDocument::load_mem(bytes) {
            Ok(pdf) => Self::document_metadata(&pdf, &mut content),
            Err(e) => {
                // Text extraction succeeded, so keep going without metadata
                log::debug!("Could not read PDF structure of {filename}: {e}");
            }
        }

        content.tables = super::tables::detect_table_patterns(&text);
        content.insert_meta("tables_detected", content.tables.len());
        content.text = text;
        Ok(content)
    }
}
