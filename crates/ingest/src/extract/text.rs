//! Plain text extraction with best-effort decoding

use anyhow::Result;

use super::{ContentExtractor, ExtractedContent};

/// Decodes bytes as UTF-8, falling back to Windows-1252 when the input is
/// clearly not UTF-8. Also serves as the registry fallback for unknown
/// formats.
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    fn decode(bytes: &[u8]) -> (String, &'static str) {
        let (decoded, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
        if !had_errors {
            return (decoded.into_owned(), "utf-8");
        }
        let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        (decoded.into_owned(), "windows-1252")
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for TextExtractor {
    fn extensions(&self) -> &[&str] {
        &[".txt", ".log", ".md"]
    }

    fn file_type(&self) -> &str {
        "text"
    }

    fn extract(&self, bytes: &[u8], _filename: &str) -> Result<ExtractedContent> {
        let (text, encoding) = Self::decode(bytes);

        let mut content = ExtractedContent::new(self.file_type());
        content.insert_meta("encoding", encoding);
        content.insert_meta("lines", text.lines().count());
        content.insert_meta("characters", text.chars().count());
        content.tables = super::tables::detect_table_patterns(&text);
        content.text = text;
        Ok(content)
    }
}
