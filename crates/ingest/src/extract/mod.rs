//! Pluggable content extraction
//!
//! Each supported format gets one extractor implementing
//! [`ContentExtractor`]; the [`ExtractorSet`] dispatches by file extension.
//! Formats without an extractor fall back to a best-effort text decode, so
//! extraction as a whole never fails: internal errors are captured into the
//! result's metadata and whatever text/tables were salvageable are returned.

mod csv;
mod docx;
pub mod fields;
mod pdf;
mod sheet;
pub mod tables;
mod text;

pub use csv::CsvExtractor;
pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use sheet::SheetExtractor;
pub use text::TextExtractor;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extraction result for one attachment.
///
/// `tables` is a list of tables, each a list of rows, each a list of cell
/// strings. Produced once per attachment and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub text: String,
    pub tables: Vec<Vec<Vec<String>>>,
    pub metadata: Map<String, Value>,
    pub file_type: String,
}

impl ExtractedContent {
    pub fn new(file_type: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            tables: Vec::new(),
            metadata: Map::new(),
            file_type: file_type.into(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn insert_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

/// A format-specific extraction strategy.
///
/// Implementations must be pure with respect to their inputs; any state
/// they hold is configuration fixed at construction.
pub trait ContentExtractor: Send + Sync {
    /// Lowercase extensions (with leading dot) this extractor handles
    fn extensions(&self) -> &[&str];

    /// Tag recorded in `ExtractedContent::file_type`
    fn file_type(&self) -> &str;

    /// Extract text, tables, and metadata from raw bytes.
    fn extract(&self, bytes: &[u8], filename: &str) -> anyhow::Result<ExtractedContent>;
}

/// Registry of extractors with extension-based dispatch.
///
/// The registered set is fixed at construction: a format either has an
/// extractor or it doesn't, and unsupported formats are routed through the
/// text fallback with a note in metadata.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn ContentExtractor>>,
    fallback: TextExtractor,
}

impl ExtractorSet {
    /// Registry with every extractor this build supports.
    ///
    /// Image/OCR formats are intentionally absent; they dispatch to the
    /// fallback and come back marked unsupported.
    pub fn with_default_extractors() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(PdfExtractor::new()));
        set.register(Box::new(SheetExtractor::new()));
        set.register(Box::new(CsvExtractor::new()));
        set.register(Box::new(DocxExtractor::new()));
        set.register(Box::new(TextExtractor::new()));
        set
    }

    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
            fallback: TextExtractor::new(),
        }
    }

    pub fn register(&mut self, extractor: Box<dyn ContentExtractor>) {
        self.extractors.push(extractor);
    }

    fn find(&self, extension: &str) -> Option<&dyn ContentExtractor> {
        self.extractors
            .iter()
            .find(|e| e.extensions().contains(&extension))
            .map(|e| e.as_ref())
    }

    /// Extract content from an attachment, never failing.
    ///
    /// Dispatches on the filename extension. Extractor errors are captured
    /// into `metadata.error` with a best-effort text fallback. The email
    /// context entries are merged into the result metadata so downstream
    /// readers can correlate artifacts without the queue record.
    pub fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        context: &[(&str, &str)],
    ) -> ExtractedContent {
        let extension = filename
            .rfind('.')
            .map(|i| filename[i..].to_lowercase())
            .unwrap_or_default();

        let mut content = match self.find(&extension) {
            Some(extractor) => match extractor.extract(bytes, filename) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Extraction failed for {filename}: {e:#}");
                    let mut content = self.fallback_content(bytes, filename);
                    content.insert_meta("error", format!("{e:#}"));
                    content
                }
            },
            None => {
                let mut content = self.fallback_content(bytes, filename);
                content.insert_meta(
                    "unsupported_format",
                    format!("no extractor registered for '{extension}'"),
                );
                content
            }
        };

        for (key, value) in context {
            content.insert_meta(key, value.to_string());
        }
        content
    }

    fn fallback_content(&self, bytes: &[u8], filename: &str) -> ExtractedContent {
        self.fallback
            .extract(bytes, filename)
            .unwrap_or_else(|_| ExtractedContent::new("unknown"))
    }
}
