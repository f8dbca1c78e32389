//! Regex-based field extraction for domain documents
//!
//! Pulls structured fields (invoice number, date, total, vendor) out of
//! extracted text. Applied by the worker pipeline to PDF attachments so
//! downstream consumers get key/value pairs without re-parsing text.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

// Most specific pattern first: the bare "Invoice" form would otherwise
// capture the word "Number" out of "Invoice Number: ..."
static INVOICE_NUMBER: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)Invoice\s*Number\s*:?\s*([A-Z0-9][A-Z0-9\-]+)").unwrap(),
        Regex::new(r"(?i)Invoice\s*#?\s*:?\s*([A-Z0-9][A-Z0-9\-]+)").unwrap(),
        Regex::new(r"(?i)INV\s*#?\s*:?\s*([A-Z0-9][A-Z0-9\-]+)").unwrap(),
    ]
});

static INVOICE_DATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)Invoice\s*Date\s*:?\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap(),
        Regex::new(r"(?i)Date\s*:?\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap(),
        Regex::new(r"(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap(),
    ]
});

static TOTAL_AMOUNT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)Grand\s*Total\s*:?\s*\$?([0-9,]+\.?\d{0,2})").unwrap(),
        Regex::new(r"(?i)Amount\s*Due\s*:?\s*\$?([0-9,]+\.?\d{0,2})").unwrap(),
        Regex::new(r"(?i)Total\s*:?\s*\$?([0-9,]+\.?\d{0,2})").unwrap(),
    ]
});

static NON_VENDOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invoice|date|total").unwrap());

/// Extract invoice fields from document text.
///
/// Every key is optional; an empty map means nothing matched.
pub fn extract_invoice_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if let Some(value) = first_match(&INVOICE_NUMBER, text) {
        fields.insert("invoice_number".to_string(), value);
    }
    if let Some(value) = first_match(&INVOICE_DATE, text) {
        fields.insert("invoice_date".to_string(), value);
    }
    if let Some(value) = first_match(&TOTAL_AMOUNT, text) {
        fields.insert("total_amount".to_string(), value);
    }
    if let Some(vendor) = guess_vendor(text) {
        fields.insert("vendor".to_string(), vendor);
    }

    fields
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.captures(text).map(|c| c[1].to_string()))
}

/// The vendor usually heads the document: take the first early line that
/// is long enough and not a field label.
fn guess_vendor(text: &str) -> Option<String> {
    text.lines()
        .take(10)
        .map(str::trim)
        .find(|line| line.len() > 5 && !NON_VENDOR_LINE.is_match(line))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Acme Supplies Ltd\n\
                          123 Industrial Way\n\
                          Invoice #: INV-2024-001\n\
                          Invoice Date: 03/15/2024\n\
                          Widgets ... 250.00\n\
                          Grand Total: $1,250.00\n";

    #[test]
    fn test_extracts_all_fields() {
        let fields = extract_invoice_fields(SAMPLE);
        assert_eq!(fields.get("invoice_number").unwrap(), "INV-2024-001");
        assert_eq!(fields.get("invoice_date").unwrap(), "03/15/2024");
        assert_eq!(fields.get("total_amount").unwrap(), "1,250.00");
        assert_eq!(fields.get("vendor").unwrap(), "Acme Supplies Ltd");
    }

    #[test]
    fn test_alternate_invoice_spellings() {
        let fields = extract_invoice_fields("Invoice Number: A-77\nTotal: 12.50");
        assert_eq!(fields.get("invoice_number").unwrap(), "A-77");
        assert_eq!(fields.get("total_amount").unwrap(), "12.50");
    }

    #[test]
    fn test_no_fields_in_prose() {
        let fields = extract_invoice_fields("short\ntiny\n");
        assert!(fields.get("invoice_number").is_none());
        assert!(fields.get("total_amount").is_none());
    }

    #[test]
    fn test_vendor_skips_field_lines() {
        let fields = extract_invoice_fields("Invoice Date: 01/01/2024\nGlobex Corporation\n");
        assert_eq!(fields.get("vendor").unwrap(), "Globex Corporation");
    }
}
