//! Text-based table pattern detection
//!
//! Fallback for formats whose parser yields text but no structured tables:
//! consecutive lines that split into two or more cells on a consistent
//! delimiter are grouped into a table.

/// Detect tables in plain text.
///
/// A line is a candidate row when it splits into at least two cells on one
/// of `|`, tab, or runs of two-plus spaces. Two or more consecutive
/// candidate rows form a table.
pub fn detect_table_patterns(text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        match split_row(line) {
            Some(cells) => current.push(cells),
            None => flush(&mut current, &mut tables),
        }
    }
    flush(&mut current, &mut tables);

    tables
}

fn flush(current: &mut Vec<Vec<String>>, tables: &mut Vec<Vec<Vec<String>>>) {
    if current.len() >= 2 {
        tables.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Split a line into cells, or `None` when it doesn't look like a row
fn split_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cells: Vec<String> = if trimmed.contains('|') {
        trimmed
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    } else if trimmed.contains('\t') {
        trimmed
            .split('\t')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        split_on_space_runs(trimmed)
    };

    if cells.len() >= 2 { Some(cells) } else { None }
}

/// Split on runs of two or more spaces
fn split_on_space_runs(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut space_run = 0usize;

    for ch in line.chars() {
        if ch == ' ' {
            space_run += 1;
            if space_run < 2 {
                current.push(ch);
            }
        } else {
            if space_run >= 2 && !current.trim().is_empty() {
                cells.push(current.trim().to_string());
                current.clear();
            }
            space_run = 0;
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }
    cells
}
