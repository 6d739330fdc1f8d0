//! OD-009: Bulk-data ingestion — free text and CSV uploads to an ordered item list.

/// One item per line; blank lines dropped, whitespace trimmed.
pub fn ingest_text(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// First column of each row, skipping the first row when it is a header.
pub fn ingest_rows(rows: &[Vec<String>], has_header: bool) -> Vec<String> {
    let skip = usize::from(has_header);
    rows.iter()
        .skip(skip)
        .filter_map(|row| row.first())
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Split CSV content into rows of cells.
///
/// Handles double-quoted cells (with `""` escapes and embedded commas or
/// newlines), CRLF line endings, and skips blank lines.
pub fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => end_row(&mut rows, &mut row, &mut cell),
            _ => cell.push(c),
        }
    }
    end_row(&mut rows, &mut row, &mut cell);
    rows
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, cell: &mut String) {
    row.push(std::mem::take(cell));
    let cells = std::mem::take(row);
    if cells.iter().all(|c| c.trim().is_empty()) {
        return;
    }
    rows.push(cells);
}
