//! Plain-text tables for list output.

use std::fmt::Write as _;

/// Width used when the terminal width is unknown.
pub const DEFAULT_WIDTH: usize = 80;

const SEPARATOR: &str = " | ";
const MIN_COLUMN_WIDTH: usize = 8;

/// Cut `s` to at most `max` characters, ending in `...` when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

/// Terminal width from `COLUMNS`, else [`DEFAULT_WIDTH`].
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.trim().parse::<usize>().ok())
        .filter(|&w| w > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Render `rows` under `headers`, shrinking wide columns so the table fits
/// in `width` characters where possible.
pub fn render(headers: &[&str], rows: &[Vec<String>], width: usize) -> String {
    if rows.is_empty() {
        return "No data to display\n".to_owned();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let separators = SEPARATOR.len() * headers.len().saturating_sub(1);
    let total: usize = widths.iter().sum::<usize>() + separators;
    if total > width && !headers.is_empty() {
        let cap = (width.saturating_sub(separators) / headers.len()).max(MIN_COLUMN_WIDTH);
        for w in &mut widths {
            *w = (*w).min(cap);
        }
    }

    let mut out = String::new();
    write_row(&mut out, headers.iter().copied(), &widths);
    let rule = widths.iter().sum::<usize>() + separators;
    out.push_str(&"-".repeat(rule));
    out.push('\n');
    for row in rows {
        write_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

/// Print a table to stdout.
pub fn print(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render(headers, rows, terminal_width()));
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let cells: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{:<w$}", truncate(cell, w)))
        .collect();
    let _ = writeln!(out, "{}", cells.join(SEPARATOR).trim_end());
}
