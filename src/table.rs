//! Plain-text table rendering for CLI reports.

use std::{borrow::Cow, fmt::Write as _};

use crate::{frame::Frame, missing::ColumnNulls};

const GAP: &str = "  ";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// The first `limit` rows of `frame`; nulls render as empty cells.
pub fn frame_rows(frame: &Frame, limit: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let rows = (0..frame.row_count().min(limit))
        .map(|row| {
            frame
                .row(row)
                .into_iter()
                .map(|cell| cell.map(|v| v.key_token()).unwrap_or_default())
                .collect()
        })
        .collect();
    (frame.column_names(), rows)
}

/// `column  nulls / rows` lines, as printed by the `nulls` command.
pub fn null_rows(report: &[ColumnNulls]) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = ["column", "nulls", "missing_pct"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = report
        .iter()
        .map(|entry| {
            vec![
                entry.name.clone(),
                format!("{} / {}", entry.nulls, entry.rows),
                format!("{:.1}", entry.missing_pct()),
            ]
        })
        .collect();
    (headers, rows)
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let pad = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join(GAP);
    line.trim_end().to_string()
}

/// Character count, ignoring ANSI colour sequences.
fn display_width(value: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for ch in value.chars() {
        match (in_escape, ch) {
            (false, '\u{1b}') => in_escape = true,
            (true, 'm') => in_escape = false,
            (true, _) => {}
            (false, _) => width += 1,
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
