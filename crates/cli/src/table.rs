// SPDX-License-Identifier: MIT

//! Shared table renderer for CLI list views.
//!
//! Provides consistent column alignment, color application, and truncation
//! across all `corral` list commands.

use std::io::Write;

use crate::color;

/// Column text alignment.
pub enum Align {
    Left,
    Right,
}

/// How a cell's text is styled after padding.
pub enum CellStyle {
    /// No color applied.
    Plain,
    /// Apply [`color::apply_muted`].
    Muted,
    /// Apply [`color::apply_status`] — auto-detects green/yellow/red.
    Status,
}

/// A column definition in a [`Table`].
pub struct Column {
    pub name: &'static str,
    pub align: Align,
    pub style: CellStyle,
    pub min_width: Option<usize>,
    pub max_width: Option<usize>,
}

impl Column {
    pub fn left(name: &'static str) -> Self {
        Self { name, align: Align::Left, style: CellStyle::Plain, min_width: None, max_width: None }
    }

    pub fn right(name: &'static str) -> Self {
        Self { name, align: Align::Right, style: CellStyle::Plain, min_width: None, max_width: None }
    }

    pub fn muted(name: &'static str) -> Self {
        Self { name, align: Align::Left, style: CellStyle::Muted, min_width: None, max_width: None }
    }

    pub fn status(name: &'static str) -> Self {
        Self { name, align: Align::Left, style: CellStyle::Status, min_width: None, max_width: None }
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max_width = Some(max);
        self
    }
}

/// A tabular renderer that auto-computes column widths from data.
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
    colorize: bool,
}

const SEP: &str = "  ";

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns, rows: Vec::new(), colorize: color::should_colorize() }
    }

    #[cfg(test)]
    pub fn plain(columns: Vec<Column>) -> Self {
        Self { columns, rows: Vec::new(), colorize: false }
    }

    #[cfg(test)]
    pub fn colored(columns: Vec<Column>) -> Self {
        Self { columns, rows: Vec::new(), colorize: true }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Render the full table (header + rows) to the given writer.
    ///
    /// Column widths are auto-computed from data. The last column is never
    /// padded. Color is applied after padding so ANSI escapes don't corrupt
    /// width calculations.
    pub fn render(&self, out: &mut impl Write) {
        if self.rows.is_empty() {
            return;
        }

        let widths = self.compute_widths();
        let colorize = self.colorize;

        let header_cells: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let is_last = i == self.columns.len() - 1;
                let w = widths[i];
                let padded = if is_last && matches!(col.align, Align::Left) {
                    col.name.to_string()
                } else {
                    pad(col.name, w, &col.align)
                };
                if colorize {
                    color::apply_header(&padded)
                } else {
                    padded
                }
            })
            .collect();
        let _ = writeln!(out, "{}", header_cells.join(SEP));

        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let is_last = i == self.columns.len() - 1;
                    let w = widths[i];
                    let raw = row.get(i).map(|s| s.as_str()).unwrap_or("");
                    let truncated = truncate(raw, col.max_width);
                    let padded = if is_last && matches!(col.align, Align::Left) {
                        truncated.to_string()
                    } else {
                        pad(truncated, w, &col.align)
                    };
                    stylize(&padded, &col.style, colorize)
                })
                .collect();
            let _ = writeln!(out, "{}", cells.join(SEP));
        }
    }

    fn compute_widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let min = col.min_width.unwrap_or(col.name.len());
                let max_data = self
                    .rows
                    .iter()
                    .map(|row| {
                        let raw = row.get(i).map(|s| s.len()).unwrap_or(0);
                        match col.max_width {
                            Some(mw) => raw.min(mw),
                            None => raw,
                        }
                    })
                    .max()
                    .unwrap_or(0);
                min.max(max_data)
            })
            .collect()
    }
}

fn pad(text: &str, width: usize, align: &Align) -> String {
    match align {
        Align::Left => format!("{text:<width$}"),
        Align::Right => format!("{text:>width$}"),
    }
}

fn truncate(s: &str, max: Option<usize>) -> &str {
    match max {
        Some(m) if s.len() > m => &s[..m],
        _ => s,
    }
}

fn stylize(text: &str, style: &CellStyle, colorize: bool) -> String {
    if !colorize {
        return text.to_string();
    }
    match style {
        CellStyle::Plain => text.to_string(),
        CellStyle::Muted => color::apply_muted(text),
        CellStyle::Status => color::apply_status(text),
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
