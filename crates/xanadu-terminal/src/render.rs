//! Character-grid rendering contract.
//!
//! Anything handed to [`ExecutionContext::render`](crate::ExecutionContext::render)
//! is a rectangular grid of characters. The interpreter only reads its
//! dimensions and writes its rows; layout is the grid's business.

use std::io::{self, Write};

/// A rectangular block of characters indexed by `(row, col)`.
pub trait Grid {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    /// Character at `(row, col)`. Out-of-range cells are blank.
    fn at(&self, row: usize, col: usize) -> char;
}

/// Plain text laid out as a grid, optionally wrapped and left-padded.
#[derive(Debug, Clone, Default)]
pub struct TextGrid {
    lines: Vec<Vec<char>>,
    cols: usize,
}

impl TextGrid {
    /// One grid row per line of `text`, no wrapping.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<Vec<char>> = lines
            .into_iter()
            .map(|l| l.as_ref().chars().collect())
            .collect();
        let cols = lines.iter().map(Vec::len).max().unwrap_or(0);
        Self { lines, cols }
    }

    /// Word-wrap `text` to `width` columns (0 = no wrapping).
    ///
    /// `**bold**` markers are dropped; the grid has no styling.
    pub fn wrapped(text: &str, width: usize) -> Self {
        let plain = text.replace("**", "");
        if width == 0 {
            return Self::from_text(&plain);
        }
        let mut rows = Vec::new();
        for line in plain.lines() {
            if line.is_empty() {
                rows.push(String::new());
                continue;
            }
            let options = textwrap::Options::new(width)
                .wrap_algorithm(textwrap::WrapAlgorithm::FirstFit);
            rows.extend(textwrap::wrap(line, options).into_iter().map(|c| c.into_owned()));
        }
        Self::from_lines(rows)
    }

    /// Shift the grid right by `columns` blank cells.
    pub fn padded(mut self, columns: usize) -> Self {
        if columns == 0 {
            return self;
        }
        for line in &mut self.lines {
            let mut row = vec![' '; columns];
            row.append(line);
            *line = row;
        }
        self.cols += columns;
        self
    }
}

impl Grid for TextGrid {
    fn rows(&self) -> usize {
        self.lines.len()
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn at(&self, row: usize, col: usize) -> char {
        self.lines
            .get(row)
            .and_then(|l| l.get(col))
            .copied()
            .unwrap_or(' ')
    }
}

/// Write `grid` row by row.
///
/// With `clip` set, output is limited to `width` columns and `height` rows
/// (0 = unbounded). Trailing blanks are trimmed from each row.
pub fn dump(
    grid: &dyn Grid,
    out: &mut dyn Write,
    width: usize,
    height: usize,
    clip: bool,
) -> io::Result<()> {
    let mut rows = grid.rows();
    let mut cols = grid.cols();
    if clip {
        if height > 0 {
            rows = rows.min(height);
        }
        if width > 0 {
            cols = cols.min(width);
        }
    }
    for row in 0..rows {
        let line: String = (0..cols).map(|col| grid.at(row, col)).collect();
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}
