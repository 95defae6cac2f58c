//! Result table and text preview.
//!
//! Every row an operation produces is appended to its [`ResultTable`] and
//! mirrored to a [`Preview`], which lays rows out in fixed-width columns on
//! an [`OutputSink`]. The preview shows at most [`PREVIEW_ROWS`] data rows.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Data rows shown in a preview
pub const PREVIEW_ROWS: usize = 100;

pub const TRUNCATION_NOTICE: &str = "Only showing first 100 rows in preview.";

/// Narrowest column
const MIN_WIDTH: usize = 10;

// =============================================================================
// Cells
// =============================================================================

/// One value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
    /// Not available
    Na,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// `Na` for `None`.
    pub fn float(value: Option<f64>) -> Self {
        value.map_or(Cell::Na, Cell::Float)
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Cell::Na)
    }

    /// Display width in characters.
    pub fn width(&self) -> usize {
        self.to_string().chars().count()
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Na,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map_or(Cell::Na, Cell::Float),
            },
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<usize> for Cell {
    fn from(i: usize) -> Self {
        Cell::Int(i as i64)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{:.2}", x),
            Cell::Na => f.write_str("NA"),
        }
    }
}

pub type Row = Vec<Cell>;

// =============================================================================
// Columns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Right,
}

/// Header column: name, justification and optional content length.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub justify: Justify,
    pub length: Option<usize>,
}

impl Column {
    pub fn right(name: impl Into<String>) -> Self {
        Self { name: name.into(), justify: Justify::Right, length: None }
    }

    pub fn left(name: impl Into<String>, length: usize) -> Self {
        Self { name: name.into(), justify: Justify::Left, length: Some(length) }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Width on screen: content length plus two, at least ten.
    pub fn width(&self) -> usize {
        let content = self.length.unwrap_or_else(|| self.name.chars().count());
        MIN_WIDTH.max(content + 2)
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives preview text.
pub trait OutputSink: Send + Sync {
    fn write(&mut self, text: &str);
}

/// Prints the preview to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Collects the preview in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buffer: Arc<Mutex<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl OutputSink for BufferSink {
    fn write(&mut self, text: &str) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push_str(text);
        }
    }
}

/// Discards the preview.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _text: &str) {}
}

// =============================================================================
// Preview
// =============================================================================

/// Fixed-width text rendering of a result table.
pub struct Preview {
    sink: Box<dyn OutputSink>,
    layout: Vec<(usize, Justify)>,
    started: bool,
    data_rows: usize,
    truncated: bool,
    notice_written: bool,
}

impl Preview {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            layout: Vec::new(),
            started: false,
            data_rows: 0,
            truncated: false,
            notice_written: false,
        }
    }

    /// Use `columns` for the rows that follow.
    pub fn set_layout(&mut self, columns: &[Column]) {
        self.layout = columns.iter().map(|c| (c.width(), c.justify)).collect();
    }

    /// Write a header row (not counted against the row cap).
    pub fn header(&mut self, row: &[Cell]) {
        if !self.truncated {
            self.write_line(row);
        }
    }

    /// Write a data row; rows past the cap are dropped.
    pub fn row(&mut self, row: &[Cell]) {
        if self.data_rows >= PREVIEW_ROWS {
            self.truncated = true;
            return;
        }
        self.data_rows += 1;
        self.write_line(row);
    }

    /// Write a line of free text.
    pub fn value(&mut self, text: &str) {
        if !self.truncated {
            self.newline();
            self.sink.write(text);
        }
    }

    /// Append the truncation notice when rows were dropped.
    pub fn finish(&mut self) {
        if self.truncated && !self.notice_written {
            self.newline();
            self.sink.write(TRUNCATION_NOTICE);
            self.notice_written = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn newline(&mut self) {
        if self.started {
            self.sink.write("\n");
        }
        self.started = true;
    }

    fn write_line(&mut self, row: &[Cell]) {
        self.newline();
        let mut line = String::new();
        for (idx, cell) in row.iter().enumerate() {
            let (width, justify) = self.layout.get(idx).copied().unwrap_or((MIN_WIDTH, Justify::Right));
            let text = cell.to_string();
            match justify {
                Justify::Left => line.push_str(&format!("{:<width$}", text, width = width)),
                Justify::Right => line.push_str(&format!("{:>width$}", text, width = width)),
            }
        }
        self.sink.write(&line);
    }
}

// =============================================================================
// Result table
// =============================================================================

/// Header and data rows, append-only during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<Row>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Write every row as CSV; rows may differ in length.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }
}
