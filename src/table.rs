use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{IndexError, ParseError, SaveError};

/// Line terminator used when serializing a table.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// A structural change to the grid, delivered to subscribers after it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    RowAppended { row: usize },
    CellUpdated { row: usize, column: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&ModelEvent)>;

/// In-memory grid loaded from a delimited text file.
///
/// Headers are fixed at load time. Rows can be appended and edited but never
/// removed. Every mutation marks the table dirty until the next successful save.
pub struct TableModel {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    dirty: bool,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl TableModel {
    fn from_grid(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            columns,
            rows,
            dirty: false,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Parse in-memory text. The first line becomes the header; content is never rejected.
    pub fn parse(text: &str, delimiter: &str) -> Self {
        let mut lines = text.lines();
        let columns = lines
            .next()
            .map(|line| split_line(line, delimiter))
            .unwrap_or_default();
        let rows = lines.map(|line| split_line(line, delimiter)).collect();
        Self::from_grid(columns, rows)
    }

    /// Read a table line by line. Fails only when the reader itself fails.
    pub fn load<R: BufRead>(reader: R, delimiter: &str) -> Result<Self, ParseError> {
        let mut columns = None;
        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ParseError::Read {
                line: idx + 1,
                source,
            })?;
            let cells = split_line(&line, delimiter);
            if columns.is_none() {
                columns = Some(cells);
            } else {
                rows.push(cells);
            }
        }
        Ok(Self::from_grid(columns.unwrap_or_default(), rows))
    }

    pub fn open(path: impl AsRef<Path>, delimiter: &str) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::load(BufReader::new(file), delimiter)?;
        info!(
            path = %path.display(),
            columns = model.column_count(),
            rows = model.row_count(),
            "loaded table"
        );
        Ok(model)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Option<&[String]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// True iff the grid changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Append a row of empty cells, one per column.
    pub fn append_empty_row(&mut self) {
        self.rows.push(vec![String::new(); self.columns.len()]);
        self.dirty = true;
        let row = self.rows.len() - 1;
        debug!(row, "row appended");
        self.notify(&ModelEvent::RowAppended { row });
    }

    /// Replace a cell value. A short ragged row is padded with empty cells first.
    pub fn set_cell(
        &mut self,
        row: usize,
        column: usize,
        value: impl Into<String>,
    ) -> Result<(), IndexError> {
        self.check_bounds(row, column)?;
        let rows = self.rows.len();
        let cells = self
            .rows
            .get_mut(row)
            .ok_or(IndexError::Row { row, rows })?;
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.into();
        self.dirty = true;
        debug!(row, column, "cell updated");
        self.notify(&ModelEvent::CellUpdated { row, column });
        Ok(())
    }

    /// Cell text, or `""` when a ragged row has no value stored there.
    pub fn get_cell(&self, row: usize, column: usize) -> Result<&str, IndexError> {
        self.check_bounds(row, column)?;
        Ok(self
            .rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or(""))
    }

    fn check_bounds(&self, row: usize, column: usize) -> Result<(), IndexError> {
        if row >= self.rows.len() {
            return Err(IndexError::Row {
                row,
                rows: self.rows.len(),
            });
        }
        if column >= self.columns.len() {
            return Err(IndexError::Column {
                column,
                columns: self.columns.len(),
            });
        }
        Ok(())
    }

    /// Header line then one line per row, joined by [`LINE_ENDING`], with no trailing terminator.
    ///
    /// Cells are not escaped, so a value containing `delimiter` or a line break
    /// will not survive a reload.
    pub fn serialize(&self, delimiter: &str) -> String {
        let mut out = self.columns.join(delimiter);
        for row in &self.rows {
            out.push_str(LINE_ENDING);
            out.push_str(&row.join(delimiter));
        }
        out
    }

    /// Overwrite `path` with the serialized table and clear the dirty flag.
    ///
    /// The flag is left untouched when the write fails.
    pub fn save(&mut self, path: impl AsRef<Path>, delimiter: &str) -> Result<(), SaveError> {
        let path = path.as_ref();
        let result = File::create(path).and_then(|file| {
            let mut w = BufWriter::new(file);
            self.write_contents(&mut w, delimiter)?;
            w.flush()
        });
        if let Err(source) = result {
            warn!(path = %path.display(), error = %source, "save failed");
            return Err(SaveError::Write {
                path: path.to_path_buf(),
                source,
            });
        }
        self.dirty = false;
        info!(path = %path.display(), rows = self.rows.len(), "saved table");
        Ok(())
    }

    /// Same contract as [`TableModel::save`] for an arbitrary writer.
    pub fn write_to<W: Write>(&mut self, mut w: W, delimiter: &str) -> Result<(), SaveError> {
        self.write_contents(&mut w, delimiter)?;
        w.flush()?;
        self.dirty = false;
        Ok(())
    }

    fn write_contents<W: Write>(&self, w: &mut W, delimiter: &str) -> io::Result<()> {
        w.write_all(self.serialize(delimiter).as_bytes())?;
        w.write_all(LINE_ENDING.as_bytes())
    }

    /// Register a callback invoked after every mutation.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&ModelEvent) + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    fn notify(&mut self, event: &ModelEvent) {
        for (_, observer) in &mut self.observers {
            observer(event);
        }
    }
}

impl fmt::Debug for TableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableModel")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("dirty", &self.dirty)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Naive split: no quoting, trailing empty fields kept. An empty delimiter never splits.
fn split_line(line: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![line.to_string()];
    }
    line.split(delimiter).map(str::to_string).collect()
}
