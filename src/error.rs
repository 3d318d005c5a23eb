use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The source for a table could not be opened or read.
///
/// Never raised for the shape of the content: ragged rows load as-is.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
}

/// The destination for a save could not be written.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write table: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("row {row} out of bounds (row count {rows})")]
    Row { row: usize, rows: usize },
    #[error("column {column} out of bounds (column count {columns})")]
    Column { column: usize, columns: usize },
}

#[derive(Debug, Error)]
#[error("invalid filter pattern {pattern:?}: {source}")]
pub struct InvalidPatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}
