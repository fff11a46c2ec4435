//! Error types for indexing and selection.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which label axis a request failed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Axis::Row => f.write_str("row"),
            Axis::Column => f.write_str("column"),
        }
    }
}

/// How bad an error is for the query that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// A partial but well-defined result is still available.
    Recoverable,
    /// The request cannot be satisfied, nothing was corrupted, retrying is safe.
    Request,
    /// Corrupt input, broken invariant, or a failed write.
    Fatal,
}

/// Errors raised by the hash table itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// The probe sequence of a key collided too many times in a row.
    /// Only a corrupt table or a pathological key set gets here.
    #[error("hash table probe sequence exceeded {probes} collisions")]
    ProbeLimitExceeded { probes: usize },

    /// A cursor was advanced after new keys were inserted into its table.
    #[error("hash table cursor used after the table was modified")]
    StaleCursor,
}

/// Errors from cell conversion.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message}: '{field}'")]
pub struct CellError {
    pub field: String,
    pub message: &'static str,
}

impl CellError {
    pub fn new(field: &[u8], message: &'static str) -> CellError {
        CellError {
            field: String::from_utf8_lossy(field).into_owned(),
            message,
        }
    }
}

/// Everything that can go wrong while indexing or querying TSV files.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input is empty")]
    EmptyInput,

    #[error("error writing index: {0}")]
    Write(#[source] io::Error),

    #[error("last line is not terminated by a newline")]
    IncompleteLastLine,

    #[error("data line {line} does not contain a label")]
    NoLabelInLine { line: u64 },

    #[error("no match for {axis} labels: {}", .missing.join(", "))]
    LabelNotFound { axis: Axis, missing: Vec<String> },

    #[error("no matching {axis}s found")]
    NoMatches { axis: Axis },

    #[error("index record {record} has no tab between label and offset")]
    MissingIndexSeparator { record: u64 },

    #[error("index record {record} has a label longer than {limit} bytes")]
    LabelTooLong { record: u64, limit: usize },

    #[error("index record {record} has an offset that is too long")]
    OffsetTooLong { record: u64 },

    #[error("index record {record} has a non-numeric offset")]
    NonNumericOffset { record: u64 },

    #[error("unable to seek to byte offset {offset}")]
    SeekFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("index points at byte {offset}, which does not start a line for '{label}'")]
    IndexMismatch { offset: u64, label: String },

    #[error("unable to open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line starting at byte {offset} is longer than {limit} bytes")]
    LineTooLong { offset: u64, limit: usize },

    #[error("header resolves {header} columns but data rows carry {data}")]
    ColumnCountMismatch { header: usize, data: usize },

    #[error("cell ({row}, {col}): {source}")]
    Cell {
        row: usize,
        col: usize,
        #[source]
        source: CellError,
    },

    #[error("{0} data files were given but {1} index files")]
    SourceCountMismatch(usize, usize),

    #[error("no data files given")]
    NoSources,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps the error onto the three tiers callers act on.
    pub fn severity(&self) -> Severity {
        match *self {
            Error::EmptyInput | Error::IncompleteLastLine => Severity::Recoverable,
            Error::LabelNotFound { .. }
            | Error::NoMatches { .. }
            | Error::Open { .. }
            | Error::SourceCountMismatch(..)
            | Error::NoSources => Severity::Request,
            _ => Severity::Fatal,
        }
    }

    /// True when a stale or damaged index file, rather than the data file,
    /// is the likely culprit and regenerating the index may help.
    pub fn needs_reindex(&self) -> bool {
        match *self {
            Error::MissingIndexSeparator { .. }
            | Error::NonNumericOffset { .. }
            | Error::OffsetTooLong { .. }
            | Error::SeekFailed { .. }
            | Error::IndexMismatch { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
