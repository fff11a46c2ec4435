#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128-blk-v2.png",
       html_favicon_url = "https://www.rust-lang.org/favicon.ico", html_root_url = ".")]

//! Tab-separated value files are easy to write and easy to read, as long as
//! you read all of them. Once a file grows to millions of rows and thousands
//! of columns, loading it just to pull out a handful of rows and columns
//! becomes the slow part.
//!
//! This crate avoids that by keeping a small *index* next to each data file:
//! one `label TAB byte-offset` line per data row, keyed by the row's first
//! field. With the index, a query seeks straight to the rows it needs and
//! splits out only the columns it asked for. The index is generated on the
//! first query if it isn't there yet ([`generate_index`][gen] does the work).
//!
//! Queries come in two shapes:
//!
//! - [`query_rows`][rows] returns the header and the selected lines of one file.
//! - [`query_matrix`][matrix] selects rows *and* columns, possibly across several
//!   files, and converts every cell with a [`CellSetter`][setter] into a
//!   column-major [`Matrix`][mat].
//!
//! Labels are looked up in a [`HashTable`][table], an open-addressing table
//! that also remembers the order in which labels arrived, so the result
//! comes out in the order the labels were asked for.
//!
//! ```no_run
//! use tsvseek::{query_matrix, DataSource, NumericCells, Request};
//!
//! let sources = [DataSource::new("expr.tsv", "expr.tsv.index")];
//! let request = Request::new(&["geneB", "geneA"], &["sample3"]);
//! let matrix = query_matrix(&sources, &request, &NumericCells).unwrap();
//! assert_eq!(matrix.nrow(), 2);
//! ```
//!
//! Data files are plain TSV: a header line, then one line per row starting
//! with the row label. Headers may leave out the label column entirely (as R
//! writes them); that's detected by comparing against the first data row.
//!
//! [gen]: fn.generate_index.html
//! [rows]: fn.query_rows.html
//! [matrix]: fn.query_matrix.html
//! [setter]: trait.CellSetter.html
//! [mat]: struct.Matrix.html
//! [table]: hash_table/struct.HashTable.html

extern crate siphasher;

mod cells;
mod config;
mod error;
mod header;
mod helpers;
mod index;
mod query;

pub mod hash_table;

pub use cells::{CellSetter, IntegerCells, Matrix, NumericCells, TextCells};
pub use config::Config;
pub use error::{Axis, CellError, Error, Result, Severity, TableError};
pub use hash_table::HashTable;
pub use header::{scan_header, HeaderSummary};
pub use helpers::{Line, LineReader};
pub use index::{generate_index, scan_index, IndexOutcome, ScanMode, ScanSummary};
pub use query::{build_index_file, query_matrix, query_rows, DataSource, Lines, Phase, Request, Selector};
