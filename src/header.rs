//! Column label resolution from a TSV header line.
//!
//! Data rows always start with a label field. Most headers name that column
//! too, but files written the "R way" leave it out, so their header has one
//! field fewer than the data rows. The two are told apart by comparing the
//! header against the first data row.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::hash_table::HashTable;
use crate::helpers::{fields, num_columns, LineReader};
use crate::index::ScanMode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderSummary {
    /// Data columns named by the header, label column excluded.
    pub columns: usize,
    /// Header labels whose column number landed in the table.
    pub matched: usize,
    /// The header has no entry for the label column.
    pub legacy: bool,
}

/// Maps each column label of the header to its data column number (0 is the
/// first field after the row label) in `table`.
///
/// A file without data rows contributes no columns.
pub fn scan_header<R, K>(reader: &mut LineReader<R>, table: &mut HashTable<K>, mode: ScanMode)
                         -> Result<HeaderSummary>
    where R: Read + Seek, K: AsRef<[u8]> + From<Vec<u8>>
{
    reader.rewind()?;
    let header_cols = match reader.read_line()? {
        Some(line) => num_columns(line.bytes),
        None => return Ok(HeaderSummary::default()),
    };
    let data_cols = match reader.read_nonblank_line()? {
        Some(line) => num_columns(line.bytes),
        None => return Ok(HeaderSummary::default()),
    };
    let legacy = header_cols != data_cols;

    reader.rewind()?;
    let header = match reader.read_line()? {
        Some(line) => line,
        None => return Ok(HeaderSummary::default()),
    };

    let mut summary = HeaderSummary { legacy, ..HeaderSummary::default() };
    let skip = if legacy { 0 } else { 1 };
    for (column, label) in fields(header.bytes).skip(skip).enumerate() {
        let matched = match mode {
            ScanMode::InsertAll => {
                table.insert_or_set_value(label.to_vec(), column as i64)?;
                true
            },
            ScanMode::UpdateExisting => table.set_value_if_present(label, column as i64),
        };
        if matched {
            summary.matched += 1;
        }
        summary.columns += 1;
    }

    if summary.columns != data_cols - 1 {
        return Err(Error::ColumnCountMismatch { header: summary.columns, data: data_cols - 1 })
    }
    Ok(summary)
}
