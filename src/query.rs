//! Row and column selection over one or more indexed TSV files.
//!
//! A matrix query walks through a fixed sequence of phases:
//!
//! 1. every data file is opened together with its index, generating the
//!    index first if it can't be read;
//! 2. requested row labels are located in the index files;
//! 3. requested column labels are located in the header lines;
//! 4. each file's wanted rows are read back in ascending offset order and
//!    the wanted fields are converted into the output matrix.
//!
//! An empty label list on either axis means "everything": every indexed row
//! in index order, or every header column in header order.

use std::borrow::Cow;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cells::{CellSetter, Matrix};
use crate::config::Config;
use crate::error::{Axis, Error, Result};
use crate::hash_table::{HashTable, NOT_FOUND};
use crate::header::{scan_header, HeaderSummary};
use crate::helpers::{create_temp_file, fields, LineReader, TAB};
use crate::index::{generate_index, scan_index, IndexOutcome, ScanMode, ScanSummary};

/// Label table of a query. Requested labels are borrowed from the request,
/// labels discovered in the files are owned.
type LabelTable<'r> = HashTable<Cow<'r, [u8]>>;

/// A data file and the index file that goes with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSource {
    pub data: PathBuf,
    pub index: PathBuf,
}

impl DataSource {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(data: P, index: Q) -> DataSource {
        DataSource { data: data.into(), index: index.into() }
    }

    /// Pairs `data` with the index path `config` derives for it.
    pub fn with_default_index<P: AsRef<Path>>(data: P, config: &Config) -> DataSource {
        DataSource {
            data: data.as_ref().to_path_buf(),
            index: config.index_path_for(&data),
        }
    }

    /// Zips data and index paths, which must come in equal numbers.
    pub fn zip<P: AsRef<Path>, Q: AsRef<Path>>(data: &[P], index: &[Q]) -> Result<Vec<DataSource>> {
        if data.len() != index.len() {
            return Err(Error::SourceCountMismatch(data.len(), index.len()))
        }
        Ok(data.iter()
               .zip(index)
               .map(|(d, i)| DataSource::new(d.as_ref(), i.as_ref()))
               .collect())
    }
}

/// Which rows and columns to select.
#[derive(Clone, Copy, Debug)]
pub struct Request<'r, S: 'r> {
    /// Row labels in output order; empty selects every row.
    pub rows: &'r [S],
    /// Column labels in output order; empty selects every column.
    pub cols: &'r [S],
    /// Accept a result where only some of the named labels were found.
    pub match_any: bool,
}

impl<'r, S: AsRef<[u8]>> Request<'r, S> {
    pub fn new(rows: &'r [S], cols: &'r [S]) -> Request<'r, S> {
        Request { rows, cols, match_any: false }
    }

    pub fn match_any(mut self, match_any: bool) -> Request<'r, S> {
        self.match_any = match_any;
        self
    }
}

/// The header and the selected lines of a data file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lines {
    pub header: Vec<u8>,
    pub labels: Vec<Vec<u8>>,
    pub lines: Vec<Vec<u8>>,
}

/// Where a matrix query is (or was, when it failed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    FilesOpened,
    RowsResolved,
    ColsResolved,
    Extracting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A data file opened for the duration of a query, with its index.
struct OpenSource<'s> {
    source: &'s DataSource,
    data: LineReader<File>,
    index: File,
}

impl<'s> OpenSource<'s> {
    fn open(source: &'s DataSource, config: &Config) -> Result<OpenSource<'s>> {
        let mut data = File::open(&source.data)
            .map_err(|e| Error::Open { path: source.data.clone(), source: e })?;

        let index = match File::open(&source.index) {
            Ok(index) => index,
            Err(e) => {
                warn!(index = %source.index.display(), error = %e,
                      "unable to read index file, attempting to create it");
                let index = build_missing_index(source, &mut data)?;
                data.seek(SeekFrom::Start(0))?;
                index
            },
        };

        Ok(OpenSource {
            source,
            data: LineReader::new(data, config.max_line_len()),
            index,
        })
    }

    fn scan_index<K>(&mut self, table: &mut HashTable<K>, mode: ScanMode, config: &Config)
                     -> Result<ScanSummary>
        where K: AsRef<[u8]> + From<Vec<u8>>
    {
        self.index.seek(SeekFrom::Start(0))?;
        let summary = scan_index(BufReader::new(&mut self.index), table, mode, config)?;
        if summary.truncated {
            warn!(index = %self.source.index.display(), "last index record is incomplete");
        }
        Ok(summary)
    }

    fn scan_header<K>(&mut self, table: &mut HashTable<K>, mode: ScanMode) -> Result<HeaderSummary>
        where K: AsRef<[u8]> + From<Vec<u8>>
    {
        scan_header(&mut self.data, table, mode)
    }
}

/// Generates the index of an open data file into the index path, or into an
/// anonymous temp file if the path can't be created. The returned file is
/// rewound.
fn build_missing_index(source: &DataSource, data: &mut File) -> Result<File> {
    let created = OpenOptions::new().read(true)
                                    .write(true)
                                    .create(true)
                                    .truncate(true)
                                    .open(&source.index);
    let (mut index, at_path) = match created {
        Ok(index) => (index, true),
        Err(e) => {
            warn!(index = %source.index.display(), error = %e,
                  "unable to create index file, indexing into a temp file");
            (create_temp_file()?, false)
        },
    };

    match generate_index(&mut *data, &mut index) {
        Ok(outcome) => report_outcome(&source.data, outcome),
        Err(e) => {
            // a partial index must not outlive the failed build
            if at_path {
                if let Err(e) = fs::remove_file(&source.index) {
                    warn!(index = %source.index.display(), error = %e,
                          "unable to remove partial index file");
                }
            }
            return Err(e)
        },
    }

    index.seek(SeekFrom::Start(0))?;
    Ok(index)
}

fn report_outcome(data: &Path, outcome: IndexOutcome) {
    match outcome {
        IndexOutcome::Complete { records } => {
            debug!(data = %data.display(), records, "indexed data file");
        },
        IndexOutcome::Empty => {
            warn!(data = %data.display(), "data file is empty");
        },
        IndexOutcome::IncompleteLastLine { records } => {
            warn!(data = %data.display(), records, "last line of data file is incomplete");
        },
    }
}

/// Selects rows and columns out of indexed TSV files.
#[derive(Clone, Debug, Default)]
pub struct Selector {
    config: Config,
}

impl Selector {
    pub fn new(config: Config) -> Selector {
        Selector { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Writes the index of the data file at `data` to `index`.
    ///
    /// An empty data file or an unterminated last line only log a warning;
    /// the index is still written.
    pub fn build_index<P: AsRef<Path>, Q: AsRef<Path>>(&self, data: P, index: Q) -> Result<IndexOutcome> {
        let (data, index) = (data.as_ref(), index.as_ref());
        let input = File::open(data).map_err(|e| Error::Open { path: data.to_path_buf(), source: e })?;
        let output = File::create(index).map_err(|e| Error::Open { path: index.to_path_buf(), source: e })?;
        let outcome = generate_index(input, output)?;
        report_outcome(data, outcome);
        Ok(outcome)
    }

    /// Returns the header and the lines whose labels are requested, in
    /// request order. With no labels, every indexed line in index order.
    pub fn lines<S: AsRef<[u8]>>(&self, source: &DataSource, labels: &[S], match_any: bool) -> Result<Lines> {
        let config = &self.config;
        let mut open = [OpenSource::open(source, config)?];
        let rows = resolve(&mut open, labels, match_any, Axis::Row, config, |src, table, mode| {
            src.scan_index(table, mode, config).map(|_| ())
        })?;

        let src = &mut open[0];
        let header = match src.data.read_line_at(0)? {
            Some(line) => line.bytes.to_vec(),
            None => Vec::new(),
        };

        let labels = labels_of(&rows);
        let mut lines = vec![Vec::new(); labels.len()];
        for (offset, order) in by_offset(&rows) {
            let label = &labels[order];
            let line = read_row(&mut src.data, offset, label)?;
            lines[order] = line.to_vec();
        }

        Ok(Lines { header, labels, lines })
    }

    /// Selects a matrix out of one or more data files.
    ///
    /// Rows and columns come out in request order, or in the order they were
    /// first met in the files when the request leaves them open. A label that
    /// occurs in several files takes its cells from the last of them.
    ///
    /// A file that fails while its rows are read contributes nothing and is
    /// skipped with a warning, as long as that leaves no row empty (with
    /// `match_any`, as long as some row was filled). Otherwise the query
    /// fails with the first such error.
    pub fn matrix<S, C>(&self, sources: &[DataSource], request: &Request<S>, setter: &C)
                        -> Result<Matrix<C::Cell>>
        where S: AsRef<[u8]>, C: CellSetter
    {
        let mut phase = Phase::Init;
        let res = self.run_matrix(sources, request, setter, &mut phase);
        match res {
            Ok(_) => debug!(%phase, "matrix query finished"),
            Err(ref e) => debug!(%phase, error = %e, "matrix query failed"),
        }
        res
    }

    fn run_matrix<S, C>(&self, sources: &[DataSource], request: &Request<S>, setter: &C, phase: &mut Phase)
                        -> Result<Matrix<C::Cell>>
        where S: AsRef<[u8]>, C: CellSetter
    {
        let config = &self.config;
        if sources.is_empty() {
            return Err(Error::NoSources)
        }

        let mut open = sources.iter()
                              .map(|source| OpenSource::open(source, config))
                              .collect::<Result<Vec<_>>>()?;
        *phase = Phase::FilesOpened;

        let mut rows = resolve(&mut open, request.rows, request.match_any, Axis::Row, config,
                               |src, table, mode| src.scan_index(table, mode, config).map(|_| ()))?;
        *phase = Phase::RowsResolved;

        let mut cols = resolve(&mut open, request.cols, request.match_any, Axis::Column, config,
                               |src, table, mode| src.scan_header(table, mode).map(|_| ()))?;
        *phase = Phase::ColsResolved;

        let mut matrix = Matrix::new(labels_of(&rows), labels_of(&cols), setter.missing());
        debug!(nrow = matrix.nrow(), ncol = matrix.ncol(), "allocated result matrix");
        *phase = Phase::Extracting;

        let mut written = vec![false; matrix.nrow()];
        let mut first_error = None;
        for src in open.iter_mut() {
            match extract(src, &mut rows, &mut cols, setter, config) {
                Ok(cells) => {
                    for (row, col, cell) in cells {
                        written[row] = true;
                        matrix.set(row, col, cell);
                    }
                },
                Err(e @ Error::Cell { .. }) | Err(e @ Error::Table(_)) => return Err(e),
                Err(e) => {
                    warn!(data = %src.source.data.display(), error = %e, "skipping data file");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                },
            }
        }

        // a skipped file is only tolerable if other files made up for it
        if let Some(e) = first_error {
            let unwritten = written.iter().filter(|&&w| !w).count();
            if unwritten == written.len() || (unwritten > 0 && !request.match_any) {
                return Err(e)
            }
            if unwritten > 0 {
                warn!(rows = unwritten, "rows left empty by skipped data files");
            }
        }

        *phase = Phase::Done;
        Ok(matrix)
    }
}

/// Seeds a label table with the requested labels, lets `scan` fill in
/// values from every source, then checks the request can be satisfied.
///
/// For an explicit request, the returned table holds only the labels that
/// were found, ordered as requested.
fn resolve<'r, 's, S, F>(sources: &mut [OpenSource<'s>], labels: &'r [S], match_any: bool, axis: Axis,
                         config: &Config, mut scan: F) -> Result<LabelTable<'r>>
    where S: AsRef<[u8]>,
          F: FnMut(&mut OpenSource<'s>, &mut LabelTable<'r>, ScanMode) -> Result<()>
{
    let mut table = LabelTable::new(config.initial_table_size());
    for label in labels {
        table.insert_or_set_value(label.as_ref(), NOT_FOUND)?;
    }

    let mode = if labels.is_empty() { ScanMode::InsertAll } else { ScanMode::UpdateExisting };
    for src in sources.iter_mut() {
        scan(src, &mut table, mode)?;
    }

    let found = table.count_not_equal(NOT_FOUND);
    debug!(%axis, requested = table.len(), found, "resolved labels");

    if labels.is_empty() {
        if found == 0 {
            return Err(Error::NoMatches { axis })
        }
        return Ok(table)
    }

    if found < table.len() {
        let missing: Vec<String> = table.labels_in_order()
                                        .into_iter()
                                        .filter(|label| table.get_value(label) == Some(NOT_FOUND))
                                        .map(|label| String::from_utf8_lossy(label).into_owned())
                                        .collect();
        if found == 0 || !match_any {
            return Err(Error::LabelNotFound { axis, missing })
        }
        warn!(%axis, missing = %missing.join(", "), "some labels were not found");
    }

    let mut kept = LabelTable::new((found * 2).max(1));
    for label in labels {
        let label = label.as_ref();
        match table.get_value(label) {
            Some(value) if value != NOT_FOUND => {
                kept.insert_or_set_value(label, value)?;
            },
            _ => (),
        }
    }
    Ok(kept)
}

fn labels_of<K: AsRef<[u8]>>(table: &HashTable<K>) -> Vec<Vec<u8>> {
    table.labels_in_order().into_iter().map(|label| label.to_vec()).collect()
}

/// `(offset, order)` of every located label, in ascending offset order.
fn by_offset<K: AsRef<[u8]>>(table: &HashTable<K>) -> Vec<(u64, usize)> {
    let mut rows: Vec<(u64, usize)> = table.iter()
                                           .filter(|entry| entry.value != NOT_FOUND)
                                           .map(|entry| (entry.value as u64, entry.order as usize))
                                           .collect();
    rows.sort_unstable();
    rows
}

/// Reads the line at `offset` and checks that it belongs to `label`.
fn read_row<'a>(data: &'a mut LineReader<File>, offset: u64, label: &[u8]) -> Result<&'a [u8]> {
    let mismatch = || Error::IndexMismatch {
        offset,
        label: String::from_utf8_lossy(label).into_owned(),
    };
    let line = data.read_line_at(offset)?.ok_or_else(mismatch)?;
    let starts_row = line.bytes.len() > label.len()
        && line.bytes.starts_with(label)
        && line.bytes[label.len()] == TAB;
    if !starts_row {
        return Err(mismatch())
    }
    if !line.terminated {
        warn!(offset, "line is terminated by the end of the file");
    }
    Ok(line.bytes)
}

/// `(row, col, cell)` of every wanted cell of one data file, in matrix
/// coordinates.
type Cells<T> = Vec<(usize, usize, T)>;

/// Reads the wanted cells of one data file. Nothing is returned unless the
/// whole file was read.
fn extract<C: CellSetter>(src: &mut OpenSource, rows: &mut LabelTable, cols: &mut LabelTable,
                          setter: &C, config: &Config) -> Result<Cells<C::Cell>> {
    rows.reset_values(NOT_FOUND);
    let summary = src.scan_index(rows, ScanMode::UpdateExisting, config)?;
    if summary.matched == 0 {
        warn!(data = %src.source.data.display(), "data file matches no requested rows, skipping");
        return Ok(Vec::new())
    }

    cols.reset_values(NOT_FOUND);
    let summary = src.scan_header(cols, ScanMode::UpdateExisting)?;
    if summary.matched == 0 {
        warn!(data = %src.source.data.display(), "data file matches no requested columns, skipping");
        return Ok(Vec::new())
    }

    // column of this file -> column of the matrix
    let mut column_map = Vec::new();
    for entry in cols.iter().filter(|entry| entry.value != NOT_FOUND) {
        let input = entry.value as usize;
        if input >= column_map.len() {
            column_map.resize(input + 1, None);
        }
        column_map[input] = Some(entry.order as usize);
    }

    let labels = rows.labels_in_order();
    let targets = by_offset(rows);
    let mut cells = Vec::new();
    for &(offset, row) in &targets {
        let line = read_row(&mut src.data, offset, labels[row])?;
        for (input, field) in fields(line).skip(1).take(column_map.len()).enumerate() {
            if let Some(col) = column_map[input] {
                let cell = setter.convert(field).map_err(|source| Error::Cell { row, col, source })?;
                cells.push((row, col, cell));
            }
        }
    }

    debug!(data = %src.source.data.display(), rows = targets.len(), "extracted rows");
    Ok(cells)
}

/// Writes the index of `data` to `index` with the default configuration.
pub fn build_index_file<P: AsRef<Path>, Q: AsRef<Path>>(data: P, index: Q) -> Result<IndexOutcome> {
    Selector::default().build_index(data, index)
}

/// [`Selector::lines`] with the default configuration.
pub fn query_rows<S: AsRef<[u8]>>(source: &DataSource, labels: &[S], match_any: bool) -> Result<Lines> {
    Selector::default().lines(source, labels, match_any)
}

/// [`Selector::matrix`] with the default configuration.
pub fn query_matrix<S, C>(sources: &[DataSource], request: &Request<S>, setter: &C) -> Result<Matrix<C::Cell>>
    where S: AsRef<[u8]>, C: CellSetter
{
    Selector::default().matrix(sources, request, setter)
}
