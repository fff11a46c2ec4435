//! Conversion of raw TSV fields into matrix cells, and the matrix itself.

use std::str;

use crate::error::CellError;

/// Turns the bytes of one field into a cell value.
///
/// The selection engine calls [`convert`](CellSetter::convert) for every
/// field it extracts; cells no line supplied keep [`missing`](CellSetter::missing).
pub trait CellSetter {
    type Cell: Clone;

    fn missing(&self) -> Self::Cell;

    fn convert(&self, field: &[u8]) -> Result<Self::Cell, CellError>;
}

/// Keeps fields as text (invalid UTF-8 is replaced).
#[derive(Clone, Copy, Debug, Default)]
pub struct TextCells;

impl CellSetter for TextCells {
    type Cell = Option<String>;

    fn missing(&self) -> Option<String> {
        None
    }

    fn convert(&self, field: &[u8]) -> Result<Option<String>, CellError> {
        Ok(Some(String::from_utf8_lossy(field).into_owned()))
    }
}

/// Parses fields as integers. Empty fields and `NA` become `None`.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegerCells;

impl CellSetter for IntegerCells {
    type Cell = Option<i64>;

    fn missing(&self) -> Option<i64> {
        None
    }

    fn convert(&self, field: &[u8]) -> Result<Option<i64>, CellError> {
        let text = trim(field);
        if is_na(text) {
            return Ok(None)
        }

        let (negative, digits) = match text.split_first() {
            Some((&b'-', rest)) => (true, rest),
            Some((&b'+', rest)) => (false, rest),
            _ => (false, text),
        };
        let end = digits.iter().position(|b| !b.is_ascii_digit()).unwrap_or(digits.len());
        if end == 0 {
            return Err(CellError::new(field, "non-integer field"))
        }
        if end < digits.len() {
            return Err(CellError::new(field, "unexpected non-numeric data following integer field"))
        }

        let magnitude = digits.iter().try_fold(0i64, |acc, &d| {
            acc.checked_mul(10).and_then(|acc| acc.checked_sub((d - b'0') as i64))
        });
        match magnitude {
            // accumulated negatively so that i64::MIN fits
            Some(value) if negative => Ok(Some(value)),
            Some(value) => value.checked_neg()
                                .map(Some)
                                .ok_or_else(|| CellError::new(field, "integer out of range")),
            None => Err(CellError::new(field, "integer out of range")),
        }
    }
}

/// Parses fields as floating point numbers. Empty fields and `NA` become
/// NaN, `Inf` and `-Inf` the infinities.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumericCells;

impl CellSetter for NumericCells {
    type Cell = f64;

    fn missing(&self) -> f64 {
        ::std::f64::NAN
    }

    fn convert(&self, field: &[u8]) -> Result<f64, CellError> {
        let text = trim(field);
        if is_na(text) {
            return Ok(::std::f64::NAN)
        }
        if text.starts_with(b"-Inf") {
            return Ok(::std::f64::NEG_INFINITY)
        }
        if text.starts_with(b"Inf") {
            return Ok(::std::f64::INFINITY)
        }
        str::from_utf8(text).ok()
                            .and_then(|s| s.parse::<f64>().ok())
                            .ok_or_else(|| CellError::new(field, "non-numeric field"))
    }
}

// Leading blanks and a carriage return left over from CRLF line endings.
fn trim(field: &[u8]) -> &[u8] {
    let start = field.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(field.len());
    let field = &field[start..];
    match field.split_last() {
        Some((&b'\r', rest)) => rest,
        _ => field,
    }
}

fn is_na(text: &[u8]) -> bool {
    text.is_empty() || text.starts_with(b"NA")
}

/// A dense, column-major matrix with row and column labels.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    nrow: usize,
    ncol: usize,
    data: Vec<T>,
    row_labels: Vec<Vec<u8>>,
    col_labels: Vec<Vec<u8>>,
}

impl<T: Clone> Matrix<T> {
    /// Creates a matrix sized by its labels with every cell set to `fill`.
    pub fn new(row_labels: Vec<Vec<u8>>, col_labels: Vec<Vec<u8>>, fill: T) -> Matrix<T> {
        let (nrow, ncol) = (row_labels.len(), col_labels.len());
        Matrix {
            nrow,
            ncol,
            data: vec![fill; nrow * ncol],
            row_labels,
            col_labels,
        }
    }
}

impl<T> Matrix<T> {
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn row_labels(&self) -> &[Vec<u8>] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[Vec<u8>] {
        &self.col_labels
    }

    /// All cells, column after column.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn column(&self, col: usize) -> &[T] {
        &self.data[col * self.nrow..(col + 1) * self.nrow]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.nrow && col < self.ncol {
            self.data.get(col * self.nrow + row)
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[col * self.nrow + row] = value;
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}
