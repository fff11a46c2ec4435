//! The on-disk row index: one `label TAB byte-offset NEWLINE` record per
//! data line, in data order, with no header record.
//!
//! [`generate_index`] writes it from a TSV stream and [`scan_index`] reads it
//! back into a [`HashTable`] of label to offset.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash_table::HashTable;
use crate::helpers::{NEWLINE, TAB};

/// How [`generate_index`] finished, when it didn't fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Every data line was indexed.
    Complete { records: u64 },
    /// The input held nothing but (at most) a header line.
    Empty,
    /// The last data line wasn't terminated by a newline and was left out.
    IncompleteLastLine { records: u64 },
}

impl IndexOutcome {
    pub fn records(&self) -> u64 {
        match *self {
            IndexOutcome::Complete { records } => records,
            IndexOutcome::IncompleteLastLine { records } => records,
            IndexOutcome::Empty => 0,
        }
    }

    /// The warning this outcome carries, for callers that want to escalate it.
    pub fn warning(&self) -> Option<Error> {
        match *self {
            IndexOutcome::Complete { .. } => None,
            IndexOutcome::Empty => Some(Error::EmptyInput),
            IndexOutcome::IncompleteLastLine { .. } => Some(Error::IncompleteLastLine),
        }
    }
}

/// Writes an index for `data` to `index`.
///
/// The first line of `data` is the header and is skipped. Each following
/// non-blank line must start with a label terminated by a tab; the record
/// written for it carries the byte offset of the line's first byte.
///
/// A line without a label fails with [`Error::NoLabelInLine`]; records written
/// before it are flushed and stay valid.
pub fn generate_index<R: Read, W: Write>(data: R, index: W) -> Result<IndexOutcome> {
    let mut reader = BufReader::new(data);
    let mut writer = BufWriter::new(index);

    let res = write_records(&mut reader, &mut writer);
    writer.flush().map_err(Error::Write)?;

    let outcome = res?;
    debug!(records = outcome.records(), "generated index");
    Ok(outcome)
}

fn write_records<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> Result<IndexOutcome> {
    let mut line = Vec::new();

    let header = reader.read_until(NEWLINE, &mut line)?;
    if header == 0 || line.last() != Some(&NEWLINE) {
        return Ok(IndexOutcome::Empty)
    }

    let mut position = header as u64;
    let mut line_no = 1;
    let mut records = 0;
    loop {
        line.clear();
        let read = reader.read_until(NEWLINE, &mut line)?;
        if read == 0 {
            break
        }
        let start = position;
        position += read as u64;
        line_no += 1;

        if line.last() != Some(&NEWLINE) {
            return Ok(IndexOutcome::IncompleteLastLine { records })
        }
        if line.len() == 1 {
            continue
        }

        let label = match line.iter().position(|&b| b == TAB) {
            Some(end) if end > 0 => &line[..end],
            _ => return Err(Error::NoLabelInLine { line: line_no }),
        };
        writer.write_all(label).map_err(Error::Write)?;
        write!(writer, "\t{}\n", start).map_err(Error::Write)?;
        records += 1;
    }

    if records == 0 {
        Ok(IndexOutcome::Empty)
    } else {
        Ok(IndexOutcome::Complete { records })
    }
}

/// What [`scan_index`] does with each record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// Insert every label, overwriting offsets of labels already present.
    InsertAll,
    /// Only update offsets of labels already in the table.
    UpdateExisting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records read.
    pub records: u64,
    /// Records whose offset landed in the table.
    pub matched: u64,
    /// The last record wasn't newline-terminated.
    pub truncated: bool,
}

/// Reads index records from `index` into `table` as `label -> offset`.
///
/// A malformed record stops the scan with the error that describes it. A
/// final record cut short by the end of the stream ends the scan with
/// `truncated` set; it's applied only if its offset is complete enough to
/// parse.
pub fn scan_index<R, K>(index: R, table: &mut HashTable<K>, mode: ScanMode, config: &Config)
                        -> Result<ScanSummary>
    where R: BufRead, K: AsRef<[u8]> + From<Vec<u8>>
{
    let mut reader = index;
    let mut summary = ScanSummary::default();
    let mut buf = Vec::new();
    let max_label = config.max_label_len();
    let max_digits = config.max_offset_digits();
    let limit = (max_label + max_digits + 2) as u64;

    loop {
        buf.clear();
        let read = Read::take(&mut reader, limit).read_until(NEWLINE, &mut buf)?;
        if read == 0 {
            break
        }
        summary.records += 1;
        let record = summary.records;

        let terminated = buf.last() == Some(&NEWLINE);
        if terminated {
            buf.pop();
        } else if read as u64 == limit {
            return Err(match buf.iter().position(|&b| b == TAB) {
                Some(tab) if tab <= max_label => {
                    if buf[tab + 1..].iter().all(u8::is_ascii_digit) {
                        Error::OffsetTooLong { record }
                    } else {
                        Error::NonNumericOffset { record }
                    }
                },
                _ => Error::LabelTooLong { record, limit: max_label },
            })
        }

        let tab = buf.iter().position(|&b| b == TAB);
        let label_len = tab.unwrap_or(buf.len());
        if label_len > max_label {
            return Err(Error::LabelTooLong { record, limit: max_label })
        }
        let tab = match tab {
            Some(tab) => tab,
            None if !terminated => {
                summary.truncated = true;
                break
            },
            None => return Err(Error::MissingIndexSeparator { record }),
        };

        let digits = &buf[tab + 1..];
        if digits.is_empty() && !terminated {
            summary.truncated = true;
            break
        }
        let offset = parse_offset(digits, record, max_digits)?;

        let label = &buf[..tab];
        let matched = match mode {
            ScanMode::InsertAll => {
                table.insert_or_set_value(label.to_vec(), offset)?;
                true
            },
            ScanMode::UpdateExisting => table.set_value_if_present(label, offset),
        };
        if matched {
            summary.matched += 1;
        }

        if !terminated {
            summary.truncated = true;
            break
        }
    }

    debug!(records = summary.records, matched = summary.matched, "scanned index");
    Ok(summary)
}

fn parse_offset(digits: &[u8], record: u64, max_digits: usize) -> Result<i64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::NonNumericOffset { record })
    }
    if digits.len() > max_digits {
        return Err(Error::OffsetTooLong { record })
    }
    digits.iter().try_fold(0i64, |acc, &d| {
        acc.checked_mul(10).and_then(|acc| acc.checked_add((d - b'0') as i64))
    }).ok_or(Error::OffsetTooLong { record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_table::{OwnedTable, NOT_FOUND};
    use std::io::Cursor;

    fn index_of(data: &[u8]) -> (Result<IndexOutcome>, Vec<u8>) {
        let mut out = Vec::new();
        let res = generate_index(data, &mut out);
        (res, out)
    }

    fn scan(index: &[u8], table: &mut OwnedTable, mode: ScanMode) -> Result<ScanSummary> {
        scan_index(Cursor::new(index), table, mode, &Config::default())
    }

    #[test]
    fn records_carry_line_offsets() {
        let (res, out) = index_of(b"id\tcol1\tcol2\ngeneA\t1\t2\ngeneB\t3\t4\n");
        assert_eq!(res.unwrap(), IndexOutcome::Complete { records: 2 });
        assert_eq!(out, b"geneA\t13\ngeneB\t23\n");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let (res, out) = index_of(b"h\n\nr1\tx\n\nr2\ty\n");
        assert_eq!(res.unwrap(), IndexOutcome::Complete { records: 2 });
        assert_eq!(out, b"r1\t3\nr2\t9\n");
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(index_of(b"").0.unwrap(), IndexOutcome::Empty);
        assert_eq!(index_of(b"id\ta\tb\n").0.unwrap(), IndexOutcome::Empty);
        assert_eq!(index_of(b"id\ta\tb").0.unwrap(), IndexOutcome::Empty);
        assert!(IndexOutcome::Empty.warning().is_some());
    }

    #[test]
    fn unterminated_last_line_is_left_out() {
        let (res, out) = index_of(b"h\nr1\tx\nr2\ty");
        assert_eq!(res.unwrap(), IndexOutcome::IncompleteLastLine { records: 1 });
        assert_eq!(out, b"r1\t2\n");
    }

    #[test]
    fn line_without_label() {
        let (res, out) = index_of(b"h\nr1\tx\nnotab\nr3\tz\n");
        match res {
            Err(Error::NoLabelInLine { line: 3 }) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out, b"r1\t2\n");

        let (res, _) = index_of(b"h\n\tx\n");
        assert!(matches!(res, Err(Error::NoLabelInLine { line: 2 })));
    }

    #[test]
    fn insert_all() {
        let mut table = OwnedTable::new(4);
        let summary = scan(b"a\t0\nb\t10\nc\t25\n", &mut table, ScanMode::InsertAll).unwrap();
        assert_eq!(summary, ScanSummary { records: 3, matched: 3, truncated: false });
        assert_eq!(table.get_value(b"c"), Some(25));
        assert_eq!(table.get_order(b"c"), Some(2));
    }

    #[test]
    fn update_existing_ignores_others() {
        let mut table = OwnedTable::new(4);
        table.insert_or_set_value("b".as_bytes(), NOT_FOUND).unwrap();
        table.insert_or_set_value("z".as_bytes(), NOT_FOUND).unwrap();
        let summary = scan(b"a\t0\nb\t10\n", &mut table, ScanMode::UpdateExisting).unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_value(b"b"), Some(10));
        assert_eq!(table.get_value(b"z"), Some(NOT_FOUND));
    }

    #[test]
    fn truncated_records() {
        let mut table = OwnedTable::new(4);
        let summary = scan(b"a\t0\nb\t1", &mut table, ScanMode::InsertAll).unwrap();
        assert!(summary.truncated);
        assert_eq!(table.get_value(b"b"), Some(1));

        let mut table = OwnedTable::new(4);
        let summary = scan(b"a\t0\nbb", &mut table, ScanMode::InsertAll).unwrap();
        assert!(summary.truncated);
        assert!(!table.contains(b"bb"));
    }

    #[test]
    fn malformed_records() {
        let mut table = OwnedTable::new(4);
        let mode = ScanMode::InsertAll;
        assert!(matches!(scan(b"a\t0\nb\n", &mut table, mode),
                         Err(Error::MissingIndexSeparator { record: 2 })));
        assert!(matches!(scan(b"\n", &mut table, mode),
                         Err(Error::MissingIndexSeparator { record: 1 })));
        assert!(matches!(scan(b"a\t1x\n", &mut table, mode),
                         Err(Error::NonNumericOffset { record: 1 })));
        assert!(matches!(scan(b"a\t\n", &mut table, mode),
                         Err(Error::NonNumericOffset { record: 1 })));
        assert!(matches!(scan(b"a\t99999999999999999999\n", &mut table, mode),
                         Err(Error::OffsetTooLong { record: 1 })));
    }

    #[test]
    fn staging_limits() {
        let mut config = Config::default();
        config.set_max_label_len(4).set_max_offset_digits(3);
        let mut table = OwnedTable::new(4);

        let res = scan_index(Cursor::new(&b"abcde\t1\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert!(matches!(res, Err(Error::LabelTooLong { record: 1, limit: 4 })));

        let res = scan_index(Cursor::new(&b"abcdefghijklmn\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert!(matches!(res, Err(Error::LabelTooLong { record: 1, .. })));

        let res = scan_index(Cursor::new(&b"ab\t1234\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert!(matches!(res, Err(Error::OffsetTooLong { record: 1 })));

        // a stray byte is reported as such, however long the field
        let res = scan_index(Cursor::new(&b"ab\t12x4\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert!(matches!(res, Err(Error::NonNumericOffset { record: 1 })));
        let res = scan_index(Cursor::new(&b"ab\t12x4567\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert!(matches!(res, Err(Error::NonNumericOffset { record: 1 })));

        let res = scan_index(Cursor::new(&b"abcd\t123\n"[..]), &mut table, ScanMode::InsertAll, &config);
        assert_eq!(res.unwrap().records, 1);
    }

    #[test]
    fn generated_index_scans_back() {
        let data = b"id\tcol1\tcol2\ngeneA\t1\t2\ngeneB\t3\t4\n";
        let (_, out) = index_of(data);
        let mut table = OwnedTable::new(4);
        scan(&out, &mut table, ScanMode::InsertAll).unwrap();

        let a = table.get_value(b"geneA").unwrap() as usize;
        let b = table.get_value(b"geneB").unwrap() as usize;
        assert!(data[a..].starts_with(b"geneA\t"));
        assert!(data[b..].starts_with(b"geneB\t"));
    }
}
