use std::fs::File;
use std::hash::Hasher;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use siphasher::sip::SipHasher13;

use crate::error::{Error, Result};

pub const TAB: u8 = b'\t';
pub const NEWLINE: u8 = b'\n';

/// Computes the initial probe hash for a key, seeded with the key's length.
pub fn hash(key: &[u8]) -> u64 {
    rehash(key, key.len() as u64)
}

/// Re-mixes a key with the previous probe hash as the seed.
/// Each collision in the hash table advances the probe sequence with this.
pub fn rehash(key: &[u8], seed: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(seed, 0);
    hasher.write(key);
    hasher.finish()
}

/// Number of tab-separated columns in a line. An empty line has one
/// (empty) column.
pub fn num_columns(line: &[u8]) -> usize {
    line.iter().filter(|&&b| b == TAB).count() + 1
}

/// Splits a line (without its newline) into tab-separated fields.
pub fn fields(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|&b| b == TAB)
}

/// Creates an anonymous temp file opened for reading and writing.
/// It's removed as soon as the handle is dropped.
pub fn create_temp_file() -> io::Result<File> {
    tempfile::tempfile()
}

/// A line read back from a data stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line<'a> {
    /// Byte offset of the first byte of the line.
    pub offset: u64,
    /// Line content without the newline.
    pub bytes: &'a [u8],
    /// False when the line was cut short by the end of the stream.
    pub terminated: bool,
}

/// Seek + read-until-newline over a buffered stream.
///
/// The reader remembers its position, so a seek forward to a nearby offset
/// is done within the read buffer instead of discarding it. Rows fetched in
/// ascending offset order therefore cost one forward pass.
pub struct LineReader<R> {
    inner: BufReader<R>,
    position: u64,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: Read + Seek> LineReader<R> {
    /// Wraps a stream positioned at its start.
    pub fn new(inner: R, max_len: usize) -> LineReader<R> {
        LineReader {
            inner: BufReader::new(inner),
            position: 0,
            buf: Vec::new(),
            max_len,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek_to(0)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        let res = if offset >= self.position && offset - self.position <= i64::MAX as u64 {
            self.inner.seek_relative((offset - self.position) as i64)
        } else {
            self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
        };
        res.map_err(|source| Error::SeekFailed { offset, source })?;
        self.position = offset;
        Ok(())
    }

    /// Seeks to `offset` and reads the line starting there.
    pub fn read_line_at(&mut self, offset: u64) -> Result<Option<Line>> {
        self.seek_to(offset)?;
        self.read_line()
    }

    /// Reads the next line. Returns `None` at the end of the stream.
    pub fn read_line(&mut self) -> Result<Option<Line>> {
        let offset = self.position;
        self.buf.clear();
        let limit = self.max_len as u64 + 1;
        let read = Read::take(&mut self.inner, limit).read_until(NEWLINE, &mut self.buf)?;
        self.position += read as u64;
        if read == 0 {
            return Ok(None)
        }

        let terminated = self.buf.last() == Some(&NEWLINE);
        if terminated {
            self.buf.pop();
        } else if self.buf.len() > self.max_len {
            return Err(Error::LineTooLong { offset, limit: self.max_len })
        }

        Ok(Some(Line { offset, bytes: &self.buf, terminated }))
    }

    /// Reads lines until one is not blank.
    pub fn read_nonblank_line(&mut self) -> Result<Option<Line>> {
        loop {
            let offset = self.position;
            let blank = match self.read_line()? {
                None => return Ok(None),
                Some(line) => line.bytes.is_empty() && line.terminated,
            };
            if !blank {
                // Re-read from the start of the line so the borrow comes out
                // of this iteration.
                return self.read_line_at(offset)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hash_depends_on_seed() {
        assert_eq!(hash(b"geneA"), rehash(b"geneA", 5));
        assert_ne!(hash(b"geneA"), rehash(b"geneA", hash(b"geneA")));
        assert_ne!(hash(b"geneA"), hash(b"geneB"));
    }

    #[test]
    fn column_counting() {
        assert_eq!(num_columns(b""), 1);
        assert_eq!(num_columns(b"id\tcol1\tcol2"), 3);
        assert_eq!(num_columns(b"\t"), 2);
    }

    #[test]
    fn field_splitting() {
        let got: Vec<_> = fields(b"a\t\tc").collect();
        assert_eq!(got, vec![&b"a"[..], &b""[..], &b"c"[..]]);
    }

    #[test]
    fn seek_and_read() {
        let data = b"id\tx\ngeneA\t1\ngeneB\t2";
        let mut reader = LineReader::new(Cursor::new(&data[..]), 64);

        let line = reader.read_line_at(13).unwrap().unwrap();
        assert_eq!(line.bytes, b"geneB\t2");
        assert!(!line.terminated);

        // backwards
        let line = reader.read_line_at(5).unwrap().unwrap();
        assert_eq!(line, Line { offset: 5, bytes: b"geneA\t1", terminated: true });
        assert_eq!(reader.position(), 13);

        assert!(reader.read_line_at(data.len() as u64).unwrap().is_none());
    }

    #[test]
    fn overlong_lines_are_rejected() {
        let mut reader = LineReader::new(Cursor::new(&b"0123456789\nabc\n"[..]), 4);
        match reader.read_line() {
            Err(Error::LineTooLong { offset: 0, limit: 4 }) => (),
            other => panic!("unexpected {:?}", other),
        }
        let line = reader.read_line_at(11).unwrap().unwrap();
        assert_eq!(line.bytes, b"abc");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut reader = LineReader::new(Cursor::new(&b"h\n\n\nrow\n"[..]), 64);
        reader.read_line().unwrap();
        let line = reader.read_nonblank_line().unwrap().unwrap();
        assert_eq!(line.offset, 4);
        assert_eq!(line.bytes, b"row");
        assert!(reader.read_nonblank_line().unwrap().is_none());
    }
}
