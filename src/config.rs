use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const DEFAULT_TABLE_SIZE: usize = 1024;
pub const DEFAULT_MAX_LINE_LEN: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_LABEL_LEN: usize = 1023;
pub const DEFAULT_MAX_OFFSET_DIGITS: usize = 63;
pub const DEFAULT_INDEX_SUFFIX: &'static str = ".index";

/// Tunables shared by the index codec, the header resolver and the
/// selection engine.
///
/// The label and offset limits bound index records; the line limit bounds
/// data lines read by seeking. `Config::default()` is what most callers want.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    initial_table_size: usize,
    max_line_len: usize,
    max_label_len: usize,
    max_offset_digits: usize,
    index_suffix: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            initial_table_size: DEFAULT_TABLE_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_label_len: DEFAULT_MAX_LABEL_LEN,
            max_offset_digits: DEFAULT_MAX_OFFSET_DIGITS,
            index_suffix: DEFAULT_INDEX_SUFFIX.to_owned(),
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Slot count of the row and column tables before any growth.
    pub fn set_initial_table_size(&mut self, size: usize) -> &mut Config {
        self.initial_table_size = size.max(1);
        self
    }

    /// Longest data line (in bytes, newline excluded) that will be read back
    /// after a seek.
    pub fn set_max_line_len(&mut self, len: usize) -> &mut Config {
        self.max_line_len = len;
        self
    }

    /// Longest label accepted while scanning an index file.
    pub fn set_max_label_len(&mut self, len: usize) -> &mut Config {
        self.max_label_len = len;
        self
    }

    /// Longest run of offset digits accepted while scanning an index file.
    pub fn set_max_offset_digits(&mut self, digits: usize) -> &mut Config {
        self.max_offset_digits = digits;
        self
    }

    pub fn set_index_suffix<S: Into<String>>(&mut self, suffix: S) -> &mut Config {
        self.index_suffix = suffix.into();
        self
    }

    pub fn initial_table_size(&self) -> usize {
        self.initial_table_size
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    pub fn max_label_len(&self) -> usize {
        self.max_label_len
    }

    pub fn max_offset_digits(&self) -> usize {
        self.max_offset_digits
    }

    pub fn index_suffix(&self) -> &str {
        &self.index_suffix
    }

    /// Index path that sits next to `data`, i.e. `data` plus the index suffix.
    pub fn index_path_for<P: AsRef<Path>>(&self, data: P) -> PathBuf {
        let mut name = OsString::from(data.as_ref().as_os_str());
        name.push(&self.index_suffix);
        PathBuf::from(name)
    }
}
