//! Command-line access to indexed TSV files.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use tsvseek::{CellSetter, Config, DataSource, IntegerCells, Matrix, NumericCells, Request, Selector,
              TextCells};

#[derive(Debug, Parser)]
#[command(name = "tsvseek")]
#[command(about = "Random access to rows and columns of large TSV files", long_about = None)]
#[command(version)]
struct Cli {
    /// Longest data line accepted, in bytes
    #[arg(long, global = true)]
    max_line_len: Option<usize>,

    /// Suffix appended to a data file name when no index file is given
    #[arg(long, global = true, default_value = ".index")]
    index_suffix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the row index of one or more data files
    Index {
        /// Data files to index
        #[arg(required = true)]
        data: Vec<PathBuf>,

        /// Index files to write, one per data file
        #[arg(short, long)]
        index: Vec<PathBuf>,
    },
    /// Print the header and the lines of the given row labels
    Lines {
        /// Data file to read
        data: PathBuf,

        /// Row labels (all rows when none are given)
        labels: Vec<String>,

        /// Index file of the data file
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Succeed when only some of the labels are found
        #[arg(long)]
        any: bool,
    },
    /// Print a matrix of the selected rows and columns
    Matrix {
        /// Data files to read
        #[arg(required = true)]
        data: Vec<PathBuf>,

        /// Index files, one per data file
        #[arg(short, long)]
        index: Vec<PathBuf>,

        /// Row label to select (repeatable; all rows when omitted)
        #[arg(short, long = "row")]
        rows: Vec<String>,

        /// Column label to select (repeatable; all columns when omitted)
        #[arg(short, long = "col")]
        cols: Vec<String>,

        /// Succeed when only some of the labels are found
        #[arg(long)]
        any: bool,

        /// How to convert cells
        #[arg(short = 't', long = "type", default_value = "text")]
        cell_type: CellType,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CellType {
    /// Keep fields as they are
    Text,
    /// Parse fields as integers
    Integer,
    /// Parse fields as floating point numbers
    Numeric,
}

fn sources(data: &[PathBuf], index: &[PathBuf], config: &Config) -> Result<Vec<DataSource>> {
    if index.is_empty() {
        return Ok(data.iter().map(|d| DataSource::with_default_index(d, config)).collect())
    }
    DataSource::zip(data, index).context("pairing data files with index files")
}

fn write_matrix<T, F>(out: &mut dyn Write, matrix: &Matrix<T>, show: F) -> io::Result<()>
    where F: Fn(&T) -> String
{
    for label in matrix.col_labels() {
        out.write_all(b"\t")?;
        out.write_all(label)?;
    }
    out.write_all(b"\n")?;

    for (row, label) in matrix.row_labels().iter().enumerate() {
        out.write_all(label)?;
        for col in 0..matrix.ncol() {
            let cell = matrix.get(row, col).map(&show).unwrap_or_default();
            write!(out, "\t{}", cell)?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn run_matrix<C: CellSetter>(selector: &Selector, sources: &[DataSource], request: &Request<String>,
                             setter: &C, show: fn(&C::Cell) -> String, out: &mut dyn Write)
                             -> Result<()> {
    let matrix = selector.matrix(sources, request, setter)?;
    info!(nrow = matrix.nrow(), ncol = matrix.ncol(), "selected matrix");
    write_matrix(out, &matrix, show)?;
    Ok(())
}

fn show_float(v: &f64) -> String {
    if v.is_nan() {
        "NA".to_owned()
    } else if v.is_infinite() {
        if *v > 0.0 { "Inf".to_owned() } else { "-Inf".to_owned() }
    } else {
        v.to_string()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tsvseek=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    config.set_index_suffix(cli.index_suffix.clone());
    if let Some(len) = cli.max_line_len {
        config.set_max_line_len(len);
    }
    let selector = Selector::new(config.clone());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Command::Index { data, index } => {
            for source in sources(&data, &index, &config)? {
                let outcome = selector.build_index(&source.data, &source.index)
                    .with_context(|| format!("indexing {}", source.data.display()))?;
                info!(data = %source.data.display(), index = %source.index.display(),
                      records = outcome.records(), "wrote index");
            }
        },
        Command::Lines { data, labels, index, any } => {
            let source = match index {
                Some(index) => DataSource::new(data, index),
                None => DataSource::with_default_index(data, &config),
            };
            let lines = selector.lines(&source, &labels, any)?;
            out.write_all(&lines.header)?;
            out.write_all(b"\n")?;
            for line in &lines.lines {
                out.write_all(line)?;
                out.write_all(b"\n")?;
            }
        },
        Command::Matrix { data, index, rows, cols, any, cell_type } => {
            let sources = sources(&data, &index, &config)?;
            let request = Request::new(&rows, &cols).match_any(any);
            match cell_type {
                CellType::Text => run_matrix(&selector, &sources, &request, &TextCells,
                                             |c| c.clone().unwrap_or_else(|| "NA".to_owned()), &mut out)?,
                CellType::Integer => run_matrix(&selector, &sources, &request, &IntegerCells,
                                                |c| c.map(|v| v.to_string()).unwrap_or_else(|| "NA".to_owned()),
                                                &mut out)?,
                CellType::Numeric => run_matrix(&selector, &sources, &request, &NumericCells, show_float,
                                                &mut out)?,
            }
        },
    }

    if let Err(e) = out.flush() {
        bail!("unable to write output: {}", e);
    }
    Ok(())
}
