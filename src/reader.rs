use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::FileIndex;
use crate::scanner::{Scan, Scanner};

const BUF_SIZE: usize = 1024 * 128;

/// How many rows are indexed between two progress reports by default.
const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// A single data row: its decoded fields, in column order.
///
/// Rows are plain owned values. They stay valid after the handle that
/// produced them is closed or dropped.
pub type Row = Vec<String>;

/// A sink for progress notifications emitted while a file is indexed.
///
/// Any `FnMut(u8)` closure is a progress sink. Reports carry the percentage
/// of the file's bytes consumed so far, in `[0, 100]`, and are monotonically
/// non-decreasing within one open.
pub trait ProgressSink {
    /// Receive the percentage of the file indexed so far.
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        (self)(percent)
    }
}

/// A sink for per-row error notifications emitted while a file is indexed.
///
/// Any `FnMut(&str)` closure is an error sink. A report describes one
/// malformed row; it never aborts the scan.
pub trait ErrorSink {
    /// Receive a description of a malformed row.
    fn report(&mut self, message: &str);
}

impl<F: FnMut(&str)> ErrorSink for F {
    fn report(&mut self, message: &str) {
        (self)(message)
    }
}

/// An immutable mapping from column name to zero-based column position.
///
/// Built once from the header when a file is opened; empty when the handle
/// is closed or the file has no header. Names are kept exactly as they
/// appear in the header. When two columns share a name, the later position
/// wins.
#[derive(Clone, Debug, Default)]
pub struct Columns {
    positions: HashMap<String, usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Columns {
        let mut positions = HashMap::with_capacity(header.len());
        for (i, name) in header.iter().enumerate() {
            positions.insert(name.clone(), i);
        }
        Columns { positions }
    }

    fn clear(&mut self) {
        self.positions.clear();
    }

    /// The position of the column with the given name, if any.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// The number of named columns.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when no columns are known.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate over `(name, position)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.positions.iter().map(|(name, &i)| (name.as_str(), i))
    }
}

#[derive(Clone, Copy, Debug)]
struct Config {
    delimiter: u8,
    quote: u8,
    has_header: bool,
    skip_lines: u64,
    progress_interval: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            delimiter: b',',
            quote: b'"',
            has_header: true,
            skip_lines: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Builds a `DelimitedFile` with various configuration knobs.
///
/// # Example
///
/// ```no_run
/// use seesv::DelimitedFileBuilder;
///
/// # fn example() -> seesv::Result<()> {
/// let mut f = DelimitedFileBuilder::new()
///     .delimiter(b';')
///     .skip_lines(1)
///     .progress_sink(|percent: u8| eprint!("\rloading {}%", percent))
///     .from_path("huge.csv")?;
/// let row = f.get_row(0)?;
/// # Ok(()) }
/// ```
pub struct DelimitedFileBuilder {
    config: Config,
    progress: Option<Box<dyn ProgressSink>>,
    errors: Option<Box<dyn ErrorSink>>,
}

impl Default for DelimitedFileBuilder {
    fn default() -> DelimitedFileBuilder {
        DelimitedFileBuilder::new()
    }
}

impl DelimitedFileBuilder {
    /// Create a new builder with the default configuration: comma
    /// delimiter, double-quote quoting, a header row and no skipped lines.
    pub fn new() -> DelimitedFileBuilder {
        DelimitedFileBuilder {
            config: Config::default(),
            progress: None,
            errors: None,
        }
    }

    /// The field delimiter to use. Must be a single ASCII byte. The default
    /// is `b','`.
    pub fn delimiter(mut self, delimiter: u8) -> DelimitedFileBuilder {
        self.config.delimiter = delimiter;
        self
    }

    /// The quote character to use. Must be a single ASCII byte. The default
    /// is `b'"'`.
    pub fn quote(mut self, quote: u8) -> DelimitedFileBuilder {
        self.config.quote = quote;
        self
    }

    /// Whether the first non-skipped line names the columns.
    ///
    /// Enabled by default. When disabled, the header and column map stay
    /// empty and every non-skipped line is a data row.
    pub fn has_header(mut self, yes: bool) -> DelimitedFileBuilder {
        self.config.has_header = yes;
        self
    }

    /// How many leading physical lines to discard entirely before any
    /// header or data interpretation begins. The default is `0`.
    ///
    /// Skipped lines are never indexed, never parsed as the header and
    /// never reported as rows.
    pub fn skip_lines(mut self, lines: u64) -> DelimitedFileBuilder {
        self.config.skip_lines = lines;
        self
    }

    /// How many rows are indexed between two progress reports. The default
    /// is `10_000`.
    pub fn progress_interval(mut self, rows: u64) -> DelimitedFileBuilder {
        self.config.progress_interval = std::cmp::max(1, rows);
        self
    }

    /// Install a sink that receives progress percentages while the file is
    /// indexed. Any `FnMut(u8)` closure works.
    pub fn progress_sink<S>(mut self, sink: S) -> DelimitedFileBuilder
    where
        S: ProgressSink + 'static,
    {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Install a sink that receives one message per malformed row found
    /// while the file is indexed. Any `FnMut(&str)` closure works.
    pub fn error_sink<S>(mut self, sink: S) -> DelimitedFileBuilder
    where
        S: ErrorSink + 'static,
    {
        self.errors = Some(Box::new(sink));
        self
    }

    /// Build a closed handle for the file at the given path. No I/O is
    /// performed until `open` is called.
    pub fn build<P: AsRef<Path>>(self, path: P) -> DelimitedFile {
        DelimitedFile {
            path: path.as_ref().to_path_buf(),
            config: self.config,
            progress: self.progress,
            errors: self.errors,
            header: Vec::new(),
            columns: Columns::default(),
            state: None,
        }
    }

    /// Build a handle for the file at the given path and open it, scanning
    /// and indexing the whole file.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<DelimitedFile> {
        let mut file = self.build(path);
        file.open()?;
        Ok(file)
    }
}

/// The open half of a handle: the file resource and the index built from
/// it. Dropping this releases the file descriptor.
struct Open {
    file: File,
    index: FileIndex,
}

/// A delimited text file with an in-memory row index.
///
/// Opening the handle scans the file once, recording the byte offset of
/// every logical row while honoring RFC 4180 quoting, so embedded
/// delimiters and newlines inside quoted fields never produce spurious row
/// boundaries. Afterwards any row can be fetched by number (`get_row`) or
/// streamed from an arbitrary starting row (`get_rows`) without rescanning
/// the file.
///
/// The handle exclusively owns the file resource. It is closed on `close`
/// or on drop, whichever comes first; closing discards the index, header
/// and column map. A closed handle may be reopened, which re-runs the full
/// scan.
///
/// # Example
///
/// ```no_run
/// use seesv::DelimitedFile;
///
/// # fn example() -> seesv::Result<()> {
/// let mut f = DelimitedFile::from_path("people.csv")?;
/// let name = f.columns().position("FIRST_NAME").unwrap();
/// for row in f.get_rows(0, None)? {
///     let row = row?;
///     if row[name] == "Vern" {
///         println!("{:?}", row);
///     }
/// }
/// # Ok(()) }
/// ```
pub struct DelimitedFile {
    path: PathBuf,
    config: Config,
    progress: Option<Box<dyn ProgressSink>>,
    errors: Option<Box<dyn ErrorSink>>,
    header: Vec<String>,
    columns: Columns,
    state: Option<Open>,
}

impl fmt::Debug for DelimitedFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DelimitedFile")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("row_count", &self.row_count())
            .finish()
    }
}

impl DelimitedFile {
    /// Create a closed handle for the file at the given path with the
    /// default configuration. No I/O is performed.
    pub fn new<P: AsRef<Path>>(path: P) -> DelimitedFile {
        DelimitedFileBuilder::new().build(path)
    }

    /// Create a handle for the file at the given path with the default
    /// configuration and open it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<DelimitedFile> {
        DelimitedFileBuilder::new().from_path(path)
    }

    /// Open the handle: scan the file once, consuming skip-lines and the
    /// header, and index the byte offset of every logical data row.
    ///
    /// On an already-open handle this re-runs the full scan. On failure the
    /// handle is left closed, with an empty header and a row count of zero.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        let file = File::open(&self.path)?;
        let total_size = file.metadata()?.len();
        match self.scan(file, total_size) {
            Ok(open) => {
                self.state = Some(open);
                Ok(())
            }
            Err(err) => {
                // A failed open must leave the handle fully closed, with no
                // partially-built header or column map.
                self.close();
                Err(err)
            }
        }
    }

    /// Close the handle, releasing the file resource and discarding the
    /// index, header and column map. Does nothing on a closed handle.
    pub fn close(&mut self) {
        self.state = None;
        self.header.clear();
        self.columns.clear();
    }

    /// True when the handle is open.
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// The path this handle reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle treats the first non-skipped line as a header.
    pub fn has_header(&self) -> bool {
        self.config.has_header
    }

    /// The column names, in file order. Empty when the handle is closed or
    /// the file has no header.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// The mapping from column name to position. Empty when the handle is
    /// closed or the file has no header.
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// The number of logical data rows, excluding skipped lines and the
    /// header. Zero when the handle is closed.
    pub fn row_count(&self) -> u64 {
        self.state.as_ref().map_or(0, |open| open.index.len())
    }

    /// The row index built by `open`, or `None` when the handle is closed.
    pub fn index(&self) -> Option<&FileIndex> {
        self.state.as_ref().map(|open| &open.index)
    }

    /// Fetch row `n` by seeking directly to its byte offset.
    ///
    /// Every call seeks independently; no cursor state leaks between
    /// calls. Fails with `Error::NotOpen` on a closed handle and
    /// `Error::Index` when `n` is not in `[0, row_count)`.
    pub fn get_row(&mut self, n: u64) -> Result<Row> {
        let config = self.config;
        let open = self.state.as_mut().ok_or(Error::NotOpen)?;
        let offset = open.index.get(n).ok_or(Error::Index {
            row: n,
            row_count: open.index.len(),
        })?;
        open.file.seek(SeekFrom::Start(offset))?;
        let mut scanner = Scanner::new(config.delimiter, config.quote);
        let mut rdr = BufReader::with_capacity(BUF_SIZE, &mut open.file);
        let mut raw = Vec::new();
        read_logical_line(&mut rdr, &mut scanner, &mut raw)?;
        Ok(scanner.split(&raw))
    }

    /// Stream rows lazily, starting at row `start`.
    ///
    /// This seeks once and then decodes forward, one row per iterator step,
    /// stopping after `count` rows or at end of file, whichever comes
    /// first; `None` streams to the end of the file. The iterator borrows
    /// the handle mutably, so it cannot be interleaved with other access to
    /// the same handle; abandoning it early is always safe.
    ///
    /// Fails with `Error::NotOpen` on a closed handle and `Error::Index`
    /// when `start >= row_count`, except that `start == 0` on an empty file
    /// yields an empty iterator.
    pub fn get_rows(
        &mut self,
        start: u64,
        count: Option<u64>,
    ) -> Result<Rows<'_>> {
        let config = self.config;
        let open = self.state.as_mut().ok_or(Error::NotOpen)?;
        let row_count = open.index.len();
        if start >= row_count && !(start == 0 && row_count == 0) {
            return Err(Error::Index { row: start, row_count });
        }
        let remaining = if row_count == 0 { Some(0) } else { count };
        let offset = open.index.get(start).unwrap_or(0);
        open.file.seek(SeekFrom::Start(offset))?;
        Ok(Rows {
            rdr: BufReader::with_capacity(BUF_SIZE, &mut open.file),
            scanner: Scanner::new(config.delimiter, config.quote),
            raw: Vec::new(),
            remaining,
            done: false,
        })
    }

    /// Eager variant of `get_rows`: drain the stream into a `Vec`.
    pub fn get_rows_as_list(
        &mut self,
        start: u64,
        count: Option<u64>,
    ) -> Result<Vec<Row>> {
        self.get_rows(start, count)?.collect()
    }

    /// The single indexing pass. Consumes skip-lines and the header, then
    /// records the start offset of every remaining logical row before
    /// advancing past it.
    fn scan(&mut self, mut file: File, total_size: u64) -> Result<Open> {
        let config = self.config;
        let mut scanner = Scanner::new(config.delimiter, config.quote);
        let mut index = FileIndex::new();
        let mut offset = 0u64;

        {
            let mut rdr = BufReader::with_capacity(BUF_SIZE, &mut file);

            // Skip-lines are physical lines: quoting does not apply yet.
            let mut scratch = Vec::new();
            for _ in 0..config.skip_lines {
                scratch.clear();
                let n = rdr.read_until(b'\n', &mut scratch)?;
                if n == 0 {
                    break;
                }
                offset += n as u64;
            }

            if config.has_header {
                let mut raw = Vec::new();
                let start = offset;
                let n = read_logical_line(&mut rdr, &mut scanner, &mut raw)?;
                offset += n;
                if n > 0 {
                    self.header = scanner.split(&raw);
                    self.columns = Columns::from_header(&self.header);
                }
                if scanner.in_quoted_field() {
                    self.report_error(&format!(
                        "unterminated quoted field in header line starting \
                         at byte {}",
                        start
                    ));
                }
            }

            scanner.reset();
            // Bytes consumed since the current row began; zero means the
            // next byte starts a new row.
            let mut pending = 0u64;
            loop {
                let (res, len) = {
                    let buf = rdr.fill_buf()?;
                    if buf.is_empty() {
                        break;
                    }
                    if pending == 0 {
                        index.push(offset);
                    }
                    let res = scanner.scan(buf);
                    let len = match res {
                        Scan::NeedMore => buf.len(),
                        Scan::Record(nin) => nin,
                    };
                    (res, len)
                };
                rdr.consume(len);
                offset += len as u64;
                match res {
                    Scan::NeedMore => pending += len as u64,
                    Scan::Record(_) => {
                        pending = 0;
                        if index.len() % config.progress_interval == 0 {
                            self.report_progress(offset, total_size);
                        }
                    }
                }
            }

            if pending > 0 && scanner.in_quoted_field() {
                self.report_error(&format!(
                    "unterminated quoted field in row {} starting at byte \
                     {}; the row was indexed to the end of the file",
                    index.len() - 1,
                    offset - pending
                ));
            }
        }

        self.report_progress(total_size, total_size);
        Ok(Open { file, index })
    }

    fn report_progress(&mut self, consumed: u64, total_size: u64) {
        if let Some(ref mut sink) = self.progress {
            let percent = if total_size == 0 {
                100
            } else {
                (std::cmp::min(consumed, total_size) * 100 / total_size) as u8
            };
            sink.report(percent);
        }
    }

    fn report_error(&mut self, message: &str) {
        if let Some(ref mut sink) = self.errors {
            sink.report(message);
        }
    }
}

/// A lazy stream of rows, created by `DelimitedFile::get_rows`.
///
/// Each step reads and decodes exactly one logical row. An I/O failure is
/// yielded once and ends the stream.
pub struct Rows<'f> {
    rdr: BufReader<&'f mut File>,
    scanner: Scanner,
    raw: Vec<u8>,
    remaining: Option<u64>,
    done: bool,
}

impl<'f> Iterator for Rows<'f> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        if self.remaining == Some(0) {
            self.done = true;
            return None;
        }
        match read_logical_line(&mut self.rdr, &mut self.scanner, &mut self.raw)
        {
            Err(err) => {
                self.done = true;
                Some(Err(Error::Io(err)))
            }
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if let Some(ref mut n) = self.remaining {
                    *n -= 1;
                }
                Some(Ok(self.scanner.split(&self.raw)))
            }
        }
    }
}

/// Read one logical record from `rdr`, collecting every consumed byte
/// (terminator included) into `raw`. Returns the number of bytes consumed;
/// zero means end of stream.
fn read_logical_line<R: BufRead>(
    rdr: &mut R,
    scanner: &mut Scanner,
    raw: &mut Vec<u8>,
) -> io::Result<u64> {
    scanner.reset();
    raw.clear();
    let mut nread = 0u64;
    loop {
        let (res, len) = {
            let buf = rdr.fill_buf()?;
            if buf.is_empty() {
                return Ok(nread);
            }
            let res = scanner.scan(buf);
            let len = match res {
                Scan::NeedMore => buf.len(),
                Scan::Record(nin) => nin,
            };
            raw.extend_from_slice(&buf[..len]);
            (res, len)
        };
        rdr.consume(len);
        nread += len as u64;
        if let Scan::Record(_) = res {
            return Ok(nread);
        }
    }
}
