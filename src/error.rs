use std::error;
use std::fmt;
use std::io;
use std::result;

/// A type alias for `Result<T, seesv::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when indexing or accessing a delimited file.
///
/// Malformed rows are deliberately absent here: a structural problem inside
/// a row (such as an unterminated quote) is reported through the handle's
/// error sink during indexing and never aborts a scan. Only I/O failures
/// and misuse of the handle surface as errors.
#[derive(Debug)]
pub enum Error {
    /// An I/O error that occurred while opening, scanning or seeking the
    /// underlying file.
    Io(io::Error),
    /// A row access was attempted on a handle that is not open.
    NotOpen,
    /// A row number outside of `[0, row_count)` was requested.
    Index {
        /// The requested row number.
        row: u64,
        /// The number of rows in the index.
        row_count: u64,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::NotOpen | Error::Index { .. } => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::NotOpen => write!(f, "the delimited file is not open"),
            Error::Index { row, row_count } => write!(
                f,
                "row index {} is out of bounds (there are {} rows)",
                row, row_count
            ),
        }
    }
}
