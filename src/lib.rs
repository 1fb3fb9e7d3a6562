/*!
Indexed random and streamed access to large delimited text files.

Opening a [`DelimitedFile`] scans the file once and records the byte offset
of every logical row. The scan is quote-aware: a delimiter or newline inside
a quoted field is field data, never a row boundary, so a logical row may
span several physical lines. Once the index is built, any row can be fetched
by number with a single seek, or streamed lazily from an arbitrary starting
row, without ever rescanning the file from the start. This is aimed at tools
that repeatedly sample, filter or page through flat files too large to hold
in memory.

The index lives in memory only and is rebuilt on every open; the file is
treated as read-only and must not change while the handle is open.

# Example

```no_run
use seesv::DelimitedFile;

# fn example() -> seesv::Result<()> {
let mut people = DelimitedFile::from_path("people.csv")?;
println!("{} rows, columns: {:?}", people.row_count(), people.header());

// Random access by row number.
let last = people.get_row(people.row_count() - 1)?;

// Lazy streaming from row 500, to the end of the file.
for row in people.get_rows(500, None)? {
    let row = row?;
    println!("{}", row[0]);
}
# Ok(()) }
```

Files with leading junk, a different delimiter, or no header are handled by
[`DelimitedFileBuilder`]. Progress and per-row error notifications during
the indexing scan are delivered to optional sinks, which can be plain
closures:

```no_run
use seesv::DelimitedFileBuilder;

# fn example() -> seesv::Result<()> {
let mut f = DelimitedFileBuilder::new()
    .skip_lines(1)
    .progress_sink(|pct: u8| eprint!("\rloading {}%", pct))
    .error_sink(|msg: &str| eprintln!("bad row: {}", msg))
    .from_path("export.csv")?;
# Ok(()) }
```

A malformed row (for example an unterminated quote at end of file) is
reported through the error sink and indexed best-effort; it never aborts
the scan. I/O failures, accessing a closed handle and out-of-range row
numbers surface as [`Error`].
*/

#![deny(missing_docs)]

pub use crate::error::{Error, Result};
pub use crate::index::FileIndex;
pub use crate::reader::{
    Columns, DelimitedFile, DelimitedFileBuilder, ErrorSink, ProgressSink,
    Row, Rows,
};

mod error;
mod index;
mod reader;
mod scanner;
