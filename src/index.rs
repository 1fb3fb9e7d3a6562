/// An in-memory index for random access to the rows of a delimited file.
///
/// The index holds one byte offset per logical data row, in row order, where
/// `offsets[i]` is the position of the first byte of row `i`'s first field.
/// Offsets are strictly increasing. Header and skipped lines are never
/// indexed.
///
/// The index is built exactly once per open, lives only as long as the
/// handle that built it, and is never persisted.
#[derive(Clone, Debug, Default)]
pub struct FileIndex {
    offsets: Vec<u64>,
}

impl FileIndex {
    pub(crate) fn new() -> FileIndex {
        FileIndex { offsets: Vec::new() }
    }

    pub(crate) fn push(&mut self, offset: u64) {
        debug_assert!(self.offsets.last().map_or(true, |&last| offset > last));
        self.offsets.push(offset);
    }

    /// Get the byte offset at which row `i` starts.
    ///
    /// The first row has index `0`. Returns `None` when `i` is out of
    /// bounds.
    pub fn get(&self, i: u64) -> Option<u64> {
        if i > usize::max_value() as u64 {
            return None;
        }
        self.offsets.get(i as usize).copied()
    }

    /// The number of rows in the index.
    pub fn len(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// True when the index holds no rows.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
