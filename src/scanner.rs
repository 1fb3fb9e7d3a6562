use std::mem;

use memchr::{memchr, memchr3};

use self::State::*;

/// The state of the scanner between bytes.
///
/// `CRLF` exists because `\r\n` must be treated as a single record
/// terminator, and the `\n` may arrive in a later chunk than the `\r`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    /// At the start of a field, where a quote opens a quoted field.
    StartField,
    /// Inside an unquoted field.
    InField,
    /// Inside a quoted field.
    InQuotedField,
    /// Just saw a quote inside a quoted field. The next byte decides
    /// whether it was an escape, the end of the field or the end of the
    /// record.
    InDoubleQuote,
    /// Just saw `\r`. A following `\n` belongs to the same terminator.
    CRLF,
}

/// The result of feeding a chunk of input to `Scanner::scan`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scan {
    /// All input was consumed without reaching the end of a record.
    NeedMore,
    /// A record ended after consuming this many bytes of the input,
    /// terminator included. The count may be zero when a `\r` terminator
    /// arrived at the end of the previous chunk.
    Record(usize),
}

/// A quote-aware scanner for logical records in delimited text.
///
/// A logical record may span multiple physical lines, since a raw newline
/// inside a quoted field is field data rather than a record terminator.
/// The scanner is fed chunks of input and reports where each record ends,
/// which is all the indexer needs; `split` then decodes any one raw record
/// into its fields using the same quoting rules, so the indexer and the row
/// accessor can never disagree about record boundaries.
///
/// Quoting follows RFC 4180 as seen in the wild: a quote only opens a
/// quoted field at the start of a field, a doubled quote inside a quoted
/// field is a literal quote, and `\r`, `\n` or `\r\n` each terminate a
/// record. A stray byte after a closing quote degrades the rest of the
/// field to unquoted data instead of failing.
#[derive(Clone, Debug)]
pub struct Scanner {
    delimiter: u8,
    quote: u8,
    state: State,
}

impl Scanner {
    /// Create a scanner for the given delimiter and quote bytes.
    pub fn new(delimiter: u8, quote: u8) -> Scanner {
        Scanner { delimiter, quote, state: StartField }
    }

    /// Forget any partial record state and start fresh at a record
    /// boundary.
    pub fn reset(&mut self) {
        self.state = StartField;
    }

    /// True when the scanner stopped inside a quoted field. Checked at end
    /// of stream to detect an unterminated quote.
    pub fn in_quoted_field(&self) -> bool {
        self.state == InQuotedField
    }

    /// Consume input until the end of the current record or the end of the
    /// chunk, whichever comes first. At most one record is consumed per
    /// call. Callers track how many bytes each call consumed: all of
    /// `input` on `NeedMore`, the returned count on `Record`.
    pub fn scan(&mut self, input: &[u8]) -> Scan {
        let mut i = 0;
        while i < input.len() {
            match self.state {
                StartField => {
                    let b = input[i];
                    i += 1;
                    if b == self.quote {
                        self.state = InQuotedField;
                    } else if b == self.delimiter {
                        // Empty field; still at the start of the next one.
                    } else if b == b'\r' {
                        self.state = CRLF;
                    } else if b == b'\n' {
                        return Scan::Record(i);
                    } else {
                        self.state = InField;
                    }
                }
                InField => {
                    match memchr3(self.delimiter, b'\r', b'\n', &input[i..]) {
                        None => i = input.len(),
                        Some(j) => {
                            let b = input[i + j];
                            i += j + 1;
                            if b == self.delimiter {
                                self.state = StartField;
                            } else if b == b'\r' {
                                self.state = CRLF;
                            } else {
                                self.state = StartField;
                                return Scan::Record(i);
                            }
                        }
                    }
                }
                InQuotedField => match memchr(self.quote, &input[i..]) {
                    None => i = input.len(),
                    Some(j) => {
                        i += j + 1;
                        self.state = InDoubleQuote;
                    }
                },
                InDoubleQuote => {
                    let b = input[i];
                    i += 1;
                    if b == self.quote {
                        self.state = InQuotedField;
                    } else if b == self.delimiter {
                        self.state = StartField;
                    } else if b == b'\r' {
                        self.state = CRLF;
                    } else if b == b'\n' {
                        self.state = StartField;
                        return Scan::Record(i);
                    } else {
                        // Data after a closing quote. Degrade gracefully to
                        // an unquoted continuation.
                        self.state = InField;
                    }
                }
                CRLF => {
                    if input[i] == b'\n' {
                        i += 1;
                    }
                    self.state = StartField;
                    return Scan::Record(i);
                }
            }
        }
        Scan::NeedMore
    }

    /// Split one raw logical record into its decoded fields.
    ///
    /// The slice is expected to hold exactly the bytes `scan` consumed for
    /// one record, trailing terminator included. Fields are decoded with a
    /// fixed lossy UTF-8 policy, so splitting never fails; bytes that are
    /// not valid UTF-8 become U+FFFD.
    pub fn split(&self, record: &[u8]) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = Vec::new();
        let mut state = StartField;
        'bytes: for &b in record {
            match state {
                StartField => {
                    if b == self.quote {
                        state = InQuotedField;
                    } else if b == self.delimiter {
                        fields.push(lossy(&mut field));
                    } else if b == b'\r' || b == b'\n' {
                        break 'bytes;
                    } else {
                        field.push(b);
                        state = InField;
                    }
                }
                InField => {
                    if b == self.delimiter {
                        fields.push(lossy(&mut field));
                        state = StartField;
                    } else if b == b'\r' || b == b'\n' {
                        break 'bytes;
                    } else {
                        field.push(b);
                    }
                }
                InQuotedField => {
                    if b == self.quote {
                        state = InDoubleQuote;
                    } else {
                        field.push(b);
                    }
                }
                InDoubleQuote => {
                    if b == self.quote {
                        field.push(b);
                        state = InQuotedField;
                    } else if b == self.delimiter {
                        fields.push(lossy(&mut field));
                        state = StartField;
                    } else if b == b'\r' || b == b'\n' {
                        break 'bytes;
                    } else {
                        field.push(b);
                        state = InField;
                    }
                }
                CRLF => break 'bytes,
            }
        }
        fields.push(lossy(&mut field));
        fields
    }
}

fn lossy(field: &mut Vec<u8>) -> String {
    let bytes = mem::replace(field, Vec::new());
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}
