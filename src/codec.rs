//! The self-describing text codec shared by values, grids, value maps and subtrees.
//!
//! Every composite is flattened into an ordered list of text fields. The fields
//! are assembled with a placeholder byte between them, then the first candidate
//! delimiter that does not occur anywhere in the assembled payload is chosen and
//! substituted for the placeholder. The chosen delimiter is also written as the
//! very first byte, so a reader needs no out-of-band knowledge:
//!
//! ```text
//! <d><field><d><field>...<d>
//! ```
//!
//! Nested composites (a grid inside a value inside a grid) are encoded first and
//! then pushed as a single field; since the outer delimiter is chosen to avoid
//! every byte of the nested code, splitting on it is unambiguous.
//!
//! ```
//! use arbor::codec::{Codec, FieldReader};
//! let codec = Codec::default();
//! let mut writer = codec.writer();
//! writer.push("a|b").push_count(2);
//! let text = writer.finish().unwrap();
//! assert_eq!(text, "~a|b~2~");
//! let mut reader = FieldReader::open(&text).unwrap();
//! assert_eq!(reader.next("first").unwrap(), "a|b");
//! assert_eq!(reader.next_count("second").unwrap(), 2);
//! reader.finish().unwrap();
//! ```

use std::fmt::Display;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{ArborError, Result};

/// Stands in for the delimiter while fields are being assembled.
pub const PLACEHOLDER: char = '\u{0}';

/// Delimiter candidates in priority order.
pub const DEFAULT_CANDIDATES: &[u8] =
    b"|~^!#$%&*+;:,.=?@_-/\\<>(){}[]'`\"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Picks the first candidate that does not occur in `payload`.
///
/// Candidates must be ASCII; payload bytes of multi-byte characters are always
/// above the ASCII range and can never collide with one.
pub fn choose_delimiter(payload: &str, candidates: &[u8]) -> Result<u8> {
    let mut seen = [false; 128];
    for &b in payload.as_bytes() {
        if b.is_ascii() {
            seen[b as usize] = true;
        }
    }
    match candidates
        .iter()
        .copied()
        .find(|&c| c.is_ascii() && !seen[c as usize])
    {
        Some(delimiter) => Ok(delimiter),
        None => {
            debug!(candidates = candidates.len(), "no free delimiter candidate");
            Err(ArborError::EncodingExhausted)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    candidates: Vec<u8>,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.to_vec(),
        }
    }
}

impl Codec {
    /// A codec with its own candidate priority list. Decoding is unaffected
    /// by the list, only the choice made while encoding is.
    pub fn new(candidates: impl Into<Vec<u8>>) -> Result<Self> {
        let candidates = candidates.into();
        if candidates.is_empty() {
            return Err(ArborError::InvalidArgument(
                "delimiter candidate list is empty".into(),
            ));
        }
        if let Some(bad) = candidates.iter().find(|c| !c.is_ascii_graphic()) {
            return Err(ArborError::InvalidArgument(format!(
                "delimiter candidate 0x{bad:02x} is not a printable ASCII character"
            )));
        }
        Ok(Self { candidates })
    }
    pub fn candidates(&self) -> &[u8] {
        &self.candidates
    }
    pub fn writer(&self) -> FieldWriter<'_> {
        FieldWriter::new(self)
    }
}

/// Collects fields in order and produces the delimited text.
#[derive(Debug)]
pub struct FieldWriter<'c> {
    codec: &'c Codec,
    assembled: String,
    rejected: Option<usize>,
    fields: usize,
}

impl<'c> FieldWriter<'c> {
    fn new(codec: &'c Codec) -> Self {
        let mut assembled = String::new();
        assembled.push(PLACEHOLDER);
        Self {
            codec,
            assembled,
            rejected: None,
            fields: 0,
        }
    }
    pub fn push(&mut self, field: &str) -> &mut Self {
        if self.rejected.is_none() && field.contains(PLACEHOLDER) {
            self.rejected = Some(self.fields);
        }
        self.assembled.push_str(field);
        self.assembled.push(PLACEHOLDER);
        self.fields += 1;
        self
    }
    pub fn push_count(&mut self, count: usize) -> &mut Self {
        self.push_display(count)
    }
    pub fn push_display<T: Display>(&mut self, field: T) -> &mut Self {
        self.push(&field.to_string())
    }
    pub fn finish(self) -> Result<String> {
        if let Some(index) = self.rejected {
            return Err(ArborError::Codec(format!(
                "field {index} contains the reserved placeholder byte"
            )));
        }
        let delimiter = choose_delimiter(&self.assembled, &self.codec.candidates)?;
        let mut buffer = [0u8; 4];
        let delimiter = (delimiter as char).encode_utf8(&mut buffer);
        Ok(self.assembled.replace(PLACEHOLDER, delimiter))
    }
}

/// Positional reader over the fields of one delimited text.
#[derive(Debug)]
pub struct FieldReader<'a> {
    delimiter: u8,
    fields: Vec<&'a str>,
    position: usize,
}

fn malformed(message: String) -> ArborError {
    warn!(%message, "rejected encoded text");
    ArborError::Codec(message)
}

impl<'a> FieldReader<'a> {
    pub fn open(text: &'a str) -> Result<Self> {
        let delimiter = match text.as_bytes().first() {
            Some(&b) if b.is_ascii_graphic() => b,
            Some(&b) => {
                return Err(malformed(format!(
                    "byte 0x{b:02x} cannot be a delimiter"
                )));
            }
            None => return Err(malformed("empty input".into())),
        };
        let rest = &text[1..];
        let fields = if rest.is_empty() {
            Vec::new()
        } else {
            let body = rest.strip_suffix(delimiter as char).ok_or_else(|| {
                malformed(format!(
                    "input does not end with its delimiter '{}'",
                    delimiter as char
                ))
            })?;
            body.split(delimiter as char).collect()
        };
        Ok(Self {
            delimiter,
            fields,
            position: 0,
        })
    }
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
    pub fn remaining(&self) -> usize {
        self.fields.len() - self.position
    }
    pub fn next(&mut self, what: &str) -> Result<&'a str> {
        let field = self.fields.get(self.position).copied().ok_or_else(|| {
            malformed(format!(
                "truncated input: missing {what} at field {}",
                self.position
            ))
        })?;
        self.position += 1;
        Ok(field)
    }
    pub fn next_parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let position = self.position;
        let field = self.next(what)?;
        field.parse::<T>().map_err(|_| {
            malformed(format!("field {position} ({what}) cannot be parsed: {field:?}"))
        })
    }
    /// A count that announces `per_item` fields per counted item; it is
    /// rejected up front when the input cannot possibly hold that many.
    pub fn next_count_of(&mut self, what: &str, per_item: usize) -> Result<usize> {
        let count: usize = self.next_parse(what)?;
        let needed = count.checked_mul(per_item);
        match needed {
            Some(needed) if needed <= self.remaining() => Ok(count),
            _ => Err(malformed(format!(
                "{what} of {count} exceeds the {} remaining fields",
                self.remaining()
            ))),
        }
    }
    pub fn next_count(&mut self, what: &str) -> Result<usize> {
        self.next_parse(what)
    }
    pub fn finish(self) -> Result<()> {
        if self.position == self.fields.len() {
            Ok(())
        } else {
            Err(malformed(format!(
                "{} unread trailing fields",
                self.fields.len() - self.position
            )))
        }
    }
}
