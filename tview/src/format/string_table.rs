//! String table: interned text referenced by byte offset
//!
//! Each entry is `len:u32` followed by `len` UTF-8 bytes. Offsets point at the
//! length prefix and are relative to the start of the table.
//!
//! The writer side ([`StringTable`]) deduplicates, so interning the same text
//! twice yields the same offset. Readers ([`StringTableView`]) never rely on
//! that: any valid offset resolves, duplicates included.

use std::collections::HashMap;
use tview_common::STRING_LEN_PREFIX;

use super::read_u32;
use crate::domain::{FormatError, StrOffset, WriterError};

/// Append-only string pool owned by the trace writer
#[derive(Debug, Default)]
pub struct StringTable {
    bytes: Vec<u8>,
    index: HashMap<String, StrOffset>,
}

impl StringTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the offset of `text`, appending it if it was never interned.
    ///
    /// # Errors
    /// [`WriterError::TooLarge`] if the table would outgrow the u32 offsets
    /// the format uses.
    pub fn intern(&mut self, text: &str) -> Result<StrOffset, WriterError> {
        if let Some(&offset) = self.index.get(text) {
            return Ok(offset);
        }

        let offset = u32::try_from(self.bytes.len())
            .map_err(|_| WriterError::TooLarge { what: "string table" })?;
        let len = u32::try_from(text.len())
            .map_err(|_| WriterError::TooLarge { what: "string table entry" })?;
        let new_size = self.bytes.len() + STRING_LEN_PREFIX + text.len();
        if u32::try_from(new_size).is_err() {
            return Err(WriterError::TooLarge { what: "string table" });
        }

        self.bytes.extend_from_slice(&len.to_le_bytes());
        self.bytes.extend_from_slice(text.as_bytes());
        self.index.insert(text.to_owned(), StrOffset(offset));
        Ok(StrOffset(offset))
    }

    /// Encoded table bytes, ready to be copied into the trace
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of distinct entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read-side view over the bytes written so far
    #[must_use]
    pub fn view(&self) -> StringTableView<'_> {
        StringTableView::new(&self.bytes)
    }
}

/// Zero-copy view over an encoded string table
#[derive(Debug, Clone, Copy)]
pub struct StringTableView<'a> {
    bytes: &'a [u8],
}

impl<'a> StringTableView<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Size of the table in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Resolve the entry starting at `offset`.
    ///
    /// # Errors
    /// - [`FormatError::OutOfRange`] if `offset` is not inside the table
    /// - [`FormatError::MalformedEntry`] if the entry overruns the table or
    ///   is not UTF-8
    pub fn resolve(&self, offset: StrOffset) -> Result<&'a str, FormatError> {
        let start = offset.0 as usize;
        if start >= self.bytes.len() {
            return Err(FormatError::OutOfRange {
                offset: offset.0,
                table_size: u32::try_from(self.bytes.len()).unwrap_or(u32::MAX),
            });
        }

        let len = read_u32(self.bytes, start).ok_or(FormatError::MalformedEntry {
            offset: offset.0,
            reason: "length prefix runs past the end of the table",
        })? as usize;

        let text_start = start + STRING_LEN_PREFIX;
        let text = text_start
            .checked_add(len)
            .and_then(|text_end| self.bytes.get(text_start..text_end))
            .ok_or(FormatError::MalformedEntry {
                offset: offset.0,
                reason: "entry runs past the end of the table",
            })?;

        std::str::from_utf8(text).map_err(|_| FormatError::MalformedEntry {
            offset: offset.0,
            reason: "entry is not valid UTF-8",
        })
    }

    /// Walk the table entry by entry, stopping at the first malformed entry
    pub fn entries(&self) -> impl Iterator<Item = Result<(StrOffset, &'a str), FormatError>> + 'a {
        let view = *self;
        let mut cursor = 0usize;
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed || cursor >= view.bytes.len() {
                return None;
            }
            let offset = StrOffset(u32::try_from(cursor).ok()?);
            match view.resolve(offset) {
                Ok(text) => {
                    cursor += STRING_LEN_PREFIX + text.len();
                    Some(Ok((offset, text)))
                }
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
            }
        })
    }
}
