// WTV METADATA - Windows Recorded TV Metadata Reader
//
// Media Center writes the recording's guide data (title, episode, channel,
// original air date, thumbnail, ...) as a run of tagged records inside the
// WTV container, starting at a fixed offset.
//
// Each record:
//   marker (16 bytes) | tag (u32 LE) | length (u32 LE) | name (UTF-16LE, NUL) | payload
//
// The run ends at the first position where the marker doesn't match.

pub mod reader;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WtvError};
use reader::{bytes_to_hex, decode_wide_payload, get_wide_cstr, read_marker, read_u32_le, read_wide_cstr};

// ============================================================================
// Format Constants
// ============================================================================

/// File offset of the first metadata record.
pub const METADATA_OFFSET: u64 = 0x12000;

/// Bytes between an image's MIME type and its raw data.
pub const IMAGE_HEADER_SKIP: usize = 31;

// ============================================================================
// Structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    Integer,
    String,
    Image,
    Boolean,
    Long,
    Other,
    Guid,
}

impl MetaType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(MetaType::Integer),
            1 => Some(MetaType::String),
            2 => Some(MetaType::Image),
            3 => Some(MetaType::Boolean),
            4 => Some(MetaType::Long),
            5 => Some(MetaType::Other),
            6 => Some(MetaType::Guid),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            MetaType::Integer => 0,
            MetaType::String => 1,
            MetaType::Image => 2,
            MetaType::Boolean => 3,
            MetaType::Long => 4,
            MetaType::Other => 5,
            MetaType::Guid => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetaType::Integer => "Integer",
            MetaType::String => "String",
            MetaType::Image => "Image",
            MetaType::Boolean => "Boolean",
            MetaType::Long => "Long",
            MetaType::Other => "Other",
            MetaType::Guid => "Guid",
        }
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Integer(i32),
    String(String),
    Boolean(bool),
    Long(i64),
    /// Hex rendering of the raw GUID bytes
    Guid(String),
    Image { mime: String, data: Vec<u8> },
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Integer(v) => write!(f, "{}", v),
            MetaValue::String(s) | MetaValue::Guid(s) => f.write_str(s),
            MetaValue::Boolean(b) => write!(f, "{}", b),
            MetaValue::Long(v) => write!(f, "{}", v),
            MetaValue::Image { mime, data } => write!(f, "<{}, {} bytes>", mime, data.len()),
        }
    }
}

/// One decoded metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    pub name: String,
    pub kind: MetaType,
    pub value: MetaValue,
}

impl fmt::Display for MetaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.kind, self.value)
    }
}

// ============================================================================
// Decoded Metadata (insertion ordered)
// ============================================================================

/// Fields keyed by name, iterated in the order they first appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WtvMetadata {
    entries: Vec<MetaEntry>,
    index: HashMap<String, usize>,
}

impl WtvMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry`. A repeated name overwrites the earlier value in place
    /// and returns it.
    pub fn insert(&mut self, entry: MetaEntry) -> Option<MetaEntry> {
        match self.index.get(&entry.name) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos], entry)),
            None => {
                self.index.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetaEntry> {
        self.index.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetaEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn into_entries(self) -> Vec<MetaEntry> {
        self.entries
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.get(name)?.value {
            MetaValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        match self.get(name)?.value {
            MetaValue::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)?.value {
            MetaValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Text of a String, Other or Guid field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match &self.get(name)?.value {
            MetaValue::String(s) | MetaValue::Guid(s) => Some(s),
            _ => None,
        }
    }

    pub fn images(&self) -> impl Iterator<Item = (&str, &str, &[u8])> {
        self.entries.iter().filter_map(|e| match &e.value {
            MetaValue::Image { mime, data } => Some((e.name.as_str(), mime.as_str(), data.as_slice())),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a WtvMetadata {
    type Item = &'a MetaEntry;
    type IntoIter = std::slice::Iter<'a, MetaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Where the first record's marker is expected
    pub start_offset: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            start_offset: METADATA_OFFSET,
        }
    }
}

pub struct WtvMetaParser<R: Read + Seek> {
    reader: BufReader<R>,
    options: ParseOptions,
    started: bool,
    finished: bool,
}

impl<R: Read + Seek> WtvMetaParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    pub fn with_options(reader: R, options: ParseOptions) -> Self {
        Self {
            reader: BufReader::new(reader),
            options,
            started: false,
            finished: false,
        }
    }

    /// Decode every record from the start offset until the marker stops matching.
    pub fn parse(mut self) -> Result<WtvMetadata> {
        let mut metadata = WtvMetadata::new();
        while let Some(entry) = self.next_entry()? {
            if let Some(previous) = metadata.insert(entry) {
                tracing::debug!("WTV field {:?} repeated, keeping latest value", previous.name);
            }
        }
        tracing::info!("Parsed {} WTV metadata fields", metadata.len());
        Ok(metadata)
    }

    /// Decode a single record. Returns `None` once the marker no longer
    /// matches, and on every call after that or after an error.
    pub fn next_entry(&mut self) -> Result<Option<MetaEntry>> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_entry();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn read_entry(&mut self) -> Result<Option<MetaEntry>> {
        if !self.started {
            self.reader.seek(SeekFrom::Start(self.options.start_offset))?;
            self.started = true;
        }

        let offset = self.reader.stream_position()?;
        if !read_marker(&mut self.reader)? {
            tracing::trace!("No WTV metadata marker at offset {:#x}", offset);
            return Ok(None);
        }

        let tag = read_u32_le(&mut self.reader)?;
        let length = read_u32_le(&mut self.reader)?;
        let name = read_wide_cstr(&mut self.reader)?;
        let payload = self.read_payload(length)?;

        let kind = match MetaType::from_tag(tag) {
            Some(kind) => kind,
            None => {
                tracing::warn!("Unknown WTV metadata type {} for {:?} at {:#x}", tag, name, offset);
                return Err(WtvError::UnknownType { tag, name });
            }
        };

        tracing::debug!(
            "WTV field {:?}: type={} length={} offset={:#x}",
            name,
            kind,
            length,
            offset
        );

        let value = decode_value(&name, kind, &payload)?;
        Ok(Some(MetaEntry { name, kind, value }))
    }

    fn read_payload(&mut self, length: u32) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(u64::from(length))
            .read_to_end(&mut payload)?;
        if payload.len() != length as usize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload truncated: expected {} bytes, got {}", length, payload.len()),
            )
            .into());
        }
        Ok(payload)
    }
}

impl<R: Read + Seek> Iterator for WtvMetaParser<R> {
    type Item = Result<MetaEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

fn decode_value(name: &str, kind: MetaType, payload: &[u8]) -> Result<MetaValue> {
    let too_short = |needed: usize| WtvError::PayloadTooShort {
        name: name.to_string(),
        kind,
        needed,
        actual: payload.len(),
    };
    let mut buf = payload;

    let value = match kind {
        MetaType::Integer => {
            if buf.remaining() < 4 {
                return Err(too_short(4));
            }
            MetaValue::Integer(buf.get_i32_le())
        }
        // Only a trailing NUL unit is dropped; unterminated text stays whole.
        MetaType::String | MetaType::Other => MetaValue::String(decode_wide_payload(payload)),
        MetaType::Boolean => {
            if !buf.has_remaining() {
                return Err(too_short(1));
            }
            MetaValue::Boolean(buf.get_u8() != 0)
        }
        MetaType::Long => {
            if buf.remaining() < 8 {
                return Err(too_short(8));
            }
            MetaValue::Long(buf.get_i64_le())
        }
        MetaType::Guid => MetaValue::Guid(bytes_to_hex(payload)),
        MetaType::Image => {
            let mime = get_wide_cstr(&mut buf)?;
            if buf.remaining() < IMAGE_HEADER_SKIP {
                let consumed = payload.len() - buf.remaining();
                return Err(too_short(consumed + IMAGE_HEADER_SKIP));
            }
            buf.advance(IMAGE_HEADER_SKIP);
            MetaValue::Image {
                mime,
                data: buf.to_vec(),
            }
        }
    };

    Ok(value)
}

// ============================================================================
// Convenience
// ============================================================================

pub fn parse_reader<R: Read + Seek>(reader: R) -> Result<WtvMetadata> {
    WtvMetaParser::new(reader).parse()
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WtvMetadata> {
    let path = path.as_ref();
    tracing::debug!("Reading WTV metadata from {}", path.display());
    let file = File::open(path)?;
    WtvMetaParser::new(file).parse()
}

// ============================================================================
// Tests
// ============================================================================
