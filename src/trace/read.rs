//! Streaming decoder for the binary trace format.
//!
//! A trace stream is a sequence of length-delimited records, one per source
//! file, each containing a header followed by begin/end entries in stream
//! order. Name-dictionary and file-table chunks are interleaved with the
//! entries; the reader consumes them silently as the side effects they are
//! and only surfaces the records a caller can act on.

use std::io::{self, Read};

use fnv::FnvHashMap;

use super::dict::NameDict;
use super::wire::{self, Decoder};
use super::{BeginEntry, EndEntry, SourceLocation};

const OUTER_TRACES: u32 = 1;
const TOP_HEADER: u32 = 1;
const TOP_ENTRY: u32 = 2;
const TOP_NAMES: u32 = 3;

/// One element of a trace stream.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceRecord {
    /// Start of a new trace; one per source file, before its entries.
    Header {
        /// Format version stamped by the producer.
        version: u32,
        /// Name of the translation unit the trace was recorded for.
        source_file: Option<String>,
    },
    /// The beginning half of an entry.
    Begin(BeginEntry),
    /// The ending half of an entry.
    End(EndEntry),
}

/// Streaming reader over the binary trace format.
///
/// Yields [`TraceRecord`]s until the underlying stream is exhausted. The
/// name dictionary and the file-name table live as long as the reader, so
/// several concatenated trace records may share one dictionary.
pub struct TraceReader<R> {
    input: R,
    record: Vec<u8>,
    pos: usize,
    names: NameDict,
    files: FnvHashMap<u32, String>,
}

impl<R: Read> TraceReader<R> {
    /// Creates a reader over `input`.
    pub fn new(input: R) -> TraceReader<R> {
        TraceReader {
            input,
            record: Vec::new(),
            pos: 0,
            names: NameDict::new(),
            files: FnvHashMap::default(),
        }
    }

    /// Loads the next outer record into the buffer. Returns `false` on a
    /// clean end of stream.
    fn refill(&mut self) -> io::Result<bool> {
        loop {
            let key = match wire::read_varint_stream(&mut self.input)? {
                Some(key) => key,
                None => return Ok(false),
            };
            let field = (key >> 3) as u32;
            let wiretype = (key & 0x7) as u8;
            if wiretype != wire::LEN {
                return invalid_data_error!("unexpected wire type {} at stream level", wiretype);
            }
            let len = match wire::read_varint_stream(&mut self.input)? {
                Some(len) => len as usize,
                None => return invalid_data_error!("truncated record length"),
            };
            self.record.resize(len, 0);
            self.input
                .read_exact(&mut self.record)
                .map_err(|_| truncated_record())?;
            self.pos = 0;
            if field == OUTER_TRACES {
                return Ok(true);
            }
            // An unknown stream-level field: discard its payload and move on.
        }
    }

    fn next_record(&mut self) -> io::Result<Option<TraceRecord>> {
        loop {
            if self.pos >= self.record.len() {
                if !self.refill()? {
                    return Ok(None);
                }
                continue;
            }
            let mut dec = Decoder::new(&self.record[self.pos..]);
            let (field, wiretype) = dec.field_key()?;
            let parsed = match (field, wiretype) {
                (TOP_HEADER, wire::LEN) => Some(parse_header(dec.bytes()?)?),
                (TOP_ENTRY, wire::LEN) => {
                    Some(parse_entry(dec.bytes()?, &self.names, &mut self.files)?)
                }
                (TOP_NAMES, wire::LEN) => {
                    parse_dict_entry(dec.bytes()?, &mut self.names)?;
                    None
                }
                (_, wiretype) => {
                    dec.skip(wiretype)?;
                    None
                }
            };
            self.pos += dec.consumed();
            if let Some(record) = parsed {
                return Ok(Some(record));
            }
        }
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = io::Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn truncated_record() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "truncated trace record")
}

fn parse_header(buf: &[u8]) -> io::Result<TraceRecord> {
    let mut dec = Decoder::new(buf);
    let mut version = 0;
    let mut source_file = None;
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::VARINT) => version = dec.varint()? as u32,
            (2, wire::LEN) => source_file = Some(dec.string()?),
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    Ok(TraceRecord::Header {
        version,
        source_file,
    })
}

fn parse_entry(
    buf: &[u8],
    names: &NameDict,
    files: &mut FnvHashMap<u32, String>,
) -> io::Result<TraceRecord> {
    let mut dec = Decoder::new(buf);
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::LEN) => {
                return Ok(TraceRecord::Begin(parse_begin(dec.bytes()?, names, files)?))
            }
            (2, wire::LEN) => return Ok(TraceRecord::End(parse_end(dec.bytes()?)?)),
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    invalid_data_error!("trace entry holds neither a begin nor an end")
}

fn parse_begin(
    buf: &[u8],
    names: &NameDict,
    files: &mut FnvHashMap<u32, String>,
) -> io::Result<BeginEntry> {
    let mut entry = BeginEntry::default();
    let mut dec = Decoder::new(buf);
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::VARINT) => entry.kind = dec.varint()? as u32,
            (2, wire::LEN) => entry.name = parse_name(dec.bytes()?, names)?,
            (3, wire::LEN) => entry.location = parse_location(dec.bytes()?, files)?,
            (4, wire::FIXED64) => entry.time_stamp = dec.double()?,
            (5, wire::VARINT) => entry.memory_usage = dec.varint()?,
            (6, wire::LEN) => entry.template_origin = Some(parse_location(dec.bytes()?, files)?),
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    Ok(entry)
}

fn parse_end(buf: &[u8]) -> io::Result<EndEntry> {
    let mut entry = EndEntry::default();
    let mut dec = Decoder::new(buf);
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::FIXED64) => entry.time_stamp = dec.double()?,
            (2, wire::VARINT) => entry.memory_usage = dec.varint()?,
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    Ok(entry)
}

fn parse_name(buf: &[u8], names: &NameDict) -> io::Result<String> {
    let mut dec = Decoder::new(buf);
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::LEN) => return dec.string(),
            (2, wire::LEN) => {
                return invalid_data_error!("compressed template names are not supported")
            }
            (3, wire::VARINT) => return Ok(names.get(dec.varint()? as u32)?.to_owned()),
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    invalid_data_error!("template name without any representation")
}

/// The first occurrence of a path carries both `file_name` and `file_id`;
/// later occurrences carry only the id.
fn parse_location(buf: &[u8], files: &mut FnvHashMap<u32, String>) -> io::Result<SourceLocation> {
    let mut dec = Decoder::new(buf);
    let mut file_name = None;
    let mut file_id = None;
    let mut location = SourceLocation::default();
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::LEN) => file_name = Some(dec.string()?),
            (2, wire::VARINT) => file_id = Some(dec.varint()? as u32),
            (3, wire::VARINT) => location.line = dec.varint()? as u32,
            (4, wire::VARINT) => location.column = dec.varint()? as u32,
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    location.file = match (file_name, file_id) {
        (Some(name), Some(id)) => {
            files.insert(id, name.clone());
            name
        }
        (Some(name), None) => name,
        (None, Some(id)) => match files.get(&id) {
            Some(name) => name.clone(),
            None => return invalid_data_error!("reference to unknown file id {}", id),
        },
        (None, None) => String::new(),
    };
    Ok(location)
}

fn parse_dict_entry(buf: &[u8], names: &mut NameDict) -> io::Result<()> {
    let mut dec = Decoder::new(buf);
    let mut marked_name = String::new();
    let mut marker_ids = Vec::new();
    while !dec.is_empty() {
        match dec.field_key()? {
            (1, wire::LEN) => marked_name = dec.string()?,
            (2, wire::VARINT) => marker_ids.push(dec.varint()? as u32),
            (_, wiretype) => dec.skip(wiretype)?,
        }
    }
    names.insert(&marked_name, &marker_ids)
}
