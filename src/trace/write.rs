//! Streaming encoder for the binary trace format.

use std::io::{self, Write};

use fnv::FnvHashMap;

use super::dict::NameTable;
use super::wire::{put_double_field, put_len_field, put_varint, put_varint_field};
use super::{BeginEntry, EndEntry, EntrySink, SourceLocation};

/// How the writer encodes template names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Every occurrence spells the name out in full.
    Literal,
    /// Reserved for zlib-compressed names; selecting it is an error rather
    /// than a silent fallback.
    CompressedBytes,
    /// Names are factored through the shared dictionary and referenced by id.
    Dictionary,
}

impl Compression {
    /// Maps the numeric CLI mode to a compression variant.
    pub fn from_mode(mode: u32) -> Option<Compression> {
        match mode {
            0 => Some(Compression::Literal),
            1 => Some(Compression::CompressedBytes),
            2 => Some(Compression::Dictionary),
            _ => None,
        }
    }
}

/// Encoder producing the compact binary trace format.
///
/// Entries accumulate in an in-memory staging buffer; `finalize` flushes the
/// whole buffer to the output as one length-delimited record. The name
/// dictionary and file table outlive individual records, so a writer fed
/// several source files in sequence produces records that share one
/// dictionary.
pub struct ProtobufWriter<W: Write> {
    out: W,
    buffer: Vec<u8>,
    names: NameTable,
    files: FnvHashMap<String, u32>,
    compression: Compression,
}

impl<W: Write> ProtobufWriter<W> {
    /// Creates a writer targeting `out`.
    pub fn new(out: W, compression: Compression) -> ProtobufWriter<W> {
        ProtobufWriter {
            out,
            buffer: Vec::new(),
            names: NameTable::new(),
            files: FnvHashMap::default(),
            compression,
        }
    }

    fn encode_name(&mut self, name: &str) -> io::Result<Vec<u8>> {
        let mut msg = Vec::new();
        match self.compression {
            Compression::Literal => put_len_field(&mut msg, 1, name.as_bytes()),
            Compression::CompressedBytes => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "compressed-bytes name encoding is reserved",
                ))
            }
            Compression::Dictionary => {
                let id = self.names.intern(name);
                // Freshly minted entries go into the stream ahead of the
                // first reference to them.
                for entry in self.names.take_pending() {
                    let mut body = Vec::new();
                    put_len_field(&mut body, 1, entry.marked_name.as_bytes());
                    for marker in &entry.marker_ids {
                        put_varint_field(&mut body, 2, u64::from(*marker));
                    }
                    put_len_field(&mut self.buffer, 3, &body);
                }
                put_varint_field(&mut msg, 3, u64::from(id));
            }
        }
        Ok(msg)
    }

    fn encode_location(&mut self, location: &SourceLocation) -> Vec<u8> {
        let mut msg = Vec::new();
        match self.files.get(&location.file) {
            Some(&id) => put_varint_field(&mut msg, 2, u64::from(id)),
            None => {
                let id = self.files.len() as u32;
                put_len_field(&mut msg, 1, location.file.as_bytes());
                put_varint_field(&mut msg, 2, u64::from(id));
                self.files.insert(location.file.clone(), id);
            }
        }
        put_varint_field(&mut msg, 3, u64::from(location.line));
        put_varint_field(&mut msg, 4, u64::from(location.column));
        msg
    }

    fn push_entry(&mut self, body: Vec<u8>, oneof_field: u32) {
        let mut oneof = Vec::new();
        put_len_field(&mut oneof, oneof_field, &body);
        put_len_field(&mut self.buffer, 2, &oneof);
    }
}

impl<W: Write> EntrySink for ProtobufWriter<W> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        let mut header = Vec::new();
        put_varint_field(&mut header, 1, 1); // version
        if !source_name.is_empty() {
            put_len_field(&mut header, 2, source_name.as_bytes());
        }
        put_len_field(&mut self.buffer, 1, &header);
        Ok(())
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        let name = self.encode_name(&entry.name)?;
        let mut body = Vec::new();
        put_varint_field(&mut body, 1, u64::from(entry.kind));
        put_len_field(&mut body, 2, &name);
        let location = self.encode_location(&entry.location);
        put_len_field(&mut body, 3, &location);
        put_double_field(&mut body, 4, entry.time_stamp);
        if entry.memory_usage > 0 {
            put_varint_field(&mut body, 5, entry.memory_usage);
        }
        if let Some(origin) = &entry.template_origin {
            if !origin.file.is_empty() {
                let origin = self.encode_location(origin);
                put_len_field(&mut body, 6, &origin);
            }
        }
        self.push_entry(body, 1);
        Ok(())
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        let mut body = Vec::new();
        put_double_field(&mut body, 1, entry.time_stamp);
        if entry.memory_usage > 0 {
            put_varint_field(&mut body, 2, entry.memory_usage);
        }
        self.push_entry(body, 2);
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        let mut framing = Vec::new();
        put_varint(&mut framing, (1 << 3) | 2); // traces, length-delimited
        put_varint(&mut framing, self.buffer.len() as u64);
        self.out.write_all(&framing)?;
        self.out.write_all(&self.buffer)?;
        self.out.flush()?;
        self.buffer.clear();
        Ok(())
    }
}
