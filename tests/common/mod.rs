#![allow(dead_code)]

use smelter::trace::read::{TraceReader, TraceRecord};
use smelter::trace::write::{Compression, ProtobufWriter};
use smelter::trace::{BeginEntry, EndEntry, EntrySink, SourceLocation};

/// One event of a trace under construction.
pub enum Ev {
    Begin(BeginEntry),
    End(EndEntry),
}

pub fn location(file: &str, line: u32, column: u32) -> SourceLocation {
    SourceLocation {
        file: file.to_owned(),
        line,
        column,
    }
}

pub fn begin(kind: u32, name: &str, time_stamp: f64, memory_usage: u64) -> BeginEntry {
    BeginEntry {
        kind,
        name: name.to_owned(),
        location: location("input.cpp", 10, 5),
        time_stamp,
        memory_usage,
        template_origin: None,
    }
}

pub fn end(time_stamp: f64, memory_usage: u64) -> EndEntry {
    EndEntry {
        time_stamp,
        memory_usage,
    }
}

/// Feeds `events` through `sink` as one source file.
pub fn drive<S: EntrySink>(sink: &mut S, source: &str, events: &[Ev]) {
    sink.initialize(source).unwrap();
    for event in events {
        match event {
            Ev::Begin(entry) => sink.begin_entry(entry).unwrap(),
            Ev::End(entry) => sink.end_entry(entry).unwrap(),
        }
    }
    sink.finalize().unwrap();
}

/// Encodes `events` as one binary trace record.
pub fn encode(compression: Compression, source: &str, events: &[Ev]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = ProtobufWriter::new(&mut buf, compression);
    drive(&mut writer, source, events);
    drop(writer);
    buf
}

/// Decodes a whole stream, panicking on any parse error.
pub fn decode(bytes: &[u8]) -> Vec<TraceRecord> {
    TraceReader::new(bytes)
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap()
}
