//! Renderers that echo the flat begin/end stream: plain text, YAML, and XML.

use std::io::{self, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlEventWriter;

use crate::trace::{kind_string, BeginEntry, EndEntry, EntrySink, SourceLocation};

fn location_string(location: &SourceLocation) -> String {
    format!("{}|{}|{}", location.file, location.line, location.column)
}

/// Renders entries as an indented plain-text listing.
pub struct TextWriter<W: Write> {
    out: W,
}

impl<W: Write> TextWriter<W> {
    /// Creates a writer targeting `out`.
    pub fn new(out: W) -> TextWriter<W> {
        TextWriter { out }
    }
}

impl<W: Write> EntrySink for TextWriter<W> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        writeln!(self.out, "  SourceFile = {}", source_name)
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        writeln!(self.out, "TemplateBegin")?;
        writeln!(self.out, "  Kind = {}", kind_string(entry.kind))?;
        writeln!(self.out, "  Name = {}", entry.name)?;
        writeln!(self.out, "  Location = {}", location_string(&entry.location))?;
        writeln!(self.out, "  TimeStamp = {:.9}", entry.time_stamp)?;
        writeln!(self.out, "  MemoryUsage = {}", entry.memory_usage)?;
        if let Some(origin) = &entry.template_origin {
            writeln!(self.out, "  TemplateOrigin = {}", location_string(origin))?;
        }
        Ok(())
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        writeln!(self.out, "TemplateEnd")?;
        writeln!(self.out, "  TimeStamp = {:.9}", entry.time_stamp)?;
        writeln!(self.out, "  MemoryUsage = {}", entry.memory_usage)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Renders each source file's entries as one YAML document.
pub struct YamlWriter<W: Write> {
    out: W,
}

impl<W: Write> YamlWriter<W> {
    /// Creates a writer targeting `out`.
    pub fn new(out: W) -> YamlWriter<W> {
        YamlWriter { out }
    }
}

impl<W: Write> EntrySink for YamlWriter<W> {
    fn initialize(&mut self, _source_name: &str) -> io::Result<()> {
        writeln!(self.out, "---")
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        writeln!(self.out, "- IsBegin:         true")?;
        writeln!(self.out, "  Kind:            {}", kind_string(entry.kind))?;
        writeln!(self.out, "  Name:            '{}'", entry.name)?;
        writeln!(
            self.out,
            "  Location:        '{}'",
            location_string(&entry.location)
        )?;
        writeln!(self.out, "  TimeStamp:       {:.9}", entry.time_stamp)?;
        writeln!(self.out, "  MemoryUsage:     {}", entry.memory_usage)?;
        if let Some(origin) = &entry.template_origin {
            writeln!(
                self.out,
                "  TemplateOrigin:  '{}'",
                location_string(origin)
            )?;
        }
        Ok(())
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        writeln!(self.out, "- IsBegin:         false")?;
        writeln!(self.out, "  TimeStamp:       {:.9}", entry.time_stamp)?;
        writeln!(self.out, "  MemoryUsage:     {}", entry.memory_usage)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        writeln!(self.out, "...")?;
        self.out.flush()
    }
}

/// Renders each source file's entries as one flat XML document.
pub struct XmlWriter<W: Write> {
    xml: XmlEventWriter<W>,
}

impl<W: Write> XmlWriter<W> {
    /// Creates a writer targeting `out`.
    pub fn new(out: W) -> XmlWriter<W> {
        XmlWriter {
            xml: XmlEventWriter::new_with_indent(out, b' ', 4),
        }
    }

    fn simple_element(&mut self, name: &str, text: &str) -> io::Result<()> {
        self.xml.write_event(Event::Start(BytesStart::new(name)))?;
        self.xml.write_event(Event::Text(BytesText::new(text)))?;
        self.xml.write_event(Event::End(BytesEnd::new(name)))
    }

    fn cost_elements(&mut self, time_stamp: f64, memory_usage: u64) -> io::Result<()> {
        let time = format!("{:.9}", time_stamp);
        let mut elem = BytesStart::new("TimeStamp");
        elem.push_attribute(("time", time.as_str()));
        self.xml.write_event(Event::Empty(elem))?;

        let bytes = memory_usage.to_string();
        let mut elem = BytesStart::new("MemoryUsage");
        elem.push_attribute(("bytes", bytes.as_str()));
        self.xml.write_event(Event::Empty(elem))
    }
}

impl<W: Write> EntrySink for XmlWriter<W> {
    fn initialize(&mut self, _source_name: &str) -> io::Result<()> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", None, Some("yes"))))?;
        self.xml.write_event(Event::Start(BytesStart::new("Trace")))
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        self.xml
            .write_event(Event::Start(BytesStart::new("TemplateBegin")))?;
        self.simple_element("Kind", kind_string(entry.kind))?;

        let mut context = BytesStart::new("Context");
        context.push_attribute(("context", entry.name.as_str()));
        self.xml.write_event(Event::Empty(context))?;

        self.simple_element("Location", &location_string(&entry.location))?;
        self.cost_elements(entry.time_stamp, entry.memory_usage)?;

        if let Some(origin) = &entry.template_origin {
            self.simple_element("TemplateOrigin", &location_string(origin))?;
        }
        self.xml
            .write_event(Event::End(BytesEnd::new("TemplateBegin")))
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        self.xml
            .write_event(Event::Start(BytesStart::new("TemplateEnd")))?;
        self.cost_elements(entry.time_stamp, entry.memory_usage)?;
        self.xml
            .write_event(Event::End(BytesEnd::new("TemplateEnd")))
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.xml.write_event(Event::End(BytesEnd::new("Trace")))?;
        self.xml.get_mut().flush()
    }
}
