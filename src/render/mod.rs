/// Flat renderers: text, YAML, and XML echoes of the entry stream.
pub mod flat;

/// The meta-call-graph and its renderers.
pub mod graph;

/// The blacklist-filtering driver.
pub mod printer;

/// Tree reconstruction and the tree renderers.
pub mod tree;

use std::io::Write;
use std::str::FromStr;

use crate::trace::write::{Compression, ProtobufWriter};
use crate::trace::EntrySink;

pub use self::graph::GraphOptions;
pub use self::printer::{Blacklist, Printer};

use self::flat::{TextWriter, XmlWriter, YamlWriter};
use self::graph::{CallGraphWriter, CallGrindRender, GraphMlCgRender, GraphVizCgRender};
use self::tree::{GraphMlRender, GraphVizRender, NestedXmlRender, TreeWriter};

/// The supported output representations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// The compact binary format (re-encoded).
    Protobuf,
    /// Flat YAML event listing.
    Yaml,
    /// Flat XML event listing.
    Xml,
    /// Flat plain-text event listing.
    Text,
    /// The instantiation tree as GraphML.
    GraphMl,
    /// The instantiation tree as a GraphViz digraph.
    GraphViz,
    /// The instantiation tree as nested XML.
    NestedXml,
    /// The meta-call-graph as GraphML.
    GraphMlCg,
    /// The meta-call-graph as a GraphViz digraph.
    GraphVizCg,
    /// The meta-call-graph as a CallGrind profile.
    CallGrind,
}

impl FromStr for Format {
    type Err = ();

    fn from_str(name: &str) -> Result<Format, ()> {
        match name {
            "" | "protobuf" => Ok(Format::Protobuf),
            "yaml" => Ok(Format::Yaml),
            "xml" => Ok(Format::Xml),
            "text" => Ok(Format::Text),
            "graphml" => Ok(Format::GraphMl),
            "graphviz" => Ok(Format::GraphViz),
            "nestedxml" => Ok(Format::NestedXml),
            "graphml-cg" => Ok(Format::GraphMlCg),
            "graphviz-cg" => Ok(Format::GraphVizCg),
            "callgrind" => Ok(Format::CallGrind),
            _ => Err(()),
        }
    }
}

/// Builds the renderer for `format` writing to `out`.
///
/// `compression` only affects the binary format; `options` only affect the
/// call-graph builders.
pub fn make_sink(
    format: Format,
    out: Box<dyn Write>,
    compression: Compression,
    options: GraphOptions,
) -> Box<dyn EntrySink> {
    match format {
        Format::Protobuf => Box::new(ProtobufWriter::new(out, compression)),
        Format::Yaml => Box::new(YamlWriter::new(out)),
        Format::Xml => Box::new(XmlWriter::new(out)),
        Format::Text => Box::new(TextWriter::new(out)),
        Format::GraphMl => Box::new(TreeWriter::new(GraphMlRender::new(out))),
        Format::GraphViz => Box::new(TreeWriter::new(GraphVizRender::new(out))),
        Format::NestedXml => Box::new(TreeWriter::new(NestedXmlRender::new(out))),
        Format::GraphMlCg => Box::new(CallGraphWriter::new(GraphMlCgRender::new(out), options)),
        Format::GraphVizCg => Box::new(CallGraphWriter::new(GraphVizCgRender::new(out), options)),
        Format::CallGrind => Box::new(CallGraphWriter::new(CallGrindRender::new(out), options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse() {
        assert_eq!("protobuf".parse(), Ok(Format::Protobuf));
        assert_eq!("graphml-cg".parse(), Ok(Format::GraphMlCg));
        assert_eq!("callgrind".parse(), Ok(Format::CallGrind));
        assert_eq!("".parse(), Ok(Format::Protobuf));
        assert_eq!("svg".parse::<Format>(), Err(()));
    }
}
