mod common;

use pretty_assertions::assert_eq;

use common::{begin, end, location, Ev};
use smelter::render::flat::{TextWriter, XmlWriter, YamlWriter};
use smelter::render::graph::{CallGraphWriter, CallGrindRender, GraphVizCgRender};
use smelter::render::graph::GraphMlCgRender;
use smelter::render::tree::{GraphMlRender, GraphVizRender, NestedXmlRender, TreeWriter};
use smelter::render::GraphOptions;
use smelter::trace::TEMPLATE_INSTANTIATION;

fn simple_events() -> Vec<Ev> {
    vec![
        Ev::Begin(begin(0, "A<int>", 0.5, 100)),
        Ev::End(end(1.0, 200)),
    ]
}

macro_rules! rendered {
    ($make:expr, $events:expr $(,)?) => {{
        let mut buf = Vec::new();
        {
            let mut sink = $make(&mut buf);
            common::drive(&mut sink, "input.cpp", $events);
        }
        String::from_utf8(buf).unwrap()
    }};
}

#[test]
fn text_output() {
    let out = rendered!(|buf| TextWriter::new(buf), &simple_events());
    assert_eq!(
        out,
        "  SourceFile = input.cpp\n\
         TemplateBegin\n\
         \x20 Kind = TemplateInstantiation\n\
         \x20 Name = A<int>\n\
         \x20 Location = input.cpp|10|5\n\
         \x20 TimeStamp = 0.500000000\n\
         \x20 MemoryUsage = 100\n\
         TemplateEnd\n\
         \x20 TimeStamp = 1.000000000\n\
         \x20 MemoryUsage = 200\n"
    );
}

#[test]
fn text_output_includes_template_origin() {
    let mut entry = begin(23, "A<int>", 0.5, 0);
    entry.template_origin = Some(location("lib.hpp", 7, 2));
    let events = vec![Ev::Begin(entry), Ev::End(end(1.0, 0))];
    let out = rendered!(|buf| TextWriter::new(buf), &events);
    assert!(out.contains("  Kind = Memoization\n"));
    assert!(out.contains("  TemplateOrigin = lib.hpp|7|2\n"));
}

#[test]
fn yaml_output() {
    let out = rendered!(|buf| YamlWriter::new(buf), &simple_events());
    assert_eq!(
        out,
        "---\n\
         - IsBegin:         true\n\
         \x20 Kind:            TemplateInstantiation\n\
         \x20 Name:            'A<int>'\n\
         \x20 Location:        'input.cpp|10|5'\n\
         \x20 TimeStamp:       0.500000000\n\
         \x20 MemoryUsage:     100\n\
         - IsBegin:         false\n\
         \x20 TimeStamp:       1.000000000\n\
         \x20 MemoryUsage:     200\n\
         ...\n"
    );
}

#[test]
fn xml_output_escapes_names() {
    let events = vec![
        Ev::Begin(begin(0, "Pair<int, A&B>", 0.5, 0)),
        Ev::End(end(1.0, 0)),
    ];
    let out = rendered!(|buf| XmlWriter::new(buf), &events);
    assert!(out.starts_with("<?xml version=\"1.0\" standalone=\"yes\"?>"));
    assert!(out.contains("<Trace>"));
    assert!(out.contains("</Trace>"));
    assert!(out.contains("<Kind>TemplateInstantiation</Kind>"));
    assert!(out.contains("Pair&lt;int, A&amp;B"));
    assert!(out.contains("<Location>input.cpp|10|5</Location>"));
    assert!(out.contains("<TemplateEnd>"));
    assert!(!out.contains("Pair<int"));
}

#[test]
fn nested_xml_output_nests_children() {
    let events = vec![
        Ev::Begin(begin(0, "Outer", 0.0, 0)),
        Ev::Begin(begin(0, "Inner", 1.0, 10)),
        Ev::End(end(2.0, 30)),
        Ev::End(end(4.0, 100)),
    ];
    let out = rendered!(|buf| TreeWriter::new(NestedXmlRender::new(buf)), &events);
    let outer = out.find("Name=\"Outer\"").unwrap();
    let inner = out.find("Name=\"Inner\"").unwrap();
    assert!(outer < inner);
    assert!(out.contains("Time=\"4.000000000\""));
    assert!(out.contains("Time=\"1.000000000\""));
    assert!(out.contains("Memory=\"100\""));
    assert!(out.contains("Memory=\"20\""));
    assert_eq!(out.matches("</Entry>").count(), 2);
}

#[test]
fn graphml_tree_output_links_parent_to_child() {
    let events = vec![
        Ev::Begin(begin(0, "Outer<X>", 0.0, 0)),
        Ev::Begin(begin(0, "Inner", 1.0, 0)),
        Ev::End(end(2.0, 0)),
        Ev::End(end(4.0, 0)),
    ];
    let out = rendered!(|buf| TreeWriter::new(GraphMlRender::new(buf)), &events);
    assert!(out.contains("<graphml"));
    assert!(out.contains("<key id=\"d0\" for=\"node\" attr.name=\"Kind\" attr.type=\"string\"/>"));
    assert!(out.contains("<node id=\"n0\">"));
    assert!(out.contains("<node id=\"n1\">"));
    assert!(out.contains("source=\"n0\" target=\"n1\""));
    assert!(out.contains("\"Outer&lt;X&gt;\""));
    assert!(out.ends_with("</graphml>"));
}

#[test]
fn graphviz_tree_output() {
    let events = vec![
        Ev::Begin(begin(0, "Outer", 0.0, 0)),
        Ev::Begin(begin(0, "Inner", 1.0, 10)),
        Ev::End(end(2.0, 30)),
        Ev::End(end(4.0, 100)),
    ];
    let out = rendered!(|buf| TreeWriter::new(GraphVizRender::new(buf)), &events);
    assert_eq!(
        out,
        "digraph Trace {\n\
         n0 [label = \"TemplateInstantiation\\nOuter\\nAt input.cpp Line 10 Column 5\\nTime: 4.000000000 seconds Memory: 100 bytes\"];\n\
         n1 [label = \"TemplateInstantiation\\nInner\\nAt input.cpp Line 10 Column 5\\nTime: 1.000000000 seconds Memory: 20 bytes\"];\n\
         n0 -> n1;\n\
         }\n"
    );
}

fn callgraph_events() -> Vec<Ev> {
    let mut a = begin(TEMPLATE_INSTANTIATION, "A", 0.0, 0);
    a.template_origin = Some(location("a.hpp", 3, 1));
    vec![
        Ev::Begin(a),
        Ev::Begin(begin(TEMPLATE_INSTANTIATION, "B", 1.0, 10)),
        Ev::End(end(4.0, 50)),
        Ev::End(end(10.0, 100)),
    ]
}

#[test]
fn callgrind_output() {
    let out = rendered!(
        |buf| CallGraphWriter::new(CallGrindRender::new(buf), GraphOptions::default()),
        &callgraph_events(),
    );
    assert_eq!(
        out,
        "version: 1\n\
         positions: line\n\
         event: CTime : Compilation Time (ns)\n\
         event: CMem : Compiler Memory Usage (bytes)\n\
         events: CTime CMem\n\
         summary: 10000000000 100\n\
         \n\
         fl=input.cpp\n\
         fn=global\n\
         10 0 0\n\
         cfi=a.hpp\n\
         cfn=A\n\
         calls=1 3\n\
         10 10000000000 100\n\
         \n\
         fl=a.hpp\n\
         fn=A\n\
         3 7000000000 60\n\
         cfi=\n\
         cfn=B\n\
         calls=1 0\n\
         10 3000000000 40\n\
         \n\
         fl=\n\
         fn=B\n\
         0 3000000000 40\n"
    );
}

#[test]
fn graphviz_callgraph_output() {
    let out = rendered!(
        |buf| CallGraphWriter::new(GraphVizCgRender::new(buf), GraphOptions::default()),
        &callgraph_events(),
    );
    assert_eq!(
        out,
        "digraph G {\n\
         0 [label=\"Time: 10.000000000 seconds | CompleteTranslationUnit\"];\n\
         1 [label=\"Time: 7.000000000 seconds | A\"];\n\
         2 [label=\"Time: 3.000000000 seconds | B\"];\n\
         0 -> 1;\n\
         1 -> 2;\n\
         }\n"
    );
}

#[test]
fn graphml_callgraph_output_carries_edge_costs() {
    let out = rendered!(
        |buf| CallGraphWriter::new(GraphMlCgRender::new(buf), GraphOptions::default()),
        &callgraph_events(),
    );
    assert!(out.contains("attr.name=\"FromLocation\""));
    assert!(out.contains("<node id=\"n0\">"));
    assert!(out.contains("\"CompleteTranslationUnit\""));
    // Vertex exclusive time of A, redistributed.
    assert!(out.contains("7.000000000"));
    // Edge inclusive time of root -> A.
    assert!(out.contains("10.000000000"));
    assert!(out.contains("<edge id=\"e0_0\" source=\"n0\" target=\"n1\">"));
    assert!(out.ends_with("</graphml>"));
}


