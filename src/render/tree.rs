//! Reconstructing the instantiation tree from the flat begin/end stream,
//! and the renderers that consume it.
//!
//! The recorder buffers one task per begin entry in a flat array laid out
//! in depth-first pre-order: a task's subtree is exactly the half-open index
//! range `(node_id, end_id)`. Renderers never see the array directly; the
//! replay walk turns it back into `open_node`/`close_node` callbacks in
//! true DFS pre-/post-order.

use std::io::{self, Write};

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlEventWriter;

use crate::trace::{kind_string, BeginEntry, EndEntry, EntrySink};

/// Sentinel index meaning "no parent" or "not yet closed".
pub const INVALID_ID: usize = usize::MAX;

/// One recorded node of the instantiation tree.
#[derive(Clone, Debug)]
pub struct TraversalTask {
    /// The entry that opened this node.
    pub begin: BeginEntry,
    /// The entry that closed it.
    pub end: EndEntry,
    /// This task's own index in the task array.
    pub node_id: usize,
    /// First index strictly after this subtree.
    pub end_id: usize,
    /// Index of the parent task, or [`INVALID_ID`] for roots.
    pub parent_id: usize,
}

impl TraversalTask {
    /// Inclusive wall-clock cost in seconds, as reported by the producer.
    pub fn time_delta(&self) -> f64 {
        self.end.time_stamp - self.begin.time_stamp
    }

    /// Inclusive wall-clock cost in nanoseconds, clamped at zero when the
    /// producer emitted out-of-order timestamps.
    pub fn time_delta_ns(&self) -> u64 {
        let dt = self.time_delta();
        if dt > 0.0 {
            (dt * 1e9) as u64
        } else {
            0
        }
    }

    /// Inclusive memory cost in bytes, clamped at zero.
    pub fn memory_delta(&self) -> u64 {
        self.end.memory_usage.saturating_sub(self.begin.memory_usage)
    }
}

/// Records the begin/end stream as a flat array of [`TraversalTask`]s.
pub struct DfsTreeRecorder {
    tasks: Vec<TraversalTask>,
    current_top: usize,
}

impl Default for DfsTreeRecorder {
    fn default() -> DfsTreeRecorder {
        DfsTreeRecorder {
            tasks: Vec::new(),
            current_top: INVALID_ID,
        }
    }
}

impl DfsTreeRecorder {
    /// Creates an empty recorder.
    pub fn new() -> DfsTreeRecorder {
        DfsTreeRecorder::default()
    }

    /// Opens a new node under the currently open one.
    pub fn begin_entry(&mut self, entry: &BeginEntry) {
        let node_id = self.tasks.len();
        self.tasks.push(TraversalTask {
            begin: entry.clone(),
            end: EndEntry::default(),
            node_id,
            end_id: INVALID_ID,
            parent_id: self.current_top,
        });
        self.current_top = node_id;
    }

    /// Closes the innermost open node. An end entry with nothing open is
    /// tolerated and dropped.
    pub fn end_entry(&mut self, entry: &EndEntry) {
        if self.current_top == INVALID_ID {
            return;
        }
        let end_id = self.tasks.len();
        let top = &mut self.tasks[self.current_top];
        top.end = *entry;
        top.end_id = end_id;
        self.current_top = top.parent_id;
    }

    /// The recorded tasks, in DFS pre-order.
    pub fn tasks(&self) -> &[TraversalTask] {
        &self.tasks
    }

    /// Drops all recorded state, ready for the next source file.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.current_top = INVALID_ID;
    }
}

/// A renderer driven by the tree replay.
pub trait TreeRender {
    /// Called once per source file, before the walk.
    fn initialize_tree(&mut self, source_name: &str) -> io::Result<()>;

    /// Called when the walk enters a node (pre-order).
    fn open_node(&mut self, task: &TraversalTask) -> io::Result<()>;

    /// Called when the walk leaves a node (post-order).
    fn close_node(&mut self, task: &TraversalTask) -> io::Result<()>;

    /// Called once per source file, after the walk.
    fn finalize_tree(&mut self) -> io::Result<()>;
}

/// Replays the recorded array as a depth-first walk.
///
/// An auxiliary stack of still-open indices stands in for the call stack:
/// before opening task `i`, every stacked task whose subtree ends at or
/// before `i` is closed.
pub(crate) fn replay<R: TreeRender + ?Sized>(
    tasks: &[TraversalTask],
    render: &mut R,
) -> io::Result<()> {
    let mut open: Vec<usize> = Vec::new();
    for (i, task) in tasks.iter().enumerate() {
        while let Some(&top) = open.last() {
            if tasks[top].end_id > i {
                break;
            }
            render.close_node(&tasks[top])?;
            open.pop();
        }
        render.open_node(task)?;
        open.push(i);
    }
    while let Some(top) = open.pop() {
        render.close_node(&tasks[top])?;
    }
    Ok(())
}

/// Adapts a [`TreeRender`] to the [`EntrySink`] contract by buffering the
/// stream and replaying it at `finalize`.
pub struct TreeWriter<R> {
    tree: DfsTreeRecorder,
    render: R,
}

impl<R: TreeRender> TreeWriter<R> {
    /// Creates a sink feeding `render`.
    pub fn new(render: R) -> TreeWriter<R> {
        TreeWriter {
            tree: DfsTreeRecorder::new(),
            render,
        }
    }

    /// Consumes the sink, returning the renderer.
    pub fn into_render(self) -> R {
        self.render
    }
}

impl<R: TreeRender> EntrySink for TreeWriter<R> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        self.render.initialize_tree(source_name)
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        self.tree.begin_entry(entry);
        Ok(())
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        self.tree.end_entry(entry);
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        replay(self.tree.tasks(), &mut self.render)?;
        self.tree.reset();
        self.render.finalize_tree()
    }
}

/// Escapes a string for use inside a double-quoted GraphViz label.
fn graphviz_label(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders the tree as nested XML, one `Entry` element per node.
pub struct NestedXmlRender<W: Write> {
    xml: XmlEventWriter<W>,
}

impl<W: Write> NestedXmlRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> NestedXmlRender<W> {
        NestedXmlRender {
            xml: XmlEventWriter::new_with_indent(out, b' ', 4),
        }
    }
}

impl<W: Write> TreeRender for NestedXmlRender<W> {
    fn initialize_tree(&mut self, _source_name: &str) -> io::Result<()> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", None, Some("yes"))))?;
        self.xml.write_event(Event::Start(BytesStart::new("Trace")))
    }

    fn open_node(&mut self, task: &TraversalTask) -> io::Result<()> {
        let begin = &task.begin;
        let location = format!(
            "{}|{}|{}",
            begin.location.file, begin.location.line, begin.location.column
        );
        let origin = begin
            .template_origin
            .as_ref()
            .map(|o| format!("{}|{}|{}", o.file, o.line, o.column));
        let time = format!("{:.9}", task.time_delta());
        let memory = task.memory_delta().to_string();

        let mut entry = BytesStart::new("Entry");
        entry.push_attribute(("Kind", kind_string(begin.kind)));
        entry.push_attribute(("Name", begin.name.as_str()));
        entry.push_attribute(("Location", location.as_str()));
        if let Some(origin) = &origin {
            entry.push_attribute(("TemplateOrigin", origin.as_str()));
        }
        entry.push_attribute(("Time", time.as_str()));
        entry.push_attribute(("Memory", memory.as_str()));
        self.xml.write_event(Event::Start(entry))
    }

    fn close_node(&mut self, _task: &TraversalTask) -> io::Result<()> {
        self.xml.write_event(Event::End(BytesEnd::new("Entry")))
    }

    fn finalize_tree(&mut self) -> io::Result<()> {
        self.xml.write_event(Event::End(BytesEnd::new("Trace")))?;
        self.xml.get_mut().flush()
    }
}

/// Renders the tree as a GraphML node/edge list.
pub struct GraphMlRender<W: Write> {
    xml: XmlEventWriter<W>,
    next_edge_id: usize,
}

impl<W: Write> GraphMlRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> GraphMlRender<W> {
        GraphMlRender {
            xml: XmlEventWriter::new_with_indent(out, b' ', 2),
            next_edge_id: 0,
        }
    }

    fn data_element(&mut self, key: &str, text: &str) -> io::Result<()> {
        let mut data = BytesStart::new("data");
        data.push_attribute(("key", key));
        self.xml.write_event(Event::Start(data))?;
        self.xml
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        self.xml.write_event(Event::End(BytesEnd::new("data")))
    }
}

pub(crate) fn write_graphml_keys<W: Write>(
    xml: &mut XmlEventWriter<W>,
    keys: &[(&str, &str, &str, &str, Option<&str>)],
) -> io::Result<()> {
    for &(id, target, name, ty, default) in keys {
        let mut key = BytesStart::new("key");
        key.push_attribute(("id", id));
        key.push_attribute(("for", target));
        key.push_attribute(("attr.name", name));
        key.push_attribute(("attr.type", ty));
        match default {
            Some(value) => {
                xml.write_event(Event::Start(key))?;
                xml.write_event(Event::Start(BytesStart::new("default")))?;
                xml.write_event(Event::Text(BytesText::new(value)))?;
                xml.write_event(Event::End(BytesEnd::new("default")))?;
                xml.write_event(Event::End(BytesEnd::new("key")))?;
            }
            None => xml.write_event(Event::Empty(key))?,
        }
    }
    Ok(())
}

pub(crate) fn write_graphml_preamble<W: Write>(
    xml: &mut XmlEventWriter<W>,
) -> io::Result<()> {
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut graphml = BytesStart::new("graphml");
    graphml.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
    graphml.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    graphml.push_attribute((
        "xsi:schemaLocation",
        "http://graphml.graphdrawing.org/xmlns \
         http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd",
    ));
    xml.write_event(Event::Start(graphml))
}

impl<W: Write> TreeRender for GraphMlRender<W> {
    fn initialize_tree(&mut self, _source_name: &str) -> io::Result<()> {
        self.next_edge_id = 0;
        write_graphml_preamble(&mut self.xml)?;
        write_graphml_keys(
            &mut self.xml,
            &[
                ("d0", "node", "Kind", "string", None),
                ("d1", "node", "Name", "string", None),
                ("d2", "node", "Location", "string", None),
                ("d3", "node", "Time", "double", Some("0.0")),
                ("d4", "node", "Memory", "long", Some("0")),
                ("d5", "node", "TemplateOrigin", "string", None),
            ],
        )?;
        self.xml.write_event(Event::Start(BytesStart::new("graph")))
    }

    fn open_node(&mut self, task: &TraversalTask) -> io::Result<()> {
        let begin = &task.begin;
        let id = format!("n{}", task.node_id);
        let mut node = BytesStart::new("node");
        node.push_attribute(("id", id.as_str()));
        self.xml.write_event(Event::Start(node))?;
        self.data_element("d0", kind_string(begin.kind))?;
        self.data_element("d1", &format!("\"{}\"", begin.name))?;
        self.data_element(
            "d2",
            &format!(
                "\"{}|{}|{}\"",
                begin.location.file, begin.location.line, begin.location.column
            ),
        )?;
        self.data_element("d3", &format!("{:.9}", task.time_delta()))?;
        self.data_element("d4", &task.memory_delta().to_string())?;
        if let Some(origin) = &begin.template_origin {
            self.data_element(
                "d5",
                &format!("\"{}|{}|{}\"", origin.file, origin.line, origin.column),
            )?;
        }
        self.xml.write_event(Event::End(BytesEnd::new("node")))?;

        if task.parent_id == INVALID_ID {
            return Ok(());
        }
        let edge_id = format!("e{}", self.next_edge_id);
        let source = format!("n{}", task.parent_id);
        let target = format!("n{}", task.node_id);
        let mut edge = BytesStart::new("edge");
        edge.push_attribute(("id", edge_id.as_str()));
        edge.push_attribute(("source", source.as_str()));
        edge.push_attribute(("target", target.as_str()));
        self.next_edge_id += 1;
        self.xml.write_event(Event::Empty(edge))
    }

    fn close_node(&mut self, _task: &TraversalTask) -> io::Result<()> {
        Ok(())
    }

    fn finalize_tree(&mut self) -> io::Result<()> {
        self.xml.write_event(Event::End(BytesEnd::new("graph")))?;
        self.xml.write_event(Event::End(BytesEnd::new("graphml")))?;
        self.xml.get_mut().flush()
    }
}

/// Renders the tree as a GraphViz digraph.
pub struct GraphVizRender<W: Write> {
    out: W,
}

impl<W: Write> GraphVizRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> GraphVizRender<W> {
        GraphVizRender { out }
    }
}

impl<W: Write> TreeRender for GraphVizRender<W> {
    fn initialize_tree(&mut self, _source_name: &str) -> io::Result<()> {
        writeln!(self.out, "digraph Trace {{")
    }

    fn open_node(&mut self, task: &TraversalTask) -> io::Result<()> {
        let begin = &task.begin;
        let mut label = format!(
            "{}\\n{}\\nAt {} Line {} Column {}\\n",
            kind_string(begin.kind),
            graphviz_label(&begin.name),
            graphviz_label(&begin.location.file),
            begin.location.line,
            begin.location.column
        );
        if let Some(origin) = &begin.template_origin {
            label.push_str(&format!(
                "From {} Line {} Column {}\\n",
                graphviz_label(&origin.file),
                origin.line,
                origin.column
            ));
        }
        label.push_str(&format!(
            "Time: {:.9} seconds Memory: {} bytes",
            task.time_delta(),
            task.memory_delta()
        ));
        writeln!(self.out, "n{} [label = \"{}\"];", task.node_id, label)?;

        if task.parent_id != INVALID_ID {
            writeln!(self.out, "n{} -> n{};", task.parent_id, task.node_id)?;
        }
        Ok(())
    }

    fn close_node(&mut self, _task: &TraversalTask) -> io::Result<()> {
        Ok(())
    }

    fn finalize_tree(&mut self) -> io::Result<()> {
        writeln!(self.out, "}}")?;
        self.out.flush()
    }
}
