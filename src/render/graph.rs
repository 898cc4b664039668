//! The meta-call-graph: a directed graph whose vertices are distinct
//! instantiations and whose edges carry aggregated call-site costs.
//!
//! The builder replays the recorded tree and folds it down. Memoizations
//! collapse into the instantiation they repeat, parallel edges between the
//! same ordered vertex pair collapse into the first one observed, and the
//! producer's inclusive costs are redistributed into exclusive costs by
//! subtracting every node's cost from its parent.

use std::io::{self, Write};

use fnv::{FnvHashMap, FnvHashSet};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlEventWriter;

use super::tree::{replay, write_graphml_keys, write_graphml_preamble};
use super::tree::{DfsTreeRecorder, TraversalTask, TreeRender, INVALID_ID};
use crate::trace::{kind_string, BeginEntry, EndEntry, EntrySink};
use crate::trace::{MEMOIZATION, TEMPLATE_INSTANTIATION};

/// A vertex of the meta-call-graph: one distinct instantiation.
#[derive(Clone, Debug, Default)]
pub struct Vertex {
    /// Instantiation kind tag.
    pub kind: u32,
    /// Fully qualified name of the instantiation.
    pub name: String,
    /// File in which the instantiated template is declared (the callee).
    pub callee_file: String,
    /// Line of the template's declaration.
    pub callee_line: u32,
    /// Column of the template's declaration.
    pub callee_column: u32,
    /// Compilation time attributable to this vertex alone, in nanoseconds.
    /// On the root vertex this holds the total inclusive time instead.
    pub time_excl_ns: u64,
    /// Memory attributable to this vertex alone, in bytes.
    pub memory_excl: u64,
}

/// An edge of the meta-call-graph: the first observed call site.
#[derive(Clone, Debug)]
pub struct Edge {
    /// Source vertex id.
    pub source: usize,
    /// Target vertex id.
    pub target: usize,
    /// File of the point of instantiation (the caller).
    pub caller_file: String,
    /// Line of the point of instantiation.
    pub caller_line: u32,
    /// Column of the point of instantiation.
    pub caller_column: u32,
    /// Inclusive compilation time of the call, in nanoseconds.
    pub time_incl_ns: u64,
    /// Inclusive memory cost of the call, in bytes.
    pub memory_incl: u64,
}

/// Arena-backed directed graph with at most one edge per ordered vertex
/// pair. Vertex and edge ids are stable indices in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MetaGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    out_edges: Vec<Vec<usize>>,
    out_targets: Vec<FnvHashSet<usize>>,
}

impl MetaGraph {
    /// Creates an empty graph.
    pub fn new() -> MetaGraph {
        MetaGraph::default()
    }

    /// Adds a vertex, returning its id.
    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        let id = self.vertices.len();
        self.vertices.push(vertex);
        self.out_edges.push(Vec::new());
        self.out_targets.push(FnvHashSet::default());
        id
    }

    /// True if an edge `source -> target` already exists.
    pub fn has_edge(&self, source: usize, target: usize) -> bool {
        self.out_targets[source].contains(&target)
    }

    /// Adds an edge. The caller is expected to have checked [`has_edge`];
    /// a duplicate is ignored.
    ///
    /// [`has_edge`]: MetaGraph::has_edge
    pub fn add_edge(&mut self, edge: Edge) {
        if !self.out_targets[edge.source].insert(edge.target) {
            return;
        }
        self.out_edges[edge.source].push(self.edges.len());
        self.edges.push(edge);
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The vertex with id `id`.
    pub fn vertex(&self, id: usize) -> &Vertex {
        &self.vertices[id]
    }

    fn vertex_mut(&mut self, id: usize) -> &mut Vertex {
        &mut self.vertices[id]
    }

    /// All vertices, in id order.
    pub fn vertices(&self) -> impl Iterator<Item = (usize, &Vertex)> {
        self.vertices.iter().enumerate()
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Outgoing edges of `source`, in insertion order.
    pub fn out_edges(&self, source: usize) -> impl Iterator<Item = &Edge> {
        self.out_edges[source].iter().map(move |&e| &self.edges[e])
    }

    /// Depth-first walk from `root`. Each reachable vertex is discovered
    /// exactly once; `finish_vertex` fires once its outgoing edges have all
    /// been examined.
    pub fn depth_first<V: DfsVisitor + ?Sized>(
        &self,
        root: usize,
        visitor: &mut V,
    ) -> io::Result<()> {
        let mut visited = vec![false; self.vertices.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        visited[root] = true;
        visitor.discover_vertex(root, self)?;
        stack.push((root, 0));
        while let Some(top) = stack.last_mut() {
            let (vertex, next) = (top.0, top.1);
            top.1 += 1;
            match self.out_edges[vertex].get(next) {
                Some(&e) => {
                    let target = self.edges[e].target;
                    if !visited[target] {
                        visited[target] = true;
                        visitor.discover_vertex(target, self)?;
                        stack.push((target, 0));
                    }
                }
                None => {
                    visitor.finish_vertex(vertex, self)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// Callbacks for [`MetaGraph::depth_first`].
pub trait DfsVisitor {
    /// Called the first time the walk reaches `u`.
    fn discover_vertex(&mut self, u: usize, graph: &MetaGraph) -> io::Result<()>;

    /// Called once every edge out of `u` has been examined.
    fn finish_vertex(&mut self, u: usize, graph: &MetaGraph) -> io::Result<()>;
}

/// Node-dropping thresholds for the call-graph builders.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphOptions {
    /// Drop nodes whose inclusive time is below this many seconds. Zero
    /// disables the check.
    pub time_threshold: f64,
    /// Drop nodes whose inclusive memory cost is below this many bytes.
    /// Zero disables the check.
    pub memory_threshold: u64,
}

/// Folds the recorded instantiation tree into a [`MetaGraph`].
pub struct CallGraphBuilder {
    graph: MetaGraph,
    root: usize,
    inst_map: FnvHashMap<String, usize>,
    tree_to_graph: FnvHashMap<usize, usize>,
    time_threshold_ns: u64,
    memory_threshold: u64,
}

impl CallGraphBuilder {
    /// Creates a builder with the given thresholds. [`reset`] must be
    /// called before feeding it a tree.
    ///
    /// [`reset`]: CallGraphBuilder::reset
    pub fn new(options: GraphOptions) -> CallGraphBuilder {
        CallGraphBuilder {
            graph: MetaGraph::new(),
            root: 0,
            inst_map: FnvHashMap::default(),
            tree_to_graph: FnvHashMap::default(),
            time_threshold_ns: (options.time_threshold * 1e9) as u64,
            memory_threshold: options.memory_threshold,
        }
    }

    /// Drops any previous graph and starts a fresh one whose root vertex
    /// stands for the whole translation unit.
    pub fn reset(&mut self, source_name: &str) {
        self.graph = MetaGraph::new();
        self.inst_map.clear();
        self.tree_to_graph.clear();
        self.root = self.graph.add_vertex(Vertex {
            kind: 0,
            name: "CompleteTranslationUnit".to_owned(),
            callee_file: source_name.to_owned(),
            callee_line: 1,
            callee_column: 1,
            time_excl_ns: 0,
            memory_excl: 0,
        });
    }

    /// The finished graph.
    pub fn graph(&self) -> &MetaGraph {
        &self.graph
    }

    /// Id of the root vertex.
    pub fn root(&self) -> usize {
        self.root
    }
}

impl TreeRender for CallGraphBuilder {
    fn initialize_tree(&mut self, source_name: &str) -> io::Result<()> {
        self.reset(source_name);
        Ok(())
    }

    fn open_node(&mut self, task: &TraversalTask) -> io::Result<()> {
        let begin = &task.begin;
        let dt_ns = task.time_delta_ns();
        let dmem = task.memory_delta();

        // Threshold gating comes before memoization resolution: a gated
        // node leaves no vertex, no edge, and no parent bookkeeping.
        if self.memory_threshold > 0 && dmem < self.memory_threshold {
            return Ok(());
        }
        if self.time_threshold_ns > 0 && dt_ns < self.time_threshold_ns {
            return Ok(());
        }

        let v = if begin.kind == MEMOIZATION {
            // A memoization never introduces a vertex; an unmatched one is
            // not a template instantiation at all, just noise.
            match self.inst_map.get(&begin.name) {
                Some(&v) => v,
                None => return Ok(()),
            }
        } else {
            let (callee_file, callee_line, callee_column) = match &begin.template_origin {
                Some(origin) => (origin.file.clone(), origin.line, origin.column),
                None => (String::new(), 0, 0),
            };
            let v = self.graph.add_vertex(Vertex {
                kind: begin.kind,
                name: begin.name.clone(),
                callee_file,
                callee_line,
                callee_column,
                time_excl_ns: dt_ns,
                memory_excl: dmem,
            });
            if begin.kind == TEMPLATE_INSTANTIATION {
                self.inst_map.insert(begin.name.clone(), v);
            }
            v
        };
        self.tree_to_graph.insert(task.node_id, v);

        let u = if task.parent_id == INVALID_ID {
            // Top-level costs accumulate at the root, which ends up holding
            // the total inclusive cost of the translation unit.
            let root = self.root;
            let r = self.graph.vertex_mut(root);
            r.time_excl_ns += dt_ns;
            r.memory_excl += dmem;
            root
        } else {
            // A gated parent leaves no mapping; fall back to the root.
            let u = self
                .tree_to_graph
                .get(&task.parent_id)
                .copied()
                .unwrap_or(self.root);
            let p = self.graph.vertex_mut(u);
            p.time_excl_ns = p.time_excl_ns.saturating_sub(dt_ns);
            p.memory_excl = p.memory_excl.saturating_sub(dmem);
            u
        };

        // First observation of a call site wins; later identical pairs are
        // discarded.
        if !self.graph.has_edge(u, v) {
            self.graph.add_edge(Edge {
                source: u,
                target: v,
                caller_file: begin.location.file.clone(),
                caller_line: begin.location.line,
                caller_column: begin.location.column,
                time_incl_ns: dt_ns,
                memory_incl: dmem,
            });
        }
        Ok(())
    }

    fn close_node(&mut self, _task: &TraversalTask) -> io::Result<()> {
        Ok(())
    }

    fn finalize_tree(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A renderer handed the finished graph.
pub trait GraphRender {
    /// Writes the graph out. The graph is complete and frozen; `root` is
    /// the translation-unit vertex.
    fn write_graph(&mut self, graph: &MetaGraph, root: usize) -> io::Result<()>;
}

/// Adapts a [`GraphRender`] to the [`EntrySink`] contract: records the
/// tree, folds it at `finalize`, and hands over the graph.
pub struct CallGraphWriter<R> {
    tree: DfsTreeRecorder,
    builder: CallGraphBuilder,
    render: R,
}

impl<R: GraphRender> CallGraphWriter<R> {
    /// Creates a sink feeding `render`.
    pub fn new(render: R, options: GraphOptions) -> CallGraphWriter<R> {
        CallGraphWriter {
            tree: DfsTreeRecorder::new(),
            builder: CallGraphBuilder::new(options),
            render,
        }
    }

    /// Consumes the sink, returning the renderer.
    pub fn into_render(self) -> R {
        self.render
    }
}

impl<R: GraphRender> EntrySink for CallGraphWriter<R> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        self.builder.initialize_tree(source_name)
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
        replay(self.tree.tasks(), &mut self.builder)?;
        self.tree.reset();
        self.render
            .write_graph(self.builder.graph(), self.builder.root())
    }
}

/// Renders the meta-call-graph in GraphML.
pub struct GraphMlCgRender<W: Write> {
    xml: XmlEventWriter<W>,
}

impl<W: Write> GraphMlCgRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> GraphMlCgRender<W> {
        GraphMlCgRender {
            xml: XmlEventWriter::new_with_indent(out, b' ', 2),
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

impl<W: Write> DfsVisitor for GraphMlCgRender<W> {
    fn discover_vertex(&mut self, u: usize, graph: &MetaGraph) -> io::Result<()> {
        let vertex = graph.vertex(u);
        let id = format!("n{}", u);
        let mut node = BytesStart::new("node");
        node.push_attribute(("id", id.as_str()));
        self.xml.write_event(Event::Start(node))?;
        self.data_element("d0", kind_string(vertex.kind))?;
        self.data_element("d1", &format!("\"{}\"", vertex.name))?;
        self.data_element(
            "d2",
            &format!(
                "\"{}|{}|{}\"",
                vertex.callee_file, vertex.callee_line, vertex.callee_column
            ),
        )?;
        self.data_element("d3", &format!("{:.9}", 1e-9 * vertex.time_excl_ns as f64))?;
        self.data_element("d4", &vertex.memory_excl.to_string())?;
        self.xml.write_event(Event::End(BytesEnd::new("node")))
    }

    fn finish_vertex(&mut self, u: usize, graph: &MetaGraph) -> io::Result<()> {
        for (i, edge) in graph.out_edges(u).enumerate() {
            let edge_id = format!("e{}_{}", u, i);
            let source = format!("n{}", u);
            let target = format!("n{}", edge.target);
            let mut elem = BytesStart::new("edge");
            elem.push_attribute(("id", edge_id.as_str()));
            elem.push_attribute(("source", source.as_str()));
            elem.push_attribute(("target", target.as_str()));
            self.xml.write_event(Event::Start(elem))?;
            self.data_element(
                "d5",
                &format!(
                    "\"{}|{}|{}\"",
                    edge.caller_file, edge.caller_line, edge.caller_column
                ),
            )?;
            self.data_element("d6", &format!("{:.9}", 1e-9 * edge.time_incl_ns as f64))?;
            self.data_element("d7", &edge.memory_incl.to_string())?;
            self.xml.write_event(Event::End(BytesEnd::new("edge")))?;
        }
        Ok(())
    }
}

impl<W: Write> GraphRender for GraphMlCgRender<W> {
    fn write_graph(&mut self, graph: &MetaGraph, root: usize) -> io::Result<()> {
        write_graphml_preamble(&mut self.xml)?;
        write_graphml_keys(
            &mut self.xml,
            &[
                ("d0", "node", "Kind", "string", None),
                ("d1", "node", "Name", "string", None),
                ("d2", "node", "Location", "string", None),
                ("d3", "node", "Time", "double", Some("0.0")),
                ("d4", "node", "Memory", "long", Some("0")),
                ("d5", "edge", "FromLocation", "string", None),
                ("d6", "edge", "Time", "double", Some("0.0")),
                ("d7", "edge", "Memory", "long", Some("0")),
            ],
        )?;
        self.xml.write_event(Event::Start(BytesStart::new("graph")))?;
        graph.depth_first(root, self)?;
        self.xml.write_event(Event::End(BytesEnd::new("graph")))?;
        self.xml.write_event(Event::End(BytesEnd::new("graphml")))?;
        self.xml.get_mut().flush()
    }
}

/// Renders the meta-call-graph as a GraphViz digraph.
pub struct GraphVizCgRender<W: Write> {
    out: W,
}

impl<W: Write> GraphVizCgRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> GraphVizCgRender<W> {
        GraphVizCgRender { out }
    }
}

fn graphviz_label(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl<W: Write> GraphRender for GraphVizCgRender<W> {
    fn write_graph(&mut self, graph: &MetaGraph, _root: usize) -> io::Result<()> {
        writeln!(self.out, "digraph G {{")?;
        for (id, vertex) in graph.vertices() {
            writeln!(
                self.out,
                "{} [label=\"Time: {:.9} seconds | {}\"];",
                id,
                1e-9 * vertex.time_excl_ns as f64,
                graphviz_label(&vertex.name)
            )?;
        }
        for edge in graph.edges() {
            writeln!(self.out, "{} -> {};", edge.source, edge.target)?;
        }
        writeln!(self.out, "}}")?;
        self.out.flush()
    }
}

/// Renders the meta-call-graph in the CallGrind profile format.
pub struct CallGrindRender<W: Write> {
    out: W,
    root: usize,
}

impl<W: Write> CallGrindRender<W> {
    /// Creates a renderer targeting `out`.
    pub fn new(out: W) -> CallGrindRender<W> {
        CallGrindRender { out, root: 0 }
    }

    fn write_calls(&mut self, graph: &MetaGraph, u: usize) -> io::Result<()> {
        for edge in graph.out_edges(u) {
            let callee = graph.vertex(edge.target);
            writeln!(self.out, "cfi={}", callee.callee_file)?;
            writeln!(self.out, "cfn={}", callee.name)?;
            writeln!(self.out, "calls=1 {}", callee.callee_line)?;
            writeln!(
                self.out,
                "{} {} {}",
                edge.caller_line, edge.time_incl_ns, edge.memory_incl
            )?;
        }
        Ok(())
    }
}

impl<W: Write> DfsVisitor for CallGrindRender<W> {
    fn discover_vertex(&mut self, u: usize, graph: &MetaGraph) -> io::Result<()> {
        if u == self.root {
            for edge in graph.out_edges(u) {
                let callee = graph.vertex(edge.target);
                writeln!(self.out, "fl={}", edge.caller_file)?;
                writeln!(self.out, "fn=global")?;
                writeln!(self.out, "{} 0 0", edge.caller_line)?;
                writeln!(self.out, "cfi={}", callee.callee_file)?;
                writeln!(self.out, "cfn={}", callee.name)?;
                writeln!(self.out, "calls=1 {}", callee.callee_line)?;
                writeln!(
                    self.out,
                    "{} {} {}",
                    edge.caller_line, edge.time_incl_ns, edge.memory_incl
                )?;
            }
            return Ok(());
        }
        let vertex = graph.vertex(u);
        writeln!(self.out)?;
        // Always position the function in its own file; consumers reconcile
        // caller-file mismatches.
        writeln!(self.out, "fl={}", vertex.callee_file)?;
        writeln!(self.out, "fn={}", vertex.name)?;
        writeln!(
            self.out,
            "{} {} {}",
            vertex.callee_line, vertex.time_excl_ns, vertex.memory_excl
        )?;
        self.write_calls(graph, u)
    }

    fn finish_vertex(&mut self, _u: usize, _graph: &MetaGraph) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> GraphRender for CallGrindRender<W> {
    fn write_graph(&mut self, graph: &MetaGraph, root: usize) -> io::Result<()> {
        let total = graph.vertex(root);
        writeln!(self.out, "version: 1")?;
        writeln!(self.out, "positions: line")?;
        writeln!(self.out, "event: CTime : Compilation Time (ns)")?;
        writeln!(self.out, "event: CMem : Compiler Memory Usage (bytes)")?;
        writeln!(self.out, "events: CTime CMem")?;
        // The root's "exclusive" counters hold the totals.
        writeln!(
            self.out,
            "summary: {} {}",
            total.time_excl_ns, total.memory_excl
        )?;
        writeln!(self.out)?;

        self.root = root;
        graph.depth_first(root, self)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_rejects_parallel_edges() {
        let mut graph = MetaGraph::new();
        let a = graph.add_vertex(Vertex::default());
        let b = graph.add_vertex(Vertex::default());
        let edge = |line| Edge {
            source: a,
            target: b,
            caller_file: "x.cpp".to_owned(),
            caller_line: line,
            caller_column: 1,
            time_incl_ns: 0,
            memory_incl: 0,
        };
        assert!(!graph.has_edge(a, b));
        graph.add_edge(edge(1));
        assert!(graph.has_edge(a, b));
        graph.add_edge(edge(2));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.out_edges(a).next().unwrap().caller_line, 1);
    }

    #[test]
    fn depth_first_discovers_each_vertex_once() {
        let mut graph = MetaGraph::new();
        let ids: Vec<usize> = (0..4).map(|_| graph.add_vertex(Vertex::default())).collect();
        let mut connect = |s: usize, t: usize| {
            graph.add_edge(Edge {
                source: s,
                target: t,
                caller_file: String::new(),
                caller_line: 0,
                caller_column: 0,
                time_incl_ns: 0,
                memory_incl: 0,
            })
        };
        connect(ids[0], ids[1]);
        connect(ids[0], ids[2]);
        connect(ids[1], ids[3]);
        connect(ids[2], ids[3]); // diamond

        #[derive(Default)]
        struct Order {
            discovered: Vec<usize>,
            finished: Vec<usize>,
        }

        impl DfsVisitor for Order {
            fn discover_vertex(&mut self, u: usize, _: &MetaGraph) -> io::Result<()> {
                self.discovered.push(u);
                Ok(())
            }

            fn finish_vertex(&mut self, u: usize, _: &MetaGraph) -> io::Result<()> {
                self.finished.push(u);
                Ok(())
            }
        }

        let mut order = Order::default();
        graph.depth_first(ids[0], &mut order).unwrap();
        assert_eq!(order.discovered, vec![0, 1, 3, 2]);
        assert_eq!(order.finished, vec![3, 1, 2, 0]);
    }
}
