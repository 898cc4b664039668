//! Compression dictionary for qualified template names.
//!
//! Trace files are dominated by names like
//! `ns::Outer<ns::Inner<int, char>, Foo>::value`, and the same sub-terms
//! recur constantly. The dictionary factors each name into a tree: internal
//! nodes are "marked names" in which every factored-out segment has been
//! replaced by a single NUL byte, and the accompanying marker ids name the
//! entries that fill those placeholders left to right. Identical sub-strings
//! share one entry, so `Fibonacci<41>` and `Fibonacci<40>` cost one small
//! entry each instead of repeating the whole spelling.

use std::io;

use fnv::FnvHashMap;

/// The placeholder byte inside marked names.
pub const PLACEHOLDER: char = '\0';

/// Names nested deeper than this are stored literally instead of recursing
/// further. Bounds the segmentation on pathological inputs.
const MAX_DEPTH: usize = 4096;

/// One dictionary entry, as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictEntry {
    /// The name with each factored segment replaced by a NUL placeholder.
    pub marked_name: String,
    /// Entry ids filling the placeholders, left to right.
    pub marker_ids: Vec<u32>,
}

/// Writer-side interner: factors names into entries and assigns ids in
/// insertion order.
#[derive(Default)]
pub struct NameTable {
    ids: FnvHashMap<String, u32>,
    pending: Vec<DictEntry>,
    next_id: u32,
}

impl NameTable {
    /// Creates an empty table.
    pub fn new() -> NameTable {
        NameTable::default()
    }

    /// Returns the entry id for `name`, minting entries for it and any new
    /// sub-terms. Newly minted entries are queued for [`take_pending`].
    ///
    /// [`take_pending`]: NameTable::take_pending
    pub fn intern(&mut self, name: &str) -> u32 {
        self.intern_at(name, 0)
    }

    /// Removes and returns the entries minted since the last call, in id
    /// order. They must reach the output before anything references them.
    pub fn take_pending(&mut self) -> Vec<DictEntry> {
        std::mem::take(&mut self.pending)
    }

    fn intern_at(&mut self, name: &str, depth: usize) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        if depth >= MAX_DEPTH {
            return self.insert(name, name.to_owned(), Vec::new());
        }

        let (marked, markers) = match scan(name) {
            Shape::Leaf => (name.to_owned(), Vec::new()),
            Shape::Scoped { sep } => {
                let qualifier = &name[..sep];
                let tail = &name[sep + 2..];
                let mut marked = String::new();
                let mut markers = Vec::new();
                if qualifier.is_empty() {
                    marked.push_str("::");
                } else {
                    markers.push(self.intern_at(qualifier, depth + 1));
                    marked.push(PLACEHOLDER);
                    marked.push_str("::");
                }
                if !tail.is_empty() {
                    markers.push(self.intern_at(tail, depth + 1));
                    marked.push(PLACEHOLDER);
                }
                (marked, markers)
            }
            Shape::Templated { args } => {
                let mut marked = String::new();
                let mut markers = Vec::new();
                let mut pos = 0;
                for (lo, hi) in args {
                    marked.push_str(&name[pos..lo]);
                    marked.push(PLACEHOLDER);
                    markers.push(self.intern_at(&name[lo..hi], depth + 1));
                    pos = hi;
                }
                marked.push_str(&name[pos..]);
                (marked, markers)
            }
        };
        self.insert(name, marked, markers)
    }

    fn insert(&mut self, name: &str, marked_name: String, marker_ids: Vec<u32>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(name.to_owned(), id);
        self.pending.push(DictEntry {
            marked_name,
            marker_ids,
        });
        id
    }
}

enum Shape {
    /// No structure worth factoring.
    Leaf,
    /// A top-level `::` at byte offset `sep` splits the name into a
    /// qualifier and a tail.
    Scoped { sep: usize },
    /// Top-level template arguments at the given (trimmed) byte ranges.
    Templated { args: Vec<(usize, usize)> },
}

/// One left-to-right pass classifying the name.
///
/// An angle-bracket depth counter tracks nesting; only depth-1 commas and
/// the closing `>` delimit arguments, and only a depth-0 `::` splits scope.
/// A `<` directly after the literal `operator` is part of the operator's
/// name, not an argument opener, and the third `<` of `operator<<<` re-opens
/// the argument group there (an instantiation of `operator<<`).
fn scan(name: &str) -> Shape {
    let bytes = name.as_bytes();
    let mut depth = 0usize;
    let mut args: Vec<(usize, usize)> = Vec::new();
    let mut arg_start = 0usize;

    for i in 0..bytes.len() {
        match bytes[i] {
            b'<' if depth == 0 => {
                if !bytes[..i].ends_with(b"operator") {
                    depth = 1;
                    arg_start = i + 1;
                }
            }
            b'<' if depth == 1 => {
                if bytes[..=i].ends_with(b"operator<<<") {
                    args.clear();
                    arg_start = i + 1;
                } else {
                    depth = 2;
                }
            }
            b'<' => depth += 1,
            b'>' if depth == 1 => {
                push_arg(bytes, arg_start, i, &mut args);
                depth = 0;
            }
            b'>' if depth > 1 => depth -= 1,
            b',' if depth == 1 => {
                push_arg(bytes, arg_start, i, &mut args);
                arg_start = i + 1;
            }
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                return Shape::Scoped { sep: i };
            }
            _ => {}
        }
    }

    if args.is_empty() {
        Shape::Leaf
    } else {
        Shape::Templated { args }
    }
}

fn push_arg(bytes: &[u8], mut lo: usize, mut hi: usize, args: &mut Vec<(usize, usize)>) {
    while lo < hi && bytes[lo] == b' ' {
        lo += 1;
    }
    while hi > lo && bytes[hi - 1] == b' ' {
        hi -= 1;
    }
    if lo < hi {
        args.push((lo, hi));
    }
}

/// Reader-side dictionary: stores every entry fully reconstructed.
///
/// Entries are resolved eagerly on insertion, which is possible because the
/// writer guarantees an entry reaches the stream before anything references
/// it. A marker id at or above the entry's own id is therefore malformed,
/// and that check also rules out reference cycles.
#[derive(Default)]
pub struct NameDict {
    resolved: Vec<String>,
}

impl NameDict {
    /// Creates an empty dictionary.
    pub fn new() -> NameDict {
        NameDict::default()
    }

    /// Adds the next entry (ids are implicit insertion order) and resolves
    /// its full spelling.
    pub fn insert(&mut self, marked_name: &str, marker_ids: &[u32]) -> io::Result<()> {
        let id = self.resolved.len();
        let placeholders = marked_name.bytes().filter(|&b| b == 0).count();
        if placeholders != marker_ids.len() {
            return invalid_data_error!(
                "dictionary entry {} has {} placeholders but {} markers",
                id,
                placeholders,
                marker_ids.len()
            );
        }

        let mut out = String::with_capacity(marked_name.len());
        let mut markers = marker_ids.iter();
        for (i, piece) in marked_name.split(PLACEHOLDER).enumerate() {
            if i > 0 {
                let marker = *markers.next().expect("placeholder count was checked") as usize;
                if marker >= id {
                    return invalid_data_error!(
                        "dictionary entry {} references entry {} before its definition",
                        id,
                        marker
                    );
                }
                out.push_str(&self.resolved[marker]);
            }
            out.push_str(piece);
        }
        self.resolved.push(out);
        Ok(())
    }

    /// Returns the full spelling of entry `id`.
    pub fn get(&self, id: u32) -> io::Result<&str> {
        match self.resolved.get(id as usize) {
            Some(name) => Ok(name),
            None => invalid_data_error!("reference to unknown dictionary entry {}", id),
        }
    }
}
