//! Smelter is a set of tools for working with the template-instantiation
//! profiling traces emitted by an instrumented C++ compiler. The compiler
//! records a begin/end event pair for every template it instantiates, along
//! with timestamps, memory usage, source locations, and the (often enormous)
//! qualified name of the instantiated template. Smelter reads the compact
//! binary form of those traces and re-renders them as one of several
//! alternative representations:
//!
//! * a flat sequence of begin/end events (binary, text, YAML, or XML),
//! * a nested tree of instantiations (nested XML, GraphML, GraphViz), or
//! * a merged meta-call-graph that folds memoized re-instantiations into the
//!   original instantiation and redistributes inclusive costs into exclusive
//!   costs (GraphML, GraphViz, or CallGrind).
//!
//! # Command-line use
//!
//! The `smelter-convert` binary reads one or more trace files (or standard
//! input) and writes the converted output to a file or standard output:
//!
//! ```console
//! $ smelter-convert -f callgrind -o trace.callgrind mysource.cpp.trace.pbf
//! $ kcachegrind trace.callgrind
//! ```
//!
//! Undesirable instantiations can be filtered out with a blacklist file of
//! regular expressions (`-b`), and the call-graph builders can drop nodes
//! below a time or memory threshold (`-t`, `-m`).
//!
//! # Programmatic access
//!
//! The [`trace`] module reads and writes the binary format; the [`render`]
//! module contains the filtering driver and the format renderers. The two
//! meet at the [`trace::EntrySink`] trait: a reader produces entries, a
//! renderer consumes them, and [`render::Printer`] sits in between applying
//! the blacklists.

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate log;

macro_rules! invalid_data_error {
    ($($arg:tt)*) => {
        Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            format!($($arg)*),
        ))
    };
}

/// Reading and writing the compact binary trace format.
///
/// See the [crate-level documentation](index.html) for details.
pub mod trace;

/// Filtering traces and rendering them into alternative representations.
///
/// See the [crate-level documentation](index.html) for details.
pub mod render;
