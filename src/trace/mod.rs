/// The qualified-name compression dictionary used by the binary format.
pub mod dict;

/// Streaming decoder for the binary trace format.
pub mod read;

/// The subset of the Protocol Buffers wire format used by the trace codec.
pub mod wire;

/// Streaming encoder for the binary trace format.
pub mod write;

use std::io;

/// A position in a source file.
///
/// `line` and `column` are 1-based in well-formed traces, but nothing here
/// enforces that; whatever the producer wrote is carried through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Path of the file, as spelled by the producer.
    pub file: String,
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

/// The beginning half of a trace entry.
///
/// Every instantiation the compiler performs produces one `BeginEntry` and,
/// once the instantiation completes, one matching [`EndEntry`]. The time and
/// memory fields are absolute readings at the point the entry was recorded;
/// subtracting the begin reading from the end reading gives the inclusive
/// cost of the instantiation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeginEntry {
    /// What kind of instantiation this is; see [`kind_string`].
    pub kind: u32,
    /// Fully qualified name of the instantiated template.
    pub name: String,
    /// Where the instantiation was triggered (the point of instantiation).
    pub location: SourceLocation,
    /// Seconds since an epoch chosen by the producer.
    pub time_stamp: f64,
    /// Compiler memory usage in bytes; 0 means unreported.
    pub memory_usage: u64,
    /// Where the instantiated template is declared, when known.
    pub template_origin: Option<SourceLocation>,
}

/// The ending half of a trace entry.
///
/// Closes the nearest still-open [`BeginEntry`] in stream order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EndEntry {
    /// Seconds since the same epoch as the matching begin entry.
    pub time_stamp: f64,
    /// Compiler memory usage in bytes; 0 means unreported.
    pub memory_usage: u64,
}

/// Kind tag of a true template instantiation.
pub const TEMPLATE_INSTANTIATION: u32 = 0;

/// Kind tag of a memoization: the compiler reusing an instantiation it has
/// already materialized.
pub const MEMOIZATION: u32 = 23;

const KIND_STRINGS: [&str; 24] = [
    "TemplateInstantiation",
    "DefaultTemplateArgumentInstantiation",
    "DefaultFunctionArgumentInstantiation",
    "ExplicitTemplateArgumentSubstitution",
    "DeducedTemplateArgumentSubstitution",
    "PriorTemplateArgumentSubstitution",
    "DefaultTemplateArgumentChecking",
    "ExceptionSpecEvaluation",
    "ExceptionSpecInstantiation",
    "RequirementInstantiation",
    "NestedRequirementConstraintsCheck",
    "DeclaringSpecialMember",
    "DeclaringImplicitEqualityComparison",
    "DefiningSynthesizedFunction",
    "ConstraintsCheck",
    "ConstraintSubstitution",
    "ConstraintNormalization",
    "RequirementParameterInstantiation",
    "ParameterMappingSubstitution",
    "RewritingOperatorAsSpaceship",
    "InitializingStructuredBinding",
    "MarkingClassDllexported",
    "BuildingBuiltinDumpStructCall",
    "Memoization",
];

/// Returns the canonical string for an instantiation kind tag.
///
/// Tags outside the known range stringify as `"UnknownInstantiationKind"`,
/// but are otherwise carried through untouched so that rewriting a trace
/// does not lose them.
pub fn kind_string(kind: u32) -> &'static str {
    KIND_STRINGS
        .get(kind as usize)
        .copied()
        .unwrap_or("UnknownInstantiationKind")
}

/// The contract between a trace source and a renderer.
///
/// A renderer sees, per source file: one `initialize` with the source name
/// from the trace header, a well-nested sequence of `begin_entry` and
/// `end_entry` calls, and one `finalize`. Renderers that need the whole
/// tree (or graph) buffer the entries and do their work in `finalize`.
pub trait EntrySink {
    /// Called once per source file, before any entries.
    fn initialize(&mut self, source_name: &str) -> io::Result<()>;

    /// Called for the beginning half of each entry.
    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()>;

    /// Called for the ending half of each entry.
    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()>;

    /// Called once per source file, after all entries.
    fn finalize(&mut self) -> io::Result<()>;
}

impl<S: EntrySink + ?Sized> EntrySink for Box<S> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        (**self).initialize(source_name)
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        (**self).begin_entry(entry)
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        (**self).end_entry(entry)
    }

    fn finalize(&mut self) -> io::Result<()> {
        (**self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings() {
        assert_eq!(kind_string(0), "TemplateInstantiation");
        assert_eq!(kind_string(7), "ExceptionSpecEvaluation");
        assert_eq!(kind_string(23), "Memoization");
        assert_eq!(kind_string(24), "UnknownInstantiationKind");
        assert_eq!(kind_string(u32::MAX), "UnknownInstantiationKind");
    }
}
