//! The driver that sits between a trace source and a renderer, applying
//! blacklist filters while keeping begin/end pairs balanced.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use crate::trace::{BeginEntry, EndEntry, EntrySink};

/// Compiled blacklist patterns.
///
/// A blacklist file holds one pattern per line, each prefixed with its
/// category: `context <regex>` or `identifier <regex>`. All patterns of a
/// category are combined into a single alternation, and an entry is dropped
/// when its full name matches either category.
#[derive(Debug, Default)]
pub struct Blacklist {
    context: Option<Regex>,
    identifier: Option<Regex>,
}

impl Blacklist {
    /// Reads a blacklist file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Blacklist> {
        Blacklist::from_reader(BufReader::new(File::open(path)?))
    }

    /// Reads blacklist lines from `input`.
    ///
    /// An invalid pattern disables its whole category with a warning rather
    /// than failing the conversion.
    pub fn from_reader<R: BufRead>(input: R) -> io::Result<Blacklist> {
        let mut context = Vec::new();
        let mut identifier = Vec::new();
        for line in input.lines() {
            let line = line?;
            if let Some(pattern) = line.strip_prefix("context ") {
                context.push(pattern.to_owned());
            } else if let Some(pattern) = line.strip_prefix("identifier ") {
                identifier.push(pattern.to_owned());
            }
        }
        Ok(Blacklist {
            context: compile(&context),
            identifier: compile(&identifier),
        })
    }

    fn matches(&self, name: &str) -> bool {
        self.context.as_ref().map_or(false, |re| re.is_match(name))
            || self
                .identifier
                .as_ref()
                .map_or(false, |re| re.is_match(name))
    }
}

/// Combines per-category patterns into one anchored alternation, so that a
/// pattern must match the whole name.
fn compile(patterns: &[String]) -> Option<Regex> {
    if patterns.is_empty() {
        return None;
    }
    let alternation = patterns
        .iter()
        .map(|p| format!("({})", p))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!("^(?:{})$", alternation)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("ignoring invalid blacklist pattern: {}", e);
            None
        }
    }
}

/// Drives a renderer, suppressing blacklisted entries.
///
/// Suppressing a begin entry must also suppress its matching end entry and
/// everything nested between them, or the stream handed to the renderer
/// stops being well nested. A single counter is enough: while it is
/// non-zero, begins increment it and ends decrement it, and nothing is
/// forwarded.
pub struct Printer<S> {
    sink: S,
    blacklist: Blacklist,
    skipped_endings: usize,
}

impl<S: EntrySink> Printer<S> {
    /// Creates an unfiltered printer over `sink`.
    pub fn new(sink: S) -> Printer<S> {
        Printer {
            sink,
            blacklist: Blacklist::default(),
            skipped_endings: 0,
        }
    }

    /// Installs blacklist filters, replacing any previous ones.
    pub fn set_blacklist(&mut self, blacklist: Blacklist) {
        self.blacklist = blacklist;
    }

    /// Consumes the printer, returning the renderer.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: EntrySink> EntrySink for Printer<S> {
    fn initialize(&mut self, source_name: &str) -> io::Result<()> {
        self.sink.initialize(source_name)
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        if self.skipped_endings > 0 {
            self.skipped_endings += 1;
            return Ok(());
        }
        if self.blacklist.matches(&entry.name) {
            self.skipped_endings = 1;
            return Ok(());
        }
        self.sink.begin_entry(entry)
    }

    fn end_entry(&mut self, entry: &EndEntry) -> io::Result<()> {
        if self.skipped_endings > 0 {
            self.skipped_endings -= 1;
            return Ok(());
        }
        self.sink.end_entry(entry)
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.sink.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl EntrySink for Recorder {
        fn initialize(&mut self, source_name: &str) -> io::Result<()> {
            self.events.push(format!("init {}", source_name));
            Ok(())
        }

        fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
            self.events.push(format!("begin {}", entry.name));
            Ok(())
        }

        fn end_entry(&mut self, _: &EndEntry) -> io::Result<()> {
            self.events.push("end".to_owned());
            Ok(())
        }

        fn finalize(&mut self) -> io::Result<()> {
            self.events.push("fini".to_owned());
            Ok(())
        }
    }

    fn begin(name: &str) -> BeginEntry {
        BeginEntry {
            name: name.to_owned(),
            ..BeginEntry::default()
        }
    }

    fn blacklist(lines: &str) -> Blacklist {
        Blacklist::from_reader(Cursor::new(lines)).unwrap()
    }

    #[test]
    fn suppressed_subtrees_stay_balanced() {
        let mut printer = Printer::new(Recorder::default());
        printer.set_blacklist(blacklist("identifier ^Internal.*\n"));

        printer.begin_entry(&begin("Public")).unwrap();
        printer.begin_entry(&begin("InternalFoo")).unwrap();
        printer.begin_entry(&begin("Nested")).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();
        printer.begin_entry(&begin("Other")).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();

        assert_eq!(
            printer.into_sink().events,
            vec!["begin Public", "begin Other", "end", "end"]
        );
    }

    #[test]
    fn patterns_match_whole_names_only() {
        let mut printer = Printer::new(Recorder::default());
        printer.set_blacklist(blacklist("identifier Internal\n"));

        printer.begin_entry(&begin("InternalFoo")).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();
        printer.begin_entry(&begin("Internal")).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();

        assert_eq!(printer.into_sink().events, vec!["begin InternalFoo", "end"]);
    }

    #[test]
    fn categories_combine_as_alternation() {
        let bl = blacklist("context std::.*\nidentifier Hidden.*\ncontext boost::.*\n# noise\n");
        assert!(bl.matches("std::vector<int>"));
        assert!(bl.matches("boost::mpl::int_<3>"));
        assert!(bl.matches("HiddenDetail"));
        assert!(!bl.matches("mystd::thing"));
    }

    #[test]
    fn invalid_pattern_disables_category() {
        let bl = blacklist("identifier ([unclosed\ncontext fine\n");
        assert!(bl.identifier.is_none());
        assert!(bl.matches("fine"));
        assert!(!bl.matches("([unclosed"));
    }

    #[test]
    fn init_and_finalize_pass_through_unfiltered() {
        let mut printer = Printer::new(Recorder::default());
        printer.set_blacklist(blacklist("identifier .*\n"));
        printer.initialize("tu.cpp").unwrap();
        printer.begin_entry(&begin("anything")).unwrap();
        printer.end_entry(&EndEntry::default()).unwrap();
        printer.finalize().unwrap();
        assert_eq!(printer.into_sink().events, vec!["init tu.cpp", "fini"]);
    }
}
