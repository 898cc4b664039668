mod common;

use std::io::{self, Cursor};

use pretty_assertions::assert_eq;

use common::{begin, end, Ev};
use smelter::render::{Blacklist, Printer};
use smelter::trace::{BeginEntry, EndEntry, EntrySink};

#[derive(Default)]
struct Counter {
    begins: Vec<String>,
    ends: usize,
}

impl EntrySink for Counter {
    fn initialize(&mut self, _: &str) -> io::Result<()> {
        Ok(())
    }

    fn begin_entry(&mut self, entry: &BeginEntry) -> io::Result<()> {
        self.begins.push(entry.name.clone());
        Ok(())
    }

    fn end_entry(&mut self, _: &EndEntry) -> io::Result<()> {
        self.ends += 1;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn filtered(blacklist: &str, events: &[Ev]) -> Counter {
    let mut printer = Printer::new(Counter::default());
    printer.set_blacklist(Blacklist::from_reader(Cursor::new(blacklist)).unwrap());
    common::drive(&mut printer, "input.cpp", events);
    printer.into_sink()
}

#[test]
fn blacklisted_subtree_is_suppressed() {
    let events = vec![
        Ev::Begin(begin(0, "Public", 0.0, 0)),
        Ev::Begin(begin(0, "InternalFoo", 1.0, 0)),
        Ev::Begin(begin(0, "Nested", 2.0, 0)),
        Ev::End(end(3.0, 0)),
        Ev::End(end(4.0, 0)),
        Ev::Begin(begin(0, "Other", 5.0, 0)),
        Ev::End(end(6.0, 0)),
        Ev::End(end(7.0, 0)),
    ];
    let sink = filtered("identifier ^Internal.*\n", &events);
    assert_eq!(sink.begins, vec!["Public", "Other"]);
    assert_eq!(sink.ends, 2);
}

#[test]
fn forwarded_begins_and_ends_stay_balanced() {
    // A deep nest where the filter triggers at several depths.
    let mut events = Vec::new();
    let names = [
        "keep0", "drop0", "keep1", "drop1", "keep2", "drop2", "keep3", "drop3",
    ];
    for (i, name) in names.iter().enumerate() {
        events.push(Ev::Begin(begin(0, name, i as f64, 0)));
    }
    for i in (0..names.len()).rev() {
        events.push(Ev::End(end(10.0 + i as f64, 0)));
    }
    let sink = filtered("identifier drop.*\n", &events);
    // Everything below the first "drop" is inside its subtree.
    assert_eq!(sink.begins, vec!["keep0"]);
    assert_eq!(sink.begins.len(), sink.ends);
}

#[test]
fn sibling_subtrees_after_a_match_are_kept() {
    let events = vec![
        Ev::Begin(begin(0, "drop", 0.0, 0)),
        Ev::Begin(begin(0, "inside", 1.0, 0)),
        Ev::End(end(2.0, 0)),
        Ev::End(end(3.0, 0)),
        Ev::Begin(begin(0, "after", 4.0, 0)),
        Ev::End(end(5.0, 0)),
    ];
    let sink = filtered("identifier drop\n", &events);
    assert_eq!(sink.begins, vec!["after"]);
    assert_eq!(sink.ends, 1);
}

#[test]
fn context_and_identifier_categories_both_apply() {
    let events = vec![
        Ev::Begin(begin(0, "std::vector<int>", 0.0, 0)),
        Ev::End(end(1.0, 0)),
        Ev::Begin(begin(0, "HiddenThing", 2.0, 0)),
        Ev::End(end(3.0, 0)),
        Ev::Begin(begin(0, "Shown", 4.0, 0)),
        Ev::End(end(5.0, 0)),
    ];
    let sink = filtered("context std::.*\nidentifier Hidden.*\n", &events);
    assert_eq!(sink.begins, vec!["Shown"]);
    assert_eq!(sink.ends, 1);
}

#[test]
fn no_blacklist_forwards_everything() {
    let events = vec![
        Ev::Begin(begin(0, "anything", 0.0, 0)),
        Ev::End(end(1.0, 0)),
    ];
    let mut printer = Printer::new(Counter::default());
    common::drive(&mut printer, "input.cpp", &events);
    let sink = printer.into_sink();
    assert_eq!(sink.begins, vec!["anything"]);
    assert_eq!(sink.ends, 1);
}
