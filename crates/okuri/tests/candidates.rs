//! Candidate list construction, selection motion, and configuration.

use std::sync::Arc;

use okuri::{Engine, InputMethod, MemDatabase, Value};

fn engine_with(source: &str) -> (Arc<Engine>, Arc<InputMethod>) {
    let mut db = MemDatabase::new();
    let tag = db.register_source(source).expect("description registers");
    let engine = Engine::new(db);
    let im = engine.open_tagged(&tag).expect("description loads");
    (engine, im)
}

const TWO_GROUPS: &str = r#"(input-method t cands)
    (map (m
      ("c" (insert (("one" "two") ("three" "four"))))
      ("n" (select @+))
      ("p" (select @-))
      (">" (select @]))
      ("<" (select @[))
      ("0" (select 0))
      ("s" (show))
      ("h" (hide))))
    (state (init (m)))"#;

/// Scenario: inserting a two-group candidate list shows the first
/// candidate and attaches the list over it.
#[test]
fn insert_candidates_attaches_list() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.filter("c"), 1);
    assert_eq!(ic.preedit_text(), "one");
    assert_eq!(ic.candidate_index(), 0);
    let list = ic.candidate_list().expect("candidate list is attached");
    assert_eq!(list.len(), 4, "all four candidates are reachable");
    assert_eq!(list.group_count(), 2, "explicit groups keep their shape");
    assert_eq!(ic.candidate_span(), (0, 3));
    assert!(ic.changed().candidates);
}

/// Scenario: `@+` steps forward, `@]` jumps to the next group's first
/// candidate, `@[` back to the previous group's last.
#[test]
fn selection_motion_follows_groups() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    ic.filter("c");
    ic.filter("n");
    assert_eq!(ic.preedit_text(), "two");
    assert_eq!(ic.candidate_index(), 1);

    ic.filter(">");
    assert_eq!(ic.preedit_text(), "three");
    assert_eq!(ic.candidate_index(), 2);

    ic.filter("<");
    assert_eq!(ic.preedit_text(), "two");
    assert_eq!(ic.candidate_index(), 1);

    // forward past the end wraps to the first candidate
    ic.filter("n");
    ic.filter("n");
    assert_eq!(ic.candidate_index(), 3);
    ic.filter("n");
    assert_eq!(ic.candidate_index(), 0);
    assert_eq!(ic.preedit_text(), "one");
}

/// Boundary: group motion wraps at both ends of the group list.
#[test]
fn group_motion_wraps() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    ic.filter("c");
    // `@[` from the first group wraps to the last group (its last member)
    ic.filter("<");
    assert_eq!(ic.candidate_index(), 3);
    assert_eq!(ic.preedit_text(), "four");
    // `@]` from the last group wraps to the first group's first member
    ic.filter(">");
    assert_eq!(ic.candidate_index(), 0);
    assert_eq!(ic.preedit_text(), "one");
}

/// `@-` steps backward with wraparound; an absolute index selects
/// directly.
#[test]
fn backward_and_absolute_selection() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    ic.filter("c");
    ic.filter("p");
    assert_eq!(ic.candidate_index(), 3, "backward from the first candidate wraps to the last");
    ic.filter("0");
    assert_eq!(ic.candidate_index(), 0);
    assert_eq!(ic.preedit_text(), "one");
}

/// `show`/`hide` drive the candidate visibility flag.
#[test]
fn show_and_hide() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    ic.filter("c");
    assert!(!ic.candidate_show(), "candidates start hidden");
    ic.filter("s");
    assert!(ic.candidate_show());
    assert!(ic.changed().candidates);
    ic.filter("h");
    assert!(!ic.candidate_show());
}

/// Committing drops the candidate attachment with the preedit.
#[test]
fn commit_drops_candidates() {
    let (engine, im) = engine_with(TWO_GROUPS);
    let mut ic = engine.create_ic(&im).expect("context");

    ic.filter("c");
    ic.filter("s");
    assert!(ic.candidate_list().is_some());
    assert_eq!(ic.filter("Return"), 0, "unmapped key flushes");
    assert!(ic.candidate_list().is_none(), "commit removed the candidate property");
    assert!(!ic.candidate_show());
    assert_eq!(ic.produced(), "one");
}

/// A text-form group enumerates one candidate per character, chunked into
/// display groups by `candidates-group-size`.
#[test]
fn text_group_chunks_by_group_size() {
    let (engine, im) = engine_with(
        r#"(input-method t chunked)
           (map (m
             ("c" (insert ("abcdef")))
             (">" (select @]))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.set_variable("candidates-group-size", Value::Integer(2)).expect("reserved variable");

    ic.filter("c");
    let list = ic.candidate_list().expect("list");
    assert_eq!(list.len(), 6);
    assert_eq!(list.group_count(), 3, "six chars in groups of two");
    assert_eq!(ic.preedit_text(), "a");

    ic.filter(">");
    assert_eq!(ic.preedit_text(), "c", "next group starts at the third char");
    assert_eq!(ic.candidate_index(), 2);
}

/// The default group size is 10.
#[test]
fn default_group_size_is_ten() {
    let (engine, im) = engine_with(
        r#"(input-method t tenner)
           (map (m ("c" (insert ("abcdefghijkl")))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.filter("c");
    let list = ic.candidate_list().expect("list");
    assert_eq!(list.group_count(), 2);
    assert_eq!(list.groups()[0].len(), 10);
    assert_eq!(list.groups()[1].len(), 2);
}

/// `candidates-charset` drops candidates with out-of-charset codepoints.
#[test]
fn charset_filters_candidates() {
    let (engine, im) = engine_with(
        r#"(input-method t charsets)
           (map (m ("c" (insert (("a" "é" "か") ("z"))))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.set_variable("candidates-charset", Value::symbol("latin-1")).expect("reserved variable");

    ic.filter("c");
    let list = ic.candidate_list().expect("list");
    assert_eq!(list.len(), 3, "か is outside latin-1");
    assert_eq!(list.groups()[0], vec!["a".to_owned(), "é".to_owned()]);
}

/// Selecting replaces exactly the candidate span, leaving surrounding
/// preedit text alone.
#[test]
fn selection_replaces_only_the_span() {
    let (engine, im) = engine_with(
        r#"(input-method t nested)
           (map (m
             ("c" (insert "[") (insert (("one" "two"))) (insert "]") (move @-))
             ("n" (select @+))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.filter("c");
    assert_eq!(ic.preedit_text(), "[one]");
    // cursor sits just after the candidate span
    ic.filter("n");
    assert_eq!(ic.preedit_text(), "[two]");
    assert_eq!(ic.candidate_index(), 1);
}
