//! End-to-end filter loop behavior over small in-memory descriptions.

use std::sync::Arc;

use okuri::{CollectTracer, Context, Engine, InputMethod, MemDatabase};

fn engine_with(source: &str) -> (Arc<Engine>, Arc<InputMethod>) {
    let mut db = MemDatabase::new();
    let tag = db.register_source(source).expect("description registers");
    let engine = Engine::new(db);
    let im = engine.open_tagged(&tag).expect("description loads");
    (engine, im)
}

/// Feeds keys in order, draining produced text whenever filter asks for a
/// lookup. Returns the committed text.
fn feed(engine: &Engine, ic: &mut Context, keys: &[&str]) -> String {
    let mut committed = String::new();
    for key in keys {
        if ic.filter(key) == 0 {
            let mut out = String::new();
            ic.lookup(engine.intern(key), &mut out);
            committed.push_str(&out);
        }
    }
    committed
}

/// Scenario: a single mapped key inserts into the preedit without
/// committing; an unmapped key flushes the preedit and hands it to lookup.
#[test]
fn literal_insertion_and_flush() {
    let (engine, im) = engine_with(
        r#"(input-method t one)
           (map (m ("a" "α")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.filter("a"), 1, "mapped key is consumed with nothing to look up");
    assert_eq!(ic.preedit_text(), "α");
    assert_eq!(ic.cursor_pos(), 1);
    assert_eq!(ic.produced(), "");

    assert_eq!(ic.filter("Return"), 0, "unmapped key forces a commit");
    assert_eq!(ic.preedit_text(), "", "preedit is flushed");
    let mut out = String::new();
    assert_eq!(ic.lookup(engine.intern("Return"), &mut out), 0, "flushed text reaches the caller");
    assert_eq!(out, "α");
}

/// Scenario: a two-key sequence shows the pending literal key, then the
/// composed character.
#[test]
fn two_key_combining_sequence() {
    let (engine, im) = engine_with(
        r#"(input-method t kana)
           (map (m ("ka" "か") ("kk" "っ")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.filter("k"), 1);
    assert_eq!(ic.preedit_text(), "k", "prefix self-inserts while the sequence is open");
    assert_eq!(ic.filter("a"), 1);
    assert_eq!(ic.preedit_text(), "か", "the pending literal is replaced by the mapping");
    assert_eq!(ic.cursor_pos(), 1);
    assert_eq!(feed(&engine, &mut ic, &["Return"]), "か");

    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(feed(&engine, &mut ic, &["k", "k", "Return"]), "っ");
}

/// Scenario: variables and a comparison branch steer the inserted text.
#[test]
fn variables_and_arithmetic_branch() {
    let source = r#"(input-method t arith)
        (map (m
          ("1" (set x 1))
          ("2" (set x 2))
          ("=" (< x 2 ((insert "small")) ((insert "big"))))))
        (state (init (m)))"#;
    let (engine, im) = engine_with(source);

    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(feed(&engine, &mut ic, &["1", "=", "Return"]), "small");

    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(feed(&engine, &mut ic, &["2", "=", "Return"]), "big");
}

/// Scenario: a pushback cycle trips the 100-iteration cap, resets the
/// context, and reports the key unhandled.
#[test]
fn pushback_loop_hits_iteration_cap() {
    let (engine, im) = engine_with(
        r#"(input-method t looper)
           (map (m ("x" (pushback 1) (insert "X"))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.set_tracer(Box::new(CollectTracer::default()));

    assert_eq!(ic.filter("x"), 0, "looping key ends up unhandled");
    assert!(ic.key_unhandled());
    assert_eq!(ic.preedit_text(), "", "reset discarded the looping preedit");
    assert_eq!(ic.produced(), "");
    let mut out = String::new();
    assert_eq!(ic.lookup(engine.intern("x"), &mut out), -1, "host must re-dispatch the key");
    assert_eq!(out, "");

    let tracer = ic.take_tracer();
    // downcast through Any is not worth it; the observable contract above
    // is the test, the tracer just must not have panicked
    drop(tracer);

    // the context stays usable after the reset
    ic.set_tracer(Box::new(CollectTracer::default()));
    assert_eq!(ic.filter("x"), 0);
}

/// Pushback far past the front of the ring clamps instead of panicking and
/// resolves like any other replay loop.
#[test]
fn pushback_clamps_to_buffer() {
    let (engine, im) = engine_with(
        r#"(input-method t clamp)
           (map (m ("x" (pushback 100) (insert "X"))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("x"), 0);
    assert!(ic.key_unhandled());
}

/// A bounded pushback replays the rewound keys through the new state of
/// the machine.
#[test]
fn pushback_replays_pending_keys() {
    let (engine, im) = engine_with(
        r#"(input-method t replay)
           (map (m
             ("ab" (pushback 1) (insert "Z"))
             ("b" (insert "!"))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    // "ab" completes, pushes "b" back, and "b" re-enters through its own
    // single-key rule.
    assert_eq!(ic.filter("a"), 1);
    assert_eq!(ic.filter("b"), 1);
    assert_eq!(ic.preedit_text(), "Z!", "pushed-back key was replayed after the insert");
}

/// Scenario: `undo 0` across a built-up preedit clears everything and
/// empties the key ring.
#[test]
fn undo_clears_preedit_and_ring() {
    let (engine, im) = engine_with(
        r#"(input-method t undo)
           (map (m
             ("a" "A")
             ("b" "B")
             ("u" (undo 0))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("a"), 1);
    assert_eq!(ic.filter("b"), 1);
    assert_eq!(ic.preedit_text(), "AB");

    assert_eq!(ic.filter("u"), 1, "undo consumes its key");
    assert_eq!(ic.preedit_text(), "", "undo 0 drops the whole composition");
    assert_eq!(ic.produced(), "", "undo commits nothing");

    // the context is back at the initial state and accepts fresh input
    assert_eq!(ic.filter("a"), 1);
    assert_eq!(ic.preedit_text(), "A");
}

/// The default `undo` drops the undo key and the one before it.
#[test]
fn undo_default_drops_previous_key() {
    let (engine, im) = engine_with(
        r#"(input-method t undo2)
           (map (m
             ("a" "A")
             ("b" "B")
             ("u" (undo))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    feed(&engine, &mut ic, &["a", "b", "u"]);
    assert_eq!(ic.preedit_text(), "A", "the key before the undo key is replayed away");
}

/// Boundary: an unmapped key at the initial state must not disturb the
/// context.
#[test]
fn unmapped_key_is_unhandled_without_side_effects() {
    let (engine, im) = engine_with(
        r#"(input-method t strict)
           (map (m ("a" "α")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.filter("z"), 0);
    assert!(ic.key_unhandled());
    assert_eq!(ic.preedit_text(), "");
    assert_eq!(ic.produced(), "");
    let mut out = String::new();
    assert_eq!(ic.lookup(engine.intern("z"), &mut out), -1);
    assert_eq!(out, "");
}

/// Law: `reset` is idempotent, and `filter(k); reset` yields no text.
#[test]
fn reset_laws() {
    let (engine, im) = engine_with(
        r#"(input-method t resetting)
           (map (m ("ka" "か")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.filter("k"), 1);
    assert_eq!(ic.preedit_text(), "k");
    ic.reset();
    assert_eq!(ic.preedit_text(), "");
    assert_eq!(ic.produced(), "", "reset commits nothing");
    let after_once = (ic.preedit_text(), ic.produced().to_owned(), ic.status().to_owned());
    ic.reset();
    let after_twice = (ic.preedit_text(), ic.produced().to_owned(), ic.status().to_owned());
    assert_eq!(after_once, after_twice, "reset; reset behaves like reset");

    // the dangling "k" must not resurface later
    assert_eq!(feed(&engine, &mut ic, &["k", "a", " "]), "か");
}

/// Produced text is the concatenation of per-state committed segments.
#[test]
fn multi_state_commit_concatenation() {
    let (engine, im) = engine_with(
        r#"(input-method t staged)
           (title "Staged")
           (map
             (first ("g" (insert "1") (shift second)))
             (rest ("h" (insert "2") (shift init))))
           (state
             (init (first))
             (second "SECOND" (rest)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");

    assert_eq!(ic.status(), "Staged", "initial status falls back to the input method title");
    assert_eq!(ic.filter("g"), 1);
    assert_eq!(ic.status(), "SECOND", "status follows the state title");
    assert!(ic.changed().status);

    assert_eq!(ic.filter("h"), 0, "shifting to the initial state commits");
    assert_eq!(ic.produced(), "12");
    assert_eq!(ic.preedit_text(), "");
    assert_eq!(ic.status(), "Staged");
}

/// `shift t` returns to the previous state.
#[test]
fn shift_back_to_previous_state() {
    let (engine, im) = engine_with(
        r#"(input-method t bouncer)
           (map
             (first ("g" (shift second)))
             (rest ("b" (insert "x") (shift t))))
           (state
             (init "INIT" (first))
             (second "SECOND" (rest)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("g"), 1);
    assert_eq!(ic.status(), "SECOND");
    // shift t goes back to init, which commits the pending "x"
    assert_eq!(ic.filter("b"), 0);
    assert_eq!(ic.produced(), "x");
    assert_eq!(ic.status(), "INIT");
}

/// Markers and cursor movement compose: mark a position, move back to it,
/// and insert there.
#[test]
fn mark_move_and_insert() {
    let (engine, im) = engine_with(
        r#"(input-method t marking)
           (map (m ("w" (insert "ab") (mark here) (insert "cd") (move here) (insert "X"))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("w"), 1);
    assert_eq!(ic.preedit_text(), "abXcd");
    assert_eq!(ic.cursor_pos(), 3);
}

/// Deleting a span clamps markers that pointed inside it to the deletion
/// start; markers before it are untouched.
#[test]
fn delete_clamps_markers_inside_span() {
    let (engine, im) = engine_with(
        r#"(input-method t clamping)
           (map (m ("w"
             (insert "abcd")
             (move 2) (mark inside)
             (move @<) (mark front)
             (move 1)
             (delete @>)
             (move inside) (insert "I")
             (move front) (insert "F"))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("w"), 1);
    // After deleting [1,4): "a". Marker `inside` (was 2) clamps to 1,
    // marker `front` (was 0) stays. Insert "I" at 1 -> "aI", then "F" at
    // 0 -> "FaI".
    assert_eq!(ic.preedit_text(), "FaI");
}

/// Boundary: `delete @<` on an empty preedit is a no-op.
#[test]
fn delete_to_start_of_empty_preedit() {
    let (engine, im) = engine_with(
        r#"(input-method t empty-delete)
           (map (m ("d" (delete @<))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("d"), 1);
    assert_eq!(ic.preedit_text(), "");
    assert_eq!(ic.produced(), "");
}

/// `move` past the end of the preedit clamps to the end.
#[test]
fn move_clamps_to_preedit_bounds() {
    let (engine, im) = engine_with(
        r#"(input-method t mover)
           (map (m ("w" (insert "ab") (move 99))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("w"), 1);
    assert_eq!(ic.cursor_pos(), 2);
}

/// An inactive context declines every key; toggling back restores normal
/// filtering.
#[test]
fn toggle_deactivates_filtering() {
    let (engine, im) = engine_with(
        r#"(input-method t toggler)
           (map (m ("a" "α")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    ic.toggle();
    assert!(!ic.is_active());
    assert_eq!(ic.filter("a"), 0);
    assert!(ic.key_unhandled());
    assert_eq!(ic.preedit_text(), "");

    ic.toggle();
    assert_eq!(ic.filter("a"), 1);
    assert_eq!(ic.preedit_text(), "α");
}

/// `commit` mid-sequence moves the preedit to produced text immediately.
#[test]
fn explicit_commit_action() {
    let (engine, im) = engine_with(
        r#"(input-method t committing)
           (map (m ("a" (insert "α") (commit))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("a"), 0, "produced text means lookup is needed");
    assert_eq!(ic.produced(), "α");
    assert_eq!(ic.preedit_text(), "");
    assert!(!ic.key_unhandled());
}

/// `unhandle` commits, then reports the key unhandled; lookup still
/// returns the committed text.
#[test]
fn unhandle_commits_then_aborts() {
    let (engine, im) = engine_with(
        r#"(input-method t unhandler)
           (map (m ("a" (insert "α") (unhandle))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("a"), 0);
    assert!(ic.key_unhandled());
    let mut out = String::new();
    assert_eq!(ic.lookup(engine.intern("a"), &mut out), 0, "text was flushed, so lookup succeeds");
    assert_eq!(out, "α");
}

/// Macros run like inline action lists, including from other macros.
#[test]
fn macros_expand_recursively() {
    let (engine, im) = engine_with(
        r#"(input-method t macros)
           (macro
             (greet (insert "hi"))
             (double (greet) (greet)))
           (map (m ("g" (double))))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("g"), 1);
    assert_eq!(ic.preedit_text(), "hihi");
}

/// A meta-modified key reaches a map keyed with the opposite spelling
/// through the synthesized alias.
#[test]
fn meta_alias_matches_at_filter_time() {
    let (engine, im) = engine_with(
        r#"(input-method t meta)
           (map (m ((M-a) "μ")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("A-a"), 1, "A-a aliases to M-a");
    assert_eq!(ic.preedit_text(), "μ");
}

/// A shifted letter aliases to the plain uppercase key.
#[test]
fn shift_alias_matches_uppercase() {
    let (engine, im) = engine_with(
        r#"(input-method t shifty)
           (map (m ("Q" "φ")))
           (state (init (m)))"#,
    );
    let mut ic = engine.create_ic(&im).expect("context");
    assert_eq!(ic.filter("S-Q"), 1);
    assert_eq!(ic.preedit_text(), "φ");
}
