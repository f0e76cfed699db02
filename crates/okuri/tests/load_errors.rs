//! Loader validation: everything malformed is rejected before a context
//! ever runs it.

use std::sync::Arc;

use okuri::{Engine, ImTag, InputMethod, LoadError, MemDatabase};

fn try_load(source: &str) -> Result<Arc<InputMethod>, LoadError> {
    let mut db = MemDatabase::new();
    let tag = db.register_source(source).expect("description registers");
    Engine::new(db).open_tagged(&tag)
}

fn expect_validate(source: &str, needle: &str) {
    match try_load(source) {
        Err(LoadError::Validate(message)) => {
            assert!(message.contains(needle), "expected '{needle}' in: {message}");
        }
        other => panic!("expected a validation error mentioning '{needle}', got {other:?}"),
    }
}

/// A definition without any state is rejected.
#[test]
fn missing_state_section() {
    expect_validate(
        r#"(input-method t stateless)
           (map (m ("a" "x")))"#,
        "no state",
    );
}

/// A state branch naming an undefined map is rejected.
#[test]
fn undefined_map_in_state() {
    expect_validate(
        r#"(input-method t mapless)
           (state (init (missing-map)))"#,
        "undefined map",
    );
}

/// An action calling an undefined macro is rejected, wherever it sits.
#[test]
fn undefined_macro_call() {
    expect_validate(
        r#"(input-method t macroless)
           (map (m ("a" (boom))))
           (state (init (m)))"#,
        "undefined macro",
    );
    expect_validate(
        r#"(input-method t macroless2)
           (map (m ("a" "x")))
           (state (init (m) (nil (boom))))"#,
        "undefined macro",
    );
}

/// Macros may reference macros defined later in the description.
#[test]
fn forward_macro_references_load() {
    let im = try_load(
        r#"(input-method t forward)
           (macro (outer (inner)))
           (map (m ("a" (outer))))
           (state (init (m)))
           (macro (inner (insert "!")))"#,
    )
    .expect("forward references between macros are legal");
    assert_eq!(im.name(), "forward");
}

/// `shift` to a state that never appears loads fine (checked at run time).
#[test]
fn forward_shift_targets_are_not_checked() {
    assert!(
        try_load(
            r#"(input-method t lax-shift)
               (map (m ("a" (shift nowhere))))
               (state (init (m)))"#,
        )
        .is_ok()
    );
}

/// A compound expression without an operator is a load error.
#[test]
fn malformed_expression() {
    expect_validate(
        r#"(input-method t noop)
           (map (m ("a" (delete (1 2)))))
           (state (init (m)))"#,
        "operator",
    );
}

/// Wrong arity on comparison and `!` operators is a load error.
#[test]
fn wrong_operator_arity() {
    expect_validate(
        r#"(input-method t arity)
           (map (m ("a" (set x (! 1 2)))))
           (state (init (m)))"#,
        "one argument",
    );
    expect_validate(
        r#"(input-method t arity2)
           (map (m ("a" (set x (< 1)))))
           (state (init (m)))"#,
        "two arguments",
    );
}

/// A literal zero divisor is rejected at load.
#[test]
fn literal_division_by_zero() {
    expect_validate(
        r#"(input-method t divzero)
           (map (m ("a" (div x 0))))
           (state (init (m)))"#,
        "zero",
    );
    expect_validate(
        r#"(input-method t divzero2)
           (map (m ("a" (set x (/ 4 0)))))
           (state (init (m)))"#,
        "zero",
    );
}

/// Key codes outside 0..=255 in a list key sequence are rejected.
#[test]
fn key_code_out_of_range() {
    expect_validate(
        r#"(input-method t keycode)
           (map (m ((300) "x")))
           (state (init (m)))"#,
        "out of range",
    );
}

/// `@`-prefixed names that are not predefined markers are rejected.
#[test]
fn unknown_predefined_marker() {
    expect_validate(
        r#"(input-method t badmarker)
           (map (m ("a" (mark @bogus))))
           (state (init (m)))"#,
        "predefined marker",
    );
}

/// A `(module …)` section with no module loader installed fails the load.
#[test]
fn module_without_loader() {
    match try_load(
        r#"(input-method t modular)
           (module (helper setup))
           (map (m ("a" "x")))
           (state (init (m)))"#,
    ) {
        Err(LoadError::Module(message)) => {
            assert!(message.contains("helper"), "got: {message}");
        }
        other => panic!("expected a module error, got {other:?}"),
    }
}

/// Version gating: a description demanding a future engine fails, one
/// demanding the past loads.
#[test]
fn version_gate() {
    match try_load(
        r#"(input-method t futuristic)
           (version "99.0.0")
           (map (m ("a" "x")))
           (state (init (m)))"#,
    ) {
        Err(LoadError::VersionTooOld { required }) => assert_eq!(required, "99.0.0"),
        other => panic!("expected VersionTooOld, got {other:?}"),
    }
    assert!(
        try_load(
            r#"(input-method t historical)
               (version "0.0.1")
               (map (m ("a" "x")))
               (state (init (m)))"#,
        )
        .is_ok()
    );
}

/// The first definition of a key sequence wins; later duplicates do not
/// override it.
#[test]
fn first_defined_translation_wins() {
    let mut db = MemDatabase::new();
    let tag = db
        .register_source(
            r#"(input-method t firstwins)
               (map (m ("a" "first") ("a" "second")))
               (state (init (m)))"#,
        )
        .expect("registers");
    let engine = Engine::new(db);
    let im = engine.open_tagged(&tag).expect("loads");
    let mut ic = engine.create_ic(&im).expect("context");
    ic.filter("a");
    assert_eq!(ic.preedit_text(), "first");
}

/// `include` pulls maps from another definition resolved through the
/// engine.
#[test]
fn include_maps_from_another_definition() {
    let mut db = MemDatabase::new();
    db.register_source(
        r#"(input-method t base)
           (map (shared ("q" "Q!")))
           (state (init (shared)))"#,
    )
    .expect("base registers");
    let tag = db
        .register_source(
            r#"(input-method t derived)
               (include (t base) map)
               (state (init (shared)))"#,
        )
        .expect("derived registers");
    let engine = Engine::new(db);
    let im = engine.open_tagged(&tag).expect("derived loads against base");
    let mut ic = engine.create_ic(&im).expect("context");
    ic.filter("q");
    assert_eq!(ic.preedit_text(), "Q!");
}

/// `include` of a definition the database does not know fails the load.
#[test]
fn include_of_missing_definition() {
    match try_load(
        r#"(input-method t orphan)
           (include (t nonexistent) map)
           (state (init (nil (commit))))"#,
    ) {
        Err(LoadError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// Opening twice returns the cached definition; closing evicts it.
#[test]
fn cache_round_trip() {
    let mut db = MemDatabase::new();
    let tag = db
        .register_source(
            r#"(input-method t cached)
               (map (m ("a" "x")))
               (state (init (m)))"#,
        )
        .expect("registers");
    let engine = Engine::new(db);
    let first = engine.open_tagged(&tag).expect("loads");
    let second = engine.open_tagged(&tag).expect("cached");
    assert!(Arc::ptr_eq(&first, &second), "second open hits the cache");
    engine.close_im(&first);
    let third = engine.open_tagged(&tag).expect("reloads");
    assert!(!Arc::ptr_eq(&first, &third), "close evicted the cache entry");
    assert_eq!(third.tag(), &ImTag::new("t", "cached"));
}
