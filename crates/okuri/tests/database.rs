//! Database collaborator contract: lookups, partial loads, and schema
//! queries.

use okuri::{Database, Engine, ImTag, MemDatabase, Value, header_tag, parse_description};

const LATN: &str = r#"(input-method t latn-post)
(title "Postfix accents")
(description "Compose accented Latin letters from postfix apostrophes.")
(map (trans ("a'" "á") ("e'" "é")))
(state (init (trans)))"#;

/// The `(input-method …)` header is the identity of a description.
#[test]
fn header_tag_reads_identity() {
    let tree = parse_description(LATN).expect("parses");
    let tag = header_tag(&tree).expect("has a header");
    assert_eq!(tag, ImTag::new("t", "latn-post"));

    let tree = parse_description("(input-method t nil command)").expect("parses");
    assert_eq!(header_tag(&tree), Some(ImTag::with_extra("t", "nil", "command")));
}

/// Registered descriptions are findable by tag and load as trees.
#[test]
fn mem_database_find_and_load() {
    let mut db = MemDatabase::new();
    let tag = db.register_source(LATN).expect("registers");
    assert!(db.find(&tag).is_some());
    assert!(db.find(&ImTag::new("t", "missing")).is_none());
    let handle = db.find(&tag).expect("found");
    let tree = db.load(&handle).expect("loads");
    assert_eq!(header_tag(&tree), Some(tag));
}

/// Partial loads return only the requested sections.
#[test]
fn partial_load_filters_sections() {
    let mut db = MemDatabase::new();
    let tag = db.register_source(LATN).expect("registers");
    let handle = db.find(&tag).expect("found");
    let sections = db.load_for_keys(&handle, &["title", "description"]).expect("partial load");
    assert_eq!(sections.len(), 2);
    let heads: Vec<&str> = sections
        .iter()
        .filter_map(|s| s.as_list().and_then(|items| items.first()).and_then(Value::as_symbol))
        .collect();
    assert_eq!(heads, ["title", "description"]);
}

/// `describe_im` reads the description text without compiling the
/// definition.
#[test]
fn describe_without_loading() {
    let mut db = MemDatabase::new();
    db.register_source(LATN).expect("registers");
    let engine = Engine::new(db);
    let description = engine.describe_im("t", "latn-post").expect("query");
    assert_eq!(
        description.as_deref(),
        Some("Compose accented Latin letters from postfix apostrophes.")
    );
    // auxiliary file resolution is the host database's concern; the
    // in-memory database has none
    assert!(engine.find_file("icon.png").is_none());
}

/// `im_variables` and `im_commands` read the schema sections without
/// compiling the definition.
#[test]
fn schema_queries_without_loading() {
    let mut db = MemDatabase::new();
    db.register_source(
        r#"(input-method t tunable)
           (variable
             (speed "conversion speed" 1 (0 9))
             (mode))
           (command (flush "Commit the preedit" ("C-Return")))
           (map (m ("a" "x")))
           (state (init (m)))"#,
    )
    .expect("registers");
    let engine = Engine::new(db);

    let variables = engine.im_variables("t", "tunable").expect("query");
    assert_eq!(
        variables,
        vec![
            ("speed".to_owned(), Some("conversion speed".to_owned())),
            ("mode".to_owned(), None),
        ]
    );

    let commands = engine.im_commands("t", "tunable").expect("query");
    assert_eq!(commands, vec![("flush".to_owned(), Some("Commit the preedit".to_owned()))]);

    // a definition with no schema sections yields empty lists, not errors
    let mut db = MemDatabase::new();
    db.register_source(LATN).expect("registers");
    let engine = Engine::new(db);
    assert!(engine.im_variables("t", "latn-post").expect("query").is_empty());
    assert!(engine.im_commands("t", "latn-post").expect("query").is_empty());
}

/// The global command schema lives under the `(t, nil, command)` tag.
#[test]
fn global_command_schema() {
    let mut db = MemDatabase::new();
    db.register(
        ImTag::with_extra("t", "nil", "command"),
        r#"(command (commit-key "Commit the preedit" ("C-Return")))"#,
    );
    db.register_source(LATN).expect("registers");
    let engine = Engine::new(db);
    let schema = engine.global_schema("command").expect("query");
    assert_eq!(schema.len(), 1);
    let section = schema[0].as_list().expect("list");
    assert_eq!(section[0], Value::symbol("command"));
}

/// A description composes the same way after a binary dump/load cycle.
#[test]
fn dumped_tree_round_trips() {
    let tree = parse_description(LATN).expect("parses");
    let bytes = okuri::dump_description(&tree).expect("dumps");
    let restored = okuri::load_description(&bytes).expect("loads");
    assert_eq!(restored, tree);
}
