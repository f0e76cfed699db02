//! The input method definition database.
//!
//! The engine looks descriptions up by `(language, name, extra)` tag through
//! the [`Database`] trait; the persistent storage behind it belongs to the
//! host. [`MemDatabase`] is the shipped implementation: it holds registered
//! description texts, which covers embedding and tests. A host with on-disk
//! description files implements the trait over its own store and identifies
//! files by their `(input-method LANG NAME [EXTRA])` header (see
//! [`header_tag`]).

use std::{fmt, path::PathBuf};

use crate::{
    parse::{ParseError, parse_description},
    value::Value,
};

/// Identity of an input method definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImTag {
    pub language: String,
    pub name: String,
    pub extra: String,
}

impl ImTag {
    #[must_use]
    pub fn new(language: &str, name: &str) -> Self {
        Self {
            language: language.to_owned(),
            name: name.to_owned(),
            extra: String::new(),
        }
    }

    #[must_use]
    pub fn with_extra(language: &str, name: &str, extra: &str) -> Self {
        Self {
            language: language.to_owned(),
            name: name.to_owned(),
            extra: extra.to_owned(),
        }
    }
}

impl fmt::Display for ImTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.language, self.name)?;
        if !self.extra.is_empty() {
            write!(f, "-{}", self.extra)?;
        }
        Ok(())
    }
}

/// Opaque handle to a findable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbHandle(usize);

/// Error from the database collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    NotFound,
    Parse(ParseError),
    Io(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("definition not found"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Io(message) => write!(f, "i/o error: {message}"),
        }
    }
}

impl std::error::Error for DbError {}

/// Lookup and loading of input method descriptions.
pub trait Database: Send + Sync {
    /// Finds the definition carrying `tag`.
    fn find(&self, tag: &ImTag) -> Option<DbHandle>;

    /// Loads the full description tree behind a handle.
    fn load(&self, handle: &DbHandle) -> Result<Vec<Value>, DbError>;

    /// Loads only the top-level sections whose head symbol is in `keys`
    /// (used to fetch just `title`, `description`, `variable`, `command`).
    fn load_for_keys(&self, handle: &DbHandle, keys: &[&str]) -> Result<Vec<Value>, DbError> {
        let tree = self.load(handle)?;
        Ok(filter_sections(tree, keys))
    }

    /// Resolves an auxiliary file name (icons and the like) to a path.
    fn find_file(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Keeps the top-level lists whose head symbol is one of `keys`.
fn filter_sections(tree: Vec<Value>, keys: &[&str]) -> Vec<Value> {
    tree.into_iter()
        .filter(|section| {
            section
                .as_list()
                .and_then(|items| items.first())
                .and_then(Value::as_symbol)
                .is_some_and(|head| keys.contains(&head))
        })
        .collect()
}

/// Reads the `(input-method LANG NAME [EXTRA])` header of a parsed tree.
#[must_use]
pub fn header_tag(tree: &[Value]) -> Option<ImTag> {
    for section in tree {
        let items = section.as_list()?;
        if items.first().and_then(Value::as_symbol) == Some("input-method") {
            let language = items.get(1).and_then(Value::as_symbol)?;
            let name = items.get(2).and_then(Value::as_symbol)?;
            let extra = items.get(3).and_then(Value::as_symbol).unwrap_or("");
            return Some(ImTag::with_extra(language, name, extra));
        }
    }
    None
}

/// In-memory database of registered description texts.
#[derive(Debug, Default)]
pub struct MemDatabase {
    entries: Vec<(ImTag, String)>,
}

impl MemDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a description text under an explicit tag.
    pub fn register(&mut self, tag: ImTag, source: &str) {
        self.entries.push((tag, source.to_owned()));
    }

    /// Registers a description text, reading its tag from the
    /// `(input-method …)` header.
    pub fn register_source(&mut self, source: &str) -> Result<ImTag, DbError> {
        let tree = parse_description(source).map_err(DbError::Parse)?;
        let tag = header_tag(&tree).ok_or(DbError::NotFound)?;
        self.entries.push((tag.clone(), source.to_owned()));
        Ok(tag)
    }
}

impl Database for MemDatabase {
    fn find(&self, tag: &ImTag) -> Option<DbHandle> {
        self.entries.iter().position(|(entry, _)| entry == tag).map(DbHandle)
    }

    fn load(&self, handle: &DbHandle) -> Result<Vec<Value>, DbError> {
        let (_, source) = self.entries.get(handle.0).ok_or(DbError::NotFound)?;
        parse_description(source).map_err(DbError::Parse)
    }
}
