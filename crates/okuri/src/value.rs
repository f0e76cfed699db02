//! The description tree value type.
//!
//! Input method descriptions are nested lists with integer, symbol, and text
//! leaves. The reader in [`crate::parse`] produces this tree; the loader in
//! [`crate::load`] compiles it into typed definitions. Keeping the tree as a
//! concrete sum type (instead of a generic property list discriminated by
//! key) lets the loader validate shapes with exhaustive matches.

use std::fmt;

/// One node of a description tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Integer(i64),
    /// A bare symbol name. Symbols are interned into [`crate::KeySym`]s at
    /// load time; the tree keeps the spelling so parsed trees can be cached
    /// and loaded into any engine.
    Symbol(String),
    Text(String),
    List(Vec<Value>),
    /// Keyed values, used for plist-shaped data returned by module calls.
    Plist(Vec<(String, Value)>),
}

impl Value {
    /// Convenience constructor for a symbol node.
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_owned())
    }

    /// Convenience constructor for a text node.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_owned())
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for the symbol `nil`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Symbol(name) if name == "nil")
    }

    /// A short tag for error messages ("integer", "symbol", ...).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Symbol(_) => "symbol",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Plist(_) => "plist",
        }
    }
}

impl fmt::Display for Value {
    /// Renders the value back in description syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Symbol(name) => f.write_str(name),
            Self::Text(text) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Plist(pairs) => {
                f.write_str("(")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str(")")
            }
        }
    }
}
