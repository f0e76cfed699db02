//! Compiled input method definitions.
//!
//! An [`InputMethod`] is the immutable result of loading a description. It
//! is shared behind an `Arc` by the engine cache and by every context bound
//! to it; all per-session mutation lives in [`crate::context::Context`].

use indexmap::IndexMap;

use crate::{
    database::ImTag,
    expressions::{ActionList, KeySeq},
    keysym::KeySym,
    modules::{Module, ModuleFn},
    trie::KeyTrie,
    value::Value,
};
use std::sync::Arc;

/// One translation rule of a named map: a key sequence and the actions fired
/// when it completes.
#[derive(Debug, Clone)]
pub struct MapRule {
    pub keys: KeySeq,
    pub actions: ActionList,
}

/// A named key map: an ordered list of translation rules.
///
/// Kept in rule form (rather than as a compiled trie) because a map can be
/// merged into several states, each attaching different branch actions.
#[derive(Debug, Clone, Default)]
pub struct MapDef {
    pub rules: Vec<MapRule>,
}

/// A state of the input method: its status title and compiled key trie.
#[derive(Debug)]
pub struct ImState {
    pub name: KeySym,
    pub title: Option<String>,
    pub trie: KeyTrie,
}

/// An external module resolved at load time.
pub struct ModuleBinding {
    pub module: Arc<Module>,
    /// The functions named in the description, in order.
    pub functions: IndexMap<KeySym, ModuleFn>,
}

impl std::fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBinding")
            .field("module", &self.module.name())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A value constraint of a declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableConstraint {
    Integer(i64),
    Range(i64, i64),
    Symbol(String),
    Text(String),
}

impl VariableConstraint {
    /// Returns `true` if `value` satisfies this constraint.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Integer(want), Value::Integer(have)) => want == have,
            (Self::Range(lo, hi), Value::Integer(have)) => lo <= have && have <= hi,
            (Self::Symbol(want), Value::Symbol(have)) => want == have,
            (Self::Text(want), Value::Text(have)) => want == have,
            _ => false,
        }
    }
}

/// A declared per-context variable with its typed default and constraints.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: KeySym,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub constraints: Vec<VariableConstraint>,
}

impl VariableDecl {
    /// Checks a candidate value against the declaration: the type must match
    /// the default's type (when both are present) and any constraint list
    /// must admit the value.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        if let Some(default) = &self.default {
            if std::mem::discriminant(default) != std::mem::discriminant(value) {
                return false;
            }
        }
        self.constraints.is_empty() || self.constraints.iter().any(|c| c.admits(value))
    }
}

/// A declared command: a name the host can bind key sequences to.
#[derive(Debug, Clone)]
pub struct CommandDecl {
    pub name: KeySym,
    pub description: Option<String>,
    pub keyseqs: Vec<KeySeq>,
}

/// An immutable, loaded input method definition.
#[derive(Debug)]
pub struct InputMethod {
    pub(crate) tag: ImTag,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    /// Ordered; the first state is the initial state.
    pub(crate) states: IndexMap<KeySym, ImState>,
    pub(crate) maps: IndexMap<KeySym, MapDef>,
    pub(crate) macros: IndexMap<KeySym, ActionList>,
    pub(crate) modules: IndexMap<KeySym, ModuleBinding>,
    pub(crate) variables: IndexMap<KeySym, VariableDecl>,
    pub(crate) commands: IndexMap<KeySym, CommandDecl>,
}

impl InputMethod {
    #[must_use]
    pub fn tag(&self) -> &ImTag {
        &self.tag
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.tag.language
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.tag.name
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The initial state: the first state of the description.
    #[must_use]
    pub fn initial_state(&self) -> &ImState {
        self.state_at(0)
    }

    /// State by position in declaration order.
    ///
    /// # Panics
    /// Panics if `index` is out of range; context state indices are only
    /// ever produced by [`Self::state_index`].
    #[must_use]
    pub fn state_at(&self, index: usize) -> &ImState {
        self.states.get_index(index).expect("state index in range").1
    }

    /// Position of a state in declaration order.
    #[must_use]
    pub fn state_index(&self, name: KeySym) -> Option<usize> {
        self.states.get_index_of(&name)
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn macro_actions(&self, name: KeySym) -> Option<&ActionList> {
        self.macros.get(&name)
    }

    #[must_use]
    pub fn module(&self, name: KeySym) -> Option<&ModuleBinding> {
        self.modules.get(&name)
    }

    /// Iterates module bindings in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleBinding> {
        self.modules.values()
    }

    #[must_use]
    pub fn variable(&self, name: KeySym) -> Option<&VariableDecl> {
        self.variables.get(&name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableDecl> {
        self.variables.values()
    }

    pub fn commands(&self) -> impl Iterator<Item = &CommandDecl> {
        self.commands.values()
    }
}
