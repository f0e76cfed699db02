//! Compiles a parsed description tree into a validated [`InputMethod`].
//!
//! Loading is strict: every action shape, macro reference, and module
//! function is checked here, so the interpreter never sees a malformed
//! action list. Sections may appear in any order; states are compiled last
//! because their branches reference named maps.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    database::{DbError, ImTag},
    definition::{CommandDecl, ImState, InputMethod, MapDef, MapRule, ModuleBinding, VariableConstraint, VariableDecl},
    expressions::{Action, ActionList, Expr, ShapeError, parse_action_list, parse_keyseq},
    keysym::{KeySym, SymbolTable, WellKnown},
    modules::ModuleLoader,
    parse::ParseError,
    trie::KeyTrie,
    value::Value,
};

/// Error from loading an input method definition.
#[derive(Debug, Clone)]
pub enum LoadError {
    /// No definition with the requested tag exists in the database.
    NotFound,
    /// The description text is not well formed.
    Parse(ParseError),
    /// The description tree does not describe a valid input method.
    Validate(String),
    /// A module or one of its functions could not be resolved.
    Module(String),
    /// The description requires a newer engine.
    VersionTooOld { required: String },
    Io(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("input method not found"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Validate(message) => write!(f, "invalid input method: {message}"),
            Self::Module(message) => write!(f, "module error: {message}"),
            Self::VersionTooOld { required } => {
                write!(f, "description requires engine version {required} or newer")
            }
            Self::Io(message) => write!(f, "i/o error: {message}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<DbError> for LoadError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::NotFound,
            DbError::Parse(err) => Self::Parse(err),
            DbError::Io(message) => Self::Io(message),
        }
    }
}

fn validate_err<T>(message: impl Into<String>) -> Result<T, LoadError> {
    Err(LoadError::Validate(message.into()))
}

impl From<ShapeError> for LoadError {
    fn from(err: ShapeError) -> Self {
        Self::Validate(err.0)
    }
}

/// Definitions available for `(include …)` resolution, keyed by tag.
pub type IncludeSet = AHashMap<ImTag, Arc<InputMethod>>;

/// Scans a tree for the tags of its `(include …)` sections.
///
/// The engine resolves these (recursively, against its cache) before calling
/// [`load_input_method`], so the loader itself never re-enters the engine.
#[must_use]
pub fn include_tags(tree: &[Value]) -> Vec<ImTag> {
    let mut tags = Vec::new();
    for section in tree {
        let Some([head, tag, _kind]) = section.as_list() else { continue };
        if head.as_symbol() == Some("include") {
            if let Some(tag) = parse_include_tag(tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

fn parse_include_tag(value: &Value) -> Option<ImTag> {
    let items = value.as_list()?;
    let language = items.first().and_then(Value::as_symbol)?;
    let name = items.get(1).and_then(Value::as_symbol)?;
    let extra = items.get(2).and_then(Value::as_symbol).unwrap_or("");
    Some(ImTag::with_extra(language, name, extra))
}

/// Compiles and validates a description tree.
///
/// `includes` must contain a definition for every tag returned by
/// [`include_tags`]; missing ones fail with [`LoadError::NotFound`].
pub fn load_input_method(
    tree: &[Value],
    tag: ImTag,
    syms: &mut SymbolTable,
    loader: &dyn ModuleLoader,
    includes: &IncludeSet,
) -> Result<InputMethod, LoadError> {
    let mut builder = Builder {
        tag,
        syms,
        loader,
        includes,
        title: None,
        description: None,
        maps: IndexMap::new(),
        macros: IndexMap::new(),
        modules: IndexMap::new(),
        variables: IndexMap::new(),
        commands: IndexMap::new(),
        state_entries: Vec::new(),
    };
    for section in tree {
        builder.section(section)?;
    }
    builder.finish()
}

struct Builder<'a> {
    tag: ImTag,
    syms: &'a mut SymbolTable,
    loader: &'a dyn ModuleLoader,
    includes: &'a IncludeSet,
    title: Option<String>,
    description: Option<String>,
    maps: IndexMap<KeySym, MapDef>,
    macros: IndexMap<KeySym, ActionList>,
    modules: IndexMap<KeySym, ModuleBinding>,
    variables: IndexMap<KeySym, VariableDecl>,
    commands: IndexMap<KeySym, CommandDecl>,
    /// State sections in document order; compiled after everything else.
    state_entries: Vec<StateEntry>,
}

enum StateEntry {
    /// A `(NAME [TITLE] BRANCH…)` spec from this description.
    Raw(Vec<Value>),
    /// A state pulled in whole from an included definition.
    Included(KeySym, Option<String>, KeyTrie),
}

impl Builder<'_> {
    fn section(&mut self, section: &Value) -> Result<(), LoadError> {
        let Some(items) = section.as_list() else {
            return validate_err(format!("top-level value must be a list, got {}", section.kind()));
        };
        let Some(head) = items.first().and_then(Value::as_symbol) else {
            return validate_err("top-level list must start with a section name");
        };
        let body = &items[1..];
        match head {
            // The identity header is the database's concern.
            "input-method" => Ok(()),
            "title" => {
                self.title = Some(section_text("title", body)?);
                Ok(())
            }
            "description" => {
                self.description = Some(section_text("description", body)?);
                Ok(())
            }
            "version" => {
                let required = section_text("version", body)?;
                check_version(&required)
            }
            "variable" => self.variable_section(body),
            "command" => self.command_section(body),
            "module" => self.module_section(body),
            "macro" => self.macro_section(body),
            "map" => self.map_section(body),
            "state" => {
                for spec in body {
                    let Some(spec) = spec.as_list() else {
                        return validate_err("state spec must be a list");
                    };
                    self.state_entries.push(StateEntry::Raw(spec.to_vec()));
                }
                Ok(())
            }
            "include" => self.include_section(body),
            other => validate_err(format!("unknown section '{other}'")),
        }
    }

    fn variable_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        for spec in body {
            let Some([name, rest @ ..]) = spec.as_list() else {
                return validate_err("variable spec must be a list");
            };
            let Some(name) = name.as_symbol() else {
                return validate_err(format!("variable name must be a symbol, got {}", name.kind()));
            };
            let name = self.syms.intern(name);
            let (description, rest) = match rest {
                [Value::Text(text), rest @ ..] => (Some(text.clone()), rest),
                _ => (None, rest),
            };
            let (default, rest) = match rest {
                [] => (None, rest),
                [value, rest @ ..] => (Some(value.clone()), rest),
            };
            let constraints = rest
                .iter()
                .map(parse_constraint)
                .collect::<Result<Vec<_>, _>>()?;
            let decl = VariableDecl {
                name,
                description,
                default,
                constraints,
            };
            if let Some(default) = &decl.default {
                if !decl.constraints.is_empty() && !decl.constraints.iter().any(|c| c.admits(default)) {
                    return validate_err(format!(
                        "variable '{}' default {default} violates its own constraints",
                        self.syms.name(name)
                    ));
                }
            }
            self.variables.entry(name).or_insert(decl);
        }
        Ok(())
    }

    fn command_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        for spec in body {
            let Some([name, rest @ ..]) = spec.as_list() else {
                return validate_err("command spec must be a list");
            };
            let Some(name) = name.as_symbol() else {
                return validate_err(format!("command name must be a symbol, got {}", name.kind()));
            };
            let name = self.syms.intern(name);
            let (description, rest) = match rest {
                [Value::Text(text), rest @ ..] => (Some(text.clone()), rest),
                _ => (None, rest),
            };
            let keyseqs = rest
                .iter()
                .map(|seq| parse_keyseq(seq, self.syms).map_err(LoadError::from))
                .collect::<Result<Vec<_>, _>>()?;
            self.commands.entry(name).or_insert(CommandDecl {
                name,
                description,
                keyseqs,
            });
        }
        Ok(())
    }

    fn module_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        for spec in body {
            let Some([name, functions @ ..]) = spec.as_list() else {
                return validate_err("module spec must be a list");
            };
            let Some(name) = name.as_symbol() else {
                return validate_err(format!("module name must be a symbol, got {}", name.kind()));
            };
            let module = self.loader.load(name).map_err(|err| LoadError::Module(err.0))?;
            let mut resolved = IndexMap::new();
            for function in functions {
                let Some(function) = function.as_symbol() else {
                    return validate_err(format!("module function must be a symbol, got {}", function.kind()));
                };
                let Some(callable) = module.lookup(function) else {
                    return Err(LoadError::Module(format!(
                        "module '{name}' has no function '{function}'"
                    )));
                };
                resolved.insert(self.syms.intern(function), callable);
            }
            self.modules
                .entry(self.syms.intern(name))
                .or_insert(ModuleBinding { module, functions: resolved });
        }
        Ok(())
    }

    fn macro_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        for spec in body {
            let Some([name, actions @ ..]) = spec.as_list() else {
                return validate_err("macro spec must be a list");
            };
            let Some(name) = name.as_symbol() else {
                return validate_err(format!("macro name must be a symbol, got {}", name.kind()));
            };
            let actions = parse_action_list(actions, self.syms)?;
            self.macros.entry(self.syms.intern(name)).or_insert(actions);
        }
        Ok(())
    }

    fn map_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        for spec in body {
            let Some([name, rules @ ..]) = spec.as_list() else {
                return validate_err("map spec must be a list");
            };
            let Some(name) = name.as_symbol() else {
                return validate_err(format!("map name must be a symbol, got {}", name.kind()));
            };
            let name = self.syms.intern(name);
            let map = self.maps.entry(name).or_default();
            for rule in rules {
                let Some([keyseq, actions @ ..]) = rule.as_list() else {
                    return validate_err("map rule must be a list");
                };
                let keys = parse_keyseq(keyseq, self.syms)?;
                if keys.is_empty() {
                    return validate_err("map rule has an empty key sequence");
                }
                let actions = parse_action_list(actions, self.syms)?;
                map.rules.push(MapRule { keys, actions });
            }
        }
        Ok(())
    }

    fn include_section(&mut self, body: &[Value]) -> Result<(), LoadError> {
        let [tag, kind] = body else {
            return validate_err("include takes a tag and a section kind");
        };
        let Some(tag) = parse_include_tag(tag) else {
            return validate_err("include tag must be a list of symbols");
        };
        let Some(kind) = kind.as_symbol() else {
            return validate_err(format!("include kind must be a symbol, got {}", kind.kind()));
        };
        let Some(source) = self.includes.get(&tag) else {
            return Err(LoadError::NotFound);
        };
        match kind {
            "map" => {
                for (name, map) in &source.maps {
                    self.maps.entry(*name).or_insert_with(|| map.clone());
                }
            }
            "macro" => {
                for (name, actions) in &source.macros {
                    self.macros.entry(*name).or_insert_with(|| actions.clone());
                }
            }
            "state" => {
                // Key symbols are engine-global, so tries transfer as-is.
                for state in source.states.values() {
                    self.state_entries.push(StateEntry::Included(
                        state.name,
                        state.title.clone(),
                        state.trie.clone(),
                    ));
                }
            }
            other => return validate_err(format!("cannot include section '{other}'")),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<InputMethod, LoadError> {
        let entries = std::mem::take(&mut self.state_entries);
        if entries.is_empty() {
            return validate_err("definition has no state");
        }
        let mut states: IndexMap<KeySym, ImState> = IndexMap::new();
        for entry in entries {
            let state = match entry {
                StateEntry::Included(name, title, trie) => ImState { name, title, trie },
                StateEntry::Raw(spec) => self.compile_state(&spec)?,
            };
            if !states.contains_key(&state.name) {
                states.insert(state.name, state);
            }
        }
        self.validate_all()?;
        Ok(InputMethod {
            title: self.title.unwrap_or_else(|| self.tag.name.clone()),
            tag: self.tag,
            description: self.description,
            states,
            maps: self.maps,
            macros: self.macros,
            modules: self.modules,
            variables: self.variables,
            commands: self.commands,
        })
    }

    /// Compiles `(NAME [TITLE] (MAP-NAME BRANCH-ACTION…)…)`.
    fn compile_state(&mut self, spec: &[Value]) -> Result<ImState, LoadError> {
        let Some((name, rest)) = spec.split_first() else {
            return validate_err("state spec is empty");
        };
        let Some(name) = name.as_symbol() else {
            return validate_err(format!("state name must be a symbol, got {}", name.kind()));
        };
        let name = self.syms.intern(name);
        let (title, branches) = match rest {
            [Value::Text(text), rest @ ..] => (Some(text.clone()), rest),
            _ => (None, rest),
        };
        let mut trie = KeyTrie::new();
        for branch in branches {
            let Some([map_name, branch_actions @ ..]) = branch.as_list() else {
                return validate_err("state branch must be a list");
            };
            let Some(map_name) = map_name.as_symbol() else {
                return validate_err(format!("state branch must name a map, got {}", map_name.kind()));
            };
            let actions = if branch_actions.is_empty() {
                None
            } else {
                let actions = parse_action_list(branch_actions, self.syms)?;
                self.validate_actions(&actions)
                    .map_err(|m| LoadError::Validate(format!("in state '{}': {m}", self.syms.name(name))))?;
                Some(actions)
            };
            match self.syms.intern(map_name).as_well_known() {
                Some(WellKnown::Nil) => {
                    if let Some(actions) = actions {
                        trie.set_branch_actions(crate::trie::NodeId::ROOT, actions);
                    }
                }
                Some(WellKnown::T) => {
                    if let Some(actions) = actions {
                        trie.set_map_actions(crate::trie::NodeId::ROOT, actions);
                    }
                }
                _ => {
                    let map_sym = self.syms.intern(map_name);
                    let Some(map) = self.maps.get(&map_sym) else {
                        return validate_err(format!("state '{}' references undefined map '{map_name}'", self.syms.name(name)));
                    };
                    let mut ends = Vec::with_capacity(map.rules.len());
                    for rule in &map.rules {
                        let end = trie.insert_seq(&rule.keys);
                        trie.set_map_actions(end, rule.actions.clone());
                        ends.push(end);
                    }
                    if let Some(actions) = actions {
                        for end in ends {
                            if trie.node(end).is_terminal() {
                                trie.set_branch_actions(end, actions.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(ImState { name, title, trie })
    }

    /// Validates every action list: macro references resolve, `call`
    /// targets are loaded, and literal zero divisors are rejected.
    fn validate_all(&self) -> Result<(), LoadError> {
        for (name, actions) in &self.macros {
            self.validate_actions(actions)
                .map_err(|m| LoadError::Validate(format!("in macro '{}': {m}", self.syms.name(*name))))?;
        }
        for (name, map) in &self.maps {
            for rule in &map.rules {
                self.validate_actions(&rule.actions)
                    .map_err(|m| LoadError::Validate(format!("in map '{}': {m}", self.syms.name(*name))))?;
            }
        }
        Ok(())
    }

    fn validate_actions(&self, actions: &ActionList) -> Result<(), String> {
        for action in actions.iter() {
            self.validate_action(action)?;
        }
        Ok(())
    }

    fn validate_action(&self, action: &Action) -> Result<(), String> {
        match action {
            Action::MacroCall(name) => {
                if self.macros.contains_key(name) {
                    Ok(())
                } else {
                    Err(format!("undefined macro '{}'", self.syms.name(*name)))
                }
            }
            Action::Call { module, function, .. } => {
                let Some(binding) = self.modules.get(module) else {
                    return Err(format!("call references unloaded module '{}'", self.syms.name(*module)));
                };
                if binding.functions.contains_key(function) {
                    Ok(())
                } else {
                    Err(format!(
                        "call references unresolved function '{}' of module '{}'",
                        self.syms.name(*function),
                        self.syms.name(*module)
                    ))
                }
            }
            Action::VarOp { op, value, .. } => {
                if matches!(op, crate::expressions::VarOp::Div) && matches!(value, Expr::Int(0)) {
                    Err("division by literal zero".to_owned())
                } else {
                    self.validate_expr(value)
                }
            }
            Action::Delete(expr) | Action::Move(expr) => self.validate_expr(expr),
            Action::Undo(Some(expr)) => self.validate_expr(expr),
            Action::If {
                lhs,
                rhs,
                then_actions,
                else_actions,
                ..
            } => {
                self.validate_expr(lhs)?;
                self.validate_expr(rhs)?;
                self.validate_actions(then_actions)?;
                if let Some(else_actions) = else_actions {
                    self.validate_actions(else_actions)?;
                }
                Ok(())
            }
            Action::Cond(clauses) => {
                for clause in clauses {
                    self.validate_expr(&clause.test)?;
                    self.validate_actions(&clause.actions)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_expr(&self, expr: &Expr) -> Result<(), String> {
        if let Expr::Op { op, args } = expr {
            if matches!(op, crate::expressions::ExprOp::Div)
                && args[1..].iter().any(|arg| matches!(arg, Expr::Int(0)))
            {
                return Err("division by literal zero".to_owned());
            }
            for arg in args {
                self.validate_expr(arg)?;
            }
        }
        Ok(())
    }
}

fn parse_constraint(value: &Value) -> Result<VariableConstraint, LoadError> {
    match value {
        Value::Integer(n) => Ok(VariableConstraint::Integer(*n)),
        Value::Symbol(name) => Ok(VariableConstraint::Symbol(name.clone())),
        Value::Text(text) => Ok(VariableConstraint::Text(text.clone())),
        Value::List(items) => match items.as_slice() {
            [Value::Integer(lo), Value::Integer(hi)] => Ok(VariableConstraint::Range(*lo, *hi)),
            _ => validate_err("variable range must be (FROM TO)"),
        },
        Value::Plist(_) => validate_err("a plist is not a variable constraint"),
    }
}

fn section_text(name: &str, body: &[Value]) -> Result<String, LoadError> {
    match body {
        [Value::Text(text)] => Ok(text.clone()),
        _ => validate_err(format!("{name} takes exactly one text")),
    }
}

/// The engine's own version, from the crate version.
fn engine_version() -> (u64, u64, u64) {
    parse_version(env!("CARGO_PKG_VERSION")).expect("crate version is a semver triple")
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((major, minor, patch))
}

/// Rejects descriptions requiring a newer engine than this one.
fn check_version(required: &str) -> Result<(), LoadError> {
    let Some(required_triple) = parse_version(required) else {
        return validate_err(format!("malformed version '{required}'"));
    };
    if required_triple > engine_version() {
        return Err(LoadError::VersionTooOld {
            required: required.to_owned(),
        });
    }
    Ok(())
}
