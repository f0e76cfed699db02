//! The engine: symbol table, definition cache, and the open/create surface.
//!
//! An [`Engine`] is created once per process (or embedding) and owns the
//! pieces every input method shares: the key symbol table, the cache of
//! loaded definitions keyed by `(language, name, extra)`, the definition
//! database, and the module loader. Loaded [`InputMethod`]s are immutable
//! and handed out as `Arc`s; contexts keep a handle to the engine for
//! symbol interning at filter time.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;

use crate::{
    context::Context,
    database::{Database, ImTag},
    definition::InputMethod,
    keysym::{KeySym, SymProp, SymbolTable},
    load::{self, IncludeSet, LoadError},
    modules::{ModuleLoader, NoModules},
    value::Value,
};

/// Cap on transitive `(include …)` chains.
const MAX_INCLUDE_DEPTH: usize = 8;

/// Shared engine state: symbols, cache, database, and module loader.
pub struct Engine {
    symbols: Mutex<SymbolTable>,
    cache: Mutex<AHashMap<ImTag, Arc<InputMethod>>>,
    database: Box<dyn Database>,
    loader: Box<dyn ModuleLoader>,
}

impl Engine {
    /// Creates an engine over a database, with no external modules.
    #[must_use]
    pub fn new(database: impl Database + 'static) -> Arc<Self> {
        Self::with_modules(database, NoModules)
    }

    /// Creates an engine with a module loader for `(module …)` sections.
    #[must_use]
    pub fn with_modules(database: impl Database + 'static, loader: impl ModuleLoader + 'static) -> Arc<Self> {
        Arc::new(Self {
            symbols: Mutex::new(SymbolTable::new()),
            cache: Mutex::new(AHashMap::new()),
            database: Box::new(database),
            loader: Box::new(loader),
        })
    }

    pub(crate) fn symbols(&self) -> &Mutex<SymbolTable> {
        &self.symbols
    }

    /// Interns a name in the engine's symbol table.
    #[must_use]
    pub fn intern(&self, name: &str) -> KeySym {
        self.symbols.lock().expect("symbol table poisoned").intern(name)
    }

    /// The name of a symbol interned by this engine.
    #[must_use]
    pub fn symbol_name(&self, sym: KeySym) -> String {
        self.symbols.lock().expect("symbol table poisoned").name(sym).to_owned()
    }

    /// Attaches a property to a symbol (for example an extra `key-alias`
    /// installed at startup).
    pub fn put_symbol_prop(&self, sym: KeySym, key: KeySym, value: SymProp) {
        self.symbols.lock().expect("symbol table poisoned").put_prop(sym, key, value);
    }

    /// Reads a property of a symbol.
    #[must_use]
    pub fn symbol_prop(&self, sym: KeySym, key: KeySym) -> Option<SymProp> {
        self.symbols.lock().expect("symbol table poisoned").get_prop(sym, key)
    }

    /// Opens (loading and caching as needed) the input method
    /// `(language, name)`.
    pub fn open_im(&self, language: &str, name: &str) -> Result<Arc<InputMethod>, LoadError> {
        self.open_tagged(&ImTag::new(language, name))
    }

    /// Opens an input method by full tag.
    pub fn open_tagged(&self, tag: &ImTag) -> Result<Arc<InputMethod>, LoadError> {
        self.load_tagged(tag, 0)
    }

    fn load_tagged(&self, tag: &ImTag, depth: usize) -> Result<Arc<InputMethod>, LoadError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(LoadError::Validate(format!(
                "include chain deeper than {MAX_INCLUDE_DEPTH} at {tag}"
            )));
        }
        if let Some(im) = self.cache.lock().expect("cache poisoned").get(tag) {
            return Ok(im.clone());
        }
        let handle = self.database.find(tag).ok_or(LoadError::NotFound)?;
        let tree = self.database.load(&handle)?;
        // Resolve includes before taking the symbol lock; the loader never
        // re-enters the engine.
        let mut includes = IncludeSet::new();
        for include in load::include_tags(&tree) {
            let loaded = self.load_tagged(&include, depth + 1)?;
            includes.insert(include, loaded);
        }
        let im = {
            let mut syms = self.symbols.lock().expect("symbol table poisoned");
            load::load_input_method(&tree, tag.clone(), &mut syms, self.loader.as_ref(), &includes)?
        };
        let im = Arc::new(im);
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(tag.clone(), im.clone());
        Ok(im)
    }

    /// Evicts a definition from the cache. Contexts already bound to it
    /// keep their shared handle.
    pub fn close_im(&self, im: &Arc<InputMethod>) {
        self.cache.lock().expect("cache poisoned").remove(im.tag());
    }

    /// Creates an input context bound to a loaded definition, running the
    /// modules' `init` functions.
    pub fn create_ic(self: &Arc<Self>, im: &Arc<InputMethod>) -> Result<Context, LoadError> {
        Ok(Context::new(self.clone(), im.clone()))
    }

    /// Partially loads one section kind of a definition without compiling
    /// it (`title`, `description`, `variable`, or `command`).
    pub fn im_section(&self, tag: &ImTag, section: &str) -> Result<Vec<Value>, LoadError> {
        let handle = self.database.find(tag).ok_or(LoadError::NotFound)?;
        Ok(self.database.load_for_keys(&handle, &[section])?)
    }

    /// The description text of a definition, without loading it.
    pub fn describe_im(&self, language: &str, name: &str) -> Result<Option<String>, LoadError> {
        let sections = self.im_section(&ImTag::new(language, name), "description")?;
        Ok(sections.first().and_then(|section| {
            section
                .as_list()
                .and_then(|items| items.get(1))
                .and_then(Value::as_text)
                .map(str::to_owned)
        }))
    }

    /// The declared variables of a definition, without loading it:
    /// `(name, description)` pairs from a partial load of the `variable`
    /// section.
    pub fn im_variables(&self, language: &str, name: &str) -> Result<Vec<(String, Option<String>)>, LoadError> {
        let sections = self.im_section(&ImTag::new(language, name), "variable")?;
        Ok(schema_entries(&sections))
    }

    /// The declared commands of a definition, without loading it:
    /// `(name, description)` pairs from a partial load of the `command`
    /// section.
    pub fn im_commands(&self, language: &str, name: &str) -> Result<Vec<(String, Option<String>)>, LoadError> {
        let sections = self.im_section(&ImTag::new(language, name), "command")?;
        Ok(schema_entries(&sections))
    }

    /// The process-global variable or command schema, stored in the
    /// database under the tag `(t, nil, <kind>)`.
    pub fn global_schema(&self, kind: &str) -> Result<Vec<Value>, LoadError> {
        self.im_section(&ImTag::with_extra("t", "nil", kind), kind)
    }

    /// Resolves an auxiliary file (icons and the like) through the
    /// database.
    #[must_use]
    pub fn find_file(&self, name: &str) -> Option<std::path::PathBuf> {
        self.database.find_file(name)
    }
}

/// Extracts `(name, description)` pairs from partially loaded `variable`
/// or `command` sections. Malformed specs are skipped rather than failed:
/// the full validation happens when the definition is actually loaded.
fn schema_entries(sections: &[Value]) -> Vec<(String, Option<String>)> {
    let mut entries = Vec::new();
    for section in sections {
        let Some(items) = section.as_list() else { continue };
        for spec in items.iter().skip(1) {
            let Some([name, rest @ ..]) = spec.as_list() else { continue };
            let Some(name) = name.as_symbol() else { continue };
            let description = match rest {
                [Value::Text(text), ..] => Some(text.clone()),
                _ => None,
            };
            entries.push((name.to_owned(), description));
        }
    }
    entries
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached: Vec<String> = self
            .cache
            .lock()
            .expect("cache poisoned")
            .keys()
            .map(ToString::to_string)
            .collect();
        f.debug_struct("Engine").field("cached", &cached).finish_non_exhaustive()
    }
}
