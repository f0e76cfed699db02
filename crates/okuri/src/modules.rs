//! External modules: host functions callable from the `call` action.
//!
//! A description's `(module (NAME FUNC…))` section binds named functions
//! that run on the host side. The engine resolves every listed function at
//! load time through a [`ModuleLoader`]; resolution failure fails the whole
//! load. [`RegistryLoader`] is the in-process implementation: the host
//! registers [`Module`]s before opening input methods. The trait is the seam
//! for other backings (such as shared libraries).

use std::{fmt, sync::Arc, sync::Mutex};

use ahash::AHashMap;

use crate::{context::Context, value::Value};

/// A host function bound into an input method.
///
/// Receives the calling context and the `call` action's arguments (markers
/// already resolved to integers). The returned value, if any, is interpreted
/// as a nested action list. A returned `Err` is absorbed as a soft runtime
/// error.
pub type ModuleFn = Arc<dyn Fn(&mut Context, &[Value]) -> Result<Option<Value>, String> + Send + Sync>;

/// Error from module loading or function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError(pub String);

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ModuleError {}

/// A named collection of host functions.
pub struct Module {
    name: String,
    functions: AHashMap<String, ModuleFn>,
}

impl Module {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            functions: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a function under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&mut Context, &[Value]) -> Result<Option<Value>, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_owned(), Arc::new(function));
    }

    /// Resolves a function by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ModuleFn> {
        self.functions.get(name).cloned()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Module").field("name", &self.name).field("functions", &names).finish()
    }
}

/// Resolves module names for the loader.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<Module>, ModuleError>;
}

/// A loader with no modules; any `(module …)` section fails the load.
#[derive(Debug, Default)]
pub struct NoModules;

impl ModuleLoader for NoModules {
    fn load(&self, name: &str) -> Result<Arc<Module>, ModuleError> {
        Err(ModuleError(format!("no module loader installed (wanted '{name}')")))
    }
}

/// In-process module registry.
#[derive(Debug, Default)]
pub struct RegistryLoader {
    modules: Mutex<AHashMap<String, Arc<Module>>>,
}

impl RegistryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module, replacing any module of the same name.
    pub fn register(&self, module: Module) {
        let mut modules = self.modules.lock().expect("module registry poisoned");
        modules.insert(module.name().to_owned(), Arc::new(module));
    }
}

impl ModuleLoader for RegistryLoader {
    fn load(&self, name: &str) -> Result<Arc<Module>, ModuleError> {
        let modules = self.modules.lock().expect("module registry poisoned");
        modules
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError(format!("module '{name}' is not registered")))
    }
}
