//! Engine execution tracing.
//!
//! A trait-based hook system for observing the filter loop: key intake,
//! action execution, state shifts, commits, and the soft runtime errors that
//! the engine swallows (division by zero, missing shift targets, failing
//! module calls). All methods default to no-ops; [`NoopTracer`] is the
//! production default and [`StderrTracer`] gives a human-readable log.

/// Hooks into the filter loop and action interpreter.
pub trait ImTracer {
    /// A key entered the filter loop.
    fn on_key(&mut self, _key: &str) {}

    /// An action list is about to run (`kind` is "map", "branch", "macro",
    /// "call", or "init"/"fini").
    fn on_actions(&mut self, _kind: &str, _len: usize) {}

    /// The context shifted to (or re-entered) a state.
    fn on_shift(&mut self, _state: &str) {}

    /// Preedit text was committed.
    fn on_commit(&mut self, _text: &str) {}

    /// A recoverable runtime fault was absorbed (reported, never raised).
    fn on_soft_error(&mut self, _message: &str) {}
}

/// Tracer that does nothing.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl ImTracer for NoopTracer {}

/// Tracer that logs every hook to stderr, prefixed with `okuri:`.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl ImTracer for StderrTracer {
    fn on_key(&mut self, key: &str) {
        eprintln!("okuri: key {key}");
    }

    fn on_actions(&mut self, kind: &str, len: usize) {
        eprintln!("okuri: run {len} {kind} action(s)");
    }

    fn on_shift(&mut self, state: &str) {
        eprintln!("okuri: shift -> {state}");
    }

    fn on_commit(&mut self, text: &str) {
        eprintln!("okuri: commit {text:?}");
    }

    fn on_soft_error(&mut self, message: &str) {
        eprintln!("okuri: soft error: {message}");
    }
}

/// Tracer that collects soft errors, for tests.
#[derive(Debug, Default)]
pub struct CollectTracer {
    pub keys: Vec<String>,
    pub soft_errors: Vec<String>,
}

impl ImTracer for CollectTracer {
    fn on_key(&mut self, key: &str) {
        self.keys.push(key.to_owned());
    }

    fn on_soft_error(&mut self, message: &str) {
        self.soft_errors.push(message.to_owned());
    }
}
