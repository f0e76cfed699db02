//! Per-session input context.
//!
//! A `Context` binds a shared [`InputMethod`] definition to one user
//! session: the pending key ring, preedit buffer, markers, variables,
//! produced text, and candidate/status observables all live here. The
//! filter loop in [`crate::driver`] and the action interpreter in
//! [`crate::interp`] mutate it; the host reads the observables and drains
//! the produced text through [`Context::lookup`].

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    callbacks::{ImCallbacks, NoopCallbacks},
    definition::InputMethod,
    driver,
    engine::Engine,
    keysym::{KeySym, SymbolTable, WellKnown},
    preedit::{CandidateList, Charset, Preedit},
    tracer::{ImTracer, NoopTracer},
    trie::NodeId,
    value::Value,
};

/// Which observables changed during the last `filter` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub preedit: bool,
    pub status: bool,
    pub candidates: bool,
}

/// Where the host draws the preedit, from `set_spot`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpotInfo {
    pub x: i32,
    pub y: i32,
    pub ascent: i32,
    pub descent: i32,
    pub fontsize: i32,
    pub text: Option<String>,
    pub pos: usize,
}

/// A per-session input context bound to a loaded input method.
pub struct Context {
    pub(crate) engine: Arc<Engine>,
    pub(crate) im: Arc<InputMethod>,
    /// Index of the current state in declaration order.
    pub(crate) state: usize,
    /// State to return to on `(shift t)`.
    pub(crate) prev_state: Option<usize>,
    /// Current position in the current state's trie.
    pub(crate) node: NodeId,
    /// Pending key ring; `key_head` indexes the next key to consume.
    pub(crate) keys: Vec<KeySym>,
    pub(crate) key_head: usize,
    /// Value of `key_head` when the current state was entered.
    pub(crate) state_key_head: usize,
    pub(crate) preedit: Preedit,
    /// Snapshot of `preedit` at the last state entry, restored on every
    /// trie-node transition.
    pub(crate) preedit_saved: Preedit,
    pub(crate) cursor_pos: usize,
    /// Cursor at the last state entry.
    pub(crate) state_pos: usize,
    pub(crate) markers: AHashMap<KeySym, usize>,
    pub(crate) vars: AHashMap<KeySym, Value>,
    pub(crate) produced: String,
    pub(crate) candidate_list: Option<Arc<CandidateList>>,
    pub(crate) candidate_index: usize,
    pub(crate) candidate_from: usize,
    pub(crate) candidate_to: usize,
    pub(crate) candidate_show: bool,
    pub(crate) status: String,
    /// Per-filter-call surrounding text caches.
    pub(crate) preceding_text: Option<String>,
    pub(crate) following_text: Option<String>,
    pub(crate) active: bool,
    pub(crate) changed: ChangeFlags,
    pub(crate) key_unhandled: bool,
    pub(crate) spot: Option<SpotInfo>,
    pub(crate) callbacks: Box<dyn ImCallbacks>,
    pub(crate) tracer: Box<dyn ImTracer>,
}

impl Context {
    pub(crate) fn new(engine: Arc<Engine>, im: Arc<InputMethod>) -> Self {
        let status = im
            .initial_state()
            .title
            .clone()
            .unwrap_or_else(|| im.title().to_owned());
        let mut ctx = Self {
            engine,
            state: 0,
            prev_state: None,
            node: NodeId::ROOT,
            keys: Vec::new(),
            key_head: 0,
            state_key_head: 0,
            preedit: Preedit::new(),
            preedit_saved: Preedit::new(),
            cursor_pos: 0,
            state_pos: 0,
            markers: AHashMap::new(),
            vars: AHashMap::new(),
            produced: String::new(),
            candidate_list: None,
            candidate_index: 0,
            candidate_from: 0,
            candidate_to: 0,
            candidate_show: false,
            status,
            preceding_text: None,
            following_text: None,
            active: true,
            changed: ChangeFlags::default(),
            key_unhandled: false,
            spot: None,
            callbacks: Box::new(NoopCallbacks),
            tracer: Box::new(NoopTracer),
            im,
        };
        let defaults: Vec<(KeySym, Value)> = ctx
            .im
            .variables()
            .filter_map(|decl| decl.default.clone().map(|value| (decl.name, value)))
            .collect();
        ctx.vars.extend(defaults);
        driver::run_module_lifecycle(&mut ctx, WellKnown::Init);
        // Enter the initial state, running its entry actions if it has any.
        let _ = driver::enter_state(&mut ctx, 0, false, 0);
        ctx.changed = ChangeFlags::default();
        ctx.key_unhandled = false;
        ctx
    }

    /// The definition this context is bound to.
    #[must_use]
    pub fn im(&self) -> &Arc<InputMethod> {
        &self.im
    }

    /// Replaces the host callback sink.
    pub fn set_callbacks(&mut self, callbacks: Box<dyn ImCallbacks>) {
        self.callbacks = callbacks;
    }

    /// Takes the callback sink out, leaving a no-op one.
    ///
    /// Lets a host recover a collector it installed earlier.
    pub fn take_callbacks(&mut self) -> Box<dyn ImCallbacks> {
        std::mem::replace(&mut self.callbacks, Box::new(NoopCallbacks))
    }

    /// Replaces the tracer.
    pub fn set_tracer(&mut self, tracer: Box<dyn ImTracer>) {
        self.tracer = tracer;
    }

    pub fn take_tracer(&mut self) -> Box<dyn ImTracer> {
        std::mem::replace(&mut self.tracer, Box::new(NoopTracer))
    }

    // ------------------------------------------------------------------
    // Driver surface
    // ------------------------------------------------------------------

    /// Feeds one key by name.
    ///
    /// Returns 1 when the key was consumed and nothing is ready for
    /// [`Self::lookup`]; 0 when the host must call `lookup` (text is ready,
    /// or the key was not handled).
    pub fn filter(&mut self, key: &str) -> i32 {
        let sym = self.with_syms(|syms| syms.intern(key));
        self.filter_sym(sym)
    }

    /// Feeds one interned key.
    pub fn filter_sym(&mut self, key: KeySym) -> i32 {
        driver::filter_key(self, key)
    }

    /// Drains produced text into `out`.
    ///
    /// Returns 0 on success; -1 when the last key was unhandled and flushed
    /// no text, signalling the host to re-dispatch the key itself.
    pub fn lookup(&mut self, _key: KeySym, out: &mut String) -> i32 {
        let had_text = !self.produced.is_empty();
        out.push_str(&self.produced);
        self.produced.clear();
        if self.key_unhandled && !had_text { -1 } else { 0 }
    }

    /// Discards all pending state: preedit, keys, markers, candidates, and
    /// produced text. Commits nothing.
    pub fn reset(&mut self) {
        driver::reset_ic(self);
        let mut callbacks = self.take_callbacks();
        callbacks.on_reset();
        self.callbacks = callbacks;
    }

    /// Toggles the context between active and inactive. An inactive context
    /// declines every key.
    pub fn toggle(&mut self) {
        self.active = !self.active;
        let active = self.active;
        let mut callbacks = self.take_callbacks();
        callbacks.on_toggle(active);
        self.callbacks = callbacks;
    }

    /// Records where the host draws the preedit.
    #[expect(clippy::too_many_arguments, reason = "mirrors the driver surface")]
    pub fn set_spot(
        &mut self,
        x: i32,
        y: i32,
        ascent: i32,
        descent: i32,
        fontsize: i32,
        text: Option<String>,
        pos: usize,
    ) {
        let spot = SpotInfo {
            x,
            y,
            ascent,
            descent,
            fontsize,
            text,
            pos,
        };
        let mut callbacks = self.take_callbacks();
        callbacks.on_set_spot(&spot);
        self.callbacks = callbacks;
        self.spot = Some(spot);
    }

    #[must_use]
    pub fn spot(&self) -> Option<&SpotInfo> {
        self.spot.as_ref()
    }

    // ------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------

    #[must_use]
    pub fn preedit_text(&self) -> String {
        self.preedit.text()
    }

    #[must_use]
    pub fn cursor_pos(&self) -> usize {
        self.cursor_pos
    }

    /// Committed text not yet drained by [`Self::lookup`].
    #[must_use]
    pub fn produced(&self) -> &str {
        &self.produced
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub fn candidate_list(&self) -> Option<&Arc<CandidateList>> {
        self.candidate_list.as_ref()
    }

    #[must_use]
    pub fn candidate_index(&self) -> usize {
        self.candidate_index
    }

    /// Preedit span `[from, to)` the candidate list is attached to.
    #[must_use]
    pub fn candidate_span(&self) -> (usize, usize) {
        (self.candidate_from, self.candidate_to)
    }

    #[must_use]
    pub fn candidate_show(&self) -> bool {
        self.candidate_show
    }

    #[must_use]
    pub fn changed(&self) -> ChangeFlags {
        self.changed
    }

    #[must_use]
    pub fn key_unhandled(&self) -> bool {
        self.key_unhandled
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Reads a per-context variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Value> {
        let sym = self.with_syms(|syms| syms.intern(name));
        self.vars.get(&sym).cloned()
    }

    /// Sets a per-context variable, checking it against the definition's
    /// schema. Undeclared names are rejected unless they are one of the
    /// reserved configuration variables.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), String> {
        let sym = self.with_syms(|syms| syms.intern(name));
        if let Some(decl) = self.im.variable(sym) {
            if !decl.admits(&value) {
                return Err(format!("value {value} is not admissible for variable '{name}'"));
            }
        } else {
            let reserved = matches!(
                sym.as_well_known(),
                Some(WellKnown::CandidatesGroupSize | WellKnown::CandidatesCharset)
            );
            if !reserved {
                return Err(format!("input method declares no variable '{name}'"));
            }
        }
        self.vars.insert(sym, value);
        Ok(())
    }

    /// Integer value of a variable, defaulting to 0 (the interpreter's
    /// view: non-integer values read as 0).
    #[must_use]
    pub(crate) fn var_int(&self, sym: KeySym) -> i64 {
        match self.vars.get(&sym) {
            Some(Value::Integer(n)) => *n,
            _ => 0,
        }
    }

    /// The configured candidate group size (reserved variable), default 10.
    #[must_use]
    pub(crate) fn group_size(&self) -> usize {
        match self.vars.get(&KeySym::well_known(WellKnown::CandidatesGroupSize)) {
            Some(Value::Integer(n)) if *n > 0 => usize::try_from(*n).unwrap_or(usize::MAX),
            _ => 10,
        }
    }

    /// The configured candidate charset restriction, if any.
    #[must_use]
    pub(crate) fn charset(&self) -> Option<Charset> {
        match self.vars.get(&KeySym::well_known(WellKnown::CandidatesCharset)) {
            Some(Value::Symbol(name)) => {
                let sym = self.with_syms(|syms| syms.intern(name));
                sym.as_well_known().and_then(Charset::from_well_known)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Internals shared by driver and interpreter
    // ------------------------------------------------------------------

    /// Runs a closure with the engine's symbol table locked. Keep the
    /// closure small; nothing that can call back into the context may run
    /// under the lock.
    pub(crate) fn with_syms<R>(&self, f: impl FnOnce(&mut SymbolTable) -> R) -> R {
        let mut syms = self.engine.symbols().lock().expect("symbol table poisoned");
        f(&mut syms)
    }

    pub(crate) fn trace(&mut self, f: impl FnOnce(&mut dyn ImTracer)) {
        f(self.tracer.as_mut());
    }

    pub(crate) fn soft_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.tracer.on_soft_error(&message);
    }

    /// Inserts text at the cursor, advancing it and shifting markers past
    /// the insertion point.
    pub(crate) fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let n = text.chars().count();
        self.preedit.insert(self.cursor_pos, text);
        for pos in self.markers.values_mut() {
            if *pos > self.cursor_pos {
                *pos += n;
            }
        }
        self.cursor_pos += n;
        self.changed.preedit = true;
    }

    /// Deletes `[from, to)` from the preedit, clamping markers that pointed
    /// into the deleted span to its start and shifting later markers.
    pub(crate) fn delete_range(&mut self, from: usize, to: usize) {
        let (from, to) = (from.min(self.preedit.len()), to.min(self.preedit.len()));
        if from >= to {
            return;
        }
        let n = to - from;
        self.preedit.delete(from, to);
        for pos in self.markers.values_mut() {
            if *pos > from {
                *pos = if *pos >= to { *pos - n } else { from };
            }
        }
        self.cursor_pos = if self.cursor_pos >= to {
            self.cursor_pos - n
        } else {
            self.cursor_pos.min(from)
        };
        self.changed.preedit = true;
    }

    /// Appends the preedit to the produced text and clears all per-sequence
    /// state: preedit, snapshots, markers, candidate attachments, and the
    /// consumed front of the key ring.
    pub(crate) fn commit(&mut self) {
        if !self.preedit.is_empty() {
            let text = self.preedit.text();
            self.tracer.on_commit(&text);
            self.produced.push_str(&text);
        }
        self.preedit.clear();
        self.preedit_saved.clear();
        self.cursor_pos = 0;
        self.state_pos = 0;
        self.markers.clear();
        self.changed.preedit = true;
        // Rebase the ring on the consumed head.
        self.keys.drain(..self.key_head.min(self.keys.len()));
        self.key_head = 0;
        self.state_key_head = 0;
    }

    /// Recomputes the candidate observables from the preedit property at
    /// `cursor_pos - 1`, setting the change flag when anything moved.
    pub(crate) fn sync_candidates(&mut self) {
        let span = self
            .cursor_pos
            .checked_sub(1)
            .and_then(|pos| self.preedit.span_at(pos));
        match span {
            Some(span) => {
                let same = self
                    .candidate_list
                    .as_ref()
                    .is_some_and(|list| Arc::ptr_eq(list, &span.list))
                    && self.candidate_index == span.index
                    && (self.candidate_from, self.candidate_to) == (span.from, span.to);
                if !same {
                    self.candidate_list = Some(span.list.clone());
                    self.candidate_index = span.index;
                    self.candidate_from = span.from;
                    self.candidate_to = span.to;
                    self.changed.candidates = true;
                }
            }
            None => {
                if self.candidate_list.take().is_some() {
                    self.candidate_index = 0;
                    self.candidate_from = 0;
                    self.candidate_to = 0;
                    self.candidate_show = false;
                    self.changed.candidates = true;
                }
            }
        }
    }

    /// Character code `offset` characters away from the host cursor
    /// (negative is before), through the surrounding-text cache. -1 when
    /// unavailable.
    pub(crate) fn surrounding_char(&mut self, offset: i64) -> i64 {
        if offset == 0 {
            return -1;
        }
        let before = offset < 0;
        let distance = usize::try_from(offset.unsigned_abs()).unwrap_or(usize::MAX);
        let cache = if before { &self.preceding_text } else { &self.following_text };
        if cache.as_ref().is_none_or(|text| text.chars().count() < distance) {
            let fetched = {
                let mut callbacks = std::mem::replace(&mut self.callbacks, Box::new(NoopCallbacks));
                let fetched = callbacks.get_surrounding_text(before, distance);
                self.callbacks = callbacks;
                fetched
            };
            let slot = if before { &mut self.preceding_text } else { &mut self.following_text };
            match fetched {
                Some(text) => *slot = Some(text),
                None => return -1,
            }
        }
        let cache = if before { &self.preceding_text } else { &self.following_text };
        let text = cache.as_ref().expect("surrounding cache just filled");
        let chars: Vec<char> = text.chars().collect();
        let c = if before {
            chars.len().checked_sub(distance).map(|i| chars[i])
        } else {
            chars.get(distance - 1).copied()
        };
        c.map_or(-1, |c| i64::from(u32::from(c)))
    }

    /// Deletes host text around the cursor and drops the caches.
    pub(crate) fn delete_surrounding(&mut self, before: bool, count: usize) -> bool {
        let ok = {
            let mut callbacks = std::mem::replace(&mut self.callbacks, Box::new(NoopCallbacks));
            let ok = callbacks.delete_surrounding_text(before, count);
            self.callbacks = callbacks;
            ok
        };
        self.preceding_text = None;
        self.following_text = None;
        ok
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        driver::run_module_lifecycle(self, WellKnown::Fini);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("im", &self.im.tag().to_string())
            .field("state", &self.state)
            .field("preedit", &self.preedit.text())
            .field("cursor_pos", &self.cursor_pos)
            .field("produced", &self.produced)
            .field("pending_keys", &(self.keys.len() - self.key_head.min(self.keys.len())))
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
