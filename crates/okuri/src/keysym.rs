//! Key symbol interning for key events, map keys, and description symbols.
//!
//! The engine identifies every key event, state name, variable, and marker by
//! a compact [`KeySym`] index into a [`SymbolTable`]. Interning happens while
//! loading descriptions and (rarely) while filtering keys; lookups during
//! filtering are plain vector indexing.
//!
//! KeySym ids are laid out as follows:
//! * 0 to 255 - the canonical one-character key symbols (`C-@`..`C-_`,
//!   printable ASCII, `Delete`, `M-@`..`M-_`, `M-<char>`)
//! * 256 to 256+count(WellKnown) - symbols the engine itself refers to
//! * 512+ - symbols interned per engine

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the symbol table's storage.
///
/// Uses `u32` to save space. All comparisons, hashing, and map keys operate
/// on the index; the name string is needed only for diagnostics and for the
/// single-character test during literal key insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct KeySym(u32);

/// First id available for per-engine interned symbols.
const DYNAMIC_OFFSET: u32 = 512;
/// Base id of the [`WellKnown`] range.
const WELL_KNOWN_OFFSET: u32 = 256;

impl KeySym {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the canonical one-character key symbol for a byte code.
    ///
    /// Codes 0..=255 are pre-interned at table construction; this is a pure
    /// index computation and never touches the table.
    #[must_use]
    pub fn one_char(byte: u8) -> Self {
        Self(u32::from(byte))
    }

    /// Returns the symbol for an engine well-known name.
    #[inline]
    #[must_use]
    pub fn well_known(w: WellKnown) -> Self {
        Self(WELL_KNOWN_OFFSET + w as u32)
    }

    /// Returns `Some` if this symbol is in the well-known range.
    #[must_use]
    pub fn as_well_known(self) -> Option<WellKnown> {
        if (WELL_KNOWN_OFFSET..DYNAMIC_OFFSET).contains(&self.0) {
            WellKnown::from_repr((self.0 - WELL_KNOWN_OFFSET) as u16)
        } else {
            None
        }
    }
}

/// Symbols the engine refers to by name.
///
/// Uses strum derives so the variant list is the single source of truth for
/// both the pre-interned table entries and name lookups. `kebab-case` yields
/// the on-disk spelling (`KeyAlias` -> "key-alias").
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum WellKnown {
    Nil,
    T,
    KeyAlias,
    InputMethod,
    Description,
    Title,
    Version,
    Variable,
    Command,
    Module,
    Macro,
    Map,
    State,
    Include,
    Init,
    Fini,
    CandidatesGroupSize,
    CandidatesCharset,
    Ascii,
    #[strum(serialize = "latin-1")]
    Latin1,
}

/// Property value attached to a symbol.
///
/// Only symbol-valued properties exist today (`key-alias`); the enum keeps
/// the `put_prop`/`get_prop` surface open for integer-valued ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymProp {
    Symbol(KeySym),
    Integer(i64),
}

/// Interner for key symbols with per-symbol properties.
///
/// Owned by the `Engine` behind a mutex; append-only (symbols live as long as
/// the engine). Construction pre-interns the 256 canonical one-character
/// symbols, their aliases, the shifted-letter aliases `S-A`..`S-Z`, and the
/// engine's well-known names.
#[derive(Debug)]
pub struct SymbolTable {
    names: Vec<String>,
    ids: AHashMap<String, KeySym>,
    props: AHashMap<(KeySym, KeySym), SymProp>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::with_capacity(DYNAMIC_OFFSET as usize),
            ids: AHashMap::with_capacity(DYNAMIC_OFFSET as usize + 64),
            props: AHashMap::new(),
        };
        table.prefill();
        table
    }

    /// Installs the fixed id ranges: one-char symbols 0..=255 and the
    /// well-known names at 256+.
    fn prefill(&mut self) {
        for code in 0u32..=255 {
            let name = one_char_name(code as u8);
            self.names.push(name.clone());
            self.ids.insert(name, KeySym(code));
        }
        for idx in 0.. {
            let Some(w) = WellKnown::from_repr(idx) else { break };
            let name: &'static str = w.into();
            self.names.push(name.to_owned());
            self.ids.insert(name.to_owned(), KeySym(WELL_KNOWN_OFFSET + u32::from(idx)));
        }
        // Pad up to the dynamic range so ids stay equal to vector positions.
        while self.names.len() < DYNAMIC_OFFSET as usize {
            self.names.push(String::new());
        }
        self.install_aliases();
    }

    /// Pre-interns the alias symbols and links them with `key-alias`.
    ///
    /// * `C-A`..`C-Z` (codes 1..=26) alias their case-flipped spellings.
    /// * Meta codes with well-known names (`M-BackSpace`, `M-Tab`, ...) alias
    ///   the corresponding `M-@`.. form.
    /// * `S-A`..`S-Z` alias the plain uppercase letter.
    fn install_aliases(&mut self) {
        for code in 1u8..=26 {
            let flipped = format!("C-{}", (b'a' + code - 1) as char);
            let alias = self.intern(&flipped);
            self.link_alias(KeySym::one_char(code), alias);
        }
        const META_NAMES: &[(u8, &str)] = &[
            (136, "M-BackSpace"),
            (137, "M-Tab"),
            (138, "M-Linefeed"),
            (139, "M-Clear"),
            (141, "M-Return"),
            (155, "M-Escape"),
        ];
        for &(code, name) in META_NAMES {
            let alias = self.intern(name);
            self.link_alias(KeySym::one_char(code), alias);
        }
        for letter in b'A'..=b'Z' {
            let shifted = self.intern(&format!("S-{}", letter as char));
            // One direction only: an incoming S-A must match maps keyed "A".
            self.props
                .insert((shifted, KeySym::well_known(WellKnown::KeyAlias)), SymProp::Symbol(KeySym::one_char(letter)));
        }
    }

    fn link_alias(&mut self, canonical: KeySym, alias: KeySym) {
        let key = KeySym::well_known(WellKnown::KeyAlias);
        self.props.insert((canonical, key), SymProp::Symbol(alias));
        self.props.insert((alias, key), SymProp::Symbol(canonical));
    }

    /// Maps a name to its interned symbol, creating it on first use.
    pub fn intern(&mut self, name: &str) -> KeySym {
        if let Some(&sym) = self.ids.get(name) {
            return sym;
        }
        let sym = KeySym(u32::try_from(self.names.len()).expect("symbol table overflow"));
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), sym);
        sym
    }

    /// Returns the symbol's name.
    ///
    /// # Panics
    /// Panics if `sym` was not produced by this table.
    #[must_use]
    pub fn name(&self, sym: KeySym) -> &str {
        &self.names[sym.index()]
    }

    /// If the symbol's name is a single character, returns it.
    ///
    /// The filter loop uses this to decide whether a pending key can be
    /// self-inserted as literal text.
    #[must_use]
    pub fn as_char(&self, sym: KeySym) -> Option<char> {
        let mut chars = self.name(sym).chars();
        let c = chars.next()?;
        chars.next().is_none().then_some(c)
    }

    /// Attaches a property to a symbol, replacing any previous value.
    pub fn put_prop(&mut self, sym: KeySym, key: KeySym, value: SymProp) {
        self.props.insert((sym, key), value);
    }

    /// Reads a property of a symbol.
    #[must_use]
    pub fn get_prop(&self, sym: KeySym, key: KeySym) -> Option<SymProp> {
        self.props.get(&(sym, key)).copied()
    }

    /// Returns the `key-alias` of a symbol, if any.
    #[must_use]
    pub fn alias(&self, sym: KeySym) -> Option<KeySym> {
        match self.get_prop(sym, KeySym::well_known(WellKnown::KeyAlias)) {
            Some(SymProp::Symbol(alias)) => Some(alias),
            _ => None,
        }
    }

    /// Synthesizes the opposite-modifier alias for a `M-`/`A-` prefixed key.
    ///
    /// Called once per incoming key at filter time: if the key name carries a
    /// meta modifier and no alias is recorded yet, the `A-x` <-> `M-x`
    /// counterpart is interned and linked both ways. Keys without a meta
    /// modifier are left untouched.
    pub fn ensure_meta_alias(&mut self, sym: KeySym) {
        if self.alias(sym).is_some() {
            return;
        }
        let name = self.name(sym);
        let Some(swapped) = swap_meta_modifier(name) else { return };
        let alias = self.intern(&swapped);
        self.link_alias(sym, alias);
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Swaps the first `M-` <-> `A-` modifier token in a key name.
///
/// Modifier tokens are single letters separated by `-` before the final key
/// name, e.g. `S-M-a`. Returns `None` when the name carries neither token.
fn swap_meta_modifier(name: &str) -> Option<String> {
    let mut offset = 0;
    let bytes = name.as_bytes();
    while offset + 1 < bytes.len() && bytes[offset + 1] == b'-' {
        match bytes[offset] {
            b'M' => return Some(format!("{}A{}", &name[..offset], &name[offset + 1..])),
            b'A' => return Some(format!("{}M{}", &name[..offset], &name[offset + 1..])),
            _ => offset += 2,
        }
    }
    None
}

/// The canonical name for a one-character key code.
fn one_char_name(code: u8) -> String {
    match code {
        0..=31 => format!("C-{}", (code + 64) as char),
        32..=126 => ((code as char).to_string()),
        127 => "Delete".to_owned(),
        128..=159 => format!("M-{}", (code - 128 + 64) as char),
        255 => "M-Delete".to_owned(),
        _ => format!("M-{}", (code - 128) as char),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_char_layout() {
        let table = SymbolTable::new();
        assert_eq!(table.name(KeySym::one_char(1)), "C-A");
        assert_eq!(table.name(KeySym::one_char(b'a')), "a");
        assert_eq!(table.name(KeySym::one_char(127)), "Delete");
        assert_eq!(table.name(KeySym::one_char(141)), "M-M");
        assert_eq!(table.name(KeySym::one_char(225)), "M-a");
    }

    #[test]
    fn intern_reuses_ids() {
        let mut table = SymbolTable::new();
        let a = table.intern("Return");
        let b = table.intern("Return");
        assert_eq!(a, b);
        let c = table.intern("Escape");
        assert_ne!(a, c);
        // single printable chars resolve to the canonical range
        assert_eq!(table.intern("a"), KeySym::one_char(b'a'));
    }

    #[test]
    fn well_known_names() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern("key-alias"), KeySym::well_known(WellKnown::KeyAlias));
        assert_eq!(table.intern("nil"), KeySym::well_known(WellKnown::Nil));
        assert_eq!(table.intern("candidates-group-size"), KeySym::well_known(WellKnown::CandidatesGroupSize));
        assert_eq!(table.intern("latin-1"), KeySym::well_known(WellKnown::Latin1));
    }

    #[test]
    fn control_aliases_flip_case() {
        let mut table = SymbolTable::new();
        let lower = table.intern("C-a");
        assert_eq!(table.alias(lower), Some(KeySym::one_char(1)));
        assert_eq!(table.alias(KeySym::one_char(1)), Some(lower));
    }

    #[test]
    fn shifted_letters_alias_uppercase() {
        let mut table = SymbolTable::new();
        let shifted = table.intern("S-Q");
        assert_eq!(table.alias(shifted), Some(KeySym::one_char(b'Q')));
        // the plain letter does not alias back
        assert_eq!(table.alias(KeySym::one_char(b'Q')), None);
    }

    #[test]
    fn meta_alias_synthesized_on_demand() {
        let mut table = SymbolTable::new();
        let alt = table.intern("A-x");
        assert_eq!(table.alias(alt), None);
        table.ensure_meta_alias(alt);
        let meta = table.intern("M-x");
        assert_eq!(table.alias(alt), Some(meta));
        assert_eq!(table.alias(meta), Some(alt));
        // stacked modifiers keep their order
        let stacked = table.intern("S-A-F1");
        table.ensure_meta_alias(stacked);
        assert_eq!(table.alias(stacked), Some(table.intern("S-M-F1")));
    }

    #[test]
    fn plain_keys_get_no_alias() {
        let mut table = SymbolTable::new();
        let f1 = table.intern("F1");
        table.ensure_meta_alias(f1);
        assert_eq!(table.alias(f1), None);
    }
}
