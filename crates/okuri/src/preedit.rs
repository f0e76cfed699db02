//! Preedit text with candidate-list properties.
//!
//! The preedit is the per-context editable buffer. Character positions are
//! whole-character indices (not bytes). Candidate lists are attached to
//! spans of the buffer; edits shift or drop spans so that every span always
//! covers live text. The buffer has value semantics: the driver snapshots it
//! on every state entry and rolls back by cloning the snapshot.

use std::sync::Arc;

use crate::keysym::WellKnown;

/// A group-structured list of candidate texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    groups: Vec<Vec<String>>,
    total: usize,
}

impl CandidateList {
    /// Builds a list from display groups. Empty groups are dropped.
    #[must_use]
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        let groups: Vec<Vec<String>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        let total = groups.iter().map(Vec::len).sum();
        Self { groups, total }
    }

    #[must_use]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Total number of candidates over all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns the candidate text at a flat index.
    #[must_use]
    pub fn candidate(&self, index: usize) -> Option<&str> {
        let mut rest = index;
        for group in &self.groups {
            if rest < group.len() {
                return Some(&group[rest]);
            }
            rest -= group.len();
        }
        None
    }

    /// Returns `(group number, offset within group)` for a flat index.
    #[must_use]
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut rest = index;
        for (g, group) in self.groups.iter().enumerate() {
            if rest < group.len() {
                return Some((g, rest));
            }
            rest -= group.len();
        }
        None
    }

    /// Flat index of the first candidate of a group.
    #[must_use]
    pub fn group_start(&self, group: usize) -> usize {
        self.groups[..group].iter().map(Vec::len).sum()
    }

    /// Flat index of the last candidate of a group.
    #[must_use]
    pub fn group_last(&self, group: usize) -> usize {
        self.group_start(group) + self.groups[group].len() - 1
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// A candidate charset restriction named by `candidates-charset`.
///
/// The full character table subsystem lives outside the engine; these two
/// predicates cover the charsets descriptions actually restrict to. Unknown
/// charset names accept everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Latin1,
}

impl Charset {
    #[must_use]
    pub fn from_well_known(w: WellKnown) -> Option<Self> {
        match w {
            WellKnown::Ascii => Some(Self::Ascii),
            WellKnown::Latin1 => Some(Self::Latin1),
            _ => None,
        }
    }

    /// Returns `true` if every character of `text` is inside the charset.
    #[must_use]
    pub fn contains(self, text: &str) -> bool {
        let bound = match self {
            Self::Ascii => 0x80,
            Self::Latin1 => 0x100,
        };
        text.chars().all(|c| (c as u32) < bound)
    }
}

/// A candidate list attached to a span of preedit text.
#[derive(Debug, Clone)]
pub struct CandSpan {
    pub from: usize,
    pub to: usize,
    pub list: Arc<CandidateList>,
    pub index: usize,
}

/// The editable preedit buffer.
#[derive(Debug, Clone, Default)]
pub struct Preedit {
    chars: Vec<char>,
    spans: Vec<CandSpan>,
}

impl Preedit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    #[must_use]
    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).copied()
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.spans.clear();
    }

    /// Inserts text at `pos`, shifting following spans.
    ///
    /// A span strictly containing `pos` grows; spans at or after `pos`
    /// shift right.
    pub fn insert(&mut self, pos: usize, text: &str) {
        let added: Vec<char> = text.chars().collect();
        let n = added.len();
        self.chars.splice(pos..pos, added);
        for span in &mut self.spans {
            if span.from >= pos {
                span.from += n;
                span.to += n;
            } else if span.to > pos {
                span.to += n;
            }
        }
    }

    /// Deletes `[from, to)`, dropping any candidate span that intersects the
    /// deleted range and shifting later spans left.
    pub fn delete(&mut self, from: usize, to: usize) {
        let (from, to) = (from.min(self.chars.len()), to.min(self.chars.len()));
        if from >= to {
            return;
        }
        let n = to - from;
        self.chars.drain(from..to);
        self.spans.retain(|span| span.to <= from || span.from >= to);
        for span in &mut self.spans {
            if span.from >= to {
                span.from -= n;
                span.to -= n;
            }
        }
    }

    /// Attaches a candidate list over `[from, to)`, replacing any span it
    /// overlaps.
    pub fn attach_candidates(&mut self, from: usize, to: usize, list: Arc<CandidateList>, index: usize) {
        self.spans.retain(|span| span.to <= from || span.from >= to);
        self.spans.push(CandSpan { from, to, list, index });
    }

    /// Drops every candidate span (used by `commit`).
    pub fn drop_candidates(&mut self) {
        self.spans.clear();
    }

    /// Returns the candidate span covering position `pos`.
    #[must_use]
    pub fn span_at(&self, pos: usize) -> Option<&CandSpan> {
        self.spans.iter().find(|span| span.from <= pos && pos < span.to)
    }

    /// Replaces the text of the span covering `pos` with candidate `index`
    /// of its list. Returns the updated span bounds.
    ///
    /// The caller guarantees `index` is valid for the span's list.
    pub fn select_candidate(&mut self, pos: usize, index: usize) -> Option<(usize, usize)> {
        let span_pos = self.spans.iter().position(|span| span.from <= pos && pos < span.to)?;
        let (from, to, replacement) = {
            let span = &self.spans[span_pos];
            let text = span.list.candidate(index)?.to_owned();
            (span.from, span.to, text)
        };
        let new: Vec<char> = replacement.chars().collect();
        let new_len = new.len();
        self.chars.splice(from..to, new);
        let delta = new_len as isize - (to - from) as isize;
        for (i, span) in self.spans.iter_mut().enumerate() {
            if i == span_pos {
                span.to = from + new_len;
                span.index = index;
            } else if span.from >= to {
                span.from = span.from.wrapping_add_signed(delta);
                span.to = span.to.wrapping_add_signed(delta);
            }
        }
        Some((from, from + new_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> Arc<CandidateList> {
        Arc::new(CandidateList::new(vec![
            vec!["one".into(), "two".into()],
            vec!["three".into(), "four".into()],
        ]))
    }

    #[test]
    fn insert_delete_shift_spans() {
        let mut p = Preedit::new();
        p.insert(0, "abc");
        p.attach_candidates(1, 2, list(), 0);
        p.insert(0, "xx");
        assert_eq!(p.text(), "xxabc");
        assert_eq!(p.span_at(3).map(|s| (s.from, s.to)), Some((3, 4)));
        p.delete(0, 2);
        assert_eq!(p.text(), "abc");
        assert_eq!(p.span_at(1).map(|s| (s.from, s.to)), Some((1, 2)));
        // deleting through the span drops it
        p.delete(1, 2);
        assert!(p.span_at(1).is_none());
        assert_eq!(p.text(), "ac");
    }

    #[test]
    fn select_replaces_span_text() {
        let mut p = Preedit::new();
        p.insert(0, "one");
        p.attach_candidates(0, 3, list(), 0);
        let (from, to) = p.select_candidate(0, 2).expect("select");
        assert_eq!((from, to), (0, 5));
        assert_eq!(p.text(), "three");
        assert_eq!(p.span_at(0).map(|s| s.index), Some(2));
        let (_, to) = p.select_candidate(0, 1).expect("select back");
        assert_eq!(to, 3);
        assert_eq!(p.text(), "two");
    }

    #[test]
    fn candidate_list_geometry() {
        let l = list();
        assert_eq!(l.len(), 4);
        assert_eq!(l.candidate(2), Some("three"));
        assert_eq!(l.locate(3), Some((1, 1)));
        assert_eq!(l.group_start(1), 2);
        assert_eq!(l.group_last(0), 1);
    }

    #[test]
    fn charsets() {
        assert!(Charset::Ascii.contains("abc"));
        assert!(!Charset::Ascii.contains("\u{e9}"));
        assert!(Charset::Latin1.contains("caf\u{e9}"));
        assert!(!Charset::Latin1.contains("\u{304b}"));
    }
}
