//! Host callback surface of an input context.
//!
//! The engine never draws and never touches the host application's buffer
//! directly. Implement [`ImCallbacks`] to receive draw notifications after
//! each filtered key and to serve the surrounding-text requests that
//! `@-N`/`@+N` markers make. All methods have defaults, so hosts only
//! override the hooks they care about.

use crate::{context::SpotInfo, preedit::CandidateList};

/// Callbacks from the engine to the host.
///
/// Draw hooks fire after a `filter` call, and only for the observables whose
/// change flag is set. Surrounding-text hooks must complete synchronously.
pub trait ImCallbacks {
    /// Preedit text or cursor changed.
    fn on_preedit_draw(&mut self, _preedit: &str, _cursor: usize) {}

    /// Status string changed (state shift or toggle).
    fn on_status_draw(&mut self, _status: &str) {}

    /// Candidate list, index, or visibility changed.
    fn on_candidates_draw(&mut self, _list: Option<&CandidateList>, _index: usize, _show: bool) {}

    /// The context was reset.
    fn on_reset(&mut self) {}

    /// The host reported a new preedit drawing spot.
    fn on_set_spot(&mut self, _spot: &SpotInfo) {}

    /// The context was toggled on or off.
    fn on_toggle(&mut self, _active: bool) {}

    /// Returns up to `max` characters of host text before (`before ==
    /// true`) or after the host cursor. `None` means surrounding text is
    /// unsupported; marker reads then evaluate to -1.
    fn get_surrounding_text(&mut self, _before: bool, _max: usize) -> Option<String> {
        None
    }

    /// Deletes `count` characters of host text before (`before == true`) or
    /// after the host cursor. Returns `false` if unsupported.
    fn delete_surrounding_text(&mut self, _before: bool, _count: usize) -> bool {
        false
    }
}

/// Callbacks that ignore everything. The default for a fresh context.
#[derive(Debug, Default)]
pub struct NoopCallbacks;

impl ImCallbacks for NoopCallbacks {}

/// Callbacks that record draw calls and serve fixed surrounding text.
///
/// Useful for tests and for embedding without a real host buffer.
#[derive(Debug, Default)]
pub struct CollectCallbacks {
    /// Text logically before the host cursor.
    pub before: String,
    /// Text logically after the host cursor.
    pub after: String,
    /// Every preedit draw as `(text, cursor)`.
    pub preedit_draws: Vec<(String, usize)>,
    /// Every status draw.
    pub status_draws: Vec<String>,
    /// Every candidates draw as `(candidates, index, show)`.
    pub candidate_draws: Vec<(Vec<String>, usize, bool)>,
    /// Surrounding deletions as `(before, count)`.
    pub deletions: Vec<(bool, usize)>,
    pub resets: usize,
}

impl CollectCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector with fixed surrounding text around the host cursor.
    #[must_use]
    pub fn with_surrounding(before: &str, after: &str) -> Self {
        Self {
            before: before.to_owned(),
            after: after.to_owned(),
            ..Self::default()
        }
    }
}

impl ImCallbacks for CollectCallbacks {
    fn on_preedit_draw(&mut self, preedit: &str, cursor: usize) {
        self.preedit_draws.push((preedit.to_owned(), cursor));
    }

    fn on_status_draw(&mut self, status: &str) {
        self.status_draws.push(status.to_owned());
    }

    fn on_candidates_draw(&mut self, list: Option<&CandidateList>, index: usize, show: bool) {
        let texts = list
            .map(|l| l.groups().iter().flatten().cloned().collect())
            .unwrap_or_default();
        self.candidate_draws.push((texts, index, show));
    }

    fn on_reset(&mut self) {
        self.resets += 1;
    }

    fn get_surrounding_text(&mut self, before: bool, max: usize) -> Option<String> {
        let source = if before { &self.before } else { &self.after };
        if before {
            let chars: Vec<char> = source.chars().collect();
            let start = chars.len().saturating_sub(max);
            Some(chars[start..].iter().collect())
        } else {
            Some(source.chars().take(max).collect())
        }
    }

    fn delete_surrounding_text(&mut self, before: bool, count: usize) -> bool {
        self.deletions.push((before, count));
        let source = if before { &mut self.before } else { &mut self.after };
        let chars: Vec<char> = source.chars().collect();
        *source = if before {
            chars[..chars.len().saturating_sub(count)].iter().collect()
        } else {
            chars[count.min(chars.len())..].iter().collect()
        };
        true
    }
}
