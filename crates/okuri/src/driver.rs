//! The context driver: the per-key filter loop and state shifts.
//!
//! One `filter_key` call appends the key to the context's ring and walks
//! pending keys through the current state's trie, firing map- and
//! branch-actions, until the ring is drained or the key turns out to be
//! unhandled. The loop is capped at 100 iterations as a safety net against
//! `pushback` cycles in descriptions.

use crate::{
    context::{ChangeFlags, Context},
    interp::{self, ActionAbort, ActionResult},
    keysym::{KeySym, WellKnown},
    trie::NodeId,
};

/// Safety cap on the filter inner loop.
const MAX_FILTER_ITERATIONS: usize = 100;

/// Feeds one key through the state machine.
///
/// Returns 1 when the key was consumed and no produced text is waiting;
/// 0 when the host must call `lookup` (text ready, or key unhandled).
pub(crate) fn filter_key(ctx: &mut Context, key: KeySym) -> i32 {
    ctx.changed = ChangeFlags::default();
    ctx.preceding_text = None;
    ctx.following_text = None;
    ctx.key_unhandled = false;

    if !ctx.active {
        ctx.key_unhandled = true;
        return 0;
    }

    ctx.with_syms(|syms| syms.ensure_meta_alias(key));
    let name = ctx.with_syms(|syms| syms.name(key).to_owned());
    ctx.trace(|t| t.on_key(&name));
    ctx.keys.push(key);

    let mut iterations = 0;
    while ctx.key_head < ctx.keys.len() {
        iterations += 1;
        if iterations > MAX_FILTER_ITERATIONS {
            ctx.soft_error("filter loop did not settle after 100 iterations; resetting");
            reset_ic(ctx);
            ctx.key_unhandled = true;
            break;
        }
        match step(ctx) {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::Unhandled) => {
                // Remove the offending key; earlier consumed keys stay until
                // a commit rebases the ring.
                ctx.key_unhandled = true;
                if ctx.key_head < ctx.keys.len() {
                    ctx.keys.remove(ctx.key_head);
                }
                break;
            }
            Err(ActionAbort::Unhandled) => {
                ctx.key_unhandled = true;
                ctx.keys.clear();
                ctx.key_head = 0;
                ctx.state_key_head = 0;
                break;
            }
        }
        ctx.sync_candidates();
    }

    // An unhandled key at the initial state's root flushes the pending
    // preedit, so the host receives the composed text before it
    // re-dispatches the key.
    if ctx.key_unhandled && ctx.state == 0 && ctx.node == NodeId::ROOT && !ctx.preedit.is_empty() {
        if enter_state(ctx, 0, true, 0).is_err() {
            ctx.keys.clear();
            ctx.key_head = 0;
            ctx.state_key_head = 0;
        }
    }
    ctx.sync_candidates();
    notify(ctx);

    i32::from(!ctx.key_unhandled && ctx.produced.is_empty())
}

enum StepOutcome {
    Continue,
    /// The current key found no match at the initial state's root.
    Unhandled,
}

/// Processes the key at `key_head` against the current trie node.
fn step(ctx: &mut Context) -> Result<StepOutcome, ActionAbort> {
    let current = ctx.keys[ctx.key_head];
    let state = ctx.state;
    let entered = {
        let trie = &ctx.im.state_at(state).trie;
        ctx.with_syms(|syms| trie.lookup(ctx.node, current, syms))
    };

    let Some(entered) = entered else {
        return miss(ctx, state);
    };

    // Roll the preedit back to the state-entry snapshot before replaying
    // this node's effect.
    restore_snapshot(ctx);
    ctx.key_head += 1;
    ctx.node = entered;

    let (map_actions, has_submaps) = {
        let node = ctx.im.state_at(state).trie.node(entered);
        (node.map_actions().cloned(), !node.is_terminal())
    };
    if let Some(actions) = map_actions {
        interp::take_action_list(ctx, &actions, 0, "map")?;
    } else if has_submaps {
        insert_pending_literals(ctx);
    }

    let moved = ctx.state != state || ctx.node != entered;
    let terminal = ctx.im.state_at(state).trie.node(entered).is_terminal();
    if moved || terminal {
        let branch_actions = ctx.im.state_at(state).trie.node(entered).branch_actions().cloned();
        if let Some(actions) = branch_actions {
            interp::take_action_list(ctx, &actions, 0, "branch")?;
        }
        // Still parked on a non-root node: the sequence is finished, so
        // re-enter the state to accept the next one.
        if ctx.state == state && ctx.node == entered && ctx.node != NodeId::ROOT {
            enter_state(ctx, state, false, 0)?;
        }
    }
    Ok(StepOutcome::Continue)
}

/// Handles a key with no continuation from the current node.
fn miss(ctx: &mut Context, state: usize) -> Result<StepOutcome, ActionAbort> {
    if ctx.node == NodeId::ROOT && state == 0 {
        return Ok(StepOutcome::Unhandled);
    }
    if ctx.node == NodeId::ROOT {
        // A non-initial state's root rejects the key: run the root branch
        // actions and fall back to the initial state. The key is retried
        // there on the next iteration.
        let actions = ctx.im.state_at(state).trie.node(NodeId::ROOT).branch_actions().cloned();
        if let Some(actions) = actions {
            interp::take_action_list(ctx, &actions, 0, "branch")?;
        }
        if ctx.state == state && ctx.node == NodeId::ROOT {
            shift_to(ctx, 0, 0)?;
        }
        return Ok(StepOutcome::Continue);
    }
    // Mid-trie mismatch: leave the dangling sequence through its branch
    // actions, then re-enter the state so the key is retried at the root.
    let actions = ctx.im.state_at(state).trie.node(ctx.node).branch_actions().cloned();
    if let Some(actions) = actions {
        interp::take_action_list(ctx, &actions, 0, "branch")?;
    }
    if ctx.state == state && ctx.node != NodeId::ROOT {
        enter_state(ctx, state, false, 0)?;
    }
    Ok(StepOutcome::Continue)
}

fn restore_snapshot(ctx: &mut Context) {
    if ctx.preedit.text() != ctx.preedit_saved.text() || ctx.cursor_pos != ctx.state_pos {
        ctx.changed.preedit = true;
    }
    ctx.preedit = ctx.preedit_saved.clone();
    ctx.cursor_pos = ctx.state_pos;
}

/// Self-inserts the keys consumed by the current state so far, for nodes
/// with continuations but no actions of their own. Only keys whose symbol
/// name is a single character produce text.
fn insert_pending_literals(ctx: &mut Context) {
    let end = ctx.key_head.min(ctx.keys.len());
    let start = ctx.state_key_head.min(end);
    let literals: String = {
        let keys = &ctx.keys[start..end];
        ctx.with_syms(|syms| keys.iter().filter_map(|&key| syms.as_char(key)).collect())
    };
    if !literals.is_empty() {
        ctx.insert_text(&literals);
    }
}

/// The `shift` action: resolve the target name and enter it.
pub(crate) fn shift_action(ctx: &mut Context, target: KeySym, depth: usize) -> ActionResult {
    if target == KeySym::well_known(WellKnown::T) {
        let Some(prev) = ctx.prev_state else {
            ctx.soft_error("shift to previous state with no previous state");
            return Ok(());
        };
        return shift_to(ctx, prev, depth);
    }
    let index = ctx.im.state_index(target);
    let index = match index {
        Some(index) => index,
        None => {
            // Forward references are legal at load; unknown targets fall
            // back to the initial state at run time.
            let name = ctx.with_syms(|syms| syms.name(target).to_owned());
            ctx.soft_error(format!("shift to unknown state '{name}'; falling back to the initial state"));
            0
        }
    };
    shift_to(ctx, index, depth)
}

/// Shifts to a state by index. Entering the initial state from another
/// state commits the preedit.
pub(crate) fn shift_to(ctx: &mut Context, index: usize, depth: usize) -> ActionResult {
    let commit = index == 0 && index != ctx.state;
    enter_state(ctx, index, commit, depth)
}

/// Enters (or re-enters) a state: optionally commits, updates the status
/// line, snapshots the preedit, and runs the state's entry actions.
pub(crate) fn enter_state(ctx: &mut Context, index: usize, commit: bool, depth: usize) -> ActionResult {
    if commit {
        ctx.commit();
    }
    if index != ctx.state {
        ctx.prev_state = Some(ctx.state);
        ctx.state = index;
        let title = {
            let state = ctx.im.state_at(index);
            state.title.clone().unwrap_or_else(|| ctx.im.title().to_owned())
        };
        if title != ctx.status {
            ctx.status = title;
            ctx.changed.status = true;
        }
    }
    let state_name = ctx.with_syms(|syms| syms.name(ctx.im.state_at(index).name).to_owned());
    ctx.trace(|t| t.on_shift(&state_name));
    ctx.node = NodeId::ROOT;
    ctx.preedit_saved = ctx.preedit.clone();
    ctx.state_pos = ctx.cursor_pos;
    ctx.state_key_head = ctx.key_head;
    let entry_actions = ctx.im.state_at(index).trie.node(NodeId::ROOT).map_actions().cloned();
    if let Some(actions) = entry_actions {
        interp::take_action_list(ctx, &actions, depth + 1, "map")?;
    }
    Ok(())
}

/// Discards every piece of pending state and returns to the initial state.
pub(crate) fn reset_ic(ctx: &mut Context) {
    ctx.keys.clear();
    ctx.key_head = 0;
    ctx.state_key_head = 0;
    ctx.preedit.clear();
    ctx.preedit_saved.clear();
    ctx.cursor_pos = 0;
    ctx.state_pos = 0;
    ctx.markers.clear();
    ctx.produced.clear();
    ctx.candidate_list = None;
    ctx.candidate_index = 0;
    ctx.candidate_from = 0;
    ctx.candidate_to = 0;
    ctx.candidate_show = false;
    ctx.state = 0;
    ctx.prev_state = None;
    ctx.node = NodeId::ROOT;
    let status = ctx
        .im
        .initial_state()
        .title
        .clone()
        .unwrap_or_else(|| ctx.im.title().to_owned());
    if status != ctx.status {
        ctx.status = status;
        ctx.changed.status = true;
    }
    ctx.changed.preedit = true;
    ctx.changed.candidates = true;
    // Re-enter the initial state so its entry actions run, as they do on
    // context creation.
    let _ = enter_state(ctx, 0, false, 0);
}

/// Invokes the draw callbacks for every observable whose flag is set.
fn notify(ctx: &mut Context) {
    let changed = ctx.changed;
    if changed == ChangeFlags::default() {
        return;
    }
    let mut callbacks = ctx.take_callbacks();
    if changed.preedit {
        callbacks.on_preedit_draw(&ctx.preedit.text(), ctx.cursor_pos);
    }
    if changed.status {
        callbacks.on_status_draw(&ctx.status);
    }
    if changed.candidates {
        callbacks.on_candidates_draw(ctx.candidate_list.as_deref(), ctx.candidate_index, ctx.candidate_show);
    }
    ctx.set_callbacks(callbacks);
}

/// Runs the `init`/`fini` lifecycle functions of every bound module.
/// Failures are reported through the tracer and ignored.
pub(crate) fn run_module_lifecycle(ctx: &mut Context, which: WellKnown) {
    let name = KeySym::well_known(which);
    let callables: Vec<_> = ctx
        .im
        .modules()
        .filter_map(|binding| binding.functions.get(&name).cloned())
        .collect();
    let kind: &'static str = which.into();
    for callable in callables {
        ctx.trace(|t| t.on_actions(kind, 1));
        if let Err(message) = callable(ctx, &[]) {
            ctx.soft_error(format!("module {kind} failed: {message}"));
        }
    }
}
