//! The action interpreter and expression evaluator.
//!
//! Action lists run against a mutable [`Context`]. Execution either
//! completes or aborts the current key with [`ActionAbort::Unhandled`]
//! (the `unhandle` action, or an unrecoverable soft fault). Everything else
//! that goes wrong at run time — division by zero, a missing shift target, a
//! failing module call — is absorbed: it is reported through the tracer and
//! execution continues, so a context is never corrupted by its description.

use std::sync::Arc;

use crate::{
    context::Context,
    driver,
    expressions::{Action, ActionList, Expr, ExprOp, GroupSource, InsertArg, Marker, PushbackArg, SelectArg, VarOp},
    keysym::KeySym,
    preedit::CandidateList,
    value::Value,
};

/// Abort signal from an action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionAbort {
    /// Stop filtering the current key and report it unhandled.
    Unhandled,
}

pub(crate) type ActionResult = Result<(), ActionAbort>;

/// Recursion guard for macro calls, conditionals, and module-returned
/// action lists.
const MAX_ACTION_DEPTH: usize = 64;

/// Executes an action list.
///
/// `kind` labels the list for tracing ("map", "branch", "macro", ...).
pub(crate) fn take_action_list(ctx: &mut Context, actions: &ActionList, depth: usize, kind: &str) -> ActionResult {
    if depth > MAX_ACTION_DEPTH {
        ctx.soft_error(format!("action recursion deeper than {MAX_ACTION_DEPTH}; aborting key"));
        return Err(ActionAbort::Unhandled);
    }
    ctx.trace(|t| t.on_actions(kind, actions.len()));
    for action in actions.iter() {
        exec_action(ctx, action, depth)?;
    }
    Ok(())
}

fn exec_action(ctx: &mut Context, action: &Action, depth: usize) -> ActionResult {
    match action {
        Action::Insert(arg) => exec_insert(ctx, arg),
        Action::Delete(expr) => exec_delete(ctx, expr),
        Action::Move(expr) => exec_move(ctx, expr),
        Action::Mark(marker) => {
            if let Marker::User(name) = marker {
                ctx.markers.insert(*name, ctx.cursor_pos);
            }
            Ok(())
        }
        Action::Pushback(arg) => exec_pushback(ctx, arg),
        Action::Undo(arg) => exec_undo(ctx, arg.as_ref()),
        Action::Commit => {
            ctx.commit();
            Ok(())
        }
        Action::Unhandle => {
            ctx.commit();
            Err(ActionAbort::Unhandled)
        }
        Action::Shift(target) => driver::shift_action(ctx, *target, depth),
        Action::Select(arg) => exec_select(ctx, *arg),
        Action::Show => {
            if !ctx.candidate_show {
                ctx.candidate_show = true;
                ctx.changed.candidates = true;
            }
            Ok(())
        }
        Action::Hide => {
            if ctx.candidate_show {
                ctx.candidate_show = false;
                ctx.changed.candidates = true;
            }
            Ok(())
        }
        Action::Call { module, function, args } => exec_call(ctx, *module, *function, args, depth),
        Action::VarOp { op, name, value } => exec_var_op(ctx, *op, *name, value),
        Action::If {
            op,
            lhs,
            rhs,
            then_actions,
            else_actions,
        } => {
            let lhs = eval(ctx, lhs);
            let rhs = eval(ctx, rhs);
            let taken = compare(*op, lhs, rhs);
            if taken {
                take_action_list(ctx, then_actions, depth + 1, "then")
            } else if let Some(else_actions) = else_actions {
                take_action_list(ctx, else_actions, depth + 1, "else")
            } else {
                Ok(())
            }
        }
        Action::Cond(clauses) => {
            for clause in clauses {
                if eval(ctx, &clause.test) != 0 {
                    return take_action_list(ctx, &clause.actions, depth + 1, "cond");
                }
            }
            Ok(())
        }
        Action::MacroCall(name) => {
            let Some(actions) = ctx.im.macro_actions(*name).cloned() else {
                // Reachable only from module-returned lists; descriptions
                // are checked at load.
                let name = ctx.with_syms(|syms| syms.name(*name).to_owned());
                ctx.soft_error(format!("call to undefined macro '{name}'"));
                return Ok(());
            };
            take_action_list(ctx, &actions, depth + 1, "macro")
        }
    }
}

// ----------------------------------------------------------------------
// Individual actions
// ----------------------------------------------------------------------

fn exec_insert(ctx: &mut Context, arg: &InsertArg) -> ActionResult {
    match arg {
        InsertArg::Text(text) => ctx.insert_text(text),
        InsertArg::Char(code) => insert_char_code(ctx, *code),
        InsertArg::Var(name) => match ctx.vars.get(name).cloned() {
            Some(Value::Text(text)) => ctx.insert_text(&text),
            Some(Value::Integer(code)) => insert_char_code(ctx, code),
            other => {
                let name = ctx.with_syms(|syms| syms.name(*name).to_owned());
                ctx.soft_error(match other {
                    None => format!("insert of unset variable '{name}'"),
                    Some(value) => format!("insert of non-insertable variable '{name}' = {value}"),
                });
            }
        },
        InsertArg::Candidates(groups) => insert_candidates(ctx, groups),
    }
    Ok(())
}

fn insert_char_code(ctx: &mut Context, code: i64) {
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) => ctx.insert_text(&c.to_string()),
        None => ctx.soft_error(format!("insert of invalid character code {code}")),
    }
}

/// Builds the candidate list from its group sources, applying the
/// `candidates-group-size` chunking to text groups and the
/// `candidates-charset` filter to every candidate, then inserts the first
/// candidate with the list attached.
fn insert_candidates(ctx: &mut Context, groups: &[GroupSource]) {
    let group_size = ctx.group_size();
    let charset = ctx.charset();
    let keep = |text: &str| charset.is_none_or(|cs| cs.contains(text));
    let mut built: Vec<Vec<String>> = Vec::new();
    for group in groups {
        match group {
            GroupSource::Chars(text) => {
                let kept: Vec<String> = text.chars().map(String::from).filter(|c| keep(c)).collect();
                for chunk in kept.chunks(group_size) {
                    built.push(chunk.to_vec());
                }
            }
            GroupSource::Texts(texts) => {
                built.push(texts.iter().filter(|t| keep(t)).cloned().collect());
            }
        }
    }
    let list = CandidateList::new(built);
    let Some(first) = list.candidate(0).map(str::to_owned) else {
        ctx.soft_error("candidate insertion with no admissible candidates");
        return;
    };
    let from = ctx.cursor_pos;
    ctx.insert_text(&first);
    let to = ctx.cursor_pos;
    ctx.preedit.attach_candidates(from, to, Arc::new(list), 0);
    ctx.changed.candidates = true;
}

fn exec_delete(ctx: &mut Context, expr: &Expr) -> ActionResult {
    match expr {
        Expr::Marker(Marker::SurroundBack(n)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            if count > 0 && !ctx.delete_surrounding(true, count) {
                ctx.soft_error("host does not support deleting surrounding text");
            }
        }
        Expr::Marker(Marker::SurroundForward(n)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            if count > 0 && !ctx.delete_surrounding(false, count) {
                ctx.soft_error("host does not support deleting surrounding text");
            }
        }
        _ => {
            let target = eval_position(ctx, expr);
            let (from, to) = if target < ctx.cursor_pos {
                (target, ctx.cursor_pos)
            } else {
                (ctx.cursor_pos, target)
            };
            ctx.delete_range(from, to);
        }
    }
    Ok(())
}

fn exec_move(ctx: &mut Context, expr: &Expr) -> ActionResult {
    if matches!(expr, Expr::Marker(Marker::SurroundBack(_) | Marker::SurroundForward(_))) {
        ctx.soft_error("cannot move the cursor into surrounding text");
        return Ok(());
    }
    let target = eval_position(ctx, expr);
    if target != ctx.cursor_pos {
        ctx.cursor_pos = target;
        ctx.changed.preedit = true;
    }
    Ok(())
}

fn exec_pushback(ctx: &mut Context, arg: &PushbackArg) -> ActionResult {
    match arg {
        PushbackArg::Count(n) => {
            if *n > 0 {
                let back = usize::try_from(*n).unwrap_or(usize::MAX);
                ctx.key_head = ctx.key_head.saturating_sub(back);
            } else {
                ctx.key_head = 0;
            }
        }
        PushbackArg::KeySeq(seq) => {
            ctx.key_head = ctx.key_head.saturating_sub(1);
            ctx.keys.truncate(ctx.key_head);
            ctx.keys.extend(seq.iter().copied());
        }
    }
    Ok(())
}

fn exec_undo(ctx: &mut Context, arg: Option<&Expr>) -> ActionResult {
    let used = ctx.keys.len() as i64;
    let target = match arg {
        None => used - 2,
        Some(expr) => {
            let n = eval(ctx, expr);
            if n < 0 { used + n } else { n }
        }
    };
    let target = target.clamp(0, used) as usize;
    ctx.keys.truncate(target);
    ctx.key_head = 0;
    ctx.preedit.clear();
    ctx.preedit_saved.clear();
    ctx.cursor_pos = 0;
    ctx.state_pos = 0;
    ctx.markers.clear();
    ctx.changed.preedit = true;
    driver::enter_state(ctx, 0, false, 0)?;
    Ok(())
}

fn exec_select(ctx: &mut Context, arg: SelectArg) -> ActionResult {
    let Some(span) = ctx
        .cursor_pos
        .checked_sub(1)
        .and_then(|pos| ctx.preedit.span_at(pos))
    else {
        ctx.soft_error("select with no candidate list at the cursor");
        return Ok(());
    };
    let list = span.list.clone();
    let current = span.index;
    let anchor = span.from;
    let last = list.len() - 1;
    let target = match arg {
        SelectArg::Index(n) => usize::try_from(n).unwrap_or(0).min(last),
        SelectArg::Motion(motion) => match motion {
            Marker::Start => 0,
            Marker::End => last,
            Marker::Forward => (current + 1) % list.len(),
            Marker::Backward => (current + list.len() - 1) % list.len(),
            Marker::Cursor => current,
            // Next group: its first candidate; previous group: its last.
            Marker::GroupEnd => {
                let (group, _) = list.locate(current).expect("current index in list");
                list.group_start((group + 1) % list.group_count())
            }
            Marker::GroupStart => {
                let (group, _) = list.locate(current).expect("current index in list");
                list.group_last((group + list.group_count() - 1) % list.group_count())
            }
            Marker::Position(d) => usize::from(d).min(last),
            _ => {
                ctx.soft_error("select does not accept surrounding or key markers");
                return Ok(());
            }
        },
    };
    if let Some((_, to)) = ctx.preedit.select_candidate(anchor, target) {
        ctx.cursor_pos = to;
        ctx.changed.preedit = true;
        ctx.changed.candidates = true;
    }
    Ok(())
}

fn exec_call(ctx: &mut Context, module: KeySym, function: KeySym, args: &[Value], depth: usize) -> ActionResult {
    let Some(callable) = ctx
        .im
        .module(module)
        .and_then(|binding| binding.functions.get(&function).cloned())
    else {
        let (module, function) = ctx.with_syms(|syms| (syms.name(module).to_owned(), syms.name(function).to_owned()));
        ctx.soft_error(format!("call to unresolved function '{function}' of module '{module}'"));
        return Ok(());
    };
    // Markers in the argument list are resolved before the host sees them.
    let resolved: Vec<Value> = args.iter().map(|arg| resolve_call_arg(ctx, arg)).collect();
    ctx.trace(|t| t.on_actions("call", 1));
    match callable(ctx, &resolved) {
        Ok(None) => Ok(()),
        Ok(Some(returned)) => run_returned_actions(ctx, &returned, depth),
        Err(message) => {
            ctx.soft_error(format!("module call failed: {message}"));
            Ok(())
        }
    }
}

fn resolve_call_arg(ctx: &mut Context, arg: &Value) -> Value {
    let Some(name) = arg.as_symbol() else {
        return arg.clone();
    };
    if !name.starts_with('@') {
        return arg.clone();
    }
    let marker = ctx.with_syms(|syms| Marker::parse(name, syms));
    match marker {
        Ok(Marker::SurroundBack(n)) => Value::Integer(ctx.surrounding_char(-n)),
        Ok(Marker::SurroundForward(n)) => Value::Integer(ctx.surrounding_char(n)),
        Ok(marker) => Value::Integer(marker_position(ctx, marker) as i64),
        Err(_) => arg.clone(),
    }
}

/// Interprets a module call's return value as a nested action list.
fn run_returned_actions(ctx: &mut Context, returned: &Value, depth: usize) -> ActionResult {
    let Value::List(items) = returned else {
        ctx.soft_error(format!("module returned a {}, expected an action list", returned.kind()));
        return Ok(());
    };
    let parsed = ctx.with_syms(|syms| crate::expressions::parse_action_list(items, syms));
    match parsed {
        Ok(actions) => take_action_list(ctx, &actions, depth + 1, "call"),
        Err(err) => {
            ctx.soft_error(format!("module returned a malformed action list: {err}"));
            Ok(())
        }
    }
}

fn exec_var_op(ctx: &mut Context, op: VarOp, name: KeySym, value: &Expr) -> ActionResult {
    let rhs = eval(ctx, value);
    let result = match op {
        VarOp::Set => rhs,
        VarOp::Add => ctx.var_int(name).wrapping_add(rhs),
        VarOp::Sub => ctx.var_int(name).wrapping_sub(rhs),
        VarOp::Mul => ctx.var_int(name).wrapping_mul(rhs),
        VarOp::Div => {
            if rhs == 0 {
                ctx.soft_error("division by zero; result saturated to 0");
                0
            } else {
                ctx.var_int(name).wrapping_div(rhs)
            }
        }
    };
    ctx.vars.insert(name, Value::Integer(result));
    Ok(())
}

// ----------------------------------------------------------------------
// Expression evaluation
// ----------------------------------------------------------------------

/// Evaluates an expression to an integer.
///
/// Marker leaves read the character code at the marker (surrounding-text
/// markers read through the host callback); `@@` reads the key index. The
/// evaluator is total: faults are reported and evaluate to safe values.
pub(crate) fn eval(ctx: &mut Context, expr: &Expr) -> i64 {
    match expr {
        Expr::Int(n) => *n,
        Expr::Var(name) => ctx.var_int(*name),
        Expr::Marker(Marker::SurroundBack(n)) => ctx.surrounding_char(-n),
        Expr::Marker(Marker::SurroundForward(n)) => ctx.surrounding_char(*n),
        Expr::Marker(Marker::KeyIndex) => ctx.key_head as i64,
        Expr::Marker(marker) => {
            let pos = marker_position(ctx, *marker);
            ctx.preedit.char_at(pos).map_or(-1, |c| i64::from(u32::from(c)))
        }
        Expr::Op { op, args } => eval_op(ctx, *op, args),
    }
}

fn eval_op(ctx: &mut Context, op: ExprOp, args: &[Expr]) -> i64 {
    if op == ExprOp::Not {
        return i64::from(eval(ctx, &args[0]) == 0);
    }
    if op.is_comparison() {
        let lhs = eval(ctx, &args[0]);
        let rhs = eval(ctx, &args[1]);
        return i64::from(compare(op, lhs, rhs));
    }
    let mut acc = eval(ctx, &args[0]);
    for arg in &args[1..] {
        let rhs = eval(ctx, arg);
        acc = match op {
            ExprOp::Add => acc.wrapping_add(rhs),
            ExprOp::Sub => acc.wrapping_sub(rhs),
            ExprOp::Mul => acc.wrapping_mul(rhs),
            ExprOp::Div => {
                if rhs == 0 {
                    ctx.soft_error("division by zero; result saturated to 0");
                    0
                } else {
                    acc.wrapping_div(rhs)
                }
            }
            ExprOp::And => i64::from(acc != 0 && rhs != 0),
            ExprOp::Or => i64::from(acc != 0 || rhs != 0),
            _ => unreachable!("comparison handled above"),
        };
    }
    acc
}

fn compare(op: ExprOp, lhs: i64, rhs: i64) -> bool {
    match op {
        ExprOp::Eq => lhs == rhs,
        ExprOp::Lt => lhs < rhs,
        ExprOp::Gt => lhs > rhs,
        ExprOp::Le => lhs <= rhs,
        ExprOp::Ge => lhs >= rhs,
        _ => unreachable!("not a comparison"),
    }
}

/// Evaluates an expression in position context (the argument slots of
/// `move` and `delete`): markers resolve to their position, everything else
/// to its integer value clamped into the preedit.
pub(crate) fn eval_position(ctx: &mut Context, expr: &Expr) -> usize {
    let len = ctx.preedit.len();
    match expr {
        Expr::Marker(marker) => marker_position(ctx, *marker),
        other => {
            let n = eval(ctx, other);
            usize::try_from(n).unwrap_or(0).min(len)
        }
    }
}

/// The preedit position a marker denotes, clamped into the buffer.
pub(crate) fn marker_position(ctx: &Context, marker: Marker) -> usize {
    let len = ctx.preedit.len();
    let pos = match marker {
        Marker::Position(d) => usize::from(d),
        Marker::Start => 0,
        Marker::End => len,
        Marker::Backward => ctx.cursor_pos.saturating_sub(1),
        Marker::Forward => ctx.cursor_pos + 1,
        Marker::Cursor => ctx.cursor_pos,
        Marker::KeyIndex => ctx.key_head,
        // Candidate group boundaries of the span at the cursor.
        Marker::GroupStart => ctx.candidate_from,
        Marker::GroupEnd => ctx.candidate_to,
        Marker::SurroundBack(_) | Marker::SurroundForward(_) => ctx.cursor_pos,
        Marker::User(name) => ctx.markers.get(&name).copied().unwrap_or(0),
    };
    pos.min(len)
}
