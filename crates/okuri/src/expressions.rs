//! The action language: markers, expressions, and actions.
//!
//! Key maps, macros, and state branches all carry lists of actions. Actions
//! and the expressions inside them are parsed out of the raw [`Value`] tree
//! into the enums here — once at load time for everything in a description,
//! and at run time for the action lists returned by external module calls.

use std::{fmt, sync::Arc};

use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    keysym::{KeySym, SymbolTable},
    value::Value,
};

/// A shared, immutable list of actions.
///
/// Branch actions are shared between every terminal node of a map merged
/// into a state, so lists are reference counted rather than cloned per node.
pub type ActionList = Arc<[Action]>;

/// A sequence of key symbols, as written in a map rule or `pushback`.
pub type KeySeq = SmallVec<[KeySym; 8]>;

/// Error for a value that does not match any action or expression shape.
///
/// The loader wraps this with the section being compiled; module calls
/// report it through the tracer as a soft runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError(pub String);

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ShapeError {}

fn shape_err<T>(message: impl Into<String>) -> Result<T, ShapeError> {
    Err(ShapeError(message.into()))
}

/// A bookmark into preedit text.
///
/// Names beginning with `@` are predefined computed positions; all other
/// names are user markers stored per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `@0`..`@9`: absolute position if within preedit, else the end.
    Position(u8),
    /// `@<`: start of preedit.
    Start,
    /// `@>`: end of preedit.
    End,
    /// `@-`: one before the cursor.
    Backward,
    /// `@+`: one after the cursor.
    Forward,
    /// `@[`: start of the candidate group containing the cursor.
    GroupStart,
    /// `@]`: end of the candidate group containing the cursor.
    GroupEnd,
    /// `@=`: the cursor itself.
    Cursor,
    /// `@@`: the index of the key being processed.
    KeyIndex,
    /// `@-N`: N characters before the surrounding-text cursor.
    SurroundBack(i64),
    /// `@+N`: N characters after the surrounding-text cursor.
    SurroundForward(i64),
    /// Any non-`@` name: a per-context marker.
    User(KeySym),
}

impl Marker {
    /// Parses a marker name. `@`-prefixed names must be one of the
    /// predefined forms; anything else is a user marker.
    pub fn parse(name: &str, syms: &mut SymbolTable) -> Result<Self, ShapeError> {
        let Some(rest) = name.strip_prefix('@') else {
            return Ok(Self::User(syms.intern(name)));
        };
        let marker = match rest {
            "<" => Self::Start,
            ">" => Self::End,
            "-" => Self::Backward,
            "+" => Self::Forward,
            "[" => Self::GroupStart,
            "]" => Self::GroupEnd,
            "=" => Self::Cursor,
            "@" => Self::KeyIndex,
            _ => {
                if rest.len() == 1 && rest.as_bytes()[0].is_ascii_digit() {
                    Self::Position(rest.as_bytes()[0] - b'0')
                } else if let Some(n) = rest.strip_prefix('-').and_then(|d| d.parse::<i64>().ok()) {
                    Self::SurroundBack(n)
                } else if let Some(n) = rest.strip_prefix('+').and_then(|d| d.parse::<i64>().ok()) {
                    Self::SurroundForward(n)
                } else {
                    return shape_err(format!("unknown predefined marker '{name}'"));
                }
            }
        };
        Ok(marker)
    }

    /// Returns `true` for the predefined `@…` forms.
    #[must_use]
    pub fn is_predefined(self) -> bool {
        !matches!(self, Self::User(_))
    }
}

/// Operator of a compound expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ExprOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
}

impl ExprOp {
    /// Returns `true` for the binary comparison operators, which double as
    /// conditional action heads.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Lt | Self::Gt | Self::Le | Self::Ge)
    }
}

/// An integer-valued expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    /// A plain name: the per-context variable's integer value.
    Var(KeySym),
    /// A marker: the character code at the marker (or its position, in the
    /// positional argument slots of `move` and `delete`).
    Marker(Marker),
    Op { op: ExprOp, args: Vec<Expr> },
}

impl Expr {
    /// Parses an expression from a tree value.
    ///
    /// Malformed compounds (non-operator head, wrong arity) are rejected
    /// here, so the interpreter never evaluates a partial expression.
    pub fn parse(value: &Value, syms: &mut SymbolTable) -> Result<Self, ShapeError> {
        match value {
            Value::Integer(n) => Ok(Self::Int(*n)),
            Value::Symbol(name) => {
                if name.starts_with('@') {
                    Ok(Self::Marker(Marker::parse(name, syms)?))
                } else {
                    Ok(Self::Var(syms.intern(name)))
                }
            }
            Value::List(items) => {
                let Some(head) = items.first().and_then(Value::as_symbol) else {
                    return shape_err(format!("expression needs an operator, got {value}"));
                };
                let Ok(op) = head.parse::<ExprOp>() else {
                    return shape_err(format!("unknown operator '{head}'"));
                };
                let args: Vec<Self> = items[1..]
                    .iter()
                    .map(|item| Self::parse(item, syms))
                    .collect::<Result<_, _>>()?;
                match op {
                    ExprOp::Not if args.len() != 1 => shape_err("'!' takes exactly one argument"),
                    op if op.is_comparison() && args.len() != 2 => {
                        shape_err(format!("'{op}' takes exactly two arguments"))
                    }
                    _ if args.len() < 2 && !matches!(op, ExprOp::Not) => {
                        shape_err(format!("'{op}' needs at least two arguments"))
                    }
                    _ => Ok(Self::Op { op, args }),
                }
            }
            _ => shape_err(format!("expected an expression, got {}", value.kind())),
        }
    }
}

/// One source group of a candidate insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    /// A text: every character is a candidate; chunked into display groups
    /// by the `candidates-group-size` variable.
    Chars(String),
    /// An explicit list of candidate texts forming one group.
    Texts(Vec<String>),
}

/// Argument of `insert`.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertArg {
    Text(String),
    /// A character given by its integer code.
    Char(i64),
    /// A variable holding a text or a character code.
    Var(KeySym),
    /// Candidate groups; the first candidate is inserted and the list is
    /// attached to the inserted span.
    Candidates(Vec<GroupSource>),
}

/// Argument of `pushback`.
#[derive(Debug, Clone, PartialEq)]
pub enum PushbackArg {
    /// Positive: rewind that many keys. Zero or negative: move the read
    /// head to the front of the ring.
    Count(i64),
    /// Replace the pending keys with this sequence.
    KeySeq(KeySeq),
}

/// Argument of `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectArg {
    Index(i64),
    Motion(Marker),
}

/// Variable-update operator shared by `set`/`add`/`sub`/`mul`/`div`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum VarOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// One clause of a `cond` action.
#[derive(Debug, Clone, PartialEq)]
pub struct CondClause {
    pub test: Expr,
    pub actions: ActionList,
}

/// A primitive action of the input method interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Insert(InsertArg),
    Delete(Expr),
    Move(Expr),
    Mark(Marker),
    Pushback(PushbackArg),
    Undo(Option<Expr>),
    Commit,
    Unhandle,
    Shift(KeySym),
    Select(SelectArg),
    Show,
    Hide,
    Call {
        module: KeySym,
        function: KeySym,
        args: Vec<Value>,
    },
    VarOp {
        op: VarOp,
        name: KeySym,
        value: Expr,
    },
    /// Conditional branch: `(< EXPR EXPR THEN [ELSE])`.
    If {
        op: ExprOp,
        lhs: Expr,
        rhs: Expr,
        then_actions: ActionList,
        else_actions: Option<ActionList>,
    },
    Cond(Vec<CondClause>),
    /// Any other name: invoke the macro of that name.
    MacroCall(KeySym),
}

/// Parses a whole action list, applying the normalization rules:
/// a bare text or integer is `insert`, a bare list headed by a text or list
/// is a candidate-group `insert`, a bare symbol is a macro call.
pub fn parse_action_list(values: &[Value], syms: &mut SymbolTable) -> Result<ActionList, ShapeError> {
    let actions: Vec<Action> = values
        .iter()
        .map(|value| parse_action(value, syms))
        .collect::<Result<_, _>>()?;
    Ok(actions.into())
}

/// Parses a single action, including the bare-value normalizations.
pub fn parse_action(value: &Value, syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    match value {
        Value::Text(text) => Ok(Action::Insert(InsertArg::Text(text.clone()))),
        Value::Integer(n) => Ok(Action::Insert(InsertArg::Char(*n))),
        Value::Symbol(name) => Ok(Action::MacroCall(syms.intern(name))),
        Value::List(items) => match items.first() {
            None => shape_err("empty action"),
            Some(Value::Text(_) | Value::List(_)) => {
                Ok(Action::Insert(InsertArg::Candidates(parse_candidate_groups(items)?)))
            }
            Some(Value::Symbol(head)) => parse_named_action(head, &items[1..], syms),
            Some(other) => shape_err(format!("cannot start an action with {}", other.kind())),
        },
        Value::Plist(_) => shape_err("plist is not an action"),
    }
}

fn parse_candidate_groups(items: &[Value]) -> Result<Vec<GroupSource>, ShapeError> {
    items
        .iter()
        .map(|item| match item {
            Value::Text(text) => Ok(GroupSource::Chars(text.clone())),
            Value::List(texts) => {
                let texts: Vec<String> = texts
                    .iter()
                    .map(|t| {
                        t.as_text()
                            .map(str::to_owned)
                            .ok_or_else(|| ShapeError(format!("candidate group element must be a text, got {}", t.kind())))
                    })
                    .collect::<Result<_, _>>()?;
                if texts.is_empty() {
                    return shape_err("empty candidate group");
                }
                Ok(GroupSource::Texts(texts))
            }
            other => shape_err(format!("candidate group must be a text or list, got {}", other.kind())),
        })
        .collect()
}

/// Parses `(head args…)` where `head` is an action name, an operator, or a
/// macro name.
fn parse_named_action(head: &str, args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    if let Ok(op) = head.parse::<ExprOp>() {
        if !op.is_comparison() {
            return shape_err(format!("'{op}' is not an action"));
        }
        return parse_if(op, args, syms);
    }
    match head {
        "insert" => parse_insert(args, syms),
        "delete" => Ok(Action::Delete(one_expr("delete", args, syms)?)),
        "move" => Ok(Action::Move(one_expr("move", args, syms)?)),
        "mark" => {
            let name = one_symbol("mark", args)?;
            Ok(Action::Mark(Marker::parse(name, syms)?))
        }
        "pushback" => parse_pushback(args, syms),
        "undo" => match args {
            [] => Ok(Action::Undo(None)),
            [value] => Ok(Action::Undo(Some(Expr::parse(value, syms)?))),
            _ => shape_err("undo takes at most one argument"),
        },
        "commit" => no_args("commit", args, Action::Commit),
        "unhandle" => no_args("unhandle", args, Action::Unhandle),
        "shift" => {
            let name = one_symbol("shift", args)?;
            Ok(Action::Shift(syms.intern(name)))
        }
        "select" => parse_select(args, syms),
        "show" => no_args("show", args, Action::Show),
        "hide" => no_args("hide", args, Action::Hide),
        "call" => parse_call(args, syms),
        "set" | "add" | "sub" | "mul" | "div" => {
            let op: VarOp = head.parse().expect("var op name");
            let [name, value] = args else {
                return shape_err(format!("{head} takes a variable and an expression"));
            };
            let Some(name) = name.as_symbol() else {
                return shape_err(format!("{head} needs a variable name, got {}", name.kind()));
            };
            Ok(Action::VarOp {
                op,
                name: syms.intern(name),
                value: Expr::parse(value, syms)?,
            })
        }
        "cond" => parse_cond(args, syms),
        _ => {
            if args.is_empty() {
                Ok(Action::MacroCall(syms.intern(head)))
            } else {
                shape_err(format!("unknown action '{head}' with arguments"))
            }
        }
    }
}

fn no_args(name: &str, args: &[Value], action: Action) -> Result<Action, ShapeError> {
    if args.is_empty() {
        Ok(action)
    } else {
        shape_err(format!("{name} takes no arguments"))
    }
}

fn one_expr(name: &str, args: &[Value], syms: &mut SymbolTable) -> Result<Expr, ShapeError> {
    let [value] = args else {
        return shape_err(format!("{name} takes exactly one argument"));
    };
    Expr::parse(value, syms)
}

fn one_symbol<'v>(name: &str, args: &'v [Value]) -> Result<&'v str, ShapeError> {
    let [value] = args else {
        return shape_err(format!("{name} takes exactly one symbol"));
    };
    value
        .as_symbol()
        .ok_or_else(|| ShapeError(format!("{name} needs a symbol, got {}", value.kind())))
}

fn parse_insert(args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    let [value] = args else {
        return shape_err("insert takes exactly one argument");
    };
    let arg = match value {
        Value::Text(text) => InsertArg::Text(text.clone()),
        Value::Integer(n) => InsertArg::Char(*n),
        Value::Symbol(name) => InsertArg::Var(syms.intern(name)),
        Value::List(items) => InsertArg::Candidates(parse_candidate_groups(items)?),
        Value::Plist(_) => return shape_err("insert cannot take a plist"),
    };
    Ok(Action::Insert(arg))
}

fn parse_pushback(args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    let [value] = args else {
        return shape_err("pushback takes exactly one argument");
    };
    match value {
        Value::Integer(n) => Ok(Action::Pushback(PushbackArg::Count(*n))),
        Value::Text(_) | Value::List(_) => Ok(Action::Pushback(PushbackArg::KeySeq(parse_keyseq(value, syms)?))),
        other => shape_err(format!("pushback takes a count or key sequence, got {}", other.kind())),
    }
}

fn parse_select(args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    let [value] = args else {
        return shape_err("select takes exactly one argument");
    };
    match value {
        Value::Integer(n) => Ok(Action::Select(SelectArg::Index(*n))),
        Value::Symbol(name) => {
            let marker = Marker::parse(name, syms)?;
            if marker.is_predefined() {
                Ok(Action::Select(SelectArg::Motion(marker)))
            } else {
                shape_err(format!("select needs an index or predefined marker, got '{name}'"))
            }
        }
        other => shape_err(format!("select takes an index or marker, got {}", other.kind())),
    }
}

fn parse_call(args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    let [module, function, rest @ ..] = args else {
        return shape_err("call takes a module, a function, and arguments");
    };
    let Some(module) = module.as_symbol() else {
        return shape_err(format!("call needs a module symbol, got {}", module.kind()));
    };
    let Some(function) = function.as_symbol() else {
        return shape_err(format!("call needs a function symbol, got {}", function.kind()));
    };
    Ok(Action::Call {
        module: syms.intern(module),
        function: syms.intern(function),
        args: rest.to_vec(),
    })
}

fn parse_if(op: ExprOp, args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    let (lhs, rhs, rest) = match args {
        [lhs, rhs, rest @ ..] if rest.len() <= 2 => (lhs, rhs, rest),
        _ => return shape_err(format!("'{op}' takes two expressions and one or two action lists")),
    };
    let then_actions = match rest.first() {
        Some(branch) => parse_branch_actions(branch, syms)?,
        None => return shape_err(format!("'{op}' needs a then-branch")),
    };
    let else_actions = rest.get(1).map(|branch| parse_branch_actions(branch, syms)).transpose()?;
    Ok(Action::If {
        op,
        lhs: Expr::parse(lhs, syms)?,
        rhs: Expr::parse(rhs, syms)?,
        then_actions,
        else_actions,
    })
}

/// A conditional branch is a list of actions; a bare text or integer is
/// accepted as a one-action insert list.
fn parse_branch_actions(value: &Value, syms: &mut SymbolTable) -> Result<ActionList, ShapeError> {
    match value {
        Value::List(items) => parse_action_list(items, syms),
        Value::Text(_) | Value::Integer(_) => Ok(vec![parse_action(value, syms)?].into()),
        other => shape_err(format!("expected an action list, got {}", other.kind())),
    }
}

fn parse_cond(args: &[Value], syms: &mut SymbolTable) -> Result<Action, ShapeError> {
    if args.is_empty() {
        return shape_err("cond needs at least one clause");
    }
    let clauses = args
        .iter()
        .map(|clause| {
            let Some([test, actions @ ..]) = clause.as_list() else {
                return shape_err(format!("cond clause must be a list, got {}", clause.kind()));
            };
            Ok(CondClause {
                test: Expr::parse(test, syms)?,
                actions: parse_action_list(actions, syms)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Action::Cond(clauses))
}

/// Parses a key sequence: a text (one key per character) or a list of
/// integers (0..=255, the canonical one-char symbols) and symbols.
pub fn parse_keyseq(value: &Value, syms: &mut SymbolTable) -> Result<KeySeq, ShapeError> {
    match value {
        Value::Text(text) => Ok(text.chars().map(|c| char_sym(c, syms)).collect()),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Integer(n @ 0..=255) => Ok(KeySym::one_char(*n as u8)),
                Value::Integer(n) => shape_err(format!("key code {n} out of range 0..=255")),
                Value::Symbol(name) => Ok(syms.intern(name)),
                other => shape_err(format!("key sequence element must be an integer or symbol, got {}", other.kind())),
            })
            .collect(),
        other => shape_err(format!("key sequence must be a text or list, got {}", other.kind())),
    }
}

/// Returns the key symbol for a literal character.
///
/// Printable ASCII maps into the canonical one-char range; anything else is
/// interned by its one-character name.
pub fn char_sym(c: char, syms: &mut SymbolTable) -> KeySym {
    if (' '..='~').contains(&c) {
        KeySym::one_char(c as u8)
    } else {
        syms.intern(&c.to_string())
    }
}
