#![doc = include_str!("../../../README.md")]

mod callbacks;
mod context;
mod database;
mod definition;
mod driver;
mod engine;
mod expressions;
mod interp;
mod keysym;
mod load;
mod modules;
mod parse;
mod preedit;
mod tracer;
mod trie;
mod value;

pub use crate::{
    callbacks::{CollectCallbacks, ImCallbacks, NoopCallbacks},
    context::{ChangeFlags, Context, SpotInfo},
    database::{Database, DbError, DbHandle, ImTag, MemDatabase, header_tag},
    definition::{
        CommandDecl, ImState, InputMethod, MapDef, MapRule, ModuleBinding, VariableConstraint, VariableDecl,
    },
    engine::Engine,
    expressions::{
        Action, ActionList, CondClause, Expr, ExprOp, GroupSource, InsertArg, KeySeq, Marker, PushbackArg, SelectArg,
        ShapeError, VarOp,
    },
    keysym::{KeySym, SymProp, SymbolTable, WellKnown},
    load::LoadError,
    modules::{Module, ModuleError, ModuleFn, ModuleLoader, NoModules, RegistryLoader},
    parse::{ParseError, dump_description, load_description, parse_description},
    preedit::{CandSpan, CandidateList, Charset, Preedit},
    tracer::{CollectTracer, ImTracer, NoopTracer, StderrTracer},
    trie::{KeyTrie, MapNode, NodeId},
    value::Value,
};
