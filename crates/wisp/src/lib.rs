//! A bytecode compiler and register virtual machine for a small,
//! statically-scoped, dynamically-typed scripting language with first-class
//! functions, lexical closures, arrays, and iterators.
//!
//! Source text flows `lexer -> parser -> AST -> bytecode::builder (compiler)
//! -> FunctionProto -> bytecode::vm (Vm)`. Embedders drive a [`Vm`]
//! directly (`Vm::new`, `compile`, `run`, `set_global`/`get_global`,
//! `register_native`); [`repl::ReplSession`] wraps that same surface for an
//! interactive, multi-line session.

mod builtins;
mod bytecode;
mod function;
mod heap;
mod intern;
mod io;
mod lexer;
mod parse;
pub mod repl;
mod resource;
pub mod tracer;
mod value;

pub use crate::{
    bytecode::{
        CompileError, Opcode,
        vm::{NativeCtx, NativeFn, RuntimeError, Vm},
    },
    builtins::register_defaults,
    function::{Constant, FunctionProto, UpvalueDesc},
    heap::{ArrayObj, ClosureObj, Heap, HeapData, HeapId, IteratorObj, UpvalueObj, UpvalueState, format_value},
    intern::{Interns, StringId},
    io::{CollectOutput, NoOutput, OutputSink, StdOut},
    lexer::{Lexer, Token, TokenKind},
    parse::{AssignTarget, BinaryOp, Block, Expr, Stmt, UnaryOp, parse},
    repl::{ReplError, ReplSession},
    resource::{
        MAX_FRAMES, MAX_INTERNED_STRINGS, MAX_LOCALS, MAX_NATIVES, MAX_REGISTERS, MAX_UPVALUES, ResourceError,
    },
    tracer::{NoopTracer, StderrTracer, VmTracer},
    value::{NativeId, Value},
};
