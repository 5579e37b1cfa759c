//! Function prototypes: the immutable, compiled shape of one function body.
//!
//! A prototype is produced once by the compiler and never mutated again.
//! Closures are a runtime pairing of a prototype with captured upvalues;
//! see `heap.rs`.

use std::cell::Cell;
use std::rc::Rc;

use crate::intern::{Interns, StringId};
use crate::resource::ResourceError;
use crate::value::Value;

/// One constant-pool entry. A nested function literal gets a dedicated
/// `Proto` variant rather than being a `Value` itself, since an
/// uninstantiated prototype has no heap identity (only `OP_CLOSURE` gives
/// it one).
///
/// `Str` interns lazily and caches the result: the first `LOAD_CONST` of a
/// given string constant interns it (one stake, held for the prototype's
/// lifetime — prototypes are never freed, so this stake is never released;
/// a leaked intern stake per distinct string constant is accepted, not a
/// bug); every later `LOAD_CONST` of that index just copies the cached id
/// into a register, a transient write like any other, with no further
/// interning call and no refcount change.
#[derive(Debug)]
pub enum Constant {
    I32(i32),
    F32(f32),
    Bool(bool),
    None,
    Str(String, Cell<Option<StringId>>),
    Proto(Rc<FunctionProto>),
}

impl Constant {
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(text.into(), Cell::new(None))
    }

    pub fn resolve(&self, interns: &mut Interns) -> Result<Value, ResourceError> {
        Ok(match self {
            Constant::I32(i) => Value::I32(*i),
            Constant::F32(f) => Value::F32(*f),
            Constant::Bool(b) => Value::Bool(*b),
            Constant::None => Value::None,
            Constant::Str(text, cache) => {
                let id = match cache.get() {
                    Some(id) => id,
                    Option::None => {
                        let id = interns.intern(text)?;
                        cache.set(Some(id));
                        id
                    }
                };
                Value::Str(id)
            }
            Constant::Proto(_) => {
                unreachable!("a Proto constant is only ever read by OP_CLOSURE, never LOAD_CONST")
            }
        })
    }
}

/// One upvalue capture instruction baked into a prototype: either "capture
/// the enclosing frame's local at this slot" (`is_local = true`) or
/// "inherit the enclosing closure's upvalue at this index" (`is_local =
/// false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub is_local: bool,
    pub index: u8,
}

/// Compiled bytecode for one function (or the implicit top-level module
/// function). Immutable after the compiler finishes building it.
#[derive(Debug)]
pub struct FunctionProto {
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    pub arity: u8,
    pub upvalues: Vec<UpvalueDesc>,
    pub name: Option<String>,
    /// High-water mark of the compiler's register allocator for this
    /// prototype: the number of registers a frame for it needs. The VM
    /// uses this to bounds-check a callee's window against the flat
    /// register file before pushing a frame.
    pub register_count: u8,
}

impl FunctionProto {
    pub fn debug_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}
