//! The reference-counted heap arena.
//!
//! `Array`, `Closure`, `Iterator`, and `Upvalue` objects all live here,
//! indexed by [`HeapId`]. A slot's `refcount` field is bumped by
//! [`Heap::retain`] and dropped by [`Heap::release`]; reaching zero frees
//! the slot's payload (recursively releasing anything it owned) and pushes
//! the slot onto a free list for reuse, exactly like `ouros`'s `Heap<T>`
//! arena, reduced to a plain `usize` counter since this VM is
//! single-threaded (no `AtomicUsize` needed).

use std::rc::Rc;

use crate::function::FunctionProto;
use crate::intern::Interns;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

#[derive(Debug)]
pub struct ArrayObj {
    pub elements: Vec<Value>,
}

#[derive(Debug)]
pub struct ClosureObj {
    pub proto: Rc<FunctionProto>,
    pub upvalues: Vec<HeapId>,
}

#[derive(Debug)]
pub struct IteratorObj {
    pub source: HeapId,
    pub index: usize,
}

#[derive(Debug)]
pub enum UpvalueState {
    /// Points at an absolute slot in the VM's flat register file.
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct UpvalueObj {
    pub state: UpvalueState,
}

#[derive(Debug)]
pub enum HeapData {
    Array(ArrayObj),
    Closure(ClosureObj),
    Iterator(IteratorObj),
    Upvalue(UpvalueObj),
}

struct Entry {
    refcount: usize,
    data: HeapData,
}

/// The VM's object arena. Generation-free: a `HeapId` reused after a slot
/// is freed and reallocated is indistinguishable from the original at the
/// type level, matching the source interpreter's raw-pointer-reuse
/// behavior (a value must never be read through a stale id after release —
/// the VM upholds that by construction, never by a runtime check here).
#[derive(Default)]
pub struct Heap {
    entries: Vec<Option<Entry>>,
    free_list: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let entry = Entry { refcount: 1, data };
        if let Some(index) = self.free_list.pop() {
            self.entries[index as usize] = Some(entry);
            HeapId(index)
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Some(entry));
            HeapId(index)
        }
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entries[id.0 as usize]
            .as_ref()
            .expect("heap id read after release")
            .data
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entries[id.0 as usize]
            .as_mut()
            .expect("heap id read after release")
            .data
    }

    pub fn retain(&mut self, id: HeapId) {
        self.entries[id.0 as usize]
            .as_mut()
            .expect("retain of released heap id")
            .refcount += 1;
    }

    /// Retains `value` if it is heap- or string-allocated; a no-op for
    /// immediates. Used uniformly at every durable storage boundary
    /// (globals, array slots, upvalue slots) — anywhere a value outlives the
    /// register write that produced it.
    pub fn retain_value(&mut self, value: Value, interns: &mut Interns) {
        if let Some(id) = value.heap_id() {
            self.retain(id);
        } else if let Some(s) = value.string_id() {
            interns.retain(s);
        }
    }

    /// Releases `value`'s heap allocation, if any, recursively releasing
    /// anything it exclusively owned (array elements, closure upvalues).
    pub fn release_value(&mut self, value: Value, interns: &mut Interns) {
        if let Some(id) = value.heap_id() {
            self.release(id, interns);
        } else if let Some(s) = value.string_id() {
            interns.release(s);
        }
    }

    pub fn release(&mut self, id: HeapId, interns: &mut Interns) {
        let refcount = {
            let entry = self.entries[id.0 as usize]
                .as_mut()
                .expect("double release of heap id");
            entry.refcount -= 1;
            entry.refcount
        };
        if refcount != 0 {
            return;
        }
        let entry = self.entries[id.0 as usize]
            .take()
            .expect("freed entry vanished");
        self.free_list.push(id.0);
        match entry.data {
            HeapData::Array(array) => {
                for element in array.elements {
                    self.release_value(element, interns);
                }
            }
            HeapData::Closure(closure) => {
                for upvalue in closure.upvalues {
                    self.release(upvalue, interns);
                }
            }
            HeapData::Iterator(iter) => {
                self.release(iter.source, interns);
            }
            HeapData::Upvalue(upvalue) => {
                if let UpvalueState::Closed(value) = upvalue.state {
                    self.release_value(value, interns);
                }
            }
        }
    }

    pub fn refcount(&self, id: HeapId) -> usize {
        self.entries[id.0 as usize]
            .as_ref()
            .map_or(0, |entry| entry.refcount)
    }
}

/// Formats a value the way the guest-visible `print`/`str` builtins do:
/// arrays recurse into their elements, strings print their content, and
/// closures/natives print an opaque placeholder (the source interpreter
/// never exposes function identity through printing).
pub fn format_value(value: &Value, heap: &Heap, interns: &Interns) -> String {
    match value {
        Value::I32(_) | Value::F32(_) | Value::Bool(_) | Value::None => value.to_string(),
        Value::Str(id) => interns.get(*id).to_string(),
        Value::Array(id) => {
            let HeapData::Array(array) = heap.get(*id) else {
                unreachable!("Value::Array heap id must point at an ArrayObj")
            };
            let rendered: Vec<String> = array
                .elements
                .iter()
                .map(|element| format_value(element, heap, interns))
                .collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Closure(_) | Value::Native(_) => "<function>".to_string(),
        Value::Iter(_) => "<iterator>".to_string(),
    }
}
