//! Array and iterator operations.
//!
//! Reading an element (`array_get`, `iter_next`) copies the `Value` out
//! without touching refcounts, the same "register write is transient"
//! rule that covers `MOVE`/`LOAD_LOCAL` (spec §5/§9) — locals are not one
//! of the three durable locations (global slot, array element, upvalue
//! storage) that must retain on store. Writing an element (`array_set`,
//! `array_push`) does retain the incoming value and release whatever it
//! replaces, because an array slot *is* one of those durable locations.

use super::RuntimeError;
use crate::heap::{ArrayObj, Heap, HeapData, HeapId, IteratorObj};
use crate::intern::Interns;
use crate::value::Value;

fn array_mut<'h>(heap: &'h mut Heap, id: HeapId) -> &'h mut ArrayObj {
    match heap.get_mut(id) {
        HeapData::Array(array) => array,
        _ => unreachable!("HeapId tagged Value::Array must point at an ArrayObj"),
    }
}

fn array_ref(heap: &Heap, id: HeapId) -> &ArrayObj {
    match heap.get(id) {
        HeapData::Array(array) => array,
        _ => unreachable!("HeapId tagged Value::Array must point at an ArrayObj"),
    }
}

pub fn new_array(heap: &mut Heap) -> HeapId {
    heap.allocate(HeapData::Array(ArrayObj { elements: Vec::new() }))
}

pub fn push(heap: &mut Heap, interns: &mut Interns, array: HeapId, value: Value) {
    heap.retain_value(value, interns);
    array_mut(heap, array).elements.push(value);
}

pub fn len(heap: &Heap, array: HeapId) -> i32 {
    array_ref(heap, array).elements.len() as i32
}

fn checked_index(length: usize, index: Value) -> Result<usize, RuntimeError> {
    let Value::I32(index) = index else {
        return Err(RuntimeError::TypeError {
            op: "array index",
            type_name: index.type_name(),
        });
    };
    if index < 0 || index as usize >= length {
        return Err(RuntimeError::IndexOutOfBounds {
            index,
            length,
        });
    }
    Ok(index as usize)
}

pub fn get(heap: &Heap, array: HeapId, index: Value) -> Result<Value, RuntimeError> {
    let array = array_ref(heap, array);
    let index = checked_index(array.elements.len(), index)?;
    Ok(array.elements[index])
}

pub fn set(
    heap: &mut Heap,
    interns: &mut Interns,
    array: HeapId,
    index: Value,
    value: Value,
) -> Result<(), RuntimeError> {
    let length = array_ref(heap, array).elements.len();
    let index = checked_index(length, index)?;
    heap.retain_value(value, interns);
    let old = {
        let array = array_mut(heap, array);
        std::mem::replace(&mut array.elements[index], value)
    };
    heap.release_value(old, interns);
    Ok(())
}

/// Creates a new iterator over `source`. Only arrays are iterable — the
/// only iterable the source language has (spec §3).
pub fn iter_new(heap: &mut Heap, source: Value) -> Result<HeapId, RuntimeError> {
    let Value::Array(source_id) = source else {
        return Err(RuntimeError::NotIterator {
            type_name: source.type_name(),
        });
    };
    heap.retain(source_id);
    Ok(heap.allocate(HeapData::Iterator(IteratorObj {
        source: source_id,
        index: 0,
    })))
}

fn iterator_ref(heap: &Heap, id: HeapId) -> &IteratorObj {
    match heap.get(id) {
        HeapData::Iterator(iter) => iter,
        _ => unreachable!("HeapId tagged Value::Iter must point at an IteratorObj"),
    }
}

pub fn iter_has_next(heap: &Heap, iter: HeapId) -> bool {
    let iter = iterator_ref(heap, iter);
    iter.index < array_ref(heap, iter.source).elements.len()
}

/// Advances the cursor, returning the element it passed or `Value::None`
/// once exhausted (mirrors the source's `iter_next` behavior at the end).
pub fn iter_next(heap: &mut Heap, iter: HeapId) -> Value {
    let (source, index) = {
        let iter = iterator_ref(heap, iter);
        (iter.source, iter.index)
    };
    let elements_len = array_ref(heap, source).elements.len();
    if index >= elements_len {
        return Value::None;
    }
    let value = array_ref(heap, source).elements[index];
    match heap.get_mut(iter) {
        HeapData::Iterator(iter) => iter.index += 1,
        _ => unreachable!(),
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::intern::Interns;

    #[test]
    fn push_then_get_roundtrips() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let array = new_array(&mut heap);
        push(&mut heap, &mut interns, array, Value::I32(10));
        push(&mut heap, &mut interns, array, Value::I32(20));
        assert_eq!(len(&heap, array), 2);
        assert!(matches!(get(&heap, array, Value::I32(0)).unwrap(), Value::I32(10)));
        assert!(matches!(get(&heap, array, Value::I32(2)), Err(RuntimeError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn iterator_walks_array_then_reports_exhausted() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let array = new_array(&mut heap);
        push(&mut heap, &mut interns, array, Value::I32(1));
        push(&mut heap, &mut interns, array, Value::I32(2));
        let iter = iter_new(&mut heap, Value::Array(array)).unwrap();
        assert!(iter_has_next(&heap, iter));
        assert!(matches!(iter_next(&mut heap, iter), Value::I32(1)));
        assert!(iter_has_next(&heap, iter));
        assert!(matches!(iter_next(&mut heap, iter), Value::I32(2)));
        assert!(!iter_has_next(&heap, iter));
    }
}
