//! `CALL`/`CLOSURE`/`RET` and the upvalue open/close lifecycle.
//!
//! Grounded on the reference interpreter's `vm.c` `capture_upvalue` /
//! `close_upvalues` / the `OP_CALL` and `OP_CLOSURE` cases: a closure's
//! local capture walks the open-upvalue list (kept sorted by descending
//! register address) for an existing entry before allocating a new one, an
//! upvalue capture of an enclosing *upvalue* (not local) just copies the
//! enclosing closure's upvalue id, and closing walks from the top of the
//! list while entries sit at or above the threshold register.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{Frame, NativeCtx, RuntimeError, Vm};
use crate::function::{Constant, FunctionProto};
use crate::heap::{ClosureObj, HeapData, HeapId, UpvalueObj, UpvalueState};
use crate::resource::{MAX_FRAMES, MAX_REGISTERS, ResourceError};
use crate::tracer::VmTracer;
use crate::value::Value;

impl Vm {
    /// Finds or creates the upvalue object for the live local at absolute
    /// register `register`, returning a retained stake the caller (always a
    /// freshly built closure) now owns. A brand-new upvalue also gets one
    /// stake held by `open_upvalues` itself, released when it closes.
    pub(super) fn capture_upvalue(&mut self, register: usize) -> HeapId {
        let existing = self.open_upvalues.iter().find(|&&id| {
            matches!(
                self.heap.get(id),
                HeapData::Upvalue(u) if matches!(u.state, UpvalueState::Open(r) if r == register)
            )
        });
        if let Some(&id) = existing {
            self.heap.retain(id);
            return id;
        }
        let id = self.heap.allocate(HeapData::Upvalue(UpvalueObj { state: UpvalueState::Open(register) }));
        let insert_at = self
            .open_upvalues
            .iter()
            .position(|&other| {
                matches!(
                    self.heap.get(other),
                    HeapData::Upvalue(u) if matches!(u.state, UpvalueState::Open(r) if r < register)
                )
            })
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(insert_at, id);
        self.heap.retain(id);
        id
    }

    /// Closes every open upvalue at or above `from_register`, copying each
    /// one's current register value into its own inline slot. One-way:
    /// once removed from `open_upvalues` an entry is never reopened.
    pub(super) fn close_upvalues_from(&mut self, from_register: usize) {
        while let Some(&id) = self.open_upvalues.first() {
            let register = match self.heap.get(id) {
                HeapData::Upvalue(u) => match u.state {
                    UpvalueState::Open(r) => r,
                    UpvalueState::Closed(_) => unreachable!("closed upvalues are removed from the open list"),
                },
                _ => unreachable!("open_upvalues only ever holds Upvalue ids"),
            };
            if register < from_register {
                break;
            }
            self.open_upvalues.remove(0);
            let value = self.registers[register];
            self.heap.retain_value(value, &mut self.interns);
            match self.heap.get_mut(id) {
                HeapData::Upvalue(u) => u.state = UpvalueState::Closed(value),
                _ => unreachable!(),
            }
            self.heap.release(id, &mut self.interns);
        }
    }

    pub(super) fn read_upvalue(&self, closure_id: HeapId, index: u8) -> Value {
        let up_id = match self.heap.get(closure_id) {
            HeapData::Closure(c) => c.upvalues[usize::from(index)],
            _ => unreachable!("Frame::closure always points at a ClosureObj"),
        };
        match self.heap.get(up_id) {
            HeapData::Upvalue(u) => match u.state {
                UpvalueState::Open(register) => self.registers[register],
                UpvalueState::Closed(value) => value,
            },
            _ => unreachable!("a closure's upvalues always point at UpvalueObjs"),
        }
    }

    pub(super) fn write_upvalue(&mut self, closure_id: HeapId, index: u8, value: Value) {
        let up_id = match self.heap.get(closure_id) {
            HeapData::Closure(c) => c.upvalues[usize::from(index)],
            _ => unreachable!(),
        };
        let open_register = match self.heap.get(up_id) {
            HeapData::Upvalue(u) => match u.state {
                UpvalueState::Open(r) => Some(r),
                UpvalueState::Closed(_) => None,
            },
            _ => unreachable!(),
        };
        if let Some(register) = open_register {
            self.registers[register] = value;
            return;
        }
        self.heap.retain_value(value, &mut self.interns);
        let old = match self.heap.get_mut(up_id) {
            HeapData::Upvalue(u) => match &mut u.state {
                UpvalueState::Closed(slot) => std::mem::replace(slot, value),
                UpvalueState::Open(_) => unreachable!(),
            },
            _ => unreachable!(),
        };
        self.heap.release_value(old, &mut self.interns);
    }

    /// Builds a new closure from the prototype at constant index
    /// `const_index`, resolving each upvalue descriptor against either the
    /// current frame's registers (`is_local`) or the enclosing closure's own
    /// upvalue list.
    pub(super) fn make_closure(
        &mut self,
        proto: &FunctionProto,
        const_index: u8,
        base: usize,
        enclosing_closure: HeapId,
        descriptors: &[(bool, u8)],
    ) -> HeapId {
        let Constant::Proto(inner_proto) = &proto.constants[usize::from(const_index)] else {
            unreachable!("CLOSURE's operand constant is always a Proto")
        };
        let inner_proto = Rc::clone(inner_proto);
        let mut upvalues = Vec::with_capacity(descriptors.len());
        for &(is_local, index) in descriptors {
            let id = if is_local {
                self.capture_upvalue(base + usize::from(index))
            } else {
                let id = match self.heap.get(enclosing_closure) {
                    HeapData::Closure(c) => c.upvalues[usize::from(index)],
                    _ => unreachable!(),
                };
                self.heap.retain(id);
                id
            };
            upvalues.push(id);
        }
        self.heap.allocate(HeapData::Closure(ClosureObj { proto: inner_proto, upvalues }))
    }

    /// `CALL`: dispatches to a native (runs to completion immediately) or
    /// pushes a new frame for a closure. Arguments already sit in the
    /// registers immediately following the callee register — the compiler
    /// guarantees this — so a closure call needs no argument copy, only a
    /// bounds check against the flat register file and the frame depth cap.
    pub(super) fn do_call(
        &mut self,
        base: usize,
        func_reg: u8,
        nargs: u8,
        dst: u8,
        tracer: &mut impl VmTracer,
    ) -> Result<(), RuntimeError> {
        let callee = self.registers[base + usize::from(func_reg)];
        match callee {
            Value::Native(native_id) => {
                let (&name_id, &native_fn) = self
                    .natives
                    .get_index(usize::from(native_id))
                    .expect("Value::Native only ever holds a valid natives index");
                tracer.on_call(Some(self.interns.get(name_id)), self.frames.len());
                let arg_start = base + usize::from(func_reg) + 1;
                // Most calls pass a handful of arguments; `SmallVec` keeps that
                // common case off the heap.
                let args: SmallVec<[Value; 4]> =
                    self.registers[arg_start..arg_start + usize::from(nargs)].iter().copied().collect();
                let mut ctx = NativeCtx { heap: &mut self.heap, interns: &mut self.interns, out: &mut *self.out };
                let result = native_fn(&mut ctx, &args);
                self.registers[base + usize::from(dst)] = result;
                Ok(())
            }
            Value::Closure(closure_id) => {
                if self.frames.len() >= MAX_FRAMES {
                    return Err(ResourceError::TooManyFrames.into());
                }
                let proto = self.proto_of(closure_id);
                let new_base = base + usize::from(func_reg) + 1;
                if new_base + usize::from(proto.register_count) > MAX_REGISTERS {
                    return Err(ResourceError::RegisterFileExhausted.into());
                }
                for slot in &mut self.registers[new_base + usize::from(nargs)..new_base + usize::from(proto.register_count)] {
                    *slot = Value::None;
                }
                tracer.on_call(proto.name.as_deref(), self.frames.len());
                self.frames.push(Frame {
                    closure: closure_id,
                    ip: 0,
                    base: new_base,
                    return_register: base + usize::from(dst),
                });
                Ok(())
            }
            other => Err(RuntimeError::NotCallable { type_name: other.type_name() }),
        }
    }
}
