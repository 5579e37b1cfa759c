//! Zero-cost VM instrumentation.
//!
//! [`Vm::run`](crate::bytecode::vm::Vm::run) is generic over a [`VmTracer`]
//! so a build that doesn't care about tracing pays nothing for it: with
//! [`NoopTracer`] every hook is an empty `#[inline(always)]` function that
//! the optimizer removes entirely. [`StderrTracer`] is a simple
//! implementation for debugging a run from the command line.

pub trait VmTracer {
    fn on_instruction(&mut self, ip: usize, opcode: u8, frame_depth: usize) {
        let _ = (ip, opcode, frame_depth);
    }

    fn on_call(&mut self, name: Option<&str>, depth: usize) {
        let _ = (name, depth);
    }

    fn on_return(&mut self, depth: usize) {
        let _ = depth;
    }

    fn on_make_closure(&mut self, upvalue_count: usize) {
        let _ = upvalue_count;
    }

    fn on_upvalue_close(&mut self, register: usize) {
        let _ = register;
    }
}

/// Default tracer: every hook is inlined away.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints a one-line trace of every hook to stderr. Intended for manual
/// debugging, not for production use.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, opcode: u8, frame_depth: usize) {
        eprintln!("  ip={ip:04} op={opcode:02x} depth={frame_depth}");
    }

    fn on_call(&mut self, name: Option<&str>, depth: usize) {
        eprintln!("call {} depth={depth}", name.unwrap_or("<closure>"));
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("return depth={depth}");
    }

    fn on_make_closure(&mut self, upvalue_count: usize) {
        eprintln!("make_closure upvalues={upvalue_count}");
    }

    fn on_upvalue_close(&mut self, register: usize) {
        eprintln!("close_upvalue register={register}");
    }
}
