use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `sqrt(x) -> f32`, widening an `i32` argument. Grounded on `builtin_sqrt`
/// in `builtins.c`; anything else (including no argument) yields `0.0`.
pub fn sqrt_fn(_ctx: &mut NativeCtx, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::I32(i)) => Value::F32((*i as f32).sqrt()),
        Some(Value::F32(f)) => Value::F32(f.sqrt()),
        _ => Value::F32(0.0),
    }
}
