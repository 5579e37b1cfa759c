use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `abs(x) -> x`, preserving `x`'s numeric tag. Grounded on `builtin_abs` in
/// `builtins.c`; anything else (including no argument) yields `0`.
pub fn abs_fn(_ctx: &mut NativeCtx, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::I32(i)) => Value::I32(i.wrapping_abs()),
        Some(Value::F32(f)) => Value::F32(f.abs()),
        _ => Value::I32(0),
    }
}
