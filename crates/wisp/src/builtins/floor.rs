use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `floor(x) -> i32`: rounds an `f32` down and converts, passes an `i32`
/// through unchanged. Grounded on `builtin_floor` in `builtins.c`; anything
/// else (including no argument) yields `0`.
pub fn floor_fn(_ctx: &mut NativeCtx, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::F32(f)) => Value::I32(f.floor() as i32),
        Some(Value::I32(i)) => Value::I32(*i),
        _ => Value::I32(0),
    }
}
