use crate::bytecode::vm::NativeCtx;
use crate::heap::HeapData;
use crate::value::Value;

/// `len(array) -> i32`. Any other argument (including no argument at all)
/// yields `0`, matching `builtin_len` in `builtins.c`.
pub fn len(ctx: &mut NativeCtx, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Array(id)) => match ctx.heap.get(*id) {
            HeapData::Array(array) => Value::I32(array.elements.len() as i32),
            _ => unreachable!("Value::Array heap id must point at an ArrayObj"),
        },
        _ => Value::I32(0),
    }
}
