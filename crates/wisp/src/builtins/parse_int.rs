use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `parse_int(s) -> i32 | None`. `builtin_parse_int` in `builtins.c` is a
/// stub (comment: "would need to extract string data", always returns `0`);
/// this completes it by actually parsing the interned string's content,
/// yielding `None` on a non-string argument or a malformed literal rather
/// than silently returning `0`.
pub fn parse_int(ctx: &mut NativeCtx, args: &[Value]) -> Value {
    let Some(Value::Str(id)) = args.first() else {
        return Value::None;
    };
    match ctx.interns.get(*id).trim().parse::<i32>() {
        Ok(n) => Value::I32(n),
        Err(_) => Value::None,
    }
}
