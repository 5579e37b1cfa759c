use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `str(x) -> string`. Grounded on `builtin_str` in `builtins.c`, with one
/// completion: the original's `switch` has no case for an already-`VAL_STRING`
/// argument and falls through to `"<object>"`; here a string argument passes
/// through unchanged; everything else matches the original case-by-case.
pub fn str_fn(ctx: &mut NativeCtx, args: &[Value]) -> Value {
    let text = match args.first() {
        None => String::new(),
        Some(Value::I32(i)) => i.to_string(),
        Some(Value::F32(f)) => f.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::None) => "None".to_string(),
        Some(Value::Str(id)) => ctx.interns.get(*id).to_string(),
        Some(_) => "<object>".to_string(),
    };
    match ctx.interns.intern(&text) {
        Ok(id) => Value::Str(id),
        Err(_) => Value::None,
    }
}
