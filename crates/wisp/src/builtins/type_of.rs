use crate::bytecode::vm::NativeCtx;
use crate::value::Value;

/// `type_of(x) -> string`. Grounded on `builtin_type_of` in `builtins.c`;
/// no argument reports `"none"`, matching the source's own default.
pub fn type_of(ctx: &mut NativeCtx, args: &[Value]) -> Value {
    let name = args.first().map_or("none", Value::type_name);
    match ctx.interns.intern(name) {
        Ok(id) => Value::Str(id),
        Err(_) => Value::None,
    }
}
