use crate::bytecode::vm::NativeCtx;
use crate::heap::format_value;
use crate::value::Value;

/// `assert(cond, message?)`. On failure, prints a diagnostic and aborts the
/// host process with exit code 1 — the one native permitted to terminate
/// the run rather than return to the VM, matching `builtin_assert` in
/// `builtins.c` and spec.md §7's closing note.
pub fn assert_fn(ctx: &mut NativeCtx, args: &[Value]) -> Value {
    let Some(condition) = args.first() else {
        eprintln!("assertion failed");
        std::process::exit(1);
    };
    if !condition.is_truthy() {
        match args.get(1) {
            Some(message @ Value::Str(_)) => {
                eprintln!("assertion failed: {}", format_value(message, ctx.heap, ctx.interns));
            }
            _ => eprintln!("assertion failed"),
        }
        std::process::exit(1);
    }
    Value::None
}
