//! Host-callable natives registered into every fresh [`Vm`], mirroring the
//! reference interpreter's `register_builtins` list (`builtins.c`): `print`,
//! `len`, `assert`, `type_of`, `str`, `parse_int`, `abs`, `sqrt`, `floor`.
//!
//! The exact set and per-type behavior of these natives isn't pinned down
//! anywhere else, so this module follows the reference interpreter's list
//! and behavior directly.

mod abs;
mod assert;
mod floor;
mod len;
mod parse_int;
mod print;
mod sqrt;
mod str_fn;
mod type_of;

use crate::bytecode::vm::Vm;
use crate::resource::ResourceError;

/// Registers every default native into `vm`'s native table. The CLI and
/// REPL call this once per `Vm`; embedders that want a bare VM with only
/// their own natives can skip it.
pub fn register_defaults(vm: &mut Vm) -> Result<(), ResourceError> {
    vm.register_native("print", print::print)?;
    vm.register_native("len", len::len)?;
    vm.register_native("assert", assert::assert_fn)?;
    vm.register_native("type_of", type_of::type_of)?;
    vm.register_native("str", str_fn::str_fn)?;
    vm.register_native("parse_int", parse_int::parse_int)?;
    vm.register_native("abs", abs::abs_fn)?;
    vm.register_native("sqrt", sqrt::sqrt_fn)?;
    vm.register_native("floor", floor::floor_fn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::io::CollectOutput;

    fn run_capture(vm: &mut Vm, source: &str) -> String {
        vm.set_output(Box::new(CollectOutput::new()));
        assert!(vm.compile(source), "compile failed for: {source}");
        assert!(vm.run(), "run failed for: {source}");
        vm.output_str().unwrap().to_string()
    }

    #[test]
    fn every_default_native_is_callable() {
        let mut vm = Vm::new();
        register_defaults(&mut vm).unwrap();
        let source = "print(len([1, 2, 3]))
print(type_of(1))
print(str(42))
print(parse_int(\"7\") + 1)
print(abs(-3))
print(floor(3.7))
assert(true)";
        assert_eq!(run_capture(&mut vm, source), "3\ni32\n42\n8\n3\n3\n");
    }
}
