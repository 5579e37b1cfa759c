//! Persistent REPL session support.
//!
//! `ReplSession` keeps one [`Vm`] alive across calls to `execute`, the same
//! shape as `mica`'s `main.c` `repl()` (one `VM*` for the whole session —
//! globals, closures, and native registrations persist from line to line),
//! reshaped into a library type that owns its VM rather than a function
//! that owns a local.

use std::fmt;

use crate::bytecode::CompileError;
use crate::bytecode::builder;
use crate::bytecode::vm::{RuntimeError, Vm};
use crate::parse;
use crate::resource::ResourceError;

/// A REPL-line failure, separated by pipeline stage so a caller (the CLI,
/// or an embedder's own UI) can react to parse/compile mistakes differently
/// from a runtime fault without string-matching a message.
///
/// This language has no exception mechanism, so there is no `Exception`
/// variant; resource-limit failures surface as `Runtime` since they are
/// themselves `RuntimeError` cases.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplError {
    Parse(Vec<CompileError>),
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(errors) | Self::Compile(errors) => {
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            Self::Runtime(error) => write!(f, "runtime error: {error}"),
        }
    }
}

impl std::error::Error for ReplError {}

/// One persistent interactive session. Each `execute` call compiles `line`
/// as a standalone program fragment and runs it against the same `Vm`,
/// exactly as spec.md §6 describes the REPL surface.
pub struct ReplSession {
    vm: Vm,
}

impl ReplSession {
    /// Builds a fresh session with the default native library registered,
    /// matching `mica`'s `main()` (`VM* vm = vm_new(); register_builtins(vm);`
    /// before handing control to `repl(vm)`).
    pub fn new() -> Result<Self, ResourceError> {
        let mut vm = Vm::new();
        crate::builtins::register_defaults(&mut vm)?;
        Ok(Self { vm })
    }

    /// Gives an embedder direct access to the underlying `Vm`, e.g. to call
    /// `set_global`/`get_global` between lines.
    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Compiles and runs one line. Globals, closures over them, and native
    /// registrations from earlier calls remain visible.
    pub fn execute(&mut self, line: &str) -> Result<(), ReplError> {
        let (program, parse_errors) = parse::parse(line);
        if !parse_errors.is_empty() {
            return Err(ReplError::Parse(parse_errors));
        }
        let (proto, compile_errors) = builder::compile(&program);
        if !compile_errors.is_empty() {
            return Err(ReplError::Compile(compile_errors));
        }
        self.vm.load(proto);
        self.vm.try_run().map_err(ReplError::Runtime)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn globals_persist_across_lines() {
        // `let` binds a local to the line's own (discarded) root frame; a
        // bare assignment to an undeclared name is what reaches the global
        // table and survives to the next line, matching a fresh program
        // each REPL line compiles into.
        let mut session = ReplSession::new().unwrap();
        session.vm().set_output(Box::new(crate::io::CollectOutput::new()));
        session.execute("x = 1").unwrap();
        session.execute("x = x + 41").unwrap();
        session.execute("print(x)").unwrap();
        assert_eq!(session.vm().output_str().unwrap(), "42\n");
    }

    #[test]
    fn parse_error_does_not_poison_the_session() {
        let mut session = ReplSession::new().unwrap();
        session.vm().set_output(Box::new(crate::io::CollectOutput::new()));
        assert!(matches!(session.execute("let ="), Err(ReplError::Parse(_) | ReplError::Compile(_))));
        session.execute("print(1)").unwrap();
        assert_eq!(session.vm().output_str().unwrap(), "1\n");
    }
}
