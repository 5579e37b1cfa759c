//! AST to bytecode: register allocation, scope/name resolution, closure
//! conversion.
//!
//! One [`Compiler`] compiles one whole program. Nested function bodies
//! (named `fn`s and `|params| ...` closures) push a fresh [`FnScope`] onto
//! an internal stack rather than chaining separate `Compiler` structs
//! through an `enclosing` pointer — the same information the source's
//! linked compiler instances carry, reshaped to fit the borrow checker.

use std::rc::Rc;

use crate::bytecode::{CompileError, Opcode};
use crate::function::{Constant, FunctionProto, UpvalueDesc};
use crate::parse::{AssignTarget, BinaryOp, Block, ClosureBody, Expr, Stmt, UnaryOp};
use crate::resource::{MAX_LOCALS, MAX_UPVALUES};

struct Local {
    name: String,
    depth: u32,
    is_captured: bool,
    is_mut: bool,
}

struct LoopCtx {
    break_patches: Vec<usize>,
    /// Local count when the loop body's scope was entered; used so `break`
    /// can close upvalues for every local declared inside the loop, not
    /// just the ones in its immediately enclosing block.
    loop_local_count: usize,
    start: usize,
}

struct FnScope {
    code: Vec<u8>,
    constants: Vec<Constant>,
    arity: u8,
    upvalues: Vec<UpvalueDesc>,
    name: Option<String>,
    locals: Vec<Local>,
    scope_depth: u32,
    register_count: u8,
    /// Peak value `register_count` ever reached; becomes
    /// `FunctionProto::register_count`, the frame-sizing bound the VM uses
    /// to bounds-check a callee's window against the flat register file.
    high_water: u8,
    loops: Vec<LoopCtx>,
}

impl FnScope {
    fn new(arity: u8, name: Option<String>) -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            arity,
            upvalues: Vec::new(),
            name,
            locals: Vec::new(),
            scope_depth: 0,
            register_count: 0,
            high_water: 0,
            loops: Vec::new(),
        }
    }

    fn add_constant(&mut self, constant: Constant) -> u8 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u8
    }
}

pub struct Compiler {
    scopes: Vec<FnScope>,
    errors: Vec<CompileError>,
}

/// Compiles a parsed program into the top-level module prototype. Returns
/// the prototype even on error so callers can decide how to react; check
/// `errors.is_empty()` before trusting the bytecode, matching
/// `compile(VM, source) -> bool`'s "false if any error was recorded" rule.
pub fn compile(program: &Block) -> (FunctionProto, Vec<CompileError>) {
    let mut compiler = Compiler {
        scopes: vec![FnScope::new(0, None)],
        errors: Vec::new(),
    };
    for stmt in program {
        compiler.compile_stmt(stmt);
    }
    compiler.emit_op(Opcode::Ret);
    compiler.emit_byte(0);
    let scope = compiler.scopes.pop().expect("module scope");
    let proto = FunctionProto {
        code: scope.code,
        constants: scope.constants,
        arity: scope.arity,
        upvalues: scope.upvalues,
        name: scope.name,
        register_count: scope.high_water,
    };
    (proto, compiler.errors)
}

impl Compiler {
    fn scope(&mut self) -> &mut FnScope {
        self.scopes.last_mut().expect("at least one scope")
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors.push(CompileError::new(line, message));
    }

    // --- emission ---

    fn emit_byte(&mut self, byte: u8) -> usize {
        let scope = self.scope();
        scope.code.push(byte);
        scope.code.len() - 1
    }

    fn emit_op(&mut self, op: Opcode) -> usize {
        self.emit_byte(op as u8)
    }

    /// Emits a jump opcode. `cond_reg` is `Some` for `JMP_IF`/`JMP_IF_NOT`
    /// (operand order `reg, s16`) and `None` for an unconditional `JMP`.
    /// Returns the patch site for [`Self::patch_jump`].
    fn emit_jump(&mut self, op: Opcode, cond_reg: Option<u8>) -> usize {
        self.emit_op(op);
        if let Some(reg) = cond_reg {
            self.emit_byte(reg);
        }
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.scope().code.len() - 2
    }

    fn patch_jump(&mut self, patch_at: usize) {
        let scope = self.scope();
        let offset = (scope.code.len() - (patch_at + 2)) as i16;
        let bytes = offset.to_be_bytes();
        scope.code[patch_at] = bytes[0];
        scope.code[patch_at + 1] = bytes[1];
    }

    fn emit_loop(&mut self, start: usize) {
        self.emit_op(Opcode::Jmp);
        let scope = self.scope();
        let offset = -((scope.code.len() + 2 - start) as i32);
        let bytes = (offset as i16).to_be_bytes();
        scope.code.push(bytes[0]);
        scope.code.push(bytes[1]);
    }

    fn add_constant(&mut self, constant: Constant) -> u8 {
        self.scope().add_constant(constant)
    }

    // --- registers ---

    fn alloc_register(&mut self) -> u8 {
        let scope = self.scope();
        let reg = scope.register_count;
        scope.register_count += 1;
        scope.high_water = scope.high_water.max(scope.register_count);
        reg
    }

    fn free_register(&mut self) {
        self.scope().register_count -= 1;
    }

    fn set_register_count(&mut self, count: u8) {
        self.scope().register_count = count;
    }

    // --- locals ---

    fn declare_local(&mut self, name: String, is_mut: bool, line: u32) {
        let scope = self.scope();
        if scope.locals.len() >= MAX_LOCALS {
            self.error(line, "too many locals in one function");
            return;
        }
        let depth = scope.scope_depth;
        self.scope().locals.push(Local {
            name,
            depth,
            is_captured: false,
            is_mut,
        });
    }

    fn resolve_local(&self, scope_index: usize, name: &str) -> Option<u8> {
        let scope = &self.scopes[scope_index];
        scope
            .locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|index| index as u8)
    }

    fn resolve_upvalue(&mut self, scope_index: usize, name: &str) -> Option<u8> {
        if scope_index == 0 {
            return None;
        }
        if let Some(local_slot) = self.resolve_local(scope_index - 1, name) {
            self.scopes[scope_index - 1].locals[local_slot as usize].is_captured = true;
            return self.add_upvalue(scope_index, true, local_slot);
        }
        let outer_upvalue = self.resolve_upvalue(scope_index - 1, name)?;
        self.add_upvalue(scope_index, false, outer_upvalue)
    }

    fn add_upvalue(&mut self, scope_index: usize, is_local: bool, index: u8) -> Option<u8> {
        let scope = &mut self.scopes[scope_index];
        if let Some(existing) = scope
            .upvalues
            .iter()
            .position(|desc| desc.is_local == is_local && desc.index == index)
        {
            return Some(existing as u8);
        }
        if scope.upvalues.len() >= MAX_UPVALUES {
            return None;
        }
        scope.upvalues.push(UpvalueDesc { is_local, index });
        Some((scope.upvalues.len() - 1) as u8)
    }

    fn begin_scope(&mut self) {
        self.scope().scope_depth += 1;
    }

    /// Pops locals whose depth exceeds the new scope depth, emitting
    /// `CLOSE_UPVAL` for each one that was captured.
    fn end_scope(&mut self) {
        let scope = self.scope();
        scope.scope_depth -= 1;
        let depth = scope.scope_depth;
        let mut to_close = Vec::new();
        while let Some(local) = scope.locals.last() {
            if local.depth <= depth {
                break;
            }
            let slot = scope.locals.len() - 1;
            if scope.locals[slot].is_captured {
                to_close.push(slot as u8);
            }
            scope.locals.pop();
        }
        let count_after = self.scope().locals.len() as u8;
        for slot in to_close {
            self.emit_op(Opcode::CloseUpval);
            self.emit_byte(slot);
        }
        self.set_register_count(count_after);
    }

    // --- statements ---

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, mutable, init, line } => self.compile_let(name, *mutable, init, *line),
            Stmt::Assign { target, value, line } => self.compile_assign(target, value, *line),
            Stmt::Expr(expr) => {
                self.compile_expr(expr);
                let base = self.scope().locals.len() as u8;
                self.set_register_count(base);
            }
            Stmt::Block(body) => {
                self.begin_scope();
                for stmt in body {
                    self.compile_stmt(stmt);
                }
                self.end_scope();
            }
            Stmt::Fn { name, params, body, line } => self.compile_fn(name, params, body, *line),
            Stmt::If { cond, then_branch, else_branch } => {
                self.compile_if(cond, then_branch, else_branch.as_ref())
            }
            Stmt::While { cond, body } => self.compile_while(cond, body),
            Stmt::For { var, iterable, body, line } => self.compile_for(var, iterable, body, *line),
            Stmt::Loop { body } => self.compile_loop(body),
            Stmt::Break { line } => self.compile_break(*line),
            Stmt::Return { value, line } => self.compile_return(value.as_ref(), *line),
        }
    }

    fn is_module_scope(&self) -> bool {
        self.scopes.len() == 1 && self.scopes[0].scope_depth == 0
    }

    fn compile_let(&mut self, name: &str, mutable: bool, init: &Expr, line: u32) {
        let slot = self.alloc_register();
        let val_reg = self.compile_expr(init);
        if val_reg != slot {
            self.emit_op(Opcode::Move);
            self.emit_byte(val_reg);
            self.emit_byte(slot);
        }
        self.set_register_count(slot + 1);
        self.declare_local(name.to_string(), mutable, line);
    }

    fn compile_fn(&mut self, name: &str, params: &[String], body: &Block, line: u32) {
        if self.is_module_scope() {
            let fn_reg = self.compile_function_value(Some(name.to_string()), params, &ClosureBody::Block(body.clone()), line);
            let name_const = self.add_constant(Constant::str(name));
            self.emit_op(Opcode::StoreGlobal);
            self.emit_byte(name_const);
            self.emit_byte(fn_reg);
            self.free_register();
        } else {
            // Declare the local before compiling the body so recursive
            // self-calls resolve by name.
            let slot = self.alloc_register();
            self.declare_local(name.to_string(), false, line);
            let fn_reg = self.compile_function_value(Some(name.to_string()), params, &ClosureBody::Block(body.clone()), line);
            if fn_reg != slot {
                self.emit_op(Opcode::Move);
                self.emit_byte(fn_reg);
                self.emit_byte(slot);
            }
            self.set_register_count(slot + 1);
        }
    }

    fn compile_if(&mut self, cond: &Expr, then_branch: &Block, else_branch: Option<&Block>) {
        let cond_reg = self.compile_expr(cond);
        self.free_register();
        let then_jump = self.emit_jump(Opcode::JmpIfNot, Some(cond_reg));
        self.begin_scope();
        for stmt in then_branch {
            self.compile_stmt(stmt);
        }
        self.end_scope();
        let else_jump = self.emit_jump(Opcode::Jmp, None);
        self.patch_jump(then_jump);
        if let Some(else_branch) = else_branch {
            self.begin_scope();
            for stmt in else_branch {
                self.compile_stmt(stmt);
            }
            self.end_scope();
        }
        self.patch_jump(else_jump);
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block) {
        let start = self.scope().code.len();
        let cond_reg = self.compile_expr(cond);
        self.free_register();
        let exit_jump = self.emit_jump(Opcode::JmpIfNot, Some(cond_reg));
        self.push_loop(start);
        self.begin_scope();
        for stmt in body {
            self.compile_stmt(stmt);
        }
        self.end_scope();
        self.emit_loop(start);
        self.patch_jump(exit_jump);
        self.pop_loop();
    }

    fn compile_for(&mut self, var: &str, iterable: &Expr, body: &Block, line: u32) {
        self.begin_scope();
        // Hidden `.iter` local holding the live iterator cursor.
        let iter_slot = self.alloc_register();
        let source_reg = self.compile_expr(iterable);
        self.emit_op(Opcode::IterNew);
        self.emit_byte(source_reg);
        self.emit_byte(iter_slot);
        self.set_register_count(iter_slot + 1);
        self.declare_local(".iter".to_string(), false, line);

        let start = self.scope().code.len();
        let has_next_reg = self.alloc_register();
        self.emit_op(Opcode::IterHasNext);
        self.emit_byte(iter_slot);
        self.emit_byte(has_next_reg);
        self.free_register();
        let exit_jump = self.emit_jump(Opcode::JmpIfNot, Some(has_next_reg));

        self.begin_scope();
        // Snapshot before `var` is declared: a `break` should close `var`'s
        // upvalue too if some closure in the body captured it.
        self.push_loop(start);
        let var_slot = self.alloc_register();
        self.emit_op(Opcode::IterNext);
        self.emit_byte(iter_slot);
        self.emit_byte(var_slot);
        self.declare_local(var.to_string(), false, line);
        for stmt in body {
            self.compile_stmt(stmt);
        }
        self.end_scope();

        self.emit_loop(start);
        self.patch_jump(exit_jump);
        self.pop_loop();
        self.end_scope();
    }

    fn compile_loop(&mut self, body: &Block) {
        let start = self.scope().code.len();
        self.push_loop(start);
        self.begin_scope();
        for stmt in body {
            self.compile_stmt(stmt);
        }
        self.end_scope();
        self.emit_loop(start);
        self.pop_loop();
    }

    fn push_loop(&mut self, start: usize) {
        let loop_local_count = self.scope().locals.len();
        self.scope().loops.push(LoopCtx {
            break_patches: Vec::new(),
            loop_local_count,
            start,
        });
    }

    fn pop_loop(&mut self) {
        let loop_ctx = self.scope().loops.pop().expect("matching push_loop");
        for patch in loop_ctx.break_patches {
            self.patch_jump(patch);
        }
    }

    fn compile_break(&mut self, line: u32) {
        let Some(loop_ctx) = self.scope().loops.last() else {
            self.error(line, "break outside of loop");
            return;
        };
        let loop_local_count = loop_ctx.loop_local_count;
        // Close every captured local introduced since the loop started,
        // across every scope the break unwinds through, before jumping.
        let to_close: Vec<u8> = self.scope().locals[loop_local_count..]
            .iter()
            .enumerate()
            .filter(|(_, local)| local.is_captured)
            .map(|(i, _)| (loop_local_count + i) as u8)
            .collect();
        for slot in to_close {
            self.emit_op(Opcode::CloseUpval);
            self.emit_byte(slot);
        }
        let patch = self.emit_jump(Opcode::Jmp, None);
        self.scope()
            .loops
            .last_mut()
            .expect("checked above")
            .break_patches
            .push(patch);
    }

    fn compile_return(&mut self, value: Option<&Expr>, _line: u32) {
        match value {
            Some(expr) => {
                let reg = self.compile_expr(expr);
                self.emit_op(Opcode::Ret);
                self.emit_byte(1);
                self.emit_byte(reg);
            }
            None => {
                self.emit_op(Opcode::Ret);
                self.emit_byte(0);
            }
        }
    }

    fn compile_assign(&mut self, target: &AssignTarget, value: &Expr, line: u32) {
        match target {
            AssignTarget::Ident(name) => {
                let val_reg = self.compile_expr(value);
                let scope_index = self.scopes.len() - 1;
                if let Some(slot) = self.resolve_local(scope_index, name) {
                    if !self.scopes[scope_index].locals[slot as usize].is_mut {
                        self.error(line, format!("cannot assign to immutable variable '{name}'"));
                    }
                    self.emit_op(Opcode::StoreLocal);
                    self.emit_byte(val_reg);
                    self.emit_byte(slot);
                } else if let Some(upvalue) = self.resolve_upvalue(scope_index, name) {
                    self.emit_op(Opcode::StoreUpval);
                    self.emit_byte(upvalue);
                    self.emit_byte(val_reg);
                } else {
                    let name_const = self.add_constant(Constant::str(name.clone()));
                    self.emit_op(Opcode::StoreGlobal);
                    self.emit_byte(name_const);
                    self.emit_byte(val_reg);
                }
                self.free_register();
            }
            AssignTarget::Index { base, index } => {
                let base_reg = self.compile_expr(base);
                let index_reg = self.compile_expr(index);
                let val_reg = self.compile_expr(value);
                self.emit_op(Opcode::ArraySet);
                self.emit_byte(base_reg);
                self.emit_byte(index_reg);
                self.emit_byte(val_reg);
                self.free_register();
                self.free_register();
                self.free_register();
            }
        }
    }

    // --- expressions ---

    fn compile_expr(&mut self, expr: &Expr) -> u8 {
        match expr {
            Expr::Int(value) => self.compile_load_const(Constant::I32(*value)),
            Expr::Float(value) => self.compile_load_const(Constant::F32(*value)),
            Expr::Bool(value) => self.compile_load_const(Constant::Bool(*value)),
            Expr::NoneLit => self.compile_load_const(Constant::None),
            Expr::Str(value) => self.compile_load_const(Constant::str(value.clone())),
            Expr::Ident(name, line) => self.compile_ident(name, *line),
            Expr::Array(elements) => self.compile_array(elements),
            Expr::Closure { params, body, line } => self.compile_function_value(None, params, body, *line),
            Expr::Unary { op, expr, line } => self.compile_unary(*op, expr, *line),
            Expr::Binary { op, lhs, rhs, line } => self.compile_binary(*op, lhs, rhs, *line),
            Expr::Call { callee, args, line } => self.compile_call(callee, args, *line),
            Expr::Index { base, index, line } => self.compile_index(base, index, *line),
            Expr::IterChain { source, methods, line } => {
                if methods.is_empty() {
                    // A chain with no methods lowers to its source expression,
                    // per spec §9: "the compiler must emit only the source
                    // expression". This covers both a bare `expr.iter()` used
                    // as a value and the iterable half of `for x in
                    // expr.iter() { .. }`, which `compile_for` also routes
                    // through here.
                    self.compile_expr(source)
                } else {
                    self.error(
                        *line,
                        format!(
                            "iterator chain method '{}' is not supported; only 'for x in expr.iter() {{ .. }}' is lowered",
                            methods[0].name
                        ),
                    );
                    self.compile_load_const(Constant::None)
                }
            }
        }
    }

    fn compile_load_const(&mut self, constant: Constant) -> u8 {
        let index = self.add_constant(constant);
        let dst = self.alloc_register();
        self.emit_op(Opcode::LoadConst);
        self.emit_byte(index);
        self.emit_byte(dst);
        dst
    }

    fn compile_ident(&mut self, name: &str, line: u32) -> u8 {
        let scope_index = self.scopes.len() - 1;
        if let Some(slot) = self.resolve_local(scope_index, name) {
            let dst = self.alloc_register();
            self.emit_op(Opcode::LoadLocal);
            self.emit_byte(slot);
            self.emit_byte(dst);
            return dst;
        }
        if let Some(upvalue) = self.resolve_upvalue(scope_index, name) {
            let dst = self.alloc_register();
            self.emit_op(Opcode::LoadUpval);
            self.emit_byte(upvalue);
            self.emit_byte(dst);
            return dst;
        }
        let _ = line;
        let name_const = self.add_constant(Constant::str(name));
        let dst = self.alloc_register();
        self.emit_op(Opcode::LoadGlobal);
        self.emit_byte(name_const);
        self.emit_byte(dst);
        dst
    }

    fn compile_array(&mut self, elements: &[Expr]) -> u8 {
        let dst = self.alloc_register();
        self.emit_op(Opcode::ArrayNew);
        self.emit_byte(dst);
        for element in elements {
            let value_reg = self.compile_expr(element);
            self.emit_op(Opcode::ArrayPush);
            self.emit_byte(dst);
            self.emit_byte(value_reg);
            self.free_register();
        }
        dst
    }

    fn compile_unary(&mut self, op: UnaryOp, expr: &Expr, _line: u32) -> u8 {
        let src = self.compile_expr(expr);
        let dst = self.alloc_register();
        match op {
            UnaryOp::Neg => self.emit_op(Opcode::Neg),
        };
        self.emit_byte(src);
        self.emit_byte(dst);
        self.free_register();
        self.free_register();
        self.set_register_count(dst + 1);
        dst
    }

    fn compile_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, _line: u32) -> u8 {
        let lhs_reg = self.compile_expr(lhs);
        let rhs_reg = self.compile_expr(rhs);
        self.free_register();
        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Ge => Opcode::Ge,
        };
        self.emit_op(opcode);
        self.emit_byte(lhs_reg);
        self.emit_byte(rhs_reg);
        self.emit_byte(lhs_reg);
        lhs_reg
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], _line: u32) -> u8 {
        let func_reg = self.compile_expr(callee);
        let mut arg_regs = Vec::with_capacity(args.len());
        for arg in args {
            arg_regs.push(self.compile_expr(arg));
        }
        for _ in &arg_regs {
            self.free_register();
        }
        for (i, &reg) in arg_regs.iter().enumerate() {
            let target = func_reg + 1 + i as u8;
            if reg != target {
                self.emit_op(Opcode::Move);
                self.emit_byte(reg);
                self.emit_byte(target);
            }
        }
        self.set_register_count(func_reg + 1 + arg_regs.len() as u8);
        self.emit_op(Opcode::Call);
        self.emit_byte(func_reg);
        self.emit_byte(arg_regs.len() as u8);
        self.emit_byte(func_reg);
        self.set_register_count(func_reg + 1);
        func_reg
    }

    fn compile_index(&mut self, base: &Expr, index: &Expr, _line: u32) -> u8 {
        let base_reg = self.compile_expr(base);
        let index_reg = self.compile_expr(index);
        self.free_register();
        self.emit_op(Opcode::ArrayGet);
        self.emit_byte(base_reg);
        self.emit_byte(index_reg);
        self.emit_byte(base_reg);
        base_reg
    }

    /// Compiles a nested function body (named `fn` or `|params| ...`
    /// closure) into its own prototype, then emits `CLOSURE` in the
    /// enclosing scope to materialize it at runtime.
    fn compile_function_value(
        &mut self,
        name: Option<String>,
        params: &[String],
        body: &ClosureBody,
        line: u32,
    ) -> u8 {
        self.scopes.push(FnScope::new(params.len() as u8, name));
        for param in params {
            self.declare_local(param.clone(), true, line);
            self.alloc_register();
        }
        match body {
            ClosureBody::Block(stmts) => {
                for stmt in stmts {
                    self.compile_stmt(stmt);
                }
                self.emit_op(Opcode::Ret);
                self.emit_byte(0);
            }
            ClosureBody::Expr(expr) => {
                let reg = self.compile_expr(expr);
                self.emit_op(Opcode::Ret);
                self.emit_byte(1);
                self.emit_byte(reg);
            }
        }
        let inner = self.scopes.pop().expect("pushed above");
        let proto = FunctionProto {
            code: inner.code,
            constants: inner.constants,
            arity: inner.arity,
            upvalues: inner.upvalues.clone(),
            name: inner.name,
            register_count: inner.high_water,
        };
        let proto_index = self.add_constant(Constant::Proto(Rc::new(proto)));
        let dst = self.alloc_register();
        self.emit_op(Opcode::Closure);
        self.emit_byte(proto_index);
        self.emit_byte(dst);
        self.emit_byte(inner.upvalues.len() as u8);
        for desc in &inner.upvalues {
            self.emit_byte(u8::from(desc.is_local));
            self.emit_byte(desc.index);
        }
        dst
    }
}
