//! Bytecode: the opcode set and the compile-time error type shared by the
//! compiler (`builder.rs`) and the VM (`vm/`).

pub mod builder;
pub mod vm;

use std::fmt;

/// One opcode byte. Operand layout is documented per-variant in the
/// compiler and VM, not here, to keep the two in one place each rather than
/// duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    LoadConst,
    LoadLocal,
    StoreLocal,
    Move,
    LoadGlobal,
    StoreGlobal,
    LoadUpval,
    StoreUpval,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Jmp,
    JmpIf,
    JmpIfNot,
    Ret,
    Call,
    Closure,
    CloseUpval,
    ArrayNew,
    ArrayGet,
    ArraySet,
    ArrayLen,
    ArrayPush,
    IterNew,
    IterNext,
    IterHasNext,
}

impl Opcode {
    /// Decodes a byte written by `builder.rs`'s `emit_op`. Every opcode
    /// position in compiled bytecode holds a valid `Opcode as u8`, so this
    /// never needs to report failure to its caller.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Opcode::Nop,
            1 => Opcode::LoadConst,
            2 => Opcode::LoadLocal,
            3 => Opcode::StoreLocal,
            4 => Opcode::Move,
            5 => Opcode::LoadGlobal,
            6 => Opcode::StoreGlobal,
            7 => Opcode::LoadUpval,
            8 => Opcode::StoreUpval,
            9 => Opcode::Add,
            10 => Opcode::Sub,
            11 => Opcode::Mul,
            12 => Opcode::Div,
            13 => Opcode::Mod,
            14 => Opcode::Neg,
            15 => Opcode::Eq,
            16 => Opcode::Ne,
            17 => Opcode::Lt,
            18 => Opcode::Le,
            19 => Opcode::Gt,
            20 => Opcode::Ge,
            21 => Opcode::Jmp,
            22 => Opcode::JmpIf,
            23 => Opcode::JmpIfNot,
            24 => Opcode::Ret,
            25 => Opcode::Call,
            26 => Opcode::Closure,
            27 => Opcode::CloseUpval,
            28 => Opcode::ArrayNew,
            29 => Opcode::ArrayGet,
            30 => Opcode::ArraySet,
            31 => Opcode::ArrayLen,
            32 => Opcode::ArrayPush,
            33 => Opcode::IterNew,
            34 => Opcode::IterNext,
            35 => Opcode::IterHasNext,
            other => unreachable!("invalid opcode byte {other} in compiled bytecode"),
        }
    }
}

/// A compile-time (lex/parse/compile) diagnostic: `[line L] error [at
/// 'lexeme']: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub at: Option<String>,
    pub message: String,
}

impl CompileError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            at: None,
            message: message.into(),
        }
    }

    pub fn at(line: u32, lexeme: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line,
            at: Some(lexeme.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            Some(lexeme) => write!(f, "[line {}] error at '{}': {}", self.line, lexeme, self.message),
            None => write!(f, "[line {}] error: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for CompileError {}
