//! Recursive-descent, Pratt-precedence parser.
//!
//! Precedence ladder: `ASSIGNMENT < OR < AND < EQUALITY < COMPARISON < TERM
//! < FACTOR < UNARY < CALL < PRIMARY`. Only equality, comparison, term, and
//! factor levels are wired to an operator; `or`/`and` are reserved slots in
//! the ladder with no lexical operator feeding them (matching the source
//! language, which has no `or`/`and` keywords or operators at all).

use crate::bytecode::CompileError;
use crate::lexer::{Lexer, Token, TokenKind};

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone)]
pub enum ClosureBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Debug, Clone)]
pub struct IterMethod {
    pub name: String,
    pub line: u32,
    /// Argument closure, e.g. the `|x| ...` in `.map(|x| ...)`.
    pub arg: Option<Box<Expr>>,
    /// `fold`'s seed argument. Parsed so the AST shape matches a complete
    /// grammar; the compiler rejects any iterator chain method (including
    /// `fold`) at compile time rather than silently dropping this seed.
    pub seed: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Bool(bool),
    NoneLit,
    Str(String),
    Ident(String, u32),
    Array(Vec<Expr>),
    Closure {
        params: Vec<String>,
        body: ClosureBody,
        line: u32,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: u32,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        line: u32,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        line: u32,
    },
    IterChain {
        source: Box<Expr>,
        methods: Vec<IterMethod>,
        line: u32,
    },
}

impl Expr {
    pub fn line(&self) -> u32 {
        match self {
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::NoneLit | Expr::Str(_) => 0,
            Expr::Ident(_, line)
            | Expr::Closure { line, .. }
            | Expr::Unary { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Call { line, .. }
            | Expr::Index { line, .. }
            | Expr::IterChain { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AssignTarget {
    Ident(String),
    Index { base: Expr, index: Expr },
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        name: String,
        mutable: bool,
        init: Expr,
        line: u32,
    },
    Assign {
        target: AssignTarget,
        value: Expr,
        line: u32,
    },
    Expr(Expr),
    Block(Block),
    Fn {
        name: String,
        params: Vec<String>,
        body: Block,
        line: u32,
    },
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        var: String,
        iterable: Expr,
        body: Block,
        line: u32,
    },
    Loop {
        body: Block,
    },
    Break {
        line: u32,
    },
    Return {
        value: Option<Expr>,
        line: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Option<(Precedence, BinaryOp)> {
    use TokenKind as T;
    Some(match kind {
        T::EqEq => (Precedence::Equality, BinaryOp::Eq),
        T::BangEq => (Precedence::Equality, BinaryOp::Ne),
        T::Lt => (Precedence::Comparison, BinaryOp::Lt),
        T::Le => (Precedence::Comparison, BinaryOp::Le),
        T::Gt => (Precedence::Comparison, BinaryOp::Gt),
        T::Ge => (Precedence::Comparison, BinaryOp::Ge),
        T::Plus => (Precedence::Term, BinaryOp::Add),
        T::Minus => (Precedence::Term, BinaryOp::Sub),
        T::Star => (Precedence::Factor, BinaryOp::Mul),
        T::Slash => (Precedence::Factor, BinaryOp::Div),
        T::Percent => (Precedence::Factor, BinaryOp::Mod),
        _ => return None,
    })
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    errors: Vec<CompileError>,
    panic_mode: bool,
}

/// Parses `source` to completion, collecting every recovered-from error
/// rather than stopping at the first (each is still reported the way the
/// source interpreter reports it: `[line L] error at 'lexeme': message`).
pub fn parse(source: &str) -> (Block, Vec<CompileError>) {
    let mut parser = Parser::new(source);
    let program = parser.parse_program();
    (program, parser.errors)
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token();
        Self {
            lexer,
            previous: first,
            current: first,
            errors: Vec::new(),
            panic_mode: false,
        }
    }

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_current(message);
    }

    fn error_current(&mut self, message: impl Into<String>) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: impl Into<String>) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let error = if token.kind == TokenKind::Eof {
            CompileError::new(token.line, format!("{} at end", message.into()))
        } else {
            CompileError::at(token.line, token.lexeme, message)
        };
        self.errors.push(error);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Fn
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    fn parse_program(&mut self) -> Block {
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::Eof {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        stmts
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let stmt = self.statement();
        if self.panic_mode {
            self.synchronize();
        }
        stmt
    }

    fn block(&mut self) -> Block {
        self.consume(TokenKind::LBrace, "expected '{'");
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        self.consume(TokenKind::RBrace, "expected '}' after block");
        stmts
    }

    fn statement(&mut self) -> Option<Stmt> {
        let line = self.current.line;
        if self.matches(TokenKind::Let) {
            return self.let_statement(line);
        }
        if self.matches(TokenKind::Fn) {
            return self.fn_statement(line);
        }
        if self.matches(TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(TokenKind::For) {
            return self.for_statement(line);
        }
        if self.matches(TokenKind::Loop) {
            return Some(Stmt::Loop { body: self.block() });
        }
        if self.matches(TokenKind::Break) {
            return Some(Stmt::Break { line });
        }
        if self.matches(TokenKind::Return) {
            return self.return_statement(line);
        }
        if self.matches(TokenKind::Match) {
            self.error("match expressions are not supported");
            return None;
        }
        if self.check(TokenKind::LBrace) {
            return Some(Stmt::Block(self.block()));
        }
        self.expr_statement(line)
    }

    fn let_statement(&mut self, line: u32) -> Option<Stmt> {
        let mutable = self.matches(TokenKind::Mut);
        let name = self.identifier_name("expected variable name")?;
        self.consume(TokenKind::Assign, "expected '=' after variable name");
        let init = self.expression()?;
        Some(Stmt::Let {
            name,
            mutable,
            init,
            line,
        })
    }

    fn fn_statement(&mut self, line: u32) -> Option<Stmt> {
        let name = self.identifier_name("expected function name")?;
        let params = self.param_list()?;
        let body = self.block();
        Some(Stmt::Fn {
            name,
            params,
            body,
            line,
        })
    }

    fn param_list(&mut self) -> Option<Vec<String>> {
        self.consume(TokenKind::LParen, "expected '(' after function name");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.identifier_name("expected parameter name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after parameters");
        Some(params)
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let cond = self.expression()?;
        let then_branch = self.block();
        let else_branch = if self.matches(TokenKind::Else) {
            Some(self.block())
        } else {
            None
        };
        Some(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let cond = self.expression()?;
        let body = self.block();
        Some(Stmt::While { cond, body })
    }

    fn for_statement(&mut self, line: u32) -> Option<Stmt> {
        let var = self.identifier_name("expected loop variable name")?;
        self.consume(TokenKind::In, "expected 'in' after loop variable");
        let iterable = self.expression()?;
        let body = self.block();
        Some(Stmt::For {
            var,
            iterable,
            body,
            line,
        })
    }

    fn return_statement(&mut self, line: u32) -> Option<Stmt> {
        let value = if self.check(TokenKind::RBrace) || self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Return { value, line })
    }

    fn expr_statement(&mut self, line: u32) -> Option<Stmt> {
        let expr = self.expression()?;
        if self.matches(TokenKind::Assign) {
            let target = match expr {
                Expr::Ident(name, _) => AssignTarget::Ident(name),
                Expr::Index { base, index, .. } => AssignTarget::Index {
                    base: *base,
                    index: *index,
                },
                _ => {
                    self.error("invalid assignment target");
                    return None;
                }
            };
            let value = self.expression()?;
            self.matches(TokenKind::Semicolon);
            return Some(Stmt::Assign { target, value, line });
        }
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Expr(expr))
    }

    fn identifier_name(&mut self, message: &str) -> Option<String> {
        if !self.check(TokenKind::Ident) {
            self.error_current(message);
            return None;
        }
        let name = self.current.lexeme.to_string();
        self.advance();
        Some(name)
    }

    // --- expressions ---

    fn expression(&mut self) -> Option<Expr> {
        self.parse_precedence(Precedence::Assignment.next())
    }

    fn parse_precedence(&mut self, min_prec: Precedence) -> Option<Expr> {
        let mut lhs = self.unary()?;
        while let Some((prec, op)) = infix_precedence(self.current.kind) {
            if prec < min_prec {
                break;
            }
            let line = self.current.line;
            self.advance();
            let rhs = self.parse_precedence(prec.next())?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.check(TokenKind::Minus) {
            let line = self.current.line;
            self.advance();
            let expr = self.unary()?;
            return Some(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
                line,
            });
        }
        self.call()
    }

    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let line = self.previous.line;
                let args = self.arg_list()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    line,
                };
            } else if self.matches(TokenKind::LBracket) {
                let line = self.previous.line;
                let index = self.expression()?;
                self.consume(TokenKind::RBracket, "expected ']' after index");
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    line,
                };
            } else if self.check(TokenKind::Dot) {
                expr = self.iter_chain(expr)?;
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn arg_list(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after arguments");
        Some(args)
    }

    /// `expr.iter().m1(arg).m2(arg)...` — only `.iter()` is ever lowered;
    /// everything after it is recorded (so the AST shape is complete) but
    /// rejected by the compiler per spec §9.
    fn iter_chain(&mut self, source: Expr) -> Option<Expr> {
        let line = self.current.line;
        self.consume(TokenKind::Dot, "expected '.'");
        let method = self.identifier_name("expected method name after '.'")?;
        if method != "iter" {
            self.error("unknown method, only '.iter()' is supported");
            return None;
        }
        self.consume(TokenKind::LParen, "expected '(' after 'iter'");
        self.consume(TokenKind::RParen, "expected ')' after 'iter('");

        let mut methods = Vec::new();
        while self.matches(TokenKind::Dot) {
            let method_line = self.previous.line;
            let name = self.identifier_name("expected method name after '.'")?;
            self.consume(TokenKind::LParen, "expected '(' after method name");
            let arg = if self.check(TokenKind::RParen) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            let seed = if name == "fold" && self.matches(TokenKind::Comma) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            self.consume(TokenKind::RParen, "expected ')' after method arguments");
            methods.push(IterMethod {
                name,
                line: method_line,
                arg,
                seed,
            });
        }

        Some(Expr::IterChain {
            source: Box::new(source),
            methods,
            line,
        })
    }

    fn primary(&mut self) -> Option<Expr> {
        let token = self.current;
        match token.kind {
            TokenKind::Int => {
                self.advance();
                match token.lexeme.parse::<i32>() {
                    Ok(value) => Some(Expr::Int(value)),
                    Err(_) => {
                        self.error_at(token, "integer literal out of range");
                        None
                    }
                }
            }
            TokenKind::Float => {
                self.advance();
                match token.lexeme.parse::<f32>() {
                    Ok(value) => Some(Expr::Float(value)),
                    Err(_) => {
                        self.error_at(token, "invalid float literal");
                        None
                    }
                }
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::Bool(false))
            }
            TokenKind::NoneLit => {
                self.advance();
                Some(Expr::NoneLit)
            }
            TokenKind::Str => {
                self.advance();
                let raw = token.lexeme;
                let inner = &raw[1..raw.len() - 1];
                Some(Expr::Str(inner.to_string()))
            }
            TokenKind::Ident => {
                self.advance();
                Some(Expr::Ident(token.lexeme.to_string(), token.line))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.consume(TokenKind::RParen, "expected ')' after expression");
                Some(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RBracket, "expected ']' after array literal");
                Some(Expr::Array(elements))
            }
            TokenKind::Pipe => self.closure_expr(),
            _ => {
                self.error_current("expected expression");
                None
            }
        }
    }

    fn closure_expr(&mut self) -> Option<Expr> {
        let line = self.current.line;
        self.consume(TokenKind::Pipe, "expected '|'");
        let mut params = Vec::new();
        if !self.check(TokenKind::Pipe) {
            loop {
                params.push(self.identifier_name("expected parameter name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::Pipe, "expected '|' after closure parameters");
        let body = if self.check(TokenKind::LBrace) {
            ClosureBody::Block(self.block())
        } else {
            ClosureBody::Expr(Box::new(self.expression()?))
        };
        Some(Expr::Closure { params, body, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let (program, errors) = parse("let x = 1 + 2 * 3");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.len(), 1);
        match &program[0] {
            Stmt::Let { init, .. } => match init {
                Expr::Binary {
                    op: BinaryOp::Add, rhs, ..
                } => assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. })),
                other => panic!("unexpected expr {other:?}"),
            },
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        let (_, errors) = parse("1 + 1 = 2");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("invalid assignment target"));
    }

    #[test]
    fn iter_chain_past_iter_is_recorded() {
        let (program, errors) = parse("for v in a.iter().map(|x| x) { }");
        assert!(errors.is_empty(), "{errors:?}");
        let Stmt::For { iterable, .. } = &program[0] else {
            panic!("expected for statement");
        };
        let Expr::IterChain { methods, .. } = iterable else {
            panic!("expected iter chain");
        };
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "map");
    }

    #[test]
    fn bang_alone_is_a_parse_error() {
        let (_, errors) = parse("let x = !1");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn panic_mode_synchronizes_at_next_statement() {
        let (program, errors) = parse("1 + 1 = 2 let y = 3");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.len(), 1);
        assert!(matches!(program[0], Stmt::Let { .. }));
    }
}
