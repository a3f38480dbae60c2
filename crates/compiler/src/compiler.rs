//! The single-pass Pratt compiler: parses tokens and emits bytecode in the
//! same walk, with no intermediate AST.
//!
//! Mirrors the original's `compiler.c` structure: a `Parser` tracking the
//! current/previous token and error state, a chain of `CompilerState`
//! records (one per function being compiled, linked through `enclosing`
//! rather than a module-level "current" pointer per the design spec's
//! redesign note), and a precedence-climbing `parse_precedence` driven by a
//! per-token `ParseRule` table expressed as a `match` rather than a
//! function-pointer array.

use crate::lexer::{Lexer, Token, TokenKind};
use loxide_core::{Chunk, Heap, LoxError, ObjHandle, OpCode, Table, Value};

/// Precedence levels, lowest to highest. Declared in the same order as the
/// original's `Precedence` enum so `as u8` ordering matches climbing logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
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
    fn next(self) -> Precedence {
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

type ParseFn<'src, 'h> = fn(&mut Parser<'src, 'h>, bool);

struct ParseRule<'src, 'h> {
    prefix: Option<ParseFn<'src, 'h>>,
    infix: Option<ParseFn<'src, 'h>>,
    precedence: Precedence,
}

fn get_rule<'src, 'h>(kind: TokenKind) -> ParseRule<'src, 'h> {
    use TokenKind::*;
    let rule = |prefix, infix, precedence| ParseRule { prefix, infix, precedence };
    match kind {
        LeftParen => rule(Some(Parser::grouping), Some(Parser::call), Precedence::Call),
        Minus => rule(Some(Parser::unary), Some(Parser::binary), Precedence::Term),
        Plus => rule(None, Some(Parser::binary), Precedence::Term),
        Slash => rule(None, Some(Parser::binary), Precedence::Factor),
        Star => rule(None, Some(Parser::binary), Precedence::Factor),
        Bang => rule(Some(Parser::unary), None, Precedence::None),
        BangEqual => rule(None, Some(Parser::binary), Precedence::Equality),
        EqualEqual => rule(None, Some(Parser::binary), Precedence::Equality),
        Greater => rule(None, Some(Parser::binary), Precedence::Comparison),
        GreaterEqual => rule(None, Some(Parser::binary), Precedence::Comparison),
        Less => rule(None, Some(Parser::binary), Precedence::Comparison),
        LessEqual => rule(None, Some(Parser::binary), Precedence::Comparison),
        Identifier => rule(Some(Parser::variable), None, Precedence::None),
        String => rule(Some(Parser::string), None, Precedence::None),
        Number => rule(Some(Parser::number), None, Precedence::None),
        And => rule(None, Some(Parser::and_), Precedence::And),
        Or => rule(None, Some(Parser::or_), Precedence::Or),
        False | Nil | True => rule(Some(Parser::literal), None, Precedence::None),
        _ => rule(None, None, Precedence::None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

struct Local<'src> {
    name: &'src str,
    /// `None` means "declared but not yet initialized" — reading it is an
    /// error (guards against `var a = a;`).
    depth: Option<u32>,
}

/// One function's compilation state. The top-level script is compiled as
/// an anonymous `FunctionKind::Script`; a `fun` declaration pushes a nested
/// `CompilerState` linked back through `enclosing`.
struct CompilerState<'src> {
    enclosing: Option<Box<CompilerState<'src>>>,
    kind: FunctionKind,
    name: Option<&'src str>,
    arity: u8,
    chunk: Chunk,
    locals: Vec<Local<'src>>,
    scope_depth: u32,
}

impl<'src> CompilerState<'src> {
    fn new(kind: FunctionKind, name: Option<&'src str>) -> Self {
        // Slot 0 is reserved for the implicit "function value" the VM
        // keeps at the base of each call frame's stack window.
        let locals = vec![Local { name: "", depth: Some(0) }];
        Self { enclosing: None, kind, name, arity: 0, chunk: Chunk::new(), locals, scope_depth: 0 }
    }
}

pub struct Parser<'src, 'h> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    errors: Vec<String>,
    panic_mode: bool,
    heap: &'h mut Heap,
    strings: &'h mut Table,
    compiler: Box<CompilerState<'src>>,
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap, strings: &'h mut Table) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.scan_token();
        // `previous` is never read before the first `advance()` call fills
        // it; this placeholder is overwritten immediately.
        let placeholder = current;
        Self {
            lexer,
            current,
            previous: placeholder,
            errors: Vec::new(),
            panic_mode: false,
            heap,
            strings,
            compiler: Box::new(CompilerState::new(FunctionKind::Script, None)),
        }
    }

    // --- token stream -----------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // --- error reporting ---------------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    /// Formats `[line N] Error at 'lexeme': message`, matching the
    /// original's `errorAt` exactly. Further errors are swallowed while
    /// `panic_mode` is set, until `synchronize` clears it, so one mistake
    /// doesn't cascade into a wall of misleading diagnostics.
    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let mut text = format!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => text.push_str(" at end"),
            TokenKind::Error => {}
            _ => text.push_str(&format!(" at '{}'", token.lexeme)),
        }
        text.push_str(&format!(": {message}"));
        self.errors.push(text);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            match self.current.kind {
                Class | Fun | Var | For | If | While | Print | Return => return,
                _ => self.advance(),
            }
        }
    }

    // --- bytecode emission --------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.compiler.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(u8::from(op));
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_op_byte(&mut self, op: OpCode, operand: u8) {
        self.emit_bytes(u8::from(op), operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.compiler.chunk.add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, index);
    }

    /// Emits a jump instruction with a placeholder 16-bit operand, returning
    /// the offset of the first placeholder byte for [`Self::patch_jump`].
    fn emit_jump(&mut self, instruction: OpCode) -> usize {
        self.emit_op(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.compiler.chunk.code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.compiler.chunk.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let jump = jump as u16;
        self.compiler.chunk.code[offset] = (jump >> 8) as u8;
        self.compiler.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.compiler.chunk.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let offset = offset as u16;
        self.emit_byte((offset >> 8) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    // --- scopes and locals ---------------------------------------------------

    fn begin_scope(&mut self) {
        self.compiler.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.compiler.scope_depth -= 1;
        while let Some(local) = self.compiler.locals.last() {
            if local.depth.is_some_and(|d| d > self.compiler.scope_depth) {
                self.emit_op(OpCode::Pop);
                self.compiler.locals.pop();
            } else {
                break;
            }
        }
    }

    fn add_local(&mut self, name: &'src str) {
        if self.compiler.locals.len() >= u8::MAX as usize + 1 {
            self.error("Too many local variables in function.");
            return;
        }
        self.compiler.locals.push(Local { name, depth: None });
    }

    fn declare_variable(&mut self) {
        if self.compiler.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let scope_depth = self.compiler.scope_depth;
        let shadowed = self
            .compiler
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.is_none_or(|d| d >= scope_depth))
            .any(|local| local.name == name);
        if shadowed {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.compiler.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.compiler.locals.last_mut() {
            local.depth = Some(self.compiler.scope_depth);
        }
    }

    /// Resolves `name` against the innermost enclosing scope of the
    /// *current* function only — this language has no upvalue capture, so a
    /// lookup never crosses a function boundary into an `enclosing` scope.
    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        for (i, local) in self.compiler.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    self.error("Cannot read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = loxide_core::interner::copy_string(self.heap, self.strings, name);
        self.make_constant(Value::Obj(handle))
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.compiler.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn define_variable(&mut self, global: u8) {
        if self.compiler.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_op, set_op, arg) = if let Some(local) = self.resolve_local(name) {
            (OpCode::GetLocal, OpCode::SetLocal, local)
        } else {
            let global = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, global)
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }

    // --- expressions ---------------------------------------------------------

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = get_rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.expect("infix rule must exist");
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary() called for a non-unary operator"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let next_precedence = get_rule(operator).precedence.next();
        self.parse_precedence(next_precedence);
        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary() called for a non-binary operator"),
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op_byte(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Cannot have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal() called for a non-literal token"),
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().expect("lexer only emits valid numerals");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let raw = self.previous.lexeme;
        let text = &raw[1..raw.len() - 1];
        let handle = loxide_core::interner::copy_string(self.heap, self.strings, text);
        self.emit_constant(Value::Obj(handle));
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    // --- statements and declarations ------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    /// Compiles a function body into its own `CompilerState`, pushing it
    /// ahead of the enclosing one and popping back afterwards — the
    /// by-value `enclosing` chain the design notes call for, in place of a
    /// mutable "current compiler" global.
    fn function(&mut self, kind: FunctionKind) {
        let name = self.previous.lexeme;
        let nested = Box::new(CompilerState::new(kind, Some(name)));
        let enclosing = std::mem::replace(&mut self.compiler, nested);
        self.compiler.enclosing = Some(enclosing);

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.compiler.arity == 255 {
                    self.error_at_current("Cannot have more than 255 parameters.");
                }
                self.compiler.arity += 1;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let finished = std::mem::replace(
            &mut self.compiler,
            self.compiler.enclosing.take().expect("function() always has an enclosing compiler"),
        );
        let name_handle =
            finished.name.map(|n| loxide_core::interner::copy_string(self.heap, self.strings, n));
        let handle = self.heap.alloc_function(finished.arity, finished.chunk, name_handle);
        self.emit_constant(Value::Obj(handle));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn return_statement(&mut self) {
        if self.compiler.kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.compiler.chunk.code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.compiler.chunk.code.len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.compiler.chunk.code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }
}

/// Compiles `source` into a top-level script function, registering every
/// string literal and identifier it encounters in `strings`. On success,
/// returns the `ObjHandle` of the compiled script function (arity 0, no
/// name) ready to hand to the VM's `call`.
pub fn compile(source: &str, heap: &mut Heap, strings: &mut Table) -> Result<ObjHandle, LoxError> {
    let mut parser = Parser::new(source, heap, strings);
    parser.advance();
    while !parser.check(TokenKind::Eof) {
        parser.declaration();
    }
    parser.consume(TokenKind::Eof, "Expect end of expression.");
    parser.emit_return();

    if !parser.errors.is_empty() {
        return Err(LoxError::Compile(parser.errors.join("\n")));
    }

    let script = *parser.compiler;
    let handle = parser.heap.alloc_function(script.arity, script.chunk, None);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxide_core::Obj;

    fn compiled_ops(source: &str) -> Vec<OpCode> {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let handle = compile(source, &mut heap, &mut strings).expect("source should compile");
        let Obj::Function(func) = heap.get(handle) else { panic!("expected a function") };
        func.chunk.code.iter().filter_map(|&b| OpCode::from_u8(b)).collect()
    }

    #[test]
    fn compiles_arithmetic_into_constants_and_add() {
        let ops = compiled_ops("1 + 2;");
        assert!(ops.contains(&OpCode::Constant));
        assert!(ops.contains(&OpCode::Add));
        assert!(ops.contains(&OpCode::Pop));
    }

    #[test]
    fn reports_error_on_unterminated_expression() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile("1 +;", &mut heap, &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn global_variable_roundtrips_define_and_get() {
        let ops = compiled_ops("var a = 1; print a;");
        assert!(ops.contains(&OpCode::DefineGlobal));
        assert!(ops.contains(&OpCode::GetGlobal));
        assert!(ops.contains(&OpCode::Print));
    }

    #[test]
    fn local_variable_uses_local_opcodes_not_global() {
        let ops = compiled_ops("{ var a = 1; print a; }");
        assert!(!ops.contains(&OpCode::DefineGlobal));
        assert!(ops.contains(&OpCode::GetLocal));
    }

    #[test]
    fn redeclaring_a_local_in_the_same_scope_is_an_error() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile("{ var a = 1; var a = 2; }", &mut heap, &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn return_outside_a_function_is_an_error() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile("return 1;", &mut heap, &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn function_declaration_compiles_as_a_constant() {
        let ops = compiled_ops("fun f(a, b) { return a + b; } f(1, 2);");
        assert!(ops.contains(&OpCode::Constant));
        assert!(ops.contains(&OpCode::Call));
    }

    #[test]
    fn while_loop_emits_loop_and_conditional_jump() {
        let ops = compiled_ops("var i = 0; while (i < 3) { i = i + 1; }");
        assert!(ops.contains(&OpCode::Loop));
        assert!(ops.contains(&OpCode::JumpIfFalse));
    }

    #[test]
    fn two_hundred_fifty_six_constants_compile_but_the_next_does_not() {
        // Each top-level `var aN = N;` burns two constant-pool slots (the
        // identifier and the numeric literal), so ~130 declarations is
        // comfortably past the 256-entry cap in one chunk.
        let mut source = String::new();
        for i in 0..130 {
            source.push_str(&format!("var a{i} = {i};\n"));
        }
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile(&source, &mut heap, &mut strings);
        let Err(err) = result else { panic!("260 constants should overflow the pool") };
        assert!(err.to_string().contains("Too many constants in one chunk."));
    }

    #[test]
    fn two_hundred_fifty_five_parameters_compile() {
        let params: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
        let source = format!("fun f({}) {{ return 0; }}", params.join(", "));
        let mut heap = Heap::new();
        let mut strings = Table::new();
        assert!(compile(&source, &mut heap, &mut strings).is_ok());
    }

    #[test]
    fn two_hundred_fifty_six_parameters_is_an_error() {
        let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
        let source = format!("fun f({}) {{ return 0; }}", params.join(", "));
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile(&source, &mut heap, &mut strings);
        let Err(err) = result else { panic!("256 parameters should be rejected") };
        assert!(err.to_string().contains("Cannot have more than 255 parameters."));
    }

    #[test]
    fn jump_over_more_than_65535_bytes_is_an_error() {
        // Each `x = x;` compiles to GetLocal + SetLocal + Pop = 5 bytes and
        // touches no constant pool entry, so the `if` body can grow past
        // the 16-bit jump operand's 65535-byte reach without separately
        // tripping the 256-constant cap.
        let mut source = String::from("{ var x = 0; if (true) {");
        for _ in 0..14_000 {
            source.push_str("x = x;");
        }
        source.push_str("} }");

        let mut heap = Heap::new();
        let mut strings = Table::new();
        let result = compile(&source, &mut heap, &mut strings);
        let Err(err) = result else { panic!("oversized jump should be rejected") };
        assert!(err.to_string().contains("Too much code to jump over."));
    }
}
