// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Declarations and statements.
//!
//! Structs and enums are restricted to top-level scope; everything else
//! (`var`, `func`, control flow) is valid anywhere a statement is.

use hobbyl_core::{chunk::op, Obj, Value};
use hobbyl_lexer::TokenKind;

use crate::compiler::{Compiler, FunctionState, FunctionType, LoopContext};

impl<'src, 'heap> Compiler<'src, 'heap> {
    /// Top-level entry for one declaration/statement, with error recovery
    ///: a reported error resyncs to the
    /// next statement/declaration boundary rather than aborting the parse.
    pub fn declaration(&mut self) {
        if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else if self.matches(TokenKind::Func) {
            self.func_declaration();
        } else if self.matches(TokenKind::Struct) {
            self.struct_declaration();
        } else if self.matches(TokenKind::Enum) {
            self.enum_declaration();
        } else {
            self.statement();
        }
        if self.parser.in_panic_mode() {
            self.parser.synchronize();
        }
    }

    pub fn statement(&mut self) {
        if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::Loop) {
            self.loop_statement();
        } else if self.matches(TokenKind::Match) {
            self.match_statement();
        } else if self.matches(TokenKind::Break) {
            self.break_statement();
        } else if self.matches(TokenKind::Continue) {
            self.continue_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LBrace) {
            self.block();
        } else {
            self.expression_statement();
        }
    }

    /// A brace-delimited sequence of declarations in its own scope.
    pub fn block(&mut self) {
        self.begin_scope();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(op::POP);
    }

    // --- var -----------------------------------------------------------

    fn var_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect variable name.");
        let name = self.parser.previous;
        self.declare_local(name);
        let global_index =
            if self.in_global_scope() { Some(self.identifier_constant(name.lexeme)) } else { None };

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(op::NIL);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        if let Some(index) = global_index {
            self.emit_bytes(op::DEFINE_GLOBAL, index);
        } else {
            self.mark_initialized();
        }
    }

    // --- func ------------------------------------------------------------

    fn func_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect function name.");
        let name = self.parser.previous;
        self.declare_local(name);
        if !self.in_global_scope() {
            // Allow the function to call itself recursively by name before
            // its own body is compiled.
            self.mark_initialized();
        }
        self.function(FunctionType::Function, Some(name.lexeme));
        if self.in_global_scope() {
            let index = self.identifier_constant(name.lexeme);
            self.emit_bytes(op::DEFINE_GLOBAL, index);
        }
    }

    /// Compile a function's parameter list and body into its own
    /// [`FunctionState`], then emit the enclosing `CLOSURE` instruction that
    /// wraps the finished function with its captured upvalues.
    pub fn function(&mut self, fn_type: FunctionType, name: Option<&'src str>) {
        let name_ref = name.map(|n| self.intern(n.as_bytes()));
        self.functions.push(FunctionState::new(fn_type, name_ref));
        self.begin_scope();

        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RParen) {
            loop {
                if self.current().function.arity == 255 {
                    self.parser.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.current().function.arity += 1;
                }
                self.consume(TokenKind::Identifier, "Expect parameter name.");
                let param = self.parser.previous;
                self.declare_local(param);
                self.mark_initialized();
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");

        if self.matches(TokenKind::FatArrow) {
            // `=> expr;` body: the expression's value is the return value.
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after expression body.");
            self.emit_op(op::RETURN);
        } else {
            self.consume(TokenKind::LBrace, "Expect '{' before function body.");
            while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
                self.declaration();
            }
            self.consume(TokenKind::RBrace, "Expect '}' after function body.");
            // Every function falls off the end into an implicit `return nil;`
            // if control reaches here without an explicit `return`.
            self.emit_op(op::NIL);
            self.emit_op(op::RETURN);
        }

        let finished = self.functions.pop().expect("just pushed at the top of this call");
        let upvalues = finished.upvalues.clone();
        let handle = self.alloc_obj(Obj::Function(finished.function));

        let const_index = match self.chunk().add_constant(Value::obj(handle)) {
            Some(index) => index,
            None => {
                self.parser.error_at_previous("Too many constants in one chunk.");
                0
            }
        };
        self.emit_bytes(op::CLOSURE, const_index);
        for upvalue in &upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index);
        }
    }

    // --- struct ------------------------------------------------------------

    /// `struct Name {.field = default;... func method(...) {... }...
    /// static func name(...) {... }... }`. Restricted to top level.
    fn struct_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect struct name.");
        let name = self.parser.previous;
        if !self.in_global_scope() {
            self.parser.error_at_previous("Structs can only be declared at the top level.");
        }
        let name_index = self.identifier_constant(name.lexeme);
        self.emit_bytes(op::STRUCT, name_index);

        self.consume(TokenKind::LBrace, "Expect '{' before struct body.");
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::Static) {
                self.consume(TokenKind::Func, "Expect 'func' after 'static'.");
                self.consume(TokenKind::Identifier, "Expect static method name.");
                let member_name = self.parser.previous.lexeme;
                let member_index = self.identifier_constant(member_name);
                self.function(FunctionType::Function, Some(member_name));
                self.emit_bytes(op::STATIC_METHOD, member_index);
            } else if self.matches(TokenKind::Func) {
                self.consume(TokenKind::Identifier, "Expect method name.");
                let member_name = self.parser.previous.lexeme;
                let member_index = self.identifier_constant(member_name);
                self.function(FunctionType::Method, Some(member_name));
                self.emit_bytes(op::METHOD, member_index);
            } else {
                self.consume(TokenKind::Dot, "Expect field or method declaration.");
                self.consume(TokenKind::Identifier, "Expect field name.");
                let field_index = self.identifier_constant(self.parser.previous.lexeme);
                self.consume(TokenKind::Equal, "Expect '=' after field name.");
                self.expression();
                self.consume(TokenKind::Semicolon, "Expect ';' after field default value.");
                self.emit_bytes(op::STRUCT_FIELD, field_index);
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after struct body.");
        self.emit_bytes(op::DEFINE_GLOBAL, name_index);
    }

    // --- enum ------------------------------------------------------------

    /// `enum Name { A, B, C }`: each value gets the next integer in
    /// declaration order. Restricted to
    /// top level.
    fn enum_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect enum name.");
        let name = self.parser.previous;
        if !self.in_global_scope() {
            self.parser.error_at_previous("Enums can only be declared at the top level.");
        }
        let name_index = self.identifier_constant(name.lexeme);
        self.emit_bytes(op::ENUM, name_index);

        self.consume(TokenKind::LBrace, "Expect '{' before enum body.");
        let mut next_value: f64 = 0.0;
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                self.consume(TokenKind::Identifier, "Expect enum value name.");
                let value_index = self.identifier_constant(self.parser.previous.lexeme);
                self.emit_constant(Value::number(next_value));
                self.emit_bytes(op::ENUM_VALUE, value_index);
                next_value += 1.0;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after enum body.");
        self.emit_bytes(op::DEFINE_GLOBAL, name_index);
    }

    // --- control flow ------------------------------------------------------

    fn if_statement(&mut self) {
        self.consume(TokenKind::LParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_op(op::POP);
        self.statement();
        let else_jump = self.emit_jump(op::JUMP);

        self.patch_jump(then_jump);
        self.emit_op(op::POP);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.push_loop(loop_start);

        self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_op(op::POP);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(op::POP);
        self.pop_loop();
    }

    /// `loop {... }`: an unconditional loop, exited only via `break`.
    fn loop_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.push_loop(loop_start);

        self.consume(TokenKind::LBrace, "Expect '{' after 'loop'.");
        self.block();
        self.emit_loop(loop_start);

        self.pop_loop();
    }

    fn push_loop(&mut self, loop_start: usize) {
        let scope_depth = self.current().scope_depth;
        self.current().loops.push(LoopContext { loop_start, scope_depth, break_jumps: Vec::new() });
    }

    fn pop_loop(&mut self) {
        let ctx = self.current().loops.pop().expect("push_loop/pop_loop are always paired");
        for break_jump in ctx.break_jumps {
            // `break_jump` is the offset of the jump's operand bytes; the
            // opcode byte `emit_jump(op::BREAK)` wrote sits immediately
            // before it and must be rewritten to `op::JUMP` here, since
            // `patch_jump` only ever overwrites the two operand bytes.
            self.chunk().code[break_jump - 1] = op::JUMP;
            self.patch_jump(break_jump);
        }
    }

    fn break_statement(&mut self) {
        if self.current().loops.is_empty() {
            self.parser.error_at_previous("Can't use 'break' outside of a loop.");
        } else {
            let target_depth = self.current().loops.last().expect("checked above").scope_depth;
            self.emit_pops_down_to(target_depth);
            let jump = self.emit_jump(op::BREAK);
            self.current().loops.last_mut().expect("checked above").break_jumps.push(jump);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after 'break'.");
    }

    fn continue_statement(&mut self) {
        if self.current().loops.is_empty() {
            self.parser.error_at_previous("Can't use 'continue' outside of a loop.");
        } else {
            let ctx = self.current().loops.last().expect("checked above");
            let target_depth = ctx.scope_depth;
            let loop_start = ctx.loop_start;
            self.emit_pops_down_to(target_depth);
            self.emit_loop(loop_start);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'.");
    }

    /// Emit the `POP`/`CLOSE_UPVALUE` instructions a `break`/`continue`
    /// needs to unwind every local declared since the loop's own scope,
    /// without touching the compiler's own bookkeeping: execution after
    /// the jump resumes in the same (not-yet-closed) scope.
    fn emit_pops_down_to(&mut self, target_depth: i32) {
        let mut captures = Vec::new();
        for local in self.current().locals.iter().rev() {
            if local.depth <= target_depth {
                break;
            }
            captures.push(local.is_captured);
        }
        for is_captured in captures {
            if is_captured {
                self.emit_op(op::CLOSE_UPVALUE);
            } else {
                self.emit_op(op::POP);
            }
        }
    }

    fn return_statement(&mut self) {
        if self.current().fn_type == FunctionType::Script {
            self.parser.error_at_previous("Can't return from top-level code.");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_op(op::NIL);
            self.emit_op(op::RETURN);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(op::RETURN);
        }
    }

    /// `match (e) { case v1 => stmt case v2 => stmt default => stmt }`
    ///. Each `case` is an `INEQUALITY_JUMP` comparing
    /// the match value against the case value, fused so no separate `POP`
    /// is needed on the not-equal path: only two stack cells (the case
    /// value and a throwaway copy of the match value) are ever pushed per
    /// case.
    fn match_statement(&mut self) {
        self.consume(TokenKind::LParen, "Expect '(' after 'match'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after match value.");
        let match_slot = self.bind_synthetic_local();

        self.consume(TokenKind::LBrace, "Expect '{' before match body.");
        let mut end_jumps = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::Case) {
                self.emit_bytes(op::GET_LOCAL, match_slot);
                self.expression();
                self.consume(TokenKind::FatArrow, "Expect '=>' after case value.");
                let next_case_jump = self.emit_jump(op::INEQUALITY_JUMP);
                self.statement();
                end_jumps.push(self.emit_jump(op::JUMP));
                self.patch_jump(next_case_jump);
            } else if self.matches(TokenKind::Default) {
                self.consume(TokenKind::FatArrow, "Expect '=>' after 'default'.");
                self.statement();
            } else {
                self.parser.error_at_current("Expect 'case' or 'default' in match body.");
                self.advance();
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after match body.");

        for jump in end_jumps {
            self.patch_jump(jump);
        }
        self.emit_op(op::POP);
        self.unbind_synthetic_locals(1);
    }
}
