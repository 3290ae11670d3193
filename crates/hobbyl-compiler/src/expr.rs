// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Expression parsing: the Pratt table and every prefix/infix handler
//!
//!
//! There is no token-indexed array of function pointers here; dispatch is a
//! plain `match` on [`TokenKind`] in [`Compiler::prefix_rule`] /
//! [`Compiler::infix_rule`]. The effect is identical to a literal rule table
//! and reads more plainly in Rust.

use hobbyl_core::{chunk::op, Value};
use hobbyl_lexer::{Token, TokenKind};

use crate::compiler::Compiler;
use crate::precedence::{infix_precedence, Precedence};

impl<'src, 'heap> Compiler<'src, 'heap> {
    pub fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The core Pratt loop. `precedence` is the minimum
    /// binding power an infix operator must have to be consumed here.
    pub fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.parser.previous.kind, can_assign) {
            self.parser.error_at_previous("Expect expression.");
            return;
        }
        while precedence <= infix_precedence(self.parser.current.kind) {
            self.advance();
            self.infix_rule(self.parser.previous.kind, can_assign);
        }
        if can_assign && self.matches(TokenKind::Equal) {
            self.parser.error_at_previous("Invalid assignment target.");
        }
    }

    /// Returns `false` if `kind` has no prefix position at all (a bare
    /// `Expect expression.` error).
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(kind),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::SelfKw => self.self_expr(),
            TokenKind::LParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::LBracket => self.array_literal(),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::StarStar
            | TokenKind::DotDot
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => self.binary(),
            TokenKind::AmpAmp => self.and(),
            TokenKind::PipePipe => self.or(),
            TokenKind::LParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::Colon => self.static_access(),
            TokenKind::LBracket => self.subscript(can_assign),
            other => unreachable!("no infix rule for {other:?}; infix_precedence was wrong"),
        }
    }

    // --- literals --------------------------------------------------------

    fn number(&mut self) {
        let lexeme = self.parser.previous.lexeme;
        let value: f64 = lexeme.parse().unwrap_or(f64::NAN);
        self.emit_constant(Value::number(value));
    }

    fn string(&mut self) {
        let lexeme = self.parser.previous.lexeme;
        // Strip the surrounding quote bytes: unescaped bytes between the
        // quotes, no escape processing.
        let contents = &lexeme[1..lexeme.len() - 1];
        let handle = self.intern(contents.as_bytes());
        self.emit_constant(Value::obj(handle));
    }

    fn literal(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::True => self.emit_op(op::TRUE),
            TokenKind::False => self.emit_op(op::FALSE),
            TokenKind::Nil => self.emit_op(op::NIL),
            _ => unreachable!(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after expression.");
    }

    fn array_literal(&mut self) {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RBracket) {
            loop {
                self.expression();
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "Expect ']' after array elements.");
        if count > 255 {
            self.parser.error_at_previous("Can't have more than 255 array elements.");
            count = 255;
        }
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        self.emit_bytes(op::ARRAY, count as u8);
    }

    // --- unary / binary --------------------------------------------------

    fn unary(&mut self) {
        let kind = self.parser.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Minus => self.emit_op(op::NEGATE),
            TokenKind::Bang => self.emit_op(op::NOT),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self) {
        let kind = self.parser.previous.kind;
        let prec = infix_precedence(kind);
        // `**` parses its right operand at the same precedence as itself
        // so that `2 ** 3 ** 2`
        // folds right-associatively; every other binary operator climbs to
        // the next level to stay left-associative.
        let right_prec = if kind == TokenKind::StarStar { prec } else { prec.next() };
        self.parse_precedence(right_prec);
        match kind {
            TokenKind::Plus => self.emit_op(op::ADD),
            TokenKind::Minus => self.emit_op(op::SUBTRACT),
            TokenKind::Star => self.emit_op(op::MULTIPLY),
            TokenKind::Slash => self.emit_op(op::DIVIDE),
            TokenKind::Percent => self.emit_op(op::MODULO),
            TokenKind::StarStar => self.emit_op(op::POW),
            TokenKind::DotDot => self.emit_op(op::CONCAT),
            TokenKind::EqualEqual => self.emit_op(op::EQUAL),
            TokenKind::BangEqual => self.emit_op(op::NOT_EQUAL),
            TokenKind::Less => self.emit_op(op::LESSER),
            TokenKind::LessEqual => self.emit_op(op::LESSER_EQUAL),
            TokenKind::Greater => self.emit_op(op::GREATER),
            TokenKind::GreaterEqual => self.emit_op(op::GREATER_EQUAL),
            _ => unreachable!(),
        }
    }

    /// Short-circuit `&&`. The recursive call uses `Precedence::And`
    /// itself, not `.next()`, so a chain `a && b && c` folds correctly
    /// through repeated re-entry of this same function.
    fn and(&mut self) {
        let end_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_op(op::POP);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(op::JUMP_IF_FALSE);
        let end_jump = self.emit_jump(op::JUMP);
        self.patch_jump(else_jump);
        self.emit_op(op::POP);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    // --- variables & assignment -------------------------------------------

    fn variable(&mut self, can_assign: bool) {
        let name = self.parser.previous;
        if self.check(TokenKind::LBrace) {
            self.struct_literal(name);
            return;
        }
        self.named_variable(name.lexeme, can_assign);
    }

    fn self_expr(&mut self) {
        if let Some(slot) = self.resolve_local("self") {
            self.emit_bytes(op::GET_LOCAL, slot);
        } else if let Some(index) = self.resolve_upvalue("self") {
            self.emit_bytes(op::GET_UPVALUE, index);
        } else {
            self.parser.error_at_previous("Can't use 'self' outside of a method.");
        }
    }

    /// Resolve `name` to a local/upvalue/global slot and emit either a
    /// plain read, a `=` assignment, or a compound `OP=` assignment.
    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(name) {
            (op::GET_LOCAL, op::SET_LOCAL, slot)
        } else if let Some(index) = self.resolve_upvalue(name) {
            (op::GET_UPVALUE, op::SET_UPVALUE, index)
        } else {
            let index = self.identifier_constant(name);
            (op::GET_GLOBAL, op::SET_GLOBAL, index)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op, arg);
        } else if can_assign && self.check_compound_assign() {
            let binop = self.consume_compound_assign();
            self.emit_bytes(get_op, arg);
            self.expression();
            self.emit_op(binop);
            self.emit_bytes(set_op, arg);
        } else {
            self.emit_bytes(get_op, arg);
        }
    }

    fn check_compound_assign(&self) -> bool {
        compound_assign_op(self.parser.current.kind).is_some()
    }

    /// Consume the `OP=` token and return the matching binary opcode.
    fn consume_compound_assign(&mut self) -> u8 {
        self.advance();
        compound_assign_op(self.parser.previous.kind).expect("checked by check_compound_assign")
    }

    // --- calls, properties, statics, subscripts ---------------------------

    fn call(&mut self) {
        let argc = self.arg_list();
        self.emit_bytes(op::CALL, argc);
    }

    fn arg_list(&mut self) -> u8 {
        let mut argc: u16 = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression();
                argc += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.");
        if argc > 255 {
            self.parser.error_at_previous("Can't have more than 255 arguments.");
            argc = 255;
        }
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let argc_u8 = argc as u8;
        argc_u8
    }

    /// `a.b`, `a.b(args)` (fused `INVOKE`), `a.b = e`, `a.b OP= e`.
    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name_index = self.identifier_constant(self.parser.previous.lexeme);

        if self.matches(TokenKind::LParen) {
            let argc = self.arg_list();
            self.emit_bytes(op::INVOKE, name_index);
            self.emit_byte(argc);
            return;
        }
        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(op::SET_PROPERTY, name_index);
            return;
        }
        if can_assign && self.check_compound_assign() {
            let binop = self.consume_compound_assign();
            self.emit_bytes(op::PUSH_PROPERTY, name_index);
            self.expression();
            self.emit_op(binop);
            self.emit_bytes(op::SET_PROPERTY, name_index);
            return;
        }
        self.emit_bytes(op::GET_PROPERTY, name_index);
    }

    /// `a:b`: struct static method lookup or enum value lookup.
    fn static_access(&mut self) {
        self.consume(TokenKind::Identifier, "Expect member name after ':'.");
        let name_index = self.identifier_constant(self.parser.previous.lexeme);
        self.emit_bytes(op::GET_STATIC, name_index);
    }

    /// `a[i]`, `a[i] = e`, `a[i] OP= e`.
    ///
    /// In a non-assignable context the receiver and index are freshly
    /// computed once and directly consumed by `GET_SUBSCRIPT`. An
    /// assignable context might turn out to be a compound `OP=`, which
    /// needs the receiver and index a second time to read the old value
    /// before writing the new one, without re-evaluating their (possibly
    /// side-effecting) source expressions. So whenever assignment is even
    /// syntactically possible, the receiver and index are first bound to
    /// synthetic locals: the same slot-is-the-value machinery `var` uses,
    /// just with a compiler-only name no source token can spell.
    fn subscript(&mut self, can_assign: bool) {
        if !can_assign {
            self.expression();
            self.consume(TokenKind::RBracket, "Expect ']' after index.");
            self.emit_op(op::GET_SUBSCRIPT);
            return;
        }

        // Receiver is already on the stack (the left operand the Pratt
        // loop passed in). Binding it to a synthetic local emits no
        // bytecode: the value already sits exactly where a local declared
        // right now would live.
        let recv_slot = self.bind_synthetic_local();
        self.expression();
        self.consume(TokenKind::RBracket, "Expect ']' after index.");
        let idx_slot = self.bind_synthetic_local();

        if self.matches(TokenKind::Equal) {
            self.emit_bytes(op::GET_LOCAL, recv_slot);
            self.emit_bytes(op::GET_LOCAL, idx_slot);
            self.expression();
            self.emit_op(op::SET_SUBSCRIPT);
            self.collapse_synthetic_locals(recv_slot, 2);
            return;
        }
        if self.check_compound_assign() {
            let binop = self.consume_compound_assign();
            self.emit_bytes(op::GET_LOCAL, recv_slot);
            self.emit_bytes(op::GET_LOCAL, idx_slot);
            self.emit_op(op::GET_SUBSCRIPT);
            self.expression();
            self.emit_op(binop);
            // Stack is now exactly [receiver, index, result]: the two
            // synthetic locals are still resident below the freshly
            // computed result (nothing popped them), so `SET_SUBSCRIPT`
            // consumes precisely those three cells.
            self.emit_bytes(op::GET_LOCAL, recv_slot);
            self.emit_bytes(op::GET_LOCAL, idx_slot);
            // Re-read the already-computed result from its own synthetic
            // slot so it ends up on top, above the freshly fetched pair.
            let result_slot = self.bind_synthetic_local();
            self.emit_bytes(op::GET_LOCAL, result_slot);
            self.emit_op(op::SET_SUBSCRIPT);
            self.collapse_synthetic_locals(recv_slot, 3);
            return;
        }
        // No assignment after all: a plain read of `recv[idx]`.
        self.emit_bytes(op::GET_LOCAL, recv_slot);
        self.emit_bytes(op::GET_LOCAL, idx_slot);
        self.emit_op(op::GET_SUBSCRIPT);
        self.collapse_synthetic_locals(recv_slot, 2);
    }

    /// Fold the freshly computed top-of-stack value down into `base_slot`
    /// and discard every synthetic local above it, so a subscript
    /// expression nets exactly one stack cell like any other expression.
    ///
    /// `SET_LOCAL` only peeks, leaving the value it wrote resident both at
    /// `base_slot` and at the top; `count` (the number of synthetic locals
    /// bound since `base_slot`, inclusive) is exactly the distance from the
    /// top down to `base_slot`, so that many `POP`s reclaim it, leaving the
    /// result sitting alone at `base_slot`.
    fn collapse_synthetic_locals(&mut self, base_slot: u8, count: usize) {
        self.emit_bytes(op::SET_LOCAL, base_slot);
        for _ in 0..count {
            self.emit_op(op::POP);
        }
        self.unbind_synthetic_locals(count);
    }

    // --- struct literals ---------------------------------------------------

    /// `Name {.f = e,.g = e }`.
    fn struct_literal(&mut self, name: Token<'src>) {
        self.named_variable(name.lexeme, false);
        self.consume(TokenKind::LBrace, "Expect '{' to start struct literal.");
        self.emit_op(op::INSTANCE);
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                self.consume(TokenKind::Dot, "Expect '.' before field name.");
                self.consume(TokenKind::Identifier, "Expect field name.");
                let field_index = self.identifier_constant(self.parser.previous.lexeme);
                self.consume(TokenKind::Equal, "Expect '=' after field name.");
                self.expression();
                self.emit_bytes(op::INIT_PROPERTY, field_index);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after struct literal.");
    }
}

/// `OP=` token → the binary opcode it desugars to.
fn compound_assign_op(kind: TokenKind) -> Option<u8> {
    Some(match kind {
        TokenKind::PlusEqual => op::ADD,
        TokenKind::MinusEqual => op::SUBTRACT,
        TokenKind::StarEqual => op::MULTIPLY,
        TokenKind::SlashEqual => op::DIVIDE,
        TokenKind::PercentEqual => op::MODULO,
        TokenKind::StarStarEqual => op::POW,
        TokenKind::DotDotEqual => op::CONCAT,
        _ => return None,
    })
}
