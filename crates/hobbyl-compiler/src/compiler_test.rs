// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use hobbyl_core::Heap;

use crate::compile;

fn compile_ok(source: &str) {
    let mut heap = Heap::new();
    match compile(source, &mut heap) {
        Ok(_) => {}
        Err(errors) => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            panic!("expected {source:?} to compile, got: {messages:?}");
        }
    }
}

fn compile_err(source: &str) -> Vec<String> {
    let mut heap = Heap::new();
    match compile(source, &mut heap) {
        Ok(_) => panic!("expected {source:?} to fail to compile"),
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    }
}

#[test]
fn arithmetic_expression_statement_compiles() {
    compile_ok("1 + 2 * 3 - 4 / 2;");
}

#[test]
fn exponent_and_concat_compile() {
    compile_ok("2 ** 3 ** 2;");
    compile_ok("\"a\" .. \"b\" .. \"c\";");
}

#[test]
fn var_declarations_and_assignment_compile() {
    compile_ok("var x = 1; x = x + 1;");
    compile_ok("var x = 1; x += 1; x *= 2; x **= 2;");
}

#[test]
fn redeclaring_local_in_same_scope_is_an_error() {
    let errors = compile_err("{ var x = 1; var x = 2; }");
    assert!(errors.iter().any(|m| m.contains("Already a variable with this name in this scope")));
}

#[test]
fn shadowing_an_outer_scope_is_fine() {
    compile_ok("{ var x = 1; { var x = 2; } }");
}

#[test]
fn reading_local_in_its_own_initializer_is_an_error() {
    let errors = compile_err("{ var x = x; }");
    assert!(errors
        .iter()
        .any(|m| m.contains("Can't read local variable in its own initializer")));
}

#[test]
fn break_outside_loop_is_an_error() {
    let errors = compile_err("break;");
    assert!(errors.iter().any(|m| m.contains("Can't use 'break' outside of a loop")));
}

#[test]
fn continue_outside_loop_is_an_error() {
    let errors = compile_err("continue;");
    assert!(errors.iter().any(|m| m.contains("Can't use 'continue' outside of a loop")));
}

#[test]
fn return_from_top_level_is_an_error() {
    let errors = compile_err("return 1;");
    assert!(errors.iter().any(|m| m.contains("Can't return from top-level code")));
}

#[test]
fn self_outside_method_is_an_error() {
    let errors = compile_err("func f() { return self; }");
    assert!(errors.iter().any(|m| m.contains("Can't use 'self' outside of a method")));
}

#[test]
fn loops_and_break_continue_compile() {
    compile_ok(
        r"
        var i = 0;
        while (i < 10) {
            i = i + 1;
            if (i == 5) { continue; }
            if (i == 8) { break; }
        }
        ",
    );
    compile_ok("loop { break; }");
}

#[test]
fn closures_capturing_enclosing_locals_compile() {
    compile_ok(
        r"
        func makeCounter() {
            var count = 0;
            func increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }
        ",
    );
}

#[test]
fn struct_with_fields_and_methods_compiles() {
    compile_ok(
        r"
        struct Point {
            .x = 0;
            .y = 0;
            func length() {
                return self.x * self.x + self.y * self.y;
            }
            static func origin() {
                return Point { .x = 0, .y = 0 };
            }
        }
        var p = Point { .x = 1, .y = 2 };
        p.x += 1;
        ",
    );
}

#[test]
fn enum_declaration_compiles() {
    compile_ok("enum Color { Red, Green, Blue }");
}

#[test]
fn match_statement_compiles() {
    compile_ok(
        r"
        var n = 2;
        match (n) {
            case 1 => n = 10;
            case 2 => n = 20;
            default => n = 0;
        }
        ",
    );
}

#[test]
fn array_literal_and_subscript_compile() {
    compile_ok("var a = [1, 2, 3]; a[0] = 4; a[0] += 1;");
}

#[test]
fn struct_declaration_outside_top_level_is_an_error() {
    let errors = compile_err("func f() { struct S { .x = 1; } }");
    assert!(errors.iter().any(|m| m.contains("Structs can only be declared at the top level")));
}

#[test]
fn parser_collects_multiple_errors_instead_of_stopping_at_the_first() {
    let errors = compile_err("1 + ; var = 2;");
    assert!(errors.len() >= 2);
}
