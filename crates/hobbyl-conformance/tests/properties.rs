//! Property-based tests for the invariants and laws an implementation of
//! this language is expected to hold, independent of any one example
//! program.

use hobbyl_compiler::compile;
use hobbyl_core::Heap;
use hobbyl_vm::{stringify, Vm};
use proptest::prelude::*;

fn run(source: &str) -> String {
    let mut vm = Vm::new();
    let script = compile(source, vm.heap_mut())
        .unwrap_or_else(|errors| panic!("compile error in {source:?}: {errors:?}"));
    let mut out = Vec::new();
    vm.interpret(script, &mut out).unwrap_or_else(|e| panic!("runtime error in {source:?}: {e}"));
    String::from_utf8(out).expect("print only ever writes UTF-8")
}

fn run_err(source: &str) -> String {
    let mut vm = Vm::new();
    match compile(source, vm.heap_mut()) {
        Ok(script) => {
            let mut out = Vec::new();
            let err = vm.interpret(script, &mut out).expect_err("expected a runtime error");
            err.to_string()
        }
        Err(errors) => errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"),
    }
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

proptest! {
    // Equal byte sequences always intern to the same heap object, and
    // distinct ones never collide.
    #[test]
    fn interning_is_identity_for_equal_bytes(a in "[\\PC]{0,16}", b in "[\\PC]{0,16}") {
        let mut heap = Heap::new();
        let ha = heap.intern(a.as_bytes());
        let hb = heap.intern(b.as_bytes());
        prop_assert_eq!(ha == hb, a == b);
    }

    // Redefining a global with `var` always succeeds and the later
    // value wins; assigning to a name that was never declared is always a
    // runtime error, never a silent global creation.
    #[test]
    fn redefining_a_global_always_replaces_it(first in -1.0e9f64..1.0e9, second in -1.0e9f64..1.0e9, name in ident()) {
        let source = format!("var {name} = {first}; var {name} = {second}; print({name});");
        let out = run(&source);
        prop_assert_eq!(out.trim_end(), format!("{second}"));
    }

    #[test]
    fn assigning_an_undeclared_global_is_always_an_error(name in ident(), value in -1.0e9f64..1.0e9) {
        let source = format!("{name} = {value};");
        let err = run_err(&source);
        prop_assert!(err.contains("Undefined"), "expected an undefined-global error, got: {err}");
    }

    // A local redeclared in the very same block is always a compile
    // error; the same name in a nested block is always legal shadowing.
    #[test]
    fn redeclaring_a_local_in_the_same_scope_is_always_an_error(name in ident()) {
        let source = format!("{{ var {name} = 1; var {name} = 2; }}");
        let err = run_err(&source);
        prop_assert!(err.contains("Already a variable"), "got: {err}");
    }

    #[test]
    fn shadowing_a_local_in_a_nested_scope_is_always_legal(name in ident()) {
        let source = format!("{{ var {name} = 1; {{ var {name} = 2; print({name}); }} print({name}); }}");
        let out = run(&source);
        prop_assert_eq!(out, "2\n1\n");
    }

    // Stringifying an already-stringified value is a no-op, since the
    // result is itself a string and `toString` of a string returns it
    // unchanged.
    #[test]
    fn to_string_is_idempotent_on_numbers(n in -1.0e12f64..1.0e12) {
        let source = format!("print(toString({n}) == toString(toString({n})));");
        let out = run(&source);
        prop_assert_eq!(out, "true\n");
    }

    // `%` matches the host's floating-point remainder: C's `fmod`, which
    // Rust's `%` operator already implements for `f64`.
    #[test]
    fn modulo_matches_host_float_remainder(
        a in -1.0e6f64..1.0e6,
        b in prop_oneof![-1.0e6f64..-1.0e-3, 1.0e-3..1.0e6f64],
    ) {
        let source = format!("print({a} % {b});");
        let out = run(&source);
        let expected = stringify(&Heap::new(), hobbyl_core::Value::number(a % b));
        prop_assert_eq!(out.trim_end(), expected);
    }

    // An enum's declaration-order index is exactly the value it
    // evaluates to, for any number of variants the grammar allows.
    #[test]
    fn enum_values_match_declaration_order(count in 1usize..12) {
        let names: Vec<String> = (0..count).map(|i| format!("V{i}")).collect();
        let decl = format!("enum E {{ {} }}", names.join(", "));
        let prints: String = names.iter().map(|n| format!("print(E:{n});")).collect();
        let out = run(&format!("{decl} {prints}"));
        let expected: String = (0..count).map(|i| format!("{i}\n")).collect();
        prop_assert_eq!(out, expected);
    }

    // Every opcode's net effect on the value stack is fixed at compile
    // time, so a chain of arbitrarily many binary operations of arbitrary
    // depth always leaves the stack balanced: it runs to completion and
    // prints exactly one line, never overflowing or underflowing.
    #[test]
    fn arbitrarily_deep_arithmetic_nesting_leaves_the_stack_balanced(
        depth in 1usize..40,
        ops in prop::collection::vec(
            prop_oneof![Just("+"), Just("-"), Just("*"), Just("/")],
            1..40,
        ),
    ) {
        let mut expr = "1".to_string();
        for i in 0..depth {
            let op = &ops[i % ops.len()];
            expr = format!("({expr} {op} 2)");
        }
        let out = run(&format!("print({expr});"));
        prop_assert_eq!(out.matches('\n').count(), 1);
    }

    // Captured locals keep their own identity no matter how many other
    // locals sit between their declaration and the nested function that
    // captures them, or in what order the closures capturing them are
    // called.
    #[test]
    fn closures_capture_distinct_locals_independent_of_declaration_gaps(
        a in -1000i64..1000, b in -1000i64..1000, c in -1000i64..1000,
    ) {
        let source = format!(
            "func make() {{
               var a = {a};
               var b = {b};
               var c = {c};
               func getA() {{ return a; }}
               func getC() {{ return c; }}
               func getB() {{ return b; }}
               print(getC()); print(getA()); print(getB());
             }}
             make();"
        );
        let out = run(&source);
        prop_assert_eq!(out, format!("{c}\n{a}\n{b}\n"));
    }
}
