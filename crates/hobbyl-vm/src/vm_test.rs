//! End-to-end interpretation tests plus
//! targeted checks of individual opcodes. Each test compiles a snippet with
//! `hobbyl_compiler::compile`, runs it on a fresh `Vm`, and inspects either
//! `print`'s captured output or the returned `Value`/`RuntimeError`.

use hobbyl_compiler::compile;

use super::*;

/// Compile and run `source` against a single shared heap (the VM's own, so
/// the script's constants and the built-in globals [`Vm::new`] installs
/// resolve to handles in the same arena), returning everything `print`
/// wrote.
fn run_ok(source: &str) -> String {
 let mut vm = Vm::new();
 let script = match compile(source, vm.heap_mut()) {
 Ok(script) => script,
 Err(errors) => {
 let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
 panic!("expected {source:?} to compile, got: {messages:?}");
 }
 };
 let mut out = Vec::new();
 vm.interpret(script, &mut out).unwrap_or_else(|e| panic!("expected {source:?} to run, got: {e}"));
 String::from_utf8(out).expect("print only ever writes UTF-8")
}

fn run_err(source: &str) -> RuntimeError {
 let mut vm = Vm::new();
 let script =
 compile(source, vm.heap_mut()).unwrap_or_else(|e| panic!("expected {source:?} to compile, got {e:?}"));
 let mut out = Vec::new();
 vm.interpret(script, &mut out).expect_err("expected a runtime error")
}

// --- scenario 1: arithmetic precedence ---------------------------

#[test]
fn scenario_arithmetic_precedence() {
 let out = run_ok("print(2 + 3 * 4); print(2 ** 3 ** 2); print(7 % 3);");
 assert_eq!(out, "14\n512\n1\n");
}

// --- scenario 2: closures capture by reference ------------------------------

#[test]
fn scenario_closures_capture_by_reference() {
 let out = run_ok(
 r"
 func make() {
 var x = 0;
 func incr() { x = x + 1; return x; }
 return incr;
 }
 var f = make();
 print(f()); print(f()); print(f());
 ",
 );
 assert_eq!(out, "1\n2\n3\n");
}

// --- scenario 3: struct with method and static ------------------------------

#[test]
fn scenario_struct_method_and_static() {
 let out = run_ok(
 r"
 struct P {
 var x = 0;
 var y = 0;
 func sum() { return self.x + self.y; }
 static func origin() { return P {.x = 0,.y = 0 }; }
 }
 var p = P {.x = 3,.y = 4 };
 print(p.sum());
 print(P:origin().x);
 ",
 );
 assert_eq!(out, "7\n0\n");
}

// --- scenario 4: loop, break, continue, match -------------------------------

#[test]
fn scenario_loop_break_continue_match() {
 let out = run_ok(
 r"
 var s = 0;
 var i = 0;
 while (i < 10) {
 i = i + 1;
 match (i) {
 case 3 => { continue; }
 case 7 => { break; }
 }
 s = s + i;
 }
 print(s);
 ",
 );
 assert_eq!(out, "18\n");
}

// --- scenario 5: string interning and concat --------------------------------

#[test]
fn scenario_string_interning_and_concat() {
 let out = run_ok(
 r#"
 var a = "foo";
 var b = "f".. "oo";
 print(a == b);
 "#,
 );
 assert_eq!(out, "true\n");
}

// --- scenario 6: enum --------------------------------------------------------

#[test]
fn scenario_enum() {
 let out = run_ok("enum Color { Red, Green, Blue } print(Color:Green);");
 assert_eq!(out, "1\n");
}

// --- arrays ------------------------------------------------------------------

#[test]
fn array_literal_subscript_get_and_set() {
 let out = run_ok(
 r"
 var a = [10, 20, 30];
 print(a[1]);
 a[1] = 99;
 print(a[1]);
 a[2] += 1;
 print(a[2]);
 ",
 );
 assert_eq!(out, "20\n99\n31\n");
}

#[test]
fn array_read_past_end_is_an_error() {
 let err = run_err("var a = [1, 2, 3]; print(a[3]);");
 assert_eq!(err.kind, RuntimeErrorKind::IndexOutOfBounds);
}

#[test]
fn array_negative_index_is_an_error() {
 let err = run_err("var a = [1]; print(a[-1]);");
 assert_eq!(err.kind, RuntimeErrorKind::IndexOutOfBounds);
}

// --- globals --------------------------------------------------------------

#[test]
fn redefining_a_global_replaces_its_value() {
 let out = run_ok("var x = 1; var x = 2; print(x);");
 assert_eq!(out, "2\n");
}

#[test]
fn assigning_an_undefined_global_is_an_error() {
 let err = run_err("x = 1;");
 assert_eq!(err.kind, RuntimeErrorKind::UndefinedGlobal("x".to_string()));
}

// --- instance field discipline -----------------------------------------

#[test]
fn setting_an_undefined_instance_field_is_an_error() {
 let err = run_err(
 r"
 struct S {.x = 1; }
 var s = S {.x = 2 };
 s.y = 3;
 ",
 );
 assert_eq!(err.kind, RuntimeErrorKind::UndefinedField("y".to_string()));
}

#[test]
fn reading_an_undefined_property_or_method_is_an_error() {
 let err = run_err(
 r"
 struct S {.x = 1; }
 var s = S {.x = 2 };
 print(s.bogus);
 ",
 );
 assert_eq!(err.kind, RuntimeErrorKind::UndefinedProperty("bogus".to_string()));
}

// --- calls: arity and callability -------------------------------------------

#[test]
fn calling_with_wrong_arity_is_an_error() {
 let err = run_err("func f(a, b) { return a + b; } f(1);");
 assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch { expected: 2, got: 1 });
}

#[test]
fn calling_a_non_callable_is_an_error() {
 let err = run_err("var x = 1; x();");
 assert_eq!(err.kind, RuntimeErrorKind::NotCallable);
}

#[test]
fn deep_recursion_overflows_the_frame_stack() {
 let err = run_err("func f(n) { return f(n + 1); } f(0);");
 assert_eq!(err.kind, RuntimeErrorKind::StackOverflow);
}

// --- bound methods -----------------------------------------------------------

#[test]
fn a_method_can_be_torn_off_as_a_bound_method_and_called_later() {
 let out = run_ok(
 r"
 struct Counter {
 var n = 0;
 func bump() { self.n = self.n + 1; return self.n; }
 }
 var c = Counter {.n = 0 };
 var bump = c.bump;
 print(bump());
 print(bump());
 ",
 );
 assert_eq!(out, "1\n2\n");
}

// --- type errors -------------------------------------------------------------

#[test]
fn arithmetic_on_non_numbers_is_an_error() {
 let err = run_err(r#"print("a" + 1);"#);
 assert_eq!(err.kind, RuntimeErrorKind::OperandsMustBeNumbers);
}

#[test]
fn concat_of_non_strings_is_an_error() {
 let err = run_err(r#"print(1.. "a");"#);
 assert_eq!(err.kind, RuntimeErrorKind::OperandsMustBeStrings);
}

// --- truthiness --------------------------------------------

#[test]
fn zero_and_empty_string_are_truthy_only_nil_and_false_are_falsey() {
 let out = run_ok(
 r#"
 if (0) { print("zero truthy"); } else { print("zero falsey"); }
 if ("") { print("empty truthy"); } else { print("empty falsey"); }
 if (nil) { print("nil truthy"); } else { print("nil falsey"); }
 if (false) { print("false truthy"); } else { print("false falsey"); }
 "#,
 );
 assert_eq!(out, "zero truthy\nempty truthy\nnil falsey\nfalse falsey\n");
}

// --- GC: a collection mid-run should not corrupt a live closure chain -------

#[test]
fn gc_triggered_mid_loop_keeps_live_closures_and_upvalues_intact() {
 // Every array literal is an allocation; enough of them in a loop blows
 // past the 1 MiB initial `next_gc` threshold and forces several
 // collection cycles while the closure `acc` and its open upvalue over
 // `total` are still live.
 let out = run_ok(
 r"
 var total = 0;
 func acc(x) { total = total + x; return total; }
 var i = 0;
 while (i < 10000) {
 var garbage = [i, i, i, i];
 acc(1);
 i = i + 1;
 }
 print(total);
 ",
 );
 assert_eq!(out, "10000\n");
}

// --- shadowing across a call boundary: a host-function error propagates --

#[test]
fn script_level_error_builtin_raises_a_runtime_error_with_its_message() {
 let err = run_err(r#"error("boom");"#);
 assert_eq!(err.kind, RuntimeErrorKind::Custom("boom".to_string()));
}
