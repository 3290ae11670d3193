//! Multi-feature end-to-end programs, run through the full
//! lex → compile → interpret pipeline. Single-feature checks already live
//! as unit tests next to the code they exercise; these combine several
//! language features in one script the way a real `.hob` program would.

use hobbyl_compiler::compile;
use hobbyl_vm::Vm;

fn run(source: &str) -> String {
    let mut vm = Vm::new();
    let script = compile(source, vm.heap_mut())
        .unwrap_or_else(|errors| panic!("compile error in {source:?}: {errors:?}"));
    let mut out = Vec::new();
    vm.interpret(script, &mut out).unwrap_or_else(|e| panic!("runtime error in {source:?}: {e}"));
    String::from_utf8(out).expect("print only ever writes UTF-8")
}

#[test]
fn linked_list_over_structs_and_closures() {
    let out = run(
        r"
        struct Node {
          var value = 0;
          var next = nil;
        }

        func cons(value, next) {
          return Node { .value = value, .next = next };
        }

        func sum(node) {
          var total = 0;
          while (node != nil) {
            total = total + node.value;
            node = node.next;
          }
          return total;
        }

        var list = cons(1, cons(2, cons(3, nil)));
        print(sum(list));
        ",
    );
    assert_eq!(out, "6\n");
}

#[test]
fn counters_built_by_a_factory_closure_are_independent() {
    let out = run(
        r"
        func make_counter() {
          var n = 0;
          func next() { n = n + 1; return n; }
          return next;
        }
        var a = make_counter();
        var b = make_counter();
        print(a()); print(a()); print(b());
        ",
    );
    assert_eq!(out, "1\n2\n1\n");
}

#[test]
fn enum_driven_dispatch_via_match() {
    let out = run(
        r"
        enum Op { Add, Sub, Mul }

        func apply(op, a, b) {
          match (op) {
            case Op:Add => { return a + b; }
            case Op:Sub => { return a - b; }
            default => { return a * b; }
          }
        }

        print(apply(Op:Add, 3, 4));
        print(apply(Op:Sub, 3, 4));
        print(apply(Op:Mul, 3, 4));
        ",
    );
    assert_eq!(out, "7\n-1\n12\n");
}

#[test]
fn array_of_structs_with_struct_literal_initializers() {
    let out = run(
        r"
        struct Point { var x = 0; var y = 0; }

        var points = [
          Point { .x = 1, .y = 1 },
          Point { .x = 2, .y = 4 },
          Point { .x = 3, .y = 9 }
        ];

        var total = 0;
        var i = 0;
        while (i < 3) {
          total = total + points[i].y;
          i = i + 1;
        }
        print(total);
        ",
    );
    assert_eq!(out, "14\n");
}

#[test]
fn static_method_acts_as_a_namespaced_constructor() {
    let out = run(
        r"
        struct Vec2 {
          var x = 0;
          var y = 0;
          static func zero() { return Vec2 { .x = 0, .y = 0 }; }
          func length_squared() { return self.x * self.x + self.y * self.y; }
        }
        var v = Vec2:zero();
        print(v.length_squared());
        ",
    );
    assert_eq!(out, "0\n");
}

#[test]
fn expression_bodied_functions_and_methods() {
    let out = run(
        r"
        func square(x) => x * x;
        struct Box {
          var w = 0;
          var h = 0;
          func area() => self.w * self.h;
        }
        print(square(5));
        print(Box { .w = 3, .h = 4 }.area());
        ",
    );
    assert_eq!(out, "25\n12\n");
}

#[test]
fn recursive_function_without_closures() {
    let out = run(
        r"
        func fib(n) {
          if (n < 2) { return n; }
          return fib(n - 1) + fib(n - 2);
        }
        print(fib(10));
        ",
    );
    assert_eq!(out, "55\n");
}
