use super::*;

fn call(heap: &mut Heap, globals: &Table, name: &str, args: &[Value], out: &mut dyn Write) -> Result<Value, String> {
    let name_handle = heap.intern(name.as_bytes());
    let hash = heap.hash_of_string(name_handle);
    let Some(Value::Obj(handle)) = globals.get(name_handle, hash) else {
        panic!("builtin {name} was not registered");
    };
    let Obj::HostFn(host) = heap.get(handle).clone() else {
        panic!("{name} is not a host function");
    };
    (host.func)(heap, args, out)
}

#[test]
fn print_joins_arguments_with_tabs_and_a_trailing_newline() {
    let mut heap = Heap::new();
    let mut globals = Table::new();
    install(&mut heap, &mut globals);
    let mut out = Vec::new();
    let a = Value::obj(heap.intern(b"a"));
    call(&mut heap, &globals, "print", &[a, Value::number(1.0)], &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "a\t1\n");
}

#[test]
fn to_string_round_trips_through_stringify() {
    let mut heap = Heap::new();
    let mut globals = Table::new();
    install(&mut heap, &mut globals);
    let mut out = Vec::new();
    let result = call(&mut heap, &globals, "toString", &[Value::bool(true)], &mut out).unwrap();
    assert_eq!(stringify(&heap, result), "true");
}

#[test]
fn error_fails_with_the_string_form_of_its_argument() {
    let mut heap = Heap::new();
    let mut globals = Table::new();
    install(&mut heap, &mut globals);
    let mut out = Vec::new();
    let err = call(&mut heap, &globals, "error", &[Value::number(2.0)], &mut out).unwrap_err();
    assert_eq!(err, "2");
}

#[test]
fn clock_returns_a_non_negative_number() {
    let mut heap = Heap::new();
    let mut globals = Table::new();
    install(&mut heap, &mut globals);
    let mut out = Vec::new();
    let result = call(&mut heap, &globals, "clock", &[], &mut out).unwrap();
    assert!(matches!(result, Value::Number(n) if n >= 0.0));
}
