use super::*;

#[test]
fn integers_print_without_a_decimal_point() {
    assert_eq!(format_number(512.0), "512");
    assert_eq!(format_number(14.0), "14");
    assert_eq!(format_number(1.0), "1");
    assert_eq!(format_number(0.0), "0");
}

#[test]
fn fractional_numbers_keep_significant_digits() {
    assert_eq!(format_number(0.5), "0.5");
    assert_eq!(format_number(3.25), "3.25");
}

#[test]
fn special_values_match_spec_text() {
    assert_eq!(format_number(f64::NAN), "nan");
    assert_eq!(format_number(f64::INFINITY), "inf");
    assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
}

#[test]
fn nil_and_booleans() {
    let heap = Heap::new();
    assert_eq!(stringify(&heap, Value::nil()), "nil");
    assert_eq!(stringify(&heap, Value::bool(true)), "true");
    assert_eq!(stringify(&heap, Value::bool(false)), "false");
}

#[test]
fn strings_render_their_raw_bytes() {
    let mut heap = Heap::new();
    let handle = heap.intern(b"hello");
    assert_eq!(stringify(&heap, Value::obj(handle)), "hello");
}

#[test]
fn nameless_top_level_function_is_script() {
    let mut heap = Heap::new();
    let handle = heap.alloc(Obj::Function(hobbyl_core::HeapFunction::new(None)));
    assert_eq!(stringify(&heap, Value::obj(handle)), "<script>");
}

#[test]
fn named_function_includes_its_name() {
    let mut heap = Heap::new();
    let name = heap.intern(b"incr");
    let handle = heap.alloc(Obj::Function(hobbyl_core::HeapFunction::new(Some(name))));
    assert!(stringify(&heap, Value::obj(handle)).starts_with("<function incr"));
}
