// Integration tests driving the full pipeline: lex -> parse -> compile ->
// run. Complements the per-module unit tests with end-to-end scenarios.

use mantis::compiler::Compiler;
use mantis::parser::parse;
use mantis::value::Value;
use mantis::vm::VirtualMachine;
use pretty_assertions::assert_eq;

fn run(source: &str) -> Value {
    let program = parse(source).unwrap_or_else(|errs| panic!("parse errors: {:?}", errs));
    let mut compiler = Compiler::new();
    compiler.compile_program(&program).unwrap_or_else(|e| panic!("compile error: {}", e));
    let mut vm = VirtualMachine::new(compiler.bytecode());
    vm.run().unwrap_or_else(|e| panic!("runtime error: {}", e));
    vm.last_popped_stack_element().clone()
}

fn run_error(source: &str) -> String {
    let program = parse(source).expect("parses");
    let mut compiler = Compiler::new();
    compiler.compile_program(&program).expect("compiles");
    let mut vm = VirtualMachine::new(compiler.bytecode());
    match vm.run() {
        Err(e) => e.to_string(),
        Ok(()) => panic!("expected a runtime error, program ran to completion"),
    }
}

#[test]
fn arithmetic_expressions_evaluate_left_to_right_with_precedence() {
    assert_eq!(run("1 + 2 * 3"), Value::Integer(7));
    assert_eq!(run("(1 + 2) * 3"), Value::Integer(9));
    assert_eq!(run("-5 + 10"), Value::Integer(5));
}

#[test]
fn less_than_compiles_via_the_greater_than_swap() {
    assert_eq!(run("1 < 2"), Value::Boolean(true));
    assert_eq!(run("2 < 1"), Value::Boolean(false));
}

#[test]
fn if_without_else_yields_null_on_false_branch() {
    assert_eq!(run("if (1 > 2) { 10 }"), Value::Null);
    assert_eq!(run("if (1 > 2) { 10 } else { 20 }"), Value::Integer(20));
}

#[test]
fn global_let_bindings_are_visible_to_later_statements() {
    assert_eq!(run("let a = 5; let b = a * 2; a + b"), Value::Integer(15));
}

#[test]
fn recursive_closures_over_free_variables() {
    let source = r#"
        let fib = fn(x) {
            if (x < 2) {
                x
            } else {
                fib(x - 1) + fib(x - 2)
            }
        };
        fib(10)
    "#;
    assert_eq!(run(source), Value::Integer(55));
}

#[test]
fn curried_closures_capture_their_argument_by_value() {
    let source = r#"
        let makeAdder = fn(a) {
            fn(b) { a + b }
        };
        let addTwo = makeAdder(2);
        let addTen = makeAdder(10);
        addTwo(3) + addTen(3)
    "#;
    assert_eq!(run(source), Value::Integer(18));
}

#[test]
fn nested_closures_promote_free_variables_through_two_scopes() {
    let source = r#"
        let newClosure = fn(a, b) {
            let one = fn() { a };
            let two = fn() { b };
            fn() { one() + two() }
        };
        let closure = newClosure(9, 10);
        closure()
    "#;
    assert_eq!(run(source), Value::Integer(19));
}

#[test]
fn array_indexing_handles_out_of_bounds_as_null() {
    assert_eq!(run("[1, 2, 3][1]"), Value::Integer(2));
    assert_eq!(run("[1, 2, 3][99]"), Value::Null);
    assert_eq!(run("[1, 2, 3][-1]"), Value::Null);
}

#[test]
fn hash_indexing_handles_missing_keys_as_null() {
    assert_eq!(run(r#"{"name": "mantis", "age": 1}["name"]"#), Value::str("mantis"));
    assert_eq!(run(r#"{"name": "mantis"}["missing"]"#), Value::Null);
}

#[test]
fn hash_index_with_unhashable_key_is_a_runtime_error() {
    assert_eq!(run_error(r#"{"a": 1}[[1, 2]]"#), "unusable as hash key: ARRAY");
}

#[test]
fn integer_division_by_zero_is_a_runtime_error() {
    assert_eq!(run_error("10 / 0"), "integer divide by zero");
}

#[test]
fn calling_a_non_function_value_is_a_runtime_error() {
    assert_eq!(run_error("let x = 5; x()"), "calling non-closure and non-builtin");
}

#[test]
fn wrong_argument_count_is_a_runtime_error() {
    let source = "let f = fn(a, b) { a + b }; f(1)";
    assert_eq!(run_error(source), "wrong number of arguments: want=2, got=1");
}

#[test]
fn builtins_len_first_last_rest_behave_like_the_reference_implementation() {
    assert_eq!(run(r#"len("hello")"#), Value::Integer(5));
    assert_eq!(run("len([1, 2, 3, 4])"), Value::Integer(4));
    assert_eq!(run("first([1, 2, 3])"), Value::Integer(1));
    assert_eq!(run("last([1, 2, 3])"), Value::Integer(3));
    assert_eq!(run("rest([1, 2, 3])"), Value::array(vec![Value::Integer(2), Value::Integer(3)]));
    assert_eq!(run("first([])"), Value::Null);
}

#[test]
fn builtin_arity_errors_surface_as_error_values_not_vm_errors() {
    // Builtins report errors as ordinary `Error` values (the VM keeps
    // running), unlike the panics in the table above.
    assert_eq!(run("len(1, 2)"), Value::error("wrong number of arguments. got=2, want=1"));
}

#[test]
fn string_concatenation_uses_the_add_opcode() {
    assert_eq!(run(r#""Hello, " + "World!""#), Value::str("Hello, World!"));
}

#[test]
fn map_over_an_array_via_a_recursive_helper_function() {
    let source = r#"
        let map = fn(arr, f) {
            let iter = fn(arr, accumulated) {
                if (len(arr) == 0) {
                    accumulated
                } else {
                    iter(rest(arr), accumulated + [f(first(arr))])
                }
            };
            iter(arr, [])
        };
        let double = fn(x) { x * 2 };
        map([1, 2, 3, 4], double)
    "#;
    assert_eq!(
        run(source),
        Value::array(vec![Value::Integer(2), Value::Integer(4), Value::Integer(6), Value::Integer(8)])
    );
}

#[test]
fn compiling_the_same_hash_literal_twice_produces_identical_bytecode() {
    let source = r#"{"b": 2, "a": 1, "c": 3}"#;
    let first_pass = {
        let program = parse(source).unwrap();
        let mut c = Compiler::new();
        c.compile_program(&program).unwrap();
        c.bytecode().instructions
    };
    let second_pass = {
        let program = parse(source).unwrap();
        let mut c = Compiler::new();
        c.compile_program(&program).unwrap();
        c.bytecode().instructions
    };
    assert_eq!(first_pass, second_pass);
}
