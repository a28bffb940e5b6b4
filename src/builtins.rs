// File: src/builtins.rs
//
// Native functions exposed to running programs. Grounded in the original
// implementation's `object/builtins.go`: table order is load-bearing since
// `OpCode::GetBuiltin`'s operand is an index into this exact table, assigned
// by `Compiler::new`'s `define_builtin` calls in declaration order.

use once_cell::sync::Lazy;

use crate::value::{Builtin, Value};

pub static BUILTINS: Lazy<[Builtin; 7]> = Lazy::new(|| {
    [
        Builtin { name: "len", func: len },
        Builtin { name: "puts", func: puts },
        Builtin { name: "first", func: first },
        Builtin { name: "last", func: last },
        Builtin { name: "rest", func: rest },
        Builtin { name: "help", func: help },
        Builtin { name: "exit", func: exit },
    ]
});

pub fn lookup(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|b| b.name == name)
}

pub fn names() -> Vec<String> {
    BUILTINS.iter().map(|b| b.name.to_string()).collect()
}

fn wrong_number_of_arguments(got: usize, want: usize) -> Value {
    Value::error(format!("wrong number of arguments. got={}, want={}", got, want))
}

fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_number_of_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Str(s) => Value::Integer(s.as_bytes().len() as i64),
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::error(format!("argument to `len` not supported, got {}", other.type_name())),
    }
}

fn puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg.inspect());
    }
    Value::Null
}

fn first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_number_of_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned().unwrap_or(Value::Null),
        other => Value::error(format!("argument to `first` must be ARRAY, got {}", other.type_name())),
    }
}

fn last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_number_of_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned().unwrap_or(Value::Null),
        other => Value::error(format!("argument to `last` must be ARRAY, got {}", other.type_name())),
    }
}

fn rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_number_of_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::array(elements[1..].to_vec())
            }
        }
        other => Value::error(format!("argument to `rest` must be ARRAY, got {}", other.type_name())),
    }
}

fn help(_args: &[Value]) -> Value {
    println!("Available built-in functions:");
    for name in names() {
        println!("  {}", name);
    }
    Value::Null
}

fn exit(args: &[Value]) -> Value {
    let code = match args.first() {
        Some(Value::Integer(n)) => *n as i32,
        _ => 0,
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_compiler_builtin_indices() {
        assert_eq!(BUILTINS[0].name, "len");
        assert_eq!(BUILTINS[1].name, "puts");
        assert_eq!(BUILTINS[2].name, "first");
        assert_eq!(BUILTINS[3].name, "last");
        assert_eq!(BUILTINS[4].name, "rest");
        assert_eq!(BUILTINS[5].name, "help");
        assert_eq!(BUILTINS[6].name, "exit");
    }

    #[test]
    fn len_supports_strings_and_arrays() {
        assert_eq!(len(&[Value::str("four")]), Value::Integer(4));
        assert_eq!(len(&[Value::array(vec![Value::Integer(1), Value::Integer(2)])]), Value::Integer(2));
    }

    #[test]
    fn len_of_string_is_byte_length_not_char_count() {
        // "café" is 4 chars but 5 bytes (é is 2 bytes in UTF-8).
        assert_eq!(len(&[Value::str("café")]), Value::Integer(5));
    }

    #[test]
    fn len_rejects_unsupported_types() {
        assert_eq!(len(&[Value::Integer(1)]), Value::error("argument to `len` not supported, got INTEGER"));
    }

    #[test]
    fn len_rejects_wrong_arity() {
        assert_eq!(len(&[]), wrong_number_of_arguments(0, 1));
    }

    #[test]
    fn first_and_last_return_null_for_empty_arrays() {
        assert_eq!(first(&[Value::array(vec![])]), Value::Null);
        assert_eq!(last(&[Value::array(vec![])]), Value::Null);
    }

    #[test]
    fn rest_drops_the_first_element() {
        let array = Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(rest(&[array]), Value::array(vec![Value::Integer(2), Value::Integer(3)]));
    }

    #[test]
    fn rest_of_empty_array_is_null() {
        assert_eq!(rest(&[Value::array(vec![])]), Value::Null);
    }

    #[test]
    fn lookup_finds_index_by_name() {
        assert_eq!(lookup("len"), Some(0));
        assert_eq!(lookup("nope"), None);
    }
}
