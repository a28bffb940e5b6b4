// File: src/compiler.rs
//
// Bytecode compiler. Grounded in the original implementation's
// `compiler/compiler.go`, extended to the full node set and to locals,
// jumps, functions, and closures the early snapshot didn't yet cover.

use crate::ast::{BlockStatement, Expr, Program, Stmt};
use crate::bytecode::{make, Instructions, OpCode};
use crate::symbol_table::{SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError(pub String);

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Bookkeeping for one nested function body's instruction stream. The
/// compiler keeps a stack of these; entering a function literal pushes one,
/// leaving it pops and folds the result into a `CompiledFunction` constant.
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope { instructions: Vec::new(), last_instruction: None, previous_instruction: None }
    }
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

const BUILTIN_NAMES: &[&str] = &["len", "puts", "first", "last", "rest", "help", "exit"];

/// Registers the builtin table into a fresh symbol table, in the exact
/// order `OpCode::GetBuiltin`'s operand indexes into `builtins::BUILTINS`.
/// Shared by `Compiler::new` and the REPL, which threads its own symbol
/// table across inputs instead of going through the compiler's constructor.
pub fn symbol_table_with_builtins() -> SymbolTable {
    let mut symbol_table = SymbolTable::new();
    for (index, name) in BUILTIN_NAMES.iter().enumerate() {
        symbol_table.define_builtin(index as u16, name);
    }
    symbol_table
}

impl Compiler {
    pub fn new() -> Self {
        Compiler { constants: Vec::new(), symbol_table: symbol_table_with_builtins(), scopes: vec![CompilationScope::new()] }
    }

    /// Resumes compilation with state carried over from a previous REPL
    /// input: same constant pool and symbol table, fresh instruction buffer.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler { constants, symbol_table, scopes: vec![CompilationScope::new()] }
    }

    pub fn into_symbol_table(self) -> SymbolTable {
        self.symbol_table
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
                Ok(())
            }
            Stmt::Let { name, value } => {
                // Define the symbol before compiling the value so a recursive
                // reference inside a function literal resolves to this
                // binding instead of an outer/global miss.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index as usize]),
                    SymbolScope::Local => self.emit(OpCode::SetLocal, &[symbol.index as usize]),
                    SymbolScope::Free | SymbolScope::Builtin => {
                        unreachable!("define() never returns Free or Builtin scope")
                    }
                };
                Ok(())
            }
            Stmt::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntegerLiteral(n) => {
                let constant = self.add_constant(Value::Integer(*n));
                self.emit(OpCode::Constant, &[constant]);
                Ok(())
            }
            Expr::StringLiteral(s) => {
                let constant = self.add_constant(Value::str(s.clone()));
                self.emit(OpCode::Constant, &[constant]);
                Ok(())
            }
            Expr::Boolean(true) => {
                self.emit(OpCode::True, &[]);
                Ok(())
            }
            Expr::Boolean(false) => {
                self.emit(OpCode::False, &[]);
                Ok(())
            }
            Expr::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError(format!("undefined variable {}", name)))?;
                self.load_symbol(symbol.scope, symbol.index);
                Ok(())
            }
            Expr::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(OpCode::Bang, &[]),
                    "-" => self.emit(OpCode::Minus, &[]),
                    other => return Err(CompileError(format!("unknown operator {}", other))),
                };
                Ok(())
            }
            Expr::Infix { left, operator, right } => {
                // `<` is compiled as `>` with swapped operands so the VM
                // only needs a GreaterThan comparison opcode.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(OpCode::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(OpCode::Add, &[]),
                    "-" => self.emit(OpCode::Sub, &[]),
                    "*" => self.emit(OpCode::Mul, &[]),
                    "/" => self.emit(OpCode::Div, &[]),
                    "==" => self.emit(OpCode::Equal, &[]),
                    "!=" => self.emit(OpCode::NotEqual, &[]),
                    ">" => self.emit(OpCode::GreaterThan, &[]),
                    other => return Err(CompileError(format!("unknown operator {}", other))),
                };
                Ok(())
            }
            Expr::If { condition, consequence, alternative } => {
                self.compile_expression(condition)?;

                let jump_not_truthy_pos = self.emit(OpCode::JumpNotTruthy, &[9999]);
                self.compile_block(consequence)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(OpCode::Jump, &[9999]);
                let after_consequence_pos = self.current_instructions().len();
                self.change_operand(jump_not_truthy_pos, after_consequence_pos);

                match alternative {
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                }

                let after_alternative_pos = self.current_instructions().len();
                self.change_operand(jump_pos, after_alternative_pos);

                Ok(())
            }
            Expr::FunctionLiteral { parameters, body, name: _ } => {
                // A recursive self-reference (`let fib = fn(x) { fib(x - 1) }`)
                // resolves through the enclosing scope: `Stmt::Let` defines
                // the binding before compiling the value, so the lookup
                // inside the body finds it there and, if this is a nested
                // function, promotes it to a free variable like any other
                // outer-local reference. The parser's `name` field is only
                // used for diagnostics, not by the compiler.
                self.enter_scope();

                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.replace_last_pop_with_return_value();
                }
                if !self.last_instruction_is(OpCode::ReturnValue) {
                    self.emit(OpCode::Return, &[]);
                }

                let num_locals = self.symbol_table.num_definitions();
                let free_symbols = self.leave_scope();
                // Pop the function body's own instruction buffer before
                // emitting the free-variable loads below — those belong in
                // the enclosing scope's bytecode, right before `Closure`.
                let instructions = self.scopes.pop().unwrap_or_else(|| unreachable!()).instructions;

                for symbol in &free_symbols {
                    self.load_symbol(symbol.scope, symbol.index);
                }

                let compiled = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len() as u8,
                };
                let constant = self.add_constant(Value::CompiledFunction(std::rc::Rc::new(compiled)));
                self.emit(OpCode::Closure, &[constant, free_symbols.len()]);
                Ok(())
            }
            Expr::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
                Ok(())
            }
            Expr::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
                Ok(())
            }
            Expr::HashLiteral(pairs) => {
                // Sorted by each key expression's deterministic `Display`
                // form so the same literal always compiles to the same
                // instruction stream (§8's determinism property).
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len() * 2]);
                Ok(())
            }
            Expr::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
                Ok(())
            }
        }
    }

    fn load_symbol(&mut self, scope: SymbolScope, index: u16) {
        match scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[index as usize]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[index as usize]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[index as usize]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[index as usize]),
        };
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: Instructions) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend(instruction);
        position
    }

    fn set_last_instruction(&mut self, op: OpCode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode: op, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        match self.current_scope().last_instruction {
            Some(emitted) => emitted.opcode == op,
            None => false,
        }
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope.last_instruction.expect("remove_last_pop called with no emitted instruction");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: Instructions) {
        let scope = self.current_scope_mut();
        scope.instructions[position..position + new_instruction.len()].copy_from_slice(&new_instruction);
    }

    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_byte(self.current_instructions()[position]).expect("patched byte is a valid opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, new_instruction);
    }

    fn replace_last_pop_with_return_value(&mut self) {
        let last_position = self.current_scope().last_instruction.unwrap().position;
        let new_instruction = make(OpCode::ReturnValue, &[]);
        self.replace_instruction(last_position, new_instruction);
        self.current_scope_mut().last_instruction.as_mut().unwrap().opcode = OpCode::ReturnValue;
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        let table = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        self.symbol_table = table.push_enclosed();
    }

    /// Pops the current scope, returning the free variables it accumulated
    /// (captured before the symbol table itself is popped, since
    /// `pop_enclosed` consumes it).
    fn leave_scope(&mut self) -> Vec<crate::symbol_table::Symbol> {
        let table = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        let free_symbols = table.free_symbols.clone();
        self.symbol_table = table.pop_enclosed();
        free_symbols
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compiler always has at least one scope")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("compiler always has at least one scope")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    pub fn bytecode(self) -> crate::bytecode::Bytecode {
        let instructions = self.scopes.into_iter().next().unwrap_or_else(|| unreachable!()).instructions;
        crate::bytecode::Bytecode { instructions, constants: self.constants }
    }

    /// Like `bytecode`, but also hands back the symbol table so a REPL can
    /// carry both forward into the next input.
    pub fn into_parts(self) -> (crate::bytecode::Bytecode, SymbolTable) {
        let instructions = self.scopes.into_iter().next().unwrap_or_else(|| unreachable!()).instructions;
        let bytecode = crate::bytecode::Bytecode { instructions, constants: self.constants };
        (bytecode, self.symbol_table)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instructions_to_string;
    use crate::parser::parse;

    fn compile(source: &str) -> crate::bytecode::Bytecode {
        let program = parse(source).expect("parses");
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compiles");
        compiler.bytecode()
    }

    #[test]
    fn compiles_integer_arithmetic() {
        let bytecode = compile("1 + 2");
        assert_eq!(bytecode.constants, vec![Value::Integer(1), Value::Integer(2)]);
        let expected = vec![
            make(OpCode::Constant, &[0]),
            make(OpCode::Constant, &[1]),
            make(OpCode::Add, &[]),
            make(OpCode::Pop, &[]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn compiles_less_than_by_swapping_operands() {
        let bytecode = compile("1 < 2");
        let expected = vec![
            make(OpCode::Constant, &[1]),
            make(OpCode::Constant, &[0]),
            make(OpCode::GreaterThan, &[]),
            make(OpCode::Pop, &[]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn compiles_if_else_with_jump_patching() {
        let bytecode = compile("if (true) { 10 } else { 20 }; 3333;");
        let expected = vec![
            make(OpCode::True, &[]),
            make(OpCode::JumpNotTruthy, &[10]),
            make(OpCode::Constant, &[0]),
            make(OpCode::Jump, &[13]),
            make(OpCode::Constant, &[1]),
            make(OpCode::Pop, &[]),
            make(OpCode::Constant, &[2]),
            make(OpCode::Pop, &[]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn compiles_let_statements_and_global_bindings() {
        let bytecode = compile("let one = 1; let two = 2;");
        let expected = vec![
            make(OpCode::Constant, &[0]),
            make(OpCode::SetGlobal, &[0]),
            make(OpCode::Constant, &[1]),
            make(OpCode::SetGlobal, &[1]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn compiles_function_literal_with_return_value() {
        let bytecode = compile("fn() { return 5 + 10 }");
        match bytecode.constants.last().unwrap() {
            Value::CompiledFunction(f) => {
                let expected = vec![
                    make(OpCode::Constant, &[0]),
                    make(OpCode::Constant, &[1]),
                    make(OpCode::Add, &[]),
                    make(OpCode::ReturnValue, &[]),
                ]
                .concat();
                assert_eq!(f.instructions, expected);
            }
            other => panic!("expected compiled function constant, got {:?}", other),
        }
    }

    #[test]
    fn compiles_closures_with_free_variables() {
        let source = "fn(a) { fn(b) { a + b } }";
        let bytecode = compile(source);
        let disassembled = instructions_to_string(&bytecode.instructions);
        assert!(disassembled.contains("Closure"));
    }

    #[test]
    fn compiles_hash_literal_keys_in_deterministic_order() {
        let bytecode = compile(r#"{"b": 2, "a": 1}"#);
        // "a" sorts before "b" lexically regardless of source order.
        assert_eq!(bytecode.constants[0].inspect(), "a");
        assert_eq!(bytecode.constants[2].inspect(), "b");
    }

    #[test]
    fn compiling_undefined_identifier_fails() {
        let program = parse("foobar;").unwrap();
        let mut compiler = Compiler::new();
        assert!(compiler.compile_program(&program).is_err());
    }
}
