// File: src/vm.rs
//
// Stack-based bytecode virtual machine. Grounded in the original
// implementation's `vm/vm.go` and `vm/frame.go`: fetch-decode-execute loop
// over a fixed-size operand stack, a fixed-size global store, and a stack
// of call frames for closures.

use std::rc::Rc;

use crate::bytecode::{read_u16, read_u8, Bytecode, OpCode};
use crate::frame::Frame;
use crate::value::{Closure, CompiledFunction, MonkeyHash, Value};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct VmError(pub String);

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

const TRUE: Value = Value::Boolean(true);
const FALSE: Value = Value::Boolean(false);

pub struct VirtualMachine {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    pub globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl VirtualMachine {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_global_store(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Resumes a VM with a global store carried over from a previous REPL
    /// input, matching `new_with_state`'s symbol table threading in the
    /// compiler.
    pub fn new_with_global_store(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure { function: main_function, free: Vec::new() });
        let main_frame = Frame::new(main_closure, 0);

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main_frame);

        VirtualMachine {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    pub fn stack_top(&self) -> Option<&Value> {
        if self.sp == 0 {
            None
        } else {
            Some(&self.stack[self.sp - 1])
        }
    }

    /// After `run()` finishes, the top-level expression's result sits just
    /// past `sp` — the final `Pop` decremented `sp` without clearing the
    /// slot. This is what the REPL and integration tests read back.
    pub fn last_popped_stack_element(&self) -> &Value {
        &self.stack[self.sp]
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("vm always has at least the main frame")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError("stack overflow".to_string()));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("pop_frame called with only the main frame left")
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        loop {
            let (ip, instructions_len) = {
                let frame = self.current_frame();
                (frame.ip, frame.instructions().len())
            };
            let ip = ip + 1;
            if ip as usize >= instructions_len {
                if self.frames.len() == 1 {
                    break;
                }
                // A function body with no trailing statement simply runs out
                // of instructions; treat it the same as an explicit Return.
                self.execute_return(None)?;
                continue;
            }
            self.current_frame().ip = ip;

            // Clone the `Rc`, not the instruction bytes: cheap, and frees us
            // from holding a borrow of `self` across the dispatch below.
            let function = Rc::clone(&self.current_frame().closure.function);
            let instructions = &function.instructions;
            let ip = ip as usize;
            let op = match OpCode::from_byte(instructions[ip]) {
                Some(op) => op,
                None => return Err(VmError(format!("unknown opcode {}", instructions[ip]))),
            };

            match op {
                OpCode::Constant => {
                    let index = read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 2;
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::True => self.push(TRUE)?,
                OpCode::False => self.push(FALSE)?,
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                OpCode::Minus => self.execute_minus_operator()?,
                OpCode::Bang => self.execute_bang_operator()?,
                OpCode::Jump => {
                    let pos = read_u16(&instructions[ip + 1..]) as i64;
                    self.current_frame().ip = pos - 1;
                }
                OpCode::JumpNotTruthy => {
                    let pos = read_u16(&instructions[ip + 1..]) as i64;
                    self.current_frame().ip += 2;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame().ip = pos - 1;
                    }
                }
                OpCode::Null => self.push(Value::Null)?,
                OpCode::GetGlobal => {
                    let index = read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 2;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let index = read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 2;
                    let value = self.pop();
                    self.globals[index] = value;
                }
                OpCode::GetLocal => {
                    let index = read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let index = read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + index] = value;
                }
                OpCode::GetFree => {
                    let index = read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 1;
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }
                OpCode::GetBuiltin => {
                    let index = read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 1;
                    let builtin = crate::builtins::BUILTINS[index];
                    self.push(Value::Builtin(builtin))?;
                }
                OpCode::Array => {
                    let num_elements = read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 2;
                    let array = self.build_array(self.sp - num_elements, self.sp);
                    self.sp -= num_elements;
                    self.push(array)?;
                }
                OpCode::Hash => {
                    let num_elements = read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 2;
                    let hash = self.build_hash(self.sp - num_elements, self.sp)?;
                    self.sp -= num_elements;
                    self.push(hash)?;
                }
                OpCode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }
                OpCode::Call => {
                    let num_args = read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame().ip += 1;
                    self.execute_call(num_args)?;
                }
                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    self.execute_return(Some(return_value))?;
                }
                OpCode::Return => {
                    self.execute_return(None)?;
                }
                OpCode::Closure => {
                    let const_index = read_u16(&instructions[ip + 1..]) as usize;
                    let num_free = read_u8(&instructions[ip + 3..]) as usize;
                    self.current_frame().ip += 3;
                    self.push_closure(const_index, num_free)?;
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            return Err(VmError("stack overflow".to_string()));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        let value = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        value
    }

    fn execute_return(&mut self, return_value: Option<Value>) -> Result<(), VmError> {
        let frame = self.pop_frame();
        self.sp = frame.base_pointer - 1;
        self.push(return_value.unwrap_or(Value::Null))
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => self.execute_binary_integer_operation(op, *l, *r),
            (Value::Str(l), Value::Str(r)) => self.execute_binary_string_operation(op, l, r),
            _ => Err(VmError(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: OpCode, left: i64, right: i64) -> Result<(), VmError> {
        let result = match op {
            OpCode::Add => left + right,
            OpCode::Sub => left - right,
            OpCode::Mul => left * right,
            OpCode::Div => {
                if right == 0 {
                    return Err(VmError("integer divide by zero".to_string()));
                }
                left / right
            }
            other => unreachable!("{:?} is not a binary integer operation", other),
        };
        self.push(Value::Integer(result))
    }

    fn execute_binary_string_operation(&mut self, op: OpCode, left: &str, right: &str) -> Result<(), VmError> {
        if op != OpCode::Add {
            return Err(VmError(format!("unknown string operator: {:?}", op)));
        }
        self.push(Value::str(format!("{}{}", left, right)))
    }

    fn execute_comparison(&mut self, op: OpCode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            return self.execute_integer_comparison(op, *l, *r);
        }
        match op {
            OpCode::Equal => self.push(Self::native_bool_to_value(left == right)),
            OpCode::NotEqual => self.push(Self::native_bool_to_value(left != right)),
            other => Err(VmError(format!(
                "unknown operator: {:?} ({} {})",
                other,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn execute_integer_comparison(&mut self, op: OpCode, left: i64, right: i64) -> Result<(), VmError> {
        let result = match op {
            OpCode::Equal => left == right,
            OpCode::NotEqual => left != right,
            OpCode::GreaterThan => left > right,
            other => unreachable!("{:?} is not an integer comparison", other),
        };
        self.push(Self::native_bool_to_value(result))
    }

    fn native_bool_to_value(b: bool) -> Value {
        if b {
            TRUE
        } else {
            FALSE
        }
    }

    fn execute_minus_operator(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        match operand {
            Value::Integer(n) => self.push(Value::Integer(-n)),
            other => Err(VmError(format!("unsupported type for negation: {}", other.type_name()))),
        }
    }

    fn execute_bang_operator(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        let result = match operand {
            Value::Boolean(true) => FALSE,
            Value::Boolean(false) => TRUE,
            Value::Null => TRUE,
            _ => FALSE,
        };
        self.push(result)
    }

    fn build_array(&self, start: usize, end: usize) -> Value {
        Value::array(self.stack[start..end].to_vec())
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, VmError> {
        let mut hash = MonkeyHash::default();
        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = key
                .hash_key()
                .ok_or_else(|| VmError(format!("unusable as hash key: {}", key.type_name())))?;
            hash.pairs.insert(hash_key, (key, value));
            i += 2;
        }
        Ok(Value::Hash(Rc::new(hash)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<(), VmError> {
        match (&left, &index) {
            (Value::Array(_), Value::Integer(_)) => self.execute_array_index(left, index),
            (Value::Hash(_), _) => self.execute_hash_index(left, index),
            _ => Err(VmError(format!("index operator not supported: {}", left.type_name()))),
        }
    }

    fn execute_array_index(&mut self, left: Value, index: Value) -> Result<(), VmError> {
        let elements = match &left {
            Value::Array(elements) => elements,
            _ => unreachable!(),
        };
        let i = match index {
            Value::Integer(i) => i,
            _ => unreachable!(),
        };
        if i < 0 || i as usize >= elements.len() {
            return self.push(Value::Null);
        }
        self.push(elements[i as usize].clone())
    }

    fn execute_hash_index(&mut self, left: Value, index: Value) -> Result<(), VmError> {
        let hash = match &left {
            Value::Hash(hash) => hash,
            _ => unreachable!(),
        };
        let hash_key = match index.hash_key() {
            Some(key) => key,
            None => return Err(VmError(format!("unusable as hash key: {}", index.type_name()))),
        };
        match hash.pairs.get(&hash_key) {
            Some((_, value)) => self.push(value.clone()),
            None => self.push(Value::Null),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(VmError("calling non-closure and non-builtin".to_string())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), VmError> {
        if num_args != closure.function.num_parameters as usize {
            return Err(VmError(format!(
                "wrong number of arguments: want={}, got={}",
                closure.function.num_parameters, num_args
            )));
        }
        let num_locals = closure.function.num_locals as usize;
        let base_pointer = self.sp - num_args;
        let frame = Frame::new(closure, base_pointer);
        self.push_frame(frame)?;
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: crate::value::Builtin, num_args: usize) -> Result<(), VmError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args);
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), VmError> {
        let function = match &self.constants[const_index] {
            Value::CompiledFunction(f) => f.clone(),
            other => return Err(VmError(format!("not a function: {}", other.type_name()))),
        };
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }
}
