// File: src/frame.rs
//
// Call-frame bookkeeping for the VM. Grounded in the original
// implementation's `vm/frame.go`: one frame per active closure invocation,
// holding its own instruction pointer and the stack base its locals sit
// above.

use std::rc::Rc;

use crate::bytecode::Instructions;
use crate::value::Closure;

pub struct Frame {
    pub closure: Rc<Closure>,
    /// Index of the instruction about to execute, minus one. The VM's fetch
    /// loop increments before reading, so a fresh frame starts at -1 to land
    /// on instruction 0 first.
    pub ip: i64,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame { closure, ip: -1, base_pointer }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}
