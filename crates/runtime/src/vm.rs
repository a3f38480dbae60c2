//! The bytecode interpreter: dispatch loop, call-frame mechanics, and the
//! semantics of every opcode (design spec §4.6).
//!
//! Mirrors the original's `vm.c` structure but threads the VM as an owned
//! value rather than a global: `Vm` holds the heap, the globals and
//! interner tables, the operand stack, and the call-frame stack, and is
//! constructed explicitly by the CLI (§9's "no global singleton" redesign
//! note).

use std::io::{self, Write};

use loxide_core::{
    FRAMES_MAX, Heap, LoxError, LoxFunction, NativeFn, Obj, ObjHandle, OpCode, STACK_MAX, Table,
    Value,
};
use tracing::{debug, trace};

use crate::natives;

/// One activation record: the function being executed, an instruction
/// pointer into its chunk, and the base index into the VM's shared operand
/// stack where this frame's window of slots begins (slot 0 is the callee
/// itself; slots `1..=arity` are the arguments).
struct CallFrame {
    function: ObjHandle,
    ip: usize,
    slots_base: usize,
}

/// The stack-based bytecode virtual machine: a value stack, a call-frame
/// stack, the object heap, and the two tables (`globals`, `strings`) the
/// design spec places under VM ownership.
///
/// `interpret` is the sole entry point once constructed; `trace` toggles
/// the per-instruction disassembly dump used by the CLI's `--trace` flag.
pub struct Vm {
    heap: Heap,
    globals: Table,
    strings: Table,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    stdout: Box<dyn Write>,
    pub trace: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Builds a VM writing `print` output to the process's stdout, with the
    /// standard native environment (`clock`) installed.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Builds a VM writing `print` output to `writer`, for tests that need
    /// to capture it.
    pub fn with_writer<W: Write + 'static>(writer: W) -> Self {
        natives::mark_process_start();
        let mut vm = Self {
            heap: Heap::new(),
            globals: Table::new(),
            strings: Table::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            stdout: Box::new(writer),
            trace: false,
        };
        vm.define_native("clock", natives::clock);
        debug!("VM initialized");
        vm
    }

    /// Registers a native function as a global, exactly as `define_native`
    /// does in the design spec: intern the name, allocate a `Native`
    /// object, store it directly in `globals`.
    fn define_native(&mut self, name: &str, func: NativeFn) {
        let name_handle = loxide_core::interner::copy_string(&mut self.heap, &mut self.strings, name);
        let native_handle = self.heap.alloc_native(name_handle, func);
        self.globals.set(&self.heap, name_handle, Value::Obj(native_handle));
        trace!(name, "registered native function");
    }

    /// Compiles and runs `source` as a fresh top-level script. Equivalent
    /// to the original's `interpret`: compile, seat frame 0 with the
    /// resulting function, then dispatch.
    pub fn interpret(&mut self, source: &str) -> Result<(), LoxError> {
        let function = loxide_compiler::compile(source, &mut self.heap, &mut self.strings)?;
        self.stack.push(Value::Obj(function));
        self.call(function, 0)?;
        self.run()
    }

    // --- call mechanics -----------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), LoxError> {
        let Value::Obj(handle) = callee else {
            return Err(self.runtime_error("Can only call functions and classes.".to_string()));
        };
        match self.heap.get(handle) {
            Obj::Function(_) => self.call(handle, arg_count),
            Obj::Native(native) => {
                let func = native.func;
                let start = self.stack.len() - arg_count as usize;
                let result = func(&self.stack[start..]);
                self.stack.truncate(start - 1);
                self.stack.push(result);
                Ok(())
            }
            Obj::String(_) => Err(self.runtime_error("Can only call functions and classes.".to_string())),
        }
    }

    fn call(&mut self, function: ObjHandle, arg_count: u8) -> Result<(), LoxError> {
        let arity = match self.heap.get(function) {
            Obj::Function(f) => f.arity,
            _ => unreachable!("call() is only invoked with a Function handle"),
        };
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "Expected {arity} arguments but got {arg_count}."
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow.".to_string()));
        }
        let slots_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { function, ip: 0, slots_base });
        Ok(())
    }

    // --- bytecode access ------------------------------------------------------

    fn frame_function<'a>(heap: &'a Heap, frame: &CallFrame) -> &'a LoxFunction {
        match heap.get(frame.function) {
            Obj::Function(f) => f,
            _ => unreachable!("CallFrame always names a Function handle"),
        }
    }

    fn read_byte(&mut self, frame_idx: usize) -> u8 {
        let ip = self.frames[frame_idx].ip;
        let byte = Self::frame_function(&self.heap, &self.frames[frame_idx]).chunk.code[ip];
        self.frames[frame_idx].ip += 1;
        byte
    }

    fn read_u16(&mut self, frame_idx: usize) -> u16 {
        let hi = self.read_byte(frame_idx) as u16;
        let lo = self.read_byte(frame_idx) as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self, frame_idx: usize) -> Value {
        let idx = self.read_byte(frame_idx);
        Self::frame_function(&self.heap, &self.frames[frame_idx]).chunk.constants[idx as usize]
    }

    fn read_string(&mut self, frame_idx: usize) -> ObjHandle {
        match self.read_constant(frame_idx) {
            Value::Obj(handle) => handle,
            _ => unreachable!("identifier constants are always interned strings"),
        }
    }

    // --- operand stack --------------------------------------------------------

    fn push(&mut self, value: Value) -> Result<(), LoxError> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error("Stack overflow.".to_string()));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler-emitted bytecode is balanced")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // --- the dispatch loop ------------------------------------------------------

    fn run(&mut self) -> Result<(), LoxError> {
        let mut frame_idx = self.frames.len() - 1;
        loop {
            if self.trace {
                let ip = self.frames[frame_idx].ip;
                let chunk = &Self::frame_function(&self.heap, &self.frames[frame_idx]).chunk;
                let (text, _) = crate::disassembler::disassemble_instruction(chunk, ip);
                eprintln!("{text}");
            }

            let byte = self.read_byte(frame_idx);
            let Some(op) = OpCode::from_u8(byte) else {
                return Err(self.runtime_error(format!("Corrupt bytecode: unknown opcode {byte}.")));
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant(frame_idx);
                    self.push(value)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte(frame_idx) as usize;
                    let base = self.frames[frame_idx].slots_base;
                    self.push(self.stack[base + slot])?;
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte(frame_idx) as usize;
                    let base = self.frames[frame_idx].slots_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string(frame_idx);
                    match self.globals.get(&self.heap, name) {
                        Some(value) => self.push(value)?,
                        None => {
                            let message = self.undefined_variable_message(name);
                            return Err(self.runtime_error(message));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string(frame_idx);
                    let value = self.peek(0);
                    self.globals.set(&self.heap, name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string(frame_idx);
                    let value = self.peek(0);
                    if self.globals.set(&self.heap, name, value) {
                        self.globals.delete(&self.heap, name);
                        let message = self.undefined_variable_message(name);
                        return Err(self.runtime_error(message));
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => self.binary_comparison(|a, b| a > b)?,
                OpCode::Less => self.binary_comparison(|a, b| a < b)?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_arith(|a, b| a - b)?,
                OpCode::Multiply => self.binary_arith(|a, b| a * b)?,
                OpCode::Divide => self.binary_arith(|a, b| a / b)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        return Err(self.runtime_error("Operand must be a number.".to_string()));
                    };
                    self.pop();
                    self.push(Value::Number(-n))?;
                }
                OpCode::Print => {
                    let value = self.pop();
                    let rendered = value.display(&self.heap).to_string();
                    writeln!(self.stdout, "{rendered}").expect("write to print sink failed");
                }
                OpCode::Jump => {
                    let offset = self.read_u16(frame_idx);
                    self.frames[frame_idx].ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16(frame_idx);
                    if self.peek(0).is_falsey() {
                        self.frames[frame_idx].ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16(frame_idx);
                    self.frames[frame_idx].ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte(frame_idx);
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                    frame_idx = self.frames.len() - 1;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let finished = self.frames.pop().expect("run() always has an active frame");
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(finished.slots_base);
                    self.push(result)?;
                    frame_idx = self.frames.len() - 1;
                }
            }
        }
    }

    fn binary_arith(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), LoxError> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err(self.runtime_error("Operands must be numbers.".to_string()));
        };
        self.pop();
        self.pop();
        self.push(Value::Number(op(a, b)))
    }

    fn binary_comparison(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), LoxError> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err(self.runtime_error("Operands must be numbers.".to_string()));
        };
        self.pop();
        self.pop();
        self.push(Value::Bool(op(a, b)))
    }

    fn add(&mut self) -> Result<(), LoxError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b))
            }
            (Value::Obj(a), Value::Obj(b))
                if self.peek(1).is_string(&self.heap) && self.peek(0).is_string(&self.heap) =>
            {
                let mut concatenated = self.heap.as_string(a).bytes.to_string();
                concatenated.push_str(&self.heap.as_string(b).bytes);
                self.pop();
                self.pop();
                let handle = loxide_core::interner::take_string(&mut self.heap, &mut self.strings, concatenated);
                self.push(Value::Obj(handle))
            }
            _ => Err(self.runtime_error("Operands must be two numbers or two strings.".to_string())),
        }
    }

    fn undefined_variable_message(&self, name: ObjHandle) -> String {
        format!("Undefined variable '{}'.", self.heap.as_string(name).bytes)
    }

    /// Formats `message`, walks the frame stack top-first printing `[line
    /// N] in <name|script>` for each, then resets the stack and frame
    /// array (§4.6). The message and trace are written to stderr
    /// immediately, since the frames needed to produce the trace are gone
    /// once this function returns the reported [`LoxError`].
    fn runtime_error(&mut self, message: String) -> LoxError {
        let mut report = format!("{message}\n");
        for frame in self.frames.iter().rev() {
            let function = Self::frame_function(&self.heap, frame);
            let line = function.chunk.line_at(frame.ip.saturating_sub(1));
            let name = match function.name {
                None => "script".to_string(),
                Some(handle) => self.heap.as_string(handle).bytes.to_string(),
            };
            report.push_str(&format!("[line {line}] in {name}\n"));
        }
        eprint!("{report}");
        self.stack.clear();
        self.frames.clear();
        LoxError::Runtime(message)
    }

    /// Number of live heap objects, exposed for tests that assert on
    /// interning/allocation behavior.
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }
}
