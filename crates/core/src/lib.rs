//! Loxide Core: the value representation, object heap, and hash table shared
//! by the Loxide compiler and runtime.
//!
//! # Modules
//!
//! - [`value`]: the tagged [`Value`] union every Loxide expression produces.
//! - [`heap`]: an arena of heap-allocated objects (strings, functions,
//!   natives) indexed by a stable handle, standing in for the original's
//!   intrusive object list.
//! - [`interner`]: the dedicated string-interning entry points
//!   (`copy_string`, `take_string`) that every string allocation must go
//!   through, so that string equality reduces to handle equality.
//! - [`table`]: the open-addressing hash table backing both globals and the
//!   interner.
//! - [`chunk`]: a function's bytecode buffer, line table, and constant pool.
//! - [`opcode`]: the bytecode instruction set.
//! - [`error`]: the two-domain compile/runtime error type.

pub mod chunk;
pub mod error;
pub mod heap;
pub mod interner;
pub mod opcode;
pub mod table;
pub mod value;

pub use chunk::Chunk;
pub use error::LoxError;
pub use heap::{Heap, LoxFunction, LoxString, NativeFn, NativeFunction, Obj, ObjHandle};
pub use opcode::OpCode;
pub use table::Table;
pub use value::Value;

/// Maximum number of nested call frames.
pub const FRAMES_MAX: usize = 64;

/// Operand stack capacity: one 256-slot window per frame.
pub const STACK_MAX: usize = FRAMES_MAX * (u8::MAX as usize + 1);
