//! The object heap: an arena of heap-allocated Loxide objects indexed by a
//! stable handle.
//!
//! The original threads every allocation onto an intrusive `next`-pointer
//! list rooted in the VM, so teardown can walk and free every live object.
//! Per the design spec's redesign note, this becomes a `Vec<Obj>` owned by
//! `Heap`: the vector *is* the object list, an `ObjHandle` is a stable index
//! into it, and two handles are equal iff they name the same object — the
//! handle-identity invariant the original gets from raw pointer identity.
//! Reclamation is deferred to `Heap`'s own `Drop` (whole-arena teardown);
//! no tracing collector runs between opcodes.

use crate::chunk::Chunk;
use crate::value::Value;

/// A stable index into a [`Heap`]'s object arena. Two handles compare equal
/// iff they were produced by the same allocation — this is the object
/// identity the language's `Obj` equality relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjHandle(u32);

/// A heap-allocated Loxide object. Every variant here is a first-class
/// [`Value`] payload (`Value::Obj(handle)` names one of these).
#[derive(Debug)]
pub enum Obj {
    String(LoxString),
    Function(LoxFunction),
    Native(NativeFunction),
}

/// An immutable interned byte string plus its precomputed FNV-1a hash.
#[derive(Debug)]
pub struct LoxString {
    pub bytes: Box<str>,
    pub hash: u32,
}

/// A compiled function: its arity, its own chunk, and an optional name
/// (the top-level script is compiled as an anonymous function, `name =
/// None`).
#[derive(Debug)]
pub struct LoxFunction {
    pub arity: u8,
    pub chunk: Chunk,
    pub name: Option<ObjHandle>,
}

/// A host callable: `(arg_count, arg_slice) -> Value`. Arguments arrive on
/// the operand stack, exactly as for a Loxide-defined function.
pub type NativeFn = fn(&[Value]) -> Value;

/// A native function handle registered as a global.
#[derive(Debug)]
pub struct NativeFunction {
    pub name: ObjHandle,
    pub func: NativeFn,
}

/// An arena owning every heap object allocated during one VM lifetime.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Obj>,
}

impl Heap {
    pub fn new() -> Self {
        Self { objects: Vec::new() }
    }

    pub fn get(&self, handle: ObjHandle) -> &Obj {
        &self.objects[handle.0 as usize]
    }

    pub fn as_string(&self, handle: ObjHandle) -> &LoxString {
        match self.get(handle) {
            Obj::String(s) => s,
            other => panic!("ObjHandle did not name a string: {other:?}"),
        }
    }

    /// Number of objects allocated so far (for diagnostics and tests).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn alloc(&mut self, obj: Obj) -> ObjHandle {
        let handle = ObjHandle(
            u32::try_from(self.objects.len()).expect("object arena exceeded u32::MAX entries"),
        );
        self.objects.push(obj);
        handle
    }

    /// Allocates a raw string object without interning. Only
    /// [`crate::interner`] may call this — direct allocation elsewhere would
    /// break the "identity implies equality" invariant.
    pub(crate) fn alloc_string_uninterned(&mut self, bytes: Box<str>, hash: u32) -> ObjHandle {
        self.alloc(Obj::String(LoxString { bytes, hash }))
    }

    pub fn alloc_function(&mut self, arity: u8, chunk: Chunk, name: Option<ObjHandle>) -> ObjHandle {
        self.alloc(Obj::Function(LoxFunction { arity, chunk, name }))
    }

    pub fn alloc_native(&mut self, name: ObjHandle, func: NativeFn) -> ObjHandle {
        self.alloc(Obj::Native(NativeFunction { name, func }))
    }
}
