//! The string interner: the only legitimate path by which a `String` object
//! is created.
//!
//! Every `LoxString` allocation goes through [`copy_string`] or
//! [`take_string`] so that the identity invariant holds: for any two live
//! strings `a`, `b`, `a` and `b` are the same object iff their bytes are
//! equal. Both functions probe the VM's dedicated `strings` table (keyed by
//! content and hash) before allocating, so a second occurrence of the same
//! literal or computed string reuses the existing object.

use crate::heap::{Heap, ObjHandle};
use crate::table::Table;
use crate::value::Value;

/// 32-bit FNV-1a, exactly as specified: offset basis `2166136261`, prime
/// `16777619`, one XOR-then-multiply per byte.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Interns `text`, copying it onto the heap only if an equal string isn't
/// already interned.
pub fn copy_string(heap: &mut Heap, strings: &mut Table, text: &str) -> ObjHandle {
    let hash = fnv1a_hash(text.as_bytes());
    if let Some(existing) = strings.find_string(heap, text, hash) {
        return existing;
    }
    let handle = heap.alloc_string_uninterned(text.into(), hash);
    strings.set(heap, handle, Value::Nil);
    handle
}

/// Interns an owned `String`, reusing an existing interned copy if one
/// exists (in which case the caller's buffer is simply dropped — Rust's
/// ownership makes the original's explicit "free the caller's buffer" step
/// implicit).
pub fn take_string(heap: &mut Heap, strings: &mut Table, text: String) -> ObjHandle {
    let hash = fnv1a_hash(text.as_bytes());
    if let Some(existing) = strings.find_string(heap, &text, hash) {
        return existing;
    }
    let handle = heap.alloc_string_uninterned(text.into_boxed_str(), hash);
    strings.set(heap, handle, Value::Nil);
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_intern_to_the_same_handle() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let a = copy_string(&mut heap, &mut strings, "hello");
        let b = copy_string(&mut heap, &mut strings, "hello");
        assert_eq!(a, b);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn distinct_strings_intern_to_distinct_handles() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let a = copy_string(&mut heap, &mut strings, "foo");
        let b = copy_string(&mut heap, &mut strings, "bar");
        assert_ne!(a, b);
    }

    #[test]
    fn take_string_dedupes_against_copy_string() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let a = copy_string(&mut heap, &mut strings, "shared");
        let b = take_string(&mut heap, &mut strings, "shared".to_string());
        assert_eq!(a, b);
        assert_eq!(heap.len(), 1);
    }
}
