//! Open-addressing hash table with tombstones, keyed by interned strings.
//!
//! Shared building block for the VM's globals table and the string
//! interner. Probing is linear (`i = hash mod capacity`, then `i+1` on
//! miss); deletions leave a tombstone (`key = None`, `value = Bool(true)`)
//! so an in-flight probe chain through a deleted slot isn't broken. An
//! empty entry is `key = None`, `value = Nil`.

use crate::heap::{Heap, Obj, ObjHandle};
use crate::value::Value;

const MAX_LOAD: f64 = 0.75;

#[derive(Clone, Copy)]
struct Entry {
    key: Option<ObjHandle>,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry { key: None, value: Value::Nil };
}

#[derive(Debug, Default)]
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the value for `key`, or `None` if the table is empty or the
    /// key is absent.
    pub fn get(&self, heap: &Heap, key: ObjHandle) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.find_entry(heap, key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Inserts or overwrites `key`. Returns `true` iff the key was newly
    /// added (a tombstone slot counts as "was absent" for the return value,
    /// but not for the `count` bookkeeping that guards against probe-chain
    /// collapse — `count` already includes tombstones).
    pub fn set(&mut self, heap: &Heap, key: ObjHandle, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            let new_capacity = grow_capacity(self.capacity());
            self.adjust_capacity(heap, new_capacity);
        }
        let idx = self.find_entry(heap, key);
        let is_new_key = self.entries[idx].key.is_none();
        if is_new_key && matches!(self.entries[idx].value, Value::Nil) {
            self.count += 1;
        }
        self.entries[idx] = Entry { key: Some(key), value };
        is_new_key
    }

    /// Replaces `key`'s entry with a tombstone. `count` is not decremented
    /// — this is what lets [`set`](Self::set) tell "newly inserted" apart
    /// from "reinserted after a delete" without a second table.
    pub fn delete(&mut self, heap: &Heap, key: ObjHandle) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = self.find_entry(heap, key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx] = Entry { key: None, value: Value::Bool(true) };
        true
    }

    /// Copies every live (non-tombstone) entry from `from` into `self`.
    pub fn add_all(&mut self, heap: &Heap, from: &Table) {
        for entry in &from.entries {
            if let Some(key) = entry.key {
                self.set(heap, key, entry.value);
            }
        }
    }

    /// Interner-side lookup: probes by hash, then compares length, hash,
    /// and byte content directly, since no `ObjHandle` exists yet for the
    /// candidate string.
    pub fn find_string(&self, heap: &Heap, text: &str, hash: u32) -> Option<ObjHandle> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.capacity();
        let mut i = hash as usize % capacity;
        loop {
            let entry = &self.entries[i];
            match entry.key {
                None if matches!(entry.value, Value::Nil) => return None,
                Some(handle) => {
                    if let Obj::String(s) = heap.get(handle)
                        && s.hash == hash
                        && s.bytes.as_bytes() == text.as_bytes()
                    {
                        return Some(handle);
                    }
                }
                None => {}
            }
            i = (i + 1) % capacity;
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_entry(&self, heap: &Heap, key: ObjHandle) -> usize {
        let capacity = self.capacity();
        let hash = string_hash(heap, key);
        let mut i = hash as usize % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &self.entries[i];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Nil) {
                        return tombstone.unwrap_or(i);
                    }
                    if tombstone.is_none() {
                        tombstone = Some(i);
                    }
                }
                Some(k) if k == key => return i,
                Some(_) => {}
            }
            i = (i + 1) % capacity;
        }
    }

    /// Rehashes every live entry into a fresh array of `capacity` slots,
    /// dropping tombstones and recomputing `count`.
    fn adjust_capacity(&mut self, heap: &Heap, capacity: usize) {
        let mut fresh = vec![Entry::EMPTY; capacity];
        let mut count = 0;
        for entry in self.entries.drain(..) {
            let Some(key) = entry.key else { continue };
            let hash = string_hash(heap, key);
            let mut i = hash as usize % capacity;
            loop {
                if fresh[i].key.is_none() {
                    fresh[i] = Entry { key: Some(key), value: entry.value };
                    count += 1;
                    break;
                }
                i = (i + 1) % capacity;
            }
        }
        self.entries = fresh;
        self.count = count;
    }
}

fn string_hash(heap: &Heap, handle: ObjHandle) -> u32 {
    match heap.get(handle) {
        Obj::String(s) => s.hash,
        other => panic!("table keys must be interned strings, found {other:?}"),
    }
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 { 8 } else { capacity * 2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::copy_string;

    #[test]
    fn set_then_get_returns_the_value() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let key = copy_string(&mut heap, &mut strings, "answer");
        let mut table = Table::new();
        assert!(table.set(&heap, key, Value::Number(42.0)));
        assert_eq!(table.get(&heap, key), Some(Value::Number(42.0)));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let key = copy_string(&mut heap, &mut strings, "gone");
        let mut table = Table::new();
        table.set(&heap, key, Value::Bool(true));
        assert!(table.delete(&heap, key));
        assert_eq!(table.get(&heap, key), None);
    }

    #[test]
    fn set_returns_false_for_overwrite() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let key = copy_string(&mut heap, &mut strings, "k");
        let mut table = Table::new();
        assert!(table.set(&heap, key, Value::Number(1.0)));
        assert!(!table.set(&heap, key, Value::Number(2.0)));
        assert_eq!(table.get(&heap, key), Some(Value::Number(2.0)));
    }

    #[test]
    fn empty_table_lookups_short_circuit() {
        let heap = Heap::new();
        let table = Table::new();
        assert_eq!(table.len(), 0);
        assert_eq!(table.find_string(&heap, "anything", 0), None);
    }

    #[test]
    fn repeated_set_delete_cycles_bound_capacity_growth() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let key = copy_string(&mut heap, &mut strings, "churn");
        let mut table = Table::new();
        for i in 0..1000 {
            table.set(&heap, key, Value::Number(f64::from(i)));
            table.delete(&heap, key);
        }
        // A single key cycling through set/delete must never grow capacity
        // beyond the load-factor bound for one live slot.
        assert!(table.capacity() <= 8);
    }

    #[test]
    fn growth_preserves_all_live_entries() {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let mut table = Table::new();
        let mut keys = Vec::new();
        for i in 0..50 {
            let key = copy_string(&mut heap, &mut strings, &format!("key{i}"));
            table.set(&heap, key, Value::Number(f64::from(i)));
            keys.push(key);
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(&heap, *key), Some(Value::Number(i as f64)));
        }
    }
}
