//! The standard native-function environment installed into every fresh
//! [`crate::Vm`] (design spec §4.6: "the standard environment defines
//! `clock()`").

use std::sync::OnceLock;
use std::time::Instant;

use loxide_core::Value;

static START: OnceLock<Instant> = OnceLock::new();

/// Stamps [`START`] if it isn't already set. Called from [`crate::Vm`]'s
/// constructors so the reference point is process-start time, not whenever
/// a script first happens to call `clock()`.
pub(crate) fn mark_process_start() {
    START.get_or_init(Instant::now);
}

/// Seconds elapsed since this process's VM was constructed, as an `f64`.
/// Arguments are ignored; `clock` takes none.
pub fn clock(_args: &[Value]) -> Value {
    let start = START.get_or_init(Instant::now);
    Value::Number(start.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_nonnegative_number() {
        let Value::Number(n) = clock(&[]) else { panic!("clock() must return a Number") };
        assert!(n >= 0.0);
    }
}
