//! Black-box integration tests driving [`Vm::interpret`] end to end and
//! asserting on captured stdout, in the style of this workspace's existing
//! `crates/runtime/tests/test_closures.rs`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use loxide_core::LoxError;
use loxide_runtime::Vm;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn interpret_ok(source: &str) -> String {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_writer(buf.clone());
    vm.interpret(source).expect("source should interpret cleanly");
    String::from_utf8(buf.0.lock().unwrap().clone()).unwrap()
}

#[test]
fn native_clock_returns_a_number() {
    let output = interpret_ok(
        r#"
        var start = clock();
        print start >= 0;
        "#,
    );
    assert_eq!(output, "true\n");
}

#[test]
fn nested_scopes_and_shadowing() {
    let output = interpret_ok(
        r#"
        var a = "outer";
        {
            var a = "inner";
            print a;
        }
        print a;
        "#,
    );
    assert_eq!(output, "inner\nouter\n");
}

#[test]
fn functions_close_over_nothing_but_share_globals() {
    let output = interpret_ok(
        r#"
        var total = 0;
        fun add(n) {
            total = total + n;
            return total;
        }
        print add(1);
        print add(2);
        print add(3);
        "#,
    );
    assert_eq!(output, "1\n3\n6\n");
}

#[test]
fn sixty_three_nested_calls_leave_room_for_the_script_frame() {
    let mut source = String::new();
    for i in 0..63 {
        if i == 62 {
            source.push_str("fun f62() { return 62; }\n");
        } else {
            source.push_str(&format!("fun f{i}() {{ return f{}(); }}\n", i + 1));
        }
    }
    source.push_str("print f0();\n");
    assert_eq!(interpret_ok(&source), "62\n");
}

#[test]
fn sixty_four_nested_calls_overflow_the_frame_stack() {
    let mut source = String::new();
    for i in 0..64 {
        if i == 63 {
            source.push_str("fun f63() { return 63; }\n");
        } else {
            source.push_str(&format!("fun f{i}() {{ return f{}(); }}\n", i + 1));
        }
    }
    source.push_str("print f0();\n");

    let buf = SharedBuf::default();
    let mut vm = Vm::with_writer(buf);
    let err = vm.interpret(&source).unwrap_err();
    assert_eq!(err, LoxError::Runtime("Stack overflow.".to_string()));
}

#[test]
fn runtime_error_resets_the_vm_for_the_next_interpretation() {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_writer(buf.clone());
    assert!(vm.interpret("print undefined_name;").is_err());
    // The VM must still be usable after a runtime error: the stack and
    // frame array were reset, not left corrupt.
    vm.interpret("print 1 + 1;").expect("VM should recover after a runtime error");
    assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), "2\n");
}

#[test]
fn string_equality_is_by_content_via_interning() {
    let output = interpret_ok(
        r#"
        var a = "sameval";
        var b = "same" + "val";
        print a == b;
        "#,
    );
    assert_eq!(output, "true\n");
}

#[test]
fn mixed_type_comparison_is_a_runtime_error() {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_writer(buf);
    let err = vm.interpret("print 1 + \"a\";").unwrap_err();
    assert_eq!(err, LoxError::Runtime("Operands must be two numbers or two strings.".to_string()));
}
