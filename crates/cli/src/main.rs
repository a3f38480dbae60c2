//! Loxide: command-line REPL and script runner.
//!
//! Argument handling is hand-parsed rather than built on `clap` (see
//! `DESIGN.md`): the exit-code and usage-message contract in the design
//! spec's §6 is exact, and `clap`'s own usage-error exit code and
//! auto-generated help text would conflict with it.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use loxide_core::LoxError;
use loxide_runtime::Vm;
use tracing::info;

/// `fgets`-style line buffer cap: a REPL line (including its trailing
/// newline) longer than this is truncated, and the remainder is left in
/// the stream for the next read — matching `examples/original_source/main.c`.
const REPL_LINE_MAX: usize = 1024;

const EXIT_USAGE: u8 = 64;
const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;
const EXIT_IO_ERROR: u8 = 74;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("loxide=info".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    ExitCode::from(run(&args))
}

fn run(args: &[String]) -> u8 {
    match args {
        [] => {
            repl();
            0
        }
        // A single positional argument is always a bare path, even one
        // literally named "run" — the `run` subcommand only kicks in once a
        // second argument disambiguates it.
        [path] => run_file(path, false),
        [cmd, path] if cmd == "run" => run_file(path, false),
        [cmd, path, flag] if cmd == "run" && flag == "--trace" => run_file(path, true),
        _ => {
            eprintln!("Usage: loxide [path]");
            EXIT_USAGE
        }
    }
}

/// Reads newline-terminated lines from stdin (max 1024 bytes per line,
/// `fgets`-style truncation) and interprets each, printing a fresh `>`
/// prompt. A runtime error resets the VM's stack and prints its own trace;
/// the REPL continues afterward rather than exiting.
fn repl() {
    let mut vm = Vm::new();
    info!("starting REPL");
    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let line = match read_bounded_line(&mut reader) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                eprintln!("Error reading input: {err}");
                break;
            }
        };

        match vm.interpret(&line) {
            Ok(()) | Err(LoxError::Runtime(_)) => {}
            Err(LoxError::Compile(message)) => eprintln!("{message}"),
        }
    }
}

/// Reads one `fgets(buf, 1024, stdin)`-equivalent line: up to
/// [`REPL_LINE_MAX`] bytes, stopping at (and including) the first `\n`.
/// Returns `Ok(None)` at EOF with nothing read.
fn read_bounded_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(REPL_LINE_MAX);
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= REPL_LINE_MAX {
            break;
        }
        let n = reader.read(&mut byte)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }
        buf.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Reads `path` as UTF-8 and interprets it, mapping the outcome to the
/// §6 exit-code contract.
fn run_file(path: &str, trace: bool) -> u8 {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file \"{path}\": {err}");
            return EXIT_IO_ERROR;
        }
    };

    let mut vm = Vm::new();
    vm.trace = trace;
    match vm.interpret(&source) {
        Ok(()) => 0,
        Err(LoxError::Compile(message)) => {
            eprintln!("{message}");
            EXIT_COMPILE_ERROR
        }
        Err(LoxError::Runtime(_)) => EXIT_RUNTIME_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_a_single_line() {
        let mut cursor = Cursor::new(b"print 1;\n".to_vec());
        let line = read_bounded_line(&mut cursor).unwrap().unwrap();
        assert_eq!(line, "print 1;\n");
    }

    #[test]
    fn returns_none_at_immediate_eof() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_bounded_line(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncates_lines_longer_than_1024_bytes() {
        let long_line = "a".repeat(2000) + "\n";
        let mut cursor = Cursor::new(long_line.into_bytes());
        let first = read_bounded_line(&mut cursor).unwrap().unwrap();
        assert_eq!(first.len(), REPL_LINE_MAX);
        // The unread remainder (including the trailing newline) is left in
        // the stream for the next read, matching `fgets` truncation.
        let second = read_bounded_line(&mut cursor).unwrap().unwrap();
        assert!(second.ends_with('\n'));
    }

    #[test]
    fn unrecognized_argument_count_is_a_usage_error() {
        let code = run(&["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]);
        assert_eq!(code, EXIT_USAGE);
    }

    #[test]
    fn bare_path_runs_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.lox");
        std::fs::write(&path, "print 1 + 1;\n").unwrap();
        let code = run(&[path.to_string_lossy().into_owned()]);
        assert_eq!(code, 0);
    }

    #[test]
    fn a_file_literally_named_run_is_still_run_as_a_bare_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run");
        std::fs::write(&path, "print 1;\n").unwrap();
        let code = run(&[path.to_string_lossy().into_owned()]);
        assert_eq!(code, 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let code = run(&["/nonexistent/path/does-not-exist.lox".to_string()]);
        assert_eq!(code, EXIT_IO_ERROR);
    }

    #[test]
    fn run_subcommand_with_trace_flag_runs_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.lox");
        std::fs::write(&path, "print 1;\n").unwrap();
        let code = run(&[
            "run".to_string(),
            path.to_string_lossy().into_owned(),
            "--trace".to_string(),
        ]);
        assert_eq!(code, 0);
    }

    #[test]
    fn compile_error_exits_65() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.lox");
        std::fs::write(&path, "1 +;\n").unwrap();
        let code = run(&[path.to_string_lossy().into_owned()]);
        assert_eq!(code, EXIT_COMPILE_ERROR);
    }

    #[test]
    fn runtime_error_exits_70() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.lox");
        std::fs::write(&path, "print x;\n").unwrap();
        let code = run(&[path.to_string_lossy().into_owned()]);
        assert_eq!(code, EXIT_RUNTIME_ERROR);
    }
}
