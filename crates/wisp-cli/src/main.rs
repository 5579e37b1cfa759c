use std::{
    env, fs,
    io::{self, Write},
    process::ExitCode,
};

use wisp::{ReplSession, Vm, register_defaults};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 {
        run_file(&args[1])
    } else {
        repl()
    }
}

/// Compiles and runs a whole file in one shot, the shape of `mica`'s
/// `run_file` in `main.c`.
fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("could not open file: {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut vm = Vm::new();
    if let Err(err) = register_defaults(&mut vm) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    if !vm.compile(&source) {
        eprintln!("compilation failed");
        return ExitCode::FAILURE;
    }
    if !vm.run() {
        eprintln!("runtime error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Interactive loop over a persistent `ReplSession`, matching `mica`'s
/// `repl()`: a banner, a `> ` prompt per line, `exit` to quit, blank lines
/// skipped, EOF (Ctrl+D) ends the session.
fn repl() -> ExitCode {
    let mut session = match ReplSession::new() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!("wisp repl");
    println!("type 'exit' to quit\n");

    loop {
        let Some(line) = read_line("> ") else {
            println!();
            break;
        };

        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Err(err) = session.execute(&line) {
            eprintln!("{err}");
        }
    }

    ExitCode::SUCCESS
}

/// Reads one line from stdin after printing and flushing `prompt`.
/// Returns `None` on EOF (Ctrl+D).
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return None;
    }
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
