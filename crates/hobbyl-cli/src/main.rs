// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Command-line driver for Hobbyl: a line-oriented REPL when invoked with no
//! arguments, or a one-shot file runner when given a path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use hobbyl_compiler::{compile, disassemble_chunk};
use hobbyl_core::{GcRef, Obj};
use hobbyl_diagnostics::{CompileError, RuntimeError};
use hobbyl_vm::Vm;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// The exit code used when compilation fails.
const EX_DATAERR: u8 = 65;
/// The exit code used when a script raises at runtime.
const EX_SOFTWARE: u8 = 70;

#[derive(Parser)]
#[command(name = "hobbyl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler and virtual machine for the Hobbyl language", long_about = None)]
struct Cli {
    /// Script to run. Omit to start an interactive REPL.
    path: Option<PathBuf>,

    /// Print the compiled bytecode instead of running it.
    #[arg(short, long)]
    disassemble: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.path {
        Some(path) => run_file(&path, cli.disassemble),
        None => run_repl(),
    }
}

/// Run a single source file to completion, or print its disassembly if
/// `disassemble` is set.
fn run_file(path: &Path, disassemble: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("hobbyl: cannot read '{}': {err}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut vm = Vm::new();
    if disassemble {
        return match compile(&source, vm.heap_mut()) {
            Ok(script) => {
                let chunk = match vm.heap().get(script) {
                    Obj::Function(f) => &f.chunk,
                    _ => unreachable!("compile() always returns a Function handle"),
                };
                print!("{}", disassemble_chunk(chunk, vm.heap(), &path.display().to_string()));
                ExitCode::SUCCESS
            }
            Err(errors) => {
                for error in &errors {
                    eprintln!("{error}");
                }
                ExitCode::from(EX_DATAERR)
            }
        };
    }

    match compile_and_run(&mut vm, &source, &mut io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Compile(errors)) => {
            for error in &errors {
                eprintln!("{error}");
            }
            ExitCode::from(EX_DATAERR)
        }
        Err(Failure::Runtime(error)) => {
            eprint!("{error}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}

/// Run an interactive REPL. Each line is compiled and interpreted against
/// the same `Vm`, so `var` declarations and function definitions from
/// earlier lines stay visible to later ones.
fn run_repl() -> ExitCode {
    let mut vm = Vm::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("hobbyl: cannot start the line editor: {err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                let mut stdout = io::stdout();
                match compile_and_run(&mut vm, &line, &mut stdout) {
                    Ok(()) => {}
                    Err(Failure::Compile(errors)) => {
                        for error in &errors {
                            eprintln!("{error}");
                        }
                    }
                    Err(Failure::Runtime(error)) => eprint!("{error}"),
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => return ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("hobbyl: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}

enum Failure {
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

/// Compile `source` against `vm`'s heap and, on success, run it, sending
/// anything the script prints to `out`.
fn compile_and_run(vm: &mut Vm, source: &str, out: &mut impl Write) -> Result<(), Failure> {
    let script: GcRef = compile(source, vm.heap_mut()).map_err(Failure::Compile)?;
    vm.interpret(script, out).map(|_value| ()).map_err(Failure::Runtime)
}
