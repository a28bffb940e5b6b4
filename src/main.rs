// File: src/main.rs
//
// Entry point: dispatches to the `run`, `repl`, and `disasm` subcommands.

mod ast;
mod builtins;
mod bytecode;
mod compiler;
mod errors;
mod frame;
mod lexer;
mod parser;
mod repl;
mod symbol_table;
mod value;
mod vm;

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::PathBuf;

use bytecode::instructions_to_string;
use compiler::Compiler;
use errors::{ErrorKind, MonkeyError, SourceLocation};
use vm::VirtualMachine;

#[derive(ClapParser)]
#[command(
    name = "mantis",
    about = "Mantis: a small, expression-oriented bytecode-compiled scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dump a disassembly trace whenever the VM hits a runtime error
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a Mantis script file
    Run {
        /// Path to the script file
        file: PathBuf,
    },

    /// Launch the interactive REPL
    Repl,

    /// Compile a file and print its bytecode disassembly without running it
    Disasm {
        /// Path to the script file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => run_file(&file, cli.debug),
        Commands::Repl => {
            if let Err(e) = repl::Repl::new().and_then(|mut r| r.run()) {
                eprintln!("REPL error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Disasm { file } => disasm_file(&file),
    }
}

fn run_file(path: &PathBuf, debug: bool) {
    let source = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("could not read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    if std::env::var("DEBUG_AST").is_ok() {
        match parser::parse(&source) {
            Ok(program) => eprintln!("DEBUG AST:\n{:#?}", program),
            Err(errors) => eprintln!("DEBUG AST: parse failed before AST was complete: {:?}", errors),
        }
    }

    let program = match parser::parse(&source) {
        Ok(program) => program,
        Err(parse_errors) => {
            for err in parse_errors {
                let located = MonkeyError::new(ErrorKind::Parse, err.message, SourceLocation::new(err.line, err.column));
                eprintln!("{}", located);
            }
            std::process::exit(1);
        }
    };

    let mut compiler = Compiler::new();
    if let Err(e) = compiler.compile_program(&program) {
        eprintln!("{}", MonkeyError::new(ErrorKind::Compile, e.0, SourceLocation::unknown()));
        std::process::exit(1);
    }

    let bytecode = compiler.bytecode();
    if std::env::var("DEBUG_BYTECODE").is_ok() {
        eprintln!("DEBUG BYTECODE:\n{}", instructions_to_string(&bytecode.instructions));
    }

    let mut vm = VirtualMachine::new(bytecode);
    if let Err(e) = vm.run() {
        if debug {
            eprintln!("-- vm halted --");
        }
        eprintln!("{}", MonkeyError::new(ErrorKind::Runtime, e.0, SourceLocation::unknown()));
        std::process::exit(1);
    }
}

fn disasm_file(path: &PathBuf) {
    let source = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("could not read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let program = match parser::parse(&source) {
        Ok(program) => program,
        Err(parse_errors) => {
            for err in parse_errors {
                eprintln!("parse error at {}:{}: {}", err.line, err.column, err.message);
            }
            std::process::exit(1);
        }
    };

    let mut compiler = Compiler::new();
    if let Err(e) = compiler.compile_program(&program) {
        eprintln!("compile error: {}", e);
        std::process::exit(1);
    }

    let bytecode = compiler.bytecode();
    println!("{}", instructions_to_string(&bytecode.instructions));
    println!("constants:");
    for (i, constant) in bytecode.constants.iter().enumerate() {
        println!("  {:04} {}", i, constant.inspect());
    }
}
