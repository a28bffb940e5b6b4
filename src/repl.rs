// File: src/repl.rs
//
// Interactive REPL. Provides:
// - Multi-line input support via brace/bracket/paren balance tracking
// - Command history with up/down arrow navigation (`rustyline`)
// - Special commands (:help, :clear, :quit, :vars, :reset)
// - Persistent compiler/VM state across inputs (symbol table, constants,
//   globals), so a `let` on one line is visible on the next.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::{symbol_table_with_builtins, Compiler};
use crate::symbol_table::SymbolTable;
use crate::value::Value;
use crate::vm::VirtualMachine;

pub struct Repl {
    editor: DefaultEditor,
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl {
            editor,
            symbol_table: symbol_table_with_builtins(),
            constants: Vec::new(),
            globals: vec![Value::Null; crate::vm::GLOBALS_SIZE],
        })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║          Mantis REPL - Interactive Shell             ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: End with unclosed braces", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "mantis> ".bright_green().to_string()
            } else {
                "....> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if Self::is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to continue the REPL, false to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                self.symbol_table = symbol_table_with_builtins();
                self.constants.clear();
                self.globals = vec![Value::Null; crate::vm::GLOBALS_SIZE];
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!();
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  Show defined variables", ":vars".bright_yellow(), " or :v    ".dimmed());
        println!("  {}{}  Reset environment", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Navigation:".bright_cyan().bold());
        println!();
        println!("  {}  Navigate command history", "↑/↓ arrows".bright_blue());
        println!("  {}  Interrupt current input", "Ctrl+C    ".bright_blue());
        println!("  {}  Exit REPL", "Ctrl+D    ".bright_blue());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!();
        println!("  Leave braces, brackets, or parentheses unclosed to continue");
        println!("  on the next line. Close them to execute the statement.");
        println!();
    }

    fn show_variables(&self) {
        println!();
        println!("{}", "Defined Variables:".bright_cyan().bold());
        println!();
        println!("  {}", "(only global bindings are tracked by the REPL)".dimmed());
        println!();
    }

    /// True if all brackets/braces/parentheses are balanced outside strings
    /// and comments.
    fn is_input_complete(input: &str) -> bool {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return true;
        }

        let mut brace_count = 0i32;
        let mut bracket_count = 0i32;
        let mut paren_count = 0i32;
        let mut in_string = false;
        let mut escape_next = false;
        let mut in_comment = false;

        for ch in trimmed.chars() {
            if in_comment {
                if ch == '\n' {
                    in_comment = false;
                }
                continue;
            }
            if escape_next {
                escape_next = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                '#' if !in_string => in_comment = true,
                '{' if !in_string => brace_count += 1,
                '}' if !in_string => brace_count -= 1,
                '[' if !in_string => bracket_count += 1,
                ']' if !in_string => bracket_count -= 1,
                '(' if !in_string => paren_count += 1,
                ')' if !in_string => paren_count -= 1,
                _ => {}
            }
        }

        !in_string && brace_count <= 0 && bracket_count <= 0 && paren_count <= 0
    }

    fn eval_input(&mut self, input: &str) {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }

        let program = match crate::parser::parse(input) {
            Ok(program) => program,
            Err(errors) => {
                for err in errors {
                    println!("{} {}", "Parse error:".bright_red(), err.message);
                }
                return;
            }
        };

        let symbol_table = std::mem::take(&mut self.symbol_table);
        let mut compiler = Compiler::new_with_state(symbol_table, self.constants.clone());
        if let Err(e) = compiler.compile_program(&program) {
            println!("{} {}", "Compile error:".bright_red(), e);
            // symbol_table is lost on failure; start the next input fresh
            // rather than leave the REPL holding a half-defined binding.
            return;
        }

        let (bytecode, symbol_table) = compiler.into_parts();
        self.symbol_table = symbol_table;
        self.constants = bytecode.constants.clone();

        let globals = std::mem::take(&mut self.globals);
        let mut vm = VirtualMachine::new_with_global_store(bytecode, globals);
        match vm.run() {
            Ok(()) => {
                self.print_value(vm.last_popped_stack_element());
            }
            Err(e) => {
                println!("{} {}", "Runtime error:".bright_red(), e);
            }
        }
        self.globals = vm.globals;
    }

    fn print_value(&self, value: &Value) {
        match value {
            Value::Null => {}
            Value::Integer(n) => println!("{} {}", "=>".bright_blue(), n.to_string().bright_white()),
            Value::Boolean(b) => println!("{} {}", "=>".bright_blue(), b.to_string().bright_magenta()),
            Value::Str(s) => println!("{} {}", "=>".bright_blue(), format!("\"{}\"", s).bright_green()),
            other => println!("{} {}", "=>".bright_blue(), other.inspect().bright_white()),
        }
    }
}
