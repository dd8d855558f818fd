//! Stack virtual machine driver.
//!
//! Assembles or loads a program, optionally saves it, then runs it for a
//! bounded number of steps and prints the operand stack.
//!
//! # Usage
//! ```text
//! stackvm [OPTIONS]
//! ```
//!
//! # Options
//! - `-c <file.asm>`: Assemble a source file
//! - `-i <file.bin>`: Load a binary program
//! - `-o <file.bin>`: Save the current program
//! - `--dialect <semicolon|hash|macro>`: Lexer dialect used by `-c` (defaults to `macro`)
//! - `--steps <n>`: Maximum number of instructions to execute (defaults to 69)
//! - `--disassemble`: Print the program and exit without running it
//! - `-v, --verbose`: Also print debug messages
//! - `-q, --quiet`: Only print errors
//!
//! `-c`, `-i` and `-o` are applied in the order given, so
//! `stackvm -c prog.asm -o prog.bin` assembles and then saves.
//!
//! # Examples
//! ```text
//! stackvm -c countdown.asm
//! stackvm -c countdown.asm --dialect hash -o countdown.bin
//! stackvm -i countdown.bin --steps 200
//! ```

use stackvm::utils::log::{Level, set_min_level};
use stackvm::virtual_machine::assembler::assemble_file;
use stackvm::virtual_machine::errors::Trap;
use stackvm::virtual_machine::lexer::Dialect;
use stackvm::virtual_machine::vm::{DEFAULT_STEP_LIMIT, VM};
use stackvm::{debug, error, info};
use std::env;
use std::process;

/// Program source or sink, applied in command-line order.
enum Action {
    Assemble(String),
    Load(String),
    Save(String),
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut actions = Vec::new();
    let mut dialect = Dialect::default();
    let mut max_steps = DEFAULT_STEP_LIMIT;
    let mut disassemble = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            k @ ("-c" | "-i" | "-o") => {
                let path = flag_value(&args, &mut i, k).to_string();
                actions.push(match k {
                    "-c" => Action::Assemble(path),
                    "-i" => Action::Load(path),
                    _ => Action::Save(path),
                });
            }
            k @ "--dialect" => {
                let name = flag_value(&args, &mut i, k);
                dialect = Dialect::from_name(name).unwrap_or_else(|| {
                    error!("Unknown dialect: '{name}' (expected semicolon, hash or macro)");
                    process::exit(1);
                });
            }
            k @ "--steps" => {
                let value = flag_value(&args, &mut i, k);
                max_steps = value.parse::<usize>().unwrap_or_else(|_| {
                    error!("Invalid step count: '{value}' is not a valid number");
                    process::exit(1);
                });
            }
            "--disassemble" => {
                disassemble = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                set_min_level(Level::Debug);
                i += 1;
            }
            "--quiet" | "-q" => {
                set_min_level(Level::Error);
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let mut vm = VM::new();
    for action in &actions {
        match action {
            Action::Assemble(path) => match assemble_file(path, dialect) {
                Ok(assembly) => {
                    info!(
                        "Assembled {} ({} instructions, {} labels, {} macros)",
                        path,
                        assembly.program.len(),
                        assembly.labels.len(),
                        assembly.macros.len()
                    );
                    vm.load_assembly(assembly);
                }
                Err(e) => {
                    error!("{e}");
                    process::exit(1);
                }
            },
            // Load and save failures are already logged; the run goes on with
            // whatever program the machine holds.
            Action::Load(path) => {
                if vm.load_program_from_file(path).is_ok() {
                    vm.set_ip(0);
                }
            }
            Action::Save(path) => {
                let _ = vm.save_program_to_file(path);
            }
        }
    }

    if disassemble {
        print!("{}", vm.program());
        return;
    }

    if vm.program().is_empty() {
        error!("Program is empty.");
        process::exit(1);
    }

    debug!(
        "Running {} instructions, step limit {max_steps}",
        vm.program().len()
    );

    match vm.run(max_steps) {
        Ok(steps) => debug!("Executed {steps} steps, halted: {}", vm.is_halted()),
        Err(trap) => {
            let size = vm.program().len();
            let out_of_bounds = usize::try_from(vm.ip()).is_ok_and(|ip| ip >= size);
            if trap == Trap::IllegalInstAccess && out_of_bounds {
                error!("Instruction pointer out of bounds (ip={}, size={size})", vm.ip());
            } else {
                error!("{trap} at ip={}", vm.ip());
            }
            info!("{}", vm.dump_stack().trim_end());
            process::exit(1);
        }
    }

    print!("{}", vm.dump_stack());
}

/// Returns the value following flag `args[*i]` and moves past both.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        error!("{flag} requires an argument");
        process::exit(1);
    }
    let value = &args[*i];
    *i += 1;
    value
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {} [OPTIONS]\n\n\
         Options:\n  \
         -c <file.asm>        Assemble a source file\n  \
         -i <file.bin>        Load a binary program\n  \
         -o <file.bin>        Save the current program\n  \
         --dialect <name>     Lexer dialect: semicolon, hash or macro (default: macro)\n  \
         --steps <n>          Maximum instructions to execute (default: {})\n  \
         --disassemble        Print the program instead of running it\n  \
         -v, --verbose        Print debug messages\n  \
         -q, --quiet          Only print errors\n  \
         -h, --help           Show this help message",
        program, DEFAULT_STEP_LIMIT
    );
}
