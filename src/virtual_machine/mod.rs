//! Stack-based virtual machine with its assembler and binary program format.
//!
//! # Architecture
//!
//! - **Operand stack**: unbounded `f64` stack; integers are widened on push
//! - **Call stack**: return addresses pushed by `call`, popped by `ret`
//! - **Instruction format**: an [`isa::Opcode`] plus one typed
//!   [`instruction::Operand`]; a mismatched operand traps at execution time
//! - **Execution model**: one instruction per [`vm::VM::step`], every fault
//!   returned as an [`errors::Trap`]; termination is the caller's job
//!
//! # Pipeline
//!
//! ```text
//! source --lexer--> tokens --assembler--> Program --vm--> stack
//!                                            ^ |
//!                                  from_bytes| |to_bytes
//!                                            | v
//!                                          .bin file
//! ```
//!
//! # Modules
//!
//! - [`assembler`]: Single-pass translation with label and macro tables
//! - [`errors`]: Traps and assembly, codec and top-level error types
//! - [`instruction`]: Operand and instruction model
//! - [`isa`]: Opcode table and operand shapes
//! - [`lexer`]: Dialect-aware tokenizer
//! - [`program`]: Program container and fixed-record binary codec
//! - [`vm`]: Machine state and the step function

pub mod assembler;
pub mod errors;
pub mod instruction;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod lexer;
pub mod program;
pub mod vm;
