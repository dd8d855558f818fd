//! Stack virtual machine library.
//!
//! Provides an assembler, a fixed-record binary program format, and a
//! step-wise execution engine for a small stack-based instruction set.

pub mod utils;
pub mod virtual_machine;
