//! Instruction model shared by the assembler, the codec and the engine.

use crate::virtual_machine::isa::Opcode;
use std::fmt;

/// Typed operand attached to an [`Opcode`].
///
/// Which variant is legal depends on the opcode; the engine rejects a
/// mismatch with `TRAP_ILLEGAL_INST` instead of coercing it.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Integer(i64),
    Float(f64),
    Label(String),
    /// `(index, amount)` for the shift opcodes.
    IndexPair(i64, i64),
}

impl Operand {
    /// Returns a human-readable variant name for diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Operand::None => "None",
            Operand::Integer(_) => "Integer",
            Operand::Float(_) => "Float",
            Operand::Label(_) => "Label",
            Operand::IndexPair(..) => "IndexPair",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Integer(v) => write!(f, "{v}"),
            // Keep a '.' so the text reassembles as a float.
            Operand::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Operand::Float(v) => write!(f, "{v}"),
            Operand::Label(name) => f.write_str(name),
            Operand::IndexPair(index, amount) => write!(f, "{index} {amount}"),
        }
    }
}

/// One program step: an opcode plus its operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Instruction whose opcode takes no operand.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    pub fn nop() -> Self {
        Self::bare(Opcode::Nop)
    }

    pub fn push_int(value: i64) -> Self {
        Self::new(Opcode::Push, Operand::Integer(value))
    }

    pub fn push_float(value: f64) -> Self {
        Self::new(Opcode::Push, Operand::Float(value))
    }

    pub fn dup(depth: i64) -> Self {
        Self::new(Opcode::Dup, Operand::Integer(depth))
    }

    pub fn drop() -> Self {
        Self::bare(Opcode::Drop)
    }

    pub fn swap(depth: i64) -> Self {
        Self::new(Opcode::Swap, Operand::Integer(depth))
    }

    pub fn jmp(label: impl Into<String>) -> Self {
        Self::new(Opcode::Jmp, Operand::Label(label.into()))
    }

    pub fn jmp_if(label: impl Into<String>) -> Self {
        Self::new(Opcode::JmpIf, Operand::Label(label.into()))
    }

    pub fn call(label: impl Into<String>) -> Self {
        Self::new(Opcode::Call, Operand::Label(label.into()))
    }

    pub fn shl(index: i64, amount: i64) -> Self {
        Self::new(Opcode::Shl, Operand::IndexPair(index, amount))
    }

    pub fn shr(index: i64, amount: i64) -> Self {
        Self::new(Opcode::Shr, Operand::IndexPair(index, amount))
    }

    pub fn halt() -> Self {
        Self::bare(Opcode::Halt)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            ref operand => write!(f, "{} {}", self.opcode, operand),
        }
    }
}
