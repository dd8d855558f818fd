use stackvm_derive::Error;

/// Fault raised by a single execution step.
///
/// Traps are returned, never thrown: a step yields `Ok(())` (`TRAP_OK`) or one
/// of these, and after any trap the caller must stop stepping the machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum Trap {
    /// Reserved; no instruction raises it yet.
    #[error("TRAP_STACK_OVERFLOW")]
    StackOverflow,
    /// Too few operands on the stack, or `ret` with an empty call stack.
    #[error("TRAP_STACK_UNDERFLOW")]
    StackUnderflow,
    /// Operand variant or shape does not fit the opcode.
    #[error("TRAP_ILLEGAL_INST")]
    IllegalInst,
    /// `div` with a zero divisor.
    #[error("TRAP_DIV_BY_ZERO")]
    DivByZero,
    /// Unresolved label, out-of-range index or instruction pointer.
    #[error("TRAP_ILLEGAL_INST_ACCESS")]
    IllegalInstAccess,
}

impl Trap {
    /// Canonical trap name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Trap::StackOverflow => "TRAP_STACK_OVERFLOW",
            Trap::StackUnderflow => "TRAP_STACK_UNDERFLOW",
            Trap::IllegalInst => "TRAP_ILLEGAL_INST",
            Trap::DivByZero => "TRAP_DIV_BY_ZERO",
            Trap::IllegalInstAccess => "TRAP_ILLEGAL_INST_ACCESS",
        }
    }
}

/// Diagnostic produced by a failed assembly pass.
///
/// Any of these means no program was produced.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AsmError {
    /// An opcode ran out of tokens before all its operands were read.
    #[error("'{mnemonic}' missing operand")]
    MissingOperand { mnemonic: &'static str },
    /// Token is neither a label definition, a directive, nor an opcode.
    #[error("unknown instruction: {token}")]
    UnknownInstruction { token: String },
    /// Operand token could not be parsed as the literal the opcode needs.
    #[error("failed to parse operand for '{mnemonic}': {token}")]
    InvalidLiteral {
        mnemonic: &'static str,
        token: String,
    },
    /// `#` not followed by a well-formed `define NAME VALUE`.
    #[error("malformed macro directive: {reason}")]
    MalformedDirective { reason: String },
}

/// Errors from the binary program codec and its file helpers.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CodecError {
    /// Encoding refuses to write a program with no instructions.
    #[error("program is empty, nothing to save")]
    EmptyProgram,
    /// Opcode discriminant outside the instruction set.
    #[error("unknown opcode {opcode} in record {record}")]
    UnknownOpcode { opcode: u32, record: usize },
    /// File could not be read or written.
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Top-level error for the file-driven entry points and the driver.
#[derive(Debug, Error)]
pub enum VMError {
    #[error("assembly failed: {0}")]
    Assembly(#[from] AsmError),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("execution trapped: {0}")]
    Trap(#[from] Trap),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn trap_display_matches_canonical_name() {
        for trap in [
            Trap::StackOverflow,
            Trap::StackUnderflow,
            Trap::IllegalInst,
            Trap::DivByZero,
            Trap::IllegalInstAccess,
        ] {
            assert_eq!(trap.to_string(), trap.as_str());
        }
    }

    #[test]
    fn asm_error_messages() {
        let err = AsmError::MissingOperand { mnemonic: "push" };
        assert_eq!(err.to_string(), "'push' missing operand");

        let err = AsmError::UnknownInstruction {
            token: "frob".to_string(),
        };
        assert_eq!(err.to_string(), "unknown instruction: frob");
    }

    #[test]
    fn vm_error_wraps_sources() {
        let err: VMError = Trap::DivByZero.into();
        assert_eq!(err.to_string(), "execution trapped: TRAP_DIV_BY_ZERO");
        assert!(err.source().is_some());

        let err: VMError = CodecError::EmptyProgram.into();
        assert!(matches!(err, VMError::Codec(CodecError::EmptyProgram)));
    }
}
