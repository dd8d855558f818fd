//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode list and invokes a callback macro for code generation, so the
//! assembler, the codec and the ISA stability check all read one table.
//!
//! This module generates:
//! - The [`Opcode`] enum with its binary discriminants
//! - `TryFrom<u32>` for decoding discriminants
//! - [`Opcode::mnemonic`] and [`Opcode::operand_kind`]
//!
//! # Operand kinds
//!
//! | Kind     | Assembly tokens | Operand variant            |
//! |----------|-----------------|----------------------------|
//! | `Empty`  | none            | `none`                     |
//! | `Number` | 1 (or a macro)  | `integer` or `float`       |
//! | `Int`    | 1               | `integer`                  |
//! | `Target` | 1               | `label` (or `integer`)     |
//! | `Pair`   | 2               | `index_pair`               |

use crate::virtual_machine::errors::CodecError;

/// Invokes a callback macro with the complete opcode definition list.
///
/// Discriminants are part of the binary program format and must not change.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// nop ; ip += 1
            Nop = 0, "nop" => Empty,
            /// push v ; pushes an integer or float literal
            Push = 1, "push" => Number,
            /// dup n ; pushes a copy of the element n below the top
            Dup = 2, "dup" => Int,
            /// drop ; discards the top element
            Drop = 3, "drop" => Empty,
            /// swap n ; exchanges the top with the element n below it
            Swap = 4, "swap" => Int,
            /// plus ; a b -> a + b
            Plus = 5, "plus" => Empty,
            /// minus ; a b -> a - b
            Minus = 6, "minus" => Empty,
            /// mult ; a b -> a * b
            Mult = 7, "mult" => Empty,
            /// div ; a b -> a / b (traps when b == 0)
            Div = 8, "div" => Empty,
            /// jmp label ; ip = labels[label]
            Jmp = 9, "jmp" => Target,
            /// jmp_if label ; pops c, jumps when c != 0
            JmpIf = 10, "jmp_if" => Target,
            /// eq ; a b -> (a == b)
            Eq = 11, "eq" => Empty,
            /// halt ; sets the halt flag
            Halt = 12, "halt" => Empty,
            /// not ; a -> !a
            Not = 13, "not" => Empty,
            /// ret ; ip = pop(call stack)
            Ret = 14, "ret" => Empty,
            /// call label ; push(call stack, ip + 1); ip = labels[label]
            Call = 15, "call" => Target,
            /// print_debug ; pops the top and hands it to the observer
            PrintDebug = 16, "print_debug" => Empty,
            /// xor ; a b -> a ^ b (integer)
            Xor = 17, "xor" => Empty,
            /// and ; a b -> a & b (integer)
            And = 18, "and" => Empty,
            /// or ; a b -> a | b (integer)
            Or = 19, "or" => Empty,
            /// shl index amount ; slot[index] <<= amount, in place
            Shl = 20, "shl" => Pair,
            /// shr index amount ; slot[index] >>= amount, in place (arithmetic)
            Shr = 21, "shr" => Pair,
        }
    };
}

/// Expected operand shape for an opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// No operand.
    Empty,
    /// Integer or float literal; macro names are substituted.
    Number,
    /// Integer literal.
    Int,
    /// Label name, or an integer address.
    Target,
    /// Two integer literals.
    Pair,
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => $kind:ident
        ),* $(,)?
    ) => {
        #[repr(u32)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u32> for Opcode {
            type Error = CodecError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(CodecError::UnknownOpcode {
                        opcode: value,
                        record: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in discriminant order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand shape this opcode requires.
            pub const fn operand_kind(&self) -> OperandKind {
                match self {
                    $( Opcode::$name => OperandKind::$kind, )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            Opcode::try_from(0xFF),
            Err(CodecError::UnknownOpcode { opcode: 0xFF, .. })
        ));
    }

    #[test]
    fn opcode_try_from_roundtrips_every_discriminant() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(*op as u32).unwrap(), *op);
        }
    }

    #[test]
    fn discriminants_are_dense() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as u32, i as u32);
        }
    }

    #[test]
    fn operand_kinds() {
        assert_eq!(Opcode::Push.operand_kind(), OperandKind::Number);
        assert_eq!(Opcode::Dup.operand_kind(), OperandKind::Int);
        assert_eq!(Opcode::JmpIf.operand_kind(), OperandKind::Target);
        assert_eq!(Opcode::Shr.operand_kind(), OperandKind::Pair);
        assert_eq!(Opcode::Ret.operand_kind(), OperandKind::Empty);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::JmpIf.mnemonic(), "jmp_if");
        assert_eq!(Opcode::PrintDebug.to_string(), "print_debug");
    }
}
