//! Assembly language translator.
//!
//! Converts assembly source into a [`Program`] in one forward pass over the
//! token stream produced by the [`Lexer`]. Uses
//! [`for_each_opcode!`](crate::for_each_opcode) to generate the mnemonic table.
//!
//! # Syntax
//!
//! ```text
//! # define STEP 2        ; macro, Macro dialect only
//! start:                 ; label = index of the next instruction
//!     push STEP
//!     push 1.5
//!     dup 0
//!     shl 0 3
//!     jmp_if start
//!     halt
//! ```
//!
//! - Labels end with `:` and may be referenced before they are defined; the
//!   engine resolves them at execution time.
//! - Macros must be defined before use and are substituted only into `push`.
//! - Any failure aborts the whole pass; no partial program is returned.

use crate::for_each_opcode;
use crate::virtual_machine::errors::{AsmError, CodecError, VMError};
use crate::virtual_machine::instruction::{Instruction, Operand};
use crate::virtual_machine::isa::{Opcode, OperandKind};
use crate::virtual_machine::lexer::{Dialect, Lexer};
use crate::virtual_machine::program::Program;
use crate::{error, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const LABEL_SUFFIX: char = ':';
const DIRECTIVE_MARKER: &str = "#";
const DEFINE_KEYWORD: &str = "define";
const STRING_QUOTE: char = '"';

/// Label name -> index of the instruction it denotes.
pub type LabelTable = HashMap<String, usize>;

/// Macro name -> literal value.
pub type MacroTable = HashMap<String, MacroValue>;

/// Literal bound to a macro name by `# define NAME VALUE`.
#[derive(Clone, Debug, PartialEq)]
pub enum MacroValue {
    Integer(i64),
    Float(f64),
    Str(String),
}

impl MacroValue {
    /// Classifies a value token by its lexical shape.
    ///
    /// Quoted text and anything that is not a number is a string; a number
    /// containing `.` is a float, otherwise an integer.
    fn classify(token: &str) -> Result<Self, AsmError> {
        if let Some(rest) = token.strip_prefix(STRING_QUOTE) {
            return match rest.strip_suffix(STRING_QUOTE) {
                Some(inner) => Ok(MacroValue::Str(inner.to_string())),
                None => Err(AsmError::MalformedDirective {
                    reason: format!("unterminated string literal {token}"),
                }),
            };
        }

        if token.contains('.') {
            if let Ok(v) = token.parse::<f64>() {
                return Ok(MacroValue::Float(v));
            }
        } else if let Ok(v) = token.parse::<i64>() {
            return Ok(MacroValue::Integer(v));
        }

        Ok(MacroValue::Str(token.to_string()))
    }

    /// Operand a `push` of this macro assembles to; the value's type is kept.
    fn to_operand(&self) -> Operand {
        match self {
            MacroValue::Integer(v) => Operand::Integer(*v),
            MacroValue::Float(v) => Operand::Float(*v),
            MacroValue::Str(s) => Operand::Label(s.clone()),
        }
    }
}

/// Result of a successful assembly pass.
#[derive(Clone, Debug, Default)]
pub struct Assembly {
    pub program: Program,
    pub labels: LabelTable,
    pub macros: MacroTable,
}

macro_rules! define_opcode_lookup {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => $kind:ident
        ),* $(,)?
    ) => {
        /// Maps an assembly mnemonic to its opcode.
        fn opcode_from_mnemonic(name: &str) -> Option<Opcode> {
            match name {
                $( $mnemonic => Some(Opcode::$name), )*
                _ => None,
            }
        }
    };
}

for_each_opcode!(define_opcode_lookup);

/// Checks if a token is a label definition (ends with `:`).
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

fn is_identifier(tok: &str) -> bool {
    tok.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && tok.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse an i64 literal.
fn parse_i64(mnemonic: &'static str, tok: &str) -> Result<i64, AsmError> {
    tok.parse::<i64>().map_err(|_| AsmError::InvalidLiteral {
        mnemonic,
        token: tok.to_string(),
    })
}

/// Parse a float when the token contains `.`, an integer otherwise.
fn parse_number(mnemonic: &'static str, tok: &str) -> Result<Operand, AsmError> {
    if tok.contains('.') {
        tok.parse::<f64>()
            .map(Operand::Float)
            .map_err(|_| AsmError::InvalidLiteral {
                mnemonic,
                token: tok.to_string(),
            })
    } else {
        parse_i64(mnemonic, tok).map(Operand::Integer)
    }
}

/// Parse a jump target: a numeric address or a label name.
fn parse_target(mnemonic: &'static str, tok: &str) -> Result<Operand, AsmError> {
    if tok.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        parse_i64(mnemonic, tok).map(Operand::Integer)
    } else {
        Ok(Operand::Label(tok.to_string()))
    }
}

/// Single-pass assembler state: the program being built plus its tables.
pub struct Assembler {
    dialect: Dialect,
    program: Program,
    labels: LabelTable,
    macros: MacroTable,
}

impl Assembler {
    /// Creates an assembler with empty label and macro tables.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            program: Program::new(),
            labels: LabelTable::new(),
            macros: MacroTable::new(),
        }
    }

    /// Binds `name` to the index the next instruction will occupy.
    ///
    /// A later definition of the same name wins.
    fn define_label(&mut self, name: &str) {
        let offset = self.program.len();
        if let Some(previous) = self.labels.insert(name.to_string(), offset) {
            warn!("label '{name}' redefined: {previous} -> {offset}");
        }
    }

    fn define_macro(&mut self, name: &str, value: MacroValue) {
        if let Some(previous) = self.macros.insert(name.to_string(), value) {
            warn!("macro '{name}' redefined (was {previous:?})");
        }
    }

    /// Consumes `define NAME VALUE` after a `#` marker.
    fn parse_directive<'a>(
        &mut self,
        tokens: &mut impl Iterator<Item = &'a str>,
    ) -> Result<(), AsmError> {
        match tokens.next() {
            Some(DEFINE_KEYWORD) => {}
            Some(other) => {
                return Err(AsmError::MalformedDirective {
                    reason: format!("expected '{DEFINE_KEYWORD}' after '#', found '{other}'"),
                });
            }
            None => {
                return Err(AsmError::MalformedDirective {
                    reason: format!("expected '{DEFINE_KEYWORD}' after '#'"),
                });
            }
        }

        let name = tokens.next().ok_or_else(|| AsmError::MalformedDirective {
            reason: "macro name missing".to_string(),
        })?;
        if !is_identifier(name) {
            return Err(AsmError::MalformedDirective {
                reason: format!("invalid macro name '{name}'"),
            });
        }

        let value = tokens.next().ok_or_else(|| AsmError::MalformedDirective {
            reason: format!("macro '{name}' has no value"),
        })?;
        let value = MacroValue::classify(value)?;
        self.define_macro(name, value);
        Ok(())
    }

    /// Reads the operand tokens `opcode` requires.
    fn parse_operand<'a>(
        &self,
        opcode: Opcode,
        tokens: &mut impl Iterator<Item = &'a str>,
    ) -> Result<Operand, AsmError> {
        let mnemonic = opcode.mnemonic();
        let mut next = || tokens.next().ok_or(AsmError::MissingOperand { mnemonic });

        match opcode.operand_kind() {
            OperandKind::Empty => Ok(Operand::None),
            OperandKind::Number => {
                let tok = next()?;
                match self.macros.get(tok) {
                    Some(value) => Ok(value.to_operand()),
                    None => parse_number(mnemonic, tok),
                }
            }
            OperandKind::Int => parse_i64(mnemonic, next()?).map(Operand::Integer),
            OperandKind::Target => parse_target(mnemonic, next()?),
            OperandKind::Pair => {
                let index = parse_i64(mnemonic, next()?)?;
                let amount = parse_i64(mnemonic, next()?)?;
                Ok(Operand::IndexPair(index, amount))
            }
        }
    }

    /// Runs the pass over `tokens`, consuming the assembler.
    pub fn assemble<'a>(
        mut self,
        tokens: impl IntoIterator<Item = &'a str>,
    ) -> Result<Assembly, AsmError> {
        let mut tokens = tokens.into_iter();

        while let Some(token) = tokens.next() {
            if is_label_def(token) {
                self.define_label(label_name(token));
                continue;
            }

            if token == DIRECTIVE_MARKER && self.dialect.has_macros() {
                self.parse_directive(&mut tokens)?;
                continue;
            }

            let opcode =
                opcode_from_mnemonic(token).ok_or_else(|| AsmError::UnknownInstruction {
                    token: token.to_string(),
                })?;
            let operand = self.parse_operand(opcode, &mut tokens)?;
            self.program.push(Instruction::new(opcode, operand));
        }

        Ok(Assembly {
            program: self.program,
            labels: self.labels,
            macros: self.macros,
        })
    }
}

/// Assemble a full source string.
pub fn assemble_source(source: &str, dialect: Dialect) -> Result<Assembly, AsmError> {
    Assembler::new(dialect).assemble(Lexer::new(source, dialect))
}

/// Assembles source and logs a diagnostic naming `source_name` on failure.
fn assemble_source_with_name(
    source: &str,
    source_name: &str,
    dialect: Dialect,
) -> Result<Assembly, AsmError> {
    let result = assemble_source(source, dialect);
    if let Err(err) = &result {
        error!("{source_name}: {err}");
    }
    result
}

/// Convenience: assemble directly from file path.
pub fn assemble_file<P: AsRef<Path>>(path: P, dialect: Dialect) -> Result<Assembly, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| CodecError::Io {
        path: path_ref.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(assemble_source_with_name(
        &source,
        &path_ref.display().to_string(),
        dialect,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(source: &str) -> Assembly {
        assemble_source(source, Dialect::Macro).expect("assembly failed")
    }

    fn asm_err(source: &str) -> AsmError {
        assemble_source(source, Dialect::Macro).expect_err("expected assembly error")
    }

    #[test]
    fn assemble_empty_source() {
        let assembly = asm("");
        assert!(assembly.program.is_empty());
        assert!(assembly.labels.is_empty());
        assert!(assembly.macros.is_empty());
    }

    #[test]
    fn assemble_comments_only() {
        let assembly = asm("; nothing here\n   ; still nothing\n");
        assert!(assembly.program.is_empty());
    }

    #[test]
    fn assemble_push_plus() {
        let assembly = asm("push 1\npush 2\nplus");
        assert_eq!(
            assembly.program.instructions(),
            &[
                Instruction::push_int(1),
                Instruction::push_int(2),
                Instruction::bare(Opcode::Plus),
            ]
        );
    }

    #[test]
    fn push_float_when_token_has_dot() {
        let assembly = asm("push 2.5 push -4");
        assert_eq!(
            assembly.program.instructions(),
            &[Instruction::push_float(2.5), Instruction::push_int(-4)]
        );
    }

    #[test]
    fn every_mnemonic_assembles() {
        let assembly = asm(
            "l: nop push 1 dup 0 drop swap 1 plus minus mult div jmp l jmp_if l eq halt \
             not ret call l print_debug xor and or shl 0 1 shr 1 2",
        );
        let opcodes: Vec<Opcode> = assembly
            .program
            .instructions()
            .iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(opcodes, Opcode::ALL);
        assert_eq!(
            assembly.program.get(21),
            Some(&Instruction::shr(1, 2))
        );
    }

    #[test]
    fn labels_record_program_length() {
        let assembly = asm("start: push 1\nmid:\nend: halt");
        assert_eq!(assembly.labels["start"], 0);
        assert_eq!(assembly.labels["mid"], 1);
        assert_eq!(assembly.labels["end"], 1);
        assert_eq!(assembly.program.len(), 2);
    }

    #[test]
    fn forward_label_reference_is_kept_symbolic() {
        let assembly = asm("jmp done push 1 done: halt");
        assert_eq!(assembly.program.get(0), Some(&Instruction::jmp("done")));
        assert_eq!(assembly.labels["done"], 2);
    }

    #[test]
    fn numeric_jump_target_is_integer() {
        let assembly = asm("jmp 3");
        assert_eq!(
            assembly.program.get(0).map(|i| &i.operand),
            Some(&Operand::Integer(3))
        );
    }

    #[test]
    fn redefined_label_takes_latest_position() {
        let assembly = asm("a: nop a: nop");
        assert_eq!(assembly.labels["a"], 1);
    }

    #[test]
    fn macros_substitute_into_push() {
        let assembly = asm("# define N 7\n# define PI 3.14\npush N\npush PI");
        assert_eq!(assembly.macros["N"], MacroValue::Integer(7));
        assert_eq!(
            assembly.program.instructions(),
            &[Instruction::push_int(7), Instruction::push_float(3.14)]
        );
    }

    #[test]
    fn string_macro_keeps_its_type() {
        let assembly = asm("# define NAME \"bob\"\n# define WORD hello\npush NAME push WORD");
        assert_eq!(assembly.macros["NAME"], MacroValue::Str("bob".into()));
        assert_eq!(
            assembly.program.instructions(),
            &[
                Instruction::new(Opcode::Push, Operand::Label("bob".into())),
                Instruction::new(Opcode::Push, Operand::Label("hello".into())),
            ]
        );
    }

    #[test]
    fn macros_are_not_substituted_outside_push() {
        assert!(matches!(
            asm_err("# define N 1\ndup N"),
            AsmError::InvalidLiteral { mnemonic: "dup", .. }
        ));
    }

    #[test]
    fn macro_used_before_definition_is_an_error() {
        assert!(matches!(
            asm_err("push N\n# define N 1"),
            AsmError::InvalidLiteral { mnemonic: "push", ref token } if token == "N"
        ));
    }

    #[test]
    fn malformed_directives() {
        assert!(matches!(asm_err("# undef N"), AsmError::MalformedDirective { .. }));
        assert!(matches!(asm_err("#"), AsmError::MalformedDirective { .. }));
        assert!(matches!(asm_err("# define"), AsmError::MalformedDirective { .. }));
        assert!(matches!(asm_err("# define N"), AsmError::MalformedDirective { .. }));
        assert!(matches!(asm_err("# define 9 1"), AsmError::MalformedDirective { .. }));
        assert!(matches!(
            asm_err("# define S \"open"),
            AsmError::MalformedDirective { .. }
        ));
    }

    #[test]
    fn missing_operand() {
        assert_eq!(
            asm_err("push"),
            AsmError::MissingOperand { mnemonic: "push" }
        );
        assert_eq!(
            asm_err("push 1 jmp"),
            AsmError::MissingOperand { mnemonic: "jmp" }
        );
        assert_eq!(
            asm_err("shl 0"),
            AsmError::MissingOperand { mnemonic: "shl" }
        );
    }

    #[test]
    fn unknown_instruction() {
        assert_eq!(
            asm_err("push 1 frobnicate"),
            AsmError::UnknownInstruction {
                token: "frobnicate".into()
            }
        );
        assert!(matches!(asm_err("PUSH 1"), AsmError::UnknownInstruction { .. }));
        assert!(matches!(asm_err(":"), AsmError::UnknownInstruction { .. }));
    }

    #[test]
    fn invalid_literals() {
        assert!(matches!(
            asm_err("push 1.2.3"),
            AsmError::InvalidLiteral { mnemonic: "push", .. }
        ));
        assert!(matches!(
            asm_err("dup 1.5"),
            AsmError::InvalidLiteral { mnemonic: "dup", .. }
        ));
        assert!(matches!(
            asm_err("swap x"),
            AsmError::InvalidLiteral { mnemonic: "swap", .. }
        ));
        assert!(matches!(
            asm_err("shr 0 -"),
            AsmError::InvalidLiteral { mnemonic: "shr", .. }
        ));
        assert!(matches!(
            asm_err("push 99999999999999999999"),
            AsmError::InvalidLiteral { .. }
        ));
    }

    #[test]
    fn directive_marker_is_unknown_outside_macro_dialect() {
        let err = assemble_source("# define N 1", Dialect::Semicolon).unwrap_err();
        assert_eq!(err, AsmError::UnknownInstruction { token: "#".into() });
    }

    #[test]
    fn hash_dialect_treats_marker_as_comment() {
        let assembly = assemble_source("# define N 1\npush 2 # trailing", Dialect::Hash).unwrap();
        assert_eq!(assembly.program.instructions(), &[Instruction::push_int(2)]);
        assert!(assembly.macros.is_empty());
    }

    #[test]
    fn macro_value_classification() {
        assert_eq!(MacroValue::classify("12").unwrap(), MacroValue::Integer(12));
        assert_eq!(MacroValue::classify("-3").unwrap(), MacroValue::Integer(-3));
        assert_eq!(MacroValue::classify("0.5").unwrap(), MacroValue::Float(0.5));
        assert_eq!(
            MacroValue::classify("\"a b\"").unwrap(),
            MacroValue::Str("a b".into())
        );
        assert_eq!(
            MacroValue::classify("x1").unwrap(),
            MacroValue::Str("x1".into())
        );
    }

    #[test]
    fn assemble_file_reads_source() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("prog.asm");
        fs::write(&path, "push 1 push 2 plus halt").unwrap();
        let assembly = assemble_file(&path, Dialect::Semicolon).unwrap();
        assert_eq!(assembly.program.len(), 4);
    }

    #[test]
    fn assemble_file_missing_is_io_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let err = assemble_file(dir.path().join("nope.asm"), Dialect::Macro).unwrap_err();
        assert!(matches!(err, VMError::Codec(_)));
    }

    #[test]
    fn assemble_file_propagates_assembly_errors() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("bad.asm");
        fs::write(&path, "push").unwrap();
        let err = assemble_file(&path, Dialect::Macro).unwrap_err();
        assert!(matches!(
            err,
            VMError::Assembly(AsmError::MissingOperand { mnemonic: "push" })
        ));
    }
}
