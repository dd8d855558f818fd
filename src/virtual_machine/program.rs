//! Program container and its binary representation.
//!
//! A serialized program is a flat run of fixed-size records, one per
//! instruction, with no header:
//!
//! ```text
//! +----------------+------------------------+
//! | opcode: u32    | operand slot: i64      |   x N
//! +----------------+------------------------+
//! ```
//!
//! Both fields use the host's native byte order. The slot holds an integer
//! operand as is, `0` for no operand, the raw bits of a float, `0` for a label
//! and the index of an index pair. Decoding always produces `none` or
//! `integer`, so float, label and pair operands do not survive a round trip.

use crate::virtual_machine::errors::CodecError;
use crate::virtual_machine::instruction::{Instruction, Operand};
use crate::virtual_machine::isa::{Opcode, OperandKind};
use crate::warn;
use std::fmt;
use std::fs;
use std::ops::Index;
use std::path::Path;

const OPCODE_SIZE: usize = size_of::<u32>();
const SLOT_SIZE: usize = size_of::<i64>();

/// Size in bytes of one encoded instruction.
pub const RECORD_SIZE: usize = OPCODE_SIZE + SLOT_SIZE;

/// Ordered instruction sequence; indices are instruction addresses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction at index `len()`.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Serializes the program into back-to-back records.
    ///
    /// Refuses an empty program. Operands the format cannot hold are written
    /// in their reduced form with a warning.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        if self.is_empty() {
            return Err(CodecError::EmptyProgram);
        }

        let mut out = Vec::with_capacity(self.len() * RECORD_SIZE);
        for (record, instruction) in self.iter().enumerate() {
            encode_record(instruction, record, &mut out);
        }
        Ok(out)
    }

    /// Rebuilds a program from records.
    ///
    /// Bytes past the last complete record are ignored.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, CodecError> {
        let mut instructions = Vec::with_capacity(input.len() / RECORD_SIZE);
        while let Some((opcode, slot)) = read_record(&mut input) {
            let opcode = Opcode::try_from(opcode).map_err(|_| CodecError::UnknownOpcode {
                opcode,
                record: instructions.len(),
            })?;
            let operand = match opcode.operand_kind() {
                OperandKind::Empty => Operand::None,
                _ => Operand::Integer(slot),
            };
            instructions.push(Instruction::new(opcode, operand));
        }
        Ok(Self { instructions })
    }

    /// Encodes the program and writes it to `path`, replacing any file there.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CodecError> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), bytes).map_err(|e| io_error(path.as_ref(), e))
    }

    /// Reads and decodes a program from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| io_error(path.as_ref(), e))?;
        Self::from_bytes(&bytes)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> CodecError {
    CodecError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Value stored in the operand slot for `instruction`.
fn operand_slot(instruction: &Instruction, record: usize) -> i64 {
    let (slot, lost) = match &instruction.operand {
        Operand::None => (0, None),
        Operand::Integer(v) => (*v, None),
        Operand::Float(v) => (v.to_bits() as i64, Some("raw bits kept, decodes as an integer")),
        Operand::Label(_) => (0, Some("name dropped")),
        Operand::IndexPair(index, _) => (*index, Some("shift amount dropped")),
    };
    if let Some(lost) = lost {
        warn!(
            "record {record} ({instruction}): {} operand is not preserved, {lost}",
            instruction.operand.type_name()
        );
    }
    slot
}

fn encode_record(instruction: &Instruction, record: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&(instruction.opcode as u32).to_ne_bytes());
    out.extend_from_slice(&operand_slot(instruction, record).to_ne_bytes());
}

/// Reads exactly `N` bytes from the input, advancing the slice.
fn read_array<const N: usize>(input: &mut &[u8]) -> Option<[u8; N]> {
    let (bytes, rest) = input.split_first_chunk::<N>()?;
    *input = rest;
    Some(*bytes)
}

/// Reads one complete record, or `None` when fewer than [`RECORD_SIZE`] bytes remain.
fn read_record(input: &mut &[u8]) -> Option<(u32, i64)> {
    if input.len() < RECORD_SIZE {
        return None;
    }
    let opcode = read_array::<OPCODE_SIZE>(input)?;
    let slot = read_array::<SLOT_SIZE>(input)?;
    Some((u32::from_ne_bytes(opcode), i64::from_ne_bytes(slot)))
}

impl Index<usize> for Program {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

impl From<Vec<Instruction>> for Program {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Disassembly listing, one `index: instruction` line per entry.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.len().saturating_sub(1).to_string().len();
        for (index, instruction) in self.iter().enumerate() {
            writeln!(f, "{index:>width$}: {instruction}")?;
        }
        Ok(())
    }
}
