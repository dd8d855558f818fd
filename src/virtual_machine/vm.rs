//! Stack machine execution engine.
//!
//! [`VM`] owns the whole machine state: operand stack, call stack, program,
//! instruction pointer, halt flag, and the label and macro tables produced
//! by the assembler. [`VM::step`] interprets exactly one instruction and
//! reports the outcome as a [`Trap`]; the caller decides whether to keep
//! stepping.

mod observer;


pub use observer::{Observer, StdoutObserver};

use crate::virtual_machine::assembler::{Assembly, LabelTable, MacroTable};
use crate::virtual_machine::errors::{CodecError, Trap};
use crate::virtual_machine::instruction::{Instruction, Operand};
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::program::Program;
use crate::{error, info};
use std::path::Path;

/// Iteration ceiling used by the command-line driver.
pub const DEFAULT_STEP_LIMIT: usize = 69;

/// Decodes the operand an opcode expects and forwards it to its handler.
///
/// An operand of the wrong variant is rejected with [`Trap::IllegalInst`]
/// before the handler runs.
macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr.opcode {
            $(
                Opcode::$variant => exec_vm!(@call $vm, $instr, $handler, $args),
            )*
        }
    }};

    // Handler without operand
    (@call $vm:ident, $instr:ident, $handler:ident, ()) => {{
        let () = exec_vm!(@read $instr, Empty)?;
        $vm.$handler()
    }};

    // Handler with one decoded operand
    (@call $vm:ident, $instr:ident, $handler:ident, ($field:ident : $kind:ident)) => {{
        let $field = exec_vm!(@read $instr, $kind)?;
        $vm.$handler($field)
    }};

    (@read $instr:ident, Empty) => {
        match &$instr.operand {
            Operand::None => Ok::<(), Trap>(()),
            _ => Err(Trap::IllegalInst),
        }
    };

    // Integer literals are widened to the stack's f64
    (@read $instr:ident, Number) => {
        match &$instr.operand {
            Operand::Integer(v) => Ok::<f64, Trap>(*v as f64),
            Operand::Float(v) => Ok(*v),
            _ => Err(Trap::IllegalInst),
        }
    };

    (@read $instr:ident, Int) => {
        match &$instr.operand {
            Operand::Integer(v) => Ok::<i64, Trap>(*v),
            _ => Err(Trap::IllegalInst),
        }
    };

    (@read $instr:ident, Label) => {
        match &$instr.operand {
            Operand::Label(name) => Ok::<&str, Trap>(name.as_str()),
            _ => Err(Trap::IllegalInst),
        }
    };

    (@read $instr:ident, Pair) => {
        match &$instr.operand {
            Operand::IndexPair(index, amount) => Ok::<(i64, i64), Trap>((*index, *amount)),
            _ => Err(Trap::IllegalInst),
        }
    };
}

/// Stack virtual machine.
///
/// Generic over the [`Observer`] that receives `print_debug` output so tests
/// can capture it instead of writing to stdout.
#[derive(Debug)]
pub struct VM<O: Observer = StdoutObserver> {
    /// Operand stack; the top is the last element.
    stack: Vec<f64>,
    /// Return addresses pushed by `call`.
    call_stack: Vec<i64>,
    program: Program,
    /// Index of the next instruction. Signed so a bad `set_ip` is reported, not wrapped.
    ip: i64,
    halted: bool,
    labels: LabelTable,
    macros: MacroTable,
    observer: O,
}

impl VM {
    /// Empty machine printing `print_debug` values to stdout.
    pub fn new() -> Self {
        Self::with_observer(StdoutObserver)
    }

    pub fn from_program(program: Program) -> Self {
        let mut vm = Self::new();
        vm.program = program;
        vm
    }

    /// Machine ready to run an assembled program from index 0.
    pub fn from_assembly(assembly: Assembly) -> Self {
        let mut vm = Self::new();
        vm.load_assembly(assembly);
        vm
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Observer> VM<O> {
    pub fn with_observer(observer: O) -> Self {
        Self {
            stack: Vec::new(),
            call_stack: Vec::new(),
            program: Program::new(),
            ip: 0,
            halted: false,
            labels: LabelTable::new(),
            macros: MacroTable::new(),
            observer,
        }
    }

    /// Replaces program and tables with an assembler's output and rewinds `ip`.
    pub fn load_assembly(&mut self, assembly: Assembly) {
        self.program = assembly.program;
        self.labels = assembly.labels;
        self.macros = assembly.macros;
        self.ip = 0;
    }

    pub fn stack(&self) -> &[f64] {
        &self.stack
    }

    pub fn set_stack(&mut self, stack: Vec<f64>) {
        self.stack = stack;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn set_program(&mut self, program: Program) {
        self.program = program;
    }

    /// Appends one instruction to the program.
    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.program.push(instruction);
    }

    pub fn ip(&self) -> i64 {
        self.ip
    }

    pub fn set_ip(&mut self, ip: i64) {
        self.ip = ip;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    pub fn call_stack(&self) -> &[i64] {
        &self.call_stack
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn set_labels(&mut self, labels: LabelTable) {
        self.labels = labels;
    }

    /// Instruction index bound to `label`, if it was defined.
    pub fn label_loc(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Executes one instruction against the machine state.
    ///
    /// `Ok(())` is `TRAP_OK`. On any trap the stack, call stack and `ip` are
    /// left as they were before the call.
    pub fn step(&mut self, instruction: &Instruction) -> Result<(), Trap> {
        if self.ip < 0 {
            return Err(Trap::IllegalInstAccess);
        }

        exec_vm! {
            vm = self,
            instr = instruction,
            {
                Nop => op_nop(),
                Push => op_push(value: Number),
                Dup => op_dup(depth: Int),
                Drop => op_drop(),
                Swap => op_swap(depth: Int),
                // Arithmetic
                Plus => op_plus(),
                Minus => op_minus(),
                Mult => op_mult(),
                Div => op_div(),
                // Control flow
                Jmp => op_jmp(label: Label),
                JmpIf => op_jmp_if(label: Label),
                Eq => op_eq(),
                Halt => op_halt(),
                Not => op_not(),
                Ret => op_ret(),
                Call => op_call(label: Label),
                PrintDebug => op_print_debug(),
                // Bitwise
                Xor => op_xor(),
                And => op_and(),
                Or => op_or(),
                Shl => op_shl(pair: Pair),
                Shr => op_shr(pair: Pair),
            }
        }
    }

    /// Fetches `program[ip]` and executes it.
    ///
    /// An `ip` outside the program is [`Trap::IllegalInstAccess`].
    pub fn step_next(&mut self) -> Result<(), Trap> {
        let instruction = usize::try_from(self.ip)
            .ok()
            .and_then(|ip| self.program.get(ip))
            .cloned()
            .ok_or(Trap::IllegalInstAccess)?;
        self.step(&instruction)
    }

    /// Steps until the machine halts, traps, or `max_steps` instructions ran.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, max_steps: usize) -> Result<usize, Trap> {
        let mut steps = 0;
        while steps < max_steps && !self.halted {
            self.step_next()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Renders the operand stack bottom to top.
    pub fn dump_stack(&self) -> String {
        if self.stack.is_empty() {
            return String::from("Stack:\n[empty]\n");
        }
        let values: String = self.stack.iter().map(|value| format!("  {value}\n")).collect();
        format!("Stack:\n{values}")
    }

    /// Replaces the program with one decoded from `path`.
    ///
    /// On failure the error is logged and the machine is left untouched.
    pub fn load_program_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CodecError> {
        let path = path.as_ref();
        match Program::load(path) {
            Ok(program) => {
                self.program = program;
                info!("Program successfully loaded from {}", path.display());
                Ok(())
            }
            Err(err) => {
                error!("Failed to load program from {}: {err}", path.display());
                Err(err)
            }
        }
    }

    /// Writes the current program to `path`; refuses an empty program.
    pub fn save_program_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CodecError> {
        let path = path.as_ref();
        match self.program.save(path) {
            Ok(()) => {
                info!("Program successfully saved to {}", path.display());
                Ok(())
            }
            Err(err) => {
                error!("Failed to save program to {}: {err}", path.display());
                Err(err)
            }
        }
    }

    /// Address of the following instruction.
    fn next_ip(&self) -> Result<i64, Trap> {
        self.ip.checked_add(1).ok_or(Trap::IllegalInstAccess)
    }

    /// Absolute stack index of the element `depth` below the top.
    fn slot_at_depth(&self, depth: usize) -> Result<usize, Trap> {
        depth
            .checked_add(1)
            .and_then(|n| self.stack.len().checked_sub(n))
            .ok_or(Trap::StackUnderflow)
    }

    fn resolve(&self, label: &str) -> Result<i64, Trap> {
        self.labels
            .get(label)
            .and_then(|&target| i64::try_from(target).ok())
            .ok_or(Trap::IllegalInstAccess)
    }

    /// Replaces the top two elements with `op(second, top)`.
    fn binary_op(&mut self, op: impl FnOnce(f64, f64) -> f64) -> Result<(), Trap> {
        let next = self.next_ip()?;
        let &[.., a, b] = self.stack.as_slice() else {
            return Err(Trap::StackUnderflow);
        };
        self.stack.pop();
        let len = self.stack.len();
        self.stack[len - 1] = op(a, b);
        self.ip = next;
        Ok(())
    }

    /// Like [`Self::binary_op`] on operands truncated to integers.
    fn bitwise_op(&mut self, op: impl FnOnce(i64, i64) -> i64) -> Result<(), Trap> {
        self.binary_op(|a, b| op(a as i64, b as i64) as f64)
    }

    /// Shifts the integral value `index` below the top in place.
    fn shift_slot(
        &mut self,
        (index, amount): (i64, i64),
        shift: fn(i64, u32) -> i64,
    ) -> Result<(), Trap> {
        let next = self.next_ip()?;
        let depth = usize::try_from(index).map_err(|_| Trap::IllegalInstAccess)?;
        let slot = self.slot_at_depth(depth)?;
        let amount = u32::try_from(amount)
            .ok()
            .filter(|&n| n < i64::BITS)
            .ok_or(Trap::IllegalInst)?;

        let value = self.stack[slot];
        // i64::MIN is exact in f64; i64::MAX rounds up to 2^63.
        if value.fract() != 0.0 || !(i64::MIN as f64..i64::MAX as f64).contains(&value) {
            return Err(Trap::IllegalInst);
        }
        self.stack[slot] = shift(value as i64, amount) as f64;
        self.ip = next;
        Ok(())
    }

    fn op_nop(&mut self) -> Result<(), Trap> {
        let next = self.next_ip()?;
        self.ip = next;
        Ok(())
    }

    fn op_push(&mut self, value: f64) -> Result<(), Trap> {
        let next = self.next_ip()?;
        self.stack.push(value);
        self.ip = next;
        Ok(())
    }

    fn op_dup(&mut self, depth: i64) -> Result<(), Trap> {
        let next = self.next_ip()?;
        let depth = usize::try_from(depth).map_err(|_| Trap::IllegalInst)?;
        let slot = self.slot_at_depth(depth)?;
        self.stack.push(self.stack[slot]);
        self.ip = next;
        Ok(())
    }

    fn op_drop(&mut self) -> Result<(), Trap> {
        let next = self.next_ip()?;
        self.stack.pop().ok_or(Trap::StackUnderflow)?;
        self.ip = next;
        Ok(())
    }

    fn op_swap(&mut self, depth: i64) -> Result<(), Trap> {
        let next = self.next_ip()?;
        if self.stack.len() < 2 {
            return Err(Trap::StackUnderflow);
        }
        let depth = usize::try_from(depth).map_err(|_| Trap::IllegalInst)?;
        let slot = self.slot_at_depth(depth)?;
        let top = self.stack.len() - 1;
        self.stack.swap(top, slot);
        self.ip = next;
        Ok(())
    }

    fn op_plus(&mut self) -> Result<(), Trap> {
        self.binary_op(|a, b| a + b)
    }

    fn op_minus(&mut self) -> Result<(), Trap> {
        self.binary_op(|a, b| a - b)
    }

    fn op_mult(&mut self) -> Result<(), Trap> {
        self.binary_op(|a, b| a * b)
    }

    fn op_div(&mut self) -> Result<(), Trap> {
        match self.stack.last() {
            Some(&divisor) if self.stack.len() >= 2 && divisor == 0.0 => Err(Trap::DivByZero),
            _ => self.binary_op(|a, b| a / b),
        }
    }

    fn op_jmp(&mut self, label: &str) -> Result<(), Trap> {
        self.ip = self.resolve(label)?;
        Ok(())
    }

    fn op_jmp_if(&mut self, label: &str) -> Result<(), Trap> {
        let &condition = self.stack.last().ok_or(Trap::StackUnderflow)?;
        let target = if condition as i64 != 0 {
            self.resolve(label)?
        } else {
            self.next_ip()?
        };
        self.stack.pop();
        self.ip = target;
        Ok(())
    }

    fn op_eq(&mut self) -> Result<(), Trap> {
        self.binary_op(|a, b| if a == b { 1.0 } else { 0.0 })
    }

    fn op_halt(&mut self) -> Result<(), Trap> {
        self.halted = true;
        Ok(())
    }

    fn op_not(&mut self) -> Result<(), Trap> {
        let next = self.next_ip()?;
        let top = self.stack.last_mut().ok_or(Trap::StackUnderflow)?;
        *top = if *top == 0.0 { 1.0 } else { 0.0 };
        self.ip = next;
        Ok(())
    }

    fn op_ret(&mut self) -> Result<(), Trap> {
        self.ip = self.call_stack.pop().ok_or(Trap::StackUnderflow)?;
        Ok(())
    }

    fn op_call(&mut self, label: &str) -> Result<(), Trap> {
        let target = self.resolve(label)?;
        let next = self.next_ip()?;
        self.call_stack.push(next);
        self.ip = target;
        Ok(())
    }

    fn op_print_debug(&mut self) -> Result<(), Trap> {
        let next = self.next_ip()?;
        let value = self.stack.pop().ok_or(Trap::StackUnderflow)?;
        self.observer.emit(value);
        self.ip = next;
        Ok(())
    }

    fn op_xor(&mut self) -> Result<(), Trap> {
        self.bitwise_op(|a, b| a ^ b)
    }

    fn op_and(&mut self) -> Result<(), Trap> {
        self.bitwise_op(|a, b| a & b)
    }

    fn op_or(&mut self) -> Result<(), Trap> {
        self.bitwise_op(|a, b| a | b)
    }

    fn op_shl(&mut self, pair: (i64, i64)) -> Result<(), Trap> {
        self.shift_slot(pair, |v, n| v << n)
    }

    /// Arithmetic shift: the sign bit is preserved.
    fn op_shr(&mut self, pair: (i64, i64)) -> Result<(), Trap> {
        self.shift_slot(pair, |v, n| v >> n)
    }
}
