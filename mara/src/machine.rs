//! The register/stack/heap machine.
//!
//! State is a program counter, a flat register file, a value stack with
//! a frame pointer, and a [`Heap`]. Registers and stack cells are
//! `Option<Value>`: `None` means "not written", which is what `phi`
//! inspects and what `save`/`restore` carry across calls.
//!
//! Frame layout after `call @f a b`:
//!
//! ```text
//! stack: ... | return pc | caller fp | a | b | locals...
//!                          ^ frame_ptr
//! ```
//!
//! `load_p i`/`store_p i`/`store_once i` address
//! `stack[frame_ptr + i + 1]`.
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bytecode::{Instruction, Reg, Target};
use crate::heap::{Heap, HeapCreateInfo, HeapError};
use crate::value::{Value, ValueError};

/// Where `print_*` output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Write each line to stdout as it is produced.
    #[default]
    Immediate,
    /// Collect lines until [`Machine::flush`] or [`Machine::take_output`].
    Buffered,
}

/// Lines produced by a buffered machine. Cloning shares the buffer.
pub type OutputBuffer = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct MachineCreateInfo {
    pub output: OutputMode,
    /// Log every step at `trace` level.
    pub trace: bool,
    pub heap: HeapCreateInfo,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Fault {
    #[error("illegal instruction `{0}`")]
    IllegalInstruction(String),
    #[error("register r{0} is read before it was written")]
    UnsetRegister(Reg),
    #[error("phi found both r{left} and r{right} set")]
    PhiBothSet { left: Reg, right: Reg },
    #[error("phi found neither r{left} nor r{right} set")]
    PhiNeitherSet { left: Reg, right: Reg },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack slot {index} is outside the stack of {len} cells")]
    StackOutOfRange { index: usize, len: usize },
    #[error("stack slot {0} is read before it was written")]
    UnsetSlot(usize),
    #[error("val in stack slot {0} is already assigned")]
    AlreadyAssigned(usize),
    #[error("constant #{0} is not in the pool")]
    MissingConstant(usize),
    #[error("{0} is not an address")]
    NotAnAddress(Value),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[error("runtime error at pc {pc}: {fault}")]
pub struct RuntimeError {
    pub pc: usize,
    #[source]
    pub fault: Fault,
}

enum Flow {
    Next,
    Jump(usize),
    Halt,
}

#[derive(Debug)]
pub struct Machine {
    code: Arc<[Instruction]>,
    pool: Vec<Value>,
    pc: usize,
    registers: Vec<Option<Value>>,
    stack: Vec<Option<Value>>,
    frame_ptr: usize,
    heap: Heap,
    mode: OutputMode,
    output: OutputBuffer,
    trace: bool,
    halted: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineCreateInfo::default())
    }
}

impl Machine {
    pub fn new(info: MachineCreateInfo) -> Self {
        Self {
            code: Arc::from(Vec::new()),
            pool: Vec::new(),
            pc: 0,
            registers: Vec::new(),
            stack: Vec::new(),
            frame_ptr: 0,
            heap: Heap::new(info.heap),
            mode: info.output,
            output: OutputBuffer::default(),
            trace: info.trace,
            halted: false,
        }
    }

    /// Install a new program. Registers, stack and heap are kept, so a
    /// session can build on what earlier programs left behind.
    pub fn load(&mut self, code: Vec<Instruction>, pool: &[Value]) {
        self.code = Arc::from(code);
        self.pool = pool.to_vec();
        self.pc = 0;
        self.halted = false;
    }

    /// Drop every frame left behind by a faulted run.
    pub fn unwind(&mut self) {
        log::debug!("unwinding {} stack cells", self.stack.len());
        self.stack.clear();
        self.frame_ptr = 0;
    }

    /// Run until `halt`, the end of the code, or a fault.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while !self.halted && self.pc < self.code.len() {
            self.step()?;
        }
        self.halted = true;
        Ok(())
    }

    /// Execute the instruction at `pc`.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let code = Arc::clone(&self.code);
        let pc = self.pc;
        let Some(instr) = code.get(pc) else {
            self.halted = true;
            return Ok(());
        };
        if self.trace {
            log::trace!("{pc}: {instr}");
        }
        match self.execute(instr) {
            Ok(Flow::Next) => self.pc += 1,
            Ok(Flow::Jump(target)) => self.pc = target,
            Ok(Flow::Halt) => self.halted = true,
            Err(fault) => {
                self.halted = true;
                let err = RuntimeError { pc, fault };
                log::error!("{err}");
                return Err(err);
            }
        }
        if self.trace {
            log::trace!("{pc}= {}", self.describe());
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn register(&self, reg: Reg) -> Option<Value> {
        self.registers.get(reg).copied().flatten()
    }

    /// Every set register, in register order.
    pub fn registers(&self) -> Vec<(Reg, Value)> {
        self.registers
            .iter()
            .enumerate()
            .filter_map(|(reg, value)| value.map(|v| (reg, v)))
            .collect()
    }

    pub fn stack(&self) -> &[Option<Value>] {
        &self.stack
    }

    /// Number of cells on the stack.
    pub fn stack_ptr(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_ptr(&self) -> usize {
        self.frame_ptr
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Shared handle to the buffered output.
    pub fn output(&self) -> OutputBuffer {
        Arc::clone(&self.output)
    }

    /// Drain buffered lines without printing them.
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }

    /// Print and clear buffered lines.
    pub fn flush(&self) {
        for line in self.take_output() {
            println!("{line}");
        }
    }

    /// `{r1:5, r2:3} [0, 0<fp, 6<sp]`
    pub fn describe(&self) -> String {
        let registers: Vec<String> = self
            .registers()
            .into_iter()
            .map(|(reg, value)| format!("r{reg}:{value}"))
            .collect();
        let mut out = format!("{{{}}} [", registers.join(", "));
        let top = self.stack.len().checked_sub(1);
        for (i, cell) in self.stack.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match cell {
                Some(value) => {
                    let _ = write!(out, "{value}");
                }
                None => out.push('_'),
            }
            if i == self.frame_ptr {
                out.push_str("<fp");
            }
            if Some(i) == top {
                out.push_str("<sp");
            }
        }
        out.push(']');
        out
    }

    // ── state access ───────────────────────────────────────────────

    fn read(&self, reg: Reg) -> Result<Value, Fault> {
        self.register(reg).ok_or(Fault::UnsetRegister(reg))
    }

    fn write(&mut self, reg: Reg, value: Option<Value>) {
        if reg >= self.registers.len() {
            self.registers.resize(reg + 1, None);
        }
        self.registers[reg] = value;
    }

    fn set(&mut self, reg: Reg, value: Value) {
        self.write(reg, Some(value));
    }

    fn pop_cell(&mut self) -> Result<Option<Value>, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<usize, Fault> {
        match self.pop_cell()? {
            Some(value) => address(value),
            None => Err(Fault::StackUnderflow),
        }
    }

    fn slot(&self, index: usize) -> Result<usize, Fault> {
        let slot = self.frame_ptr + index + 1;
        if slot >= self.stack.len() {
            return Err(Fault::StackOutOfRange {
                index: slot,
                len: self.stack.len(),
            });
        }
        Ok(slot)
    }

    fn pointer(&self, reg: Reg, offset: usize) -> Result<usize, Fault> {
        Ok(address(self.read(reg)?)? + offset)
    }

    fn emit(&self, line: String) {
        match self.mode {
            OutputMode::Immediate => println!("{line}"),
            OutputMode::Buffered => self.output.lock().push(line),
        }
    }

    // ── dispatch ───────────────────────────────────────────────────

    fn execute(&mut self, instr: &Instruction) -> Result<Flow, Fault> {
        use Instruction as I;
        match instr {
            I::Halt => return Ok(Flow::Halt),
            I::Label { .. } => {
                return Err(Fault::IllegalInstruction(instr.to_string()));
            }
            I::LoadC { dst, value } => self.set(*dst, *value),
            I::LoadK { dst, index } => {
                let value = self
                    .pool
                    .get(*index)
                    .copied()
                    .ok_or(Fault::MissingConstant(*index))?;
                self.set(*dst, value);
            }
            I::LoadA { dst, target } => {
                let addr = resolved(instr, target)?;
                self.set(*dst, Value::Int(addr as i64));
            }
            I::Copy { dst, src } => {
                let value = self.read(*src)?;
                self.set(*dst, value);
            }
            I::Unset { regs } => {
                for &reg in regs {
                    self.write(reg, None);
                }
            }
            I::Phi { dst, left, right } => {
                let value = match (self.register(*left), self.register(*right)) {
                    (Some(value), None) | (None, Some(value)) => value,
                    (Some(_), Some(_)) => {
                        return Err(Fault::PhiBothSet {
                            left: *left,
                            right: *right,
                        });
                    }
                    (None, None) => {
                        return Err(Fault::PhiNeitherSet {
                            left: *left,
                            right: *right,
                        });
                    }
                };
                self.set(*dst, value);
            }
            I::ArithRR {
                op,
                dst,
                left,
                right,
            } => {
                let value = self.read(*left)?.arith(*op, self.read(*right)?)?;
                self.set(*dst, value);
            }
            I::ArithRC {
                op,
                dst,
                left,
                value,
            } => {
                let value = self.read(*left)?.arith(*op, *value)?;
                self.set(*dst, value);
            }
            I::Compare {
                op,
                dst,
                left,
                right,
            } => {
                let value = self.read(*left)?.compare(*op, self.read(*right)?)?;
                self.set(*dst, value);
            }

            I::Jump { target } => return Ok(Flow::Jump(resolved(instr, target)?)),
            I::BranchZero { pred, target } => {
                if self.read(*pred)?.is_zero() {
                    return Ok(Flow::Jump(resolved(instr, target)?));
                }
            }
            I::BranchOne { pred, target } => {
                if !self.read(*pred)?.is_zero() {
                    return Ok(Flow::Jump(resolved(instr, target)?));
                }
            }
            I::BranchCmp {
                cmp,
                left,
                right,
                target,
            } => {
                let truth = self
                    .read(*left)?
                    .compare(cmp.compare_op(), self.read(*right)?)?;
                if !truth.is_zero() {
                    return Ok(Flow::Jump(resolved(instr, target)?));
                }
            }

            I::Call { target, args } => {
                let entry = resolved(instr, target)?;
                let values = args
                    .iter()
                    .map(|&reg| self.read(reg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.stack.push(Some(Value::Int(self.pc as i64)));
                self.stack.push(Some(Value::Int(self.frame_ptr as i64)));
                self.frame_ptr = self.stack.len() - 1;
                self.stack.extend(values.into_iter().map(Some));
                return Ok(Flow::Jump(entry));
            }
            I::Ret => {
                if self.frame_ptr == 0 || self.frame_ptr >= self.stack.len() {
                    return Err(Fault::StackUnderflow);
                }
                self.stack.truncate(self.frame_ptr + 1);
                let caller_fp = self.pop_int()?;
                let return_pc = self.pop_int()?;
                self.frame_ptr = caller_fp;
                return Ok(Flow::Jump(return_pc + 1));
            }
            I::Reserve { size } => {
                let needed = self.frame_ptr + 1 + size;
                if self.stack.len() < needed {
                    self.stack.resize(needed, None);
                }
            }
            I::Save { regs } => {
                for &reg in regs.iter().rev() {
                    self.stack.push(self.register(reg));
                }
            }
            I::Restore { regs } => {
                for &reg in regs {
                    let cell = self.pop_cell()?;
                    self.write(reg, cell);
                }
            }
            I::LoadP { dst, index } => {
                let slot = self.slot(*index)?;
                let value = self.stack[slot].ok_or(Fault::UnsetSlot(slot))?;
                self.set(*dst, value);
            }
            I::StoreP { src, index } => {
                let value = self.read(*src)?;
                let slot = self.slot(*index)?;
                self.stack[slot] = Some(value);
            }
            I::StoreOnce { src, index } => {
                let value = self.read(*src)?;
                let slot = self.slot(*index)?;
                if !matches!(self.stack[slot], None | Some(Value::Null)) {
                    return Err(Fault::AlreadyAssigned(slot));
                }
                self.stack[slot] = Some(value);
            }

            I::Push { src } => {
                let value = self.read(*src)?;
                self.stack.push(Some(value));
            }
            I::Pop { dst } => {
                let cell = self.pop_cell()?;
                self.write(*dst, cell);
            }
            I::Peak { dst, offset } => {
                let len = self.stack.len();
                let cell = len
                    .checked_sub(offset + 1)
                    .map(|index| self.stack[index])
                    .ok_or(Fault::StackOutOfRange {
                        index: offset + 1,
                        len,
                    })?;
                self.write(*dst, cell);
            }

            I::NewChunk { dst, size } => {
                let addr = self.heap.allocate(*size);
                self.set(*dst, Value::Int(addr as i64));
            }
            I::NewSym { dst, text } => {
                let addr = self.heap.allocate_symbol(text);
                self.set(*dst, Value::Int(addr as i64));
            }
            I::LoadD { dst, ptr } => {
                let value = self.heap.load(self.pointer(*ptr, 0)?)?;
                self.set(*dst, value);
            }
            I::StoreD { ptr, src } => {
                let addr = self.pointer(*ptr, 0)?;
                self.heap.store(addr, self.read(*src)?)?;
            }
            I::LoadI { dst, ptr, offset } => {
                let value = self.heap.load(self.pointer(*ptr, *offset)?)?;
                self.set(*dst, value);
            }
            I::StoreI { ptr, offset, src } => {
                let addr = self.pointer(*ptr, *offset)?;
                self.heap.store(addr, self.read(*src)?)?;
            }

            I::PrintConst { value } => self.emit(value.to_string()),
            I::PrintReg { reg } => {
                let value = self.read(*reg)?;
                self.emit(format!("r{reg}:{value}"));
            }
            I::PrintSym { reg } => {
                let addr = address(self.read(*reg)?)?;
                let text = self.heap.symbol(addr)?;
                self.emit(format!("r{reg}:{addr}=>'{text}'"));
            }
        }
        Ok(Flow::Next)
    }
}

fn address(value: Value) -> Result<usize, Fault> {
    match value {
        Value::Int(n) => usize::try_from(n).map_err(|_| Fault::NotAnAddress(value)),
        other => Err(Fault::NotAnAddress(other)),
    }
}

fn resolved(instr: &Instruction, target: &Target) -> Result<usize, Fault> {
    match target {
        Target::Address(addr) => Ok(*addr),
        Target::Label(_) => Err(Fault::IllegalInstruction(instr.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BranchCmp, RETURN_REG};
    use crate::value::{ArithOp, CompareOp};
    use proptest::prelude::*;

    fn buffered() -> Machine {
        Machine::new(MachineCreateInfo {
            output: OutputMode::Buffered,
            ..Default::default()
        })
    }

    fn run(code: Vec<Instruction>) -> Machine {
        let mut machine = buffered();
        machine.load(code, &[]);
        machine.run().unwrap();
        machine
    }

    fn fault(code: Vec<Instruction>) -> RuntimeError {
        let mut machine = buffered();
        machine.load(code, &[]);
        machine.run().unwrap_err()
    }

    fn int(dst: Reg, n: i64) -> Instruction {
        Instruction::LoadC {
            dst,
            value: Value::Int(n),
        }
    }

    fn at(addr: usize) -> Target {
        Target::Address(addr)
    }

    #[test]
    fn arithmetic_and_constants() {
        let mut machine = buffered();
        machine.load(
            vec![
                Instruction::LoadK { dst: 1, index: 2 },
                int(2, 4),
                Instruction::ArithRR {
                    op: ArithOp::Div,
                    dst: 3,
                    left: 1,
                    right: 2,
                },
                Instruction::ArithRC {
                    op: ArithOp::Rem,
                    dst: 4,
                    left: 1,
                    value: Value::Int(-4),
                },
                Instruction::Compare {
                    op: CompareOp::Gt,
                    dst: 5,
                    left: 1,
                    right: 2,
                },
                Instruction::Halt,
            ],
            &[Value::Int(0), Value::Int(1), Value::Int(-7)],
        );
        machine.run().unwrap();
        assert_eq!(machine.register(3), Some(Value::Int(-2)));
        assert_eq!(machine.register(4), Some(Value::Int(-3)));
        assert_eq!(machine.register(5), Some(Value::Int(0)));
        assert!(machine.is_halted());
    }

    #[test]
    fn running_off_the_end_stops() {
        let machine = run(vec![int(1, 1)]);
        assert!(machine.is_halted());
        assert_eq!(machine.pc(), 1);
    }

    #[test]
    fn jumps_land_on_their_target() {
        let machine = run(vec![
            int(1, 0),
            Instruction::BranchZero {
                pred: 1,
                target: at(3),
            },
            int(2, 99),
            int(3, 1),
            Instruction::BranchOne {
                pred: 3,
                target: at(6),
            },
            int(4, 99),
            Instruction::BranchCmp {
                cmp: BranchCmp::Lt,
                left: 1,
                right: 3,
                target: at(8),
            },
            int(5, 99),
            Instruction::Halt,
        ]);
        assert_eq!(machine.register(2), None);
        assert_eq!(machine.register(4), None);
        assert_eq!(machine.register(5), None);
    }

    #[test]
    fn phi_takes_the_written_register() {
        let machine = run(vec![
            int(1, 7),
            Instruction::Unset { regs: vec![2, 3] },
            int(3, 5),
            Instruction::Phi {
                dst: 4,
                left: 2,
                right: 3,
            },
        ]);
        assert_eq!(machine.register(4), Some(Value::Int(5)));
        assert_eq!(machine.register(3), Some(Value::Int(5)));
    }

    #[test]
    fn phi_rejects_both_and_neither() {
        let err = fault(vec![
            int(1, 1),
            int(2, 2),
            Instruction::Phi {
                dst: 3,
                left: 1,
                right: 2,
            },
        ]);
        assert_eq!(err.pc, 2);
        assert_eq!(err.fault, Fault::PhiBothSet { left: 1, right: 2 });

        let err = fault(vec![Instruction::Phi {
            dst: 3,
            left: 1,
            right: 2,
        }]);
        assert_eq!(err.fault, Fault::PhiNeitherSet { left: 1, right: 2 });
    }

    #[test]
    fn call_and_return_balance_the_stack() {
        // double(16)
        let machine = run(vec![
            int(1, 16),
            Instruction::Call {
                target: at(3),
                args: vec![1],
            },
            Instruction::Halt,
            Instruction::Reserve { size: 1 },
            Instruction::LoadP { dst: 2, index: 0 },
            Instruction::ArithRR {
                op: ArithOp::Add,
                dst: 0,
                left: 2,
                right: 2,
            },
            Instruction::Ret,
        ]);
        assert_eq!(machine.register(RETURN_REG), Some(Value::Int(32)));
        assert_eq!(machine.stack_ptr(), 0);
        assert_eq!(machine.frame_ptr(), 0);
        assert_eq!(machine.pc(), 2);
    }

    #[test]
    fn frame_layout_during_a_call() {
        let mut machine = buffered();
        machine.load(
            vec![
                int(1, 6),
                int(2, 10),
                Instruction::Call {
                    target: at(4),
                    args: vec![1, 2],
                },
                Instruction::Halt,
                Instruction::Reserve { size: 3 },
                Instruction::Ret,
            ],
            &[],
        );
        for _ in 0..4 {
            machine.step().unwrap();
        }
        assert_eq!(machine.frame_ptr(), 1);
        assert_eq!(
            machine.stack(),
            &[
                Some(Value::Int(2)),
                Some(Value::Int(0)),
                Some(Value::Int(6)),
                Some(Value::Int(10)),
                None,
            ]
        );
        assert_eq!(machine.describe(), "{r1:6, r2:10} [2, 0<fp, 6, 10, _<sp]");
        machine.run().unwrap();
        assert_eq!(machine.describe(), "{r1:6, r2:10} []");
    }

    #[test]
    fn save_and_restore_keep_unset_registers_unset() {
        let machine = run(vec![
            int(1, 1),
            Instruction::Save { regs: vec![1, 2, 3] },
            int(1, 100),
            int(2, 200),
            Instruction::Restore { regs: vec![1, 2, 3] },
        ]);
        assert_eq!(machine.register(1), Some(Value::Int(1)));
        assert_eq!(machine.register(2), None);
        assert_eq!(machine.register(3), None);
        assert_eq!(machine.stack_ptr(), 0);
    }

    #[test]
    fn save_pushes_last_register_first() {
        let machine = run(vec![
            int(1, 1),
            int(2, 2),
            Instruction::Save { regs: vec![1, 2] },
            Instruction::Peak { dst: 3, offset: 0 },
            Instruction::Peak { dst: 4, offset: 1 },
        ]);
        assert_eq!(machine.register(3), Some(Value::Int(1)));
        assert_eq!(machine.register(4), Some(Value::Int(2)));
    }

    #[test]
    fn return_without_call_underflows() {
        let err = fault(vec![Instruction::Ret]);
        assert_eq!(err.fault, Fault::StackUnderflow);
        let err = fault(vec![Instruction::Pop { dst: 1 }]);
        assert_eq!(err.fault, Fault::StackUnderflow);
    }

    #[test]
    fn heap_chunks_and_symbols() {
        let mut machine = buffered();
        machine.load(
            vec![
                Instruction::NewChunk { dst: 1, size: 2 },
                int(2, 41),
                Instruction::StoreI {
                    ptr: 1,
                    offset: 1,
                    src: 2,
                },
                Instruction::LoadI {
                    dst: 3,
                    ptr: 1,
                    offset: 1,
                },
                Instruction::StoreD { ptr: 1, src: 3 },
                Instruction::LoadD { dst: 4, ptr: 1 },
                Instruction::NewSym {
                    dst: 5,
                    text: "hi".into(),
                },
                Instruction::PrintSym { reg: 5 },
                Instruction::PrintReg { reg: 4 },
                Instruction::PrintConst {
                    value: Value::Real(2.0),
                },
            ],
            &[],
        );
        machine.run().unwrap();
        assert_eq!(machine.register(4), Some(Value::Int(41)));
        assert_eq!(machine.heap().top(), 5);
        assert_eq!(machine.take_output(), vec!["r5:2=>'hi'", "r4:41", "2.0"]);
        assert!(machine.take_output().is_empty());
    }

    #[test]
    fn null_prints_as_null() {
        let mut machine = run(vec![
            Instruction::LoadC {
                dst: 1,
                value: Value::Null,
            },
            Instruction::PrintConst { value: Value::Null },
            Instruction::PrintReg { reg: 1 },
        ]);
        assert_eq!(machine.take_output(), vec!["NULL", "r1:NULL"]);
    }

    #[test]
    fn heap_reads_are_checked() {
        let err = fault(vec![
            Instruction::NewChunk { dst: 1, size: 1 },
            Instruction::LoadD { dst: 2, ptr: 1 },
        ]);
        assert_eq!(err.fault, Fault::Heap(HeapError::Uninitialised(0)));
        let err = fault(vec![
            int(1, -1),
            Instruction::LoadI {
                dst: 2,
                ptr: 1,
                offset: 0,
            },
        ]);
        assert_eq!(err.fault, Fault::NotAnAddress(Value::Int(-1)));
    }

    #[test]
    fn unresolved_labels_are_illegal() {
        let err = fault(vec![Instruction::Label {
            name: "loose".into(),
        }]);
        assert!(matches!(err.fault, Fault::IllegalInstruction(_)));
        let err = fault(vec![Instruction::Jump {
            target: Target::label("loose"),
        }]);
        assert_eq!(
            err.fault,
            Fault::IllegalInstruction("jump @loose".into())
        );
    }

    #[test]
    fn store_once_fills_a_null_slot_only() {
        let prefix = vec![
            Instruction::Reserve { size: 1 },
            Instruction::LoadC {
                dst: 1,
                value: Value::Null,
            },
            Instruction::StoreP { src: 1, index: 0 },
            int(2, 5),
            Instruction::StoreOnce { src: 2, index: 0 },
            Instruction::LoadP { dst: 3, index: 0 },
        ];
        let machine = run(prefix.clone());
        assert_eq!(machine.register(3), Some(Value::Int(5)));

        let mut twice = prefix;
        twice.push(Instruction::StoreOnce { src: 2, index: 0 });
        let err = fault(twice);
        assert_eq!(err.pc, 6);
        assert_eq!(err.fault, Fault::AlreadyAssigned(1));
    }

    #[test]
    fn faults_halt_the_machine() {
        let mut machine = buffered();
        machine.load(
            vec![
                int(1, 1),
                int(2, 0),
                Instruction::ArithRR {
                    op: ArithOp::Div,
                    dst: 3,
                    left: 1,
                    right: 2,
                },
                int(4, 4),
            ],
            &[],
        );
        let err = machine.run().unwrap_err();
        assert_eq!(err.fault, Fault::Value(ValueError::DivisionByZero));
        assert!(machine.is_halted());
        assert_eq!(machine.register(4), None);
    }

    #[test]
    fn state_survives_reloading() {
        let mut machine = buffered();
        machine.load(vec![int(1, 5), Instruction::Halt], &[]);
        machine.run().unwrap();
        machine.load(
            vec![Instruction::ArithRC {
                op: ArithOp::Mul,
                dst: 2,
                left: 1,
                value: Value::Int(3),
            }],
            &[],
        );
        machine.run().unwrap();
        assert_eq!(machine.register(2), Some(Value::Int(15)));
    }

    proptest! {
        #[test]
        fn pushes_and_pops_balance(values in proptest::collection::vec(-1000i64..1000, 1..40)) {
            let mut code = Vec::new();
            for (i, &n) in values.iter().enumerate() {
                code.push(int(i + 1, n));
                code.push(Instruction::Push { src: i + 1 });
            }
            let base = values.len() + 1;
            for i in 0..values.len() {
                code.push(Instruction::Pop { dst: base + i });
            }
            let machine = run(code);
            prop_assert_eq!(machine.stack_ptr(), 0);
            for (i, &n) in values.iter().rev().enumerate() {
                prop_assert_eq!(machine.register(base + i), Some(Value::Int(n)));
            }
        }
    }
}
