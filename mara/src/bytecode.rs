//! Instruction set of the machine.
//!
//! Control transfers name their destination with a [`Target`]: the
//! compiler emits labels and the assembler replaces them with absolute
//! instruction indices. The textual form of an instruction is its
//! lowercase opcode followed by its operands, e.g. `add_rr r3 r1 r2` or
//! `branch_zero r4 @f_0_else`.
use std::fmt;

use crate::value::{ArithOp, CompareOp, Value};

pub type Reg = usize;

/// Register 0 carries return values between activations.
pub const RETURN_REG: Reg = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Label(String),
    Address(usize),
}

impl Target {
    pub fn label(name: impl Into<String>) -> Self {
        Target::Label(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Label(name) => write!(f, "@{name}"),
            Target::Address(addr) => write!(f, "{addr}"),
        }
    }
}

/// Conditions for two-register branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCmp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl BranchCmp {
    pub fn name(self) -> &'static str {
        match self {
            BranchCmp::Eq => "branch_eq",
            BranchCmp::Gt => "branch_gt",
            BranchCmp::Lt => "branch_lt",
            BranchCmp::Gte => "branch_gte",
            BranchCmp::Lte => "branch_lte",
        }
    }

    pub fn compare_op(self) -> CompareOp {
        match self {
            BranchCmp::Eq => CompareOp::Eq,
            BranchCmp::Gt => CompareOp::Gt,
            BranchCmp::Lt => CompareOp::Lt,
            BranchCmp::Gte => CompareOp::Gte,
            BranchCmp::Lte => CompareOp::Lte,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Stop the machine.
    Halt,
    /// Pseudo-instruction marking the next real instruction. Removed by
    /// the assembler.
    Label { name: String },

    /// `dst <- value`
    LoadC { dst: Reg, value: Value },
    /// `dst <- pool[index]`
    LoadK { dst: Reg, index: usize },
    /// `dst <- address of target`
    LoadA { dst: Reg, target: Target },
    /// `dst <- src`
    Copy { dst: Reg, src: Reg },
    /// Mark registers as unwritten, ahead of a `phi`.
    Unset { regs: Vec<Reg> },
    /// `dst <- whichever of left/right is set`; exactly one must be.
    Phi { dst: Reg, left: Reg, right: Reg },

    /// `dst <- left op right`
    ArithRR {
        op: ArithOp,
        dst: Reg,
        left: Reg,
        right: Reg,
    },
    /// `dst <- left op value`
    ArithRC {
        op: ArithOp,
        dst: Reg,
        left: Reg,
        value: Value,
    },
    /// `dst <- (left op right) as 1/0`
    Compare {
        op: CompareOp,
        dst: Reg,
        left: Reg,
        right: Reg,
    },

    Jump { target: Target },
    BranchZero { pred: Reg, target: Target },
    /// Branch when `pred` is non-zero.
    BranchOne { pred: Reg, target: Target },
    BranchCmp {
        cmp: BranchCmp,
        left: Reg,
        right: Reg,
        target: Target,
    },

    /// Push return pc and frame pointer, open a frame, push the argument
    /// values and jump.
    Call { target: Target, args: Vec<Reg> },
    /// Tear down the current frame and resume after the `call`.
    Ret,
    /// Grow the current frame to hold `size` slots.
    Reserve { size: usize },
    /// Push the registers, last first.
    Save { regs: Vec<Reg> },
    /// Pop the registers, first first.
    Restore { regs: Vec<Reg> },
    /// `dst <- stack[frame_ptr + index + 1]`
    LoadP { dst: Reg, index: usize },
    /// `stack[frame_ptr + index + 1] <- src`
    StoreP { src: Reg, index: usize },
    /// `store_p` for a `val` declared without a value: the slot must still
    /// hold `NULL`.
    StoreOnce { src: Reg, index: usize },

    Push { src: Reg },
    Pop { dst: Reg },
    /// Read `offset` cells below the top of stack without popping.
    Peak { dst: Reg, offset: usize },

    /// Allocate `size` heap cells; `dst` receives the address.
    NewChunk { dst: Reg, size: usize },
    /// Allocate a symbol; `dst` receives the address.
    NewSym { dst: Reg, text: String },
    /// `dst <- heap[ptr]`
    LoadD { dst: Reg, ptr: Reg },
    /// `heap[ptr] <- src`
    StoreD { ptr: Reg, src: Reg },
    /// `dst <- heap[ptr + offset]`
    LoadI { dst: Reg, ptr: Reg, offset: usize },
    /// `heap[ptr + offset] <- src`
    StoreI { ptr: Reg, offset: usize, src: Reg },

    PrintConst { value: Value },
    PrintReg { reg: Reg },
    PrintSym { reg: Reg },
}

/// One operand in the textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    Const(Value),
    Pool(usize),
    Target(Target),
    Count(usize),
    Text(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "r{reg}"),
            Operand::Const(value) => write!(f, "{value}"),
            Operand::Pool(index) => write!(f, "#{index}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Count(n) => write!(f, "{n}"),
            Operand::Text(text) => write!(f, "{text:?}"),
        }
    }
}

fn regs(list: &[Reg]) -> Vec<Operand> {
    list.iter().copied().map(Operand::Reg).collect()
}

impl Instruction {
    pub fn opcode(&self) -> &'static str {
        use Instruction::*;
        match self {
            Halt => "halt",
            Label { .. } => "label",
            LoadC { .. } => "load_c",
            LoadK { .. } => "load_k",
            LoadA { .. } => "load_a",
            Copy { .. } => "copy",
            Unset { .. } => "unset",
            Phi { .. } => "phi",
            ArithRR { op, .. } => match op {
                ArithOp::Add => "add_rr",
                ArithOp::Sub => "sub_rr",
                ArithOp::Mul => "mul_rr",
                ArithOp::Div => "div_rr",
                ArithOp::Rem => "rem_rr",
            },
            ArithRC { op, .. } => match op {
                ArithOp::Add => "add_rc",
                ArithOp::Sub => "sub_rc",
                ArithOp::Mul => "mul_rc",
                ArithOp::Div => "div_rc",
                ArithOp::Rem => "rem_rc",
            },
            Compare { op, .. } => op.name(),
            Jump { .. } => "jump",
            BranchZero { .. } => "branch_zero",
            BranchOne { .. } => "branch_one",
            Instruction::BranchCmp { cmp, .. } => cmp.name(),
            Call { .. } => "call",
            Ret => "ret",
            Reserve { .. } => "reserve",
            Save { .. } => "save",
            Restore { .. } => "restore",
            LoadP { .. } => "load_p",
            StoreP { .. } => "store_p",
            StoreOnce { .. } => "store_once",
            Push { .. } => "push",
            Pop { .. } => "pop",
            Peak { .. } => "peak",
            NewChunk { .. } => "new_chunk",
            NewSym { .. } => "new_sym",
            LoadD { .. } => "load_d",
            StoreD { .. } => "store_d",
            LoadI { .. } => "load_i",
            StoreI { .. } => "store_i",
            PrintConst { .. } => "print_const",
            PrintReg { .. } => "print_reg",
            PrintSym { .. } => "print_sym",
        }
    }

    pub fn operands(&self) -> Vec<Operand> {
        use Instruction::*;
        use Operand as O;
        match self {
            Halt | Ret => Vec::new(),
            Label { name } => vec![O::Target(Target::Label(name.clone()))],
            LoadC { dst, value } => vec![O::Reg(*dst), O::Const(*value)],
            LoadK { dst, index } => vec![O::Reg(*dst), O::Pool(*index)],
            LoadA { dst, target } => {
                vec![O::Reg(*dst), O::Target(target.clone())]
            }
            Copy { dst, src } => vec![O::Reg(*dst), O::Reg(*src)],
            Unset { regs: list } | Save { regs: list } | Restore { regs: list } => {
                regs(list)
            }
            Phi { dst, left, right } => {
                vec![O::Reg(*dst), O::Reg(*left), O::Reg(*right)]
            }
            ArithRR {
                dst, left, right, ..
            }
            | Compare {
                dst, left, right, ..
            } => vec![O::Reg(*dst), O::Reg(*left), O::Reg(*right)],
            ArithRC {
                dst, left, value, ..
            } => vec![O::Reg(*dst), O::Reg(*left), O::Const(*value)],
            Jump { target } => vec![O::Target(target.clone())],
            BranchZero { pred, target } | BranchOne { pred, target } => {
                vec![O::Reg(*pred), O::Target(target.clone())]
            }
            Instruction::BranchCmp {
                left,
                right,
                target,
                ..
            } => vec![O::Reg(*left), O::Reg(*right), O::Target(target.clone())],
            Call { target, args } => {
                let mut out = vec![O::Target(target.clone())];
                out.extend(regs(args));
                out
            }
            Reserve { size } => vec![O::Count(*size)],
            LoadP { dst, index } => vec![O::Reg(*dst), O::Count(*index)],
            StoreP { src, index } | StoreOnce { src, index } => {
                vec![O::Reg(*src), O::Count(*index)]
            }
            Push { src } => vec![O::Reg(*src)],
            Pop { dst } => vec![O::Reg(*dst)],
            Peak { dst, offset } => vec![O::Reg(*dst), O::Count(*offset)],
            NewChunk { dst, size } => vec![O::Reg(*dst), O::Count(*size)],
            NewSym { dst, text } => vec![O::Reg(*dst), O::Text(text.clone())],
            LoadD { dst, ptr } => vec![O::Reg(*dst), O::Reg(*ptr)],
            StoreD { ptr, src } => vec![O::Reg(*ptr), O::Reg(*src)],
            LoadI { dst, ptr, offset } => {
                vec![O::Reg(*dst), O::Reg(*ptr), O::Count(*offset)]
            }
            StoreI { ptr, offset, src } => {
                vec![O::Reg(*ptr), O::Count(*offset), O::Reg(*src)]
            }
            PrintConst { value } => vec![O::Const(*value)],
            PrintReg { reg } | PrintSym { reg } => vec![O::Reg(*reg)],
        }
    }

    /// The jump destination of label-consuming instructions.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Instruction::LoadA { target, .. }
            | Instruction::Jump { target }
            | Instruction::BranchZero { target, .. }
            | Instruction::BranchOne { target, .. }
            | Instruction::BranchCmp { target, .. }
            | Instruction::Call { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn target_mut(&mut self) -> Option<&mut Target> {
        match self {
            Instruction::LoadA { target, .. }
            | Instruction::Jump { target }
            | Instruction::BranchZero { target, .. }
            | Instruction::BranchOne { target, .. }
            | Instruction::BranchCmp { target, .. }
            | Instruction::Call { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode())?;
        for operand in self.operands() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// Render a stream one instruction per line, prefixed by its index.
pub fn disassemble(code: &[Instruction]) -> String {
    let mut out = String::new();
    for (pc, instr) in code.iter().enumerate() {
        out.push_str(&format!("{pc:4}: {instr}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_form() {
        let add = Instruction::ArithRR {
            op: ArithOp::Add,
            dst: 3,
            left: 1,
            right: 2,
        };
        assert_eq!(add.to_string(), "add_rr r3 r1 r2");

        let branch = Instruction::BranchZero {
            pred: 4,
            target: Target::label("f_0_else"),
        };
        assert_eq!(branch.to_string(), "branch_zero r4 @f_0_else");

        let call = Instruction::Call {
            target: Target::Address(12),
            args: vec![5, 6],
        };
        assert_eq!(call.to_string(), "call 12 r5 r6");

        assert_eq!(
            Instruction::LoadK { dst: 1, index: 2 }.to_string(),
            "load_k r1 #2"
        );
        assert_eq!(
            Instruction::LoadC {
                dst: 1,
                value: Value::Null
            }
            .to_string(),
            "load_c r1 NULL"
        );
        assert_eq!(Instruction::Halt.to_string(), "halt");
    }

    #[test]
    fn comparison_opcodes() {
        let lt = Instruction::Compare {
            op: CompareOp::Lt,
            dst: 1,
            left: 2,
            right: 3,
        };
        assert_eq!(lt.opcode(), "lt");
        let branch = Instruction::BranchCmp {
            cmp: BranchCmp::Gte,
            left: 1,
            right: 2,
            target: Target::Address(0),
        };
        assert_eq!(branch.to_string(), "branch_gte r1 r2 0");
    }

    #[test]
    fn only_control_transfers_have_targets() {
        assert!(Instruction::Jump {
            target: Target::Address(1)
        }
        .target()
        .is_some());
        assert!(Instruction::Ret.target().is_none());
        assert!(Instruction::Copy { dst: 1, src: 2 }.target().is_none());
    }

    #[test]
    fn disassembly_is_indexed() {
        let code = vec![
            Instruction::LoadC {
                dst: 1,
                value: Value::Int(7),
            },
            Instruction::Halt,
        ];
        assert_eq!(disassemble(&code), "   0: load_c r1 7\n   1: halt\n");
    }
}
