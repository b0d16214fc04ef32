//! One evaluation session: the full pipeline in front of a persistent
//! [`Machine`].
//!
//! Every call to [`Interpreter::evaluate`] gets a fresh tree, namespace
//! arena, constant pool and register numbering. Only the machine (its
//! registers, stack and heap) and the anonymous-module counter carry
//! over, so a REPL can keep working after a failed input.
use crate::assembler::Assembler;
use crate::bytecode::{Instruction, disassemble};
use crate::compiler::{Compiled, Compiler};
use crate::constant::ConstantPool;
use crate::error::Error;
use crate::ids::UniqueIds;
use crate::machine::{Fault, Machine, MachineCreateInfo, RuntimeError};
use crate::parser::Parser;
use crate::passes::{
    CollectLocals, CollectNames, JoinElse, ModuleFunction, Pass, TypeCheck, run_all,
};
use crate::value::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct InterpreterCreateInfo {
    pub machine: MachineCreateInfo,
    /// Run the type checker before compiling.
    pub type_check: bool,
    /// Log the partial instruction stream when compilation fails.
    pub dump_on_error: bool,
}

/// Assembled program ready for the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub pool: ConstantPool,
    pub result: usize,
}

impl Program {
    /// Assembled instructions followed by the constant pool.
    pub fn listing(&self) -> String {
        let mut out = disassemble(&self.code);
        out.push_str("constants:\n");
        for (index, value) in self.pool.values().iter().enumerate() {
            out.push_str(&format!("  #{index} = {value}\n"));
        }
        out
    }
}

#[derive(Debug)]
pub struct Interpreter {
    machine: Machine,
    ids: UniqueIds,
    type_check: bool,
    dump_on_error: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterCreateInfo::default())
    }
}

impl Interpreter {
    pub fn new(info: InterpreterCreateInfo) -> Self {
        Self {
            machine: Machine::new(info.machine),
            ids: UniqueIds::new(),
            type_check: info.type_check,
            dump_on_error: info.dump_on_error,
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Everything up to and including assembly.
    pub fn compile(&mut self, source: &str) -> Result<Program, Error> {
        let mut ast = Parser::new(source).parse(&mut self.ids)?;
        log::debug!("parsed {} nodes", ast.len());

        let mut join_else = JoinElse::new();
        let mut module_function = ModuleFunction::new();
        let mut collect_names = CollectNames::new();
        let mut collect_locals = CollectLocals::new();
        let mut type_check = TypeCheck::new();
        let mut passes: Vec<&mut dyn Pass> = vec![
            &mut join_else as &mut dyn Pass,
            &mut module_function,
            &mut collect_names,
            &mut collect_locals,
        ];
        if self.type_check {
            passes.push(&mut type_check);
        }
        run_all(&mut ast, &mut passes)?;

        let pool = ConstantPool::build(&mut ast)?;
        let mut compiler = Compiler::new();
        if self.dump_on_error {
            compiler = compiler.with_dump_hook(|err, code| {
                log::error!("{err}\n{}", disassemble(code));
            });
        }
        let Compiled { code, result } = compiler.compile(&mut ast)?;
        let code = Assembler::new().assemble(code)?;
        Ok(Program { code, pool, result })
    }

    /// Compile `source`, run it, and return the value of its last
    /// expression.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, Error> {
        let program = self.compile(source)?;
        self.machine.load(program.code, program.pool.values());
        if let Err(err) = self.machine.run() {
            self.machine.unwind();
            return Err(err.into());
        }
        self.machine.register(program.result).ok_or_else(|| {
            Error::from(RuntimeError {
                pc: self.machine.pc(),
                fault: Fault::UnsetRegister(program.result),
            })
        })
    }

    /// Buffered output produced so far, drained.
    pub fn take_output(&self) -> Vec<String> {
        self.machine.take_output()
    }

    pub fn flush(&self) {
        self.machine.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_shows_code_and_constants() {
        let program = Interpreter::default().compile("1 + 2").unwrap();
        let listing = program.listing();
        assert!(listing.starts_with("   0: load_a r1 2\n"), "{listing}");
        assert!(listing.contains("call 2"), "{listing}");
        assert!(listing.ends_with("  #2 = 1\n  #3 = 2\n"), "{listing}");
        assert!(!listing.contains('@'));
    }

    #[test]
    fn session_survives_errors() {
        let mut session = Interpreter::default();
        assert!(session.evaluate("1 +").is_err());
        assert!(session.evaluate("1 / 0").is_err());
        assert_eq!(session.evaluate("6 * 7"), Ok(Value::Int(42)));
    }

    #[test]
    fn type_check_is_opt_in() {
        let source = "val x Int = 1.5\nx";
        assert_eq!(
            Interpreter::default().evaluate(source),
            Ok(Value::Real(1.5))
        );
        let mut checked = Interpreter::new(InterpreterCreateInfo {
            type_check: true,
            ..Default::default()
        });
        assert!(matches!(checked.evaluate(source), Err(Error::Pass(_))));
    }
}
