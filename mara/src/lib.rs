//! mara: a small expression language compiled to register bytecode.
//!
//! Pipeline: [`lexer`] and [`parser`] build an [`ast::Ast`]; the
//! [`passes`] rewrite and annotate it; [`constant::ConstantPool`]
//! collects literals; [`compiler::Compiler`] lowers the tree to
//! instructions with symbolic labels; [`assembler::Assembler`] resolves
//! the labels; [`machine::Machine`] runs the result.
pub mod assembler;
pub mod ast;
pub mod attributes;
pub mod bytecode;
pub mod compiler;
pub mod constant;
pub mod error;
pub mod heap;
pub mod ids;
pub mod interpreter;
pub mod lexer;
pub mod machine;
pub mod namespace;
pub mod parser;
pub mod passes;
pub mod registry;
pub mod span;
pub mod token;
pub mod types;
pub mod value;

pub use error::Error;
pub use heap::{Heap, HeapCreateInfo};
pub use interpreter::{Interpreter, InterpreterCreateInfo, Program};
pub use machine::{Machine, MachineCreateInfo, OutputMode, RuntimeError};
pub use value::Value;

/// Compile and run `source` on a fresh machine and return the value of
/// its last expression.
pub fn evaluate(source: &str) -> Result<Value, Error> {
    Interpreter::default().evaluate(source)
}
