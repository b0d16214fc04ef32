use crate::assembler::AssembleError;
use crate::compiler::CompileError;
use crate::constant::ConstantError;
use crate::machine::RuntimeError;
use crate::parser::ParseError;
use crate::passes::PassError;

/// Any failure of one evaluation, tagged by the stage that produced it.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Pass(#[from] PassError),
    #[error("constant error: {0}")]
    Constant(#[from] ConstantError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("assemble error: {0}")]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
