//! Whole-tree passes run between parsing and compilation.
//!
//! Each pass takes the [`Ast`] by `&mut`, rewrites nodes or records
//! annotations, and leaves the tree shape valid for the next one. The
//! default order is [`JoinElse`], [`ModuleFunction`], [`CollectNames`],
//! [`CollectLocals`], then optionally [`TypeCheck`].
mod collect_locals;
mod collect_names;
mod join_else;
mod module_function;
mod type_check;

pub use collect_locals::CollectLocals;
pub use collect_names::CollectNames;
pub use join_else::JoinElse;
pub use module_function::ModuleFunction;
pub use type_check::{TypeCheck, TypeError};

use crate::ast::Ast;
use crate::attributes::{AttrError, AttrKey};
use crate::namespace::NameError;
use crate::span::Span;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PassError {
    #[error(transparent)]
    Name(#[from] NameError),
    #[error(transparent)]
    Attribute(#[from] AttrError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("{span}: {node} node is missing its `{key}` annotation")]
    Missing {
        key: AttrKey,
        node: &'static str,
        span: Span,
    },
    #[error("{span}: {message}")]
    Shape { message: String, span: Span },
}

pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError>;
}

/// Run `passes` in order, stopping at the first failure.
pub fn run_all(
    ast: &mut Ast,
    passes: &mut [&mut dyn Pass],
) -> Result<(), PassError> {
    for pass in passes.iter_mut() {
        log::debug!("running pass {}", pass.name());
        pass.run(ast)?;
    }
    Ok(())
}
