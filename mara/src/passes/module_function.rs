use crate::ast::{Ast, NodeKind};

use super::{Pass, PassError};

/// Wrap a module's statements in a zero-argument function named after the
/// module and replace the body with that definition plus a call to it.
///
/// `module m; a; b; end` becomes `module m; def m() { a; b }; m(); end`,
/// so the compiler lowers module code exactly like a function body.
#[derive(Debug, Default)]
pub struct ModuleFunction;

impl ModuleFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for ModuleFunction {
    fn name(&self) -> &'static str {
        "module-function"
    }

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        let root = ast.root();
        let span = ast.span(root);
        let NodeKind::Module { name, exprs } = ast.kind(root).clone() else {
            return Err(PassError::Shape {
                message: format!(
                    "expected a Module at the root, found {}",
                    ast.kind(root).name()
                ),
                span,
            });
        };

        let body = ast.alloc(NodeKind::Block { exprs }, span);
        let def = ast.alloc(
            NodeKind::Def {
                name: name.clone(),
                params: Vec::new(),
                body,
                return_type: None,
            },
            span,
        );
        let func = ast.alloc(NodeKind::ValueId(name), span);
        let call = ast.alloc(
            NodeKind::Call {
                func,
                args: Vec::new(),
                block: None,
            },
            span,
        );

        if let NodeKind::Module { exprs, .. } = &mut ast[root].kind {
            *exprs = vec![def, call];
        }
        Ok(())
    }
}
