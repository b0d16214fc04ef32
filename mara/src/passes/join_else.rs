use crate::ast::{Ast, NodeId, NodeKind};

use super::{Pass, PassError};

/// Attach each statement-level `Else` to the `If` right before it.
///
/// The consumed `Else` is replaced by a `NoOp` so statement lists keep
/// their length. For an `else if` chain the `Else` goes to the innermost
/// `If` that still has no else branch. An `Else` with nothing to attach
/// to is left alone for the compiler to reject.
#[derive(Debug, Default)]
pub struct JoinElse;

impl JoinElse {
    pub fn new() -> Self {
        Self
    }

    fn visit(&mut self, ast: &mut Ast, id: NodeId) {
        if let NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } =
            ast.kind(id).clone()
        {
            let joined = self.join(ast, exprs);
            match &mut ast[id].kind {
                NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } => {
                    *exprs = joined
                }
                _ => {}
            }
        }
        for child in ast.kind(id).children() {
            self.visit(ast, child);
        }
    }

    fn join(&mut self, ast: &mut Ast, exprs: Vec<NodeId>) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let NodeKind::Else { body } = *ast.kind(expr) else {
                out.push(expr);
                continue;
            };
            let previous = out
                .iter()
                .rev()
                .copied()
                .find(|&id| !matches!(ast.kind(id), NodeKind::NoOp));
            match previous.and_then(|id| open_if(ast, id)) {
                Some(target) => {
                    if let NodeKind::If { else_body, .. } = &mut ast[target].kind
                    {
                        *else_body = body;
                    }
                    let span = ast.span(expr);
                    out.push(ast.alloc(NodeKind::NoOp, span));
                }
                None => out.push(expr),
            }
        }
        out
    }
}

/// The innermost `If` of an `if .. else if ..` chain whose else branch is
/// still `Unit`.
fn open_if(ast: &Ast, mut id: NodeId) -> Option<NodeId> {
    loop {
        let NodeKind::If { else_body, .. } = ast.kind(id) else {
            return None;
        };
        match ast.kind(*else_body) {
            NodeKind::Unit => return Some(id),
            NodeKind::If { .. } => id = *else_body,
            _ => return None,
        }
    }
}

impl Pass for JoinElse {
    fn name(&self) -> &'static str {
        "join-else"
    }

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        let root = ast.root();
        self.visit(ast, root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_support::parse;

    fn joined(source: &str) -> String {
        let mut ast = parse(source);
        JoinElse::new().run(&mut ast).unwrap();
        ast.render(ast.root())
    }

    #[test]
    fn merges_else_into_preceding_if() {
        assert_eq!(
            joined("module m\nif x {\n1\n}\nelse {\n2\n}\nend"),
            "(module m (if x (block 1) (block 2)) noop)"
        );
    }

    #[test]
    fn merges_inside_nested_blocks() {
        let source = "module m
def foo(x) {
    if x + 1 {
        5
    }
    else {
        if 0 { 10 }
        else { 20 }
    }
}
end";
        assert_eq!(
            joined(source),
            "(module m (def foo (x) (block (if (+ x 1) (block 5) \
             (block (if 0 (block 10) (block 20)) noop)) noop)))"
        );
    }

    #[test]
    fn else_if_chain_on_separate_lines() {
        assert_eq!(
            joined("module m\nif a { 1 }\nelse if b { 2 }\nelse { 3 }\nend"),
            "(module m (if a (block 1) (if b (block 2) (block 3))) noop noop)"
        );
    }

    #[test]
    fn dangling_else_is_kept() {
        assert_eq!(
            joined("module m\n1\nelse { 2 }\nend"),
            "(module m 1 (else (block 2)))"
        );
    }

    #[test]
    fn if_with_else_already_is_not_rejoined() {
        assert_eq!(
            joined("module m\nif a { 1 } else { 2 }\nelse { 3 }\nend"),
            "(module m (if a (block 1) (block 2)) (else (block 3)))"
        );
    }
}
