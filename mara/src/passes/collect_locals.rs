use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::{AttrKey, AttrValue, Locals};

use super::{Pass, PassError};

/// Assign frame slots to parameters and local bindings.
///
/// Every `Def` (and the `Module`) owns one slot table. Parameters come
/// first, in order, so slot `i` of a function is its `i`-th argument;
/// `val`/`var` bindings follow in source order, including those inside
/// nested blocks. A nested `Def` starts its own table. Each binding gets
/// an `index` annotation and each owner a `locals` annotation. Must run
/// after [`CollectNames`](super::CollectNames).
#[derive(Debug, Default)]
pub struct CollectLocals {
    tables: Vec<Locals>,
}

impl CollectLocals {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        name: &str,
    ) -> Result<(), PassError> {
        let Some(ns) = ast.attrs(id).namespace() else {
            return Err(PassError::Missing {
                key: AttrKey::Namespace,
                node: ast.kind(id).name(),
                span: ast.span(id),
            });
        };
        let qualified = ast.namespaces.qualify(ns, name);
        let Some(table) = self.tables.last_mut() else {
            return Err(PassError::Shape {
                message: format!("binding `{name}` outside of any function"),
                span: ast.span(id),
            });
        };
        let index = table.insert(qualified, id);
        ast.attrs_mut(id).set(AttrValue::Index(index))?;
        Ok(())
    }

    fn owner(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        children: Vec<NodeId>,
    ) -> Result<(), PassError> {
        self.tables.push(Locals::new());
        for child in children {
            self.visit(ast, child)?;
        }
        let locals = self.tables.pop().unwrap_or_default();
        log::trace!(
            "{} `{}` uses {} slots",
            ast.kind(id).name(),
            owner_name(ast.kind(id)),
            locals.len()
        );
        ast.attrs_mut(id).set(AttrValue::Locals(locals))?;
        Ok(())
    }

    fn visit(&mut self, ast: &mut Ast, id: NodeId) -> Result<(), PassError> {
        match ast.kind(id).clone() {
            kind @ (NodeKind::Module { .. } | NodeKind::Def { .. }) => {
                self.owner(ast, id, kind.children())?;
            }
            NodeKind::Param { name, .. } => self.bind(ast, id, &name)?,
            NodeKind::Val { name, value, .. }
            | NodeKind::Var { name, value, .. } => {
                self.bind(ast, id, &name)?;
                self.visit(ast, value)?;
            }
            kind => {
                for child in kind.children() {
                    self.visit(ast, child)?;
                }
            }
        }
        Ok(())
    }
}

fn owner_name(kind: &NodeKind) -> &str {
    match kind {
        NodeKind::Module { name, .. } | NodeKind::Def { name, .. } => name,
        _ => "",
    }
}

impl Pass for CollectLocals {
    fn name(&self) -> &'static str {
        "collect-locals"
    }

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        let root = ast.root();
        self.visit(ast, root)
    }
}
