use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::AttrValue;
use crate::namespace::{NameError, NamespaceId};

use super::{Pass, PassError};

/// Build the namespace tree and annotate every node with its scope.
///
/// `Module`, `Block` and `Def` each open a child namespace and carry it
/// as their own `namespace`; every other node carries the namespace it
/// appears in. Bindings (`val`, `var`, `def`, parameters) are declared in
/// the enclosing namespace; a `def` name goes into the scope around the
/// definition so recursive and sibling calls can see it.
///
/// Every `ValueId` and `Assign` is annotated with the `binding` it
/// resolves to at the point it is written, so a use never sees a
/// declaration that comes after it. A name with no binding in sight is
/// retried once the whole tree has been walked and then must name a
/// `def`: functions may be called before their definition, values may
/// not.
#[derive(Debug, Default)]
pub struct CollectNames {
    scopes: Vec<NamespaceId>,
    deferred: Vec<(NodeId, NamespaceId, String)>,
}

impl CollectNames {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<NamespaceId> {
        self.scopes.last().copied()
    }

    fn open(&mut self, ast: &mut Ast, id: NodeId) -> Result<(), PassError> {
        let ns = ast.namespaces.create(self.current());
        ast.attrs_mut(id).set(AttrValue::Namespace(ns))?;
        self.scopes.push(ns);
        Ok(())
    }

    /// Annotate `id` with the active namespace and return it.
    fn enter(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
    ) -> Result<NamespaceId, PassError> {
        let Some(ns) = self.current() else {
            return Err(PassError::Shape {
                message: format!(
                    "{} node outside of any module",
                    ast.kind(id).name()
                ),
                span: ast.span(id),
            });
        };
        ast.attrs_mut(id).set(AttrValue::Namespace(ns))?;
        Ok(ns)
    }

    fn declare(
        &mut self,
        ast: &mut Ast,
        ns: NamespaceId,
        name: &str,
        id: NodeId,
    ) -> Result<(), PassError> {
        let span = ast.span(id);
        ast.namespaces.declare(ns, name, id, span)?;
        Ok(())
    }

    fn bind(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        ns: NamespaceId,
        name: String,
    ) -> Result<(), PassError> {
        match ast.namespaces.resolve(ns, &name) {
            Some((_, decl)) => ast.attrs_mut(id).set(AttrValue::Binding(decl))?,
            None => self.deferred.push((id, ns, name)),
        }
        Ok(())
    }

    fn bind_deferred(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        for (id, ns, name) in std::mem::take(&mut self.deferred) {
            let span = ast.span(id);
            let decl = ast.namespaces.lookup(ns, &name, span)?;
            if !matches!(ast.kind(decl), NodeKind::Def { .. }) {
                return Err(NameError::Unresolved { name, span }.into());
            }
            ast.attrs_mut(id).set(AttrValue::Binding(decl))?;
        }
        Ok(())
    }

    fn visit(&mut self, ast: &mut Ast, id: NodeId) -> Result<(), PassError> {
        match ast.kind(id).clone() {
            NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } => {
                self.open(ast, id)?;
                for expr in exprs {
                    self.visit(ast, expr)?;
                }
                self.scopes.pop();
            }
            NodeKind::Def {
                name, params, body, ..
            } => {
                if let Some(outer) = self.current() {
                    self.declare(ast, outer, &name, id)?;
                }
                self.open(ast, id)?;
                for param in params {
                    self.visit(ast, param)?;
                }
                self.visit(ast, body)?;
                self.scopes.pop();
            }
            NodeKind::Param { name, .. } => {
                let ns = self.enter(ast, id)?;
                self.declare(ast, ns, &name, id)?;
            }
            NodeKind::Val { name, value, .. }
            | NodeKind::Var { name, value, .. } => {
                let ns = self.enter(ast, id)?;
                self.visit(ast, value)?;
                self.declare(ast, ns, &name, id)?;
            }
            NodeKind::Assign { name, value } => {
                let ns = self.enter(ast, id)?;
                self.bind(ast, id, ns, name)?;
                self.visit(ast, value)?;
            }
            NodeKind::ValueId(name) => {
                let ns = self.enter(ast, id)?;
                self.bind(ast, id, ns, name)?;
            }
            kind => {
                self.enter(ast, id)?;
                for child in kind.children() {
                    self.visit(ast, child)?;
                }
            }
        }
        Ok(())
    }
}

impl Pass for CollectNames {
    fn name(&self) -> &'static str {
        "collect-names"
    }

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        let root = ast.root();
        self.visit(ast, root)?;
        self.bind_deferred(ast)?;
        log::debug!("collected {} namespaces", ast.namespaces.len());
        Ok(())
    }
}
