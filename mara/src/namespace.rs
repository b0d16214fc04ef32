//! Lexical scopes.
//!
//! A namespace maps identifiers to the node that declared them, so later
//! passes can read the `index`/`address` annotations off that node.
//! Namespaces live in an arena owned by the [`Ast`](crate::ast::Ast) and
//! outlive the pass that created them.
use std::collections::HashMap;
use std::fmt;

use crate::ast::NodeId;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(usize);

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("{span}: `{name}` is already declared in this scope")]
    Duplicate { name: String, span: Span },
    #[error("{span}: unresolved identifier `{name}`")]
    Unresolved { name: String, span: Span },
}

#[derive(Debug, Default)]
struct Namespace {
    parent: Option<NamespaceId>,
    members: HashMap<String, NodeId>,
}

#[derive(Debug, Default)]
pub struct Namespaces {
    scopes: Vec<Namespace>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace, nested in `parent` when given.
    pub fn create(&mut self, parent: Option<NamespaceId>) -> NamespaceId {
        let id = NamespaceId(self.scopes.len());
        self.scopes.push(Namespace {
            parent,
            members: HashMap::new(),
        });
        id
    }

    pub fn parent(&self, ns: NamespaceId) -> Option<NamespaceId> {
        self.scopes[ns.0].parent
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn declare(
        &mut self,
        ns: NamespaceId,
        name: &str,
        node: NodeId,
        span: Span,
    ) -> Result<(), NameError> {
        let members = &mut self.scopes[ns.0].members;
        if members.contains_key(name) {
            return Err(NameError::Duplicate {
                name: name.to_string(),
                span,
            });
        }
        members.insert(name.to_string(), node);
        Ok(())
    }

    /// Find the namespace binding `name`, walking outward from `ns`.
    pub fn resolve(
        &self,
        ns: NamespaceId,
        name: &str,
    ) -> Option<(NamespaceId, NodeId)> {
        let mut current = Some(ns);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(&node) = scope.members.get(name) {
                return Some((id, node));
            }
            current = scope.parent;
        }
        None
    }

    pub fn lookup(
        &self,
        ns: NamespaceId,
        name: &str,
        span: Span,
    ) -> Result<NodeId, NameError> {
        self.resolve(ns, name)
            .map(|(_, node)| node)
            .ok_or_else(|| NameError::Unresolved {
                name: name.to_string(),
                span,
            })
    }

    /// Name unique across the whole arena: `ns4.x`.
    pub fn qualify(&self, ns: NamespaceId, name: &str) -> String {
        format!("{ns}.{name}")
    }
}
