//! Syntax tree.
//!
//! Nodes live in an arena ([`Ast`]) and refer to each other by
//! [`NodeId`]. Passes rewrite the tree in place and record their results
//! in each node's [`Attributes`].
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use crate::attributes::Attributes;
use crate::namespace::Namespaces;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Module {
        name: String,
        exprs: Vec<NodeId>,
    },
    Block {
        exprs: Vec<NodeId>,
    },
    Def {
        name: String,
        params: Vec<NodeId>,
        body: NodeId,
        return_type: Option<String>,
    },
    Param {
        name: String,
        ty: Option<String>,
    },
    /// Immutable binding.
    Val {
        name: String,
        value: NodeId,
        ty: Option<String>,
    },
    /// Mutable binding.
    Var {
        name: String,
        value: NodeId,
        ty: Option<String>,
    },
    Assign {
        name: String,
        value: NodeId,
    },
    /// `else_body` is a `Unit` node when the source has no `else`.
    If {
        pred: NodeId,
        if_body: NodeId,
        else_body: NodeId,
    },
    /// An `else` that started its own statement; merged by `JoinElse`.
    Else {
        body: NodeId,
    },
    While {
        pred: NodeId,
        body: NodeId,
    },
    BinOp {
        op: String,
        args: [NodeId; 2],
    },
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        block: Option<NodeId>,
    },
    Int(String),
    Real(String),
    Bool(String),
    ValueId(String),
    TypeId(String),
    SymbolId(String),
    Tuple(Vec<NodeId>),
    List(Vec<NodeId>),
    Unit,
    NoOp,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Module { .. } => "Module",
            NodeKind::Block { .. } => "Block",
            NodeKind::Def { .. } => "Def",
            NodeKind::Param { .. } => "Param",
            NodeKind::Val { .. } => "Val",
            NodeKind::Var { .. } => "Var",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::If { .. } => "If",
            NodeKind::Else { .. } => "Else",
            NodeKind::While { .. } => "While",
            NodeKind::BinOp { .. } => "BinOp",
            NodeKind::Call { .. } => "Call",
            NodeKind::Int(_) => "Int",
            NodeKind::Real(_) => "Real",
            NodeKind::Bool(_) => "Bool",
            NodeKind::ValueId(_) => "ValueId",
            NodeKind::TypeId(_) => "TypeId",
            NodeKind::SymbolId(_) => "SymbolId",
            NodeKind::Tuple(_) => "Tuple",
            NodeKind::List(_) => "List",
            NodeKind::Unit => "Unit",
            NodeKind::NoOp => "NoOp",
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } => {
                exprs.clone()
            }
            NodeKind::Def { params, body, .. } => {
                let mut out = params.clone();
                out.push(*body);
                out
            }
            NodeKind::Val { value, .. }
            | NodeKind::Var { value, .. }
            | NodeKind::Assign { value, .. } => vec![*value],
            NodeKind::If {
                pred,
                if_body,
                else_body,
            } => vec![*pred, *if_body, *else_body],
            NodeKind::Else { body } => vec![*body],
            NodeKind::While { pred, body } => vec![*pred, *body],
            NodeKind::BinOp { args, .. } => args.to_vec(),
            NodeKind::Call { func, args, block } => {
                let mut out = vec![*func];
                out.extend(args);
                out.extend(block);
                out
            }
            NodeKind::Tuple(values) | NodeKind::List(values) => values.clone(),
            NodeKind::Param { .. }
            | NodeKind::Int(_)
            | NodeKind::Real(_)
            | NodeKind::Bool(_)
            | NodeKind::ValueId(_)
            | NodeKind::TypeId(_)
            | NodeKind::SymbolId(_)
            | NodeKind::Unit
            | NodeKind::NoOp => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub attrs: Attributes,
}

/// Arena of nodes plus the namespaces created over them.
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    pub namespaces: Namespaces,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    /// An empty arena whose root is a `Unit` placeholder.
    pub fn new() -> Self {
        let mut ast = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            namespaces: Namespaces::new(),
        };
        ast.root = ast.alloc(NodeKind::Unit, Span::default());
        ast
    }

    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            span,
            attrs: Attributes::new(),
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0].span
    }

    pub fn attrs(&self, id: NodeId) -> &Attributes {
        &self.nodes[id.0].attrs
    }

    pub fn attrs_mut(&mut self, id: NodeId) -> &mut Attributes {
        &mut self.nodes[id.0].attrs
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compact s-expression form, used in diagnostics and tests.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_list(&self, ids: &[NodeId], out: &mut String) {
        for &id in ids {
            out.push(' ');
            self.render_into(id, out);
        }
    }

    fn render_into(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Module { name, exprs } => {
                let _ = write!(out, "(module {name}");
                self.render_list(exprs, out);
                out.push(')');
            }
            NodeKind::Block { exprs } => {
                out.push_str("(block");
                self.render_list(exprs, out);
                out.push(')');
            }
            NodeKind::Def {
                name,
                params,
                body,
                return_type,
            } => {
                let _ = write!(out, "(def {name} (");
                for (i, &param) in params.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.render_into(param, out);
                }
                out.push(')');
                if let Some(ty) = return_type {
                    let _ = write!(out, " {ty}");
                }
                out.push(' ');
                self.render_into(*body, out);
                out.push(')');
            }
            NodeKind::Param { name, ty } => match ty {
                Some(ty) => {
                    let _ = write!(out, "{name}:{ty}");
                }
                None => out.push_str(name),
            },
            NodeKind::Val { name, value, ty }
            | NodeKind::Var { name, value, ty } => {
                let word = if matches!(self.kind(id), NodeKind::Val { .. }) {
                    "val"
                } else {
                    "var"
                };
                let _ = write!(out, "({word} {name}");
                if let Some(ty) = ty {
                    let _ = write!(out, ":{ty}");
                }
                out.push(' ');
                self.render_into(*value, out);
                out.push(')');
            }
            NodeKind::Assign { name, value } => {
                let _ = write!(out, "(= {name} ");
                self.render_into(*value, out);
                out.push(')');
            }
            NodeKind::If {
                pred,
                if_body,
                else_body,
            } => {
                out.push_str("(if");
                self.render_list(&[*pred, *if_body, *else_body], out);
                out.push(')');
            }
            NodeKind::Else { body } => {
                out.push_str("(else ");
                self.render_into(*body, out);
                out.push(')');
            }
            NodeKind::While { pred, body } => {
                out.push_str("(while");
                self.render_list(&[*pred, *body], out);
                out.push(')');
            }
            NodeKind::BinOp { op, args } => {
                let _ = write!(out, "({op}");
                self.render_list(args, out);
                out.push(')');
            }
            NodeKind::Call { func, args, block } => {
                out.push_str("(call ");
                self.render_into(*func, out);
                self.render_list(args, out);
                if let Some(block) = block {
                    out.push_str(" &");
                    self.render_into(*block, out);
                }
                out.push(')');
            }
            NodeKind::Int(text)
            | NodeKind::Real(text)
            | NodeKind::Bool(text)
            | NodeKind::ValueId(text)
            | NodeKind::TypeId(text)
            | NodeKind::SymbolId(text) => out.push_str(text),
            NodeKind::Tuple(values) => {
                out.push_str("(tuple");
                self.render_list(values, out);
                out.push(')');
            }
            NodeKind::List(values) => {
                out.push_str("(list");
                self.render_list(values, out);
                out.push(')');
            }
            NodeKind::Unit => out.push_str("()"),
            NodeKind::NoOp => out.push_str("noop"),
        }
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}
