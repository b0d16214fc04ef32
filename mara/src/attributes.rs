//! Per-node annotations written by the passes.
//!
//! Every key may be written once. A pass that expects to meet a value it
//! (or another pass) already stored uses [`Attributes::set_soft`], which
//! succeeds only when the values agree; [`Attributes::set_hard`] is the
//! explicit override. A plain [`Attributes::set`] on an occupied key is
//! an error, never a silent overwrite.
use std::collections::HashMap;
use std::fmt;

use crate::ast::NodeId;
use crate::namespace::NamespaceId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    Namespace,
    Locals,
    Index,
    Address,
    Constant,
    Type,
    /// Declaration a reference or assignment resolves to.
    Binding,
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrKey::Namespace => "namespace",
            AttrKey::Locals => "locals",
            AttrKey::Index => "index",
            AttrKey::Address => "address",
            AttrKey::Constant => "constant",
            AttrKey::Type => "type",
            AttrKey::Binding => "binding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Namespace(NamespaceId),
    Locals(Locals),
    Index(usize),
    /// Label of a function's entry point, resolved by the assembler.
    Address(String),
    Constant(usize),
    Type(Type),
    Binding(NodeId),
}

impl AttrValue {
    pub fn key(&self) -> AttrKey {
        match self {
            AttrValue::Namespace(_) => AttrKey::Namespace,
            AttrValue::Locals(_) => AttrKey::Locals,
            AttrValue::Index(_) => AttrKey::Index,
            AttrValue::Address(_) => AttrKey::Address,
            AttrValue::Constant(_) => AttrKey::Constant,
            AttrValue::Type(_) => AttrKey::Type,
            AttrValue::Binding(_) => AttrKey::Binding,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AttrError {
    #[error("attribute `{0}` is already set")]
    AlreadySet(AttrKey),
    #[error("attribute `{0}` is already set to a different value")]
    Conflict(AttrKey),
}

/// Slot table of one function: qualified name to declaring node, in slot
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals {
    slots: Vec<(String, NodeId)>,
}

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot and return its index.
    pub fn insert(&mut self, qualified: String, node: NodeId) -> usize {
        self.slots.push((qualified, node));
        self.slots.len() - 1
    }

    pub fn index_of(&self, qualified: &str) -> Option<usize> {
        self.slots.iter().position(|(name, _)| name == qualified)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.slots.iter().any(|&(_, n)| n == node)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.slots.iter().map(|(name, node)| (name.as_str(), *node))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: HashMap<AttrKey, AttrValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a value. Fails if the key is already present.
    pub fn set(&mut self, value: AttrValue) -> Result<(), AttrError> {
        let key = value.key();
        if self.values.contains_key(&key) {
            return Err(AttrError::AlreadySet(key));
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Declare a value, or confirm that the present one is equal.
    pub fn set_soft(&mut self, value: AttrValue) -> Result<(), AttrError> {
        let key = value.key();
        match self.values.get(&key) {
            Some(existing) if *existing != value => {
                Err(AttrError::Conflict(key))
            }
            Some(_) => Ok(()),
            None => {
                self.values.insert(key, value);
                Ok(())
            }
        }
    }

    /// Overwrite unconditionally. Returns the previous value.
    pub fn set_hard(&mut self, value: AttrValue) -> Option<AttrValue> {
        self.values.insert(value.key(), value)
    }

    pub fn get(&self, key: AttrKey) -> Option<&AttrValue> {
        self.values.get(&key)
    }

    pub fn contains(&self, key: AttrKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    // ── typed accessors ────────────────────────────────────────────

    pub fn namespace(&self) -> Option<NamespaceId> {
        match self.values.get(&AttrKey::Namespace) {
            Some(AttrValue::Namespace(ns)) => Some(*ns),
            _ => None,
        }
    }

    pub fn locals(&self) -> Option<&Locals> {
        match self.values.get(&AttrKey::Locals) {
            Some(AttrValue::Locals(locals)) => Some(locals),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self.values.get(&AttrKey::Index) {
            Some(AttrValue::Index(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self.values.get(&AttrKey::Address) {
            Some(AttrValue::Address(label)) => Some(label),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<usize> {
        match self.values.get(&AttrKey::Constant) {
            Some(AttrValue::Constant(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn ty(&self) -> Option<&Type> {
        match self.values.get(&AttrKey::Type) {
            Some(AttrValue::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn binding(&self) -> Option<NodeId> {
        match self.values.get(&AttrKey::Binding) {
            Some(AttrValue::Binding(decl)) => Some(*decl),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_write_once() {
        let mut attrs = Attributes::new();
        attrs.set(AttrValue::Index(3)).unwrap();
        assert_eq!(
            attrs.set(AttrValue::Index(3)),
            Err(AttrError::AlreadySet(AttrKey::Index))
        );
        assert_eq!(attrs.index(), Some(3));
    }

    #[test]
    fn soft_set_accepts_equal_values_only() {
        let mut attrs = Attributes::new();
        attrs.set_soft(AttrValue::Constant(1)).unwrap();
        attrs.set_soft(AttrValue::Constant(1)).unwrap();
        assert_eq!(
            attrs.set_soft(AttrValue::Constant(2)),
            Err(AttrError::Conflict(AttrKey::Constant))
        );
        assert_eq!(attrs.constant(), Some(1));
    }

    #[test]
    fn hard_set_overwrites() {
        let mut attrs = Attributes::new();
        attrs.set(AttrValue::Type(Type::Int)).unwrap();
        let old = attrs.set_hard(AttrValue::Type(Type::Real));
        assert_eq!(old, Some(AttrValue::Type(Type::Int)));
        assert_eq!(attrs.ty(), Some(&Type::Real));
    }

    #[test]
    fn keys_are_independent() {
        let mut attrs = Attributes::new();
        attrs.set(AttrValue::Index(0)).unwrap();
        attrs.set(AttrValue::Address("f_0".into())).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.address(), Some("f_0"));
        assert_eq!(attrs.binding(), None);
    }

    #[test]
    fn locals_keep_slot_order() {
        let mut locals = Locals::new();
        assert_eq!(locals.insert("ns1.x".into(), NodeId::new(4)), 0);
        assert_eq!(locals.insert("ns1.y".into(), NodeId::new(7)), 1);
        assert_eq!(locals.index_of("ns1.y"), Some(1));
        assert!(locals.contains_node(NodeId::new(4)));
        assert!(!locals.contains_node(NodeId::new(5)));
    }
}
