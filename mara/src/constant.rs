//! Literal pool built ahead of compilation.
//!
//! Slots 0 and 1 always hold `0` and `1`, which is what `false` and
//! `true` compile to. Every `Int`/`Real` literal gets its own slot in
//! tree order and a `constant` annotation pointing at it, so the
//! compiler never parses literal text itself.
use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::{AttrError, AttrValue};
use crate::span::Span;
use crate::value::Value;

pub const FALSE_INDEX: usize = 0;
pub const TRUE_INDEX: usize = 1;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConstantError {
    #[error("{span}: invalid {kind} literal `{text}`")]
    Invalid {
        kind: &'static str,
        text: String,
        span: Span,
    },
    #[error(transparent)]
    Attribute(#[from] AttrError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    values: Vec<Value>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            values: vec![Value::Int(0), Value::Int(1)],
        }
    }

    /// Scan the tree, append every numeric literal and annotate it.
    pub fn build(ast: &mut Ast) -> Result<Self, ConstantError> {
        let mut pool = Self::new();
        let root = ast.root();
        pool.visit(ast, root)?;
        log::debug!("constant pool holds {} values", pool.len());
        Ok(pool)
    }

    pub fn push(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn visit(&mut self, ast: &mut Ast, id: NodeId) -> Result<(), ConstantError> {
        let span = ast.span(id);
        let index = match ast.kind(id) {
            NodeKind::Int(text) => Some(self.push(parse_int(text, span)?)),
            NodeKind::Real(text) => Some(self.push(parse_real(text, span)?)),
            NodeKind::Bool(text) if text == "true" => Some(TRUE_INDEX),
            NodeKind::Bool(_) => Some(FALSE_INDEX),
            _ => None,
        };
        if let Some(index) = index {
            ast.attrs_mut(id).set(AttrValue::Constant(index))?;
        }
        for child in ast.kind(id).children() {
            self.visit(ast, child)?;
        }
        Ok(())
    }
}

fn invalid(kind: &'static str, text: &str, span: Span) -> ConstantError {
    ConstantError::Invalid {
        kind,
        text: text.to_string(),
        span,
    }
}

pub fn parse_int(text: &str, span: Span) -> Result<Value, ConstantError> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    }
    .map_err(|_| invalid("integer", text, span))?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| invalid("integer", text, span))
}

pub fn parse_real(text: &str, span: Span) -> Result<Value, ConstantError> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    cleaned
        .parse::<f64>()
        .map(Value::Real)
        .map_err(|_| invalid("real", text, span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UniqueIds;
    use crate::parser::Parser;

    fn build(source: &str) -> (Ast, ConstantPool) {
        let mut ids = UniqueIds::new();
        let mut ast = Parser::new(source).parse(&mut ids).unwrap();
        let pool = ConstantPool::build(&mut ast).unwrap();
        (ast, pool)
    }

    #[test]
    fn starts_with_false_and_true() {
        let pool = ConstantPool::new();
        assert_eq!(pool.values(), &[Value::Int(0), Value::Int(1)]);
    }

    #[test]
    fn literals_are_appended_in_tree_order() {
        let (ast, pool) = build("5 + 2.5 * 0x10");
        assert_eq!(
            pool.values(),
            &[
                Value::Int(0),
                Value::Int(1),
                Value::Int(5),
                Value::Real(2.5),
                Value::Int(16),
            ]
        );
        let annotated: Vec<usize> = (0..ast.len())
            .filter_map(|i| ast.attrs(NodeId::new(i)).constant())
            .collect();
        assert_eq!(annotated, vec![2, 3, 4]);
    }

    #[test]
    fn booleans_share_the_seed_slots() {
        let (ast, pool) = build("true == false");
        assert_eq!(pool.len(), 2);
        let indices: Vec<usize> = (0..ast.len())
            .filter_map(|i| ast.attrs(NodeId::new(i)).constant())
            .collect();
        assert_eq!(indices, vec![TRUE_INDEX, FALSE_INDEX]);
    }

    #[test]
    fn literal_forms() {
        let span = Span::default();
        assert_eq!(parse_int("1_000", span), Ok(Value::Int(1000)));
        assert_eq!(parse_int("-0xff", span), Ok(Value::Int(-255)));
        assert_eq!(
            parse_int("-9223372036854775808", span),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(parse_real("1.5e3", span), Ok(Value::Real(1500.0)));
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        let mut ids = UniqueIds::new();
        let mut ast = Parser::new("99999999999999999999")
            .parse(&mut ids)
            .unwrap();
        let err = ConstantPool::build(&mut ast).unwrap_err();
        assert!(matches!(err, ConstantError::Invalid { kind: "integer", .. }));
    }
}
