use std::collections::HashMap;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::{AttrKey, AttrValue};
use crate::span::Span;
use crate::types::Type;

use super::{Pass, PassError};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("{span}: {message}")]
pub struct TypeError {
    pub message: String,
    pub span: Span,
}

/// Bottom-up type inference with checks against declared types.
///
/// Every node receives a `type` annotation. Untyped parameters and
/// anything the checker cannot see through are `Any`. Only run when
/// requested; the machine itself is untyped.
#[derive(Debug, Default)]
pub struct TypeCheck {
    /// Function types known before their bodies are checked, so that
    /// recursive calls see the declared signature.
    signatures: HashMap<NodeId, Type>,
}

fn error(message: String, span: Span) -> PassError {
    PassError::Type(TypeError { message, span })
}

fn declared(name: Option<&str>, span: Span) -> Result<Option<Type>, PassError> {
    match name {
        None => Ok(None),
        Some(name) => Type::from_name(name)
            .map(Some)
            .ok_or_else(|| error(format!("unknown type `{name}`"), span)),
    }
}

fn binop_type(
    op: &str,
    left: &Type,
    right: &Type,
    span: Span,
) -> Result<Type, PassError> {
    match op {
        "+" | "-" | "*" | "/" | "%" | "<" | "<=" | ">" | ">=" => {
            if !left.is_numeric() || !right.is_numeric() {
                return Err(error(
                    format!(
                        "operator `{op}` expects numbers, found {left} and {right}"
                    ),
                    span,
                ));
            }
            if matches!(op, "<" | "<=" | ">" | ">=") {
                return Ok(Type::Bool);
            }
            Ok(match (left, right) {
                (Type::Int, Type::Int) => Type::Int,
                (Type::Any, _) | (_, Type::Any) => Type::Any,
                _ => Type::Real,
            })
        }
        "==" | "!=" => {
            let numbers = left.is_numeric() && right.is_numeric();
            if !numbers && !left.compatible(right) {
                return Err(error(
                    format!("cannot compare {left} with {right}"),
                    span,
                ));
            }
            Ok(Type::Bool)
        }
        _ => Ok(Type::Any),
    }
}

impl TypeCheck {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, ast: &Ast, id: NodeId) -> Result<NodeId, PassError> {
        ast.attrs(id).binding().ok_or_else(|| PassError::Missing {
            key: AttrKey::Binding,
            node: ast.kind(id).name(),
            span: ast.span(id),
        })
    }

    fn binding_type(&self, ast: &Ast, decl: NodeId) -> Type {
        ast.attrs(decl)
            .ty()
            .or_else(|| self.signatures.get(&decl))
            .cloned()
            .unwrap_or(Type::Any)
    }

    fn predicate(
        &mut self,
        ast: &mut Ast,
        pred: NodeId,
    ) -> Result<(), PassError> {
        let ty = self.visit(ast, pred)?;
        if ty.is_numeric() || ty == Type::Bool {
            return Ok(());
        }
        Err(error(
            format!("condition must be Bool or a number, found {ty}"),
            ast.span(pred),
        ))
    }

    fn visit(&mut self, ast: &mut Ast, id: NodeId) -> Result<Type, PassError> {
        let span = ast.span(id);
        let ty = match ast.kind(id).clone() {
            NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } => {
                let mut last = Type::Unit;
                for expr in exprs {
                    let ty = self.visit(ast, expr)?;
                    if !matches!(ast.kind(expr), NodeKind::NoOp) {
                        last = ty;
                    }
                }
                last
            }
            NodeKind::Def {
                name,
                params,
                body,
                return_type,
            } => {
                let mut param_types = Vec::with_capacity(params.len());
                for param in params {
                    param_types.push(self.visit(ast, param)?);
                }
                let ret = declared(return_type.as_deref(), span)?;
                self.signatures.insert(
                    id,
                    Type::Function {
                        params: param_types.clone(),
                        ret: Box::new(ret.clone().unwrap_or(Type::Any)),
                    },
                );
                let body_type = self.visit(ast, body)?;
                if let Some(ret) = &ret {
                    if !ret.compatible(&body_type) {
                        return Err(error(
                            format!(
                                "`{name}` is declared to return {ret} \
                                 but its body has type {body_type}"
                            ),
                            span,
                        ));
                    }
                }
                Type::Function {
                    params: param_types,
                    ret: Box::new(ret.unwrap_or(body_type)),
                }
            }
            NodeKind::Param { ty, .. } => {
                declared(ty.as_deref(), span)?.unwrap_or(Type::Any)
            }
            NodeKind::Val { name, value, ty }
            | NodeKind::Var { name, value, ty } => {
                let value_type = self.visit(ast, value)?;
                let uninitialised = matches!(ast.kind(value), NodeKind::Unit);
                if !uninitialised && value_type == Type::Unit {
                    return Err(error(
                        format!("cannot bind a Unit value to `{name}`"),
                        span,
                    ));
                }
                match declared(ty.as_deref(), span)? {
                    Some(declared) => {
                        if !uninitialised && !declared.compatible(&value_type)
                        {
                            return Err(error(
                                format!(
                                    "`{name}` is declared {declared} \
                                     but initialised with {value_type}"
                                ),
                                span,
                            ));
                        }
                        declared
                    }
                    None if uninitialised => Type::Any,
                    None => value_type,
                }
            }
            NodeKind::Assign { name, value } => {
                let value_type = self.visit(ast, value)?;
                if value_type == Type::Unit {
                    return Err(error(
                        format!("cannot assign a Unit value to `{name}`"),
                        span,
                    ));
                }
                let decl = self.resolve(ast, id)?;
                let target = self.binding_type(ast, decl);
                if !target.compatible(&value_type) {
                    return Err(error(
                        format!(
                            "cannot assign {value_type} to `{name}` of type {target}"
                        ),
                        span,
                    ));
                }
                value_type
            }
            NodeKind::If {
                pred,
                if_body,
                else_body,
            } => {
                self.predicate(ast, pred)?;
                let then = self.visit(ast, if_body)?;
                let otherwise = self.visit(ast, else_body)?;
                then.join(&otherwise)
            }
            NodeKind::Else { body } => self.visit(ast, body)?,
            NodeKind::While { pred, body } => {
                self.predicate(ast, pred)?;
                self.visit(ast, body)?;
                Type::Unit
            }
            NodeKind::BinOp { op, args } => {
                let left = self.visit(ast, args[0])?;
                let right = self.visit(ast, args[1])?;
                binop_type(&op, &left, &right, span)?
            }
            NodeKind::Call { func, args, block } => {
                let callee = self.visit(ast, func)?;
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    arg_types.push(self.visit(ast, arg)?);
                }
                if let Some(block) = block {
                    self.visit(ast, block)?;
                }
                match callee {
                    Type::Function { params, ret } => {
                        if params.len() != arg_types.len() {
                            return Err(error(
                                format!(
                                    "expected {} arguments, found {}",
                                    params.len(),
                                    arg_types.len()
                                ),
                                span,
                            ));
                        }
                        for (param, arg) in params.iter().zip(&arg_types) {
                            if !param.compatible(arg) {
                                return Err(error(
                                    format!("expected {param} argument, found {arg}"),
                                    span,
                                ));
                            }
                        }
                        *ret
                    }
                    Type::Any => Type::Any,
                    other => {
                        return Err(error(
                            format!("value of type {other} is not callable"),
                            span,
                        ));
                    }
                }
            }
            NodeKind::Int(_) => Type::Int,
            NodeKind::Real(_) => Type::Real,
            NodeKind::Bool(_) => Type::Bool,
            NodeKind::ValueId(_) => {
                let decl = self.resolve(ast, id)?;
                self.binding_type(ast, decl)
            }
            NodeKind::TypeId(_) | NodeKind::SymbolId(_) => Type::Any,
            NodeKind::Tuple(values) => {
                let mut types = Vec::with_capacity(values.len());
                for value in values {
                    types.push(self.visit(ast, value)?);
                }
                Type::Tuple(types)
            }
            NodeKind::List(values) => {
                let mut element: Option<Type> = None;
                for value in values {
                    let ty = self.visit(ast, value)?;
                    match &element {
                        Some(seen) if !seen.compatible(&ty) => {
                            return Err(error(
                                format!(
                                    "list elements must share a type, found {seen} and {ty}"
                                ),
                                span,
                            ));
                        }
                        Some(_) => {}
                        None => element = Some(ty),
                    }
                }
                Type::List(Box::new(element.unwrap_or(Type::Any)))
            }
            NodeKind::Unit | NodeKind::NoOp => Type::Unit,
        };
        ast.attrs_mut(id).set(AttrValue::Type(ty.clone()))?;
        Ok(ty)
    }
}

impl Pass for TypeCheck {
    fn name(&self) -> &'static str {
        "type-check"
    }

    fn run(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        let root = ast.root();
        let ty = self.visit(ast, root)?;
        log::debug!("module type: {ty}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_support::{find, parse};
    use crate::passes::{CollectLocals, CollectNames, JoinElse, ModuleFunction};

    fn check(source: &str) -> Result<Ast, PassError> {
        let mut ast = parse(source);
        JoinElse::new().run(&mut ast)?;
        ModuleFunction::new().run(&mut ast)?;
        CollectNames::new().run(&mut ast)?;
        CollectLocals::new().run(&mut ast)?;
        TypeCheck::new().run(&mut ast)?;
        Ok(ast)
    }

    fn message(source: &str) -> String {
        match check(source) {
            Err(PassError::Type(err)) => err.message,
            other => panic!("expected a type error, got {other:?}"),
        }
    }

    #[test]
    fn literals_and_arithmetic() {
        let ast = check("1 + 2.5").unwrap();
        let sum = find(&ast, |k| matches!(k, NodeKind::BinOp { .. }));
        assert_eq!(ast.attrs(sum).ty(), Some(&Type::Real));
        assert_eq!(ast.attrs(ast.root()).ty(), Some(&Type::Real));
    }

    #[test]
    fn every_reachable_node_is_typed() {
        let ast = check("val x = 1\nif x > 0 { x } else { 2 }").unwrap();
        let root = ast.root();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            assert!(ast.attrs(id).ty().is_some(), "{}", ast.kind(id).name());
            stack.extend(ast.kind(id).children());
        }
    }

    #[test]
    fn declared_type_mismatch() {
        assert_eq!(
            message("val x Int = 1.5"),
            "`x` is declared Int but initialised with Real"
        );
    }

    #[test]
    fn unit_cannot_be_bound_or_assigned() {
        assert_eq!(
            message("val w = while 0 { 1 }"),
            "cannot bind a Unit value to `w`"
        );
        assert_eq!(
            message("var x = 1\nx = ()"),
            "cannot assign a Unit value to `x`"
        );
    }

    #[test]
    fn uninitialised_val_takes_declared_type() {
        let ast = check("val z Int\nz = 30\nz").unwrap();
        let z = find(&ast, |k| matches!(k, NodeKind::Val { .. }));
        assert_eq!(ast.attrs(z).ty(), Some(&Type::Int));
        assert_eq!(
            message("val z Int\nz = 3.0"),
            "cannot assign Real to `z` of type Int"
        );
    }

    #[test]
    fn function_signatures() {
        let ast = check("def add(x Int, y Int) Int { x + y }\nadd(1, 2)").unwrap();
        assert_eq!(ast.attrs(ast.root()).ty(), Some(&Type::Int));
        assert_eq!(
            message("def add(x Int, y Int) Int { x + y }\nadd(1, 2.0)"),
            "expected Int argument, found Real"
        );
        assert_eq!(
            message("def add(x, y) { x + y }\nadd(1)"),
            "expected 2 arguments, found 1"
        );
        assert_eq!(
            message("def f() Int { 1.5 }"),
            "`f` is declared to return Int but its body has type Real"
        );
    }

    #[test]
    fn recursion_uses_declared_signature() {
        let source = "def fib(n Int) Int {\n\
                      if n < 2 { 1 } else { fib(n - 1) + fib(n - 2) }\n\
                      }\nfib(4)";
        let ast = check(source).unwrap();
        assert_eq!(ast.attrs(ast.root()).ty(), Some(&Type::Int));
    }

    #[test]
    fn bool_is_not_a_number() {
        assert_eq!(
            message("true + 1"),
            "operator `+` expects numbers, found Bool and Int"
        );
    }

    #[test]
    fn comparison_yields_bool() {
        let ast = check("val b Bool = 1 < 2\nb").unwrap();
        assert_eq!(ast.attrs(ast.root()).ty(), Some(&Type::Bool));
    }

    #[test]
    fn unknown_type_name() {
        assert_eq!(message("val x Foo = 1"), "unknown type `Foo`");
    }

    #[test]
    fn list_elements_must_agree() {
        assert_eq!(
            message("[1, 2.0]"),
            "list elements must share a type, found Int and Real"
        );
    }
}
