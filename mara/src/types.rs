//! Static types assigned by the optional type check.
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Real,
    Bool,
    Unit,
    /// Unknown or intentionally unconstrained; compatible with everything.
    Any,
    Tuple(Vec<Type>),
    List(Box<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    /// Resolve a type name written in source, e.g. `Int`.
    pub fn from_name(name: &str) -> Option<Type> {
        let ty = match name {
            "Int" => Type::Int,
            "Real" => Type::Real,
            "Bool" => Type::Bool,
            "Unit" => Type::Unit,
            "Any" => Type::Any,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Real | Type::Any)
    }

    pub fn compatible(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.compatible(y))
            }
            (Type::List(a), Type::List(b)) => a.compatible(b),
            (
                Type::Function { params: pa, ret: ra },
                Type::Function { params: pb, ret: rb },
            ) => {
                pa.len() == pb.len()
                    && pa.iter().zip(pb).all(|(x, y)| x.compatible(y))
                    && ra.compatible(rb)
            }
            (a, b) => a == b,
        }
    }

    /// Join of two branch types: equal types stay, anything else widens
    /// to `Any`.
    pub fn join(&self, other: &Type) -> Type {
        if self == other { self.clone() } else { Type::Any }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Real => write!(f, "Real"),
            Type::Bool => write!(f, "Bool"),
            Type::Unit => write!(f, "Unit"),
            Type::Any => write!(f, "Any"),
            Type::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Type::List(item) => write!(f, "[{item}]"),
            Type::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_is_compatible_with_everything() {
        assert!(Type::Any.compatible(&Type::Int));
        assert!(Type::Real.compatible(&Type::Any));
        assert!(!Type::Int.compatible(&Type::Real));
    }

    #[test]
    fn function_display() {
        let ty = Type::Function {
            params: vec![Type::Int, Type::Any],
            ret: Box::new(Type::Int),
        };
        assert_eq!(ty.to_string(), "(Int, Any) -> Int");
    }

    #[test]
    fn join_widens_mismatches() {
        assert_eq!(Type::Int.join(&Type::Int), Type::Int);
        assert_eq!(Type::Int.join(&Type::Unit), Type::Any);
    }
}
