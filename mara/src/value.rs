//! Runtime values and the arithmetic the machine performs on them.
use std::fmt;

/// A machine value. Heap and code addresses are plain `Int`s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    /// The "no value" result, e.g. of an `if` whose branch did not run.
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

impl CompareOp {
    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Eq => "eq",
            CompareOp::Neq => "neq",
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in `{0}`")]
    Overflow(&'static str),
    #[error("`{op}` is not defined for {left} and {right}")]
    Unsupported {
        op: &'static str,
        left: Value,
        right: Value,
    },
}

/// Integer division rounding toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder matching [`floor_div`]: takes the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

impl Value {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(i as f64),
            Value::Real(r) => Some(r),
            Value::Null => None,
        }
    }

    /// `Null` counts as zero so that an absent value is falsy.
    pub fn is_zero(self) -> bool {
        match self {
            Value::Int(i) => i == 0,
            Value::Real(r) => r == 0.0,
            Value::Null => true,
        }
    }

    pub fn arith(self, op: ArithOp, rhs: Value) -> Result<Value, ValueError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let overflow = ValueError::Overflow(op.name());
                let result = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div | ArithOp::Rem if b == 0 => {
                        return Err(ValueError::DivisionByZero);
                    }
                    ArithOp::Div => floor_div(a, b),
                    ArithOp::Rem => floor_mod(a, b),
                };
                result.map(Value::Int).ok_or(overflow)
            }
            (left, right) => {
                let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                    return Err(ValueError::Unsupported {
                        op: op.name(),
                        left,
                        right,
                    });
                };
                let result = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div | ArithOp::Rem if b == 0.0 => {
                        return Err(ValueError::DivisionByZero);
                    }
                    ArithOp::Div => (a / b).floor(),
                    ArithOp::Rem => a - b * (a / b).floor(),
                };
                Ok(Value::Real(result))
            }
        }
    }

    /// Comparison result as `1`/`0`.
    pub fn compare(self, op: CompareOp, rhs: Value) -> Result<Value, ValueError> {
        let truth = match (op, self, rhs) {
            (CompareOp::Eq, a, b) => a.loosely_equals(b),
            (CompareOp::Neq, a, b) => !a.loosely_equals(b),
            (_, Value::Int(a), Value::Int(b)) => match op {
                CompareOp::Lt => a < b,
                CompareOp::Lte => a <= b,
                CompareOp::Gt => a > b,
                _ => a >= b,
            },
            (_, left, right) => {
                let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                    return Err(ValueError::Unsupported {
                        op: op.name(),
                        left,
                        right,
                    });
                };
                match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Lte => a <= b,
                    CompareOp::Gt => a > b,
                    _ => a >= b,
                }
            }
        };
        Ok(Value::Int(truth as i64))
    }

    fn loosely_equals(self, other: Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r:?}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(-7, -2), Some(3));
        assert_eq!(floor_div(1, 0), None);
    }

    #[test]
    fn remainder_takes_divisor_sign() {
        assert_eq!(floor_mod(7, 3), Some(1));
        assert_eq!(floor_mod(-7, 3), Some(2));
        assert_eq!(floor_mod(7, -3), Some(-2));
        assert_eq!(floor_mod(-7, -3), Some(-1));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_real() {
        assert_eq!(
            Value::Int(3).arith(ArithOp::Add, Value::Real(0.5)),
            Ok(Value::Real(3.5))
        );
        assert_eq!(
            Value::Real(7.0).arith(ArithOp::Div, Value::Int(2)),
            Ok(Value::Real(3.0))
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            Value::Int(3).arith(ArithOp::Div, Value::Int(0)),
            Err(ValueError::DivisionByZero)
        );
        assert_eq!(
            Value::Int(3).arith(ArithOp::Rem, Value::Real(0.0)),
            Err(ValueError::DivisionByZero)
        );
    }

    #[test]
    fn null_is_not_a_number() {
        assert!(matches!(
            Value::Null.arith(ArithOp::Add, Value::Int(1)),
            Err(ValueError::Unsupported { op: "add", .. })
        ));
        assert!(Value::Null.is_zero());
    }

    #[test]
    fn comparisons_produce_integers() {
        assert_eq!(
            Value::Int(1).compare(CompareOp::Lt, Value::Int(2)),
            Ok(Value::Int(1))
        );
        assert_eq!(
            Value::Int(2).compare(CompareOp::Eq, Value::Real(2.0)),
            Ok(Value::Int(1))
        );
        assert_eq!(
            Value::Null.compare(CompareOp::Neq, Value::Int(0)),
            Ok(Value::Int(1))
        );
    }

    #[test]
    fn display() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    proptest! {
        #[test]
        fn floor_div_and_mod_recompose(a in -10_000i64..10_000, b in -100i64..100) {
            prop_assume!(b != 0);
            let q = floor_div(a, b).unwrap();
            let r = floor_mod(a, b).unwrap();
            prop_assert_eq!(q * b + r, a);
            prop_assert!(r == 0 || (r < 0) == (b < 0));
            prop_assert!(r.abs() < b.abs());
        }

        #[test]
        fn floor_div_matches_real_floor(a in -10_000i64..10_000, b in 1i64..100) {
            let expected = (a as f64 / b as f64).floor() as i64;
            prop_assert_eq!(floor_div(a, b), Some(expected));
        }
    }
}
