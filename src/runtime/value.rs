use crate::language::ast::{BinOp, ModOp, UnOp};
use crate::runtime::error::ErrorKind;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::fmt;

/// A runtime value: an exact rational or a nested array of values.
/// Values are trees; `Clone` is a deep copy and equality is structural.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(BigRational),
    Array(Vec<Value>),
}

impl Value {
    pub fn zero() -> Value {
        Value::Number(BigRational::zero())
    }

    pub fn from_i64(value: i64) -> Value {
        Value::Number(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn from_bool(value: bool) -> Value {
        Value::Number(if value {
            BigRational::one()
        } else {
            BigRational::zero()
        })
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_zero(),
            Value::Array(items) => !items.is_empty(),
        }
    }

    pub fn as_number(&self) -> Result<&BigRational, ErrorKind> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Array(_) => Err(ErrorKind::Type(
                "Expected a number, found an array".to_string(),
            )),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], ErrorKind> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Number(_) => Err(ErrorKind::Type(
                "Expected an array, found a number".to_string(),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.is_integer() {
                    write!(f, "{}", n.to_integer())
                } else {
                    write!(f, "{}/{}", n.numer(), n.denom())
                }
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Maps a (possibly negative) rational index onto `0..len`. Negative
/// indices wrap modulo the length; positive ones must be in range.
pub fn resolve_index(len: usize, index: &BigRational) -> Result<usize, ErrorKind> {
    if !index.is_integer() {
        return Err(ErrorKind::Type(format!(
            "Array index must be an integer, found {}",
            Value::Number(index.clone())
        )));
    }
    let idx = index.to_integer();
    if idx.is_negative() {
        if len == 0 {
            return Err(ErrorKind::Index("Indexing into an empty array".to_string()));
        }
        let m = ((-&idx) % BigInt::from(len))
            .to_usize()
            .expect("modulus fits usize");
        Ok((len - m) % len)
    } else {
        match idx.to_usize() {
            Some(i) if i < len => Ok(i),
            _ => Err(ErrorKind::Index(format!(
                "Index {} out of bounds for array of length {}",
                idx, len
            ))),
        }
    }
}

pub fn binary_op(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ErrorKind> {
    let (a, b) = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        _ => {
            return Err(ErrorKind::Type(format!(
                "Binary operation '{}' does not accept arrays",
                op.symbol()
            )));
        }
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b.is_zero() {
                return Err(division_by_zero(a, op, b));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b.is_zero() {
                return Err(division_by_zero(a, op, b));
            }
            (a / b).floor()
        }
        BinOp::Rem => {
            if b.is_zero() {
                return Err(division_by_zero(a, op, b));
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => pow_rational(a, b)?,
        BinOp::Xor | BinOp::And | BinOp::Or => {
            let x = integer_operand(a, op)?;
            let y = integer_operand(b, op)?;
            let bits = match op {
                BinOp::Xor => x ^ y,
                BinOp::And => x & y,
                BinOp::Or => x | y,
                _ => unreachable!(),
            };
            BigRational::from_integer(bits)
        }
        BinOp::Eq => return Ok(Value::from_bool(a == b)),
        BinOp::NotEq => return Ok(Value::from_bool(a != b)),
        BinOp::Lt => return Ok(Value::from_bool(a < b)),
        BinOp::LtEq => return Ok(Value::from_bool(a <= b)),
        BinOp::Gt => return Ok(Value::from_bool(a > b)),
        BinOp::GtEq => return Ok(Value::from_bool(a >= b)),
    };
    Ok(Value::Number(result))
}

pub fn unary_op(op: UnOp, value: &Value) -> Result<Value, ErrorKind> {
    let n = match value {
        Value::Number(n) => n,
        Value::Array(_) => {
            return Err(ErrorKind::Type(
                "Unary operations do not accept arrays".to_string(),
            ));
        }
    };
    Ok(match op {
        UnOp::Neg => Value::Number(-n),
        UnOp::Not => Value::from_bool(n.is_zero()),
    })
}

/// Applies a modification operator to the scalar at a storage location.
/// `*=` and `/=` by zero destroy information and are rejected.
pub fn apply_modop(op: ModOp, lhs: &BigRational, rhs: &BigRational) -> Result<BigRational, ErrorKind> {
    let result = match op {
        ModOp::Add => lhs + rhs,
        ModOp::Sub => lhs - rhs,
        ModOp::Mul => {
            if rhs.is_zero() {
                return Err(ErrorKind::Arithmetic(
                    "Multiplying a variable by zero".to_string(),
                ));
            }
            lhs * rhs
        }
        ModOp::Div => {
            if rhs.is_zero() {
                return Err(ErrorKind::Arithmetic(
                    "Dividing a variable by zero".to_string(),
                ));
            }
            lhs / rhs
        }
        ModOp::FloorDiv => {
            if rhs.is_zero() {
                return Err(ErrorKind::Arithmetic(
                    "Dividing a variable by zero".to_string(),
                ));
            }
            (lhs / rhs).floor()
        }
        ModOp::Rem => {
            if rhs.is_zero() {
                return Err(ErrorKind::Arithmetic(
                    "Dividing a variable by zero".to_string(),
                ));
            }
            lhs - rhs * (lhs / rhs).floor()
        }
        ModOp::Pow => pow_rational(lhs, rhs)?,
        ModOp::Xor | ModOp::Or | ModOp::And => {
            let op_name = op.symbol();
            let x = lhs.is_integer().then(|| lhs.to_integer()).ok_or_else(|| {
                ErrorKind::Arithmetic(format!("Non-integer operand to '{}'", op_name))
            })?;
            let y = rhs.is_integer().then(|| rhs.to_integer()).ok_or_else(|| {
                ErrorKind::Arithmetic(format!("Non-integer operand to '{}'", op_name))
            })?;
            let bits = match op {
                ModOp::Xor => x ^ y,
                ModOp::Or => x | y,
                ModOp::And => x & y,
                _ => unreachable!(),
            };
            BigRational::from_integer(bits)
        }
    };
    Ok(result)
}

fn division_by_zero(a: &BigRational, op: BinOp, b: &BigRational) -> ErrorKind {
    ErrorKind::Arithmetic(format!(
        "Division by zero: {} {} {}",
        Value::Number(a.clone()),
        op.symbol(),
        Value::Number(b.clone())
    ))
}

fn integer_operand(n: &BigRational, op: BinOp) -> Result<BigInt, ErrorKind> {
    if n.is_integer() {
        Ok(n.to_integer())
    } else {
        Err(ErrorKind::Arithmetic(format!(
            "Non-integer operand to '{}': {}",
            op.symbol(),
            Value::Number(n.clone())
        )))
    }
}

/// Exact exponentiation. The exponent must be an integer; negative
/// exponents invert the base.
fn pow_rational(base: &BigRational, exp: &BigRational) -> Result<BigRational, ErrorKind> {
    if !exp.is_integer() {
        return Err(ErrorKind::Type(format!(
            "Exponent must be an integer, found {}",
            Value::Number(exp.clone())
        )));
    }
    let exp = exp.to_integer();
    if exp.is_negative() {
        if base.is_zero() {
            return Err(ErrorKind::Arithmetic(
                "Zero raised to a negative power".to_string(),
            ));
        }
        return Ok(pow_by_squaring(base, &-exp).recip());
    }
    Ok(pow_by_squaring(base, &exp))
}

fn pow_by_squaring(base: &BigRational, exp: &BigInt) -> BigRational {
    let two = BigInt::from(2);
    let mut result = BigRational::one();
    let mut factor = base.clone();
    let mut e = exp.clone();
    while !e.is_zero() {
        if !(&e % &two).is_zero() {
            result *= &factor;
        }
        e = &e / &two;
        if !e.is_zero() {
            factor = &factor * &factor;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Value {
        Value::from_i64(n)
    }

    fn rat(n: i64, d: i64) -> Value {
        Value::Number(BigRational::new(BigInt::from(n), BigInt::from(d)))
    }

    #[test]
    fn exact_division() {
        let result = binary_op(BinOp::Div, &num(1), &num(3)).unwrap();
        assert_eq!(result, rat(1, 3));
        let back = binary_op(BinOp::Mul, &result, &num(3)).unwrap();
        assert_eq!(back, num(1));
    }

    #[test]
    fn floor_division_and_remainder() {
        assert_eq!(binary_op(BinOp::FloorDiv, &num(7), &num(2)).unwrap(), num(3));
        assert_eq!(binary_op(BinOp::FloorDiv, &num(-7), &num(2)).unwrap(), num(-4));
        assert_eq!(binary_op(BinOp::Rem, &num(7), &num(3)).unwrap(), num(1));
        assert_eq!(binary_op(BinOp::Rem, &num(-7), &num(3)).unwrap(), num(2));
    }

    #[test]
    fn power_with_negative_exponent() {
        assert_eq!(binary_op(BinOp::Pow, &num(2), &num(-2)).unwrap(), rat(1, 4));
        assert_eq!(binary_op(BinOp::Pow, &rat(2, 3), &num(3)).unwrap(), rat(8, 27));
    }

    #[test]
    fn power_rejects_fractional_exponent() {
        let err = binary_op(BinOp::Pow, &num(2), &rat(1, 2)).unwrap_err();
        assert!(matches!(err, ErrorKind::Type(_)));
    }

    #[test]
    fn bitwise_requires_integers() {
        assert_eq!(binary_op(BinOp::Xor, &num(6), &num(3)).unwrap(), num(5));
        let err = binary_op(BinOp::Xor, &rat(1, 2), &num(1)).unwrap_err();
        assert!(matches!(err, ErrorKind::Arithmetic(_)));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = binary_op(BinOp::Div, &num(1), &num(0)).unwrap_err();
        assert!(matches!(err, ErrorKind::Arithmetic(_)));
    }

    #[test]
    fn negative_indices_wrap() {
        let minus_one = BigRational::from_integer(BigInt::from(-1));
        assert_eq!(resolve_index(4, &minus_one).unwrap(), 3);
        let minus_five = BigRational::from_integer(BigInt::from(-5));
        assert_eq!(resolve_index(4, &minus_five).unwrap(), 3);
        let minus_four = BigRational::from_integer(BigInt::from(-4));
        assert_eq!(resolve_index(4, &minus_four).unwrap(), 0);
    }

    #[test]
    fn positive_out_of_range_fails() {
        let four = BigRational::from_integer(BigInt::from(4));
        assert!(matches!(
            resolve_index(4, &four).unwrap_err(),
            ErrorKind::Index(_)
        ));
    }

    #[test]
    fn display_matches_presentation_format() {
        assert_eq!(num(5).to_string(), "5");
        assert_eq!(rat(1, 2).to_string(), "1/2");
        let arr = Value::Array(vec![num(1), rat(3, 4), Value::Array(vec![num(2)])]);
        assert_eq!(arr.to_string(), "[1, 3/4, [2]]");
    }

    #[test]
    fn modop_xor_is_self_inverse() {
        let a = BigRational::from_integer(BigInt::from(13));
        let k = BigRational::from_integer(BigInt::from(6));
        let once = apply_modop(ModOp::Xor, &a, &k).unwrap();
        let twice = apply_modop(ModOp::Xor, &once, &k).unwrap();
        assert_eq!(twice, a);
    }

    #[test]
    fn modop_rejects_mul_by_zero() {
        let a = BigRational::from_integer(BigInt::from(3));
        let z = BigRational::zero();
        assert!(matches!(
            apply_modop(ModOp::Mul, &a, &z).unwrap_err(),
            ErrorKind::Arithmetic(_)
        ));
    }
}
