use crate::language::ast::{Expr, Lookup};
use crate::language::span::Span;
use crate::runtime::error::{ErrorKind, RuntimeError, RuntimeResult};
use crate::runtime::scope::Frame;
use crate::runtime::sync::ThreadContext;
use crate::runtime::value::{binary_op, resolve_index, unary_op, Value};
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::collections::HashMap;

/// The pure expression evaluator: expression + scope → value, no statement
/// level side effects.
pub struct EvalContext<'a> {
    pub frame: &'a Frame,
    pub globals: &'a HashMap<String, Value>,
    pub thread: ThreadContext,
}

impl EvalContext<'_> {
    pub fn eval(&self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Number(lit) => Ok(Value::Number(lit.value.clone())),
            Expr::Lookup(lookup) => self.lookup_value(lookup),
            Expr::Binary {
                op, left, right, ..
            } => {
                let lhs = self.eval(left)?;
                // Zero is absorbing for '&', so the right operand need not be
                // evaluated; guards rely on this to avoid out-of-range reads.
                if *op == crate::language::ast::BinOp::And {
                    if let Value::Number(n) = &lhs {
                        if n.is_zero() {
                            return Ok(Value::zero());
                        }
                    }
                }
                let rhs = self.eval(right)?;
                binary_op(*op, &lhs, &rhs).map_err(|kind| RuntimeError::new(kind, expr.span()))
            }
            Expr::Unary { op, expr: inner, .. } => {
                let value = self.eval(inner)?;
                unary_op(*op, &value).map_err(|kind| RuntimeError::new(kind, expr.span()))
            }
            Expr::Length(lookup, span) => {
                let value = self.lookup_value(lookup)?;
                let items = value
                    .as_array()
                    .map_err(|_| {
                        RuntimeError::new(
                            ErrorKind::Type(format!(
                                "Taking the length of '{}' which is a number",
                                lookup.name
                            )),
                            *span,
                        )
                    })?;
                Ok(Value::from_i64(items.len() as i64))
            }
            Expr::ArrayLiteral(items, _) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Expr::ArrayRange {
                start, stop, step, ..
            } => self.eval_range(start, stop, step.as_deref(), expr.span()),
            Expr::ArrayTensor { fill, shape, span } => {
                let fill = self.eval(fill)?;
                let shape = self.eval(shape)?;
                build_tensor(&fill, &shape).map_err(|kind| RuntimeError::new(kind, *span))
            }
            Expr::ThreadId(_) => Ok(Value::from_i64(self.thread.tid as i64)),
            Expr::NumThreads(_) => Ok(Value::from_i64(self.thread.count as i64)),
        }
    }

    pub fn eval_truthy(&self, expr: &Expr) -> RuntimeResult<bool> {
        Ok(self.eval(expr)?.is_truthy())
    }

    pub fn eval_number(&self, expr: &Expr) -> RuntimeResult<BigRational> {
        let value = self.eval(expr)?;
        value
            .as_number()
            .map(Clone::clone)
            .map_err(|kind| RuntimeError::new(kind, expr.span()))
    }

    /// Evaluates a lookup's index chain to concrete rationals.
    pub fn eval_index_path(&self, lookup: &Lookup) -> RuntimeResult<Vec<BigRational>> {
        lookup
            .index
            .iter()
            .map(|idx| self.eval_number(idx))
            .collect()
    }

    pub fn lookup_value(&self, lookup: &Lookup) -> RuntimeResult<Value> {
        let path = self.eval_index_path(lookup)?;
        if let Some(slot) = self.frame.get(&lookup.name) {
            let guard = slot.cell.lock().unwrap();
            return navigate(&guard, &path, &lookup.name)
                .map(Clone::clone)
                .map_err(|kind| RuntimeError::new(kind, lookup.span));
        }
        if let Some(value) = self.globals.get(&lookup.name) {
            return navigate(value, &path, &lookup.name)
                .map(Clone::clone)
                .map_err(|kind| RuntimeError::new(kind, lookup.span));
        }
        Err(RuntimeError::new(
            ErrorKind::Scope(format!("Variable '{}' is undefined", lookup.name)),
            lookup.span,
        ))
    }

    fn eval_range(
        &self,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        span: Span,
    ) -> RuntimeResult<Value> {
        let start = self.eval_number(start)?;
        let stop = self.eval_number(stop)?;
        let step = match step {
            Some(expr) => self.eval_number(expr)?,
            None => BigRational::one(),
        };
        if step.is_zero() {
            return Err(RuntimeError::new(
                ErrorKind::Type("Range step must be non-zero".to_string()),
                span,
            ));
        }
        let mut items = Vec::new();
        let mut val = start;
        if step.is_positive() {
            while val < stop {
                items.push(Value::Number(val.clone()));
                val = &val + &step;
            }
        } else {
            while val > stop {
                items.push(Value::Number(val.clone()));
                val = &val + &step;
            }
        }
        Ok(Value::Array(items))
    }
}

/// Walks an index path into a value tree.
pub fn navigate<'v>(
    value: &'v Value,
    path: &[BigRational],
    name: &str,
) -> Result<&'v Value, ErrorKind> {
    let mut current = value;
    for index in path {
        match current {
            Value::Array(items) => {
                let i = resolve_index(items.len(), index)?;
                current = &items[i];
            }
            Value::Number(_) => {
                return Err(ErrorKind::Type(format!(
                    "Indexing into a number during lookup of '{}'",
                    name
                )));
            }
        }
    }
    Ok(current)
}

pub fn navigate_mut<'v>(
    value: &'v mut Value,
    path: &[BigRational],
    name: &str,
) -> Result<&'v mut Value, ErrorKind> {
    let mut current = value;
    for index in path {
        match current {
            Value::Array(items) => {
                let i = resolve_index(items.len(), index)?;
                current = &mut items[i];
            }
            Value::Number(_) => {
                return Err(ErrorKind::Type(format!(
                    "Indexing into a number during lookup of '{}'",
                    name
                )));
            }
        }
    }
    Ok(current)
}

fn build_tensor(fill: &Value, shape: &Value) -> Result<Value, ErrorKind> {
    let dims = match shape {
        Value::Array(items) if !items.is_empty() => items,
        Value::Array(_) => {
            return Err(ErrorKind::Type(
                "Empty array given as tensor dimensions".to_string(),
            ));
        }
        Value::Number(_) => {
            return Err(ErrorKind::Type(
                "Tensor dimensions should be an array, got a number".to_string(),
            ));
        }
    };
    let mut lengths = Vec::with_capacity(dims.len());
    for dim in dims {
        let n = dim.as_number().map_err(|_| {
            ErrorKind::Type("Tensor dimensions should be an array of numbers only".to_string())
        })?;
        if !n.is_integer() || n.is_negative() {
            return Err(ErrorKind::Type(
                "Tensor dimensions must be non-negative integers".to_string(),
            ));
        }
        lengths.push(n.to_integer().to_usize().ok_or_else(|| {
            ErrorKind::Index("Tensor dimension too large".to_string())
        })?);
    }
    if lengths[..lengths.len() - 1].contains(&0) {
        return Err(ErrorKind::Type(
            "Only the final dimension of a tensor may be zero".to_string(),
        ));
    }
    Ok(tensor_level(fill, &lengths))
}

fn tensor_level(fill: &Value, lengths: &[usize]) -> Value {
    if lengths.len() == 1 {
        return Value::Array(vec![fill.clone(); lengths[0]]);
    }
    Value::Array(
        (0..lengths[0])
            .map(|_| tensor_level(fill, &lengths[1..]))
            .collect(),
    )
}
