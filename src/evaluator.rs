use rust_decimal::{prelude::FromPrimitive, prelude::ToPrimitive, Decimal};

use crate::ast::{Atom, BinOp, Expr, Op};
use crate::env::Environment;
use crate::value::Value;

/// Errors that can occur while evaluating expressions or running a
/// pipeline.
#[derive(Debug, Clone)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    Type(String),

    /// Arithmetic or comparison applied to a null operand. Field and
    /// index access propagate null silently; operators do not.
    NullOperand(String),

    /// Reference to a function or binding not present in the environment
    UnresolvedName(String),

    /// A worker-pool failure in concurrent execution
    Worker(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Type(msg) => write!(f, "Type error: {}", msg),
            EvalError::NullOperand(msg) => write!(f, "Null operand: {}", msg),
            EvalError::UnresolvedName(name) => {
                write!(f, "Unresolved name: '{}' is not defined", name)
            }
            EvalError::Worker(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

/// Evaluate a column expression against a record.
///
/// The op chain is applied left to right starting from the atom. Field
/// and index steps null-propagate: once the running value is null they
/// leave it null. Binary operators evaluate their operand against the
/// *original* record and are strict about null: `.missing + 1` is a
/// fatal [`EvalError::NullOperand`], never a silent null.
pub fn eval(expr: &Expr, record: &Value, env: &Environment) -> Result<Value, EvalError> {
    let mut current = eval_atom(&expr.atom, record, env)?;

    for op in &expr.ops {
        current = match op {
            Op::Field(name) => access_field(&current, name),
            Op::Index(i) => access_index(&current, *i),
            Op::Binary(op, operand) => {
                let other = eval(operand, record, env)?;
                apply_binop(*op, &current, &other)?
            }
            Op::Call(name) => {
                let f = env
                    .function(name)
                    .ok_or_else(|| EvalError::UnresolvedName(name.clone()))?;
                f(&current)?
            }
        };
    }
    Ok(current)
}

fn eval_atom(atom: &Atom, record: &Value, env: &Environment) -> Result<Value, EvalError> {
    match atom {
        Atom::Record => Ok(record.clone()),
        Atom::Literal(value) => Ok(value.clone()),
        Atom::Binding(name) => env
            .binding(name)
            .cloned()
            .ok_or_else(|| EvalError::UnresolvedName(name.clone())),
        Atom::Object(pairs) => {
            let mut map = indexmap::IndexMap::new();
            for (key, expr) in pairs {
                map.insert(key.clone(), eval(expr, record, env)?);
            }
            Ok(Value::Object(map))
        }
        Atom::Array(exprs) => {
            let mut arr = Vec::new();
            for expr in exprs {
                arr.push(eval(expr, record, env)?);
            }
            Ok(Value::Array(arr))
        }
    }
}

fn access_field(current: &Value, name: &str) -> Value {
    match current {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn access_index(current: &Value, i: i64) -> Value {
    match current {
        Value::Array(arr) => {
            let index = if i < 0 {
                let abs = i.unsigned_abs() as usize;
                if abs > arr.len() {
                    return Value::Null;
                }
                arr.len() - abs
            } else {
                i as usize
            };
            arr.get(index).cloned().unwrap_or(Value::Null)
        }
        // Objects treat the integer as a key lookup
        Value::Object(map) => map.get(&i.to_string()).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn null_guard(op: BinOp, left: &Value, right: &Value) -> Result<(), EvalError> {
    if matches!(left, Value::Null) || matches!(right, Value::Null) {
        return Err(EvalError::NullOperand(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    }
    Ok(())
}

/// Apply a binary operator to two values.
///
/// Mixed integer/float arithmetic routes through `rust_decimal` and
/// collapses back to an integer when the result is whole, so integer
/// typing survives arithmetic wherever mathematically valid.
pub fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    // Equality is defined for every type, null included; arithmetic and
    // ordering are strict.
    if !matches!(op, BinOp::Equal | BinOp::NotEqual) {
        null_guard(op, left, right)?;
    }
    match op {
        BinOp::Add => match (left, right) {
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
            (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
                Ok(mixed_arith(op, left, right))
            }
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Array(a), Value::Array(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::Array(out))
            }
            (a, b) => Err(EvalError::Type(format!(
                "Cannot add {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
        BinOp::Subtract => match (left, right) {
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a - b)),
            (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
                Ok(mixed_arith(op, left, right))
            }
            (a, b) => Err(EvalError::Type(format!(
                "Cannot subtract {} from {}",
                b.type_name(),
                a.type_name()
            ))),
        },
        BinOp::Multiply => match (left, right) {
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a * b)),
            (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
                Ok(mixed_arith(op, left, right))
            }
            (a, b) => Err(EvalError::Type(format!(
                "Cannot multiply {} by {}",
                a.type_name(),
                b.type_name()
            ))),
        },
        BinOp::Equal => Ok(Value::Boolean(values_equal(left, right))),
        BinOp::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
        BinOp::LessThan => numeric_compare(op, left, right, |o| o == std::cmp::Ordering::Less),
        BinOp::GreaterThan => {
            numeric_compare(op, left, right, |o| o == std::cmp::Ordering::Greater)
        }
        BinOp::LessEqual => numeric_compare(op, left, right, |o| o != std::cmp::Ordering::Greater),
        BinOp::GreaterEqual => numeric_compare(op, left, right, |o| o != std::cmp::Ordering::Less),
    }
}

/// Mixed integer/float arithmetic through Decimal, preserving integer
/// results when they are whole. Falls back to f64 when the values do
/// not fit a Decimal.
fn mixed_arith(op: BinOp, left: &Value, right: &Value) -> Value {
    let (a, b) = match (left, right) {
        (Value::Integer(a), Value::Float(b)) => (Decimal::from_i64(*a), Decimal::from_f64(*b)),
        (Value::Float(a), Value::Integer(b)) => (Decimal::from_f64(*a), Decimal::from_i64(*b)),
        _ => (None, None),
    };
    if let (Some(ad), Some(bd)) = (a, b) {
        let rd = match op {
            BinOp::Add => ad + bd,
            BinOp::Subtract => ad - bd,
            BinOp::Multiply => ad * bd,
            _ => unreachable!("mixed_arith only handles arithmetic"),
        };
        if rd.is_integer() {
            if let Some(r) = rd.to_i64() {
                return Value::Integer(r);
            }
        }
        if let Some(r) = rd.to_f64() {
            return Value::Float(r);
        }
    }
    let af = left.as_float().unwrap_or(f64::NAN);
    let bf = right.as_float().unwrap_or(f64::NAN);
    match op {
        BinOp::Add => Value::Float(af + bf),
        BinOp::Subtract => Value::Float(af - bf),
        BinOp::Multiply => Value::Float(af * bf),
        _ => unreachable!("mixed_arith only handles arithmetic"),
    }
}

fn numeric_compare(
    op: BinOp,
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => {
                a.partial_cmp(&b)
                    .ok_or_else(|| EvalError::Type("cannot compare NaN".to_string()))?
            }
            _ => {
                return Err(EvalError::Type(format!(
                    "Cannot compare {} {} {}",
                    left.type_name(),
                    op.symbol(),
                    right.type_name()
                )));
            }
        },
    };
    Ok(Value::Boolean(accept(ordering)))
}

/// Structural equality with integer/float unification (`1 == 1.0`).
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            *a as f64 == *b
        }
        (a, b) => a == b,
    }
}

/// Ordering used by `sorted`: numbers and strings compare naturally,
/// mixed or unordered types compare equal (stable sort keeps their
/// arrival order).
pub fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Integer(a), Value::Float(b)) => {
            (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Value::Float(a), Value::Integer(b)) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
