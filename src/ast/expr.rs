use crate::ast::ops::{BinOp, Op};
use crate::value::Value;

/// The starting point of a column expression chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// The record being processed (`x` in query text; leading `.field`
    /// is normalized to `x.field`).
    Record,

    /// A literal value.
    Literal(Value),

    /// A named environment binding (`env`, a data import, an init
    /// binding). Unresolved names are fatal at first evaluation.
    Binding(String),

    /// Object literal; each value expression is evaluated against the
    /// input record.
    Object(Vec<(String, Expr)>),

    /// Array literal.
    Array(Vec<Expr>),
}

/// A column expression: how to compute a value from a record.
///
/// Structurally an atom followed by an ordered chain of operations,
/// evaluated left to right. The same AST is produced by the textual
/// parser and by this type's fluent builder methods, so the two
/// authoring modes behave identically by construction.
///
/// # Examples
///
/// ```
/// use sift_lang::ast::Expr;
/// use sift_lang::parse_expr;
///
/// // `.a.b[4]` built fluently...
/// let built = Expr::record().field("a").field("b").index(4);
/// // ...is structurally identical to the parsed form
/// let parsed = parse_expr("x.a.b[4]").unwrap();
/// assert_eq!(built, parsed);
///
/// // `.id > 100`
/// let _pred = Expr::record().field("id").gt(100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub atom: Atom,
    pub ops: Vec<Op>,
}

impl Expr {
    /// The implicit record variable.
    pub fn record() -> Self {
        Expr {
            atom: Atom::Record,
            ops: Vec::new(),
        }
    }

    /// A literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr {
            atom: Atom::Literal(value.into()),
            ops: Vec::new(),
        }
    }

    /// A named environment binding.
    pub fn binding(name: impl Into<String>) -> Self {
        Expr {
            atom: Atom::Binding(name.into()),
            ops: Vec::new(),
        }
    }

    /// An object literal.
    pub fn object(pairs: Vec<(String, Expr)>) -> Self {
        Expr {
            atom: Atom::Object(pairs),
            ops: Vec::new(),
        }
    }

    /// An array literal.
    pub fn array(items: Vec<Expr>) -> Self {
        Expr {
            atom: Atom::Array(items),
            ops: Vec::new(),
        }
    }

    fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Append a field access.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push(Op::Field(name.into()))
    }

    /// Append an index access.
    pub fn index(self, i: i64) -> Self {
        self.push(Op::Index(i))
    }

    /// Append a named unary function application.
    pub fn apply(self, name: impl Into<String>) -> Self {
        self.push(Op::Call(name.into()))
    }

    /// Append a binary operation; the operand is evaluated against the
    /// original input record.
    pub fn binary(self, op: BinOp, operand: impl Into<Expr>) -> Self {
        self.push(Op::Binary(op, Box::new(operand.into())))
    }

    pub fn mul(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::Multiply, operand)
    }

    pub fn add(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::Add, operand)
    }

    pub fn sub(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::Subtract, operand)
    }

    pub fn lt(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::LessThan, operand)
    }

    pub fn gt(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::GreaterThan, operand)
    }

    pub fn le(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::LessEqual, operand)
    }

    pub fn ge(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::GreaterEqual, operand)
    }

    pub fn eq(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::Equal, operand)
    }

    pub fn ne(self, operand: impl Into<Expr>) -> Self {
        self.binary(BinOp::NotEqual, operand)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::literal(value)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::literal(Value::Integer(n))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::literal(Value::Float(n))
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::literal(Value::String(s.to_string()))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::literal(Value::Boolean(b))
    }
}
