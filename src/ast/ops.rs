use crate::ast::Expr;

/// Binary operators usable in a column expression chain.
///
/// This is deliberately the small comparison/arithmetic vocabulary the
/// language needs for per-record expressions; there is no division,
/// modulo, or boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Multiplication (`*`)
    Multiply,
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,
    /// Equal (`==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
}

impl BinOp {
    /// The operator's source symbol, used in error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Multiply => "*",
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::LessThan => "<",
            BinOp::GreaterThan => ">",
            BinOp::LessEqual => "<=",
            BinOp::GreaterEqual => ">=",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
        }
    }
}

/// One step in a column expression chain, applied to the running value.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Object field lookup. Null if the running value is not an object
    /// or the field is absent; once the running value is null, later
    /// field/index steps stay null.
    Field(String),

    /// Index access. Arrays index by position (negative counts from the
    /// end); objects look the integer up as a decimal-string key;
    /// anything else becomes null.
    Index(i64),

    /// Binary operator. The operand is evaluated against the *original*
    /// input record, not the running value.
    Binary(BinOp, Box<Expr>),

    /// Named unary function application: the running value becomes
    /// `f(running value)`, with `f` resolved in the environment.
    Call(String),
}
