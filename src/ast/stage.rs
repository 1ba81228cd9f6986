use crate::ast::Expr;

/// One pipeline stage, produced by parsing one comma-separated unit of
/// the query.
///
/// The pipeline is an ordered, immutable sequence of stages built once
/// per query. Stages share no mutable state across records; the only
/// accumulating stages are the stream builtins behind [`Stage::Function`]
/// (sort, unique, group_by, ...), each of which owns its own buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Replace each record with the evaluated expression.
    ///
    /// # Example
    /// ```text
    /// {id: .id, total: .price * .qty}
    /// ```
    Map(Expr),

    /// Keep records whose predicate evaluates truthy.
    ///
    /// # Example
    /// ```text
    /// (.id > 100)
    /// ```
    Filter(Expr),

    /// Merge the evaluated mapping into each record: new keys are
    /// added, existing keys overwritten, everything else kept. Never
    /// removes fields.
    ///
    /// # Example
    /// ```text
    /// {b: .a + 1, ...}
    /// ```
    Update(Expr),

    /// A named stream builtin applied to the whole record stream.
    ///
    /// # Examples
    /// ```text
    /// sorted(.total, reverse=true)
    /// unique(.id)
    /// first(5)
    /// ```
    Function {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}
