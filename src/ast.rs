//! # Sift Query Language - Abstract Syntax Tree
//!
//! This module defines the typed representation a sift query compiles
//! into: an ordered list of pipeline [stages](Stage), each carrying
//! [column expressions](Expr) that are evaluated per record.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expr]** - Column expressions (atom + op chain) and the fluent builder
//! - **[ops]** - Chain operations and binary operators
//! - **[stage]** - Pipeline stages (map, filter, update, function)
//!
//! ## Core Concepts
//!
//! ### Pipeline Structure
//!
//! A query is a comma-separated chain of stages applied to a record
//! stream, left to right:
//!
//! ```text
//! {id: .id, total: .price * .qty}, (.total > 100), sorted(.total), first(5)
//! ```
//!
//! ### The Four Stage Kinds
//!
//! - **Map** - replace each record with the evaluated expression
//! - **Filter** `( ... )` - keep records whose predicate is truthy
//! - **Update** `{ ..., ...}` - merge the evaluated mapping into each record
//! - **Function** - a named stream builtin (`sorted`, `unique`, `group_by`, ...)
//!
//! ### Column Expressions
//!
//! An expression starts from an atom (the record `x`, a literal, an
//! object/array literal, or a function call) and applies a chain of
//! operations: field access, indexing, binary operators, and named
//! unary functions. The operand of a binary operator is evaluated
//! against the *original* input record, so `.a > .b` compares two
//! fields of the same record without nested-context ambiguity.

pub mod expr;
pub mod ops;
pub mod stage;
pub mod tokens;

pub use expr::{Atom, Expr};
pub use ops::{BinOp, Op};
pub use stage::Stage;
pub use tokens::Token;
