//! Query compilation: raw text in, typed stage list out.
//!
//! `compile` chains the front end together (normalize, split into
//! classified units, expression-parse each unit) and attaches the
//! normalized query text to any syntax error so it renders with a caret
//! under the offending span. Compilation happens entirely before the
//! first record is read: a malformed query never consumes input.

use log::debug;

use crate::ast::Stage;
use crate::error::SyntaxError;
use crate::normalize::normalize;
use crate::parser::Parser;
use crate::split::{split, StageUnit, UnitKind};

/// A compiled query: the ordered stage list.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub stages: Vec<Stage>,
}

/// Compile a raw query string into a stage list.
pub fn compile(raw: &str) -> Result<Query, SyntaxError> {
    let normalized = normalize(raw);
    debug!("normalized query: {}", normalized);

    let units = split(&normalized).map_err(|e| e.with_query(&normalized))?;

    let mut stages = Vec::with_capacity(units.len());
    for unit in units {
        let stage = parse_unit(&unit).map_err(|e| e.with_query(&normalized))?;
        stages.push(stage);
    }
    Ok(Query { stages })
}

fn parse_unit(unit: &StageUnit) -> Result<Stage, SyntaxError> {
    let mut parser = Parser::with_offset(&unit.body, unit.offset)?;
    match &unit.kind {
        UnitKind::Map => Ok(Stage::Map(parser.parse()?)),
        UnitKind::Filter => Ok(Stage::Filter(parser.parse()?)),
        UnitKind::Update => Ok(Stage::Update(parser.parse()?)),
        UnitKind::Function { name } => {
            let (args, kwargs) = parser.parse_args()?;
            Ok(Stage::Function {
                name: name.clone(),
                args,
                kwargs,
            })
        }
    }
}

/// A query loaded from a file, with its directive lines extracted.
///
/// Directive-comment lines are honored and stripped; every other `#`
/// line is a plain comment. The remaining lines are joined with commas
/// into one pipeline:
///
/// ```text
/// #input jsonl
/// #import lookup=countries.json
/// #init threshold=100
/// {id: .id, country: .country}
/// (.total > 100)
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFile {
    /// The joined query text.
    pub query: String,
    /// `#import name=file.json` data imports, bound into the environment.
    pub imports: Vec<(String, String)>,
    /// `#init name=<json>` literal bindings.
    pub inits: Vec<(String, String)>,
    /// `#input <format>` forced input format.
    pub input_format: Option<String>,
}

/// Parse query-file content into query text and directives.
pub fn parse_query_file(content: &str) -> QueryFile {
    let mut out = QueryFile::default();
    let mut lines = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim();
            if let Some(spec) = rest.strip_prefix("import ") {
                if let Some((name, path)) = spec.trim().split_once('=') {
                    out.imports.push((name.trim().to_string(), path.trim().to_string()));
                }
            } else if let Some(spec) = rest.strip_prefix("init ") {
                if let Some((name, value)) = spec.trim().split_once('=') {
                    out.inits.push((name.trim().to_string(), value.trim().to_string()));
                }
            } else if let Some(fmt) = rest.strip_prefix("input ") {
                out.input_format = Some(fmt.trim().to_string());
            }
            continue;
        }
        lines.push(trimmed.to_string());
    }

    out.query = lines.join(", ");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stage};

    #[test]
    fn compiles_map_filter_function() {
        let query = compile(".a, (.id > 100), first(2)").unwrap();
        assert_eq!(query.stages.len(), 3);
        assert_eq!(query.stages[0], Stage::Map(Expr::record().field("a")));
        assert_eq!(
            query.stages[1],
            Stage::Filter(Expr::record().field("id").gt(100))
        );
        assert_eq!(
            query.stages[2],
            Stage::Function {
                name: "first".to_string(),
                args: vec![Expr::literal(2)],
                kwargs: vec![],
            }
        );
    }

    #[test]
    fn unbalanced_brace_fails_before_any_record() {
        let err = compile("{id: .a, data: .b.d").unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn error_display_restores_escaped_names() {
        // `.first` collides with a builtin name and gets escaped during
        // normalization; the error text must show the original name.
        let err = compile(".first > ,").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("x.first"), "got: {}", rendered);
        assert!(!rendered.contains("SIFTESC"), "got: {}", rendered);
    }

    #[test]
    fn query_file_directives() {
        let content = "\
# a plain comment
#input jsonl
#import lookup=countries.json
#init threshold=100
{id: .id}
(.total > 100)
";
        let qf = parse_query_file(content);
        assert_eq!(qf.query, "{id: .id}, (.total > 100)");
        assert_eq!(qf.input_format.as_deref(), Some("jsonl"));
        assert_eq!(
            qf.imports,
            vec![("lookup".to_string(), "countries.json".to_string())]
        );
        assert_eq!(
            qf.inits,
            vec![("threshold".to_string(), "100".to_string())]
        );
    }
}
