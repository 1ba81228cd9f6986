//! Stage segmentation.
//!
//! Splits a normalized query on top-level commas (respecting nested
//! `()[]{}` and quoted strings) and classifies every unit into a stage
//! kind by its shape, before any expression parsing happens:
//!
//! 1. `name(...)` where `name` is a stream builtin ⇒ function stage
//! 2. `name(...)` generically ⇒ a map stage applying the named function
//! 3. trailing `)` ⇒ filter
//! 4. trailing `, ...}` ⇒ update (ellipsis stripped)
//! 5. anything else ⇒ map
//!
//! Unbalanced brackets or quotes are a hard syntax error carrying the
//! offending position; an empty query yields no stages (identity).

use log::debug;

use crate::builtins::STREAM_BUILTINS;
use crate::error::SyntaxError;

/// Shape classification of one comma-separated query unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitKind {
    Map,
    Filter,
    Update,
    Function { name: String },
}

/// One classified unit of query text, not yet expression-parsed.
///
/// `offset` is the byte position of `body` inside the normalized query,
/// so expression parse errors can point at the right spot.
#[derive(Debug, Clone, PartialEq)]
pub struct StageUnit {
    pub kind: UnitKind,
    pub body: String,
    pub offset: usize,
}

/// Split a normalized query into classified stage units.
pub fn split(normalized: &str) -> Result<Vec<StageUnit>, SyntaxError> {
    let mut units = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut in_string: Option<(char, usize)> = None;
    let mut escaped = false;
    let mut unit_start = 0usize;

    for (pos, ch) in normalized.char_indices() {
        if let Some((quote, _)) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some((ch, pos)),
            '(' | '[' | '{' => stack.push((ch, pos)),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(SyntaxError::at(format!("unexpected '{}'", ch), pos));
                    }
                }
            }
            ',' if stack.is_empty() => {
                push_unit(&mut units, normalized, unit_start, pos);
                unit_start = pos + 1;
            }
            _ => {}
        }
    }

    if let Some((quote, pos)) = in_string {
        return Err(SyntaxError::at(
            format!("unterminated {} string", quote),
            pos,
        ));
    }
    if let Some((open, pos)) = stack.pop() {
        return Err(SyntaxError::at(format!("unbalanced '{}'", open), pos));
    }

    push_unit(&mut units, normalized, unit_start, normalized.len());
    Ok(units)
}

fn push_unit(units: &mut Vec<StageUnit>, normalized: &str, start: usize, end: usize) {
    let raw = &normalized[start..end];
    let trimmed = raw.trim();
    // Empty units and the explicit identity pass through unchanged.
    if trimmed.is_empty() || trimmed == "I" {
        return;
    }
    let offset = start + (raw.len() - raw.trim_start().len());
    let unit = classify(trimmed, offset);
    debug!("stage unit {:?}: {}", unit.kind, unit.body);
    units.push(unit);
}

fn classify(unit: &str, offset: usize) -> StageUnit {
    // A whole-unit call `name(...)`?
    if let Some((name, args_start)) = call_shape(unit) {
        if STREAM_BUILTINS.contains(&name) {
            return StageUnit {
                kind: UnitKind::Function {
                    name: name.to_string(),
                },
                body: unit[args_start..unit.len() - 1].to_string(),
                offset: offset + args_start,
            };
        }
        // A generic call maps every record through the named function;
        // the expression parser handles the call atom itself.
        return StageUnit {
            kind: UnitKind::Map,
            body: unit.to_string(),
            offset,
        };
    }

    if unit.ends_with(')') {
        return StageUnit {
            kind: UnitKind::Filter,
            body: unit.to_string(),
            offset,
        };
    }

    if let Some(body) = update_shape(unit) {
        return StageUnit {
            kind: UnitKind::Update,
            body,
            offset,
        };
    }

    StageUnit {
        kind: UnitKind::Map,
        body: unit.to_string(),
        offset,
    }
}

/// If the unit is exactly `ident( ... )` with the opening paren matching
/// the final character, return the identifier and the byte offset just
/// past the opening paren.
fn call_shape(unit: &str) -> Option<(&str, usize)> {
    if !unit.ends_with(')') {
        return None;
    }
    let ident_len = unit
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_alphabetic() || *c == '_' || (*i > 0 && c.is_ascii_digit())
        })
        .count();
    if ident_len == 0 || unit[ident_len..].chars().next() != Some('(') {
        return None;
    }
    // The call's closing paren must be the last character of the unit.
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    for (pos, ch) in unit[ident_len..].char_indices() {
        if let Some(quote) = in_string {
            if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return if ident_len + pos == unit.len() - 1 {
                        Some((&unit[..ident_len], ident_len + 1))
                    } else {
                        None
                    };
                }
            }
            _ => {}
        }
    }
    None
}

/// If the unit is an update (`{..., ...}` with a trailing ellipsis),
/// return the object-literal body with the ellipsis marker stripped.
fn update_shape(unit: &str) -> Option<String> {
    if !unit.starts_with('{') || !unit.ends_with('}') {
        return None;
    }
    let inner = unit[..unit.len() - 1].trim_end();
    let inner = inner.strip_suffix("...")?;
    let inner = inner.trim_end().strip_suffix(',').unwrap_or(inner);
    Some(format!("{}}}", inner.trim_end()))
}
