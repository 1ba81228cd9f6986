//! Textual query preprocessing.
//!
//! Normalization happens before any real parsing and turns the compact
//! command-line syntax into the canonical form the stage splitter and
//! expression parser understand:
//!
//! - line breaks and following indentation collapse to a single space,
//!   so multi-line queries are equivalent to single-line ones
//! - bare object-literal keys are quoted (`{id: .a}` → `{"id": .a}`)
//! - leading bare field references are rewritten against the implicit
//!   record variable (`.name` → `x.name`)
//! - the `NOW()` macro expands to a `now(x)` call producing the current
//!   UTC timestamp
//! - field accesses whose name collides with a reserved engine name are
//!   tagged with a private marker so they survive parsing as ordinary
//!   field names; the marker is stripped after parsing succeeds and
//!   restored verbatim into error messages
//!
//! Normalization itself never fails. Queries left unbalanced by quoting
//! or escaping are rejected later by the stage splitter, which knows
//! positions.

use std::ops::Range;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::builtins::STREAM_BUILTINS;
use crate::env::DEFAULT_FUNCTIONS;

/// Private tag prepended to reserved field names between normalization
/// and parsing. Must never appear in user queries.
pub const ESCAPE_MARKER: &str = "__SIFTESC__";

struct Battery {
    indent: Regex,
    bare_key: Regex,
    leading_field: Regex,
    inner_field: Regex,
    now_macro: Regex,
    reserved_field: Regex,
}

fn battery() -> &'static Battery {
    static BATTERY: OnceLock<Battery> = OnceLock::new();
    BATTERY.get_or_init(|| {
        // Longer names first so `group_by` wins over `group`.
        let mut reserved: Vec<&str> = STREAM_BUILTINS
            .iter()
            .chain(DEFAULT_FUNCTIONS.iter())
            .copied()
            .chain(["true", "false", "null"])
            .collect();
        reserved.sort_by_key(|name| std::cmp::Reverse(name.len()));
        let alternation = reserved.join("|");

        Battery {
            indent: Regex::new(r"\n\s*").expect("static regex"),
            bare_key: Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#)
                .expect("static regex"),
            leading_field: Regex::new(r"^(\.[A-Za-z_])").expect("static regex"),
            inner_field: Regex::new(r"([ (,:\[])(\.[A-Za-z_])").expect("static regex"),
            now_macro: Regex::new(r"NOW\(\)").expect("static regex"),
            reserved_field: Regex::new(&format!(r"\.({})\b", alternation)).expect("static regex"),
        }
    })
}

/// Normalize a raw query string into canonical form.
pub fn normalize(raw: &str) -> String {
    let b = battery();

    let query = b.indent.replace_all(raw, " ");
    debug!("after indent removal: {}", query);

    let query = b.bare_key.replace_all(&query, "${1}\"${2}\":");
    debug!("after key quoting: {}", query);

    let query = b.leading_field.replace_all(&query, "x${1}");
    let query = b.inner_field.replace_all(&query, "${1}x${2}");
    debug!("after record-variable rewrite: {}", query);

    let query = b.now_macro.replace_all(&query, "now(x)");

    let query = b
        .reserved_field
        .replace_all(&query, format!(".{}${{1}}", ESCAPE_MARKER).as_str());
    debug!("after reserved-name escaping: {}", query);

    query.trim().to_string()
}

/// Strip escape markers, restoring the field names the user wrote.
pub fn unescape(text: &str) -> String {
    text.replace(ESCAPE_MARKER, "")
}

/// Strip escape markers from `text` and translate a span over the
/// marked text into a span over the displayed text. Used when rendering
/// syntax errors so carets line up with what the user sees.
pub fn display_with_span(text: &str, span: Range<usize>) -> (String, Range<usize>) {
    let marker_len = ESCAPE_MARKER.len();
    let shift = |pos: usize| {
        let before = &text[..pos.min(text.len())];
        pos - before.matches(ESCAPE_MARKER).count() * marker_len
    };
    let adjusted = shift(span.start)..shift(span.end);
    (unescape(text), adjusted)
}
