//! The builtin stream-function vocabulary.
//!
//! These are the named higher-order pipeline functions a `Function`
//! stage can invoke: `sorted(.price)`, `unique(.id)`, `first(5)` and
//! friends. They operate on the whole record stream rather than one
//! record at a time, and they are the only stages allowed to buffer:
//! `sorted`, `group_by`, `transpose` and `reduce_list` materialize the
//! entire upstream sequence (a documented property, not a bug), `last`
//! and `firstnlast` keep bounded ring buffers, everything else streams.
//!
//! All builtins run single-threaded downstream of the pooled stage
//! prefix, so their internal buffers are never shared across threads.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use log::warn;

use crate::ast::{Atom, Expr, Op};
use crate::env::Environment;
use crate::evaluator::{compare_values, eval, EvalError};
use crate::pipeline::RecordStream;
use crate::record::Record;
use crate::value::Value;

/// Names the stage splitter classifies as stream builtins, including
/// the aliases the original command-line vocabulary had.
pub const STREAM_BUILTINS: &[&str] = &[
    "first",
    "head",
    "limit",
    "last",
    "tail",
    "firstnlast",
    "headntail",
    "sorted",
    "unique",
    "group_by",
    "flatten",
    "transpose",
    "hide",
    "reduce_list",
    "group",
    "chain",
    "yield_from",
    "yield_all",
    "print",
    "islice",
];

/// Apply a named stream builtin to the upstream record stream.
pub fn apply<'a>(
    name: &str,
    args: &'a [Expr],
    kwargs: &'a [(String, Expr)],
    upstream: RecordStream<'a>,
    env: &'a Environment,
) -> RecordStream<'a> {
    match name {
        "first" | "head" | "limit" => first(args, upstream, env),
        "last" | "tail" => last(args, upstream, env),
        "firstnlast" | "headntail" => firstnlast(args, upstream, env),
        "sorted" => sorted(args, kwargs, upstream, env),
        "unique" => unique(args, upstream, env),
        "group_by" => group_by(args, upstream, env),
        "flatten" => flatten(upstream),
        "transpose" => transpose(upstream),
        "hide" => hide(args, upstream),
        "reduce_list" | "group" | "chain" => reduce_list(upstream),
        "yield_from" | "yield_all" => yield_from(args, upstream, env),
        "print" => print_passthrough(args, upstream, env),
        "islice" => islice(args, upstream, env),
        other => err_stream(EvalError::UnresolvedName(other.to_string())),
    }
}

fn err_stream<'a>(e: EvalError) -> RecordStream<'a> {
    Box::new(std::iter::once(Err(e)))
}

/// A stream whose contents are computed on the first pull. Used by the
/// materializing builtins so that building a pipeline stays cheap and
/// an unconsumed pipeline does no work.
fn deferred<'a>(
    thunk: impl FnOnce() -> Vec<Result<Record, EvalError>> + 'a,
) -> RecordStream<'a> {
    let mut thunk = Some(thunk);
    let mut items: Option<std::vec::IntoIter<Result<Record, EvalError>>> = None;
    Box::new(std::iter::from_fn(move || {
        if items.is_none() {
            items = thunk.take().map(|f| f().into_iter());
        }
        items.as_mut().and_then(|it| it.next())
    }))
}

/// Evaluate an argument to an integer count; anything that is not an
/// integer falls back to the default, like the original tool did.
fn arg_int(args: &[Expr], idx: usize, default: i64, env: &Environment) -> i64 {
    args.get(idx)
        .and_then(|expr| eval(expr, &Value::Null, env).ok())
        .and_then(|v| match v {
            Value::Integer(n) => Some(n),
            _ => None,
        })
        .unwrap_or(default)
}

fn first<'a>(args: &'a [Expr], upstream: RecordStream<'a>, env: &Environment) -> RecordStream<'a> {
    let n = arg_int(args, 0, 1, env).max(0) as usize;
    Box::new(upstream.take(n))
}

fn last<'a>(args: &'a [Expr], upstream: RecordStream<'a>, env: &Environment) -> RecordStream<'a> {
    let n = arg_int(args, 0, 1, env).max(0) as usize;
    deferred(move || {
        let mut ring: VecDeque<Record> = VecDeque::with_capacity(n);
        if n == 0 {
            return Vec::new();
        }
        for item in upstream {
            match item {
                Ok(rec) => {
                    if ring.len() == n {
                        ring.pop_front();
                    }
                    ring.push_back(rec);
                }
                Err(e) => return vec![Err(e)],
            }
        }
        ring.into_iter().map(Ok).collect()
    })
}

fn firstnlast<'a>(
    args: &'a [Expr],
    upstream: RecordStream<'a>,
    env: &Environment,
) -> RecordStream<'a> {
    let n = arg_int(args, 0, 1, env).max(0) as usize;
    deferred(move || {
        let mut head: Vec<Value> = Vec::with_capacity(n);
        let mut ring: VecDeque<Value> = VecDeque::with_capacity(n);
        for item in upstream {
            match item {
                Ok(rec) => {
                    if head.len() < n {
                        head.push(rec.value.clone());
                    }
                    if n > 0 {
                        if ring.len() == n {
                            ring.pop_front();
                        }
                        ring.push_back(rec.value);
                    }
                }
                Err(e) => return vec![Err(e)],
            }
        }
        let value = Value::Array(vec![
            Value::Array(head),
            Value::Array(ring.into_iter().collect()),
        ]);
        vec![Ok(Record::new(value))]
    })
}

fn sorted<'a>(
    args: &'a [Expr],
    kwargs: &'a [(String, Expr)],
    upstream: RecordStream<'a>,
    env: &'a Environment,
) -> RecordStream<'a> {
    deferred(move || {
        let records: Vec<Record> = match upstream.collect() {
            Ok(records) => records,
            Err(e) => return vec![Err(e)],
        };
        let mut keyed: Vec<(Value, Record)> = Vec::with_capacity(records.len());
        for rec in records {
            let key = match args.first() {
                Some(expr) => match eval(expr, &rec.value, env) {
                    Ok(v) => v,
                    Err(e) => return vec![Err(e)],
                },
                None => rec.value.clone(),
            };
            keyed.push((key, rec));
        }
        let reverse = kwargs
            .iter()
            .find(|(name, _)| name == "reverse")
            .and_then(|(_, expr)| eval(expr, &Value::Null, env).ok())
            .map(|v| v.as_bool())
            .unwrap_or(false);
        // Stable either way: equal keys keep their arrival order.
        if reverse {
            keyed.sort_by(|(a, _), (b, _)| compare_values(b, a));
        } else {
            keyed.sort_by(|(a, _), (b, _)| compare_values(a, b));
        }
        keyed.into_iter().map(|(_, rec)| Ok(rec)).collect()
    })
}

/// First record per distinct key, in order of first occurrence.
///
/// The dedupe key is a hash of the canonical compact-JSON representation
/// of the key value, not structural equality: values whose textual
/// forms differ (float formatting, key order) count as distinct even
/// when semantically equal. This matches the original engine.
fn unique<'a>(
    args: &'a [Expr],
    upstream: RecordStream<'a>,
    env: &'a Environment,
) -> RecordStream<'a> {
    let mut seen: HashSet<u64> = HashSet::new();
    Box::new(upstream.filter_map(move |item| match item {
        Ok(rec) => {
            let key = match args.first() {
                Some(expr) => match eval(expr, &rec.value, env) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(e)),
                },
                None => rec.value.clone(),
            };
            let mut hasher = DefaultHasher::new();
            key.repr().hash(&mut hasher);
            if seen.insert(hasher.finish()) {
                Some(Ok(rec))
            } else {
                None
            }
        }
        Err(e) => Some(Err(e)),
    }))
}

fn group_by<'a>(
    args: &'a [Expr],
    upstream: RecordStream<'a>,
    env: &'a Environment,
) -> RecordStream<'a> {
    deferred(move || {
        let key_expr = match args.first() {
            Some(expr) => expr,
            None => {
                return vec![Err(EvalError::Type(
                    "group_by requires a key expression".to_string(),
                ))];
            }
        };
        let mut groups: IndexMap<String, (Value, Vec<Value>)> = IndexMap::new();
        for item in upstream {
            let rec = match item {
                Ok(rec) => rec,
                Err(e) => return vec![Err(e)],
            };
            let key = match eval(key_expr, &rec.value, env) {
                Ok(v) => v,
                Err(e) => return vec![Err(e)],
            };
            groups
                .entry(key.repr())
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(rec.value);
        }
        groups
            .into_values()
            .map(|(key, items)| {
                let mut obj = IndexMap::new();
                obj.insert("key".to_string(), key);
                obj.insert("items".to_string(), Value::Array(items));
                Ok(Record::new(Value::Object(obj)))
            })
            .collect()
    })
}

fn flatten(upstream: RecordStream<'_>) -> RecordStream<'_> {
    Box::new(upstream.map(|item| {
        item.map(|rec| {
            let flat = match &rec.value {
                Value::Object(_) => {
                    let mut out = IndexMap::new();
                    flatten_into(&rec.value, "", &mut out);
                    Value::Object(out)
                }
                other => other.clone(),
            };
            rec.with_value(flat)
        })
    }))
}

/// Dotted-path flattening: nested object keys become `parent.child`,
/// list elements become `parent.<index>`. Scalar leaves pass through.
fn flatten_into(value: &Value, root: &str, out: &mut IndexMap<String, Value>) {
    match value {
        Value::Object(obj) => {
            for (key, val) in obj {
                let path = if root.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", root, key)
                };
                flatten_into(val, &path, out);
            }
        }
        Value::Array(arr) => {
            for (idx, val) in arr.iter().enumerate() {
                flatten_into(val, &format!("{}.{}", root, idx), out);
            }
        }
        leaf => {
            out.insert(root.to_string(), leaf.clone());
        }
    }
}

/// Columnar pivot: one output record per field of the input records,
/// each a single-key object mapping the field to the column of values.
fn transpose(upstream: RecordStream<'_>) -> RecordStream<'_> {
    deferred(move || {
        let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
        let mut rows = 0usize;
        for item in upstream {
            let rec = match item {
                Ok(rec) => rec,
                Err(e) => return vec![Err(e)],
            };
            let obj = match rec.value {
                Value::Object(obj) => obj,
                other => {
                    return vec![Err(EvalError::Type(format!(
                        "transpose() requires object records, got {}",
                        other.type_name()
                    )))];
                }
            };
            for (key, val) in obj {
                let column = columns.entry(key).or_insert_with(|| {
                    // field first seen now: backfill earlier rows
                    vec![Value::Null; rows]
                });
                column.push(val);
            }
            rows += 1;
            for column in columns.values_mut() {
                if column.len() < rows {
                    column.push(Value::Null);
                }
            }
        }
        columns
            .into_iter()
            .map(|(key, values)| {
                let mut obj = IndexMap::new();
                obj.insert(key, Value::Array(values));
                Ok(Record::new(Value::Object(obj)))
            })
            .collect()
    })
}

fn hide<'a>(args: &'a [Expr], upstream: RecordStream<'a>) -> RecordStream<'a> {
    let mut fields = Vec::with_capacity(args.len());
    for arg in args {
        match field_name(arg) {
            Some(name) => fields.push(name),
            None => {
                return err_stream(EvalError::Type(
                    "hide() arguments must be field names".to_string(),
                ));
            }
        }
    }
    Box::new(upstream.map(move |item| {
        item.map(|mut rec| {
            for field in &fields {
                rec.hide(field);
            }
            rec
        })
    }))
}

/// Accepts both quoted names (`hide("a")`) and bare field paths
/// (`hide(.a)`).
fn field_name(expr: &Expr) -> Option<String> {
    match (&expr.atom, expr.ops.as_slice()) {
        (Atom::Literal(Value::String(s)), []) => Some(s.clone()),
        (Atom::Record, [Op::Field(name)]) => Some(name.clone()),
        _ => None,
    }
}

fn reduce_list(upstream: RecordStream<'_>) -> RecordStream<'_> {
    deferred(move || {
        let records: Vec<Record> = match upstream.collect() {
            Ok(records) => records,
            Err(e) => return vec![Err(e)],
        };
        let values = records.into_iter().map(|rec| rec.value).collect();
        vec![Ok(Record::new(Value::Array(values)))]
    })
}

fn yield_from<'a>(
    args: &'a [Expr],
    upstream: RecordStream<'a>,
    env: &'a Environment,
) -> RecordStream<'a> {
    Box::new(upstream.flat_map(move |item| -> Vec<Result<Record, EvalError>> {
        let rec = match item {
            Ok(rec) => rec,
            Err(e) => return vec![Err(e)],
        };
        let expr = match args.first() {
            Some(expr) => expr,
            None => {
                return vec![Err(EvalError::Type(
                    "yield_from requires an expression".to_string(),
                ))];
            }
        };
        match eval(expr, &rec.value, env) {
            Ok(Value::Array(items)) => items.into_iter().map(|v| Ok(Record::new(v))).collect(),
            Ok(Value::Null) => Vec::new(),
            Ok(other) => vec![Err(EvalError::Type(format!(
                "yield_from expects an array, got {}",
                other.type_name()
            )))],
            Err(e) => vec![Err(e)],
        }
    }))
}

/// Write the first n records to stderr as compact JSON; pass the whole
/// stream through unchanged.
fn print_passthrough<'a>(
    args: &'a [Expr],
    upstream: RecordStream<'a>,
    env: &Environment,
) -> RecordStream<'a> {
    let n = arg_int(args, 0, 1, env).max(0) as usize;
    let mut shown = 0usize;
    Box::new(upstream.inspect(move |item| {
        if let Ok(rec) = item {
            if shown < n {
                shown += 1;
                eprintln!("{}", rec.visible_value().repr());
            }
        }
    }))
}

fn islice<'a>(args: &'a [Expr], upstream: RecordStream<'a>, env: &Environment) -> RecordStream<'a> {
    // islice(stop) | islice(start, stop) | islice(start, stop, step)
    let (start, stop) = if args.len() > 1 {
        (
            arg_int(args, 0, 0, env).max(0) as usize,
            arg_int(args, 1, 1, env).max(0) as usize,
        )
    } else {
        (0, arg_int(args, 0, 1, env).max(0) as usize)
    };
    let step = arg_int(args, 2, 1, env).max(1) as usize;
    if stop <= start {
        warn!("islice bounds select nothing (start {}, stop {})", start, stop);
        return Box::new(std::iter::empty());
    }
    Box::new(upstream.skip(start).take(stop - start).step_by(step))
}
