//! The pipeline executor.
//!
//! Threads a record stream through an ordered sequence of stages.
//! Execution is pull-based and lazy: `Map`/`Filter`/`Update` never hold
//! more than one record, `Function` stages buffer only what their
//! builtin's contract documents, and ceasing to pull from the output
//! iterator stops all upstream work, so `first(n)` never forces records
//! it does not need.
//!
//! An explicit worker-pool mode is opt-in: the prefix of per-record
//! stages before the first `Function` stage is dispatched chunk-wise to
//! a fixed rayon pool, and results are collected in submission order,
//! so output order equals input order in both modes. Function stages
//! always run single-threaded on the already-ordered result stream.

use log::debug;
use rayon::prelude::*;

use crate::ast::Stage;
use crate::builtins;
use crate::env::Environment;
use crate::evaluator::{eval, EvalError};
use crate::record::Record;
use crate::value::Value;

/// The stream type stages produce and consume.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, EvalError>> + 'a>;

/// How to drive the per-record stage prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Single-threaded, pull-based lazy evaluation (the default).
    Sequential,
    /// A fixed pool of n workers for the per-record stage prefix.
    /// `Workers(0)` and `Workers(1)` behave like `Sequential`.
    Workers(usize),
}

/// Records dispatched to the pool per round trip.
const POOL_CHUNK: usize = 256;

/// A compiled query bound to its evaluation environment.
pub struct Pipeline {
    stages: Vec<Stage>,
    env: Environment,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, env: Environment) -> Self {
        Pipeline { stages, env }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run the pipeline over a record source.
    ///
    /// The output is lazy; errors surface in-stream and the caller
    /// decides whether to abort. Output order is a deterministic
    /// function of input order in both concurrency modes.
    pub fn run<'a>(
        &'a self,
        records: impl Iterator<Item = Record> + 'a,
        concurrency: Concurrency,
    ) -> RecordStream<'a> {
        match concurrency {
            Concurrency::Workers(n) if n > 1 => self.run_pooled(records, n),
            _ => {
                let mut stream: RecordStream<'a> = Box::new(records.map(Ok));
                for stage in &self.stages {
                    stream = apply_stage(stage, stream, &self.env);
                }
                stream
            }
        }
    }

    fn run_pooled<'a>(
        &'a self,
        records: impl Iterator<Item = Record> + 'a,
        workers: usize,
    ) -> RecordStream<'a> {
        let boundary = self
            .stages
            .iter()
            .position(|s| matches!(s, Stage::Function { .. }))
            .unwrap_or(self.stages.len());
        let (prefix, rest) = self.stages.split_at(boundary);
        debug!(
            "pooled run: {} workers, {} pooled stages, {} downstream",
            workers,
            prefix.len(),
            rest.len()
        );

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => return Box::new(std::iter::once(Err(EvalError::Worker(e.to_string())))),
        };

        let mut stream: RecordStream<'a> = Box::new(PooledPrefix {
            records,
            pool,
            prefix,
            env: &self.env,
            buffered: Vec::new().into_iter(),
            done: false,
        });
        for stage in rest {
            stream = apply_stage(stage, stream, &self.env);
        }
        stream
    }
}

/// Apply one stage to a stream, lazily.
fn apply_stage<'a>(stage: &'a Stage, stream: RecordStream<'a>, env: &'a Environment) -> RecordStream<'a> {
    match stage {
        Stage::Map(expr) => Box::new(stream.map(move |item| {
            let rec = item?;
            let value = eval(expr, &rec.value, env)?;
            Ok(rec.with_value(value))
        })),
        Stage::Filter(expr) => Box::new(stream.filter_map(move |item| match item {
            Ok(rec) => match eval(expr, &rec.value, env) {
                Ok(v) => v.as_bool().then_some(Ok(rec)),
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        })),
        Stage::Update(expr) => Box::new(stream.map(move |item| {
            let rec = item?;
            let update = eval(expr, &rec.value, env)?;
            merge_update(rec, update)
        })),
        Stage::Function { name, args, kwargs } => builtins::apply(name, args, kwargs, stream, env),
    }
}

/// Merge an update mapping into a record: new keys added, existing keys
/// overwritten in place, nothing removed.
fn merge_update(rec: Record, update: Value) -> Result<Record, EvalError> {
    let pairs = match update {
        Value::Object(pairs) => pairs,
        other => {
            return Err(EvalError::Type(format!(
                "update stage must produce an object, got {}",
                other.type_name()
            )));
        }
    };
    let mut obj = match &rec.value {
        Value::Object(obj) => obj.clone(),
        other => {
            return Err(EvalError::Type(format!(
                "cannot update a {} record",
                other.type_name()
            )));
        }
    };
    for (key, value) in pairs {
        obj.insert(key, value);
    }
    Ok(rec.with_value(Value::Object(obj)))
}

/// Apply the pooled stage prefix to one record on a worker. `Ok(None)`
/// is the removed-by-filter sentinel.
fn apply_prefix(
    prefix: &[Stage],
    env: &Environment,
    mut rec: Record,
) -> Result<Option<Record>, EvalError> {
    for stage in prefix {
        match stage {
            Stage::Map(expr) => {
                let value = eval(expr, &rec.value, env)?;
                rec = rec.with_value(value);
            }
            Stage::Filter(expr) => {
                if !eval(expr, &rec.value, env)?.as_bool() {
                    return Ok(None);
                }
            }
            Stage::Update(expr) => {
                let update = eval(expr, &rec.value, env)?;
                rec = merge_update(rec, update)?;
            }
            // Function stages never enter the pooled prefix.
            Stage::Function { .. } => unreachable!("function stage in pooled prefix"),
        }
    }
    Ok(Some(rec))
}

/// Chunked worker-pool execution of the per-record stage prefix.
///
/// Pulls a fixed-size chunk from upstream, maps it on the pool, and
/// yields results in submission order. A worker error tears the run
/// down: the error is yielded once and the stream ends.
struct PooledPrefix<'a, I> {
    records: I,
    pool: rayon::ThreadPool,
    prefix: &'a [Stage],
    env: &'a Environment,
    buffered: std::vec::IntoIter<Result<Option<Record>, EvalError>>,
    done: bool,
}

impl<'a, I: Iterator<Item = Record>> Iterator for PooledPrefix<'a, I> {
    type Item = Result<Record, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            for item in self.buffered.by_ref() {
                match item {
                    Ok(Some(rec)) => return Some(Ok(rec)),
                    Ok(None) => continue, // removed by a pooled filter
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
            let chunk: Vec<Record> = self.records.by_ref().take(POOL_CHUNK).collect();
            if chunk.is_empty() {
                self.done = true;
                return None;
            }
            let prefix = self.prefix;
            let env = self.env;
            let results: Vec<Result<Option<Record>, EvalError>> = self.pool.install(|| {
                chunk
                    .into_par_iter()
                    .map(|rec| apply_prefix(prefix, env, rec))
                    .collect()
            });
            self.buffered = results.into_iter();
        }
    }
}
