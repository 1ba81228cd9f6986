#[cfg(test)]
mod tests {
    use sift_lang::output::{write_stream, OutputFormat, WriteOptions};
    use sift_lang::value::from_json;
    use sift_lang::{compile, Concurrency, Environment, EvalError, Pipeline, Record, Value};

    fn records(data: serde_json::Value) -> Vec<Record> {
        match data {
            serde_json::Value::Array(items) => {
                items.into_iter().map(|v| Record::new(from_json(v))).collect()
            }
            other => vec![Record::new(from_json(other))],
        }
    }

    fn run_to_string(query: &str, data: serde_json::Value, opts: WriteOptions) -> String {
        let compiled = compile(query).unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let mut out = Vec::new();
        write_stream(
            &mut out,
            pipeline.run(records(data).into_iter(), Concurrency::Sequential),
            opts,
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn jsonl_opts() -> WriteOptions {
        WriteOptions {
            format: OutputFormat::Jsonl,
            compact: true,
            raw: false,
        }
    }

    // ========================================================================
    // End-to-end pipelines
    // ========================================================================

    #[test]
    fn test_select_filter_limit() {
        let data = serde_json::json!([
            {"id": 50, "name": "low"},
            {"id": 150, "name": "mid"},
            {"id": 250, "name": "high"},
            {"id": 350, "name": "top"}
        ]);
        let out = run_to_string(
            "{id: .id, name: .name}, (.id > 100), first(2)",
            data,
            jsonl_opts(),
        );
        assert_eq!(
            out,
            "{\"id\":150,\"name\":\"mid\"}\n{\"id\":250,\"name\":\"high\"}\n"
        );
    }

    #[test]
    fn test_multiline_query_runs_like_single_line() {
        let data = serde_json::json!([{"a": 2, "b": 3}]);
        let single = run_to_string("{sum: .a + .b}", data.clone(), jsonl_opts());
        let multi = run_to_string("{sum:\n    .a + .b}", data, jsonl_opts());
        assert_eq!(single, multi);
    }

    #[test]
    fn test_output_preserves_key_order() {
        let data = serde_json::json!([{"zebra": 1, "alpha": 2}]);
        let out = run_to_string("", data, jsonl_opts());
        assert_eq!(out, "{\"zebra\":1,\"alpha\":2}\n");
    }

    #[test]
    fn test_hidden_fields_are_excluded_from_output_only() {
        let data = serde_json::json!([{"a": 1, "id": 1}, {"a": 2, "id": 3}]);
        let out = run_to_string("hide('a')", data, jsonl_opts());
        assert_eq!(out, "{\"id\":1}\n{\"id\":3}\n");
    }

    #[test]
    fn test_hidden_fields_stay_readable_downstream() {
        // hide early, still filter on the hidden field afterwards
        let data = serde_json::json!([{"a": 1, "id": 1}, {"a": 2, "id": 3}]);
        let out = run_to_string("hide('a'), (.a > 1)", data, jsonl_opts());
        assert_eq!(out, "{\"id\":3}\n");
    }

    #[test]
    fn test_raw_string_output() {
        let data = serde_json::json!([{"name": "zap"}]);
        let opts = WriteOptions {
            format: OutputFormat::Json,
            compact: true,
            raw: true,
        };
        assert_eq!(run_to_string(".name", data, opts), "zap\n");
    }

    #[test]
    fn test_now_macro_produces_utc_timestamp() {
        let data = serde_json::json!([{"id": 1}]);
        let out = run_to_string("{t: NOW()}", data, jsonl_opts());
        // RFC 3339 with a UTC offset
        assert!(out.contains("+00:00"), "got: {}", out);
    }

    // ========================================================================
    // Environment: bindings and named functions
    // ========================================================================

    #[test]
    fn test_custom_binding() {
        let mut env = Environment::with_defaults();
        env.bind(
            "config",
            from_json(serde_json::json!({"threshold": 100})),
        );

        let compiled = compile("(.id > config.threshold)").unwrap();
        let pipeline = Pipeline::new(compiled.stages, env);
        let out: Vec<Value> = pipeline
            .run(
                records(serde_json::json!([{"id": 99}, {"id": 199}])).into_iter(),
                Concurrency::Sequential,
            )
            .map(|item| item.unwrap().value)
            .collect();
        assert_eq!(out, vec![from_json(serde_json::json!({"id": 199}))]);
    }

    #[test]
    fn test_user_registered_function() {
        let mut env = Environment::with_defaults();
        env.register("double", |v| match v {
            Value::Integer(n) => Ok(Value::Integer(n * 2)),
            other => Err(EvalError::Type(format!(
                "double() requires integer, got {}",
                other.type_name()
            ))),
        });

        let compiled = compile("double(.a)").unwrap();
        let pipeline = Pipeline::new(compiled.stages, env);
        let out: Vec<Value> = pipeline
            .run(
                records(serde_json::json!([{"a": 21}])).into_iter(),
                Concurrency::Sequential,
            )
            .map(|item| item.unwrap().value)
            .collect();
        assert_eq!(out, vec![Value::Integer(42)]);
    }

    #[test]
    fn test_unresolved_function_is_fatal_at_first_use() {
        let compiled = compile("no_such_fn(.a)").unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let result: Result<Vec<Record>, EvalError> = pipeline
            .run(
                records(serde_json::json!([{"a": 1}])).into_iter(),
                Concurrency::Sequential,
            )
            .collect();
        assert!(matches!(result, Err(EvalError::UnresolvedName(name)) if name == "no_such_fn"));
    }

    #[test]
    fn test_len_and_str_builtins() {
        let data = serde_json::json!([{"name": "abcde", "id": 7}]);
        let out = run_to_string("{n: len(.name), id: str(.id)}", data, jsonl_opts());
        assert_eq!(out, "{\"n\":5,\"id\":\"7\"}\n");
    }

    // ========================================================================
    // Reserved field names
    // ========================================================================

    #[test]
    fn test_reserved_field_name_round_trips() {
        // a record whose field is literally named like a builtin
        let data = serde_json::json!([{"first": 5, "id": 1}]);
        let out = run_to_string(".first", data, jsonl_opts());
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_reserved_name_restored_in_error_message() {
        let err = compile(".sorted + ").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("x.sorted"), "got: {}", rendered);
        assert!(!rendered.contains("SIFTESC"), "got: {}", rendered);
    }

    // ========================================================================
    // Fatal syntax errors
    // ========================================================================

    #[test]
    fn test_unbalanced_brace_fails_before_processing() {
        let err = compile("{id: .a, data: .b.d").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("syntax error"));
        // the caret line is present
        assert!(rendered.lines().count() >= 3, "got: {}", rendered);
    }

    #[test]
    fn test_malformed_expression_has_span() {
        let err = compile(".a + + 1").unwrap_err();
        assert!(err.span.start > 0);
    }

    // ========================================================================
    // Output formats
    // ========================================================================

    #[test]
    fn test_pretty_json_output() {
        let data = serde_json::json!([{"a": 1}]);
        let opts = WriteOptions {
            format: OutputFormat::Json,
            compact: false,
            raw: false,
        };
        let out = run_to_string("", data, opts);
        assert_eq!(out, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn test_csv_output_from_records() {
        let data = serde_json::json!([
            {"name": "alpha", "n": 1},
            {"name": "beta", "n": 2}
        ]);
        let opts = WriteOptions {
            format: OutputFormat::Csv,
            compact: false,
            raw: false,
        };
        let out = run_to_string("", data, opts);
        assert_eq!(out, "name,n\nalpha,1\nbeta,2\n");
    }

    #[test]
    fn test_yaml_output() {
        let data = serde_json::json!([{"a": 1}]);
        let opts = WriteOptions {
            format: OutputFormat::Yaml,
            compact: false,
            raw: false,
        };
        let out = run_to_string("", data, opts);
        assert_eq!(out, "---\na: 1\n");
    }

    // ========================================================================
    // Combined pipelines
    // ========================================================================

    #[test]
    fn test_group_then_reshape() {
        let data = serde_json::json!([
            {"item": "a", "v": 1},
            {"item": "b", "v": 2},
            {"item": "a", "v": 3}
        ]);
        let out = run_to_string(
            "group_by(.item), {item: .key, count: len(.items)}",
            data,
            jsonl_opts(),
        );
        assert_eq!(
            out,
            "{\"item\":\"a\",\"count\":2}\n{\"item\":\"b\",\"count\":1}\n"
        );
    }

    #[test]
    fn test_flatten_then_filter() {
        let data = serde_json::json!([
            {"meta": {"score": 10}},
            {"meta": {"score": 99}}
        ]);
        let out = run_to_string(
            "flatten(), (x[\"meta.score\"] > 50)",
            data,
            jsonl_opts(),
        );
        assert_eq!(out, "{\"meta.score\":99}\n");
    }
}
