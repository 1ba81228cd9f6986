#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

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

    fn run(query: &str, data: serde_json::Value) -> Vec<Value> {
        run_with(query, data, Concurrency::Sequential)
    }

    fn run_with(query: &str, data: serde_json::Value, concurrency: Concurrency) -> Vec<Value> {
        let compiled = compile(query).unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        pipeline
            .run(records(data).into_iter(), concurrency)
            .map(|item| item.unwrap().value)
            .collect()
    }

    fn run_err(query: &str, data: serde_json::Value) -> EvalError {
        let compiled = compile(query).unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let err = pipeline
            .run(records(data).into_iter(), Concurrency::Sequential)
            .find_map(|item| item.err())
            .expect("expected an evaluation error");
        err
    }

    fn json(v: serde_json::Value) -> Value {
        from_json(v)
    }

    // ========================================================================
    // Core stage semantics
    // ========================================================================

    #[test]
    fn test_map_extracts_values() {
        let out = run(".a", serde_json::json!([{"a": 1}, {"a": 2}]));
        assert_eq!(out, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_field_path_chaining() {
        let out = run(
            ".a.b[4]",
            serde_json::json!([{"a": {"b": [1, 2, 3, 4, 5, 6]}}]),
        );
        assert_eq!(out, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_map_reshapes_records() {
        let out = run("{id: .a, twice: .a * 2}", serde_json::json!([{"a": 3}]));
        assert_eq!(out, vec![json(serde_json::json!({"id": 3, "twice": 6}))]);
    }

    #[test]
    fn test_filter_is_a_pure_predicate() {
        let out = run("(.id > 100)", serde_json::json!([{"id": 99}, {"id": 199}]));
        assert_eq!(out, vec![json(serde_json::json!({"id": 199}))]);
    }

    #[test]
    fn test_update_never_removes_keys() {
        let out = run("{b: .a + 1, ...}", serde_json::json!([{"a": 1}]));
        assert_eq!(out, vec![json(serde_json::json!({"a": 1, "b": 2}))]);
    }

    #[test]
    fn test_update_overwrites_existing_keys_in_place() {
        let out = run("{a: .a + 10, ...}", serde_json::json!([{"a": 1, "z": 0}]));
        assert_eq!(out, vec![json(serde_json::json!({"a": 11, "z": 0}))]);
    }

    #[test]
    fn test_empty_query_is_identity() {
        let data = serde_json::json!([{"a": 1}, {"a": 2}]);
        let out = run("", data.clone());
        assert_eq!(out, records(data).into_iter().map(|r| r.value).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_field_maps_to_null() {
        let out = run(".nope", serde_json::json!([{"a": 1}]));
        assert_eq!(out, vec![Value::Null]);
    }

    #[test]
    fn test_arithmetic_on_null_is_fatal() {
        let err = run_err(".missing + 1", serde_json::json!([{"a": 1}]));
        assert!(matches!(err, EvalError::NullOperand(_)));
    }

    // ========================================================================
    // Bounded builtins: first / last / firstnlast / islice
    // ========================================================================

    #[test]
    fn test_first_and_last_bounds() {
        let data = serde_json::json!([1, 2, 3, 4, 5]);
        assert_eq!(
            run("first(2)", data.clone()),
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            run("last(2)", data.clone()),
            vec![Value::Integer(4), Value::Integer(5)]
        );
        assert_eq!(run("first()", data), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_first_does_not_force_the_tail() {
        // Pull-based cancellation: first(2) must stop upstream work.
        let pulled = Rc::new(Cell::new(0usize));
        let counter = pulled.clone();
        let source = (0..1000).map(move |i| {
            counter.set(counter.get() + 1);
            Record::new(Value::Integer(i))
        });

        let compiled = compile("first(2)").unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let out: Vec<_> = pipeline
            .run(source, Concurrency::Sequential)
            .map(|item| item.unwrap().value)
            .collect();

        assert_eq!(out.len(), 2);
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn test_firstnlast() {
        let out = run("firstnlast(2)", serde_json::json!([1, 2, 3, 4, 5]));
        assert_eq!(out, vec![json(serde_json::json!([[1, 2], [4, 5]]))]);
    }

    #[test]
    fn test_islice_bounds() {
        let data = serde_json::json!([0, 1, 2, 3, 4, 5]);
        assert_eq!(
            run("islice(2)", data.clone()),
            vec![Value::Integer(0), Value::Integer(1)]
        );
        assert_eq!(
            run("islice(1, 3)", data),
            vec![Value::Integer(1), Value::Integer(2)]
        );
    }

    // ========================================================================
    // Materializing builtins: sorted / group_by / transpose / reduce_list
    // ========================================================================

    #[test]
    fn test_sorted_by_key() {
        let out = run(
            "sorted(.a)",
            serde_json::json!([{"id": 99, "a": 2}, {"id": 1, "a": 1}]),
        );
        assert_eq!(
            out,
            vec![
                json(serde_json::json!({"id": 1, "a": 1})),
                json(serde_json::json!({"id": 99, "a": 2})),
            ]
        );
    }

    #[test]
    fn test_sorted_reverse_kwarg() {
        let out = run(
            "sorted(.a, reverse=true)",
            serde_json::json!([{"a": 1}, {"a": 2}]),
        );
        assert_eq!(
            out,
            vec![
                json(serde_json::json!({"a": 2})),
                json(serde_json::json!({"a": 1})),
            ]
        );
    }

    #[test]
    fn test_sorted_is_stable() {
        // equal keys keep arrival order, in both directions
        let data = serde_json::json!([
            {"k": 1, "pos": 0}, {"k": 0, "pos": 1}, {"k": 1, "pos": 2}, {"k": 0, "pos": 3}
        ]);
        let out = run("sorted(.k), .pos", data.clone());
        assert_eq!(
            out,
            vec![
                Value::Integer(1),
                Value::Integer(3),
                Value::Integer(0),
                Value::Integer(2)
            ]
        );
        let out = run("sorted(.k, reverse=true), .pos", data);
        assert_eq!(
            out,
            vec![
                Value::Integer(0),
                Value::Integer(2),
                Value::Integer(1),
                Value::Integer(3)
            ]
        );
    }

    #[test]
    fn test_group_by_preserves_first_seen_order() {
        let out = run(
            "group_by(.item)",
            serde_json::json!([{"item": "1"}, {"item": "2"}, {"item": "1"}]),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            json(serde_json::json!({
                "key": "1",
                "items": [{"item": "1"}, {"item": "1"}]
            }))
        );
        assert_eq!(
            out[1],
            json(serde_json::json!({"key": "2", "items": [{"item": "2"}]}))
        );
    }

    #[test]
    fn test_transpose_pivots_columns() {
        let out = run(
            "transpose()",
            serde_json::json!([{"a": 1, "b": 2}, {"a": 2, "b": 3}]),
        );
        assert_eq!(
            out,
            vec![
                json(serde_json::json!({"a": [1, 2]})),
                json(serde_json::json!({"b": [2, 3]})),
            ]
        );
    }

    #[test]
    fn test_transpose_backfills_missing_fields() {
        let out = run(
            "transpose()",
            serde_json::json!([{"a": 1}, {"a": 2, "b": 3}]),
        );
        assert_eq!(
            out,
            vec![
                json(serde_json::json!({"a": [1, 2]})),
                json(serde_json::json!({"b": [null, 3]})),
            ]
        );
    }

    #[test]
    fn test_reduce_list_collects_stream() {
        let out = run("reduce_list()", serde_json::json!([1, 2, 3]));
        assert_eq!(out, vec![json(serde_json::json!([1, 2, 3]))]);
    }

    // ========================================================================
    // unique / flatten / yield_from / hide / print
    // ========================================================================

    #[test]
    fn test_unique_keeps_first_occurrence() {
        let out = run(
            "unique(.b)",
            serde_json::json!([
                {"a": 5, "b": 123}, {"a": 4, "b": 120}, {"a": 2, "b": 120}
            ]),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], json(serde_json::json!({"a": 5, "b": 123})));
        assert_eq!(out[1], json(serde_json::json!({"a": 4, "b": 120})));
    }

    #[test]
    fn test_unique_key_is_representational_not_structural() {
        // 1 and 1.0 are equal values but have different canonical forms,
        // so they count as distinct keys.
        let out = run(
            "unique(.a)",
            serde_json::json!([{"a": 1}, {"a": 1.0}, {"a": 1}]),
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_unique_without_key_dedupes_whole_records() {
        let out = run(
            "unique()",
            serde_json::json!([{"a": 1}, {"a": 1}, {"a": 2}]),
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_flatten_nested_objects() {
        let out = run("flatten()", serde_json::json!([{"a": 1, "b": {"c": 2}}]));
        assert_eq!(out, vec![json(serde_json::json!({"a": 1, "b.c": 2}))]);
    }

    #[test]
    fn test_flatten_lists_by_index() {
        let out = run("flatten()", serde_json::json!([{"a": 1, "b": [1, 2]}]));
        assert_eq!(
            out,
            vec![json(serde_json::json!({"a": 1, "b.0": 1, "b.1": 2}))]
        );
    }

    #[test]
    fn test_yield_from_flattens_one_level() {
        let out = run("yield_from(.data)", serde_json::json!([{"data": [1, 2, 3]}]));
        assert_eq!(
            out,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn test_hide_marks_without_deleting() {
        let compiled = compile("hide('a')").unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let out: Vec<Record> = pipeline
            .run(
                records(serde_json::json!([{"a": 1, "id": 1}])).into_iter(),
                Concurrency::Sequential,
            )
            .map(|item| item.unwrap())
            .collect();

        // value untouched, mask set, visible value filtered
        assert_eq!(out[0].value, json(serde_json::json!({"a": 1, "id": 1})));
        assert!(out[0].hidden.contains("a"));
        assert_eq!(out[0].visible_value(), json(serde_json::json!({"id": 1})));
    }

    #[test]
    fn test_hide_accepts_bare_field_paths() {
        let compiled = compile("hide(.a)").unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let out: Vec<Record> = pipeline
            .run(
                records(serde_json::json!([{"a": 1}])).into_iter(),
                Concurrency::Sequential,
            )
            .map(|item| item.unwrap())
            .collect();
        assert!(out[0].hidden.contains("a"));
    }

    #[test]
    fn test_print_passes_records_through() {
        let out = run("print(2)", serde_json::json!([1, 2, 3, 4]));
        assert_eq!(out.len(), 4);
    }

    // ========================================================================
    // Pooled execution
    // ========================================================================

    #[test]
    fn test_pooled_output_equals_sequential() {
        let data: Vec<serde_json::Value> = (0..1000)
            .map(|i| serde_json::json!({"id": i, "group": i % 7}))
            .collect();
        let data = serde_json::Value::Array(data);
        let query = "{id: .id, bucket: .group * 10, ...}, (.id > 100), .bucket";

        let sequential = run(query, data.clone());
        let pooled = run_with(query, data, Concurrency::Workers(4));
        assert_eq!(sequential.len(), pooled.len());
        assert_eq!(sequential, pooled);
    }

    #[test]
    fn test_pooled_with_downstream_function_stage() {
        let data: Vec<serde_json::Value> =
            (0..500).map(|i| serde_json::json!({"id": i})).collect();
        let data = serde_json::Value::Array(data);
        let query = "(.id > 9), .id, first(5)";

        assert_eq!(
            run_with(query, data.clone(), Concurrency::Workers(4)),
            run(query, data)
        );
    }

    #[test]
    fn test_worker_error_surfaces() {
        let data: Vec<serde_json::Value> =
            (0..300).map(|i| serde_json::json!({"id": i})).collect();
        let compiled = compile(".missing + 1").unwrap();
        let pipeline = Pipeline::new(compiled.stages, Environment::with_defaults());
        let result: Result<Vec<Record>, EvalError> = pipeline
            .run(
                records(serde_json::Value::Array(data)).into_iter(),
                Concurrency::Workers(4),
            )
            .collect();
        assert!(matches!(result, Err(EvalError::NullOperand(_))));
    }
}
