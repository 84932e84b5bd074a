//! Transformation Executor
//!
//! Runs one snippet against a dataset: validate, make sure the engine is ready, marshal the
//! table in under `df` (plus an untouched `original_df`), run, check that `df` is still a table,
//! marshal it back. The input dataset is never touched; the engine works on its own copy.

use crate::config::{ORIGINAL_BINDING, TABLE_BINDING};
use crate::dataset::Dataset;
use crate::engine::{Scope, Value};
use crate::error::TransformFailure;
use crate::marshal;
use crate::runtime::EngineRuntime;
use crate::validator;

/// Outcome of [`apply`].
pub type ExecutionResult = Result<Dataset, TransformFailure>;

const BINDING_LOST: &str = "transformation must preserve the table binding";

/// Run `snippet` against `dataset` and return the transformed table.
pub async fn apply(runtime: &EngineRuntime, snippet: &str, dataset: &Dataset) -> ExecutionResult {
    validator::check(snippet).map_err(|r| TransformFailure::InvalidSnippet(r.to_string()))?;

    if dataset.is_empty() {
        return Err(TransformFailure::NoData);
    }

    if !runtime.ensure_ready().await {
        let reason = runtime
            .last_error()
            .unwrap_or_else(|| "engine bootstrap failed".to_string());
        return Err(TransformFailure::EngineUnavailable(reason));
    }
    let engine = runtime
        .acquire()
        .ok_or_else(|| TransformFailure::EngineUnavailable("engine is not loaded".to_string()))?;

    let table = marshal::to_engine(dataset)?;
    let source = snippet.to_string();
    log::debug!("Applying snippet to {} rows: {}", dataset.len(), source);

    let outcome = tokio::task::spawn_blocking(move || {
        let mut scope = Scope::new();
        scope.bind(ORIGINAL_BINDING, Value::Frame(table.clone()));
        scope.bind(TABLE_BINDING, Value::Frame(table));
        engine
            .run(&source, &mut scope)
            .map(|()| scope.take(TABLE_BINDING))
    })
    .await
    .map_err(|e| TransformFailure::ExecutionError(format!("engine task failed: {}", e)))?;

    let binding = outcome.map_err(|e| {
        log::warn!("Snippet raised: {}", e);
        TransformFailure::ExecutionError(clean_message(&e.traceback()))
    })?;

    match binding {
        Some(Value::Frame(frame)) => {
            let result = marshal::from_engine(&frame)?;
            log::info!("Transformation produced {} rows", result.len());
            Ok(result)
        }
        Some(other) => {
            log::warn!("'{}' was rebound to a {}", TABLE_BINDING, other.type_name());
            Err(TransformFailure::ContractViolation(BINDING_LOST.to_string()))
        }
        None => Err(TransformFailure::ContractViolation(BINDING_LOST.to_string())),
    }
}

/// Final diagnostic line of an error report, without traceback framing.
pub fn clean_message(raw: &str) -> String {
    raw.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, Row};
    use crate::error::ErrorKind;
    use crate::runtime::EngineState;

    fn people() -> Dataset {
        Dataset::from_rows(vec![
            Row::from_iter([("name", Cell::from("Bob")), ("age", Cell::from("30"))]),
            Row::from_iter([("name", Cell::from("Amy")), ("age", Cell::from(""))]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_drop_rows_with_empty_age() {
        let runtime = EngineRuntime::default();
        let out = apply(&runtime, "df = df.dropna(subset=['age'])", &people())
            .await
            .unwrap();
        let expected = Dataset::from_rows(vec![Row::from_iter([
            ("name", Cell::from("Bob")),
            ("age", Cell::Number(30.0)),
        ])])
        .unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_rejected_snippet_never_reaches_engine() {
        let runtime = EngineRuntime::default();
        for snippet in ["import os\ndf = df", "", "df = df.to_csv('x')", "df = eval('1')"] {
            let err = apply(&runtime, snippet, &people()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSnippet, "{:?}", snippet);
        }
        assert_eq!(runtime.state(), EngineState::Uninitialized);
        assert_eq!(runtime.bootstrap_attempts(), 0);
        assert_eq!(runtime.executions(), 0);
    }

    #[tokio::test]
    async fn test_deleting_the_table_is_a_contract_violation() {
        let runtime = EngineRuntime::default();
        let err = apply(&runtime, "del df", &people()).await;
        // `del df` has no table operation, so it is rejected before it reaches the engine
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidSnippet);

        let err = apply(&runtime, "df['age'] = df['age']\ndel df", &people())
            .await
            .unwrap_err();
        assert_eq!(err, TransformFailure::ContractViolation(BINDING_LOST.to_string()));
    }

    #[tokio::test]
    async fn test_rebinding_to_a_series_is_a_contract_violation() {
        let runtime = EngineRuntime::default();
        let err = apply(&runtime, "df = df['name']", &people()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[tokio::test]
    async fn test_engine_error_is_cleaned() {
        let runtime = EngineRuntime::default();
        let err = apply(&runtime, "df = df.drop(columns=['salary'])", &people())
            .await
            .unwrap_err();
        match err {
            TransformFailure::ExecutionError(message) => {
                assert!(message.starts_with("KeyError"), "{}", message);
                assert!(!message.contains("Traceback"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deep_nesting_is_an_execution_error() {
        let runtime = EngineRuntime::default();
        let snippet = format!("df = df[{}1{}]", "(".repeat(500), ")".repeat(500));
        assert!(validator::validate(&snippet));
        let err = apply(&runtime, &snippet, &people()).await.unwrap_err();
        match err {
            TransformFailure::ExecutionError(message) => {
                assert!(message.starts_with("SyntaxError"), "{}", message)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_string_conversion_keeps_missing_values() {
        let runtime = EngineRuntime::default();
        let out = apply(&runtime, "df['age'] = df['age'].astype(str)", &people())
            .await
            .unwrap();
        assert_eq!(out.cell(0, "age"), Some(&Cell::from("30")));
        assert_eq!(out.cell(1, "age"), Some(&Cell::Null));
        assert_eq!(crate::export::export_csv(&out).unwrap(), "name,age\nBob,30\nAmy,\n");
    }

    #[tokio::test]
    async fn test_input_is_never_mutated() {
        let runtime = EngineRuntime::default();
        let data = people();
        let before = data.clone();
        apply(&runtime, "df['name'] = df['name'].str.upper()", &data).await.unwrap();
        assert_eq!(data, before);
        let _ = apply(&runtime, "df = df['missing']", &data).await;
        assert_eq!(data, before);
    }

    #[tokio::test]
    async fn test_empty_dataset_is_no_data() {
        let runtime = EngineRuntime::default();
        let err = apply(&runtime, "df = df.dropna()", &Dataset::new()).await.unwrap_err();
        assert_eq!(err, TransformFailure::NoData);
        assert_eq!(runtime.bootstrap_attempts(), 0);
    }

    #[test]
    fn test_clean_message() {
        let raw = "Traceback (most recent call last):\n  File \"<snippet>\", line 1\nKeyError: 'x'\n";
        assert_eq!(clean_message(raw), "KeyError: 'x'");
        assert_eq!(clean_message(""), "unknown error");
    }
}
