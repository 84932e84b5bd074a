//! Sandboxed dataframe engine.
//!
//! Snippets are written in the pandas-flavoured Python subset models emit
//! (`df = df.dropna()`, `df = df[df['age'] > 30]`, ...). They are tokenized, parsed into a
//! small statement tree and evaluated against a column-major table library.
//!
//! The engine is the capability boundary of the editor. The only names a snippet resolves are
//! its own bindings, the `pd`/`np` namespaces and a few pure builtins. There is no import,
//! loop, function definition, filesystem, network or process access whatever the snippet
//! contains, and every run is bounded by [`ExecutionLimits`].
//!
//! ```text
//! source ──▶ lexer ──▶ parser ──▶ Vec<Statement> ──▶ Interpreter ──▶ Scope
//!                                                       │
//!                                         methods / indexing / ops / namespace
//!                                                       │
//!                                                 frame (Frame, Series, GroupBy)
//! ```

mod args;
pub mod ast;
mod datetime;
mod error;
pub mod frame;
mod indexing;
mod interpreter;
mod lexer;
mod methods;
mod namespace;
mod ops;
mod parser;
mod strings;
pub mod value;

use std::collections::HashMap;
use std::time::Duration;

pub use error::{EngineError, EngineResult, ExceptionKind};
pub use frame::{Frame, Index, Series};
pub use interpreter::Interpreter;
pub use parser::{parse_expression, parse_program};
pub use value::{Scalar, Value};

/// Deepest expression nesting the parser accepts and the interpreter evaluates.
pub const MAX_NESTING: usize = 64;

/// Bounds on a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Evaluation steps across the whole run.
    pub max_steps: u64,
    /// Largest number of cells any single value may hold.
    pub max_cells: usize,
    /// Wall-clock limit for the run.
    pub timeout: Duration,
    /// Longest snippet accepted, in bytes.
    pub max_source_len: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_cells: 5_000_000,
            timeout: Duration::from_secs(5),
            max_source_len: 10_000,
        }
    }
}

/// Bindings of one run (`df`, `original_df` and whatever the snippet assigns).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Move a binding out of the scope.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.remove(name)
    }
}

/// A ready-to-run engine: the global namespace plus the limits applied to every run.
#[derive(Debug, Clone)]
pub struct Engine {
    globals: HashMap<String, Value>,
    limits: ExecutionLimits,
}

impl Engine {
    /// An engine with no globals at all.
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            globals: HashMap::new(),
            limits,
        }
    }

    /// An engine with `pd`, `np` and the builtins installed.
    pub fn with_standard_library(limits: ExecutionLimits) -> Self {
        let mut engine = Self::new(limits);
        namespace::install(&mut engine.globals);
        engine
    }

    /// Add a read-only global.
    pub fn register(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    fn check_length(&self, source: &str) -> EngineResult<()> {
        if source.len() > self.limits.max_source_len {
            return Err(EngineError::budget(format!(
                "snippet of {} bytes exceeds the limit of {}",
                source.len(),
                self.limits.max_source_len
            )));
        }
        Ok(())
    }

    /// Parse and run `source` against `scope`.
    pub fn run(&self, source: &str, scope: &mut Scope) -> EngineResult<()> {
        self.check_length(source)?;
        let program = parse_program(source)?;
        let mut interpreter = Interpreter::new(&self.globals, scope, &self.limits);
        let outcome = interpreter.run(&program);
        log::debug!(
            "snippet finished after {} steps ({} statements)",
            interpreter.budget().steps(),
            program.len()
        );
        outcome
    }

    /// Evaluate a single expression against `scope`.
    pub fn eval(&self, source: &str, scope: &mut Scope) -> EngineResult<Value> {
        self.check_length(source)?;
        let expr = parse_expression(source)?;
        Interpreter::new(&self.globals, scope, &self.limits).evaluate(&expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Scalar {
        Scalar::str(v)
    }

    fn people() -> Frame {
        Frame::from_columns(vec![
            ("name".into(), vec![s("Bob"), s("Amy"), s("Cid"), s("Dee")]),
            ("age".into(), vec![Scalar::Int(30), Scalar::Null, Scalar::Int(25), Scalar::Int(41)]),
            ("city".into(), vec![s("NYC"), s("LA"), s("NYC"), s("LA")]),
        ])
        .unwrap()
    }

    fn run(source: &str) -> EngineResult<Frame> {
        let engine = Engine::with_standard_library(ExecutionLimits::default());
        let mut scope = Scope::new();
        scope.bind("df", Value::Frame(people()));
        engine.run(source, &mut scope)?;
        match scope.take("df") {
            Some(Value::Frame(frame)) => Ok(frame),
            other => panic!("df is not a frame: {:?}", other),
        }
    }

    #[test]
    fn test_dropna_subset() {
        let out = run("df = df.dropna(subset=['age'])").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.column("name").unwrap(), &[s("Bob"), s("Cid"), s("Dee")]);
    }

    #[test]
    fn test_boolean_filter_and_reset() {
        let out = run("df = df[(df['age'] > 26) & (df['city'] == 'NYC')].reset_index(drop=True)").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.column("name").unwrap(), &[s("Bob")]);
    }

    #[test]
    fn test_column_assignment_and_string_accessor() {
        let out = run("df['name'] = df['name'].str.upper()\ndf['age2'] = df['age'] * 2").unwrap();
        assert_eq!(out.column("name").unwrap()[0], s("BOB"));
        assert_eq!(out.column("age2").unwrap()[0], Scalar::Int(60));
        assert_eq!(out.column("age2").unwrap()[1], Scalar::Null);
    }

    #[test]
    fn test_groupby_sum_as_frame() {
        let out = run("df = df.groupby('city', as_index=False)['age'].sum()").unwrap();
        let names: Vec<&str> = out.column_names().collect();
        assert_eq!(names, vec!["city", "age"]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_query_with_and() {
        let out = run("df = df.query(\"age > 26 and city == 'LA'\")").unwrap();
        assert_eq!(out.column("name").unwrap(), &[s("Dee")]);
    }

    #[test]
    fn test_loc_assignment_creates_column() {
        let out = run("df.loc[df['age'] > 28, 'band'] = 'senior'").unwrap();
        assert_eq!(out.column("band").unwrap(), &[s("senior"), Scalar::Null, Scalar::Null, s("senior")]);
    }

    #[test]
    fn test_inplace_method() {
        let out = run("df.dropna(inplace=True)").unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_sort_and_rename() {
        let out = run("df = df.sort_values('age', ascending=False).rename(columns={'name': 'who'})").unwrap();
        assert!(out.has_column("who"));
        assert_eq!(out.column("who").unwrap()[0], s("Dee"));
        // missing values sort last
        assert_eq!(out.column("who").unwrap()[3], s("Amy"));
    }

    #[test]
    fn test_imports_and_loops_are_syntax_errors() {
        for source in ["import os", "for x in df: pass", "while True: pass", "f = lambda x: x"] {
            let err = run(source).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::SyntaxError, "{}", source);
        }
    }

    #[test]
    fn test_unknown_names_are_not_resolved() {
        let err = run("open('secrets.txt')").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NameError);
        let err = run("df = df.__class__").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::AttributeError);
    }

    #[test]
    fn test_step_budget() {
        let limits = ExecutionLimits {
            max_steps: 10,
            ..ExecutionLimits::default()
        };
        let engine = Engine::with_standard_library(limits);
        let mut scope = Scope::new();
        let err = engine
            .run("x = 1 + 2 + 3 + 4 + 5 + 6 + 7 + 8 + 9 + 10 + 11 + 12", &mut scope)
            .unwrap_err();
        assert_eq!(err.kind, ExceptionKind::BudgetExceeded);
    }

    #[test]
    fn test_cell_budget() {
        let limits = ExecutionLimits {
            max_cells: 100,
            ..ExecutionLimits::default()
        };
        let engine = Engine::with_standard_library(limits);
        let mut scope = Scope::new();
        let err = engine.run("x = [0] * 1000", &mut scope).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::BudgetExceeded);
    }

    #[test]
    fn test_deeply_nested_snippet_is_rejected() {
        let source = format!("df = df[{}1{}]", "(".repeat(2_000), ")".repeat(2_000));
        let err = run(&source).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::SyntaxError);
    }

    #[test]
    fn test_oversized_snippet_is_rejected() {
        let source = format!("df = df[{}1{}]", "(".repeat(10_000), ")".repeat(10_000));
        let err = run(&source).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::BudgetExceeded);
        assert!(err.message.contains("exceeds the limit"), "{}", err.message);
    }

    #[test]
    fn test_evaluation_depth_is_bounded() {
        // each operator chain stays under the parse limit, together they do not
        let source = format!("x = 1{}{}", " * 1".repeat(40), " + 1".repeat(40));
        let engine = Engine::with_standard_library(ExecutionLimits::default());
        let mut scope = Scope::new();
        let err = engine.run(&source, &mut scope).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::BudgetExceeded);
        assert!(err.message.contains("nested"), "{}", err.message);

        engine.run("x = 1 * 1 * 1 + 1 + 1", &mut scope).unwrap();
        assert_eq!(scope.get("x"), Some(&Value::int(3)));
    }

    #[test]
    fn test_extreme_row_counts_and_digits() {
        assert_eq!(run("df = df.tail(-9223372036854775807 - 1)").unwrap().len(), 0);
        assert_eq!(run("df = df.head(-9223372036854775807 - 1)").unwrap().len(), 0);
        assert_eq!(run("df = df.tail(-1)").unwrap().column("name").unwrap()[0], s("Amy"));

        let out = run("df['third'] = df['age'] / 7\ndf = df.round(4294967297)").unwrap();
        assert_eq!(out.column("third").unwrap()[0], Scalar::Float(30.0 / 7.0));
        let out = run("df['third'] = df['age'] / 7\ndf = df.round(-4294967297)").unwrap();
        assert_eq!(out.column("third").unwrap()[0], Scalar::Float(0.0));
    }

    #[test]
    fn test_eval_expression() {
        let engine = Engine::with_standard_library(ExecutionLimits::default());
        let mut scope = Scope::new();
        scope.bind("df", Value::Frame(people()));
        assert_eq!(engine.eval("len(df)", &mut scope).unwrap(), Value::int(4));
        assert_eq!(engine.eval("df.shape[1]", &mut scope).unwrap(), Value::int(3));
    }

    #[test]
    fn test_error_carries_line() {
        let err = run("df = df.copy()\ndf = df['missing']").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(err.line, Some(2));
        assert!(err.traceback().ends_with("KeyError: 'missing'"));
    }
}
