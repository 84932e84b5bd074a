//! Tree-walking evaluator for parsed snippets.
//!
//! Every expression evaluation is counted against the [`ExecutionLimits`] of the run, so a
//! snippet cannot spin or allocate without bound. Assignments to compound targets
//! (`df['a'] = ...`, `df.loc[m, 'a'] = ...`, `df.columns = ...`) evaluate the container, update
//! a copy and write the copy back through the chain of targets down to a plain name.

use std::collections::HashMap;
use std::time::Instant;

use super::args::Args;
use super::ast::{BinOp, BoolOp, CmpOp, Expr, Statement, StmtKind, Target, UnaryOp};
use super::error::{EngineError, EngineResult};
use super::frame::{Frame, Series};
use super::indexing;
use super::methods;
use super::namespace;
use super::ops;
use super::parser::parse_expression;
use super::value::{Scalar, SliceSpec, Value};
use super::{ExecutionLimits, Scope, MAX_NESTING};

/// Work left for one run.
#[derive(Debug, Clone)]
pub struct Budget {
    steps: u64,
    max_steps: u64,
    max_cells: usize,
    deadline: Instant,
    timeout_ms: u128,
}

impl Budget {
    pub fn new(limits: &ExecutionLimits) -> Self {
        Self {
            steps: 0,
            max_steps: limits.max_steps,
            max_cells: limits.max_cells,
            deadline: Instant::now() + limits.timeout,
            timeout_ms: limits.timeout.as_millis(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn tick(&mut self) -> EngineResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EngineError::budget(format!(
                "execution step limit of {} exceeded",
                self.max_steps
            )));
        }
        if Instant::now() >= self.deadline {
            return Err(EngineError::budget(format!(
                "execution time limit of {} ms exceeded",
                self.timeout_ms
            )));
        }
        Ok(())
    }

    /// Refuse values larger than the cell limit.
    fn charge(&self, value: &Value) -> EngineResult<()> {
        let cells = match value {
            Value::Frame(f) => f.cell_count(),
            Value::Series(s) | Value::StrAccessor(s) | Value::DtAccessor(s) => s.len(),
            Value::List(items) | Value::Tuple(items) => items.len(),
            Value::Index(labels) => labels.len(),
            Value::Dict(entries) => entries.len(),
            _ => 0,
        };
        if cells > self.max_cells {
            return Err(EngineError::budget(format!(
                "value of {} cells exceeds the limit of {}",
                cells, self.max_cells
            )));
        }
        Ok(())
    }
}

pub struct Interpreter<'a> {
    globals: &'a HashMap<String, Value>,
    scope: &'a mut Scope,
    /// Comprehension variables and `query` columns, innermost last.
    locals: Vec<(String, Value)>,
    budget: Budget,
    /// Expressions currently being evaluated.
    depth: usize,
    /// Inside `query`: `and`/`or`/`not`/`in` work element-wise on series.
    elementwise_logic: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: &'a HashMap<String, Value>, scope: &'a mut Scope, limits: &ExecutionLimits) -> Self {
        Self {
            globals,
            scope,
            locals: Vec::new(),
            budget: Budget::new(limits),
            depth: 0,
            elementwise_logic: false,
        }
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn run(&mut self, program: &[Statement]) -> EngineResult<()> {
        for statement in program {
            self.exec(statement).map_err(|e| e.at_line(statement.line))?;
        }
        Ok(())
    }

    pub fn evaluate(&mut self, expr: &Expr) -> EngineResult<Value> {
        self.eval(expr)
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn exec(&mut self, statement: &Statement) -> EngineResult<()> {
        self.budget.tick()?;
        match &statement.kind {
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(())
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(&target_expr(target))?;
                let rhs = self.eval(value)?;
                let updated = ops::binary(*op, &current, &rhs)?;
                self.budget.charge(&updated)?;
                self.assign(target, updated)
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => self.eval(expr).map(drop),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> EngineResult<()> {
        match target {
            Target::Name(name) => {
                self.scope.bind(name, value);
                Ok(())
            }
            Target::Subscript(obj, key) => {
                let container = self.eval(obj)?;
                let key = self.eval(key)?;
                let updated = indexing::set_item(container, &key, value)?;
                self.budget.charge(&updated)?;
                self.write_back(obj, updated)
            }
            Target::Attr(obj, name) => {
                let container = self.eval(obj)?;
                let updated = methods::set_attr(container, name, value)?;
                self.write_back(obj, updated)
            }
        }
    }

    /// Store an updated container where it came from; temporaries are dropped.
    fn write_back(&mut self, obj: &Expr, updated: Value) -> EngineResult<()> {
        match Target::from_expr(obj) {
            Some(target) => self.assign(&target, updated),
            None => Ok(()),
        }
    }

    fn delete(&mut self, target: &Target) -> EngineResult<()> {
        match target {
            Target::Name(name) => match self.scope.remove(name) {
                Some(_) => Ok(()),
                None => Err(EngineError::name(name)),
            },
            Target::Subscript(obj, key) => {
                let container = self.eval(obj)?;
                let key = self.eval(key)?;
                let updated = indexing::del_item(container, &key)?;
                self.write_back(obj, updated)
            }
            Target::Attr(obj, name) => {
                let owner = self.eval(obj)?;
                Err(EngineError::attribute(owner.type_name(), name))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> EngineResult<Value> {
        self.budget.tick()?;
        if self.depth >= MAX_NESTING {
            return Err(EngineError::budget(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let value = self.eval_inner(expr);
        self.depth -= 1;
        let value = value?;
        self.budget.charge(&value)?;
        Ok(value)
    }

    fn eval_inner(&mut self, expr: &Expr) -> EngineResult<Value> {
        match expr {
            Expr::Int(i) => Ok(Value::int(*i)),
            Expr::Float(f) => Ok(Value::float(*f)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Bool(b) => Ok(Value::bool(*b)),
            Expr::None => Ok(Value::null()),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let mut out: Vec<(Scalar, Value)> = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match self.eval(k)? {
                        Value::Scalar(s) => s,
                        other => {
                            return Err(EngineError::type_error(format!(
                                "unhashable type: '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval(v)?;
                    match out.iter_mut().find(|(existing, _)| existing.key() == key.key()) {
                        Some(entry) => entry.1 = value,
                        None => out.push((key, value)),
                    }
                }
                Ok(Value::Dict(out))
            }
            Expr::Slice { start, stop, step } => {
                let mut bound = |e: &Option<Box<Expr>>| -> EngineResult<Option<Scalar>> {
                    match e {
                        None => Ok(None),
                        Some(e) => match self.eval(e)? {
                            Value::Scalar(s) => Ok(Some(s)),
                            other => Err(EngineError::type_error(format!(
                                "slice bounds must be scalars, not '{}'",
                                other.type_name()
                            ))),
                        },
                    }
                };
                let start = bound(start)?;
                let stop = bound(stop)?;
                let step = match bound(step)? {
                    None => None,
                    Some(s) if s.is_null() => None,
                    Some(s) => Some(s.as_i64().ok_or_else(|| {
                        EngineError::type_error("slice indices must be integers or None")
                    })?),
                };
                Ok(Value::Slice(SliceSpec { start, stop, step }))
            }
            Expr::Attr(obj, name) => {
                let owner = self.eval(obj)?;
                self.get_attr(owner, name)
            }
            Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            Expr::Subscript(obj, key) => {
                let container = self.eval(obj)?;
                let key = self.eval(key)?;
                indexing::get_item(&container, &key)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                let op = match (op, &value) {
                    (UnaryOp::Not, Value::Series(_)) if self.elementwise_logic => UnaryOp::Invert,
                    _ => *op,
                };
                ops::unary(op, &value)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::Compare(first, links) => self.eval_compare(first, links),
            Expr::Logical(op, left, right) => self.eval_logical(*op, left, right),
            Expr::IfElse { cond, then, otherwise } => {
                if self.eval(cond)?.truthy()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::ListComp { elt, var, iter, cond } => {
                let items = self.eval(iter)?.iterate()?;
                let mut out = Vec::new();
                for item in items {
                    self.locals.push((var.clone(), item));
                    let result = self.comprehension_step(elt, cond.as_deref());
                    self.locals.pop();
                    if let Some(value) = result? {
                        out.push(value);
                    }
                }
                Ok(Value::List(out))
            }
        }
    }

    fn comprehension_step(&mut self, elt: &Expr, cond: Option<&Expr>) -> EngineResult<Option<Value>> {
        if let Some(cond) = cond {
            if !self.eval(cond)?.truthy()? {
                return Ok(None);
            }
        }
        self.eval(elt).map(Some)
    }

    fn eval_all(&mut self, items: &[Expr]) -> EngineResult<Vec<Value>> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    fn lookup(&self, name: &str) -> EngineResult<Value> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::name(name))
    }

    fn eval_compare(&mut self, first: &Expr, links: &[(CmpOp, Expr)]) -> EngineResult<Value> {
        let mut left = self.eval(first)?;
        let mut result: Option<Value> = None;
        for (op, right) in links {
            let right = self.eval(right)?;
            let link = self.compare_link(*op, &left, &right)?;
            result = Some(match result {
                None => link,
                Some(acc @ Value::Series(_)) | Some(acc @ Value::Frame(_)) => ops::binary(BinOp::BitAnd, &acc, &link)?,
                Some(acc) => {
                    if !acc.truthy()? {
                        return Ok(acc);
                    }
                    link
                }
            });
            left = right;
        }
        Ok(result.unwrap_or_else(|| Value::bool(true)))
    }

    fn compare_link(&mut self, op: CmpOp, left: &Value, right: &Value) -> EngineResult<Value> {
        if let Value::Series(series) = left {
            let listlike = matches!(right, Value::List(_) | Value::Tuple(_) | Value::Index(_) | Value::Series(_));
            let membership = match op {
                CmpOp::In | CmpOp::NotIn => self.elementwise_logic,
                CmpOp::Eq | CmpOp::NotEq => self.elementwise_logic && matches!(right, Value::List(_) | Value::Tuple(_)),
                _ => false,
            };
            if membership && listlike {
                let found = ops::isin(series, &right.to_scalars()?);
                return if matches!(op, CmpOp::In | CmpOp::Eq) {
                    Ok(Value::Series(found))
                } else {
                    ops::unary(UnaryOp::Invert, &Value::Series(found))
                };
            }
        }
        ops::compare(op, left, right)
    }

    fn eval_logical(&mut self, op: BoolOp, left: &Expr, right: &Expr) -> EngineResult<Value> {
        let left = self.eval(left)?;
        if self.elementwise_logic && matches!(left, Value::Series(_)) {
            let right = self.eval(right)?;
            let bitop = match op {
                BoolOp::And => BinOp::BitAnd,
                BoolOp::Or => BinOp::BitOr,
            };
            return ops::binary(bitop, &left, &right);
        }
        let truthy = left.truthy()?;
        match (op, truthy) {
            (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
            _ => self.eval(right),
        }
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    fn eval_call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> EngineResult<Value> {
        let name = match func {
            Expr::Name(n) | Expr::Attr(_, n) => n.clone(),
            _ => "function".to_string(),
        };
        let positional = self.eval_all(args)?;
        let mut keywords = Vec::with_capacity(kwargs.len());
        for (k, v) in kwargs {
            keywords.push((k.clone(), self.eval(v)?));
        }
        let mut call_args = Args::new(name, positional, keywords);

        if let Expr::Attr(obj, method) = func {
            let receiver = self.eval(obj)?;
            let inplace = match call_args.take_kw("inplace") {
                Some(flag) => flag.truthy()?,
                None => false,
            };
            if inplace || methods::mutates_receiver(&receiver, method) {
                let updated = self.call_method(receiver, method, call_args)?;
                self.budget.charge(&updated)?;
                self.write_back(obj, updated)?;
                return Ok(Value::null());
            }
            let callee = self.get_attr(receiver, method)?;
            return self.call_value(callee, call_args);
        }

        let callee = self.eval(func)?;
        self.call_value(callee, call_args)
    }

    /// Call any callable value.
    pub(super) fn call_value(&mut self, func: Value, args: Args) -> EngineResult<Value> {
        self.budget.tick()?;
        match func {
            Value::Builtin(builtin) => namespace::call_builtin(builtin, &args),
            Value::Method(receiver, name) => match *receiver {
                Value::Module(module) => namespace::call_module(module, &name, &args),
                other => self.call_method(other, &name, args),
            },
            other => Err(EngineError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// `func(x, **keywords)` for one element, as `map`/`apply` do.
    pub(super) fn call_element(
        &mut self,
        func: &Value,
        element: &Scalar,
        keywords: &[(String, Value)],
    ) -> EngineResult<Scalar> {
        let name = match func {
            Value::Builtin(b) => b.name().to_string(),
            Value::Method(_, n) => n.clone(),
            other => other.type_name().to_string(),
        };
        let args = Args::new(name, vec![Value::Scalar(element.clone())], keywords.to_vec());
        match self.call_value(func.clone(), args)? {
            Value::Scalar(s) => Ok(s),
            other => Err(EngineError::type_error(format!(
                "element function returned '{}', expected a scalar",
                other.type_name()
            ))),
        }
    }

    /// Evaluate a `query` expression against the columns of `frame` and return the row mask.
    pub(super) fn query_mask(&mut self, frame: &Frame, text: &str) -> EngineResult<Vec<bool>> {
        let (source, placeholders) = prepare_query(text)?;
        let expr = parse_expression(&source)?;

        let saved_locals = self.locals.len();
        for column in frame.columns() {
            let series = Series::with_index(Some(column.name.clone()), column.values.clone(), frame.index().clone());
            self.locals.push((column.name.clone(), Value::Series(series)));
        }
        for (placeholder, column) in &placeholders {
            let series = frame.series(column)?;
            self.locals.push((placeholder.clone(), Value::Series(series)));
        }
        if !frame.has_column("index") {
            let labels = Series::with_index(None, frame.index().labels(), frame.index().clone());
            self.locals.push(("index".to_string(), Value::Series(labels)));
        }

        let previous = std::mem::replace(&mut self.elementwise_logic, true);
        let result = self.eval(&expr);
        self.elementwise_logic = previous;
        self.locals.truncate(saved_locals);

        match result? {
            Value::Series(mask) => Ok(mask.aligned_to(frame.index()).iter().map(Scalar::truthy).collect()),
            Value::Scalar(s) => Ok(vec![s.truthy(); frame.len()]),
            other => Err(EngineError::value(format!(
                "query expression must produce a boolean mask, not '{}'",
                other.type_name()
            ))),
        }
    }
}

/// Rewrites query text: `@name` refers to a snippet variable, `` `a b` `` to a column.
fn prepare_query(text: &str) -> EngineResult<(String, Vec<(String, String)>)> {
    let mut out = String::with_capacity(text.len());
    let mut placeholders: Vec<(String, String)> = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), '\\') => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '@') => {}
            (None, '`') => {
                let column: String = chars.by_ref().take_while(|&c| c != '`').collect();
                let placeholder = format!("backtick_column_{}", placeholders.len());
                out.push_str(&placeholder);
                placeholders.push((placeholder, column));
            }
            (None, c) => out.push(c),
        }
    }
    if quote.is_some() {
        return Err(EngineError::syntax("unterminated string literal in query"));
    }
    Ok((out, placeholders))
}

/// The expression reading a target's current value (for `x += 1`).
fn target_expr(target: &Target) -> Expr {
    match target {
        Target::Name(name) => Expr::Name(name.clone()),
        Target::Subscript(obj, key) => Expr::Subscript(Box::new(obj.clone()), Box::new(key.clone())),
        Target::Attr(obj, name) => Expr::Attr(Box::new(obj.clone()), name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_query_rewrites_variables_and_backticks() {
        let (text, placeholders) = prepare_query("`first name` == @who and city != '@home'").unwrap();
        assert_eq!(text, "backtick_column_0 == who and city != '@home'");
        assert_eq!(placeholders, vec![("backtick_column_0".to_string(), "first name".to_string())]);
        assert!(prepare_query("a == 'open").is_err());
    }

    #[test]
    fn test_target_expr_round_trips() {
        let target = Target::Subscript(Expr::Name("df".into()), Expr::Str("a".into()));
        assert_eq!(Target::from_expr(&target_expr(&target)), Some(target));
    }
}
