//! Call arguments as seen by library functions.

use super::error::{EngineError, EngineResult};
use super::value::{Scalar, Value};

/// Position to pass when a parameter is keyword-only.
pub const KW: usize = usize::MAX;

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    func: String,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(func: impl Into<String>, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            func: func.into(),
            positional,
            keywords,
        }
    }

    pub fn positional(func: impl Into<String>, positional: Vec<Value>) -> Self {
        Self::new(func, positional, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Remove the first positional argument, returning it.
    pub fn shift(&mut self) -> Option<Value> {
        if self.positional.is_empty() {
            None
        } else {
            Some(self.positional.remove(0))
        }
    }

    pub fn keywords(&self) -> &[(String, Value)] {
        &self.keywords
    }

    /// Remove a keyword argument, returning it.
    pub fn take_kw(&mut self, name: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// The argument at `pos`, or the keyword `name`.
    pub fn get(&self, pos: usize, name: &str) -> Option<&Value> {
        self.positional
            .get(pos)
            .or_else(|| self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v))
    }

    /// Like [`Args::get`] but an explicit `None` counts as absent.
    pub fn opt(&self, pos: usize, name: &str) -> Option<&Value> {
        self.get(pos, name)
            .filter(|v| !matches!(v, Value::Scalar(Scalar::Null)))
    }

    pub fn require(&self, pos: usize, name: &str) -> EngineResult<&Value> {
        self.get(pos, name).ok_or_else(|| {
            EngineError::type_error(format!(
                "{}() missing required argument: '{}'",
                self.func, name
            ))
        })
    }

    pub fn bool_or(&self, pos: usize, name: &str, default: bool) -> EngineResult<bool> {
        match self.opt(pos, name) {
            None => Ok(default),
            Some(v) => v.truthy(),
        }
    }

    pub fn int_or(&self, pos: usize, name: &str, default: i64) -> EngineResult<i64> {
        match self.opt(pos, name) {
            None => Ok(default),
            Some(v) => self.as_int(v, name),
        }
    }

    pub fn int_opt(&self, pos: usize, name: &str) -> EngineResult<Option<i64>> {
        self.opt(pos, name).map(|v| self.as_int(v, name)).transpose()
    }

    fn as_int(&self, v: &Value, name: &str) -> EngineResult<i64> {
        v.as_scalar().and_then(Scalar::as_i64).ok_or_else(|| {
            EngineError::type_error(format!(
                "{}() argument '{}' must be an integer, not '{}'",
                self.func,
                name,
                v.type_name()
            ))
        })
    }

    pub fn str_opt(&self, pos: usize, name: &str) -> EngineResult<Option<String>> {
        match self.opt(pos, name) {
            None => Ok(None),
            Some(Value::Scalar(Scalar::Str(s))) => Ok(Some(s.clone())),
            Some(other) => Err(EngineError::type_error(format!(
                "{}() argument '{}' must be a string, not '{}'",
                self.func,
                name,
                other.type_name()
            ))),
        }
    }

    pub fn str_or(&self, pos: usize, name: &str, default: &str) -> EngineResult<String> {
        Ok(self.str_opt(pos, name)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn require_str(&self, pos: usize, name: &str) -> EngineResult<String> {
        self.require(pos, name)?;
        self.str_opt(pos, name)?.ok_or_else(|| {
            EngineError::type_error(format!("{}() argument '{}' must be a string", self.func, name))
        })
    }

    /// A column name or a list of column names.
    pub fn names_opt(&self, pos: usize, name: &str) -> EngineResult<Option<Vec<String>>> {
        self.opt(pos, name).map(Value::to_names).transpose()
    }

    pub fn scalar_opt(&self, pos: usize, name: &str) -> EngineResult<Option<Scalar>> {
        match self.get(pos, name) {
            None => Ok(None),
            Some(Value::Scalar(s)) => Ok(Some(s.clone())),
            Some(other) => Err(EngineError::type_error(format!(
                "{}() argument '{}' must be a scalar, not '{}'",
                self.func,
                name,
                other.type_name()
            ))),
        }
    }

    /// Reject keywords outside `allowed` and more than `max_positional` positional arguments.
    pub fn check(&self, max_positional: usize, allowed: &[&str]) -> EngineResult<()> {
        if self.positional.len() > max_positional {
            return Err(EngineError::type_error(format!(
                "{}() takes at most {} positional arguments but {} were given",
                self.func,
                max_positional,
                self.positional.len()
            )));
        }
        if let Some((k, _)) = self.keywords.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            return Err(EngineError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.func, k
            )));
        }
        Ok(())
    }
}
