//! Runtime values of the snippet language.

use std::cmp::Ordering;
use std::fmt;

use super::ast::{BinOp, CmpOp};
use super::error::{EngineError, EngineResult};
use super::frame::{Frame, GroupBy, Series};

// =============================================================================
// Scalar
// =============================================================================

/// A single element of a column, or a standalone scalar.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn str(s: impl Into<String>) -> Self {
        Scalar::Str(s.into())
    }

    /// `None`, `pd.NA` and NaN are all missing.
    pub fn is_null(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "NoneType",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "str",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::Str(s) => !s.is_empty(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(*b as i64),
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `int(x)`
    pub fn to_int(&self) -> EngineResult<Scalar> {
        match self {
            Scalar::Int(i) => Ok(Scalar::Int(*i)),
            Scalar::Bool(b) => Ok(Scalar::Int(*b as i64)),
            Scalar::Float(f) if f.is_finite() => Ok(Scalar::Int(f.trunc() as i64)),
            Scalar::Float(_) | Scalar::Null => Err(EngineError::value(
                "Cannot convert non-finite values (NA or inf) to integer",
            )),
            Scalar::Str(s) => {
                let t = s.trim();
                t.parse::<i64>().map(Scalar::Int).map_err(|_| {
                    EngineError::value(format!("invalid literal for int() with base 10: '{}'", s))
                })
            }
        }
    }

    /// `float(x)`
    pub fn to_float(&self) -> EngineResult<Scalar> {
        match self {
            Scalar::Null => Ok(Scalar::Float(f64::NAN)),
            Scalar::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Scalar::Float)
                .map_err(|_| EngineError::value(format!("could not convert string to float: '{}'", s))),
            other => Ok(Scalar::Float(other.as_f64().unwrap_or(f64::NAN))),
        }
    }

    /// `str(x)`
    pub fn to_str(&self) -> Scalar {
        Scalar::Str(self.to_string())
    }

    /// `bool(x)`
    pub fn to_bool(&self) -> Scalar {
        Scalar::Bool(self.truthy())
    }

    /// Python equality: `1 == 1.0`, `True == 1`, missing values equal nothing.
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Ordering of two present values; mixing text and numbers is a `TypeError`.
    pub fn try_cmp(&self, other: &Scalar, symbol: &str) -> EngineResult<Ordering> {
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                _ => Err(EngineError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    /// Hashable identity used by grouping, de-duplication and `isin`.
    pub fn key(&self) -> ScalarKey {
        match self {
            s if s.is_null() => ScalarKey::Null,
            Scalar::Str(s) => ScalarKey::Str(s.clone()),
            Scalar::Bool(b) => ScalarKey::Bool(*b),
            other => {
                let f = other.as_f64().unwrap_or(0.0);
                // -0.0 and 0.0 group together
                let f = if f == 0.0 { 0.0 } else { f };
                ScalarKey::Num(f.to_bits())
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("None"),
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => f.write_str(&format_float(*x)),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

/// Python's text form of a float.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarKey {
    Null,
    Bool(bool),
    Num(u64),
    Str(String),
}

// =============================================================================
// Scalar operators
// =============================================================================

/// Arithmetic and bitwise operators on two scalars. Missing operands propagate.
pub fn scalar_binary(op: BinOp, a: &Scalar, b: &Scalar) -> EngineResult<Scalar> {
    if matches!(op, BinOp::BitAnd | BinOp::BitOr) {
        return scalar_bitwise(op, a, b);
    }
    if a.is_null() || b.is_null() {
        return Ok(Scalar::Null);
    }

    match (a, b) {
        (Scalar::Str(x), Scalar::Str(y)) if op == BinOp::Add => Ok(Scalar::Str(format!("{}{}", x, y))),
        (Scalar::Str(s), n) | (n, Scalar::Str(s))
            if op == BinOp::Mul && matches!(n, Scalar::Int(_) | Scalar::Bool(_)) =>
        {
            let times = n.as_i64().unwrap_or(0).max(0) as usize;
            Ok(Scalar::Str(s.repeat(times)))
        }
        (Scalar::Str(_), other) if op == BinOp::Add => Err(EngineError::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        _ if a.is_numeric() && b.is_numeric() => numeric_binary(op, a, b),
        _ => Err(unsupported(op.symbol(), a, b)),
    }
}

fn numeric_binary(op: BinOp, a: &Scalar, b: &Scalar) -> EngineResult<Scalar> {
    let ints = match (a, b) {
        (Scalar::Float(_), _) | (_, Scalar::Float(_)) => None,
        _ => a.as_i64().zip(b.as_i64()),
    };

    if let Some((x, y)) = ints {
        let exact = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::FloorDiv if y != 0 => x
                .checked_div_euclid(y)
                .zip(x.checked_rem_euclid(y))
                .map(|(q, r)| if y < 0 && r != 0 { q - 1 } else { q }),
            BinOp::Mod if y != 0 => x
                .checked_rem(y)
                .and_then(|r| r.checked_add(y))
                .map(|v| v % y),
            BinOp::Pow if y >= 0 => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Scalar::Int(v));
        }
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod => {
            if y == 0.0 {
                f64::NAN
            } else {
                x - y * (x / y).floor()
            }
        }
        BinOp::Pow => x.powf(y),
        BinOp::BitAnd | BinOp::BitOr => return scalar_bitwise(op, a, b),
    };
    Ok(Scalar::Float(v))
}

fn scalar_bitwise(op: BinOp, a: &Scalar, b: &Scalar) -> EngineResult<Scalar> {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => Ok(Scalar::Int(if op == BinOp::BitAnd { x & y } else { x | y })),
        _ if (a.is_null() || matches!(a, Scalar::Bool(_))) && (b.is_null() || matches!(b, Scalar::Bool(_))) => {
            let (x, y) = (a.truthy(), b.truthy());
            Ok(Scalar::Bool(if op == BinOp::BitAnd { x && y } else { x || y }))
        }
        _ => Err(unsupported(op.symbol(), a, b)),
    }
}

fn unsupported(symbol: &str, a: &Scalar, b: &Scalar) -> EngineError {
    EngineError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        a.type_name(),
        b.type_name()
    ))
}

/// Element comparison. Missing values compare unequal to everything.
pub fn scalar_compare(op: CmpOp, a: &Scalar, b: &Scalar) -> EngineResult<bool> {
    match op {
        CmpOp::Eq => Ok(a.loose_eq(b)),
        CmpOp::NotEq => Ok(!a.loose_eq(b)),
        CmpOp::Is => Ok(identical(a, b)),
        CmpOp::IsNot => Ok(!identical(a, b)),
        CmpOp::Lt | CmpOp::LtEq | CmpOp::Gt | CmpOp::GtEq => {
            if a.is_null() || b.is_null() {
                return Ok(false);
            }
            let ord = a.try_cmp(b, op.symbol())?;
            Ok(match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::LtEq => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        CmpOp::In | CmpOp::NotIn => {
            let found = match (a, b) {
                (Scalar::Str(needle), Scalar::Str(hay)) => hay.contains(needle.as_str()),
                _ => {
                    return Err(EngineError::type_error(format!(
                        "argument of type '{}' is not iterable",
                        b.type_name()
                    )))
                }
            };
            Ok(found == (op == CmpOp::In))
        }
    }
}

fn identical(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Null, Scalar::Null) => true,
        (Scalar::Bool(x), Scalar::Bool(y)) => x == y,
        _ => false,
    }
}

// =============================================================================
// Value
// =============================================================================

/// Target type of `astype` and the conversion builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Str,
    Int,
    Float,
    Bool,
    /// `object` / `category`: values are kept as they are.
    Object,
}

impl DType {
    pub fn parse(name: &str) -> EngineResult<DType> {
        match name {
            "str" | "string" => Ok(DType::Str),
            "int" | "int64" | "int32" | "Int64" | "Int32" => Ok(DType::Int),
            "float" | "float64" | "float32" | "Float64" => Ok(DType::Float),
            "bool" | "boolean" => Ok(DType::Bool),
            "object" | "category" => Ok(DType::Object),
            other => Err(EngineError::type_error(format!("data type '{}' not understood", other))),
        }
    }

    pub fn convert(self, value: &Scalar) -> EngineResult<Scalar> {
        match self {
            // missing stays missing, never the text "None" or "nan"
            DType::Str if value.is_null() => Ok(Scalar::Null),
            DType::Str => Ok(value.to_str()),
            DType::Int => value.to_int(),
            DType::Float => value.to_float(),
            DType::Bool => Ok(value.to_bool()),
            DType::Object => Ok(value.clone()),
        }
    }
}

/// Builtin functions visible to snippets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Str,
    Int,
    Float,
    Bool,
    Round,
    Abs,
    Min,
    Max,
    List,
    Sum,
    Sorted,
}

impl Builtin {
    pub const ALL: &'static [(&'static str, Builtin)] = &[
        ("len", Builtin::Len),
        ("str", Builtin::Str),
        ("int", Builtin::Int),
        ("float", Builtin::Float),
        ("bool", Builtin::Bool),
        ("round", Builtin::Round),
        ("abs", Builtin::Abs),
        ("min", Builtin::Min),
        ("max", Builtin::Max),
        ("list", Builtin::List),
        ("sum", Builtin::Sum),
        ("sorted", Builtin::Sorted),
    ];

    pub fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(n, _)| *n)
            .unwrap_or("builtin")
    }

    /// The conversion builtins double as dtypes.
    pub fn as_dtype(self) -> Option<DType> {
        match self {
            Builtin::Str => Some(DType::Str),
            Builtin::Int => Some(DType::Int),
            Builtin::Float => Some(DType::Float),
            Builtin::Bool => Some(DType::Bool),
            _ => None,
        }
    }
}

/// Library namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Pandas,
    Numpy,
}

/// Bounds of a slice. Label slices (`loc['a':'c']`) keep scalar bounds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceSpec {
    pub start: Option<Scalar>,
    pub stop: Option<Scalar>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// Resolve to positions over a sequence of `len` items.
    pub fn positions(&self, len: usize) -> EngineResult<Vec<usize>> {
        let bound = |s: &Option<Scalar>| -> EngineResult<Option<i64>> {
            match s {
                None => Ok(None),
                Some(v) if v.is_null() => Ok(None),
                Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                    EngineError::type_error("slice indices must be integers or None")
                }),
            }
        };
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(EngineError::value("slice step cannot be zero"));
        }

        let n = len as i64;
        let clamp = |i: i64, lo: i64, hi: i64| if i < 0 { (i + n).max(lo) } else { i.min(hi) };
        let mut out = Vec::new();
        if step > 0 {
            let start = bound(&self.start)?.map_or(0, |i| clamp(i, 0, n));
            let stop = bound(&self.stop)?.map_or(n, |i| clamp(i, 0, n));
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = bound(&self.start)?.map_or(n - 1, |i| clamp(i, -1, n - 1));
            let stop = bound(&self.stop)?.map_or(-1, |i| clamp(i, -1, n - 1));
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

/// Any value a snippet expression can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Scalar, Value)>),
    Slice(SliceSpec),
    Frame(Frame),
    Series(Series),
    /// Column or row labels (`df.columns`, `df.index`).
    Index(Vec<Scalar>),
    /// `series.str` or `df.columns.str`.
    StrAccessor(Series),
    /// `series.dt` over datetime text.
    DtAccessor(Series),
    /// `df.loc` (label based) or `df.iloc` (positional).
    Indexer { frame: Box<Frame>, positional: bool },
    /// `series.loc` / `series.iloc`.
    SeriesIndexer { series: Box<Series>, positional: bool },
    GroupBy(Box<GroupBy>),
    /// A method bound to its receiver, waiting to be called.
    Method(Box<Value>, String),
    Module(Module),
    Builtin(Builtin),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Str(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Value::Scalar(Scalar::Float(f))
    }

    pub fn bool(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(s) => s.type_name(),
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Slice(_) => "slice",
            Value::Frame(_) => "DataFrame",
            Value::Series(_) => "Series",
            Value::Index(_) => "Index",
            Value::StrAccessor(_) => "StringMethods",
            Value::DtAccessor(_) => "DatetimeProperties",
            Value::Indexer { positional: false, .. } => "_LocIndexer",
            Value::Indexer { positional: true, .. } => "_iLocIndexer",
            Value::SeriesIndexer { positional: false, .. } => "_LocIndexer",
            Value::SeriesIndexer { positional: true, .. } => "_iLocIndexer",
            Value::GroupBy(_) => "DataFrameGroupBy",
            Value::Method(..) => "method",
            Value::Module(_) => "module",
            Value::Builtin(_) => "builtin_function_or_method",
        }
    }

    pub fn truthy(&self) -> EngineResult<bool> {
        match self {
            Value::Scalar(s) => Ok(s.truthy()),
            Value::List(v) | Value::Tuple(v) => Ok(!v.is_empty()),
            Value::Dict(d) => Ok(!d.is_empty()),
            Value::Index(v) => Ok(!v.is_empty()),
            Value::Frame(_) | Value::Series(_) => Err(EngineError::value(format!(
                "The truth value of a {} is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                self.type_name()
            ))),
            _ => Ok(true),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Elements of a list-like value as scalars.
    pub fn to_scalars(&self) -> EngineResult<Vec<Scalar>> {
        match self {
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(|v| {
                    v.as_scalar().cloned().ok_or_else(|| {
                        EngineError::type_error(format!("expected a scalar, got '{}'", v.type_name()))
                    })
                })
                .collect(),
            Value::Series(s) => Ok(s.values.clone()),
            Value::Index(labels) => Ok(labels.clone()),
            Value::Scalar(s) => Ok(vec![s.clone()]),
            other => Err(EngineError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Column names from a string or a list of strings.
    pub fn to_names(&self) -> EngineResult<Vec<String>> {
        self.to_scalars()?
            .into_iter()
            .map(|s| match s {
                Scalar::Str(s) => Ok(s),
                other => Ok(other.to_string()),
            })
            .collect()
    }

    /// Items produced by iterating the value (`list(x)`, comprehensions).
    pub fn iterate(&self) -> EngineResult<Vec<Value>> {
        match self {
            Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
            Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| Value::Scalar(k.clone())).collect()),
            Value::Frame(f) => Ok(f.column_names().map(Value::str).collect()),
            Value::Series(s) => Ok(s.values.iter().cloned().map(Value::Scalar).collect()),
            Value::Index(labels) => Ok(labels.iter().cloned().map(Value::Scalar).collect()),
            Value::Scalar(Scalar::Str(s)) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(EngineError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Value::Scalar(Scalar::Str(s)) => write!(f, "'{}'", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                f.write_str("]")
            }
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(scalar_binary(BinOp::Add, &Scalar::Int(2), &Scalar::Int(3)).unwrap(), Scalar::Int(5));
        assert_eq!(scalar_binary(BinOp::Div, &Scalar::Int(7), &Scalar::Int(2)).unwrap(), Scalar::Float(3.5));
        assert_eq!(scalar_binary(BinOp::FloorDiv, &Scalar::Int(-7), &Scalar::Int(2)).unwrap(), Scalar::Int(-4));
        assert_eq!(scalar_binary(BinOp::Mod, &Scalar::Int(-7), &Scalar::Int(3)).unwrap(), Scalar::Int(2));
        assert_eq!(scalar_binary(BinOp::Pow, &Scalar::Int(2), &Scalar::Int(10)).unwrap(), Scalar::Int(1024));
    }

    #[test]
    fn test_missing_values_propagate() {
        assert_eq!(scalar_binary(BinOp::Mul, &Scalar::Null, &Scalar::Int(3)).unwrap(), Scalar::Null);
        assert!(!scalar_compare(CmpOp::Eq, &Scalar::Float(f64::NAN), &Scalar::Float(f64::NAN)).unwrap());
        assert!(!scalar_compare(CmpOp::Gt, &Scalar::Null, &Scalar::Int(1)).unwrap());
    }

    #[test]
    fn test_string_operators() {
        assert_eq!(
            scalar_binary(BinOp::Add, &Scalar::str("a"), &Scalar::str("b")).unwrap(),
            Scalar::str("ab")
        );
        assert_eq!(
            scalar_binary(BinOp::Mul, &Scalar::str("ab"), &Scalar::Int(2)).unwrap(),
            Scalar::str("abab")
        );
        let err = scalar_binary(BinOp::Add, &Scalar::str("a"), &Scalar::Int(1)).unwrap_err();
        assert!(err.message.contains("can only concatenate str"));
    }

    #[test]
    fn test_mixed_ordering_is_type_error() {
        let err = scalar_compare(CmpOp::Gt, &Scalar::str("x"), &Scalar::Int(30)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: '>' not supported between instances of 'str' and 'int'");
        assert!(scalar_compare(CmpOp::Eq, &Scalar::Int(1), &Scalar::Float(1.0)).unwrap());
        assert!(!scalar_compare(CmpOp::Eq, &Scalar::str("1"), &Scalar::Int(1)).unwrap());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Scalar::str(" 42 ").to_int().unwrap(), Scalar::Int(42));
        assert_eq!(Scalar::Float(3.9).to_int().unwrap(), Scalar::Int(3));
        assert!(Scalar::str("abc").to_float().is_err());
        assert_eq!(Scalar::Float(3.0).to_string(), "3.0");
        assert_eq!(Scalar::Float(f64::NAN).to_string(), "nan");
        assert_eq!(DType::Str.convert(&Scalar::Float(f64::NAN)).unwrap(), Scalar::Null);
        assert_eq!(DType::Str.convert(&Scalar::Null).unwrap(), Scalar::Null);
        assert_eq!(DType::Str.convert(&Scalar::Int(7)).unwrap(), Scalar::str("7"));
        assert_eq!(DType::parse("int64").unwrap(), DType::Int);
        assert!(DType::parse("complex").is_err());
    }

    #[test]
    fn test_keys_unify_numbers() {
        assert_eq!(Scalar::Int(1).key(), Scalar::Float(1.0).key());
        assert_eq!(Scalar::Null.key(), Scalar::Float(f64::NAN).key());
        assert_ne!(Scalar::str("1").key(), Scalar::Int(1).key());
    }

    #[test]
    fn test_slice_positions() {
        let spec = SliceSpec {
            start: None,
            stop: Some(Scalar::Int(-1)),
            step: None,
        };
        assert_eq!(spec.positions(4).unwrap(), vec![0, 1, 2]);
        let rev = SliceSpec {
            step: Some(-1),
            ..Default::default()
        };
        assert_eq!(rev.positions(3).unwrap(), vec![2, 1, 0]);
    }
}
