//! Operators on values, with pandas broadcasting between scalars, series and tables.

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{EngineError, EngineResult};
use super::frame::{Frame, Index, Series};
use super::value::{scalar_binary, scalar_compare, Scalar, Value};

/// Longest list or string an operator may build in one step.
pub const MAX_SEQUENCE: usize = 10_000_000;

/// A series view of `value` when it behaves like one (`Index` is an unnamed series).
fn series_like(value: &Value) -> Option<Series> {
    match value {
        Value::Series(s) => Some(s.clone()),
        Value::Index(labels) => Some(Series::new(None, labels.clone())),
        _ => None,
    }
}

fn unsupported(symbol: &str, left: &Value, right: &Value) -> EngineError {
    EngineError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn length_error(left: usize, right: usize) -> EngineError {
    EngineError::value(format!(
        "Lengths must match to compare or combine: {} != {}",
        left, right
    ))
}

fn repeat<T: Clone>(items: &[T], times: &Scalar) -> EngineResult<Vec<T>> {
    let n = times.as_i64().unwrap_or(0).max(0) as usize;
    if items.len().saturating_mul(n) > MAX_SEQUENCE {
        return Err(EngineError::budget("sequence repetition is too large"));
    }
    Ok(items.iter().cloned().cycle().take(items.len() * n).collect())
}

/// Pair every element of `left` with the matching element of `right`.
fn zip_series(
    left: &Series,
    right: &Series,
    mut f: impl FnMut(&Scalar, &Scalar) -> EngineResult<Scalar>,
) -> EngineResult<Series> {
    let aligned = right.aligned_to(&left.index);
    let values = left
        .values
        .iter()
        .zip(&aligned)
        .map(|(a, b)| f(a, b))
        .collect::<EngineResult<Vec<_>>>()?;
    let name = if left.name == right.name {
        left.name.clone()
    } else {
        None
    };
    Ok(Series::with_index(name, values, left.index.clone()))
}

fn zip_list(
    series: &Series,
    items: &[Scalar],
    mut f: impl FnMut(&Scalar, &Scalar) -> EngineResult<Scalar>,
) -> EngineResult<Series> {
    if items.len() != series.len() {
        return Err(length_error(series.len(), items.len()));
    }
    let values = series
        .values
        .iter()
        .zip(items)
        .map(|(a, b)| f(a, b))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(Series::with_index(series.name.clone(), values, series.index.clone()))
}

fn zip_frames(
    left: &Frame,
    right: &Frame,
    mut f: impl FnMut(&Scalar, &Scalar) -> EngineResult<Scalar>,
) -> EngineResult<Frame> {
    let same_names = left.column_names().eq(right.column_names());
    if !same_names || left.len() != right.len() {
        return Err(EngineError::value(
            "Can only combine identically-labeled DataFrame objects",
        ));
    }
    let mut columns = Vec::with_capacity(left.width());
    for (a, b) in left.columns().iter().zip(right.columns()) {
        let values = a
            .values
            .iter()
            .zip(&b.values)
            .map(|(x, y)| f(x, y))
            .collect::<EngineResult<Vec<_>>>()?;
        columns.push((a.name.clone(), values));
    }
    let mut out = Frame::from_columns(columns)?;
    out.set_index_labels(left.index().clone())?;
    Ok(out)
}

/// `left <op> right`
pub fn binary(op: BinOp, left: &Value, right: &Value) -> EngineResult<Value> {
    match (left, right) {
        (Value::Scalar(a), Value::Scalar(b)) => {
            if let (Scalar::Str(s), Scalar::Int(n)) | (Scalar::Int(n), Scalar::Str(s)) = (a, b) {
                if op == BinOp::Mul && s.len().saturating_mul((*n).max(0) as usize) > MAX_SEQUENCE {
                    return Err(EngineError::budget("string repetition is too large"));
                }
            }
            scalar_binary(op, a, b).map(Value::Scalar)
        }
        (Value::List(a), Value::List(b)) if op == BinOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == BinOp::Add => {
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (Value::List(items), Value::Scalar(n)) | (Value::Scalar(n), Value::List(items))
            if op == BinOp::Mul && matches!(n, Scalar::Int(_)) =>
        {
            repeat(items, n).map(Value::List)
        }
        (Value::Frame(f), Value::Scalar(s)) => f
            .try_map_columns(&[], |_, v| scalar_binary(op, v, s))
            .map(Value::Frame),
        (Value::Scalar(s), Value::Frame(f)) => f
            .try_map_columns(&[], |_, v| scalar_binary(op, s, v))
            .map(Value::Frame),
        (Value::Frame(a), Value::Frame(b)) => zip_frames(a, b, |x, y| scalar_binary(op, x, y)).map(Value::Frame),
        _ => match (series_like(left), series_like(right)) {
            (Some(a), Some(b)) => zip_series(&a, &b, |x, y| scalar_binary(op, x, y)).map(Value::Series),
            (Some(a), None) => match right {
                Value::Scalar(s) => a.map_values(|v| scalar_binary(op, v, s)).map(Value::Series),
                Value::List(_) | Value::Tuple(_) => {
                    zip_list(&a, &right.to_scalars()?, |x, y| scalar_binary(op, x, y)).map(Value::Series)
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            },
            (None, Some(b)) => match left {
                Value::Scalar(s) => b.map_values(|v| scalar_binary(op, s, v)).map(Value::Series),
                Value::List(_) | Value::Tuple(_) => {
                    let items = left.to_scalars()?;
                    zip_list(&b, &items, |x, y| scalar_binary(op, y, x)).map(Value::Series)
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            },
            (None, None) => Err(unsupported(op.symbol(), left, right)),
        },
    }
}

fn swap(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::LtEq => CmpOp::GtEq,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::GtEq => CmpOp::LtEq,
        other => other,
    }
}

fn elementwise(op: CmpOp, a: &Scalar, b: &Scalar) -> EngineResult<Scalar> {
    scalar_compare(op, a, b).map(Scalar::Bool)
}

/// Python equality between arbitrary values.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => {
            matches!((x, y), (Scalar::Null, Scalar::Null)) || x.loose_eq(y)
        }
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
        }
        _ => a == b,
    }
}

/// `left <op> right` for one link of a comparison chain.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> EngineResult<Value> {
    match op {
        CmpOp::In => return contains(right, left).map(Value::bool),
        CmpOp::NotIn => return contains(right, left).map(|found| Value::bool(!found)),
        CmpOp::Is | CmpOp::IsNot => {
            let same = match (left, right) {
                (Value::Scalar(a), Value::Scalar(b)) => scalar_compare(CmpOp::Is, a, b)?,
                _ => false,
            };
            return Ok(Value::bool(same == (op == CmpOp::Is)));
        }
        _ => {}
    }

    match (left, right) {
        (Value::Scalar(a), Value::Scalar(b)) => scalar_compare(op, a, b).map(Value::bool),
        (Value::Frame(f), Value::Scalar(s)) => f
            .try_map_columns(&[], |_, v| elementwise(op, v, s))
            .map(Value::Frame),
        (Value::Scalar(s), Value::Frame(f)) => f
            .try_map_columns(&[], |_, v| elementwise(swap(op), v, s))
            .map(Value::Frame),
        (Value::Frame(a), Value::Frame(b)) => zip_frames(a, b, |x, y| elementwise(op, x, y)).map(Value::Frame),
        _ => match (series_like(left), series_like(right)) {
            (Some(a), Some(b)) => {
                if a.index != b.index {
                    return Err(EngineError::value(
                        "Can only compare identically-labeled Series objects",
                    ));
                }
                zip_series(&a, &b, |x, y| elementwise(op, x, y)).map(Value::Series)
            }
            (Some(a), None) => match right {
                Value::Scalar(s) => a.map_values(|v| elementwise(op, v, s)).map(Value::Series),
                Value::List(_) | Value::Tuple(_) => {
                    zip_list(&a, &right.to_scalars()?, |x, y| elementwise(op, x, y)).map(Value::Series)
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            },
            (None, Some(b)) => match left {
                Value::Scalar(s) => b.map_values(|v| elementwise(swap(op), v, s)).map(Value::Series),
                Value::List(_) | Value::Tuple(_) => {
                    zip_list(&b, &left.to_scalars()?, |x, y| elementwise(swap(op), x, y)).map(Value::Series)
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            },
            (None, None) => match op {
                CmpOp::Eq => Ok(Value::bool(values_equal(left, right))),
                CmpOp::NotEq => Ok(Value::bool(!values_equal(left, right))),
                _ => Err(EngineError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))),
            },
        },
    }
}

/// Python's `item in container`.
pub fn contains(container: &Value, item: &Value) -> EngineResult<bool> {
    match container {
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Dict(entries) => match item {
            Value::Scalar(key) => Ok(entries.iter().any(|(k, _)| k.key() == key.key())),
            _ => Ok(false),
        },
        Value::Frame(frame) => Ok(item.as_str().is_some_and(|name| frame.has_column(name))),
        Value::Series(series) => Ok(item
            .as_scalar()
            .is_some_and(|label| !series.index.positions_of(label).is_empty())),
        Value::Index(labels) => Ok(item
            .as_scalar()
            .is_some_and(|label| labels.iter().any(|l| l.loose_eq(label)))),
        Value::Scalar(Scalar::Str(hay)) => match item {
            Value::Scalar(Scalar::Str(needle)) => Ok(hay.contains(needle.as_str())),
            other => Err(EngineError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(EngineError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// `series.isin(values)`
pub fn isin(series: &Series, values: &[Scalar]) -> Series {
    let keys: std::collections::HashSet<_> = values.iter().map(Scalar::key).collect();
    Series::with_index(
        series.name.clone(),
        series.values.iter().map(|v| Scalar::Bool(keys.contains(&v.key()))).collect(),
        series.index.clone(),
    )
}

fn unary_scalar(op: UnaryOp, value: &Scalar) -> EngineResult<Scalar> {
    let bad = || {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
        };
        EngineError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            value.type_name()
        ))
    };
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Scalar::Bool(!v.truthy())),
        (_, Scalar::Null) => Ok(Scalar::Null),
        (UnaryOp::Neg, Scalar::Int(i)) => Ok(i.checked_neg().map_or(Scalar::Float(-(*i as f64)), Scalar::Int)),
        (UnaryOp::Neg, Scalar::Float(f)) => Ok(Scalar::Float(-f)),
        (UnaryOp::Neg, Scalar::Bool(b)) => Ok(Scalar::Int(-(*b as i64))),
        (UnaryOp::Pos, v) if v.is_numeric() => Ok(v.clone()),
        (UnaryOp::Invert, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
        (UnaryOp::Invert, Scalar::Int(i)) => Ok(Scalar::Int(!i)),
        _ => Err(bad()),
    }
}

/// Unary operators; `~` on a mask negates it element-wise.
pub fn unary(op: UnaryOp, value: &Value) -> EngineResult<Value> {
    match value {
        Value::Scalar(s) => unary_scalar(op, s).map(Value::Scalar),
        Value::Series(s) if op != UnaryOp::Not => s.map_values(|v| unary_scalar(op, v)).map(Value::Series),
        Value::Frame(f) if op != UnaryOp::Not => f
            .try_map_columns(&[], |_, v| unary_scalar(op, v))
            .map(Value::Frame),
        other if op == UnaryOp::Not => Ok(Value::bool(!other.truthy()?)),
        other => Err(EngineError::type_error(format!(
            "bad operand type for unary operator: '{}'",
            other.type_name()
        ))),
    }
}

/// Labels of an index value, used by `.columns` and `.index`.
pub fn index_value(index: &Index) -> Value {
    Value::Index(index.labels())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ages() -> Series {
        Series::new(Some("age".into()), vec![Scalar::Int(30), Scalar::Null, Scalar::Int(25)])
    }

    #[test]
    fn test_series_broadcasts_scalars() {
        let out = binary(BinOp::Mul, &Value::Series(ages()), &Value::int(2)).unwrap();
        match out {
            Value::Series(s) => assert_eq!(s.values, vec![Scalar::Int(60), Scalar::Null, Scalar::Int(50)]),
            other => panic!("unexpected {:?}", other),
        }
        let mask = compare(CmpOp::Gt, &Value::Series(ages()), &Value::int(26)).unwrap();
        match mask {
            Value::Series(s) => assert_eq!(
                s.values,
                vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false)]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_scalar_on_left_swaps_comparison() {
        let mask = compare(CmpOp::Lt, &Value::int(26), &Value::Series(ages())).unwrap();
        match mask {
            Value::Series(s) => assert_eq!(s.values[0], Scalar::Bool(true)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_series_arithmetic_aligns_on_labels() {
        let left = Series::with_index(
            None,
            vec![Scalar::Int(1), Scalar::Int(2)],
            Index::from_labels(None, vec![Scalar::Int(0), Scalar::Int(1)]),
        );
        let right = Series::with_index(
            None,
            vec![Scalar::Int(20), Scalar::Int(10)],
            Index::from_labels(None, vec![Scalar::Int(1), Scalar::Int(0)]),
        );
        match binary(BinOp::Add, &Value::Series(left.clone()), &Value::Series(right.clone())).unwrap() {
            Value::Series(s) => assert_eq!(s.values, vec![Scalar::Int(11), Scalar::Int(22)]),
            other => panic!("unexpected {:?}", other),
        }
        let err = compare(CmpOp::Eq, &Value::Series(left), &Value::Series(right)).unwrap_err();
        assert!(err.message.contains("identically-labeled"));
    }

    #[test]
    fn test_membership() {
        let list = Value::List(vec![Value::str("a"), Value::int(1)]);
        assert!(contains(&list, &Value::float(1.0)).unwrap());
        assert!(!contains(&list, &Value::str("b")).unwrap());
        assert!(contains(&Value::str("hello"), &Value::str("ell")).unwrap());
        assert!(contains(&Value::int(3), &Value::int(3)).is_err());
    }

    #[test]
    fn test_invert_mask_and_not() {
        let mask = Series::new(None, vec![Scalar::Bool(true), Scalar::Bool(false)]);
        match unary(UnaryOp::Invert, &Value::Series(mask.clone())).unwrap() {
            Value::Series(s) => assert_eq!(s.values, vec![Scalar::Bool(false), Scalar::Bool(true)]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(unary(UnaryOp::Not, &Value::Series(mask)).is_err());
        assert_eq!(unary(UnaryOp::Neg, &Value::int(3)).unwrap(), Value::int(-3));
    }

    #[test]
    fn test_oversized_repetition_is_refused() {
        let err = binary(BinOp::Mul, &Value::List(vec![Value::int(0)]), &Value::int(1 << 40)).unwrap_err();
        assert_eq!(err.kind, super::super::error::ExceptionKind::BudgetExceeded);
        let err = binary(BinOp::Mul, &Value::str("ab"), &Value::int(1 << 40)).unwrap_err();
        assert_eq!(err.kind, super::super::error::ExceptionKind::BudgetExceeded);
    }
}
