//! The names a snippet can see without importing anything: `pd`, `np` and the builtins.

use std::collections::HashMap;

use super::args::{Args, KW};
use super::datetime;
use super::error::{EngineError, EngineResult, ExceptionKind};
use super::frame::{reduce, round_half_even, sort_positions, Agg, Frame, Index, Series};
use super::value::{Builtin, Module, Scalar, Value};

const PANDAS_FUNCTIONS: &[&str] = &[
    "to_numeric", "to_datetime", "isnull", "isna", "notnull", "notna", "concat", "DataFrame", "Series",
];

const NUMPY_FUNCTIONS: &[&str] = &["where", "isnan", "abs"];

/// Register the standard library into a global table.
pub fn install(globals: &mut HashMap<String, Value>) {
    globals.insert("pd".to_string(), Value::Module(Module::Pandas));
    globals.insert("np".to_string(), Value::Module(Module::Numpy));
    for (name, builtin) in Builtin::ALL {
        globals.insert((*name).to_string(), Value::Builtin(*builtin));
    }
}

/// `pd.<name>` / `np.<name>`
pub fn module_attr(module: Module, name: &str) -> EngineResult<Value> {
    match (module, name) {
        (Module::Pandas, "NA") | (Module::Pandas, "NaT") => Ok(Value::null()),
        (Module::Numpy, "nan") | (Module::Numpy, "NaN") => Ok(Value::float(f64::NAN)),
        (Module::Numpy, "inf") => Ok(Value::float(f64::INFINITY)),
        (Module::Pandas, f) if PANDAS_FUNCTIONS.contains(&f) => {
            Ok(Value::Method(Box::new(Value::Module(module)), f.to_string()))
        }
        (Module::Numpy, f) if NUMPY_FUNCTIONS.contains(&f) => {
            Ok(Value::Method(Box::new(Value::Module(module)), f.to_string()))
        }
        (Module::Pandas, other) => Err(missing("pandas", other)),
        (Module::Numpy, other) => Err(missing("numpy", other)),
    }
}

fn missing(module: &str, name: &str) -> EngineError {
    EngineError::new(
        ExceptionKind::AttributeError,
        format!("module '{}' has no attribute '{}'", module, name),
    )
}

/// Call `pd.<name>(...)` or `np.<name>(...)`.
pub fn call_module(module: Module, name: &str, args: &Args) -> EngineResult<Value> {
    match (module, name) {
        (Module::Pandas, "to_numeric") => to_numeric(args),
        (Module::Pandas, "to_datetime") => datetime::to_datetime(args),
        (Module::Pandas, "isnull" | "isna") => null_mask(args.require(0, "obj")?, false),
        (Module::Pandas, "notnull" | "notna") => null_mask(args.require(0, "obj")?, true),
        (Module::Pandas, "concat") => concat(args),
        (Module::Pandas, "DataFrame") => build_frame(args),
        (Module::Pandas, "Series") => build_series(args),
        (Module::Numpy, "where") => where_(args),
        (Module::Numpy, "isnan") => null_mask(args.require(0, "x")?, false),
        (Module::Numpy, "abs") => abs(args.require(0, "x")?),
        (Module::Pandas, other) => Err(missing("pandas", other)),
        (Module::Numpy, other) => Err(missing("numpy", other)),
    }
}

fn to_numeric(args: &Args) -> EngineResult<Value> {
    args.check(1, &["arg", "errors", "downcast"])?;
    let errors = args.str_or(KW, "errors", "raise")?;
    if !matches!(errors.as_str(), "raise" | "coerce" | "ignore") {
        return Err(EngineError::value("invalid error value specified"));
    }
    let one = |v: &Scalar| -> EngineResult<Scalar> {
        match v {
            Scalar::Str(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    return Ok(Scalar::Int(i));
                }
                match t.parse::<f64>() {
                    Ok(f) => Ok(Scalar::Float(f)),
                    Err(_) if errors == "coerce" => Ok(Scalar::Null),
                    Err(_) => Err(EngineError::value(format!("Unable to parse string \"{}\"", s))),
                }
            }
            Scalar::Bool(b) => Ok(Scalar::Int(*b as i64)),
            other => Ok(other.clone()),
        }
    };
    match args.require(0, "arg")? {
        Value::Scalar(s) => one(s).map(Value::Scalar),
        Value::Series(series) => match series.map_values(one) {
            Ok(converted) => Ok(Value::Series(converted)),
            Err(_) if errors == "ignore" => Ok(Value::Series(series.clone())),
            Err(e) => Err(e),
        },
        list @ (Value::List(_) | Value::Tuple(_)) => {
            let values = list.to_scalars()?.iter().map(one).collect::<EngineResult<Vec<_>>>()?;
            Ok(Value::List(values.into_iter().map(Value::Scalar).collect()))
        }
        other => Err(EngineError::type_error(format!(
            "arg must be a list, tuple, 1-d array, or Series, not '{}'",
            other.type_name()
        ))),
    }
}

fn null_mask(value: &Value, negate: bool) -> EngineResult<Value> {
    let test = |v: &Scalar| Scalar::Bool(v.is_null() != negate);
    match value {
        Value::Scalar(s) => Ok(Value::Scalar(test(s))),
        Value::Series(series) => series.map_values(|v| Ok(test(v))).map(Value::Series),
        Value::Frame(frame) => Ok(Value::Frame(frame.map_cells(test))),
        list @ (Value::List(_) | Value::Tuple(_) | Value::Index(_)) => Ok(Value::List(
            list.to_scalars()?.iter().map(|v| Value::Scalar(test(v))).collect(),
        )),
        other => Err(EngineError::type_error(format!(
            "isna is not defined for '{}'",
            other.type_name()
        ))),
    }
}

fn concat(args: &Args) -> EngineResult<Value> {
    args.check(1, &["objs", "axis", "ignore_index", "join"])?;
    let objs = args.require(0, "objs")?.iterate()?;
    if objs.is_empty() {
        return Err(EngineError::value("No objects to concatenate"));
    }
    let ignore_index = args.bool_or(KW, "ignore_index", false)?;
    let by_columns = match args.opt(KW, "axis") {
        Some(Value::Scalar(Scalar::Int(1))) => true,
        Some(v) => v.as_str() == Some("columns"),
        None => false,
    };

    let frames = objs
        .into_iter()
        .map(|obj| match obj {
            Value::Frame(f) => Ok(f),
            Value::Series(s) => s.to_frame(),
            other => Err(EngineError::type_error(format!(
                "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
                other.type_name()
            ))),
        })
        .collect::<EngineResult<Vec<_>>>()?;

    if !by_columns {
        return Ok(Value::Frame(Frame::concat(&frames, ignore_index)));
    }

    // side by side, aligned on the first frame's index
    let base = frames[0].index().clone();
    let mut columns = Vec::new();
    for frame in &frames {
        for column in frame.columns() {
            let series = Series::with_index(None, column.values.clone(), frame.index().clone());
            columns.push((column.name.clone(), series.aligned_to(&base)));
        }
    }
    let mut out = Frame::from_columns(columns)?;
    if ignore_index {
        let names = (0..out.width()).map(|i| i.to_string()).collect();
        out.set_column_names(names)?;
    }
    out.set_index_labels(base)?;
    Ok(Value::Frame(out))
}

fn build_frame(args: &Args) -> EngineResult<Value> {
    args.check(2, &["data", "columns", "index"])?;
    let mut frame = match args.opt(0, "data") {
        None => Frame::default(),
        Some(Value::Frame(f)) => f.clone(),
        Some(Value::Dict(entries)) => {
            let mut columns = Vec::with_capacity(entries.len());
            let rows = entries
                .iter()
                .filter_map(|(_, v)| match v {
                    Value::Scalar(_) => None,
                    other => other.to_scalars().ok().map(|s| s.len()),
                })
                .max()
                .unwrap_or(1);
            for (name, data) in entries {
                let values = match data {
                    Value::Scalar(s) => vec![s.clone(); rows],
                    other => other.to_scalars()?,
                };
                columns.push((name.to_string(), values));
            }
            Frame::from_columns(columns)?
        }
        Some(Value::List(records)) => {
            let mut names: Vec<String> = Vec::new();
            for record in records {
                match record {
                    Value::Dict(entries) => {
                        for (k, _) in entries {
                            let k = k.to_string();
                            if !names.contains(&k) {
                                names.push(k);
                            }
                        }
                    }
                    Value::List(cells) | Value::Tuple(cells) => {
                        for i in names.len()..cells.len() {
                            names.push(i.to_string());
                        }
                    }
                    other => {
                        return Err(EngineError::type_error(format!(
                            "DataFrame rows must be dicts or lists, not '{}'",
                            other.type_name()
                        )))
                    }
                }
            }
            let mut columns: Vec<(String, Vec<Scalar>)> =
                names.iter().map(|n| (n.clone(), Vec::with_capacity(records.len()))).collect();
            for record in records {
                for (i, (name, values)) in columns.iter_mut().enumerate() {
                    let cell = match record {
                        Value::Dict(entries) => entries
                            .iter()
                            .find(|(k, _)| k.to_string() == *name)
                            .and_then(|(_, v)| v.as_scalar().cloned()),
                        Value::List(cells) | Value::Tuple(cells) => {
                            cells.get(i).and_then(|v| v.as_scalar().cloned())
                        }
                        _ => None,
                    };
                    values.push(cell.unwrap_or_default());
                }
            }
            Frame::from_columns(columns)?
        }
        Some(other) => {
            return Err(EngineError::type_error(format!(
                "DataFrame constructor not properly called with '{}'",
                other.type_name()
            )))
        }
    };
    if let Some(columns) = args.names_opt(KW, "columns")? {
        if frame.width() == columns.len() && frame.columns().iter().any(|c| !columns.contains(&c.name)) {
            frame.set_column_names(columns)?;
        } else {
            frame = frame.select(&columns)?;
        }
    }
    if let Some(index) = args.opt(1, "index") {
        frame.set_index_labels(Index::from_labels(None, index.to_scalars()?))?;
    }
    Ok(Value::Frame(frame))
}

fn build_series(args: &Args) -> EngineResult<Value> {
    args.check(2, &["data", "index", "name", "dtype"])?;
    let name = args.str_opt(KW, "name")?;
    let mut series = match args.opt(0, "data") {
        None => Series::new(name.clone(), Vec::new()),
        Some(Value::Dict(entries)) => {
            let labels = entries.iter().map(|(k, _)| k.clone()).collect();
            let values = entries
                .iter()
                .map(|(_, v)| v.as_scalar().cloned().unwrap_or_default())
                .collect();
            Series::with_index(name.clone(), values, Index::from_labels(None, labels))
        }
        Some(Value::Series(s)) => s.clone(),
        Some(other) => Series::new(name.clone(), other.to_scalars()?),
    };
    if name.is_some() {
        series.name = name;
    }
    if let Some(index) = args.opt(1, "index") {
        let labels = index.to_scalars()?;
        if labels.len() != series.len() {
            return Err(EngineError::value(format!(
                "Length of values ({}) does not match length of index ({})",
                series.len(),
                labels.len()
            )));
        }
        series.index = Index::from_labels(None, labels);
    }
    Ok(Value::Series(series))
}

/// `np.where(cond, x, y)`
fn where_(args: &Args) -> EngineResult<Value> {
    let cond = args.require(0, "condition")?;
    let cond = match cond {
        Value::Series(s) => s.clone(),
        other => Series::new(None, other.to_scalars()?),
    };
    let pick = |v: &Value, label: &str| -> EngineResult<Vec<Scalar>> {
        match v {
            Value::Scalar(s) => Ok(vec![s.clone(); cond.len()]),
            Value::Series(s) => Ok(s.aligned_to(&cond.index)),
            other => {
                let values = other.to_scalars()?;
                if values.len() != cond.len() {
                    return Err(EngineError::value(format!(
                        "operands could not be broadcast together ({} vs {} for {})",
                        cond.len(),
                        values.len(),
                        label
                    )));
                }
                Ok(values)
            }
        }
    };
    let yes = pick(args.require(1, "x")?, "x")?;
    let no = pick(args.require(2, "y")?, "y")?;
    let values = cond
        .values
        .iter()
        .zip(yes.into_iter().zip(no))
        .map(|(c, (y, n))| if c.truthy() { y } else { n })
        .collect();
    Ok(Value::Series(Series::with_index(None, values, cond.index.clone())))
}

fn abs_scalar(v: &Scalar) -> EngineResult<Scalar> {
    match v {
        Scalar::Int(i) => Ok(Scalar::Int(i.wrapping_abs())),
        Scalar::Float(f) => Ok(Scalar::Float(f.abs())),
        Scalar::Bool(b) => Ok(Scalar::Int(*b as i64)),
        Scalar::Null => Ok(Scalar::Null),
        Scalar::Str(_) => Err(EngineError::type_error("bad operand type for abs(): 'str'")),
    }
}

fn abs(value: &Value) -> EngineResult<Value> {
    match value {
        Value::Scalar(s) => abs_scalar(s).map(Value::Scalar),
        Value::Series(s) => s.map_values(abs_scalar).map(Value::Series),
        Value::Frame(f) => f.try_map_columns(&[], |_, v| abs_scalar(v)).map(Value::Frame),
        other => Err(EngineError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

// =============================================================================
// Builtins
// =============================================================================

/// Call a Python builtin.
pub fn call_builtin(builtin: Builtin, args: &Args) -> EngineResult<Value> {
    match builtin {
        Builtin::Len => {
            args.check(1, &[])?;
            let n = match args.require(0, "obj")? {
                Value::Frame(f) => f.len(),
                Value::Series(s) | Value::StrAccessor(s) => s.len(),
                Value::List(v) | Value::Tuple(v) => v.len(),
                Value::Index(v) => v.len(),
                Value::Dict(d) => d.len(),
                Value::Scalar(Scalar::Str(s)) => s.chars().count(),
                other => {
                    return Err(EngineError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::int(n as i64))
        }
        Builtin::Str => match args.opt(0, "object") {
            None => Ok(Value::str("")),
            Some(Value::Scalar(s)) => Ok(Value::Scalar(s.to_str())),
            Some(other) => Ok(Value::str(other.to_string())),
        },
        Builtin::Int | Builtin::Float | Builtin::Bool => {
            let value = match args.opt(0, "x") {
                None => return Ok(default_of(builtin)),
                Some(v) => v,
            };
            if builtin == Builtin::Bool {
                return Ok(Value::bool(value.truthy()?));
            }
            let scalar = value.as_scalar().ok_or_else(|| {
                EngineError::type_error(format!(
                    "{}() argument must be a string or a number, not '{}'",
                    builtin.name(),
                    value.type_name()
                ))
            })?;
            let converted = if builtin == Builtin::Int { scalar.to_int()? } else { scalar.to_float()? };
            Ok(Value::Scalar(converted))
        }
        Builtin::Round => {
            let ndigits = args.int_opt(1, "ndigits")?;
            let round_one = |v: &Scalar| -> EngineResult<Scalar> {
                match (v, ndigits) {
                    (Scalar::Int(i), _) => Ok(Scalar::Int(*i)),
                    (Scalar::Bool(b), _) => Ok(Scalar::Int(*b as i64)),
                    (Scalar::Float(f), None) => {
                        if !f.is_finite() {
                            return Err(EngineError::value("cannot convert float NaN or infinity to integer"));
                        }
                        Ok(Scalar::Int(round_half_even(*f, 0) as i64))
                    }
                    (Scalar::Float(f), Some(d)) => Ok(Scalar::Float(round_half_even(*f, d))),
                    (Scalar::Null, _) => Ok(Scalar::Null),
                    (other, _) => Err(EngineError::type_error(format!(
                        "type {} doesn't define __round__ method",
                        other.type_name()
                    ))),
                }
            };
            match args.require(0, "number")? {
                Value::Scalar(s) => round_one(s).map(Value::Scalar),
                Value::Series(s) => {
                    let d = ndigits.unwrap_or(0);
                    s.map_values(|v| {
                        Ok(match v {
                            Scalar::Float(f) => Scalar::Float(round_half_even(*f, d)),
                            other => other.clone(),
                        })
                    })
                    .map(Value::Series)
                }
                other => Err(EngineError::type_error(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))),
            }
        }
        Builtin::Abs => abs(args.require(0, "x")?),
        Builtin::Min | Builtin::Max => {
            let agg = if builtin == Builtin::Min { Agg::Min } else { Agg::Max };
            let items = if args.len() == 1 {
                args.require(0, "iterable")?.to_scalars()?
            } else {
                (0..args.len())
                    .map(|i| {
                        args.require(i, "arg")?.as_scalar().cloned().ok_or_else(|| {
                            EngineError::type_error(format!("{}() arguments must be scalars", builtin.name()))
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?
            };
            if items.is_empty() {
                return Err(EngineError::value(format!("{}() arg is an empty sequence", builtin.name())));
            }
            reduce(agg, &items).map(Value::Scalar)
        }
        Builtin::List => match args.opt(0, "iterable") {
            None => Ok(Value::List(Vec::new())),
            Some(v) => v.iterate().map(Value::List),
        },
        Builtin::Sum => {
            let items = args.require(0, "iterable")?.to_scalars()?;
            let start = args.scalar_opt(1, "start")?.unwrap_or(Scalar::Int(0));
            let mut total = start;
            for item in &items {
                total = super::value::scalar_binary(super::ast::BinOp::Add, &total, item)?;
            }
            Ok(Value::Scalar(total))
        }
        Builtin::Sorted => {
            let items = args.require(0, "iterable")?.to_scalars()?;
            let reverse = args.bool_or(KW, "reverse", false)?;
            let positions = sort_positions(&[items.as_slice()], &[!reverse], true)?;
            Ok(Value::List(positions.into_iter().map(|p| Value::Scalar(items[p].clone())).collect()))
        }
    }
}

fn default_of(builtin: Builtin) -> Value {
    match builtin {
        Builtin::Int => Value::int(0),
        Builtin::Float => Value::float(0.0),
        _ => Value::bool(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(builtin: Builtin, args: Vec<Value>) -> Value {
        call_builtin(builtin, &Args::positional(builtin.name(), args)).unwrap()
    }

    #[test]
    fn test_round_is_half_even() {
        assert_eq!(call(Builtin::Round, vec![Value::float(2.5)]), Value::int(2));
        assert_eq!(call(Builtin::Round, vec![Value::float(3.5)]), Value::int(4));
        assert_eq!(call(Builtin::Round, vec![Value::float(1.25), Value::int(1)]), Value::float(1.2));
    }

    #[test]
    fn test_len_and_sorted() {
        let items = Value::List(vec![Value::int(3), Value::int(1), Value::int(2)]);
        assert_eq!(call(Builtin::Len, vec![items.clone()]), Value::int(3));
        assert_eq!(
            call(Builtin::Sorted, vec![items]),
            Value::List(vec![Value::int(1), Value::int(2), Value::int(3)])
        );
        assert_eq!(call(Builtin::Len, vec![Value::str("héllo")]), Value::int(5));
    }

    #[test]
    fn test_to_numeric_coerce() {
        let series = Series::new(None, vec![Scalar::str("1"), Scalar::str("x"), Scalar::str("2.5")]);
        let args = Args::new(
            "to_numeric",
            vec![Value::Series(series)],
            vec![("errors".into(), Value::str("coerce"))],
        );
        match call_module(Module::Pandas, "to_numeric", &args).unwrap() {
            Value::Series(s) => assert_eq!(s.values, vec![Scalar::Int(1), Scalar::Null, Scalar::Float(2.5)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_to_numeric_raises_on_text() {
        let args = Args::positional("to_numeric", vec![Value::str("abc")]);
        let err = call_module(Module::Pandas, "to_numeric", &args).unwrap_err();
        assert!(err.message.contains("Unable to parse string"));
    }

    #[test]
    fn test_dataframe_from_records_fills_missing_keys() {
        let records = Value::List(vec![
            Value::Dict(vec![(Scalar::str("a"), Value::int(1))]),
            Value::Dict(vec![(Scalar::str("b"), Value::int(2))]),
        ]);
        match call_module(Module::Pandas, "DataFrame", &Args::positional("DataFrame", vec![records])).unwrap() {
            Value::Frame(f) => {
                assert_eq!(f.column("a").unwrap(), &[Scalar::Int(1), Scalar::Null]);
                assert_eq!(f.column("b").unwrap(), &[Scalar::Null, Scalar::Int(2)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_module_constants() {
        assert_eq!(module_attr(Module::Pandas, "NA").unwrap(), Value::null());
        assert!(module_attr(Module::Pandas, "read_csv").is_err());
    }
}
