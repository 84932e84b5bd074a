//! Attributes and methods of library values: `DataFrame`, `Series`, group-by handles,
//! accessors, and the few Python containers snippets use.

use std::collections::HashSet;

use regex::Regex;

use super::args::{Args, KW};
use super::datetime;
use super::error::{EngineError, EngineResult, ExceptionKind};
use super::frame::{
    head_span, reduce, round_half_even, sort_positions, tail_span, Agg, Frame, GroupBy, GroupResult, Index, Keep,
    Series,
};
use super::indexing::column_values;
use super::interpreter::Interpreter;
use super::namespace;
use super::ops;
use super::strings;
use super::value::{Builtin, DType, Scalar, Value};

pub const FRAME_METHODS: &[&str] = &[
    "dropna", "fillna", "ffill", "bfill", "drop", "rename", "astype", "sort_values", "sort_index",
    "drop_duplicates", "duplicated", "head", "tail", "reset_index", "set_index", "replace", "round",
    "copy", "query", "groupby", "isnull", "isna", "notnull", "notna", "insert", "assign", "apply",
    "applymap", "map", "nlargest", "nsmallest", "abs", "sum", "mean", "median", "min", "max",
    "count", "nunique", "select_dtypes", "add_prefix", "add_suffix", "reindex", "filter", "isin",
];

pub const SERIES_METHODS: &[&str] = &[
    "isnull", "isna", "notnull", "notna", "fillna", "ffill", "bfill", "dropna", "astype", "round",
    "abs", "map", "apply", "replace", "isin", "between", "unique", "nunique", "value_counts", "sum",
    "mean", "median", "min", "max", "count", "std", "var", "reset_index", "to_frame", "tolist",
    "to_list", "head", "tail", "sort_values", "sort_index", "copy", "rename", "duplicated",
    "drop_duplicates", "any", "all", "clip", "where",
];

pub const GROUPBY_METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "nunique", "first", "last", "size", "agg",
    "aggregate", "transform",
];

const INDEX_METHODS: &[&str] = &["tolist", "to_list", "isin", "astype"];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "update", "copy"];
const LIST_METHODS: &[&str] = &["append", "extend", "index", "count", "copy", "tolist"];

/// Methods that update their receiver and return `None`.
pub fn mutates_receiver(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::Frame(_) => name == "insert",
        Value::List(_) => matches!(name, "append" | "extend"),
        Value::Dict(_) => name == "update",
        _ => false,
    }
}

/// pandas dtype name for a column's values.
pub fn infer_dtype(values: &[Scalar]) -> &'static str {
    let mut has_null = false;
    let (mut bools, mut ints, mut floats, mut others) = (0, 0, 0, 0);
    for v in values {
        match v {
            Scalar::Null => has_null = true,
            Scalar::Bool(_) => bools += 1,
            Scalar::Int(_) => ints += 1,
            Scalar::Float(_) => floats += 1,
            Scalar::Str(_) => others += 1,
        }
    }
    match (bools, ints, floats, others) {
        (_, _, _, o) if o > 0 => "object",
        (b, 0, 0, _) if b > 0 && !has_null => "bool",
        (0, i, 0, _) if i > 0 && !has_null => "int64",
        (0, _, _, _) if ints + floats > 0 => "float64",
        _ => "object",
    }
}

fn is_numeric_dtype(values: &[Scalar]) -> bool {
    matches!(infer_dtype(values), "int64" | "float64" | "bool")
}

fn frame_value(result: GroupResult) -> Value {
    match result {
        GroupResult::Frame(f) => Value::Frame(f),
        GroupResult::Series(s) => Value::Series(s),
    }
}

fn with_index(mut frame: Frame, index: Index) -> EngineResult<Frame> {
    frame.set_index_labels(index)?;
    Ok(frame)
}

fn dtype_of(value: &Value) -> EngineResult<DType> {
    match value {
        Value::Scalar(Scalar::Str(name)) => DType::parse(name),
        Value::Builtin(b) => b.as_dtype().ok_or_else(|| {
            EngineError::type_error(format!("data type '{}' not understood", b.name()))
        }),
        other => Err(EngineError::type_error(format!(
            "data type '{}' not understood",
            other.type_name()
        ))),
    }
}

fn keep_arg(args: &Args) -> EngineResult<Keep> {
    match args.get(KW, "keep") {
        None => Ok(Keep::First),
        Some(Value::Scalar(Scalar::Bool(false))) => Ok(Keep::None),
        Some(Value::Scalar(Scalar::Str(s))) if s == "first" => Ok(Keep::First),
        Some(Value::Scalar(Scalar::Str(s))) if s == "last" => Ok(Keep::Last),
        Some(other) => Err(EngineError::value(format!(
            "keep must be either \"first\", \"last\" or False, got {}",
            other
        ))),
    }
}

fn axis_is_columns(args: &Args, pos: usize) -> EngineResult<bool> {
    match args.opt(pos, "axis") {
        None => Ok(false),
        Some(Value::Scalar(Scalar::Int(0))) => Ok(false),
        Some(Value::Scalar(Scalar::Int(1))) => Ok(true),
        Some(Value::Scalar(Scalar::Str(s))) if s == "index" || s == "rows" => Ok(false),
        Some(Value::Scalar(Scalar::Str(s))) if s == "columns" => Ok(true),
        Some(other) => Err(EngineError::value(format!("No axis named {}", other))),
    }
}

fn ascending_arg(args: &Args, pos: usize, keys: usize) -> EngineResult<Vec<bool>> {
    match args.opt(pos, "ascending") {
        None => Ok(vec![true; keys]),
        Some(Value::List(items)) | Some(Value::Tuple(items)) => {
            if items.len() != keys {
                return Err(EngineError::value(format!(
                    "Length of ascending ({}) != length of by ({})",
                    items.len(),
                    keys
                )));
            }
            items.iter().map(Value::truthy).collect()
        }
        Some(v) => Ok(vec![v.truthy()?; keys]),
    }
}

fn na_last(args: &Args) -> EngineResult<bool> {
    match args.str_or(KW, "na_position", "last")?.as_str() {
        "last" => Ok(true),
        "first" => Ok(false),
        other => Err(EngineError::value(format!("invalid na_position: {}", other))),
    }
}

fn round_scalar(value: &Scalar, decimals: i64) -> Scalar {
    match value {
        Scalar::Float(f) => Scalar::Float(round_half_even(*f, decimals)),
        Scalar::Int(i) if decimals < 0 => {
            Scalar::Int(round_half_even(*i as f64, decimals) as i64)
        }
        other => other.clone(),
    }
}

fn abs_scalar(value: &Scalar) -> EngineResult<Scalar> {
    match value {
        Scalar::Int(i) => Ok(i.checked_abs().map_or(Scalar::Float((*i as f64).abs()), Scalar::Int)),
        Scalar::Float(f) => Ok(Scalar::Float(f.abs())),
        Scalar::Bool(b) => Ok(Scalar::Int(*b as i64)),
        Scalar::Null => Ok(Scalar::Null),
        Scalar::Str(_) => Err(EngineError::type_error("bad operand type for abs(): 'str'")),
    }
}

fn convert_all(values: &[Scalar], dtype: DType, ignore_errors: bool) -> EngineResult<Vec<Scalar>> {
    match values.iter().map(|v| dtype.convert(v)).collect::<EngineResult<Vec<_>>>() {
        Ok(converted) => Ok(converted),
        Err(_) if ignore_errors => Ok(values.to_vec()),
        Err(e) => Err(e),
    }
}

fn ignore_errors(args: &Args) -> EngineResult<bool> {
    Ok(args.str_or(KW, "errors", "raise")? == "ignore")
}

fn agg_name(name: &str) -> EngineResult<Agg> {
    Agg::parse(name).ok_or_else(|| EngineError::attribute("DataFrameGroupBy", name))
}

// =============================================================================
// replace
// =============================================================================

enum Rule {
    Exact(Scalar, Scalar),
    Pattern(Regex, Scalar),
}

impl Rule {
    fn new(old: Scalar, new: Scalar, regex: bool) -> EngineResult<Rule> {
        match (&old, regex) {
            (Scalar::Str(pattern), true) => {
                let re = strings::compile(pattern, true)?;
                let new = match new {
                    Scalar::Str(template) => Scalar::Str(strings::python_replacement(&template)),
                    other => other,
                };
                Ok(Rule::Pattern(re, new))
            }
            _ => Ok(Rule::Exact(old, new)),
        }
    }

    fn apply(&self, value: &Scalar) -> Option<Scalar> {
        match self {
            Rule::Exact(old, new) => {
                let hit = match old {
                    Scalar::Null => value.is_null(),
                    Scalar::Str(_) => old == value,
                    _ => !matches!(value, Scalar::Str(_)) && old.loose_eq(value),
                };
                hit.then(|| new.clone())
            }
            Rule::Pattern(re, new) => {
                let text = value.as_str()?;
                if !re.is_match(text) {
                    return None;
                }
                Some(match new {
                    Scalar::Str(template) => Scalar::Str(re.replace_all(text, template.as_str()).into_owned()),
                    other => other.clone(),
                })
            }
        }
    }
}

/// Replacement rules, global or for one column.
struct Replacer {
    rules: Vec<(Option<String>, Rule)>,
}

impl Replacer {
    fn from_args(args: &Args) -> EngineResult<Replacer> {
        let regex = args.bool_or(KW, "regex", false)?;
        let value = args.get(1, "value");
        let mut rules = Vec::new();
        match args.require(0, "to_replace")? {
            Value::Scalar(old) => {
                let new = value.and_then(Value::as_scalar).cloned().unwrap_or_default();
                rules.push((None, Rule::new(old.clone(), new, regex)?));
            }
            list @ (Value::List(_) | Value::Tuple(_)) => {
                let olds = list.to_scalars()?;
                match value {
                    Some(Value::Scalar(new)) => {
                        for old in olds {
                            rules.push((None, Rule::new(old, new.clone(), regex)?));
                        }
                    }
                    Some(news @ (Value::List(_) | Value::Tuple(_))) => {
                        let news = news.to_scalars()?;
                        if news.len() != olds.len() {
                            return Err(EngineError::value(format!(
                                "Replacement lists must match in length. Expecting {} got {}",
                                olds.len(),
                                news.len()
                            )));
                        }
                        for (old, new) in olds.into_iter().zip(news) {
                            rules.push((None, Rule::new(old, new, regex)?));
                        }
                    }
                    _ => {
                        for old in olds {
                            rules.push((None, Rule::new(old, Scalar::Null, regex)?));
                        }
                    }
                }
            }
            Value::Dict(entries) => {
                let value = value.filter(|v| !matches!(v, Value::Scalar(Scalar::Null)));
                for (key, entry) in entries {
                    match (entry, value) {
                        (Value::Dict(nested), _) => {
                            for (old, new) in nested {
                                let new = new.as_scalar().cloned().unwrap_or_default();
                                rules.push((Some(key.to_string()), Rule::new(old.clone(), new, regex)?));
                            }
                        }
                        (Value::Scalar(old), Some(Value::Scalar(new))) => {
                            rules.push((Some(key.to_string()), Rule::new(old.clone(), new.clone(), regex)?));
                        }
                        (Value::Scalar(new), None) => {
                            rules.push((None, Rule::new(key.clone(), new.clone(), regex)?));
                        }
                        (other, _) => {
                            return Err(EngineError::type_error(format!(
                                "cannot replace with a '{}'",
                                other.type_name()
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(EngineError::type_error(format!(
                    "Expecting 'to_replace' to be either a scalar, array-like, dict or None, got '{}'",
                    other.type_name()
                )))
            }
        }
        Ok(Replacer { rules })
    }

    fn apply(&self, column: Option<&str>, value: &Scalar) -> Scalar {
        self.rules
            .iter()
            .filter(|(only, _)| only.is_none() || only.as_deref() == column)
            .find_map(|(_, rule)| rule.apply(value))
            .unwrap_or_else(|| value.clone())
    }
}

// =============================================================================
// Attributes
// =============================================================================

fn bound(receiver: Value, name: &str) -> Value {
    Value::Method(Box::new(receiver), name.to_string())
}

/// `obj.name = value`, returning the updated owner.
pub fn set_attr(owner: Value, name: &str, value: Value) -> EngineResult<Value> {
    match owner {
        Value::Frame(mut frame) => match name {
            "columns" => {
                frame.set_column_names(value.to_names()?)?;
                Ok(Value::Frame(frame))
            }
            "index" => {
                let labels = value.to_scalars()?;
                frame.set_index_labels(Index::from_labels(None, labels))?;
                Ok(Value::Frame(frame))
            }
            "loc" | "iloc" | "at" | "iat" => match value {
                Value::Indexer { frame, .. } => Ok(Value::Frame(*frame)),
                other => Err(EngineError::attribute("DataFrame", &format!("{} from {}", name, other.type_name()))),
            },
            column if frame.has_column(column) => {
                let values = column_values(&frame, &value)?;
                frame.set_column(column, values)?;
                Ok(Value::Frame(frame))
            }
            _ => Err(EngineError::new(
                ExceptionKind::AttributeError,
                "Pandas doesn't allow columns to be created via a new attribute name",
            )),
        },
        Value::Series(mut series) => match name {
            "name" => {
                series.name = match value {
                    Value::Scalar(Scalar::Null) => None,
                    Value::Scalar(s) => Some(s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string())),
                    other => return Err(EngineError::type_error(format!("Series.name must be a hashable type, not '{}'", other.type_name()))),
                };
                Ok(Value::Series(series))
            }
            "index" => {
                let labels = value.to_scalars()?;
                if labels.len() != series.len() {
                    return Err(EngineError::value(format!(
                        "Length mismatch: Expected axis has {} elements, new values have {} elements",
                        series.len(),
                        labels.len()
                    )));
                }
                series.index = Index::from_labels(None, labels);
                Ok(Value::Series(series))
            }
            "loc" | "iloc" | "at" | "iat" => match value {
                Value::SeriesIndexer { series, .. } => Ok(Value::Series(*series)),
                other => Err(EngineError::attribute("Series", &format!("{} from {}", name, other.type_name()))),
            },
            other => Err(EngineError::attribute("Series", other)),
        },
        other => Err(EngineError::attribute(other.type_name(), name)),
    }
}

impl Interpreter<'_> {
    /// `obj.name`
    pub(super) fn get_attr(&mut self, owner: Value, name: &str) -> EngineResult<Value> {
        if name.starts_with('_') {
            return Err(EngineError::attribute(owner.type_name(), name));
        }
        match owner {
            Value::Frame(frame) => frame_attr(frame, name),
            Value::Series(series) => series_attr(series, name),
            Value::Index(labels) => match name {
                "str" => Ok(Value::StrAccessor(Series::new(None, labels))),
                "size" => Ok(Value::int(labels.len() as i64)),
                "values" => Ok(Value::List(labels.into_iter().map(Value::Scalar).collect())),
                n if INDEX_METHODS.contains(&n) => Ok(bound(Value::Index(labels), n)),
                other => Err(EngineError::attribute("Index", other)),
            },
            Value::StrAccessor(series) if strings::ACCESSOR_METHODS.contains(&name) => {
                Ok(bound(Value::StrAccessor(series), name))
            }
            Value::DtAccessor(series) if datetime::DT_ATTRIBUTES.contains(&name) => {
                datetime::attribute(&series, name).map(Value::Series)
            }
            Value::DtAccessor(series) if datetime::DT_METHODS.contains(&name) => {
                Ok(bound(Value::DtAccessor(series), name))
            }
            Value::GroupBy(group) => {
                if GROUPBY_METHODS.contains(&name) {
                    Ok(bound(Value::GroupBy(group), name))
                } else if group.frame.has_column(name) {
                    group.select(vec![name.to_string()], true).map(|g| Value::GroupBy(Box::new(g)))
                } else {
                    Err(EngineError::attribute("DataFrameGroupBy", name))
                }
            }
            Value::Module(module) => namespace::module_attr(module, name),
            Value::Builtin(Builtin::Str) if strings::STRING_METHODS.contains(&name) => {
                Ok(bound(Value::Builtin(Builtin::Str), name))
            }
            Value::Scalar(Scalar::Str(s)) if strings::STRING_METHODS.contains(&name) => {
                Ok(bound(Value::Scalar(Scalar::Str(s)), name))
            }
            Value::Dict(entries) if DICT_METHODS.contains(&name) => Ok(bound(Value::Dict(entries), name)),
            Value::List(items) if LIST_METHODS.contains(&name) => Ok(bound(Value::List(items), name)),
            other => Err(EngineError::attribute(other.type_name(), name)),
        }
    }

    /// `receiver.name(*args, **kwargs)`
    pub(super) fn call_method(&mut self, receiver: Value, name: &str, args: Args) -> EngineResult<Value> {
        match receiver {
            Value::Frame(frame) => self.frame_method(frame, name, args),
            Value::Series(series) => self.series_method(series, name, args),
            Value::GroupBy(group) => groupby_method(&group, name, &args),
            Value::StrAccessor(series) => strings::accessor_call(&series, name, &args).map(Value::Series),
            Value::DtAccessor(series) => datetime::call(&series, name, &args).map(Value::Series),
            Value::Index(labels) => index_method(labels, name, &args),
            Value::Scalar(Scalar::Str(s)) => strings::string_call(&s, name, &args),
            Value::Builtin(Builtin::Str) => {
                let mut args = args;
                match args.shift() {
                    Some(Value::Scalar(Scalar::Str(s))) => strings::string_call(&s, name, &args),
                    Some(other) => Err(EngineError::type_error(format!(
                        "descriptor '{}' for 'str' objects doesn't apply to a '{}' object",
                        name,
                        other.type_name()
                    ))),
                    None => Err(EngineError::type_error(format!(
                        "unbound method str.{}() needs an argument",
                        name
                    ))),
                }
            }
            Value::Dict(entries) => dict_method(entries, name, &args),
            Value::List(items) => list_method(items, name, &args),
            Value::Module(module) => namespace::call_module(module, name, &args),
            other => Err(EngineError::attribute(other.type_name(), name)),
        }
    }

    // -------------------------------------------------------------------------
    // DataFrame
    // -------------------------------------------------------------------------

    fn frame_method(&mut self, frame: Frame, name: &str, args: Args) -> EngineResult<Value> {
        let out = match name {
            "dropna" => {
                args.check(0, &["axis", "how", "thresh", "subset"])?;
                let how_all = match args.str_or(KW, "how", "any")?.as_str() {
                    "any" => false,
                    "all" => true,
                    other => return Err(EngineError::value(format!("invalid how option: {}", other))),
                };
                if axis_is_columns(&args, KW)? {
                    frame.dropna_columns(how_all)
                } else {
                    let subset = args.names_opt(KW, "subset")?;
                    let thresh = args.int_opt(KW, "thresh")?.map(|t| t.max(0) as usize);
                    frame.dropna(subset.as_deref(), how_all, thresh)?
                }
            }
            "fillna" => {
                args.check(1, &["value", "method", "axis", "limit"])?;
                match args.str_opt(KW, "method")?.as_deref() {
                    Some("ffill" | "pad") => frame.ffill(),
                    Some("bfill" | "backfill") => frame.bfill(),
                    Some(other) => return Err(EngineError::value(format!("Invalid fill method. Expecting pad (ffill) or backfill (bfill). Got {}", other))),
                    None => match args.get(0, "value") {
                        Some(Value::Scalar(v)) => frame.fillna(Some(v), &[]),
                        Some(Value::Dict(entries)) => {
                            let per_column = entries
                                .iter()
                                .filter_map(|(k, v)| v.as_scalar().map(|s| (k.to_string(), s.clone())))
                                .collect::<Vec<_>>();
                            frame.fillna(None, &per_column)
                        }
                        Some(Value::Series(fills)) => {
                            let per_column = fills
                                .index
                                .labels()
                                .into_iter()
                                .zip(fills.values.iter().cloned())
                                .map(|(k, v)| (k.to_string(), v))
                                .collect::<Vec<_>>();
                            frame.fillna(None, &per_column)
                        }
                        Some(other) => {
                            return Err(EngineError::type_error(format!(
                                "\"value\" parameter must be a scalar or dict, but you passed a \"{}\"",
                                other.type_name()
                            )))
                        }
                        None => return Err(EngineError::value("Must specify a fill 'value' or 'method'.")),
                    },
                }
            }
            "ffill" => frame.ffill(),
            "bfill" => frame.bfill(),
            "drop" => {
                args.check(2, &["labels", "axis", "index", "columns", "errors"])?;
                let ignore = ignore_errors(&args)?;
                let mut out = frame;
                if let Some(columns) = args.names_opt(KW, "columns")? {
                    out = out.drop_columns(&columns, ignore)?;
                }
                if let Some(index) = args.opt(KW, "index") {
                    out = out.drop_rows(&index.to_scalars()?, ignore)?;
                }
                if let Some(labels) = args.opt(0, "labels") {
                    if axis_is_columns(&args, 1)? {
                        out = out.drop_columns(&labels.to_names()?, ignore)?;
                    } else {
                        out = out.drop_rows(&labels.to_scalars()?, ignore)?;
                    }
                }
                out
            }
            "rename" => {
                args.check(1, &["mapper", "columns", "index", "axis", "errors"])?;
                let mapper = match args.opt(KW, "columns") {
                    Some(m) => Some(m),
                    None if axis_is_columns(&args, KW)? => args.opt(0, "mapper"),
                    None => None,
                };
                let mut out = match mapper {
                    Some(Value::Dict(entries)) => {
                        let mapping: Vec<(String, String)> = entries
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect();
                        frame.rename_columns(&mapping)
                    }
                    Some(func) => {
                        let func = func.clone();
                        let mut names = Vec::with_capacity(frame.width());
                        for column in frame.column_names() {
                            names.push(self.call_element(&func, &Scalar::str(column), &[])?.to_string());
                        }
                        let mut out = frame.clone();
                        out.set_column_names(names)?;
                        out
                    }
                    None => frame.clone(),
                };
                if let Some(Value::Dict(entries)) = args.opt(KW, "index") {
                    let labels = out
                        .index()
                        .labels()
                        .into_iter()
                        .map(|l| {
                            entries
                                .iter()
                                .find(|(k, _)| k.key() == l.key())
                                .and_then(|(_, v)| v.as_scalar().cloned())
                                .unwrap_or(l)
                        })
                        .collect();
                    let name = out.index().name().map(str::to_string);
                    out.set_index_labels(Index::from_labels(name, labels))?;
                }
                out
            }
            "astype" => {
                args.check(1, &["dtype", "errors", "copy"])?;
                let ignore = ignore_errors(&args)?;
                match args.require(0, "dtype")? {
                    Value::Dict(entries) => {
                        let mut out = frame;
                        for (column, dtype) in entries {
                            let name = column.to_string();
                            let dtype = dtype_of(dtype)?;
                            let values = out.column(&name).ok_or_else(|| EngineError::key(&name))?;
                            let converted = convert_all(values, dtype, ignore)?;
                            out.set_column(&name, converted)?;
                        }
                        out
                    }
                    other => {
                        let dtype = dtype_of(other)?;
                        let mut out = frame.clone();
                        for column in frame.columns() {
                            out.set_column(&column.name, convert_all(&column.values, dtype, ignore)?)?;
                        }
                        out
                    }
                }
            }
            "sort_values" => {
                args.check(1, &["by", "ascending", "na_position", "ignore_index", "kind", "axis"])?;
                let by = args.require(0, "by")?.to_names()?;
                let ascending = ascending_arg(&args, KW, by.len())?;
                let sorted = frame.sort_values(&by, &ascending, na_last(&args)?)?;
                if args.bool_or(KW, "ignore_index", false)? {
                    sorted.reset_index(true)?
                } else {
                    sorted
                }
            }
            "sort_index" => frame.sort_index(args.bool_or(KW, "ascending", true)?)?,
            "drop_duplicates" => {
                args.check(1, &["subset", "keep", "ignore_index"])?;
                let subset = args.names_opt(0, "subset")?;
                let out = frame.drop_duplicates(subset.as_deref(), keep_arg(&args)?)?;
                if args.bool_or(KW, "ignore_index", false)? {
                    out.reset_index(true)?
                } else {
                    out
                }
            }
            "duplicated" => {
                let subset = args.names_opt(0, "subset")?;
                let mask = frame.duplicated(subset.as_deref(), keep_arg(&args)?)?;
                return Ok(Value::Series(Series::with_index(
                    None,
                    mask.into_iter().map(Scalar::Bool).collect(),
                    frame.index().clone(),
                )));
            }
            "head" => frame.head(args.int_or(0, "n", 5)?),
            "tail" => frame.tail(args.int_or(0, "n", 5)?),
            "reset_index" => {
                args.check(1, &["drop", "level"])?;
                frame.reset_index(args.bool_or(KW, "drop", false)?)?
            }
            "set_index" => {
                args.check(1, &["keys", "drop", "append"])?;
                let keys = args.require(0, "keys")?.to_names()?;
                match keys.as_slice() {
                    [key] => frame.set_index(key, args.bool_or(KW, "drop", true)?)?,
                    _ => return Err(EngineError::value("set_index supports a single key column")),
                }
            }
            "replace" => {
                let replacer = Replacer::from_args(&args)?;
                frame.try_map_columns(&[], |column, v| Ok(replacer.apply(Some(column), v)))?
            }
            "round" => match args.opt(0, "decimals") {
                Some(Value::Dict(entries)) => {
                    let mut out = frame;
                    for (column, decimals) in entries {
                        let name = column.to_string();
                        let decimals = decimals.as_scalar().and_then(Scalar::as_i64).unwrap_or(0);
                        out = out.try_map_columns(&[name], |_, v| Ok(round_scalar(v, decimals)))?;
                    }
                    out
                }
                _ => {
                    let decimals = args.int_or(0, "decimals", 0)?;
                    frame.try_map_columns(&[], |_, v| Ok(round_scalar(v, decimals)))?
                }
            },
            "copy" => frame,
            "query" => {
                args.check(1, &["expr"])?;
                let text = args.require_str(0, "expr")?;
                let mask = self.query_mask(&frame, &text)?;
                frame.filter(&mask)?
            }
            "groupby" => {
                args.check(1, &["by", "as_index", "dropna", "sort"])?;
                let by = args.require(0, "by")?.to_names()?;
                let group = GroupBy::new(
                    frame,
                    by,
                    args.bool_or(KW, "as_index", true)?,
                    args.bool_or(KW, "dropna", true)?,
                )?;
                return Ok(Value::GroupBy(Box::new(group)));
            }
            "isnull" | "isna" => frame.is_null(),
            "notnull" | "notna" => frame.map_cells(|v| Scalar::Bool(!v.is_null())),
            "insert" => {
                args.check(4, &["loc", "column", "value", "allow_duplicates"])?;
                let loc = args.int_or(0, "loc", 0)?.max(0) as usize;
                let column = args.require(1, "column")?;
                let column = column.as_str().map(str::to_string).unwrap_or_else(|| column.to_string());
                let values = column_values(&frame, args.require(2, "value")?)?;
                let mut out = frame;
                out.insert_column(loc, &column, values)?;
                out
            }
            "assign" => {
                let mut out = frame;
                for (column, value) in args.keywords() {
                    let value = match value {
                        callable @ (Value::Builtin(_) | Value::Method(..)) => {
                            self.call_value(callable.clone(), Args::positional("assign", vec![Value::Frame(out.clone())]))?
                        }
                        other => other.clone(),
                    };
                    let values = column_values(&out, &value)?;
                    out.set_column(column, values)?;
                }
                out
            }
            "apply" => return self.frame_apply(frame, args),
            "applymap" | "map" => {
                let func = args.require(0, "func")?.clone();
                let mut out = frame.clone();
                for column in frame.columns() {
                    let mut values = Vec::with_capacity(column.values.len());
                    for v in &column.values {
                        if v.is_null() && args.str_opt(KW, "na_action")?.as_deref() == Some("ignore") {
                            values.push(v.clone());
                        } else {
                            values.push(self.call_element(&func, v, &[])?);
                        }
                    }
                    out.set_column(&column.name, values)?;
                }
                out
            }
            "nlargest" | "nsmallest" => {
                let n = args.int_or(0, "n", 5)?;
                let columns = args.require(1, "columns")?.to_names()?;
                let ascending = vec![name == "nsmallest"; columns.len()];
                frame.dropna(Some(columns.as_slice()), false, None)?.sort_values(&columns, &ascending, true)?.head(n)
            }
            "abs" => frame.try_map_columns(&[], |_, v| abs_scalar(v))?,
            "sum" | "mean" | "median" | "min" | "max" | "count" | "nunique" => {
                let agg = agg_name(name)?;
                let source = if args.bool_or(KW, "numeric_only", false)? {
                    let names: Vec<String> = frame
                        .columns()
                        .iter()
                        .filter(|c| is_numeric_dtype(&c.values))
                        .map(|c| c.name.clone())
                        .collect();
                    frame.select(&names)?
                } else {
                    frame
                };
                if axis_is_columns(&args, KW)? {
                    let mut values = Vec::with_capacity(source.len());
                    for row in 0..source.len() {
                        let cells: Vec<Scalar> = source.row(row).map(|(_, v)| v.clone()).collect();
                        values.push(reduce(agg, &cells)?);
                    }
                    return Ok(Value::Series(Series::with_index(None, values, source.index().clone())));
                }
                return source.reduce_columns(agg).map(Value::Series);
            }
            "select_dtypes" => {
                let include = args.names_opt(0, "include")?.unwrap_or_default();
                let exclude = args.names_opt(1, "exclude")?.unwrap_or_default();
                let wants = |kinds: &[String], dtype: &str| {
                    kinds.iter().any(|k| match k.as_str() {
                        "number" => matches!(dtype, "int64" | "float64"),
                        "int" | "int64" | "integer" => dtype == "int64",
                        "float" | "float64" => dtype == "float64",
                        "bool" => dtype == "bool",
                        "object" | "str" | "string" => dtype == "object",
                        _ => false,
                    })
                };
                let names: Vec<String> = frame
                    .columns()
                    .iter()
                    .filter(|c| {
                        let dtype = infer_dtype(&c.values);
                        (include.is_empty() || wants(&include, dtype)) && !wants(&exclude, dtype)
                    })
                    .map(|c| c.name.clone())
                    .collect();
                frame.select(&names)?
            }
            "add_prefix" | "add_suffix" => {
                let affix = args.require_str(0, if name == "add_prefix" { "prefix" } else { "suffix" })?;
                let names = frame
                    .column_names()
                    .map(|n| if name == "add_prefix" { format!("{}{}", affix, n) } else { format!("{}{}", n, affix) })
                    .collect();
                let mut out = frame.clone();
                out.set_column_names(names)?;
                out
            }
            "reindex" => {
                let columns = args
                    .names_opt(KW, "columns")?
                    .ok_or_else(|| EngineError::type_error("reindex() requires 'columns'"))?;
                let mut built = Vec::with_capacity(columns.len());
                for column in &columns {
                    let values = frame
                        .column(column)
                        .map(<[Scalar]>::to_vec)
                        .unwrap_or_else(|| vec![Scalar::Null; frame.len()]);
                    built.push((column.clone(), values));
                }
                with_index(Frame::from_columns(built)?, frame.index().clone())?
            }
            "filter" => {
                let names: Vec<String> = if let Some(items) = args.names_opt(0, "items")? {
                    items.into_iter().filter(|n| frame.has_column(n)).collect()
                } else if let Some(like) = args.str_opt(KW, "like")? {
                    frame.column_names().filter(|n| n.contains(like.as_str())).map(str::to_string).collect()
                } else if let Some(pattern) = args.str_opt(KW, "regex")? {
                    let re = strings::compile(&pattern, true)?;
                    frame.column_names().filter(|n| re.is_match(n)).map(str::to_string).collect()
                } else {
                    return Err(EngineError::type_error(
                        "Must pass either `items`, `like`, or `regex`",
                    ));
                };
                frame.select(&names)?
            }
            "isin" => {
                let values = args.require(0, "values")?.to_scalars()?;
                let keys: HashSet<_> = values.iter().map(Scalar::key).collect();
                frame.map_cells(|v| Scalar::Bool(keys.contains(&v.key())))
            }
            other => return Err(EngineError::attribute("DataFrame", other)),
        };
        Ok(Value::Frame(out))
    }

    fn frame_apply(&mut self, frame: Frame, args: Args) -> EngineResult<Value> {
        let mut args = args;
        let func = args
            .shift()
            .or_else(|| args.take_kw("func"))
            .ok_or_else(|| EngineError::type_error("apply() missing required argument: 'func'"))?;
        let by_row = match args.take_kw("axis") {
            Some(axis) => matches!(axis, Value::Scalar(Scalar::Int(1))) || axis.as_str() == Some("columns"),
            None => false,
        };
        let keywords = args.keywords().to_vec();

        if by_row {
            let labels: Vec<Scalar> = frame.column_names().map(Scalar::str).collect();
            let mut values = Vec::with_capacity(frame.len());
            for row in 0..frame.len() {
                let cells = frame.row(row).map(|(_, v)| v.clone()).collect();
                let series = Series::with_index(
                    Some(frame.index().label(row).to_string()),
                    cells,
                    Index::from_labels(None, labels.clone()),
                );
                let call = Args::new("apply", vec![Value::Series(series)], keywords.clone());
                match self.call_value(func.clone(), call)? {
                    Value::Scalar(s) => values.push(s),
                    other => {
                        return Err(EngineError::type_error(format!(
                            "row function returned '{}', expected a scalar",
                            other.type_name()
                        )))
                    }
                }
            }
            return Ok(Value::Series(Series::with_index(None, values, frame.index().clone())));
        }

        let mut series_results = Vec::new();
        let mut scalar_results = Vec::new();
        for column in frame.columns() {
            let series = Series::with_index(Some(column.name.clone()), column.values.clone(), frame.index().clone());
            let call = Args::new("apply", vec![Value::Series(series)], keywords.clone());
            match self.call_value(func.clone(), call)? {
                Value::Series(s) => series_results.push((column.name.clone(), s)),
                Value::Scalar(s) => scalar_results.push((column.name.clone(), s)),
                other => {
                    return Err(EngineError::type_error(format!(
                        "column function returned '{}'",
                        other.type_name()
                    )))
                }
            }
        }
        if scalar_results.is_empty() {
            let mut columns = Vec::with_capacity(series_results.len());
            for (name, series) in series_results {
                columns.push((name, frame.align(&series)));
            }
            return Ok(Value::Frame(with_index(Frame::from_columns(columns)?, frame.index().clone())?));
        }
        if !series_results.is_empty() {
            return Err(EngineError::value("column function must return the same kind of value for every column"));
        }
        let (labels, values): (Vec<Scalar>, Vec<Scalar>) =
            scalar_results.into_iter().map(|(n, v)| (Scalar::Str(n), v)).unzip();
        Ok(Value::Series(Series::with_index(None, values, Index::from_labels(None, labels))))
    }

    // -------------------------------------------------------------------------
    // Series
    // -------------------------------------------------------------------------

    fn series_method(&mut self, series: Series, name: &str, args: Args) -> EngineResult<Value> {
        let out = match name {
            "isnull" | "isna" => series.is_null(),
            "notnull" | "notna" => series.map_values(|v| Ok(Scalar::Bool(!v.is_null())))?,
            "fillna" => match args.str_opt(KW, "method")?.as_deref() {
                Some("ffill" | "pad") => series.ffill(),
                Some("bfill" | "backfill") => series.bfill(),
                Some(other) => return Err(EngineError::value(format!("Invalid fill method: {}", other))),
                None => match args.get(0, "value") {
                    Some(Value::Scalar(v)) => series.fillna(v),
                    Some(Value::Series(fill)) => {
                        let aligned = fill.aligned_to(&series.index);
                        let values = series
                            .values
                            .iter()
                            .zip(aligned)
                            .map(|(v, f)| if v.is_null() { f } else { v.clone() })
                            .collect();
                        Series::with_index(series.name.clone(), values, series.index.clone())
                    }
                    Some(other) => {
                        return Err(EngineError::type_error(format!(
                            "\"value\" parameter must be a scalar or dict, but you passed a \"{}\"",
                            other.type_name()
                        )))
                    }
                    None => return Err(EngineError::value("Must specify a fill 'value' or 'method'.")),
                },
            },
            "ffill" => series.ffill(),
            "bfill" => series.bfill(),
            "dropna" => series.dropna(),
            "astype" => {
                let dtype = dtype_of(args.require(0, "dtype")?)?;
                let values = convert_all(&series.values, dtype, ignore_errors(&args)?)?;
                Series::with_index(series.name.clone(), values, series.index.clone())
            }
            "round" => {
                let decimals = args.int_or(0, "decimals", 0)?;
                series.map_values(|v| Ok(round_scalar(v, decimals)))?
            }
            "abs" => series.map_values(abs_scalar)?,
            "map" => {
                let ignore_na = args.str_opt(KW, "na_action")?.as_deref() == Some("ignore");
                match args.require(0, "arg")?.clone() {
                    Value::Dict(entries) => series.map_values(|v| {
                        Ok(entries
                            .iter()
                            .find(|(k, _)| k.key() == v.key())
                            .and_then(|(_, m)| m.as_scalar().cloned())
                            .unwrap_or_default())
                    })?,
                    Value::Series(lookup) => series.map_values(|v| {
                        Ok(lookup
                            .index
                            .positions_of(v)
                            .first()
                            .map(|&p| lookup.values[p].clone())
                            .unwrap_or_default())
                    })?,
                    func => {
                        let mut values = Vec::with_capacity(series.len());
                        for v in &series.values {
                            if ignore_na && v.is_null() {
                                values.push(v.clone());
                            } else {
                                values.push(self.call_element(&func, v, &[])?);
                            }
                        }
                        Series::with_index(series.name.clone(), values, series.index.clone())
                    }
                }
            }
            "apply" => {
                let mut args = args;
                let func = args
                    .shift()
                    .or_else(|| args.take_kw("func"))
                    .ok_or_else(|| EngineError::type_error("apply() missing required argument: 'func'"))?;
                args.take_kw("convert_dtype");
                let keywords = args.keywords().to_vec();
                let mut values = Vec::with_capacity(series.len());
                for v in &series.values {
                    values.push(self.call_element(&func, v, &keywords)?);
                }
                Series::with_index(series.name.clone(), values, series.index.clone())
            }
            "replace" => {
                let replacer = Replacer::from_args(&args)?;
                series.map_values(|v| Ok(replacer.apply(None, v)))?
            }
            "isin" => ops::isin(&series, &args.require(0, "values")?.to_scalars()?),
            "between" => {
                let left = args.scalar_opt(0, "left")?.unwrap_or_default();
                let right = args.scalar_opt(1, "right")?.unwrap_or_default();
                let inclusive = match args.get(2, "inclusive") {
                    None => "both".to_string(),
                    Some(Value::Scalar(Scalar::Bool(true))) => "both".to_string(),
                    Some(Value::Scalar(Scalar::Bool(false))) => "neither".to_string(),
                    Some(other) => other.to_string(),
                };
                let (lo, hi) = match inclusive.as_str() {
                    "both" => (true, true),
                    "neither" => (false, false),
                    "left" => (true, false),
                    "right" => (false, true),
                    other => {
                        return Err(EngineError::value(format!(
                            "Inclusive has to be either string of 'both','left', 'right', or 'neither', got {}",
                            other
                        )))
                    }
                };
                series.map_values(|v| {
                    if v.is_null() {
                        return Ok(Scalar::Bool(false));
                    }
                    let lower = v.try_cmp(&left, ">=")?;
                    let upper = v.try_cmp(&right, "<=")?;
                    let above = if lo { lower.is_ge() } else { lower.is_gt() };
                    let below = if hi { upper.is_le() } else { upper.is_lt() };
                    Ok(Scalar::Bool(above && below))
                })?
            }
            "unique" => return Ok(Value::List(series.unique().into_iter().map(Value::Scalar).collect())),
            "nunique" => {
                let dropna = args.bool_or(0, "dropna", true)?;
                let distinct = series.unique();
                let count = distinct.iter().filter(|v| !dropna || !v.is_null()).count();
                return Ok(Value::int(count as i64));
            }
            "value_counts" => series.value_counts(
                args.bool_or(0, "normalize", false)?,
                args.bool_or(KW, "ascending", false)?,
            ),
            "sum" | "mean" | "median" | "min" | "max" | "count" => {
                return reduce(agg_name(name)?, &series.values).map(Value::Scalar)
            }
            "std" | "var" => {
                let ddof = args.int_or(KW, "ddof", 1)?.max(0) as usize;
                let nums: Vec<f64> = series
                    .values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| {
                        v.as_f64().ok_or_else(|| {
                            EngineError::type_error(format!("Could not convert string '{}' to numeric", v))
                        })
                    })
                    .collect::<EngineResult<_>>()?;
                if nums.len() <= ddof {
                    return Ok(Value::float(f64::NAN));
                }
                let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (nums.len() - ddof) as f64;
                return Ok(Value::float(if name == "std" { var.sqrt() } else { var }));
            }
            "reset_index" => {
                let drop = args.bool_or(KW, "drop", false)?;
                if drop {
                    Series::new(series.name.clone(), series.values.clone())
                } else {
                    let mut series = series;
                    if let Some(name) = args.str_opt(KW, "name")? {
                        series.name = Some(name);
                    }
                    return series.reset_index(false).map(Value::Frame);
                }
            }
            "to_frame" => {
                let mut series = series;
                if let Some(name) = args.str_opt(0, "name")? {
                    series.name = Some(name);
                }
                return series.to_frame().map(Value::Frame);
            }
            "tolist" | "to_list" => return Ok(Value::List(series.values.into_iter().map(Value::Scalar).collect())),
            "head" => {
                let n = args.int_or(0, "n", 5)?;
                series.take(&head_span(series.len(), n).collect::<Vec<_>>())
            }
            "tail" => {
                let n = args.int_or(0, "n", 5)?;
                series.take(&tail_span(series.len(), n).collect::<Vec<_>>())
            }
            "sort_values" => {
                let ascending = args.bool_or(KW, "ascending", true)?;
                let positions = sort_positions(&[series.values.as_slice()], &[ascending], na_last(&args)?)?;
                let sorted = series.take(&positions);
                if args.bool_or(KW, "ignore_index", false)? {
                    Series::new(sorted.name, sorted.values)
                } else {
                    sorted
                }
            }
            "sort_index" => {
                let labels = series.index.labels();
                let positions = sort_positions(&[labels.as_slice()], &[args.bool_or(KW, "ascending", true)?], true)?;
                series.take(&positions)
            }
            "copy" => series,
            "rename" => {
                let mut series = series;
                match args.get(0, "index") {
                    Some(Value::Scalar(Scalar::Null)) => series.name = None,
                    Some(Value::Scalar(s)) => series.name = Some(s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string())),
                    Some(Value::Dict(entries)) => {
                        let labels = series
                            .index
                            .labels()
                            .into_iter()
                            .map(|l| {
                                entries
                                    .iter()
                                    .find(|(k, _)| k.key() == l.key())
                                    .and_then(|(_, v)| v.as_scalar().cloned())
                                    .unwrap_or(l)
                            })
                            .collect();
                        series.index = Index::from_labels(series.index.name().map(str::to_string), labels);
                    }
                    _ => {}
                }
                series
            }
            "duplicated" | "drop_duplicates" => {
                let frame = Frame::from_columns(vec![("value".to_string(), series.values.clone())])?;
                let mask = frame.duplicated(None, keep_arg(&args)?)?;
                if name == "duplicated" {
                    Series::with_index(series.name.clone(), mask.into_iter().map(Scalar::Bool).collect(), series.index.clone())
                } else {
                    let keep: Vec<bool> = mask.into_iter().map(|d| !d).collect();
                    series.filter(&keep)
                }
            }
            "any" => return Ok(Value::bool(series.values.iter().any(|v| !v.is_null() && v.truthy()))),
            "all" => return Ok(Value::bool(series.values.iter().all(|v| v.is_null() || v.truthy()))),
            "clip" => {
                let lower = args.scalar_opt(0, "lower")?.filter(|s| !s.is_null());
                let upper = args.scalar_opt(1, "upper")?.filter(|s| !s.is_null());
                series.map_values(|v| {
                    if v.is_null() {
                        return Ok(v.clone());
                    }
                    if let Some(lo) = &lower {
                        if v.try_cmp(lo, "<")?.is_lt() {
                            return Ok(lo.clone());
                        }
                    }
                    if let Some(hi) = &upper {
                        if v.try_cmp(hi, ">")?.is_gt() {
                            return Ok(hi.clone());
                        }
                    }
                    Ok(v.clone())
                })?
            }
            "where" => {
                let cond = match args.require(0, "cond")? {
                    Value::Series(mask) => mask.aligned_to(&series.index),
                    other => other.to_scalars()?,
                };
                if cond.len() != series.len() {
                    return Err(EngineError::value("Array conditional must be same shape as self"));
                }
                let other = match args.get(1, "other") {
                    Some(Value::Series(fill)) => fill.aligned_to(&series.index),
                    Some(Value::Scalar(fill)) => vec![fill.clone(); series.len()],
                    Some(other) => other.to_scalars()?,
                    None => vec![Scalar::Null; series.len()],
                };
                let values = series
                    .values
                    .iter()
                    .zip(cond.iter().zip(other))
                    .map(|(v, (c, o))| if c.truthy() { v.clone() } else { o })
                    .collect();
                Series::with_index(series.name.clone(), values, series.index.clone())
            }
            other => return Err(EngineError::attribute("Series", other)),
        };
        Ok(Value::Series(out))
    }
}

fn frame_attr(frame: Frame, name: &str) -> EngineResult<Value> {
    match name {
        "columns" => Ok(Value::Index(frame.column_names().map(Scalar::str).collect())),
        "index" => Ok(ops::index_value(frame.index())),
        "shape" => Ok(Value::Tuple(vec![
            Value::int(frame.len() as i64),
            Value::int(frame.width() as i64),
        ])),
        "size" => Ok(Value::int(frame.cell_count() as i64)),
        "empty" => Ok(Value::bool(frame.is_empty())),
        "loc" | "at" => Ok(Value::Indexer {
            frame: Box::new(frame),
            positional: false,
        }),
        "iloc" | "iat" => Ok(Value::Indexer {
            frame: Box::new(frame),
            positional: true,
        }),
        "dtypes" => {
            let labels = frame.column_names().map(Scalar::str).collect();
            let values = frame
                .columns()
                .iter()
                .map(|c| Scalar::str(infer_dtype(&c.values)))
                .collect();
            Ok(Value::Series(Series::with_index(None, values, Index::from_labels(None, labels))))
        }
        "values" => Ok(Value::List(
            (0..frame.len())
                .map(|r| Value::List(frame.row(r).map(|(_, v)| Value::Scalar(v.clone())).collect()))
                .collect(),
        )),
        n if FRAME_METHODS.contains(&n) => Ok(bound(Value::Frame(frame), n)),
        n if frame.has_column(n) => frame.series(n).map(Value::Series),
        other => Err(EngineError::attribute("DataFrame", other)),
    }
}

fn series_attr(series: Series, name: &str) -> EngineResult<Value> {
    match name {
        "str" => {
            let present: Vec<&Scalar> = series.values.iter().filter(|v| !v.is_null()).collect();
            if !present.is_empty() && !present.iter().any(|v| matches!(v, Scalar::Str(_))) {
                return Err(EngineError::new(
                    ExceptionKind::AttributeError,
                    "Can only use .str accessor with string values!",
                ));
            }
            Ok(Value::StrAccessor(series))
        }
        "dt" => datetime::accessor(&series),
        "name" => Ok(series.name.map(Value::str).unwrap_or_else(Value::null)),
        "index" => Ok(ops::index_value(&series.index)),
        "values" => Ok(Value::List(series.values.into_iter().map(Value::Scalar).collect())),
        "shape" => Ok(Value::Tuple(vec![Value::int(series.len() as i64)])),
        "size" => Ok(Value::int(series.len() as i64)),
        "empty" => Ok(Value::bool(series.is_empty())),
        "dtype" => Ok(Value::str(infer_dtype(&series.values))),
        "is_unique" => Ok(Value::bool(series.unique().len() == series.len())),
        "hasnans" => Ok(Value::bool(series.values.iter().any(Scalar::is_null))),
        "loc" | "at" => Ok(Value::SeriesIndexer {
            series: Box::new(series),
            positional: false,
        }),
        "iloc" | "iat" => Ok(Value::SeriesIndexer {
            series: Box::new(series),
            positional: true,
        }),
        n if SERIES_METHODS.contains(&n) => Ok(bound(Value::Series(series), n)),
        other => Err(EngineError::attribute("Series", other)),
    }
}

fn groupby_method(group: &GroupBy, name: &str, args: &Args) -> EngineResult<Value> {
    match name {
        "agg" | "aggregate" => {
            if !args.keywords().is_empty() && args.get(0, "func").is_none() {
                return named_aggregation(group, args);
            }
            match args.require(0, "func")? {
                Value::Scalar(Scalar::Str(func)) => group.apply(agg_name(func)?).map(frame_value),
                Value::Dict(entries) => {
                    let plan = entries
                        .iter()
                        .map(|(column, func)| {
                            let func = func.as_str().ok_or_else(|| {
                                EngineError::type_error("aggregation functions must be given by name")
                            })?;
                            Ok((column.to_string(), agg_name(func)?))
                        })
                        .collect::<EngineResult<Vec<_>>>()?;
                    group.aggregate(&plan).map(frame_value)
                }
                other => Err(EngineError::type_error(format!(
                    "aggregation must be a function name or a dict, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "transform" => {
            let func = args.require_str(0, "func")?;
            group.transform(agg_name(&func)?).map(frame_value)
        }
        other => group.apply(agg_name(other)?).map(frame_value),
    }
}

/// `agg(total=('amount', 'sum'), n=('id', 'count'))`
fn named_aggregation(group: &GroupBy, args: &Args) -> EngineResult<Value> {
    let keyed = GroupBy {
        as_index: true,
        series_selected: false,
        ..group.clone()
    };
    let mut columns = Vec::with_capacity(args.keywords().len());
    let mut index = None;
    for (output, spec) in args.keywords() {
        let parts = match spec {
            Value::Tuple(parts) | Value::List(parts) if parts.len() == 2 => parts,
            other => {
                return Err(EngineError::type_error(format!(
                    "named aggregation must be a (column, function) pair, not '{}'",
                    other.type_name()
                )))
            }
        };
        let column = parts[0].to_names()?.into_iter().next().unwrap_or_default();
        let func = parts[1]
            .as_str()
            .ok_or_else(|| EngineError::type_error("aggregation functions must be given by name"))?;
        match keyed.aggregate(&[(column.clone(), agg_name(func)?)])? {
            GroupResult::Frame(frame) => {
                let values = frame.column(&column).map(<[Scalar]>::to_vec).unwrap_or_default();
                index.get_or_insert_with(|| frame.index().clone());
                columns.push((output.clone(), values));
            }
            GroupResult::Series(series) => {
                index.get_or_insert_with(|| series.index.clone());
                columns.push((output.clone(), series.values));
            }
        }
    }
    let mut frame = Frame::from_columns(columns)?;
    if let Some(index) = index {
        frame = with_index(frame, index)?;
    }
    if group.as_index {
        Ok(Value::Frame(frame))
    } else {
        frame.reset_index(false).map(Value::Frame)
    }
}

fn index_method(labels: Vec<Scalar>, name: &str, args: &Args) -> EngineResult<Value> {
    match name {
        "tolist" | "to_list" => Ok(Value::List(labels.into_iter().map(Value::Scalar).collect())),
        "isin" => {
            let values = args.require(0, "values")?.to_scalars()?;
            let keys: HashSet<_> = values.iter().map(Scalar::key).collect();
            Ok(Value::List(labels.iter().map(|l| Value::bool(keys.contains(&l.key()))).collect()))
        }
        "astype" => {
            let dtype = dtype_of(args.require(0, "dtype")?)?;
            Ok(Value::Index(convert_all(&labels, dtype, false)?))
        }
        other => Err(EngineError::attribute("Index", other)),
    }
}

fn dict_method(mut entries: Vec<(Scalar, Value)>, name: &str, args: &Args) -> EngineResult<Value> {
    match name {
        "get" => {
            let key = args.scalar_opt(0, "key")?.unwrap_or_default();
            Ok(entries
                .into_iter()
                .find(|(k, _)| k.key() == key.key())
                .map(|(_, v)| v)
                .or_else(|| args.get(1, "default").cloned())
                .unwrap_or_else(Value::null))
        }
        "keys" => Ok(Value::List(entries.into_iter().map(|(k, _)| Value::Scalar(k)).collect())),
        "values" => Ok(Value::List(entries.into_iter().map(|(_, v)| v).collect())),
        "items" => Ok(Value::List(
            entries
                .into_iter()
                .map(|(k, v)| Value::Tuple(vec![Value::Scalar(k), v]))
                .collect(),
        )),
        "update" => {
            if let Some(Value::Dict(other)) = args.get(0, "other") {
                for (k, v) in other {
                    match entries.iter_mut().find(|(existing, _)| existing.key() == k.key()) {
                        Some(entry) => entry.1 = v.clone(),
                        None => entries.push((k.clone(), v.clone())),
                    }
                }
            }
            for (k, v) in args.keywords() {
                let key = Scalar::str(k.clone());
                match entries.iter_mut().find(|(existing, _)| existing.key() == key.key()) {
                    Some(entry) => entry.1 = v.clone(),
                    None => entries.push((key, v.clone())),
                }
            }
            Ok(Value::Dict(entries))
        }
        "copy" => Ok(Value::Dict(entries)),
        other => Err(EngineError::attribute("dict", other)),
    }
}

fn list_method(mut items: Vec<Value>, name: &str, args: &Args) -> EngineResult<Value> {
    match name {
        "append" => {
            items.push(args.require(0, "object")?.clone());
            Ok(Value::List(items))
        }
        "extend" => {
            items.extend(args.require(0, "iterable")?.iterate()?);
            Ok(Value::List(items))
        }
        "index" => {
            let needle = args.require(0, "value")?;
            items
                .iter()
                .position(|v| ops::values_equal(v, needle))
                .map(|p| Value::int(p as i64))
                .ok_or_else(|| EngineError::value(format!("{} is not in list", needle)))
        }
        "count" => {
            let needle = args.require(0, "value")?;
            Ok(Value::int(items.iter().filter(|v| ops::values_equal(v, needle)).count() as i64))
        }
        "copy" | "tolist" => Ok(Value::List(items)),
        other => Err(EngineError::attribute("list", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_dtype() {
        assert_eq!(infer_dtype(&[Scalar::Int(1), Scalar::Int(2)]), "int64");
        assert_eq!(infer_dtype(&[Scalar::Int(1), Scalar::Null]), "float64");
        assert_eq!(infer_dtype(&[Scalar::Float(1.5), Scalar::Int(2)]), "float64");
        assert_eq!(infer_dtype(&[Scalar::str("a"), Scalar::Int(2)]), "object");
        assert_eq!(infer_dtype(&[Scalar::Bool(true)]), "bool");
        assert_eq!(infer_dtype(&[]), "object");
    }

    #[test]
    fn test_replace_rules() {
        let args = Args::new(
            "replace",
            vec![Value::str(r"^\s*$"), Value::null()],
            vec![("regex".into(), Value::bool(true))],
        );
        let replacer = Replacer::from_args(&args).unwrap();
        assert_eq!(replacer.apply(None, &Scalar::str("   ")), Scalar::Null);
        assert_eq!(replacer.apply(None, &Scalar::str("x")), Scalar::str("x"));

        let nested = Value::Dict(vec![(
            Scalar::str("city"),
            Value::Dict(vec![(Scalar::str("NYC"), Value::str("New York"))]),
        )]);
        let replacer = Replacer::from_args(&Args::positional("replace", vec![nested])).unwrap();
        assert_eq!(replacer.apply(Some("city"), &Scalar::str("NYC")), Scalar::str("New York"));
        assert_eq!(replacer.apply(Some("other"), &Scalar::str("NYC")), Scalar::str("NYC"));
    }

    #[test]
    fn test_exact_replace_does_not_mix_text_and_numbers() {
        let args = Args::positional("replace", vec![Value::int(1), Value::int(100)]);
        let replacer = Replacer::from_args(&args).unwrap();
        assert_eq!(replacer.apply(None, &Scalar::Float(1.0)), Scalar::Int(100));
        assert_eq!(replacer.apply(None, &Scalar::str("1")), Scalar::str("1"));
    }

    #[test]
    fn test_set_attr_columns_and_unknown_attribute() {
        let frame = Frame::from_columns(vec![("a".into(), vec![Scalar::Int(1)])]).unwrap();
        let renamed = set_attr(Value::Frame(frame.clone()), "columns", Value::List(vec![Value::str("b")])).unwrap();
        match renamed {
            Value::Frame(f) => assert!(f.has_column("b")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(set_attr(Value::Frame(frame), "newcol", Value::int(1)).is_err());
    }

    #[test]
    fn test_mutating_methods() {
        assert!(mutates_receiver(&Value::List(vec![]), "append"));
        assert!(!mutates_receiver(&Value::List(vec![]), "count"));
        let out = list_method(vec![Value::int(1)], "append", &Args::positional("append", vec![Value::int(2)])).unwrap();
        assert_eq!(out, Value::List(vec![Value::int(1), Value::int(2)]));
    }
}
