//! Subscripts: `x[key]` reads, writes and deletes, including `loc` and `iloc`.

use super::error::{EngineError, EngineResult};
use super::frame::{mask_positions, Frame, GroupBy, Index, Series};
use super::strings;
use super::value::{Scalar, SliceSpec, Value};

/// Rows picked by a selector; `Single` collapses the row axis.
#[derive(Debug, Clone, PartialEq)]
enum Rows {
    Single(usize),
    Many(Vec<usize>),
}

impl Rows {
    fn positions(&self) -> Vec<usize> {
        match self {
            Rows::Single(p) => vec![*p],
            Rows::Many(ps) => ps.clone(),
        }
    }
}

/// Columns picked by a selector; `single` collapses the column axis.
#[derive(Debug, Clone)]
struct Columns {
    names: Vec<String>,
    single: bool,
}

// =============================================================================
// Masks and slices
// =============================================================================

/// A boolean mask when `key` is one: a bool series (aligned on `index`) or a list of bools.
fn as_mask(key: &Value, index: &Index) -> Option<EngineResult<Vec<bool>>> {
    match key {
        Value::Series(s) if is_bool_values(&s.values) => {
            let aligned = s.aligned_to(index);
            Some(Ok(aligned.iter().map(Scalar::truthy).collect()))
        }
        Value::List(items) if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Scalar(Scalar::Bool(_)))) => {
            let mask: Vec<bool> = items.iter().map(|v| matches!(v, Value::Scalar(Scalar::Bool(true)))).collect();
            if mask.len() != index.len() {
                return Some(Err(EngineError::index(format!(
                    "Boolean index has wrong length: {} instead of {}",
                    mask.len(),
                    index.len()
                ))));
            }
            Some(Ok(mask))
        }
        _ => None,
    }
}

fn is_bool_values(values: &[Scalar]) -> bool {
    !values.is_empty() && values.iter().all(|v| matches!(v, Scalar::Bool(_) | Scalar::Null))
        && values.iter().any(|v| matches!(v, Scalar::Bool(_)))
}

fn is_positional_slice(spec: &SliceSpec) -> bool {
    [&spec.start, &spec.stop]
        .iter()
        .all(|b| b.as_ref().map_or(true, |s| s.is_null() || matches!(s, Scalar::Int(_))))
}

/// Inclusive label slice over `labels`, as `loc` does.
fn label_slice(labels: &[Scalar], spec: &SliceSpec) -> EngineResult<Vec<usize>> {
    let find = |bound: &Scalar, last: bool| -> EngineResult<usize> {
        let mut hits = labels.iter().enumerate().filter(|(_, l)| l.loose_eq(bound)).map(|(i, _)| i);
        let hit = if last { hits.last() } else { hits.next() };
        hit.ok_or_else(|| EngineError::key(bound))
    };
    let start = match &spec.start {
        Some(b) if !b.is_null() => find(b, false)?,
        _ => 0,
    };
    let stop = match &spec.stop {
        Some(b) if !b.is_null() => find(b, true)? + 1,
        _ => labels.len(),
    };
    let step = spec.step.unwrap_or(1).max(1) as usize;
    Ok((start..stop.max(start)).step_by(step).collect())
}

fn normalize_position(i: i64, len: usize) -> EngineResult<usize> {
    let n = len as i64;
    let p = if i < 0 { i + n } else { i };
    if (0..n).contains(&p) {
        Ok(p as usize)
    } else {
        Err(EngineError::index("single positional indexer is out-of-bounds"))
    }
}

// =============================================================================
// Row and column selectors
// =============================================================================

fn select_rows(index: &Index, key: &Value, positional: bool) -> EngineResult<Rows> {
    if let Some(mask) = as_mask(key, index) {
        return Ok(Rows::Many(mask_positions(&mask?)));
    }
    match key {
        Value::Slice(spec) if positional || (is_positional_slice(spec) && !has_int_labels(index)) => {
            Ok(Rows::Many(spec.positions(index.len())?))
        }
        Value::Slice(spec) => Ok(Rows::Many(label_slice(&index.labels(), spec)?)),
        Value::Scalar(s) if positional => {
            let i = s.as_i64().filter(|_| !matches!(s, Scalar::Float(_))).ok_or_else(|| {
                EngineError::type_error("Cannot index by location index with a non-integer key")
            })?;
            Ok(Rows::Single(normalize_position(i, index.len())?))
        }
        Value::Scalar(label) => match index.positions_of(label).as_slice() {
            [] => Err(EngineError::key(label)),
            [single] => Ok(Rows::Single(*single)),
            many => Ok(Rows::Many(many.to_vec())),
        },
        Value::List(_) | Value::Tuple(_) | Value::Index(_) | Value::Series(_) => {
            let keys = key.to_scalars()?;
            if positional {
                keys.iter()
                    .map(|k| {
                        let i = k.as_i64().ok_or_else(|| {
                            EngineError::index(".iloc requires numeric indexers")
                        })?;
                        normalize_position(i, index.len())
                    })
                    .collect::<EngineResult<Vec<_>>>()
                    .map(Rows::Many)
            } else {
                let mut out = Vec::new();
                for k in &keys {
                    let found = index.positions_of(k);
                    if found.is_empty() {
                        return Err(EngineError::key(format!("[{}] not in index", k)));
                    }
                    out.extend(found);
                }
                Ok(Rows::Many(out))
            }
        }
        other => Err(EngineError::type_error(format!(
            "cannot index rows with '{}'",
            other.type_name()
        ))),
    }
}

fn has_int_labels(index: &Index) -> bool {
    index.levels().len() == 1 && index.labels().iter().all(|l| matches!(l, Scalar::Int(_)))
}

/// Column selector; `create` allows names that do not exist yet (assignment).
fn select_columns(frame: &Frame, key: &Value, positional: bool, create: bool) -> EngineResult<Columns> {
    let names: Vec<String> = frame.column_names().map(str::to_string).collect();
    let check = |name: &str| -> EngineResult<()> {
        if create || frame.has_column(name) {
            Ok(())
        } else {
            Err(EngineError::key(name))
        }
    };
    let name_index = Index::from_labels(None, names.iter().cloned().map(Scalar::Str).collect());
    if let Some(mask) = as_mask(key, &name_index) {
        let picked = mask_positions(&mask?).into_iter().map(|p| names[p].clone()).collect();
        return Ok(Columns { names: picked, single: false });
    }
    match key {
        Value::Slice(spec) => {
            let positions = if positional {
                spec.positions(names.len())?
            } else {
                let labels: Vec<Scalar> = names.iter().cloned().map(Scalar::Str).collect();
                label_slice(&labels, spec)?
            };
            Ok(Columns {
                names: positions.into_iter().map(|p| names[p].clone()).collect(),
                single: false,
            })
        }
        Value::Scalar(s) if positional => {
            let i = s.as_i64().ok_or_else(|| EngineError::index(".iloc requires numeric indexers"))?;
            Ok(Columns {
                names: vec![names[normalize_position(i, names.len())?].clone()],
                single: true,
            })
        }
        Value::Scalar(s) => {
            let name = s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string());
            check(&name)?;
            Ok(Columns { names: vec![name], single: true })
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) | Value::Series(_) => {
            let mut picked = Vec::new();
            for k in key.to_scalars()? {
                if positional {
                    let i = k.as_i64().ok_or_else(|| EngineError::index(".iloc requires numeric indexers"))?;
                    picked.push(names[normalize_position(i, names.len())?].clone());
                } else {
                    let name = k.as_str().map(str::to_string).unwrap_or_else(|| k.to_string());
                    check(&name)?;
                    picked.push(name);
                }
            }
            Ok(Columns { names: picked, single: false })
        }
        other => Err(EngineError::type_error(format!(
            "cannot index columns with '{}'",
            other.type_name()
        ))),
    }
}

/// Splits `rows, cols` keys.
fn split_key(key: &Value) -> EngineResult<(&Value, Option<&Value>)> {
    match key {
        Value::Tuple(parts) => match parts.as_slice() {
            [rows, cols] => Ok((rows, Some(cols))),
            _ => Err(EngineError::index("Too many indexers")),
        },
        other => Ok((other, None)),
    }
}

fn all_columns(frame: &Frame) -> Columns {
    Columns {
        names: frame.column_names().map(str::to_string).collect(),
        single: false,
    }
}

// =============================================================================
// Reads
// =============================================================================

fn frame_get(frame: &Frame, key: &Value) -> EngineResult<Value> {
    if let Some(mask) = as_mask(key, frame.index()) {
        return frame.filter(&mask?).map(Value::Frame);
    }
    match key {
        Value::Scalar(s) => {
            let name = s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string());
            frame.series(&name).map(Value::Series)
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => frame.select(&key.to_names()?).map(Value::Frame),
        Value::Slice(spec) => {
            let rows = select_rows(frame.index(), &Value::Slice(spec.clone()), is_positional_slice(spec))?;
            Ok(Value::Frame(frame.take(&rows.positions())))
        }
        other => Err(EngineError::type_error(format!(
            "cannot index a DataFrame with '{}'",
            other.type_name()
        ))),
    }
}

fn frame_indexer_get(frame: &Frame, key: &Value, positional: bool) -> EngineResult<Value> {
    let (row_key, col_key) = split_key(key)?;
    let rows = select_rows(frame.index(), row_key, positional)?;
    let cols = match col_key {
        Some(k) => select_columns(frame, k, positional, false)?,
        None => all_columns(frame),
    };

    match (rows, cols.single) {
        (Rows::Single(r), true) => {
            let values = frame.column(&cols.names[0]).ok_or_else(|| EngineError::key(&cols.names[0]))?;
            Ok(Value::Scalar(values[r].clone()))
        }
        (Rows::Single(r), false) => {
            let mut values = Vec::with_capacity(cols.names.len());
            for name in &cols.names {
                let column = frame.column(name).ok_or_else(|| EngineError::key(name))?;
                values.push(column[r].clone());
            }
            let labels = cols.names.iter().cloned().map(Scalar::Str).collect();
            let name = frame.index().label(r).to_string();
            Ok(Value::Series(Series::with_index(Some(name), values, Index::from_labels(None, labels))))
        }
        (Rows::Many(rs), true) => Ok(Value::Series(frame.series(&cols.names[0])?.take(&rs))),
        (Rows::Many(rs), false) => Ok(Value::Frame(frame.select(&cols.names)?.take(&rs))),
    }
}

fn series_get(series: &Series, key: &Value, positional: bool) -> EngineResult<Value> {
    let rows = match key {
        Value::Slice(spec) if !positional && !is_positional_slice(spec) => {
            Rows::Many(label_slice(&series.index.labels(), spec)?)
        }
        Value::Slice(spec) if !positional => Rows::Many(spec.positions(series.len())?),
        Value::Scalar(Scalar::Int(i)) if !positional && !has_int_labels(&series.index) => {
            Rows::Single(normalize_position(*i, series.len())?)
        }
        _ => select_rows(&series.index, key, positional)?,
    };
    Ok(match rows {
        Rows::Single(p) => Value::Scalar(series.values[p].clone()),
        Rows::Many(ps) => Value::Series(series.take(&ps)),
    })
}

fn sequence_get(items: &[Value], key: &Value, tuple: bool) -> EngineResult<Value> {
    let wrap = |v: Vec<Value>| if tuple { Value::Tuple(v) } else { Value::List(v) };
    match key {
        Value::Slice(spec) => Ok(wrap(spec.positions(items.len())?.into_iter().map(|p| items[p].clone()).collect())),
        Value::Scalar(s) => {
            let i = s.as_i64().ok_or_else(|| {
                EngineError::type_error(format!("list indices must be integers or slices, not {}", s.type_name()))
            })?;
            let n = items.len() as i64;
            let p = if i < 0 { i + n } else { i };
            items
                .get(usize::try_from(p).unwrap_or(usize::MAX))
                .cloned()
                .ok_or_else(|| EngineError::index("list index out of range"))
        }
        other => Err(EngineError::type_error(format!(
            "list indices must be integers or slices, not {}",
            other.type_name()
        ))),
    }
}

fn string_get(s: &str, key: &Value) -> EngineResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    match key {
        Value::Slice(spec) => Ok(Value::str(spec.positions(chars.len())?.into_iter().map(|p| chars[p]).collect::<String>())),
        Value::Scalar(Scalar::Int(i)) => {
            let n = chars.len() as i64;
            let p = if *i < 0 { i + n } else { *i };
            if (0..n).contains(&p) {
                Ok(Value::str(chars[p as usize].to_string()))
            } else {
                Err(EngineError::index("string index out of range"))
            }
        }
        other => Err(EngineError::type_error(format!(
            "string indices must be integers, not '{}'",
            other.type_name()
        ))),
    }
}

fn groupby_get(group: &GroupBy, key: &Value) -> EngineResult<Value> {
    let single = matches!(key, Value::Scalar(_));
    group.select(key.to_names()?, single).map(|g| Value::GroupBy(Box::new(g)))
}

/// `container[key]`
pub fn get_item(container: &Value, key: &Value) -> EngineResult<Value> {
    match container {
        Value::Frame(frame) => frame_get(frame, key),
        Value::Series(series) => series_get(series, key, false),
        Value::Indexer { frame, positional } => frame_indexer_get(frame, key, *positional),
        Value::SeriesIndexer { series, positional } => series_get(series, key, *positional),
        Value::Index(labels) => match key {
            Value::Scalar(_) => sequence_get(&labels.iter().cloned().map(Value::Scalar).collect::<Vec<_>>(), key, false),
            _ => {
                let series = Series::new(None, labels.clone());
                match series_get(&series, key, true)? {
                    Value::Series(s) => Ok(Value::Index(s.values)),
                    other => Ok(other),
                }
            }
        },
        Value::List(items) => sequence_get(items, key, false),
        Value::Tuple(items) => sequence_get(items, key, true),
        Value::Scalar(Scalar::Str(s)) => string_get(s, key),
        Value::Dict(entries) => {
            let k = key.as_scalar().ok_or_else(|| EngineError::type_error("unhashable type"))?;
            entries
                .iter()
                .find(|(existing, _)| existing.key() == k.key())
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EngineError::key(k))
        }
        Value::StrAccessor(series) => strings::accessor_subscript(series, key).map(Value::Series),
        Value::GroupBy(group) => groupby_get(group, key),
        other => Err(EngineError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

// =============================================================================
// Writes
// =============================================================================

/// Values for a whole column of `frame` from the right-hand side of an assignment.
pub fn column_values(frame: &Frame, value: &Value) -> EngineResult<Vec<Scalar>> {
    match value {
        Value::Scalar(s) => Ok(vec![s.clone(); frame.len()]),
        Value::Series(series) => {
            if frame.width() == 0 && frame.is_empty() {
                Ok(series.values.clone())
            } else {
                Ok(frame.align(series))
            }
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => value.to_scalars(),
        Value::Frame(other) if other.width() == 1 => {
            let column = &other.columns()[0];
            Ok(frame.align(&Series::with_index(None, column.values.clone(), other.index().clone())))
        }
        other => Err(EngineError::type_error(format!(
            "cannot assign a '{}' to a column",
            other.type_name()
        ))),
    }
}

/// The value written at (`row` position, `col` slot) of a block assignment.
struct Block {
    rows: Vec<usize>,
    cols: Vec<String>,
}

impl Block {
    fn fill(&self, frame: &Frame, value: &Value) -> EngineResult<Vec<Vec<Scalar>>> {
        let (nr, nc) = (self.rows.len(), self.cols.len());
        let grid = |f: &dyn Fn(usize, usize) -> Scalar| -> Vec<Vec<Scalar>> {
            (0..nc).map(|c| (0..nr).map(|r| f(r, c)).collect()).collect()
        };
        match value {
            Value::Scalar(s) => Ok(grid(&|_, _| s.clone())),
            Value::Series(series) => {
                let aligned = frame.align(series);
                Ok(grid(&|r, _| aligned[self.rows[r]].clone()))
            }
            Value::List(_) | Value::Tuple(_) => {
                let items = value.to_scalars()?;
                if nr == 1 && items.len() == nc {
                    Ok(grid(&|_, c| items[c].clone()))
                } else if nc == 1 && items.len() == nr {
                    Ok(grid(&|r, _| items[r].clone()))
                } else {
                    Err(EngineError::value(format!(
                        "shape mismatch: value array of shape ({},) could not be broadcast to indexing result of shape ({},{})",
                        items.len(),
                        nr,
                        nc
                    )))
                }
            }
            Value::Frame(other) => {
                let mut out = Vec::with_capacity(nc);
                for name in &self.cols {
                    let source = other.series(name)?;
                    let aligned = frame.align(&source);
                    out.push(self.rows.iter().map(|&r| aligned[r].clone()).collect());
                }
                Ok(out)
            }
            other => Err(EngineError::type_error(format!(
                "cannot set values from '{}'",
                other.type_name()
            ))),
        }
    }

    fn write(&self, mut frame: Frame, value: &Value) -> EngineResult<Frame> {
        let filled = self.fill(&frame, value)?;
        for (name, values) in self.cols.iter().zip(filled) {
            let mut column = match frame.column(name) {
                Some(existing) => existing.to_vec(),
                None => vec![Scalar::Null; frame.len()],
            };
            for (&r, v) in self.rows.iter().zip(values) {
                column[r] = v;
            }
            frame.set_column(name, column)?;
        }
        Ok(frame)
    }
}

/// Append an all-missing row labelled `label` (`loc` enlargement).
fn append_row(frame: &Frame, label: &Scalar) -> EngineResult<Frame> {
    let columns = frame.column_names().map(|n| (n.to_string(), vec![Scalar::Null])).collect();
    let mut row = Frame::from_columns(columns)?;
    row.set_index_labels(Index::from_labels(None, vec![label.clone()]))?;
    let mut out = Frame::concat(&[frame.clone(), row], false);
    if let Some(name) = frame.index().name() {
        let labels = out.index().labels();
        out.set_index_labels(Index::from_labels(Some(name.to_string()), labels))?;
    }
    Ok(out)
}

fn frame_indexer_set(frame: Frame, key: &Value, value: &Value, positional: bool) -> EngineResult<Frame> {
    let (row_key, col_key) = split_key(key)?;

    let mut frame = frame;
    let rows = match select_rows(frame.index(), row_key, positional) {
        Ok(rows) => rows,
        Err(e) if !positional && e.kind == super::error::ExceptionKind::KeyError => match row_key {
            Value::Scalar(label) => {
                frame = append_row(&frame, label)?;
                Rows::Single(frame.len() - 1)
            }
            _ => return Err(e),
        },
        Err(e) => return Err(e),
    };
    let cols = match col_key {
        Some(k) => select_columns(&frame, k, positional, !positional)?,
        None => all_columns(&frame),
    };
    Block {
        rows: rows.positions(),
        cols: cols.names,
    }
    .write(frame, value)
}

fn frame_set(mut frame: Frame, key: &Value, value: &Value) -> EngineResult<Frame> {
    if let Some(mask) = as_mask(key, frame.index()) {
        let block = Block {
            rows: mask_positions(&mask?),
            cols: frame.column_names().map(str::to_string).collect(),
        };
        return block.write(frame, value);
    }
    match key {
        Value::Scalar(s) => {
            let name = s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string());
            let values = column_values(&frame, value)?;
            frame.set_column(&name, values)?;
            Ok(frame)
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
            let names = key.to_names()?;
            match value {
                Value::Frame(source) => {
                    if source.width() != names.len() {
                        return Err(EngineError::value("Columns must be same length as key"));
                    }
                    for (name, column) in names.iter().zip(source.columns()) {
                        let series = Series::with_index(None, column.values.clone(), source.index().clone());
                        let values = frame.align(&series);
                        frame.set_column(name, values)?;
                    }
                    Ok(frame)
                }
                other => {
                    for name in &names {
                        let values = column_values(&frame, other)?;
                        frame.set_column(name, values)?;
                    }
                    Ok(frame)
                }
            }
        }
        other => Err(EngineError::type_error(format!(
            "cannot set a DataFrame item with '{}'",
            other.type_name()
        ))),
    }
}

fn series_set(mut series: Series, key: &Value, value: &Value, positional: bool) -> EngineResult<Series> {
    let rows = match select_rows(&series.index, key, positional) {
        Ok(rows) => rows.positions(),
        Err(e) if !positional && e.kind == super::error::ExceptionKind::KeyError => match key {
            Value::Scalar(label) => {
                let mut labels = series.index.labels();
                labels.push(label.clone());
                series.values.push(Scalar::Null);
                series.index = Index::from_labels(series.index.name().map(str::to_string), labels);
                vec![series.len() - 1]
            }
            _ => return Err(e),
        },
        Err(e) => return Err(e),
    };
    match value {
        Value::Scalar(s) => {
            for &r in &rows {
                series.values[r] = s.clone();
            }
        }
        Value::Series(source) => {
            let aligned = source.aligned_to(&series.index);
            for &r in &rows {
                series.values[r] = aligned[r].clone();
            }
        }
        Value::List(_) | Value::Tuple(_) => {
            let items = value.to_scalars()?;
            if items.len() != rows.len() {
                return Err(EngineError::value(format!(
                    "cannot set using a list-like indexer with a different length than the value ({} != {})",
                    rows.len(),
                    items.len()
                )));
            }
            for (&r, v) in rows.iter().zip(items) {
                series.values[r] = v;
            }
        }
        other => {
            return Err(EngineError::type_error(format!(
                "cannot set a Series item from '{}'",
                other.type_name()
            )))
        }
    }
    Ok(series)
}

/// `container[key] = value`, returning the updated container.
pub fn set_item(container: Value, key: &Value, value: Value) -> EngineResult<Value> {
    match container {
        Value::Frame(frame) => frame_set(frame, key, &value).map(Value::Frame),
        Value::Indexer { frame, positional } => frame_indexer_set(*frame, key, &value, positional).map(|f| Value::Indexer {
            frame: Box::new(f),
            positional,
        }),
        Value::Series(series) => series_set(series, key, &value, false).map(Value::Series),
        Value::SeriesIndexer { series, positional } => series_set(*series, key, &value, positional).map(|s| Value::SeriesIndexer {
            series: Box::new(s),
            positional,
        }),
        Value::Dict(mut entries) => {
            let k = key
                .as_scalar()
                .cloned()
                .ok_or_else(|| EngineError::type_error(format!("unhashable type: '{}'", key.type_name())))?;
            match entries.iter_mut().find(|(existing, _)| existing.key() == k.key()) {
                Some(entry) => entry.1 = value,
                None => entries.push((k, value)),
            }
            Ok(Value::Dict(entries))
        }
        Value::List(mut items) => {
            let i = key
                .as_scalar()
                .and_then(Scalar::as_i64)
                .ok_or_else(|| EngineError::type_error("list indices must be integers or slices"))?;
            let n = items.len() as i64;
            let p = if i < 0 { i + n } else { i };
            match usize::try_from(p).ok().and_then(|p| items.get_mut(p)) {
                Some(slot) => *slot = value,
                None => return Err(EngineError::index("list assignment index out of range")),
            }
            Ok(Value::List(items))
        }
        other => Err(EngineError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del container[key]`, returning the updated container.
pub fn del_item(container: Value, key: &Value) -> EngineResult<Value> {
    match container {
        Value::Frame(mut frame) => {
            let name = key
                .as_scalar()
                .map(|s| s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string()))
                .ok_or_else(|| EngineError::type_error("column name must be a scalar"))?;
            frame.remove_column(&name)?;
            Ok(Value::Frame(frame))
        }
        Value::Series(series) => {
            let label = key.as_scalar().ok_or_else(|| EngineError::type_error("label must be a scalar"))?;
            let drop = series.index.positions_of(label);
            if drop.is_empty() {
                return Err(EngineError::key(label));
            }
            let keep: Vec<usize> = (0..series.len()).filter(|p| !drop.contains(p)).collect();
            Ok(Value::Series(series.take(&keep)))
        }
        Value::Dict(mut entries) => {
            let k = key.as_scalar().ok_or_else(|| EngineError::type_error("unhashable type"))?;
            let pos = entries
                .iter()
                .position(|(existing, _)| existing.key() == k.key())
                .ok_or_else(|| EngineError::key(k))?;
            entries.remove(pos);
            Ok(Value::Dict(entries))
        }
        Value::List(mut items) => {
            let i = key
                .as_scalar()
                .and_then(Scalar::as_i64)
                .ok_or_else(|| EngineError::type_error("list indices must be integers or slices"))?;
            let n = items.len() as i64;
            let p = if i < 0 { i + n } else { i };
            match usize::try_from(p).ok().filter(|p| *p < items.len()) {
                Some(p) => {
                    items.remove(p);
                    Ok(Value::List(items))
                }
                None => Err(EngineError::index("list assignment index out of range")),
            }
        }
        other => Err(EngineError::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
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
            ("name".into(), vec![s("Bob"), s("Amy"), s("Cid")]),
            ("age".into(), vec![Scalar::Int(30), Scalar::Int(41), Scalar::Int(25)]),
        ])
        .unwrap()
    }

    fn mask(values: &[bool]) -> Value {
        Value::Series(Series::new(None, values.iter().map(|b| Scalar::Bool(*b)).collect()))
    }

    fn loc(frame: Frame) -> Value {
        Value::Indexer {
            frame: Box::new(frame),
            positional: false,
        }
    }

    #[test]
    fn test_frame_column_and_mask_reads() {
        let df = Value::Frame(people());
        match get_item(&df, &Value::str("age")).unwrap() {
            Value::Series(series) => assert_eq!(series.name.as_deref(), Some("age")),
            other => panic!("unexpected {:?}", other),
        }
        match get_item(&df, &mask(&[true, false, true])).unwrap() {
            Value::Frame(f) => {
                assert_eq!(f.len(), 2);
                assert_eq!(f.index().labels(), vec![Scalar::Int(0), Scalar::Int(2)]);
            }
            other => panic!("unexpected {:?}", other),
        }
        let err = get_item(&df, &Value::str("missing")).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing'");
    }

    #[test]
    fn test_loc_reads() {
        let indexer = loc(people());
        let key = Value::Tuple(vec![Value::int(1), Value::str("name")]);
        assert_eq!(get_item(&indexer, &key).unwrap(), Value::str("Amy"));

        let slice = Value::Slice(SliceSpec {
            start: Some(Scalar::Int(0)),
            stop: Some(Scalar::Int(1)),
            step: None,
        });
        match get_item(&indexer, &slice).unwrap() {
            // label slices include the stop label
            Value::Frame(f) => assert_eq!(f.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_iloc_reads() {
        let indexer = Value::Indexer {
            frame: Box::new(people()),
            positional: true,
        };
        let key = Value::Tuple(vec![Value::int(-1), Value::int(1)]);
        assert_eq!(get_item(&indexer, &key).unwrap(), Value::int(25));
        assert!(get_item(&indexer, &Value::int(7)).is_err());
    }

    #[test]
    fn test_loc_assignment_with_mask_creates_column() {
        let key = Value::Tuple(vec![mask(&[false, true, false]), Value::str("senior")]);
        let updated = set_item(loc(people()), &key, Value::bool(true)).unwrap();
        match updated {
            Value::Indexer { frame, .. } => {
                assert_eq!(
                    frame.column("senior").unwrap(),
                    &[Scalar::Null, Scalar::Bool(true), Scalar::Null]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loc_enlargement_appends_row() {
        let row = Value::List(vec![Value::str("Dee"), Value::int(19)]);
        match set_item(loc(people()), &Value::int(3), row).unwrap() {
            Value::Indexer { frame, .. } => {
                assert_eq!(frame.len(), 4);
                assert_eq!(frame.column("name").unwrap()[3], s("Dee"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_column_assignment_broadcasts_and_checks_length() {
        let df = set_item(Value::Frame(people()), &Value::str("team"), Value::str("x")).unwrap();
        match &df {
            Value::Frame(f) => assert_eq!(f.column("team").unwrap().len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        let err = set_item(df, &Value::str("bad"), Value::List(vec![Value::int(1)])).unwrap_err();
        assert!(err.message.contains("does not match length of index"));
    }

    #[test]
    fn test_deletes() {
        match del_item(Value::Frame(people()), &Value::str("age")).unwrap() {
            Value::Frame(f) => assert!(!f.has_column("age")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(del_item(Value::Frame(people()), &Value::str("nope")).is_err());
        let list = Value::List(vec![Value::int(1), Value::int(2)]);
        assert_eq!(del_item(list, &Value::int(-1)).unwrap(), Value::List(vec![Value::int(1)]));
    }

    #[test]
    fn test_string_and_list_subscripts() {
        assert_eq!(get_item(&Value::str("hello"), &Value::int(-1)).unwrap(), Value::str("o"));
        let list = Value::List(vec![Value::int(1), Value::int(2), Value::int(3)]);
        let tail = Value::Slice(SliceSpec {
            start: Some(Scalar::Int(1)),
            ..Default::default()
        });
        assert_eq!(
            get_item(&list, &tail).unwrap(),
            Value::List(vec![Value::int(2), Value::int(3)])
        );
    }
}
