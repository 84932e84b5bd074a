//! Column-major tables and the operations the snippet library exposes on them.
//!
//! A [`Frame`] is a list of named columns sharing one row [`Index`]. A [`Series`] is a single
//! column with its own copy of the index. Missing values are [`Scalar::Null`] or NaN floats
//! and are skipped by reductions, the way pandas does.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use super::error::{EngineError, EngineResult};
use super::value::{Scalar, ScalarKey};

// =============================================================================
// Index
// =============================================================================

/// One level of row labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub name: Option<String>,
    pub labels: Vec<Scalar>,
}

/// Row labels. Group-by over several keys produces more than one level.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    levels: Vec<Level>,
}

impl Default for Index {
    fn default() -> Self {
        Index::range(0)
    }
}

impl Index {
    /// `0..len`, unnamed.
    pub fn range(len: usize) -> Self {
        Self::from_labels(None, (0..len as i64).map(Scalar::Int).collect())
    }

    pub fn from_labels(name: Option<String>, labels: Vec<Scalar>) -> Self {
        Self {
            levels: vec![Level { name, labels }],
        }
    }

    pub fn from_levels(levels: Vec<Level>) -> Self {
        if levels.is_empty() {
            return Index::range(0);
        }
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, |l| l.labels.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn name(&self) -> Option<&str> {
        match self.levels.as_slice() {
            [single] => single.name.as_deref(),
            _ => None,
        }
    }

    /// Label of row `i`; a multi-level label renders as a tuple.
    pub fn label(&self, i: usize) -> Scalar {
        match self.levels.as_slice() {
            [single] => single.labels.get(i).cloned().unwrap_or_default(),
            levels => {
                let parts: Vec<String> = levels
                    .iter()
                    .map(|l| match l.labels.get(i) {
                        Some(Scalar::Str(s)) => format!("'{}'", s),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    })
                    .collect();
                Scalar::Str(format!("({})", parts.join(", ")))
            }
        }
    }

    pub fn labels(&self) -> Vec<Scalar> {
        (0..self.len()).map(|i| self.label(i)).collect()
    }

    pub fn take(&self, positions: &[usize]) -> Index {
        Index {
            levels: self
                .levels
                .iter()
                .map(|l| Level {
                    name: l.name.clone(),
                    labels: positions.iter().map(|&p| l.labels[p].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Rows carrying `label`, in order.
    pub fn positions_of(&self, label: &Scalar) -> Vec<usize> {
        let key = label.key();
        (0..self.len())
            .filter(|&i| self.label(i).key() == key)
            .collect()
    }

    /// First row for each label.
    fn lookup(&self) -> HashMap<ScalarKey, usize> {
        let mut map = HashMap::with_capacity(self.len());
        for i in 0..self.len() {
            map.entry(self.label(i).key()).or_insert(i);
        }
        map
    }
}

// =============================================================================
// Series
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub name: Option<String>,
    pub values: Vec<Scalar>,
    pub index: Index,
}

impl Series {
    pub fn new(name: Option<String>, values: Vec<Scalar>) -> Self {
        let index = Index::range(values.len());
        Self { name, values, index }
    }

    pub fn with_index(name: Option<String>, values: Vec<Scalar>, index: Index) -> Self {
        Self { name, values, index }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Element-wise transform keeping name and index.
    pub fn map_values(
        &self,
        mut f: impl FnMut(&Scalar) -> EngineResult<Scalar>,
    ) -> EngineResult<Series> {
        let values = self.values.iter().map(&mut f).collect::<EngineResult<Vec<_>>>()?;
        Ok(Series::with_index(self.name.clone(), values, self.index.clone()))
    }

    pub fn take(&self, positions: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            values: positions.iter().map(|&p| self.values[p].clone()).collect(),
            index: self.index.take(positions),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Series {
        self.take(&mask_positions(mask))
    }

    pub fn is_null(&self) -> Series {
        Series::with_index(
            self.name.clone(),
            self.values.iter().map(|v| Scalar::Bool(v.is_null())).collect(),
            self.index.clone(),
        )
    }

    pub fn fillna(&self, value: &Scalar) -> Series {
        let values = self
            .values
            .iter()
            .map(|v| if v.is_null() { value.clone() } else { v.clone() })
            .collect();
        Series::with_index(self.name.clone(), values, self.index.clone())
    }

    pub fn ffill(&self) -> Series {
        Series::with_index(self.name.clone(), forward_fill(&self.values), self.index.clone())
    }

    pub fn bfill(&self) -> Series {
        let mut reversed: Vec<Scalar> = self.values.iter().rev().cloned().collect();
        reversed = forward_fill(&reversed);
        reversed.reverse();
        Series::with_index(self.name.clone(), reversed, self.index.clone())
    }

    pub fn dropna(&self) -> Series {
        let mask: Vec<bool> = self.values.iter().map(|v| !v.is_null()).collect();
        self.filter(&mask)
    }

    /// Distinct values in order of first appearance, missing values included once.
    pub fn unique(&self) -> Vec<Scalar> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|v| seen.insert(v.key()))
            .cloned()
            .collect()
    }

    /// Counts of distinct present values, most frequent first.
    pub fn value_counts(&self, normalize: bool, ascending: bool) -> Series {
        let mut order: Vec<Scalar> = Vec::new();
        let mut counts: HashMap<ScalarKey, usize> = HashMap::new();
        for v in self.values.iter().filter(|v| !v.is_null()) {
            let count = counts.entry(v.key()).or_insert(0);
            if *count == 0 {
                order.push(v.clone());
            }
            *count += 1;
        }

        let mut pairs: Vec<(Scalar, usize)> = order
            .into_iter()
            .map(|v| {
                let c = counts.get(&v.key()).copied().unwrap_or(0);
                (v, c)
            })
            .collect();
        pairs.sort_by(|a, b| if ascending { a.1.cmp(&b.1) } else { b.1.cmp(&a.1) });

        let total: usize = pairs.iter().map(|(_, c)| c).sum();
        let (labels, values): (Vec<Scalar>, Vec<Scalar>) = pairs
            .into_iter()
            .map(|(v, c)| {
                let out = if normalize {
                    Scalar::Float(c as f64 / total.max(1) as f64)
                } else {
                    Scalar::Int(c as i64)
                };
                (v, out)
            })
            .unzip();

        let name = if normalize { "proportion" } else { "count" };
        Series::with_index(
            Some(name.to_string()),
            values,
            Index::from_labels(self.name.clone(), labels),
        )
    }

    /// Values in this series' positions, looked up by `other`'s labels when the indexes differ.
    pub fn aligned_to(&self, index: &Index) -> Vec<Scalar> {
        if self.index == *index {
            return self.values.clone();
        }
        let lookup = self.index.lookup();
        (0..index.len())
            .map(|i| {
                lookup
                    .get(&index.label(i).key())
                    .map(|&p| self.values[p].clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn reset_index(&self, drop: bool) -> EngineResult<Frame> {
        let name = self.name.clone().unwrap_or_else(|| "0".to_string());
        let mut frame = Frame::from_columns(vec![(name, self.values.clone())])?;
        frame.index = self.index.clone();
        if drop {
            frame.index = Index::range(frame.len());
            Ok(frame)
        } else {
            frame.reset_index(false)
        }
    }

    pub fn to_frame(&self) -> EngineResult<Frame> {
        let name = self.name.clone().unwrap_or_else(|| "0".to_string());
        let mut frame = Frame::from_columns(vec![(name, self.values.clone())])?;
        frame.index = self.index.clone();
        Ok(frame)
    }
}

fn forward_fill(values: &[Scalar]) -> Vec<Scalar> {
    let mut last: Option<Scalar> = None;
    values
        .iter()
        .map(|v| {
            if v.is_null() {
                last.clone().unwrap_or_else(|| v.clone())
            } else {
                last = Some(v.clone());
                v.clone()
            }
        })
        .collect()
}

pub fn mask_positions(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect()
}

// =============================================================================
// Reductions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Nunique,
    First,
    Last,
    Size,
}

impl Agg {
    pub fn parse(name: &str) -> Option<Agg> {
        Some(match name {
            "sum" => Agg::Sum,
            "mean" => Agg::Mean,
            "median" => Agg::Median,
            "min" => Agg::Min,
            "max" => Agg::Max,
            "count" => Agg::Count,
            "nunique" => Agg::Nunique,
            "first" => Agg::First,
            "last" => Agg::Last,
            "size" => Agg::Size,
            _ => return None,
        })
    }
}

/// Reduce a column to one value, skipping missing values.
pub fn reduce(agg: Agg, values: &[Scalar]) -> EngineResult<Scalar> {
    let present: Vec<&Scalar> = values.iter().filter(|v| !v.is_null()).collect();
    match agg {
        Agg::Size => Ok(Scalar::Int(values.len() as i64)),
        Agg::Count => Ok(Scalar::Int(present.len() as i64)),
        Agg::Nunique => {
            let distinct: HashSet<ScalarKey> = present.iter().map(|v| v.key()).collect();
            Ok(Scalar::Int(distinct.len() as i64))
        }
        Agg::First => Ok(present.first().map(|v| (*v).clone()).unwrap_or_default()),
        Agg::Last => Ok(present.last().map(|v| (*v).clone()).unwrap_or_default()),
        Agg::Sum => sum(&present),
        Agg::Mean | Agg::Median => {
            let mut nums = numeric(&present)?;
            if nums.is_empty() {
                return Ok(Scalar::Float(f64::NAN));
            }
            if agg == Agg::Mean {
                return Ok(Scalar::Float(nums.iter().sum::<f64>() / nums.len() as f64));
            }
            nums.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = nums.len() / 2;
            Ok(Scalar::Float(if nums.len() % 2 == 0 {
                (nums[mid - 1] + nums[mid]) / 2.0
            } else {
                nums[mid]
            }))
        }
        Agg::Min | Agg::Max => {
            let symbol = if agg == Agg::Min { "<" } else { ">" };
            let mut best: Option<&Scalar> = None;
            for v in present {
                best = match best {
                    None => Some(v),
                    Some(b) => {
                        let ord = v.try_cmp(b, symbol)?;
                        let better = if agg == Agg::Min {
                            ord == Ordering::Less
                        } else {
                            ord == Ordering::Greater
                        };
                        Some(if better { v } else { b })
                    }
                };
            }
            Ok(best.cloned().unwrap_or(Scalar::Float(f64::NAN)))
        }
    }
}

fn numeric(values: &[&Scalar]) -> EngineResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                EngineError::type_error(format!("Could not convert string '{}' to numeric", v))
            })
        })
        .collect()
}

fn sum(values: &[&Scalar]) -> EngineResult<Scalar> {
    if !values.is_empty() && values.iter().all(|v| matches!(v, Scalar::Str(_))) {
        return Ok(Scalar::Str(values.iter().map(|v| v.to_string()).collect()));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_numeric()) {
        return Err(EngineError::type_error(format!(
            "unsupported operand type(s) for +: 'int' and '{}'",
            bad.type_name()
        )));
    }
    if values.iter().any(|v| matches!(v, Scalar::Float(_))) {
        return Ok(Scalar::Float(values.iter().filter_map(|v| v.as_f64()).sum()));
    }
    let mut total: i64 = 0;
    for v in values {
        match total.checked_add(v.as_i64().unwrap_or(0)) {
            Some(t) => total = t,
            None => return Ok(Scalar::Float(values.iter().filter_map(|v| v.as_f64()).sum())),
        }
    }
    Ok(Scalar::Int(total))
}

/// Round half to even, as numpy does.
pub fn round_half_even(x: f64, decimals: i64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    // past this range the scale factor is 0 or inf
    let decimals = decimals.clamp(-MAX_ROUND_DIGITS, MAX_ROUND_DIGITS) as i32;
    let m = 10f64.powi(decimals);
    if m == 0.0 {
        return 0.0;
    }
    let y = x * m;
    if !y.is_finite() {
        // more digits than an f64 holds
        return x;
    }
    let r = y.round();
    let rounded = if (y - y.trunc()).abs() == 0.5 {
        2.0 * (y / 2.0).round()
    } else {
        r
    };
    rounded / m
}

const MAX_ROUND_DIGITS: i64 = 400;

/// Rows kept by `head(n)` out of `len`.
pub fn head_span(len: usize, n: i64) -> Range<usize> {
    let count = n.unsigned_abs().min(len as u64) as usize;
    if n >= 0 {
        0..count
    } else {
        0..len - count
    }
}

/// Rows kept by `tail(n)` out of `len`.
pub fn tail_span(len: usize, n: i64) -> Range<usize> {
    let count = n.unsigned_abs().min(len as u64) as usize;
    if n >= 0 {
        len - count..len
    } else {
        count..len
    }
}

/// Positions ordering the rows by several key columns.
///
/// Keys of one column must be mutually comparable; missing values go first or last.
pub fn sort_positions(
    keys: &[&[Scalar]],
    ascending: &[bool],
    na_last: bool,
) -> EngineResult<Vec<usize>> {
    for column in keys {
        let mut present = column.iter().filter(|v| !v.is_null());
        if let Some(first) = present.next() {
            for v in present {
                first.try_cmp(v, "<")?;
            }
        }
    }

    let len = keys.first().map_or(0, |k| k.len());
    let mut positions: Vec<usize> = (0..len).collect();
    positions.sort_by(|&a, &b| {
        for (k, column) in keys.iter().enumerate() {
            let (x, y) = (&column[a], &column[b]);
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if na_last { Ordering::Greater } else { Ordering::Less }
                }
                (false, true) => {
                    if na_last { Ordering::Less } else { Ordering::Greater }
                }
                (false, false) => {
                    let ord = x.try_cmp(y, "<").unwrap_or(Ordering::Equal);
                    if ascending.get(k).copied().unwrap_or(true) {
                        ord
                    } else {
                        ord.reverse()
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(positions)
}

// =============================================================================
// Frame
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

/// Which duplicate survives `drop_duplicates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    First,
    Last,
    None,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<Column>,
    index: Index,
}

impl Frame {
    /// Build from named columns of equal length, with a range index.
    pub fn from_columns(columns: Vec<(String, Vec<Scalar>)>) -> EngineResult<Frame> {
        let len = columns.first().map_or(0, |(_, v)| v.len());
        if columns.iter().any(|(_, v)| v.len() != len) {
            return Err(EngineError::value("All arrays must be of the same length"));
        }
        Ok(Frame {
            columns: columns
                .into_iter()
                .map(|(name, values)| Column { name, values })
                .collect(),
            index: Index::range(len),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 || self.columns.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn cell_count(&self) -> usize {
        self.len() * self.width()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn set_index_labels(&mut self, index: Index) -> EngineResult<()> {
        if index.len() != self.len() {
            return Err(length_mismatch(self.len(), index.len()));
        }
        self.index = index;
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Scalar]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    fn require(&self, name: &str) -> EngineResult<&[Scalar]> {
        self.column(name).ok_or_else(|| EngineError::key(name))
    }

    /// `df['name']`
    pub fn series(&self, name: &str) -> EngineResult<Series> {
        let values = self.require(name)?.to_vec();
        Ok(Series::with_index(Some(name.to_string()), values, self.index.clone()))
    }

    /// `df[['a', 'b']]`
    pub fn select(&self, names: &[String]) -> EngineResult<Frame> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::key(format!("{:?} not in index", missing)));
        }
        Ok(Frame {
            columns: names
                .iter()
                .filter_map(|n| self.columns.iter().find(|c| c.name == *n).cloned())
                .collect(),
            index: self.index.clone(),
        })
    }

    /// Insert or replace a column.
    pub fn set_column(&mut self, name: &str, values: Vec<Scalar>) -> EngineResult<()> {
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = Index::range(values.len());
        }
        if values.len() != self.len() {
            return Err(EngineError::value(format!(
                "Length of values ({}) does not match length of index ({})",
                values.len(),
                self.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
        Ok(())
    }

    /// `df.insert(loc, name, values)`
    pub fn insert_column(&mut self, loc: usize, name: &str, values: Vec<Scalar>) -> EngineResult<()> {
        if self.has_column(name) {
            return Err(EngineError::value(format!("cannot insert {}, already exists", name)));
        }
        if loc > self.columns.len() {
            return Err(EngineError::index(format!("index {} is out of bounds", loc)));
        }
        if values.len() != self.len() {
            return Err(length_mismatch(self.len(), values.len()));
        }
        self.columns.insert(
            loc,
            Column {
                name: name.to_string(),
                values,
            },
        );
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> EngineResult<Vec<Scalar>> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| EngineError::key(name))?;
        Ok(self.columns.remove(pos).values)
    }

    /// `df.drop(columns=[...])`
    pub fn drop_columns(&self, names: &[String], ignore_missing: bool) -> EngineResult<Frame> {
        if !ignore_missing {
            if let Some(missing) = names.iter().find(|n| !self.has_column(n)) {
                return Err(EngineError::key(format!("['{}'] not found in axis", missing)));
            }
        }
        Ok(Frame {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
            index: self.index.clone(),
        })
    }

    /// `df.drop(index=[...])`
    pub fn drop_rows(&self, labels: &[Scalar], ignore_missing: bool) -> EngineResult<Frame> {
        let mut dropped = HashSet::new();
        for label in labels {
            let found = self.index.positions_of(label);
            if found.is_empty() && !ignore_missing {
                return Err(EngineError::key(format!("[{}] not found in axis", label)));
            }
            dropped.extend(found);
        }
        let keep: Vec<usize> = (0..self.len()).filter(|i| !dropped.contains(i)).collect();
        Ok(self.take(&keep))
    }

    /// Rows at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: positions.iter().map(|&p| c.values[p].clone()).collect(),
                })
                .collect(),
            index: self.index.take(positions),
        }
    }

    /// Rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> EngineResult<Frame> {
        if mask.len() != self.len() {
            return Err(EngineError::value(format!(
                "Item wrong length {} instead of {}.",
                mask.len(),
                self.len()
            )));
        }
        Ok(self.take(&mask_positions(mask)))
    }

    /// Row positions for each label, in label order.
    pub fn positions_for_labels(&self, labels: &[Scalar]) -> EngineResult<Vec<usize>> {
        let mut out = Vec::new();
        for label in labels {
            let found = self.index.positions_of(label);
            if found.is_empty() {
                return Err(EngineError::key(label.to_string()));
            }
            out.extend(found);
        }
        Ok(out)
    }

    pub fn rename_columns(&self, mapping: &[(String, String)]) -> Frame {
        let mut out = self.clone();
        for column in &mut out.columns {
            if let Some((_, new)) = mapping.iter().find(|(old, _)| *old == column.name) {
                column.name = new.clone();
            }
        }
        out
    }

    /// `df.columns = [...]`
    pub fn set_column_names(&mut self, names: Vec<String>) -> EngineResult<()> {
        if names.len() != self.columns.len() {
            return Err(length_mismatch(self.columns.len(), names.len()));
        }
        for (column, name) in self.columns.iter_mut().zip(names) {
            column.name = name;
        }
        Ok(())
    }

    pub fn is_null(&self) -> Frame {
        self.map_cells(|v| Scalar::Bool(v.is_null()))
    }

    pub fn map_cells(&self, f: impl Fn(&Scalar) -> Scalar) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.iter().map(&f).collect(),
                })
                .collect(),
            index: self.index.clone(),
        }
    }

    /// Apply a fallible transform to the named columns (all columns when `only` is empty).
    pub fn try_map_columns(
        &self,
        only: &[String],
        mut f: impl FnMut(&str, &Scalar) -> EngineResult<Scalar>,
    ) -> EngineResult<Frame> {
        let mut out = self.clone();
        for column in &mut out.columns {
            if !only.is_empty() && !only.contains(&column.name) {
                continue;
            }
            let name = column.name.clone();
            column.values = column
                .values
                .iter()
                .map(|v| f(&name, v))
                .collect::<EngineResult<Vec<_>>>()?;
        }
        Ok(out)
    }

    /// Drop rows with missing values.
    ///
    /// `how_all` drops only rows missing in every considered column; `thresh` keeps rows with at
    /// least that many present values.
    pub fn dropna(
        &self,
        subset: Option<&[String]>,
        how_all: bool,
        thresh: Option<usize>,
    ) -> EngineResult<Frame> {
        let considered: Vec<&[Scalar]> = match subset {
            Some(names) => names
                .iter()
                .map(|n| self.require(n))
                .collect::<EngineResult<_>>()?,
            None => self.columns.iter().map(|c| c.values.as_slice()).collect(),
        };

        let keep: Vec<usize> = (0..self.len())
            .filter(|&row| {
                let present = considered.iter().filter(|c| !c[row].is_null()).count();
                match thresh {
                    Some(t) => present >= t,
                    None if how_all => present > 0 || considered.is_empty(),
                    None => present == considered.len(),
                }
            })
            .collect();
        Ok(self.take(&keep))
    }

    /// Drop columns with missing values.
    pub fn dropna_columns(&self, how_all: bool) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .filter(|c| {
                    let missing = c.values.iter().filter(|v| v.is_null()).count();
                    if how_all {
                        missing < c.values.len() || c.values.is_empty()
                    } else {
                        missing == 0
                    }
                })
                .cloned()
                .collect(),
            index: self.index.clone(),
        }
    }

    /// Fill missing cells; `per_column` entries win over `value`.
    pub fn fillna(&self, value: Option<&Scalar>, per_column: &[(String, Scalar)]) -> Frame {
        let mut out = self.clone();
        for column in &mut out.columns {
            let fill = per_column
                .iter()
                .find(|(name, _)| *name == column.name)
                .map(|(_, v)| v)
                .or(value);
            if let Some(fill) = fill {
                for v in column.values.iter_mut().filter(|v| v.is_null()) {
                    *v = fill.clone();
                }
            }
        }
        out
    }

    pub fn ffill(&self) -> Frame {
        let mut out = self.clone();
        for column in &mut out.columns {
            column.values = forward_fill(&column.values);
        }
        out
    }

    pub fn bfill(&self) -> Frame {
        let mut out = self.clone();
        for column in &mut out.columns {
            let mut reversed: Vec<Scalar> = column.values.iter().rev().cloned().collect();
            reversed = forward_fill(&reversed);
            reversed.reverse();
            column.values = reversed;
        }
        out
    }

    pub fn sort_values(&self, by: &[String], ascending: &[bool], na_last: bool) -> EngineResult<Frame> {
        let keys: Vec<&[Scalar]> = by
            .iter()
            .map(|n| self.require(n))
            .collect::<EngineResult<_>>()?;
        let positions = sort_positions(&keys, ascending, na_last)?;
        Ok(self.take(&positions))
    }

    pub fn sort_index(&self, ascending: bool) -> EngineResult<Frame> {
        let labels = self.index.labels();
        let positions = sort_positions(&[labels.as_slice()], &[ascending], true)?;
        Ok(self.take(&positions))
    }

    /// `df.duplicated(subset, keep)` as a mask.
    pub fn duplicated(&self, subset: Option<&[String]>, keep: Keep) -> EngineResult<Vec<bool>> {
        let considered: Vec<&[Scalar]> = match subset {
            Some(names) => names
                .iter()
                .map(|n| self.require(n))
                .collect::<EngineResult<_>>()?,
            None => self.columns.iter().map(|c| c.values.as_slice()).collect(),
        };
        let row_key = |row: usize| -> Vec<ScalarKey> { considered.iter().map(|c| c[row].key()).collect() };

        let mut counts: HashMap<Vec<ScalarKey>, usize> = HashMap::new();
        for row in 0..self.len() {
            *counts.entry(row_key(row)).or_insert(0) += 1;
        }

        let mut seen: HashMap<Vec<ScalarKey>, usize> = HashMap::new();
        let mut mask = Vec::with_capacity(self.len());
        for row in 0..self.len() {
            let key = row_key(row);
            let total = counts.get(&key).copied().unwrap_or(0);
            let nth = seen.entry(key).or_insert(0);
            *nth += 1;
            mask.push(match keep {
                Keep::First => *nth > 1,
                Keep::Last => *nth < total,
                Keep::None => total > 1,
            });
        }
        Ok(mask)
    }

    pub fn drop_duplicates(&self, subset: Option<&[String]>, keep: Keep) -> EngineResult<Frame> {
        let mask: Vec<bool> = self.duplicated(subset, keep)?.into_iter().map(|d| !d).collect();
        self.filter(&mask)
    }

    /// `head(n)`; a negative `n` keeps all but the last `-n` rows.
    pub fn head(&self, n: i64) -> Frame {
        self.take(&head_span(self.len(), n).collect::<Vec<_>>())
    }

    /// `tail(n)`; a negative `n` keeps all but the first `-n` rows.
    pub fn tail(&self, n: i64) -> Frame {
        self.take(&tail_span(self.len(), n).collect::<Vec<_>>())
    }

    /// Move the index into leading columns (unless `drop`) and renumber the rows.
    pub fn reset_index(&self, drop: bool) -> EngineResult<Frame> {
        let mut out = self.clone();
        if !drop {
            let multi = self.index.levels().len() > 1;
            for (i, level) in self.index.levels().iter().enumerate().rev() {
                let name = match &level.name {
                    Some(n) => n.clone(),
                    None if multi => format!("level_{}", i),
                    None if self.has_column("index") => "level_0".to_string(),
                    None => "index".to_string(),
                };
                out.insert_column(0, &name, level.labels.clone())?;
            }
        }
        out.index = Index::range(self.len());
        Ok(out)
    }

    /// `df.set_index('col')`
    pub fn set_index(&self, name: &str, drop: bool) -> EngineResult<Frame> {
        let mut out = self.clone();
        let labels = if drop {
            out.remove_column(name)?
        } else {
            self.require(name)?.to_vec()
        };
        out.index = Index::from_labels(Some(name.to_string()), labels);
        Ok(out)
    }

    /// Values for a new column taken from `series`, aligned on this frame's index.
    pub fn align(&self, series: &Series) -> Vec<Scalar> {
        series.aligned_to(&self.index)
    }

    /// Reduce every column to one value: a series indexed by column name.
    pub fn reduce_columns(&self, agg: Agg) -> EngineResult<Series> {
        let mut labels = Vec::with_capacity(self.width());
        let mut values = Vec::with_capacity(self.width());
        for column in &self.columns {
            labels.push(Scalar::Str(column.name.clone()));
            values.push(reduce(agg, &column.values)?);
        }
        Ok(Series::with_index(None, values, Index::from_labels(None, labels)))
    }

    /// Cells of row `i`, in column order.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns.iter().map(move |c| (c.name.as_str(), &c.values[i]))
    }

    /// Stack frames vertically; missing columns are filled with nulls.
    pub fn concat(frames: &[Frame], ignore_index: bool) -> Frame {
        let mut names: Vec<String> = Vec::new();
        for frame in frames {
            for name in frame.column_names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }

        let total: usize = frames.iter().map(Frame::len).sum();
        let mut columns: Vec<Column> = names
            .iter()
            .map(|n| Column {
                name: n.clone(),
                values: Vec::with_capacity(total),
            })
            .collect();
        let mut labels = Vec::with_capacity(total);

        for frame in frames {
            for column in &mut columns {
                match frame.column(&column.name) {
                    Some(values) => column.values.extend_from_slice(values),
                    None => column.values.extend(std::iter::repeat(Scalar::Null).take(frame.len())),
                }
            }
            labels.extend(frame.index.labels());
        }

        let index = if ignore_index {
            Index::range(total)
        } else {
            Index::from_labels(None, labels)
        };
        Frame { columns, index }
    }
}

fn length_mismatch(expected: usize, got: usize) -> EngineError {
    EngineError::value(format!(
        "Length mismatch: Expected axis has {} elements, new values have {} elements",
        expected, got
    ))
}

// =============================================================================
// GroupBy
// =============================================================================

/// A pending `df.groupby(...)`, optionally narrowed to some columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub frame: Frame,
    pub keys: Vec<String>,
    pub as_index: bool,
    pub dropna: bool,
    /// Columns selected with `grouped['col']` / `grouped[['a', 'b']]`.
    pub selection: Option<Vec<String>>,
    /// True when a single column was selected, so results are series.
    pub series_selected: bool,
}

impl GroupBy {
    pub fn new(frame: Frame, keys: Vec<String>, as_index: bool, dropna: bool) -> EngineResult<Self> {
        for key in &keys {
            if !frame.has_column(key) {
                return Err(EngineError::key(key));
            }
        }
        Ok(Self {
            frame,
            keys,
            as_index,
            dropna,
            selection: None,
            series_selected: false,
        })
    }

    pub fn select(&self, names: Vec<String>, single: bool) -> EngineResult<Self> {
        for name in &names {
            if !self.frame.has_column(name) {
                return Err(EngineError::key(format!("Column not found: {}", name)));
            }
        }
        Ok(Self {
            selection: Some(names),
            series_selected: single,
            ..self.clone()
        })
    }

    /// Group keys (sorted) with the rows of each group.
    fn groups(&self) -> EngineResult<Vec<(Vec<Scalar>, Vec<usize>)>> {
        let key_columns: Vec<&[Scalar]> = self
            .keys
            .iter()
            .map(|k| self.frame.require(k))
            .collect::<EngineResult<_>>()?;

        let mut order: Vec<Vec<Scalar>> = Vec::new();
        let mut members: HashMap<Vec<ScalarKey>, Vec<usize>> = HashMap::new();
        for row in 0..self.frame.len() {
            let values: Vec<Scalar> = key_columns.iter().map(|c| c[row].clone()).collect();
            if self.dropna && values.iter().any(Scalar::is_null) {
                continue;
            }
            let key: Vec<ScalarKey> = values.iter().map(Scalar::key).collect();
            let rows = members.entry(key).or_default();
            if rows.is_empty() {
                order.push(values);
            }
            rows.push(row);
        }

        let sort_keys: Vec<Vec<Scalar>> = (0..self.keys.len())
            .map(|k| order.iter().map(|g| g[k].clone()).collect())
            .collect();
        let key_refs: Vec<&[Scalar]> = sort_keys.iter().map(Vec::as_slice).collect();
        let positions = sort_positions(&key_refs, &[], true)
            .unwrap_or_else(|_| (0..order.len()).collect());

        Ok(positions
            .into_iter()
            .map(|p| {
                let values = order[p].clone();
                let key: Vec<ScalarKey> = values.iter().map(Scalar::key).collect();
                let rows = members.remove(&key).unwrap_or_default();
                (values, rows)
            })
            .collect())
    }

    fn value_columns(&self) -> Vec<String> {
        match &self.selection {
            Some(names) => names.clone(),
            None => self
                .frame
                .column_names()
                .filter(|n| !self.keys.iter().any(|k| k == n))
                .map(str::to_string)
                .collect(),
        }
    }

    /// Aggregate every value column with its function.
    pub fn aggregate(&self, plan: &[(String, Agg)]) -> EngineResult<GroupResult> {
        let groups = self.groups()?;
        let mut columns: Vec<(String, Vec<Scalar>)> = Vec::with_capacity(plan.len());
        for (name, agg) in plan {
            let values = self.frame.require(name)?;
            let reduced = groups
                .iter()
                .map(|(_, rows)| {
                    let cells: Vec<Scalar> = rows.iter().map(|&r| values[r].clone()).collect();
                    reduce(*agg, &cells)
                })
                .collect::<EngineResult<Vec<_>>>()?;
            columns.push((name.clone(), reduced));
        }
        self.assemble(&groups, columns)
    }

    /// One function over all value columns.
    pub fn apply(&self, agg: Agg) -> EngineResult<GroupResult> {
        if agg == Agg::Size {
            let groups = self.groups()?;
            let sizes = groups
                .iter()
                .map(|(_, rows)| Scalar::Int(rows.len() as i64))
                .collect();
            return self.assemble_size(&groups, sizes);
        }
        let plan: Vec<(String, Agg)> = self.value_columns().into_iter().map(|c| (c, agg)).collect();
        self.aggregate(&plan)
    }

    /// Each group's aggregate broadcast back onto its rows, keeping the original index.
    pub fn transform(&self, agg: Agg) -> EngineResult<GroupResult> {
        let groups = self.groups()?;
        let len = self.frame.len();
        let mut columns = Vec::new();
        for name in self.value_columns() {
            let values = self.frame.require(&name)?;
            let mut out = vec![Scalar::Null; len];
            for (_, rows) in &groups {
                let cells: Vec<Scalar> = rows.iter().map(|&r| values[r].clone()).collect();
                let reduced = reduce(agg, &cells)?;
                for &r in rows {
                    out[r] = reduced.clone();
                }
            }
            columns.push((name, out));
        }
        if self.series_selected {
            if let Some((name, values)) = columns.into_iter().next() {
                return Ok(GroupResult::Series(Series::with_index(
                    Some(name),
                    values,
                    self.frame.index.clone(),
                )));
            }
            return Ok(GroupResult::Series(Series::with_index(None, vec![Scalar::Null; len], self.frame.index.clone())));
        }
        let mut frame = Frame::from_columns(columns)?;
        frame.index = self.frame.index.clone();
        Ok(GroupResult::Frame(frame))
    }

    fn key_index(&self, groups: &[(Vec<Scalar>, Vec<usize>)]) -> Index {
        Index::from_levels(
            self.keys
                .iter()
                .enumerate()
                .map(|(k, name)| Level {
                    name: Some(name.clone()),
                    labels: groups.iter().map(|(key, _)| key[k].clone()).collect(),
                })
                .collect(),
        )
    }

    fn assemble(
        &self,
        groups: &[(Vec<Scalar>, Vec<usize>)],
        columns: Vec<(String, Vec<Scalar>)>,
    ) -> EngineResult<GroupResult> {
        let index = self.key_index(groups);
        if self.series_selected && self.as_index {
            if let Some((name, values)) = columns.into_iter().next() {
                return Ok(GroupResult::Series(Series::with_index(Some(name), values, index)));
            }
            return Ok(GroupResult::Series(Series::with_index(None, Vec::new(), index)));
        }
        let mut frame = Frame::from_columns(columns)?;
        if frame.width() == 0 {
            frame.index = Index::range(groups.len());
        }
        frame.set_index_labels(index)?;
        if self.as_index {
            Ok(GroupResult::Frame(frame))
        } else {
            frame.reset_index(false).map(GroupResult::Frame)
        }
    }

    fn assemble_size(
        &self,
        groups: &[(Vec<Scalar>, Vec<usize>)],
        sizes: Vec<Scalar>,
    ) -> EngineResult<GroupResult> {
        let index = self.key_index(groups);
        if self.as_index {
            return Ok(GroupResult::Series(Series::with_index(None, sizes, index)));
        }
        let mut frame = Frame::from_columns(vec![("size".to_string(), sizes)])?;
        frame.set_index_labels(index)?;
        frame.reset_index(false).map(GroupResult::Frame)
    }
}

/// Output of a group-by aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupResult {
    Frame(Frame),
    Series(Series),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Scalar {
        Scalar::str(v)
    }

    fn people() -> Frame {
        Frame::from_columns(vec![
            ("name".into(), vec![s("Bob"), s("Amy"), s("Cid"), s("Amy")]),
            ("age".into(), vec![Scalar::Int(30), Scalar::Null, Scalar::Int(25), Scalar::Null]),
            ("team".into(), vec![s("x"), s("y"), s("x"), s("y")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let err = Frame::from_columns(vec![
            ("a".into(), vec![Scalar::Int(1)]),
            ("b".into(), vec![]),
        ])
        .unwrap_err();
        assert!(err.message.contains("same length"));
    }

    #[test]
    fn test_dropna_variants() {
        let df = people();
        assert_eq!(df.dropna(None, false, None).unwrap().len(), 2);
        assert_eq!(df.dropna(None, true, None).unwrap().len(), 4);
        let subset = vec!["name".to_string()];
        assert_eq!(df.dropna(Some(&subset), false, None).unwrap().len(), 4);
        assert_eq!(df.dropna(None, false, Some(2)).unwrap().len(), 4);
        assert_eq!(df.dropna_columns(false).width(), 2);
    }

    #[test]
    fn test_dropna_keeps_labels() {
        let out = people().dropna(None, false, None).unwrap();
        assert_eq!(out.index().labels(), vec![Scalar::Int(0), Scalar::Int(2)]);
        let reset = out.reset_index(true).unwrap();
        assert_eq!(reset.index().labels(), vec![Scalar::Int(0), Scalar::Int(1)]);
    }

    #[test]
    fn test_sort_values_nulls_last() {
        let out = people().sort_values(&["age".into()], &[true], true).unwrap();
        assert_eq!(
            out.column("name").unwrap(),
            &[s("Cid"), s("Bob"), s("Amy"), s("Amy")]
        );
        let desc = people().sort_values(&["age".into()], &[false], false).unwrap();
        assert_eq!(desc.column("age").unwrap()[2], Scalar::Int(30));
    }

    #[test]
    fn test_sort_mixed_types_fails() {
        let df = Frame::from_columns(vec![("v".into(), vec![Scalar::Int(1), s("a")])]).unwrap();
        assert!(df.sort_values(&["v".into()], &[true], true).is_err());
    }

    #[test]
    fn test_drop_duplicates() {
        let df = people();
        let subset = vec!["name".to_string()];
        assert_eq!(df.drop_duplicates(Some(&subset), Keep::First).unwrap().len(), 3);
        assert_eq!(df.drop_duplicates(Some(&subset), Keep::None).unwrap().len(), 2);
        let last = df.drop_duplicates(Some(&subset), Keep::Last).unwrap();
        assert_eq!(last.index().labels(), vec![Scalar::Int(0), Scalar::Int(2), Scalar::Int(3)]);
        assert_eq!(df.drop_duplicates(None, Keep::First).unwrap().len(), 3);
    }

    #[test]
    fn test_head_tail() {
        let df = people();
        assert_eq!(df.head(2).len(), 2);
        assert_eq!(df.head(-1).len(), 3);
        assert_eq!(df.tail(1).column("name").unwrap(), &[s("Amy")]);
        assert_eq!(df.tail(10).len(), 4);
    }

    #[test]
    fn test_reductions() {
        let ages = [Scalar::Int(30), Scalar::Null, Scalar::Int(25)];
        assert_eq!(reduce(Agg::Sum, &ages).unwrap(), Scalar::Int(55));
        assert_eq!(reduce(Agg::Mean, &ages).unwrap(), Scalar::Float(27.5));
        assert_eq!(reduce(Agg::Count, &ages).unwrap(), Scalar::Int(2));
        assert_eq!(reduce(Agg::Size, &ages).unwrap(), Scalar::Int(3));
        assert_eq!(reduce(Agg::Max, &ages).unwrap(), Scalar::Int(30));
        assert_eq!(reduce(Agg::Median, &[Scalar::Int(1), Scalar::Int(4)]).unwrap(), Scalar::Float(2.5));
        assert!(reduce(Agg::Mean, &[s("a")]).is_err());
        assert_eq!(reduce(Agg::Sum, &[s("a"), s("b")]).unwrap(), s("ab"));
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(1.234, 2), 1.23);
        assert_eq!(round_half_even(1.5, 4_294_967_297), 1.5);
        assert_eq!(round_half_even(123.0, -4_294_967_297), 0.0);
        assert_eq!(round_half_even(1e300, 100), 1e300);
    }

    #[test]
    fn test_head_and_tail_spans() {
        assert_eq!(head_span(5, 2), 0..2);
        assert_eq!(head_span(5, -2), 0..3);
        assert_eq!(head_span(5, 9), 0..5);
        assert_eq!(tail_span(5, 2), 3..5);
        assert_eq!(tail_span(5, -2), 2..5);
        assert_eq!(tail_span(5, i64::MIN), 5..5);
        assert_eq!(head_span(5, i64::MIN), 0..0);
    }

    #[test]
    fn test_groupby_sum_as_index() {
        let df = Frame::from_columns(vec![
            ("team".into(), vec![s("y"), s("x"), s("y")]),
            ("pts".into(), vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]),
        ])
        .unwrap();
        let grouped = GroupBy::new(df, vec!["team".into()], true, true).unwrap();
        let GroupResult::Frame(out) = grouped.apply(Agg::Sum).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(out.column("pts").unwrap(), &[Scalar::Int(2), Scalar::Int(4)]);
        assert_eq!(out.index().labels(), vec![s("x"), s("y")]);

        let flat = out.reset_index(false).unwrap();
        assert_eq!(flat.column_names().collect::<Vec<_>>(), vec!["team", "pts"]);
    }

    #[test]
    fn test_groupby_selected_series_and_size() {
        let grouped = GroupBy::new(people(), vec!["team".into()], false, true).unwrap();
        let GroupResult::Frame(sizes) = grouped.apply(Agg::Size).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(sizes.column("size").unwrap(), &[Scalar::Int(2), Scalar::Int(2)]);

        let selected = GroupBy::new(people(), vec!["team".into()], true, true)
            .unwrap()
            .select(vec!["age".into()], true)
            .unwrap();
        let GroupResult::Series(mean) = selected.apply(Agg::Mean).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(mean.values[0], Scalar::Float(27.5));
        assert!(mean.values[1].is_null());
    }

    #[test]
    fn test_series_alignment() {
        let df = people();
        let partial = df.series("age").unwrap().dropna();
        let aligned = df.align(&partial);
        assert_eq!(aligned, vec![Scalar::Int(30), Scalar::Null, Scalar::Int(25), Scalar::Null]);
    }

    #[test]
    fn test_value_counts() {
        let counts = people().series("name").unwrap().value_counts(false, false);
        assert_eq!(counts.index.labels()[0], s("Amy"));
        assert_eq!(counts.values[0], Scalar::Int(2));
        assert_eq!(counts.name.as_deref(), Some("count"));
    }

    #[test]
    fn test_concat_fills_missing_columns() {
        let a = Frame::from_columns(vec![("x".into(), vec![Scalar::Int(1)])]).unwrap();
        let b = Frame::from_columns(vec![("y".into(), vec![Scalar::Int(2)])]).unwrap();
        let out = Frame::concat(&[a, b], true);
        assert_eq!(out.len(), 2);
        assert_eq!(out.column("x").unwrap(), &[Scalar::Int(1), Scalar::Null]);
    }

    #[test]
    fn test_groupby_transform_keeps_rows() {
        let selected = GroupBy::new(people(), vec!["team".into()], true, true)
            .unwrap()
            .select(vec!["name".into()], true)
            .unwrap();
        let GroupResult::Series(counts) = selected.transform(Agg::Count).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(counts.values, vec![Scalar::Int(2); 4]);
        assert_eq!(counts.index, Index::range(4));
    }
}
