//! Conversion between the editor's [`Dataset`] and the engine's [`Frame`].
//!
//! Into the engine, each cell is coerced on its own: empty text and nulls become `None`, text
//! that fully parses as a number becomes an int or float, everything else stays text. Out of the
//! engine, the index is dropped, missing values (and NaN/inf) become [`Cell::Null`] and booleans
//! become the text `true`/`false`.

use std::collections::HashSet;

use crate::dataset::{Cell, Dataset, Row};
use crate::engine::{Frame, Scalar};
use crate::error::TransformFailure;

/// Engine value of one host cell.
pub fn cell_to_scalar(cell: &Cell) -> Scalar {
    match cell {
        Cell::Null => Scalar::Null,
        Cell::Number(n) => number(*n),
        Cell::Text(s) if s.is_empty() => Scalar::Null,
        Cell::Text(s) => parse_numeric(s).unwrap_or_else(|| Scalar::Str(s.clone())),
    }
}

fn number(n: f64) -> Scalar {
    if !n.is_finite() {
        Scalar::Null
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Scalar::Int(n as i64)
    } else {
        Scalar::Float(n)
    }
}

/// Text that is a whole number literal, or a finite decimal one.
fn parse_numeric(text: &str) -> Option<Scalar> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Scalar::Int(i));
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Scalar::Float(f)),
        _ => None,
    }
}

/// Host cell of one engine value.
pub fn scalar_to_cell(value: &Scalar) -> Cell {
    match value {
        Scalar::Null => Cell::Null,
        Scalar::Float(f) if !f.is_finite() => Cell::Null,
        Scalar::Float(f) => Cell::Number(*f),
        Scalar::Int(i) => Cell::Number(*i as f64),
        Scalar::Bool(b) => Cell::text(if *b { "true" } else { "false" }),
        Scalar::Str(s) => Cell::Text(s.clone()),
    }
}

/// Build the engine table for a dataset. The frame shares nothing with `dataset`.
pub fn to_engine(dataset: &Dataset) -> Result<Frame, TransformFailure> {
    let columns = dataset.columns();
    let mut data: Vec<(String, Vec<Scalar>)> = columns
        .iter()
        .map(|name| (name.clone(), Vec::with_capacity(dataset.len())))
        .collect();

    for row in dataset.rows() {
        for ((_, values), cell) in data.iter_mut().zip(row.values()) {
            values.push(cell_to_scalar(cell));
        }
    }

    Frame::from_columns(data).map_err(|e| TransformFailure::MalformedResult(e.message))
}

/// Read a dataset back out of an engine table.
pub fn from_engine(frame: &Frame) -> Result<Dataset, TransformFailure> {
    let names: Vec<&str> = frame.column_names().collect();
    if names.is_empty() && frame.len() > 0 {
        return Err(TransformFailure::MalformedResult(
            "result table has rows but no columns".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(names.len());
    for name in &names {
        if name.is_empty() {
            return Err(TransformFailure::MalformedResult(
                "result table has an empty column name".to_string(),
            ));
        }
        if !seen.insert(*name) {
            return Err(TransformFailure::MalformedResult(format!(
                "result table has a duplicate column '{}'",
                name
            )));
        }
    }

    let rows = (0..frame.len())
        .map(|i| {
            frame
                .row(i)
                .map(|(name, value)| (name, scalar_to_cell(value)))
                .collect::<Row>()
        })
        .collect();

    Dataset::from_rows(rows).map_err(|e| TransformFailure::MalformedResult(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[&[(&str, &str)]]) -> Dataset {
        Dataset::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|(k, v)| (*k, Cell::from(*v))).collect::<Row>())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_cell_coercion() {
        assert_eq!(cell_to_scalar(&Cell::from("")), Scalar::Null);
        assert_eq!(cell_to_scalar(&Cell::Null), Scalar::Null);
        assert_eq!(cell_to_scalar(&Cell::from("30")), Scalar::Int(30));
        assert_eq!(cell_to_scalar(&Cell::from("2.5")), Scalar::Float(2.5));
        assert_eq!(cell_to_scalar(&Cell::from("nan")), Scalar::str("nan"));
        assert_eq!(cell_to_scalar(&Cell::from("   ")), Scalar::str("   "));
        assert_eq!(cell_to_scalar(&Cell::from("Bob")), Scalar::str("Bob"));
        assert_eq!(cell_to_scalar(&Cell::Number(4.0)), Scalar::Int(4));
    }

    #[test]
    fn test_mixed_column_keeps_per_cell_types() {
        let data = dataset(&[&[("v", "1")], &[("v", "x")], &[("v", "")]]);
        let frame = to_engine(&data).unwrap();
        assert_eq!(
            frame.column("v").unwrap(),
            &[Scalar::Int(1), Scalar::str("x"), Scalar::Null]
        );
    }

    #[test]
    fn test_round_trip_keeps_shape_and_order() {
        let data = dataset(&[
            &[("name", "Bob"), ("age", "30"), ("city", "")],
            &[("name", "Amy"), ("age", "x"), ("city", "LA")],
        ]);
        let back = from_engine(&to_engine(&data).unwrap()).unwrap();
        assert_eq!(back.len(), data.len());
        assert_eq!(back.columns(), data.columns());
        assert_eq!(back.cell(0, "age"), Some(&Cell::Number(30.0)));
        assert_eq!(back.cell(0, "city"), Some(&Cell::Null));
        assert_eq!(back.cell(1, "age"), Some(&Cell::from("x")));
    }

    #[test]
    fn test_special_values_out_of_engine() {
        let frame = Frame::from_columns(vec![
            ("f".into(), vec![Scalar::Float(f64::NAN), Scalar::Float(1.5)]),
            ("b".into(), vec![Scalar::Bool(true), Scalar::Bool(false)]),
        ])
        .unwrap();
        let data = from_engine(&frame).unwrap();
        assert_eq!(data.cell(0, "f"), Some(&Cell::Null));
        assert_eq!(data.cell(1, "f"), Some(&Cell::Number(1.5)));
        assert_eq!(data.cell(0, "b"), Some(&Cell::from("true")));
    }

    #[test]
    fn test_empty_dataset() {
        let frame = to_engine(&Dataset::new()).unwrap();
        assert!(frame.is_empty());
        assert!(from_engine(&frame).unwrap().is_empty());
    }
}
