//! Text rendering of a dataset.
//!
//! [`render_table`] is a pure function of the dataset and the numbering flag:
//!
//! ```text
//! +---+------+-----+
//! | # | name | age |
//! +---+------+-----+
//! | 1 | Bob  | 30  |
//! +---+------+-----+
//! ```

use crate::dataset::Dataset;

/// Shown instead of a grid when there are no rows.
pub const EMPTY_TABLE: &str = "No data found";

/// Longest rendered cell, in characters, before truncation with `…`.
const MAX_CELL_WIDTH: usize = 40;

fn clip(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        return flat;
    }
    let mut clipped: String = flat.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

fn separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.push_str(&"-".repeat(w + 2));
        line.push('+');
    }
    line
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let mut out = String::from("|");
    for (cell, w) in cells.iter().zip(widths) {
        let pad = w - cell.chars().count();
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(pad + 1));
        out.push('|');
    }
    out
}

/// Render `dataset` as a boxed grid, with a leading `#` column of 1-based row numbers when
/// `show_numbers` is set.
pub fn render_table(dataset: &Dataset, show_numbers: bool) -> String {
    if dataset.is_empty() {
        return EMPTY_TABLE.to_string();
    }

    let mut header: Vec<String> = dataset.columns().iter().map(|c| clip(c)).collect();
    if show_numbers {
        header.insert(0, "#".to_string());
    }

    let body: Vec<Vec<String>> = dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut cells: Vec<String> = row.values().map(|c| clip(&c.to_string())).collect();
            if show_numbers {
                cells.insert(0, (i + 1).to_string());
            }
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let rule = separator(&widths);
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(rule.clone());
    out.push(line(&header, &widths));
    out.push(rule.clone());
    out.extend(body.iter().map(|cells| line(cells, &widths)));
    out.push(rule);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, Row};

    fn sample() -> Dataset {
        Dataset::from_rows(vec![
            Row::from_iter([("name", Cell::from("Bob")), ("age", Cell::Number(30.0))]),
            Row::from_iter([("name", Cell::from("Amy")), ("age", Cell::Null)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_render_with_numbers() {
        let expected = "\
+---+------+-----+
| # | name | age |
+---+------+-----+
| 1 | Bob  | 30  |
| 2 | Amy  |     |
+---+------+-----+";
        assert_eq!(render_table(&sample(), true), expected);
    }

    #[test]
    fn test_render_without_numbers() {
        let out = render_table(&sample(), false);
        assert!(out.starts_with("+------+-----+\n| name | age |"));
        assert!(!out.contains('#'));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_table(&Dataset::new(), true), EMPTY_TABLE);
    }

    #[test]
    fn test_long_cells_are_clipped() {
        let data = Dataset::from_rows(vec![Row::from_iter([("v", Cell::from("x".repeat(100)))])]).unwrap();
        let out = render_table(&data, false);
        assert!(out.contains('…'));
        assert!(out.lines().all(|l| l.chars().count() <= MAX_CELL_WIDTH + 4));
    }
}
