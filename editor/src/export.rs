//! CSV export of the current dataset.
//!
//! Header order follows column order. Text is written verbatim, numbers in their canonical form
//! (see [`format_number`](crate::dataset::format_number)) and nulls as empty fields. Nothing is
//! re-coerced on the way out.

use std::io::Write;
use std::path::Path;

use crate::dataset::Dataset;
use crate::error::{ExportError, ExportResult};

/// Serialize `dataset` to CSV text with a `,` delimiter.
pub fn export_csv(dataset: &Dataset) -> ExportResult<String> {
    export_csv_with(dataset, b',')
}

/// Serialize `dataset` to CSV text with the given delimiter.
pub fn export_csv_with(dataset: &Dataset, delimiter: u8) -> ExportResult<String> {
    let bytes = write_csv(dataset, delimiter, Vec::new())?;
    Ok(String::from_utf8(bytes)?)
}

/// Write `dataset` as CSV to a file, creating or truncating it.
pub fn export_csv_file(dataset: &Dataset, path: impl AsRef<Path>) -> ExportResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut file = write_csv(dataset, b',', file)?;
    file.flush()?;
    log::info!("Exported {} rows to {}", dataset.len(), path.as_ref().display());
    Ok(())
}

fn write_csv<W: Write>(dataset: &Dataset, delimiter: u8, out: W) -> ExportResult<W> {
    if dataset.is_empty() {
        return Err(ExportError::Empty);
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);

    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row.values().map(|cell| cell.to_string()))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, Row};

    fn sample() -> Dataset {
        Dataset::from_rows(vec![
            Row::from_iter([
                ("name", Cell::from("Smith, Bob")),
                ("age", Cell::Number(30.0)),
                ("score", Cell::Number(2.5)),
            ]),
            Row::from_iter([
                ("name", Cell::from("Amy")),
                ("age", Cell::Null),
                ("score", Cell::from("007")),
            ]),
        ])
        .unwrap()
    }

    #[test]
    fn test_export_keeps_order_and_text() {
        let csv = export_csv(&sample()).unwrap();
        assert_eq!(csv, "name,age,score\n\"Smith, Bob\",30,2.5\nAmy,,007\n");
    }

    #[test]
    fn test_export_with_delimiter() {
        let csv = export_csv_with(&sample(), b';').unwrap();
        assert!(csv.starts_with("name;age;score\n"));
        assert!(csv.contains(";30;2.5\n"));
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert!(matches!(export_csv(&Dataset::new()), Err(ExportError::Empty)));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export_csv_file(&sample(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, export_csv(&sample()).unwrap());
    }
}
