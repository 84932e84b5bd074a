//! CSV import with encoding and delimiter auto-detection.
//!
//! Bytes are decoded (charset guessed with `chardet`, decoded with `encoding_rs`), the delimiter
//! is picked from the header line, and the records become a [`Dataset`] of text cells. Short
//! records are padded with empty text, long ones truncated. Header names are made unique so
//! the table invariant holds.

use std::collections::HashSet;
use std::path::Path;

use sheetsmith_editor::{Cell, Dataset};

use crate::error::{CsvError, CsvResult};

/// Delimiters tried by [`detect_delimiter`], in tie-break order.
const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// An imported table plus what was detected on the way in.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub dataset: Dataset,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Guess the charset of raw bytes.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _, _) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given charset. Unknown charsets decode as lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// The delimiter that occurs most often in the first line (`;` when none occurs).
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }
    best
}

/// Make header names non-empty and unique: empty names become `column_N` (1-based position),
/// repeats get a `_2`, `_3`, ... suffix.
pub fn unique_headers(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.iter()
        .enumerate()
        .map(|(i, name)| {
            let base = match name.trim() {
                "" => format!("column_{}", i + 1),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char) -> CsvResult<(Vec<String>, Dataset)> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let delimiter = u8::try_from(delimiter).map_err(|_| CsvError::ParseError {
        line: 1,
        message: format!("delimiter '{}' is not a single byte", delimiter),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| parse_error(1, e))?,
        None => return Err(CsvError::EmptyFile),
    };
    let raw: Vec<String> = header.iter().map(str::to_string).collect();
    if raw.iter().all(String::is_empty) {
        return Err(CsvError::NoHeaders);
    }
    let headers = unique_headers(&raw);

    let mut rows = Vec::new();
    for (i, record) in records.enumerate() {
        let record = record.map_err(|e| parse_error(i + 2, e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(Cell::from).collect::<Vec<_>>());
    }

    let dataset = Dataset::from_records(&headers, rows)?;
    Ok((headers, dataset))
}

fn parse_error(line: usize, e: csv::Error) -> CsvError {
    let line = e
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(line);
    CsvError::ParseError {
        line,
        message: e.to_string(),
    }
}

/// Parse CSV bytes, detecting encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let (headers, dataset) = parse_str(&content, delimiter)?;

    log::info!(
        "Parsed {} rows, {} columns (encoding {}, delimiter {:?})",
        dataset.len(),
        headers.len(),
        encoding,
        delimiter
    );
    Ok(ParseResult {
        dataset,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse a CSV file, detecting encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(dataset: &Dataset, row: usize, column: &str) -> String {
        dataset.cell(row, column).map(|c| c.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_simple_csv() {
        let (headers, data) = parse_str("name;age\nAlice;30\nBob;25", ';').unwrap();
        assert_eq!(headers, vec!["name", "age"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.cell(0, "age"), Some(&Cell::from("30")));
        assert_eq!(text(&data, 1, "name"), "Bob");
    }

    #[test]
    fn test_quoted_values() {
        let (_, data) = parse_str("name,quote\n\"Smith, Bob\",\"He said \"\"hi\"\"\"", ',').unwrap();
        assert_eq!(text(&data, 0, "name"), "Smith, Bob");
        assert_eq!(text(&data, 0, "quote"), "He said \"hi\"");
    }

    #[test]
    fn test_empty_lines_skipped() {
        let (_, data) = parse_str("a;b\n1;2\n\n3;4\n", ';').unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_ragged_records() {
        let (_, data) = parse_str("a;b;c\n1\n1;2;3;4", ';').unwrap();
        assert_eq!(text(&data, 0, "b"), "");
        assert_eq!(text(&data, 0, "c"), "");
        assert_eq!(data.rows()[1].len(), 3);
    }

    #[test]
    fn test_unique_headers() {
        let raw: Vec<String> = ["id", "", "id", "name", "id"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            unique_headers(&raw),
            vec!["id", "column_2", "id_2", "name", "id_3"]
        );
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_str("", ';'), Err(CsvError::EmptyFile)));
        assert!(matches!(parse_bytes_auto(b""), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ';');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes_auto(b"name,age\nAlice,30\nBob,25").unwrap();
        assert_eq!(result.delimiter, ',');
        assert_eq!(result.dataset.len(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1").unwrap(), "Société");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name;city\nAmy;LA\n").unwrap();
        let result = parse_csv_file_auto(&path).unwrap();
        assert_eq!(text(&result.dataset, 0, "city"), "LA");
    }
}
