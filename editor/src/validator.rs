//! Static pre-filter for model-generated snippets.
//!
//! A snippet is accepted when it is non-blank, matches none of the deny-list patterns and
//! matches at least one allow-list pattern of a table operation. This is a cheap filter, not
//! the sandbox: the engine resolves no filesystem, network or process capability whatever the
//! snippet says.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use thiserror::Error;

use crate::config::TABLE_BINDING;

/// Why a snippet was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("snippet is empty")]
    Empty,

    #[error("blocked pattern `{pattern}` ({reason})")]
    Blocked {
        pattern: &'static str,
        reason: &'static str,
    },

    #[error("snippet contains no table operation")]
    NoTableOperation,
}

/// Deny-list: (pattern, capability class). Matched case-insensitively.
const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    (r"import\s+", "module import"),
    (r"__", "double-underscore access"),
    (r"\bos\.", "operating system access"),
    (r"\bsys\.", "interpreter access"),
    (r"subprocess", "process spawning"),
    (r"\beval\s*\(", "dynamic evaluation"),
    (r"\bexec\s*\(", "dynamic evaluation"),
    (r"\bcompile\s*\(", "dynamic evaluation"),
    (r"\b(getattr|setattr|globals|locals)\b", "introspection"),
    (r"\bopen\s*\(", "file handle"),
    (r"pickle", "serialization"),
    (r"\b(socket|urllib|requests)\b", "network access"),
    (r"\bwhile\b", "unbounded loop"),
    (r"\blambda\b", "anonymous function"),
    (r";", "statement separator"),
    (r"file", "file I/O"),
    (r"write", "file I/O"),
    (r"read_csv", "file I/O"),
    (r"to_csv", "file I/O"),
];

/// Allow-list of table operations. Matched case-sensitively.
const ALLOWED_PATTERNS: &[&str] = &[
    r"df\s*[\.\[]",
    r"pd\.",
    r"to_datetime",
    r"str\.",
    r"fillna",
    r"drop",
    r"rename",
    r"apply",
    r"map",
    r"replace",
    r"astype",
    r"query",
    r"round",
    r"upper",
    r"lower",
    r"strip",
    r"dropna",
    r"isnull",
    r"value_counts",
    r"groupby",
    r"sort_values",
];

static BLOCKED: Lazy<Vec<(Regex, &'static str, &'static str)>> = Lazy::new(|| {
    BLOCKED_PATTERNS
        .iter()
        .filter_map(|(pattern, reason)| {
            Regex::new(&format!("(?i){}", pattern))
                .ok()
                .map(|re| (re, *pattern, *reason))
        })
        .collect()
});

static FOR_KEYWORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)\bfor\s+").ok());

static FOR_OVER_TABLE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bin\s+{}\b", TABLE_BINDING)).ok());

static ALLOWED: Lazy<Option<RegexSet>> = Lazy::new(|| RegexSet::new(ALLOWED_PATTERNS).ok());

/// Returns true when the snippet passes the filter.
pub fn validate(snippet: &str) -> bool {
    check(snippet).is_ok()
}

/// Like [`validate`] but reports the reason for a rejection.
pub fn check(snippet: &str) -> Result<(), Rejection> {
    if snippet.trim().is_empty() {
        return Err(Rejection::Empty);
    }

    for (re, pattern, reason) in BLOCKED.iter() {
        if re.is_match(snippet) {
            return Err(Rejection::Blocked { pattern, reason });
        }
    }

    if has_foreign_loop(snippet) {
        return Err(Rejection::Blocked {
            pattern: r"for\s+",
            reason: "loop not over the table",
        });
    }

    let allowed = ALLOWED
        .as_ref()
        .is_some_and(|set| set.is_match(snippet));
    if !allowed {
        return Err(Rejection::NoTableOperation);
    }
    Ok(())
}

/// A `for` whose remaining line does not iterate over the table binding.
fn has_foreign_loop(snippet: &str) -> bool {
    let (Some(keyword), Some(over_table)) = (FOR_KEYWORD.as_ref(), FOR_OVER_TABLE.as_ref()) else {
        return true;
    };

    keyword.find_iter(snippet).any(|m| {
        let rest = &snippet[m.end()..];
        let line = rest.split('\n').next().unwrap_or("");
        !over_table.is_match(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_table_operations() {
        assert!(validate("df = df.dropna()"));
        assert!(validate("df = df[df['Age'] > 30]"));
        assert!(validate("df = df.rename(columns={'A': 'B'})"));
        assert!(validate("df['Name'] = df['Name'].str.upper()"));
        assert!(validate("df = df.sort_values('Name')\ndf = df.reset_index(drop=True)"));
    }

    #[test]
    fn test_rejects_blank() {
        assert_eq!(check(""), Err(Rejection::Empty));
        assert_eq!(check("   \n\t"), Err(Rejection::Empty));
    }

    #[test]
    fn test_rejects_imports() {
        assert!(matches!(
            check("import os\ndf = df.dropna()"),
            Err(Rejection::Blocked { reason: "module import", .. })
        ));
        assert!(!validate("from os import path\ndf = df.dropna()"));
    }

    #[test]
    fn test_rejects_capabilities() {
        assert!(!validate("df = df.__class__"));
        assert!(!validate("os.system('rm -rf /')"));
        assert!(!validate("df = eval('df.dropna()')"));
        assert!(!validate("df = EXEC ('x')"));
        assert!(!validate("df = open('x').read()"));
        assert!(!validate("df = df.dropna(); df = df.head()"));
        assert!(!validate("df['a'] = df['a'].map(lambda x: x)"));
        assert!(!validate("while True:\n    df = df.head()"));
    }

    #[test]
    fn test_rejects_io_tokens_case_insensitively() {
        assert!(!validate("df.to_csv('out.csv')"));
        assert!(!validate("df = pd.read_csv('x')"));
        assert!(!validate("df = df.drop(columns=['Profile'])"));
        assert!(!validate("df = df.rename(columns={'a': 'Writer'})"));
    }

    #[test]
    fn test_for_loops_must_iterate_table() {
        assert!(!validate("for i in range(10):\n    df = df.head()"));
        assert!(validate("cols = [c for c in df.columns]\ndf = df[cols]"));
    }

    #[test]
    fn test_requires_table_operation() {
        assert_eq!(check("x = 1 + 2"), Err(Rejection::NoTableOperation));
        assert_eq!(check("Can you elaborate?"), Err(Rejection::NoTableOperation));
    }
}
