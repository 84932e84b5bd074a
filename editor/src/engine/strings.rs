//! Text operations: the `.str` accessor and methods on plain strings.

use regex::{Regex, RegexBuilder};

use super::args::{Args, KW};
use super::error::{EngineError, EngineResult};
use super::frame::Series;
use super::value::{Scalar, SliceSpec, Value};

/// Methods available on `series.str`.
pub const ACCESSOR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "title", "capitalize", "swapcase", "casefold",
    "len", "replace", "contains", "startswith", "endswith", "slice", "get", "zfill", "pad",
    "ljust", "rjust", "center", "isdigit", "isnumeric", "isalpha", "isalnum", "isspace",
    "isupper", "islower", "count", "find", "extract", "match", "fullmatch", "repeat",
];

/// Methods available on plain `str` values.
pub const STRING_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "title", "capitalize", "swapcase", "casefold",
    "replace", "startswith", "endswith", "zfill", "ljust", "rjust", "center", "isdigit",
    "isnumeric", "isalpha", "isalnum", "isspace", "isupper", "islower", "count", "find", "split",
    "join",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Both,
}

/// One element-wise text operation, with its arguments resolved once.
#[derive(Debug, Clone)]
enum StrOp {
    Upper,
    Lower,
    Title,
    Capitalize,
    SwapCase,
    Strip(Side, Option<String>),
    Len,
    ReplaceLiteral { pat: String, repl: String, n: Option<usize> },
    ReplaceRegex { re: Regex, repl: String, n: Option<usize> },
    ContainsLiteral { pat: String, case: bool },
    ContainsRegex(Regex),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    Slice(SliceSpec),
    Get(i64),
    Zfill(usize),
    Pad { width: usize, fill: char, side: Side },
    Predicate(fn(&str) -> bool),
    Count(Regex),
    Find(String),
    Extract(Regex),
    Match { re: Regex, full: bool },
    Repeat(usize),
}

impl StrOp {
    /// Resolve a method call. `regex_default` differs between pandas and plain strings.
    fn parse(name: &str, args: &Args, regex_default: bool) -> EngineResult<StrOp> {
        Ok(match name {
            "upper" => StrOp::Upper,
            "lower" | "casefold" => StrOp::Lower,
            "title" => StrOp::Title,
            "capitalize" => StrOp::Capitalize,
            "swapcase" => StrOp::SwapCase,
            "strip" => StrOp::Strip(Side::Both, args.str_opt(0, "to_strip")?),
            "lstrip" => StrOp::Strip(Side::Left, args.str_opt(0, "to_strip")?),
            "rstrip" => StrOp::Strip(Side::Right, args.str_opt(0, "to_strip")?),
            "len" => StrOp::Len,
            "replace" => {
                let pat = args.require_str(0, "pat")?;
                let repl = args.require_str(1, "repl")?;
                let n = args
                    .int_opt(2, "n")?
                    .filter(|n| *n >= 0)
                    .map(|n| n as usize);
                if args.bool_or(KW, "regex", regex_default)? {
                    let re = compile(&pat, args.bool_or(KW, "case", true)?)?;
                    StrOp::ReplaceRegex {
                        re,
                        repl: python_replacement(&repl),
                        n,
                    }
                } else {
                    StrOp::ReplaceLiteral { pat, repl, n }
                }
            }
            "contains" => {
                let pat = args.require_str(0, "pat")?;
                let case = args.bool_or(1, "case", true)?;
                if args.bool_or(KW, "regex", regex_default)? {
                    StrOp::ContainsRegex(compile(&pat, case)?)
                } else {
                    StrOp::ContainsLiteral { pat, case }
                }
            }
            "startswith" => StrOp::StartsWith(args.require(0, "pat")?.to_names()?),
            "endswith" => StrOp::EndsWith(args.require(0, "pat")?.to_names()?),
            "slice" => StrOp::Slice(SliceSpec {
                start: args.scalar_opt(0, "start")?,
                stop: args.scalar_opt(1, "stop")?,
                step: args.int_opt(2, "step")?,
            }),
            "get" => StrOp::Get(args.int_or(0, "i", 0)?),
            "zfill" => StrOp::Zfill(args.int_or(0, "width", 0)?.max(0) as usize),
            "pad" | "ljust" | "rjust" | "center" => {
                let width = args.int_or(0, "width", 0)?.max(0) as usize;
                let side = match name {
                    "ljust" => Side::Right,
                    "rjust" => Side::Left,
                    "center" => Side::Both,
                    _ => match args.str_or(1, "side", "left")?.as_str() {
                        "right" => Side::Right,
                        "both" => Side::Both,
                        _ => Side::Left,
                    },
                };
                let fill_pos = if name == "pad" { 2 } else { 1 };
                let fill = args
                    .str_or(fill_pos, "fillchar", " ")?
                    .chars()
                    .next()
                    .unwrap_or(' ');
                StrOp::Pad { width, fill, side }
            }
            "isdigit" | "isnumeric" => StrOp::Predicate(|s| !s.is_empty() && s.chars().all(char::is_numeric)),
            "isalpha" => StrOp::Predicate(|s| !s.is_empty() && s.chars().all(char::is_alphabetic)),
            "isalnum" => StrOp::Predicate(|s| !s.is_empty() && s.chars().all(char::is_alphanumeric)),
            "isspace" => StrOp::Predicate(|s| !s.is_empty() && s.chars().all(char::is_whitespace)),
            "isupper" => StrOp::Predicate(|s| {
                s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
            }),
            "islower" => StrOp::Predicate(|s| {
                s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase)
            }),
            "count" => {
                let pat = args.require_str(0, "pat")?;
                let re = if regex_default {
                    compile(&pat, true)?
                } else {
                    compile(&regex::escape(&pat), true)?
                };
                StrOp::Count(re)
            }
            "find" => StrOp::Find(args.require_str(0, "sub")?),
            "extract" => StrOp::Extract(compile(&args.require_str(0, "pat")?, true)?),
            "match" | "fullmatch" => StrOp::Match {
                re: compile(&args.require_str(0, "pat")?, args.bool_or(1, "case", true)?)?,
                full: name == "fullmatch",
            },
            "repeat" => StrOp::Repeat(args.int_or(0, "repeats", 1)?.max(0) as usize),
            other => {
                return Err(EngineError::attribute("StringMethods", other));
            }
        })
    }

    fn apply(&self, s: &str) -> Scalar {
        match self {
            StrOp::Upper => Scalar::str(s.to_uppercase()),
            StrOp::Lower => Scalar::str(s.to_lowercase()),
            StrOp::Title => Scalar::str(title_case(s)),
            StrOp::Capitalize => {
                let mut chars = s.chars();
                Scalar::str(match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.as_str().to_lowercase().chars())
                        .collect::<String>(),
                    None => String::new(),
                })
            }
            StrOp::SwapCase => Scalar::str(
                s.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect::<String>(),
            ),
            StrOp::Strip(side, chars) => {
                let matcher = |c: char| match chars {
                    Some(set) => set.contains(c),
                    None => c.is_whitespace(),
                };
                Scalar::str(match side {
                    Side::Left => s.trim_start_matches(matcher),
                    Side::Right => s.trim_end_matches(matcher),
                    Side::Both => s.trim_matches(matcher),
                })
            }
            StrOp::Len => Scalar::Int(s.chars().count() as i64),
            StrOp::ReplaceLiteral { pat, repl, n } => Scalar::str(match n {
                Some(n) => s.replacen(pat.as_str(), repl, *n),
                None => s.replace(pat.as_str(), repl),
            }),
            StrOp::ReplaceRegex { re, repl, n } => {
                Scalar::str(re.replacen(s, n.unwrap_or(0), repl.as_str()).into_owned())
            }
            StrOp::ContainsLiteral { pat, case } => Scalar::Bool(if *case {
                s.contains(pat.as_str())
            } else {
                s.to_lowercase().contains(&pat.to_lowercase())
            }),
            StrOp::ContainsRegex(re) => Scalar::Bool(re.is_match(s)),
            StrOp::StartsWith(prefixes) => Scalar::Bool(prefixes.iter().any(|p| s.starts_with(p.as_str()))),
            StrOp::EndsWith(suffixes) => Scalar::Bool(suffixes.iter().any(|p| s.ends_with(p.as_str()))),
            StrOp::Slice(spec) => {
                let chars: Vec<char> = s.chars().collect();
                match spec.positions(chars.len()) {
                    Ok(positions) => Scalar::str(positions.into_iter().map(|i| chars[i]).collect::<String>()),
                    Err(_) => Scalar::Null,
                }
            }
            StrOp::Get(i) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if (0..len).contains(&idx) {
                    Scalar::str(chars[idx as usize].to_string())
                } else {
                    Scalar::Null
                }
            }
            StrOp::Zfill(width) => Scalar::str(zfill(s, *width)),
            StrOp::Pad { width, fill, side } => Scalar::str(pad(s, *width, *fill, *side)),
            StrOp::Predicate(f) => Scalar::Bool(f(s)),
            StrOp::Count(re) => Scalar::Int(re.find_iter(s).count() as i64),
            StrOp::Find(sub) => Scalar::Int(
                s.find(sub.as_str())
                    .map(|byte| s[..byte].chars().count() as i64)
                    .unwrap_or(-1),
            ),
            StrOp::Extract(re) => re
                .captures(s)
                .and_then(|c| c.get(1).or_else(|| c.get(0)))
                .map(|m| Scalar::str(m.as_str()))
                .unwrap_or(Scalar::Null),
            StrOp::Match { re, full } => Scalar::Bool(re.find(s).is_some_and(|m| {
                m.start() == 0 && (!*full || m.end() == s.len())
            })),
            StrOp::Repeat(n) => Scalar::str(s.repeat(*n)),
        }
    }
}

pub(super) fn compile(pattern: &str, case_sensitive: bool) -> EngineResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| EngineError::value(format!("invalid regular expression '{}': {}", pattern, e)))
}

/// Python replacement templates use `\1`; the regex crate uses `${1}`.
pub(super) fn python_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' if chars.peek().is_some_and(|d| d.is_ascii_digit()) => {
                let mut group = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    group.push(*d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            other => out.push(other),
        }
    }
    out
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn zfill(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let zeros = "0".repeat(width - len);
    match s.chars().next() {
        Some(sign @ ('-' | '+')) => format!("{}{}{}", sign, zeros, &s[1..]),
        _ => format!("{}{}", zeros, s),
    }
}

fn pad(s: &str, width: usize, fill: char, side: Side) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let total = width - len;
    let (left, right) = match side {
        Side::Left => (total, 0),
        Side::Right => (0, total),
        Side::Both => (total / 2, total - total / 2),
    };
    let fill_str = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    format!("{}{}{}", fill_str(left), s, fill_str(right))
}

/// `series.str.<name>(...)`, element-wise. Missing and non-text elements become missing
/// (predicates use `na` when given).
pub fn accessor_call(series: &Series, name: &str, args: &Args) -> EngineResult<Series> {
    let op = StrOp::parse(name, args, true)?;
    let na = args.scalar_opt(KW, "na")?;
    series.map_values(|v| {
        Ok(match v {
            Scalar::Str(s) => op.apply(s),
            _ => na.clone().unwrap_or_default(),
        })
    })
}

/// `series.str[i]` and `series.str[a:b]`.
pub fn accessor_subscript(series: &Series, key: &Value) -> EngineResult<Series> {
    let op = match key {
        Value::Slice(spec) => StrOp::Slice(spec.clone()),
        Value::Scalar(s) => StrOp::Get(s.as_i64().ok_or_else(|| {
            EngineError::type_error("string indices must be integers")
        })?),
        other => {
            return Err(EngineError::type_error(format!(
                "string indices must be integers, not '{}'",
                other.type_name()
            )))
        }
    };
    series.map_values(|v| {
        Ok(match v {
            Scalar::Str(s) => op.apply(s),
            _ => Scalar::Null,
        })
    })
}

/// A method on a plain string, e.g. `c.strip()` or `str.upper(c)`.
pub fn string_call(s: &str, name: &str, args: &Args) -> EngineResult<Value> {
    match name {
        "split" => {
            let sep = args.str_opt(0, "sep")?;
            let limit = args.int_opt(1, "maxsplit")?.filter(|n| *n >= 0);
            let parts: Vec<Value> = match (sep, limit) {
                (Some(sep), Some(n)) => s.splitn(n as usize + 1, sep.as_str()).map(Value::str).collect(),
                (Some(sep), None) => s.split(sep.as_str()).map(Value::str).collect(),
                (None, _) => s.split_whitespace().map(Value::str).collect(),
            };
            Ok(Value::List(parts))
        }
        "join" => {
            let items = args.require(0, "iterable")?.iterate()?;
            let parts = items
                .iter()
                .map(|v| match v {
                    Value::Scalar(Scalar::Str(p)) => Ok(p.clone()),
                    other => Err(EngineError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(Value::str(parts.join(s)))
        }
        _ if STRING_METHODS.contains(&name) => {
            Ok(Value::Scalar(StrOp::parse(name, args, false)?.apply(s)))
        }
        _ => Err(EngineError::attribute("str", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[&str]) -> Series {
        Series::new(Some("name".into()), values.iter().map(|v| Scalar::str(*v)).collect())
    }

    fn call(s: &Series, name: &str, args: Vec<Value>) -> Vec<Scalar> {
        accessor_call(s, name, &Args::positional(name, args)).unwrap().values
    }

    #[test]
    fn test_case_and_trim() {
        let s = series(&["  alice smith ", "BOB"]);
        assert_eq!(call(&s, "strip", vec![])[0], Scalar::str("alice smith"));
        assert_eq!(call(&s, "upper", vec![])[1], Scalar::str("BOB"));
        assert_eq!(call(&series(&["alice o'neil"]), "title", vec![])[0], Scalar::str("Alice O'Neil"));
        assert_eq!(call(&s, "capitalize", vec![])[1], Scalar::str("Bob"));
    }

    #[test]
    fn test_missing_elements_stay_missing() {
        let s = Series::new(None, vec![Scalar::Null, Scalar::Int(3), Scalar::str("x")]);
        let out = call(&s, "upper", vec![]);
        assert_eq!(out, vec![Scalar::Null, Scalar::Null, Scalar::str("X")]);

        let args = Args::new("contains", vec![Value::str("x")], vec![("na".into(), Value::bool(false))]);
        let out = accessor_call(&s, "contains", &args).unwrap().values;
        assert_eq!(out, vec![Scalar::Bool(false), Scalar::Bool(false), Scalar::Bool(true)]);
    }

    #[test]
    fn test_replace_literal_and_regex() {
        let s = series(&["a.b.c"]);
        let literal = Args::new(
            "replace",
            vec![Value::str("."), Value::str("-")],
            vec![("regex".into(), Value::bool(false))],
        );
        assert_eq!(accessor_call(&s, "replace", &literal).unwrap().values[0], Scalar::str("a-b-c"));

        let s = series(&["John   Smith"]);
        let regex = Args::new(
            "replace",
            vec![Value::str(r"(\w+)\s+(\w+)"), Value::str(r"\2, \1")],
            vec![("regex".into(), Value::bool(true))],
        );
        assert_eq!(accessor_call(&s, "replace", &regex).unwrap().values[0], Scalar::str("Smith, John"));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let s = series(&["Apple", "banana"]);
        let args = Args::new("contains", vec![Value::str("APPLE")], vec![("case".into(), Value::bool(false))]);
        let out = accessor_call(&s, "contains", &args).unwrap().values;
        assert_eq!(out, vec![Scalar::Bool(true), Scalar::Bool(false)]);
    }

    #[test]
    fn test_slicing() {
        let s = series(&["2024-01-15"]);
        let spec = SliceSpec {
            start: None,
            stop: Some(Scalar::Int(4)),
            step: None,
        };
        assert_eq!(accessor_subscript(&s, &Value::Slice(spec)).unwrap().values[0], Scalar::str("2024"));
        assert_eq!(accessor_subscript(&s, &Value::int(-1)).unwrap().values[0], Scalar::str("5"));
    }

    #[test]
    fn test_padding() {
        assert_eq!(zfill("-42", 5), "-0042");
        assert_eq!(pad("7", 3, '*', Side::Both), "*7*");
        assert_eq!(call(&series(&["5"]), "zfill", vec![Value::int(3)])[0], Scalar::str("005"));
    }

    #[test]
    fn test_plain_string_methods() {
        let split = string_call("a,b", "split", &Args::positional("split", vec![Value::str(",")])).unwrap();
        assert_eq!(split, Value::List(vec![Value::str("a"), Value::str("b")]));
        let joined = string_call("-", "join", &Args::positional("join", vec![split])).unwrap();
        assert_eq!(joined, Value::str("a-b"));
        // plain str.replace is literal
        let replaced = string_call("a.b", "replace", &Args::positional("replace", vec![Value::str("."), Value::str("")])).unwrap();
        assert_eq!(replaced, Value::str("ab"));
        assert!(string_call("x", "encode", &Args::default()).is_err());
    }
}
