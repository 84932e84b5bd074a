//! `pd.to_datetime` and the `.dt` accessor.
//!
//! Datetimes live in cells as ISO text (`2024-01-15` or `2024-01-15 08:30:00`), so they sort and
//! compare correctly as strings and survive the trip back to the grid unchanged.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::args::{Args, KW};
use super::error::{EngineError, EngineResult};
use super::frame::Series;
use super::value::{Scalar, Value};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y",
    "%d %b %Y", "%b %d %Y",
];

const MONTH_FIRST: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"];
const DAY_FIRST: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y"];

/// Attributes of `series.dt`.
pub const DT_ATTRIBUTES: &[&str] = &[
    "year", "month", "day", "hour", "minute", "second", "dayofweek", "weekday", "day_of_week",
    "dayofyear", "day_of_year", "quarter", "date",
];

/// Methods of `series.dt`.
pub const DT_METHODS: &[&str] = &["strftime", "day_name", "month_name"];

/// How `to_datetime` treats unparseable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errors {
    Raise,
    Coerce,
    Ignore,
}

impl Errors {
    pub fn from_args(args: &Args) -> EngineResult<Errors> {
        match args.str_or(KW, "errors", "raise")?.as_str() {
            "raise" => Ok(Errors::Raise),
            "coerce" => Ok(Errors::Coerce),
            "ignore" => Ok(Errors::Ignore),
            other => Err(EngineError::value(format!(
                "errors must be one of 'ignore', 'raise', or 'coerce', got '{}'",
                other
            ))),
        }
    }
}

fn check_format(format: &str) -> EngineResult<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(EngineError::value(format!("invalid format string '{}'", format)));
    }
    Ok(())
}

/// Parse one piece of text, trying the common layouts when `format` is absent.
pub fn parse(text: &str, format: Option<&str>, dayfirst: bool) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt);
    }
    let (first, second) = if dayfirst {
        (DAY_FIRST, MONTH_FIRST)
    } else {
        (MONTH_FIRST, DAY_FIRST)
    };
    DATE_FORMATS
        .iter()
        .chain(first)
        .chain(second)
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Render the way pandas prints a timestamp: the time part only when it is not midnight.
pub fn render(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn parse_scalar(value: &Scalar, format: Option<&str>, dayfirst: bool) -> Option<NaiveDateTime> {
    match value {
        Scalar::Str(s) => parse(s, format, dayfirst),
        Scalar::Int(i) => parse(&i.to_string(), format, dayfirst),
        _ => None,
    }
}

fn convert(value: &Scalar, format: Option<&str>, dayfirst: bool, errors: Errors) -> EngineResult<Scalar> {
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    match parse_scalar(value, format, dayfirst) {
        Some(dt) => Ok(Scalar::Str(render(&dt))),
        None => match errors {
            Errors::Coerce => Ok(Scalar::Null),
            Errors::Ignore => Ok(value.clone()),
            Errors::Raise => Err(match format {
                Some(f) => EngineError::value(format!("time data \"{}\" doesn't match format \"{}\"", value, f)),
                None => EngineError::value(format!(
                    "Unknown datetime string format, unable to parse: {}",
                    value
                )),
            }),
        },
    }
}

/// `pd.to_datetime(arg, errors=..., format=..., dayfirst=...)`
pub fn to_datetime(args: &Args) -> EngineResult<Value> {
    args.check(1, &["arg", "errors", "format", "dayfirst"])?;
    let arg = args.require(0, "arg")?;
    let errors = Errors::from_args(args)?;
    let format = args.str_opt(KW, "format")?;
    if let Some(f) = &format {
        check_format(f)?;
    }
    let dayfirst = args.bool_or(KW, "dayfirst", false)?;

    let one = |v: &Scalar| convert(v, format.as_deref(), dayfirst, errors);
    match arg {
        Value::Scalar(s) => one(s).map(Value::Scalar),
        Value::Series(series) => {
            // `ignore` returns the input untouched when any element fails
            if errors == Errors::Ignore {
                let strict = series.map_values(|v| convert(v, format.as_deref(), dayfirst, Errors::Raise));
                return Ok(Value::Series(strict.unwrap_or_else(|_| series.clone())));
            }
            series.map_values(one).map(Value::Series)
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
            let values = arg.to_scalars()?.iter().map(one).collect::<EngineResult<Vec<_>>>()?;
            Ok(Value::Index(values))
        }
        other => Err(EngineError::type_error(format!(
            "<class '{}'> is not convertible to datetime",
            other.type_name()
        ))),
    }
}

/// `series.dt`: only valid when every present value is a datetime.
pub fn accessor(series: &Series) -> EngineResult<Value> {
    let datetimelike = series
        .values
        .iter()
        .filter(|v| !v.is_null())
        .all(|v| parse_scalar(v, None, false).is_some());
    if !datetimelike {
        return Err(EngineError::new(
            super::error::ExceptionKind::AttributeError,
            "Can only use .dt accessor with datetimelike values",
        ));
    }
    Ok(Value::DtAccessor(series.clone()))
}

fn map_datetimes(series: &Series, f: impl Fn(&NaiveDateTime) -> Scalar) -> EngineResult<Series> {
    series.map_values(|v| {
        Ok(match parse_scalar(v, None, false) {
            Some(dt) if !v.is_null() => f(&dt),
            _ => Scalar::Null,
        })
    })
}

/// `series.dt.<attr>`
pub fn attribute(series: &Series, name: &str) -> EngineResult<Series> {
    let int = |n: u32| Scalar::Int(n as i64);
    match name {
        "year" => map_datetimes(series, |d| Scalar::Int(d.year() as i64)),
        "month" => map_datetimes(series, |d| int(d.month())),
        "day" => map_datetimes(series, |d| int(d.day())),
        "hour" => map_datetimes(series, |d| int(d.hour())),
        "minute" => map_datetimes(series, |d| int(d.minute())),
        "second" => map_datetimes(series, |d| int(d.second())),
        "dayofweek" | "weekday" | "day_of_week" => {
            map_datetimes(series, |d| int(d.weekday().num_days_from_monday()))
        }
        "dayofyear" | "day_of_year" => map_datetimes(series, |d| int(d.ordinal())),
        "quarter" => map_datetimes(series, |d| int((d.month() - 1) / 3 + 1)),
        "date" => map_datetimes(series, |d| Scalar::Str(d.format("%Y-%m-%d").to_string())),
        other => Err(EngineError::attribute("DatetimeProperties", other)),
    }
}

/// `series.dt.<method>(...)`
pub fn call(series: &Series, name: &str, args: &Args) -> EngineResult<Series> {
    match name {
        "strftime" => {
            let format = args.require_str(0, "date_format")?;
            check_format(&format)?;
            map_datetimes(series, |d| Scalar::Str(d.format(&format).to_string()))
        }
        "day_name" => map_datetimes(series, |d| Scalar::Str(d.format("%A").to_string())),
        "month_name" => map_datetimes(series, |d| Scalar::Str(d.format("%B").to_string())),
        other => Err(EngineError::attribute("DatetimeProperties", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[&str]) -> Series {
        Series::new(Some("when".into()), values.iter().map(|v| Scalar::str(*v)).collect())
    }

    #[test]
    fn test_parse_common_layouts() {
        let expect = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_time(NaiveTime::MIN);
        for text in ["2024-01-15", "2024/01/15", "01/15/2024", "January 15, 2024", "15 Jan 2024"] {
            assert_eq!(parse(text, None, false), Some(expect), "{}", text);
        }
        assert_eq!(parse("15/01/2024", None, true), Some(expect));
        assert_eq!(parse("15.01.2024", Some("%d.%m.%Y"), false), Some(expect));
        assert_eq!(parse("not a date", None, false), None);
    }

    #[test]
    fn test_render_drops_midnight() {
        let dt = parse("2024-01-15T08:30:00Z", None, false).unwrap();
        assert_eq!(render(&dt), "2024-01-15 08:30:00");
        assert_eq!(render(&parse("2024-01-15", None, false).unwrap()), "2024-01-15");
    }

    #[test]
    fn test_to_datetime_errors_modes() {
        let input = Value::Series(series(&["2024-03-01", "bad"]));
        let raise = Args::positional("to_datetime", vec![input.clone()]);
        assert!(to_datetime(&raise).is_err());

        let coerce = Args::new("to_datetime", vec![input.clone()], vec![("errors".into(), Value::str("coerce"))]);
        match to_datetime(&coerce).unwrap() {
            Value::Series(s) => assert_eq!(s.values, vec![Scalar::str("2024-03-01"), Scalar::Null]),
            other => panic!("unexpected {:?}", other),
        }

        let ignore = Args::new("to_datetime", vec![input.clone()], vec![("errors".into(), Value::str("ignore"))]);
        assert_eq!(to_datetime(&ignore).unwrap(), input);
    }

    #[test]
    fn test_dt_fields() {
        let s = series(&["2024-03-01 14:05:09", "2023-12-25"]);
        assert_eq!(attribute(&s, "year").unwrap().values, vec![Scalar::Int(2024), Scalar::Int(2023)]);
        assert_eq!(attribute(&s, "quarter").unwrap().values, vec![Scalar::Int(1), Scalar::Int(4)]);
        assert_eq!(attribute(&s, "hour").unwrap().values[0], Scalar::Int(14));
        // 2024-03-01 is a Friday
        assert_eq!(attribute(&s, "dayofweek").unwrap().values[0], Scalar::Int(4));
        let names = call(&s, "day_name", &Args::default()).unwrap();
        assert_eq!(names.values[1], Scalar::str("Monday"));
        let fmt = call(&s, "strftime", &Args::positional("strftime", vec![Value::str("%d/%m/%Y")])).unwrap();
        assert_eq!(fmt.values[0], Scalar::str("01/03/2024"));
    }

    #[test]
    fn test_accessor_requires_datetimes() {
        assert!(accessor(&series(&["2024-01-01"])).is_ok());
        let err = accessor(&series(&["hello"])).unwrap_err();
        assert_eq!(err.message, "Can only use .dt accessor with datetimelike values");
    }
}
