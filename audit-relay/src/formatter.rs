//! Canonical JSON envelopes for log and audit events
//!
//! Envelopes are serialized with `serde_json`: absent optional fields become
//! explicit `null`, HTML characters are never escaped, and field order is the
//! declaration order of [`LogEvent`] and [`AuditEvent`].
//!
//! Messages are interpolated printf-style by [`interpolate`], which never
//! fails. A conversion with no matching argument is emitted literally, and a
//! type mismatch falls back to the argument's string form.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;

/// Timestamp layout shared by both envelopes (`yyyy-MMM-dd hh:mm:ss.SSS`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%b-%d %I:%M:%S%.3f";

/// Log level of a [`LogEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name as it appears in the envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log line
///
/// Serializes as `{service, clazz, method, threadId, logLevel, time, message}`.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Name of the emitting service
    #[serde(rename = "service")]
    pub service_name: String,
    /// Logical component (type name) that logged the line
    #[serde(rename = "clazz")]
    pub class_name: String,
    /// Operation within the component
    #[serde(rename = "method")]
    pub method_name: String,
    /// Identity of the producing thread
    #[serde(rename = "threadId")]
    pub thread_id: u64,
    #[serde(rename = "logLevel")]
    pub level: LogLevel,
    #[serde(rename = "time", serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    /// Already-interpolated message
    pub message: String,
}

impl LogEvent {
    /// Event stamped with the calling thread and the current local time
    pub fn new(
        service_name: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
            thread_id: current_thread_id(),
            level,
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

/// A request/response audit record
///
/// Serializes as `{date, api, refNo, status, request, response}`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    #[serde(rename = "date", serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    /// Request path the audit record belongs to
    #[serde(rename = "api")]
    pub endpoint_path: String,
    /// Business reference number extracted at ingress, if any
    #[serde(rename = "refNo")]
    pub ref_no: Option<String>,
    #[serde(rename = "status")]
    pub http_status: u16,
    /// Serialized request body
    pub request: String,
    /// Serialized response body
    pub response: String,
}

/// Which envelope an event produces, and which broker topic it is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Log,
    Audit,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => f.write_str("log"),
            Self::Audit => f.write_str("audit"),
        }
    }
}

/// Anything the ordered sink can emit
#[derive(Debug, Clone)]
pub enum Event {
    Log(LogEvent),
    Audit(AuditEvent),
}

impl Event {
    /// Level the envelope is written at; audit records are informational
    pub fn level(&self) -> LogLevel {
        match self {
            Event::Log(event) => event.level,
            Event::Audit(_) => LogLevel::Info,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Log(_) => EventKind::Log,
            Event::Audit(_) => EventKind::Audit,
        }
    }
}

impl From<LogEvent> for Event {
    fn from(event: LogEvent) -> Self {
        Event::Log(event)
    }
}

impl From<AuditEvent> for Event {
    fn from(event: AuditEvent) -> Self {
        Event::Audit(event)
    }
}

/// Serializes events into their canonical envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFormatter {
    pretty: bool,
}

impl EventFormatter {
    /// Compact formatter: one envelope per line
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable multi-line pretty printing
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Serialize an event into its envelope
    pub fn format(&self, event: &Event) -> Result<String> {
        match event {
            Event::Log(event) => self.to_json(event),
            Event::Audit(event) => self.to_json(event),
        }
    }

    /// Degraded line written in place of an event that could not be produced
    pub fn placeholder(&self, reason: &str) -> String {
        serde_json::json!({ "formatError": reason }).to_string()
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

/// Render a timestamp with [`TIMESTAMP_FORMAT`]
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Local>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}

/// Stable numeric identity of the calling thread
///
/// Ids are handed out sequentially the first time a thread asks for one.
pub fn current_thread_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

/// One argument of a log message
#[derive(Debug, Clone, PartialEq)]
pub enum LogArg {
    /// Interpolates as an empty string
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    /// Flattened to a comma-joined string
    Seq(Vec<LogArg>),
    Json(serde_json::Value),
}

impl LogArg {
    /// Argument from any `Display` value
    pub fn display(value: &impl fmt::Display) -> Self {
        LogArg::Str(value.to_string())
    }

    /// Argument from a serializable value
    ///
    /// Values `serde_json` cannot represent fall back to their `Debug` form.
    pub fn json<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => LogArg::Json(json),
            Err(_) => LogArg::Str(format!("{value:?}")),
        }
    }

    /// String form used by `%s`
    pub fn render(&self) -> String {
        match self {
            LogArg::Null => String::new(),
            LogArg::Bool(value) => value.to_string(),
            LogArg::Int(value) => value.to_string(),
            LogArg::UInt(value) => value.to_string(),
            LogArg::Float(value) => render_float(*value),
            LogArg::Str(value) => value.clone(),
            LogArg::Seq(items) => items
                .iter()
                .map(LogArg::render)
                .collect::<Vec<_>>()
                .join(", "),
            LogArg::Json(serde_json::Value::Null) => String::new(),
            LogArg::Json(serde_json::Value::String(value)) => value.clone(),
            LogArg::Json(value) => value.to_string(),
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            LogArg::Int(value) => Some(*value as i128),
            LogArg::UInt(value) => Some(*value as i128),
            LogArg::Json(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from)),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            LogArg::Float(value) => Some(*value),
            LogArg::Int(value) => Some(*value as f64),
            LogArg::UInt(value) => Some(*value as f64),
            LogArg::Json(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            LogArg::Null | LogArg::Json(serde_json::Value::Null) => false,
            LogArg::Bool(value) | LogArg::Json(serde_json::Value::Bool(value)) => *value,
            _ => true,
        }
    }

    fn as_char(&self) -> Option<char> {
        match self {
            LogArg::Str(value) if value.chars().count() == 1 => value.chars().next(),
            LogArg::Int(value) => u32::try_from(*value).ok().and_then(char::from_u32),
            LogArg::UInt(value) => u32::try_from(*value).ok().and_then(char::from_u32),
            _ => None,
        }
    }
}

fn render_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        format!("{value:?}")
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($ty:ty),+) => {
        $(
            impl From<$ty> for LogArg {
                fn from(value: $ty) -> Self {
                    LogArg::$variant(value as $target)
                }
            }
        )+
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64, u8, u16, u32, u64, usize);

impl From<f32> for LogArg {
    fn from(value: f32) -> Self {
        LogArg::Float(f64::from(value))
    }
}

impl From<f64> for LogArg {
    fn from(value: f64) -> Self {
        LogArg::Float(value)
    }
}

impl From<bool> for LogArg {
    fn from(value: bool) -> Self {
        LogArg::Bool(value)
    }
}

impl From<char> for LogArg {
    fn from(value: char) -> Self {
        LogArg::Str(value.to_string())
    }
}

impl From<&str> for LogArg {
    fn from(value: &str) -> Self {
        LogArg::Str(value.to_string())
    }
}

impl From<String> for LogArg {
    fn from(value: String) -> Self {
        LogArg::Str(value)
    }
}

impl From<&String> for LogArg {
    fn from(value: &String) -> Self {
        LogArg::Str(value.clone())
    }
}

impl From<serde_json::Value> for LogArg {
    fn from(value: serde_json::Value) -> Self {
        LogArg::Json(value)
    }
}

impl<T: Into<LogArg>> From<Option<T>> for LogArg {
    fn from(value: Option<T>) -> Self {
        value.map_or(LogArg::Null, Into::into)
    }
}

impl<T: Into<LogArg>> From<Vec<T>> for LogArg {
    fn from(values: Vec<T>) -> Self {
        LogArg::Seq(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<LogArg>> From<&[T]> for LogArg {
    fn from(values: &[T]) -> Self {
        LogArg::Seq(values.iter().cloned().map(Into::into).collect())
    }
}

/// Build a `Vec<LogArg>` from heterogeneous values
///
/// ```rust
/// use audit_relay::log_args;
///
/// let args = log_args!["orders", 3, None::<String>];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! log_args {
    () => {
        ::std::vec::Vec::<$crate::formatter::LogArg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::formatter::LogArg::from($arg)),+]
    };
}

/// Largest width or precision honoured; bigger values are clamped
const MAX_FIELD_WIDTH: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
}

/// Interpolate `args` into a printf-style `template`
///
/// Supports `%s %S %d %x %X %f %e %E %b %B %c %n %%`, an optional width, the `-`,
/// `0` and `+` flags, and a precision (`%.2f`, `%.3s`). Width and precision
/// are capped at 4096.
pub fn interpolate(template: &str, args: &[LogArg]) -> String {
    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut next_arg = 0;
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut flags = Flags::default();
        while let Some(&(_, flag)) = chars.peek() {
            match flag {
                '-' => flags.left = true,
                '0' => flags.zero = true,
                '+' => flags.plus = true,
                ' ' | '#' | ',' => {}
                _ => break,
            }
            chars.next();
        }
        let width = take_number(&mut chars);
        let precision = if matches!(chars.peek(), Some(&(_, '.'))) {
            chars.next();
            Some(take_number(&mut chars).unwrap_or(0))
        } else {
            None
        };

        let Some((end, conversion)) = chars.next() else {
            out.push_str(&template[start..]);
            break;
        };
        let spec = &template[start..end + conversion.len_utf8()];

        match conversion {
            '%' => out.push('%'),
            'n' => out.push('\n'),
            's' | 'S' | 'd' | 'x' | 'X' | 'f' | 'e' | 'E' | 'b' | 'B' | 'c' => match args.get(next_arg) {
                Some(arg) => {
                    next_arg += 1;
                    let (text, numeric) = convert(arg, conversion, precision, flags.plus);
                    pad_into(&mut out, &text, width, flags, numeric);
                }
                None => out.push_str(spec),
            },
            _ => out.push_str(spec),
        }
    }

    out
}

fn take_number(chars: &mut Peekable<CharIndices<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(digit) = c.to_digit(10) else {
            break;
        };
        value = Some(
            value
                .unwrap_or(0)
                .saturating_mul(10)
                .saturating_add(digit as usize),
        );
        chars.next();
    }
    value.map(|v| v.min(MAX_FIELD_WIDTH))
}

/// Convert one argument; the flag reports whether zero padding applies
fn convert(arg: &LogArg, conversion: char, precision: Option<usize>, plus: bool) -> (String, bool) {
    match conversion {
        's' | 'S' => {
            let mut text = arg.render();
            if let Some(max) = precision {
                text = text.chars().take(max).collect();
            }
            if conversion == 'S' {
                text = text.to_uppercase();
            }
            (text, false)
        }
        'd' => match arg.as_integer() {
            Some(n) if plus && n >= 0 => (format!("+{n}"), true),
            Some(n) => (n.to_string(), true),
            None => (arg.render(), false),
        },
        'x' | 'X' => {
            let hex = match arg {
                LogArg::Int(n) => Some(format!("{n:x}")),
                LogArg::UInt(n) => Some(format!("{n:x}")),
                other => other.as_integer().map(|n| format!("{n:x}")),
            };
            match hex {
                Some(hex) if conversion == 'X' => (hex.to_uppercase(), true),
                Some(hex) => (hex, true),
                None => (arg.render(), false),
            }
        }
        'f' => match arg.as_float() {
            Some(value) if !value.is_finite() => (render_float(value), false),
            Some(value) => {
                let digits = precision.unwrap_or(6);
                if plus && value >= 0.0 {
                    (format!("+{value:.digits$}"), true)
                } else {
                    (format!("{value:.digits$}"), true)
                }
            }
            None => (arg.render(), false),
        },
        'e' | 'E' => match arg.as_float() {
            Some(value) if !value.is_finite() => (render_float(value), false),
            Some(value) => {
                let mut text = scientific(value, precision.unwrap_or(6));
                if plus && value >= 0.0 {
                    text.insert(0, '+');
                }
                if conversion == 'E' {
                    text = text.to_uppercase();
                }
                (text, true)
            }
            None => (arg.render(), false),
        },
        'b' | 'B' => {
            let text = arg.as_bool().to_string();
            if conversion == 'B' {
                (text.to_uppercase(), false)
            } else {
                (text, false)
            }
        }
        'c' => match arg.as_char() {
            Some(c) => (c.to_string(), false),
            None => (arg.render(), false),
        },
        _ => (arg.render(), false),
    }
}

/// `1.234500e+01` rather than Rust's `1.2345e1`
fn scientific(value: f64, digits: usize) -> String {
    let raw = format!("{value:.digits$e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => raw,
    }
}

fn pad_into(out: &mut String, text: &str, width: Option<usize>, flags: Flags, numeric: bool) {
    let len = text.chars().count();
    let Some(width) = width.filter(|w| *w > len) else {
        out.push_str(text);
        return;
    };
    let fill = width - len;

    if flags.left {
        out.push_str(text);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if flags.zero && numeric {
        let (sign, digits) = match text.chars().next() {
            Some(c @ ('-' | '+')) => (Some(c), &text[1..]),
            _ => (None, text),
        };
        if let Some(sign) = sign {
            out.push(sign);
        }
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashMap;

    fn fixed_time() -> DateTime<Local> {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(14, 7, 9, 42)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn log_event(message: &str) -> LogEvent {
        LogEvent {
            service_name: "orders".to_string(),
            class_name: "OrderHandler".to_string(),
            method_name: "create".to_string(),
            thread_id: 7,
            level: LogLevel::Info,
            timestamp: fixed_time(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(&fixed_time()), "2024-Mar-05 02:07:09.042");
    }

    #[test]
    fn test_log_envelope_field_order() {
        let line = EventFormatter::new()
            .format(&Event::Log(log_event("hello")))
            .unwrap();

        assert_eq!(
            line,
            r#"{"service":"orders","clazz":"OrderHandler","method":"create","threadId":7,"logLevel":"info","time":"2024-Mar-05 02:07:09.042","message":"hello"}"#
        );
    }

    #[test]
    fn test_audit_envelope_serializes_null_ref_no() {
        let event = AuditEvent {
            timestamp: fixed_time(),
            endpoint_path: "/api/v1/payments".to_string(),
            ref_no: None,
            http_status: 201,
            request: r#"{"amount":10}"#.to_string(),
            response: "null".to_string(),
        };

        let line = EventFormatter::new().format(&Event::Audit(event)).unwrap();

        assert_eq!(
            line,
            r#"{"date":"2024-Mar-05 02:07:09.042","api":"/api/v1/payments","refNo":null,"status":201,"request":"{\"amount\":10}","response":"null"}"#
        );
    }

    #[test]
    fn test_no_html_escaping() {
        let line = EventFormatter::new()
            .format(&Event::Log(log_event("<b>a & b</b> 'quoted'")))
            .unwrap();
        assert!(line.contains("<b>a & b</b> 'quoted'"));
    }

    #[test]
    fn test_pretty_output_spans_lines() {
        let line = EventFormatter::new()
            .with_pretty(true)
            .format(&Event::Log(log_event("hello")))
            .unwrap();
        assert!(line.contains('\n'));
        assert!(line.contains("\"clazz\": \"OrderHandler\""));
    }

    #[test]
    fn test_placeholder_is_valid_json() {
        let line = EventFormatter::new().placeholder("builder panicked: \"boom\"");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["formatError"], "builder panicked: \"boom\"");
    }

    #[test]
    fn test_event_level_and_kind() {
        let mut event = log_event("x");
        event.level = LogLevel::Error;
        let event = Event::from(event);
        assert_eq!(event.level(), LogLevel::Error);
        assert_eq!(event.kind(), EventKind::Log);
    }

    #[test]
    fn test_interpolate_basic_conversions() {
        let args = log_args!["alice", 42, 2.5];
        assert_eq!(
            interpolate("user=%s count=%d ratio=%.2f", &args),
            "user=alice count=42 ratio=2.50"
        );
    }

    #[test]
    fn test_interpolate_null_is_empty() {
        let args = log_args![None::<String>, "x"];
        assert_eq!(interpolate("[%s][%s]", &args), "[][x]");
    }

    #[test]
    fn test_interpolate_flattens_sequences() {
        let args = log_args![vec!["a", "b", "c"]];
        assert_eq!(interpolate("items: %s", &args), "items: a, b, c");

        let nested = vec![LogArg::from(1), LogArg::from(vec![2, 3]), LogArg::Null];
        assert_eq!(interpolate("%s", &[LogArg::Seq(nested)]), "1, 2, 3, ");
    }

    #[test]
    fn test_interpolate_missing_argument_is_literal() {
        let args = log_args!["only"];
        assert_eq!(interpolate("%s and %s and %d", &args), "only and %s and %d");
    }

    #[test]
    fn test_interpolate_unknown_conversion_is_literal() {
        assert_eq!(interpolate("%q %", &log_args![1]), "%q %");
    }

    #[test]
    fn test_interpolate_type_mismatch_falls_back_to_string() {
        let args = log_args!["abc", "xyz"];
        assert_eq!(interpolate("%d %f", &args), "abc xyz");
    }

    #[test]
    fn test_interpolate_special_floats() {
        let args = log_args![f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        assert_eq!(interpolate("%f %s %.1f", &args), "NaN Infinity -Infinity");
    }

    #[test]
    fn test_interpolate_width_and_flags() {
        assert_eq!(interpolate("%5d|", &log_args![42]), "   42|");
        assert_eq!(interpolate("%-5s|", &log_args!["ab"]), "ab   |");
        assert_eq!(interpolate("%05d", &log_args![-42]), "-0042");
        assert_eq!(interpolate("%+d", &log_args![7]), "+7");
        assert_eq!(interpolate("%.3s", &log_args!["truncate"]), "tru");
    }

    #[test]
    fn test_interpolate_clamps_huge_width_and_precision() {
        let padded = interpolate("%99999999999999999999s", &log_args!["x"]);
        assert_eq!(padded.len(), MAX_FIELD_WIDTH);
        assert!(padded.ends_with('x'));

        let precise = interpolate("%.99999999999f", &log_args![1.5]);
        assert_eq!(precise.len(), 2 + MAX_FIELD_WIDTH);
        assert!(precise.starts_with("1.5000"));
    }

    #[test]
    fn test_interpolate_misc_conversions() {
        assert_eq!(interpolate("%x %X", &log_args![255, 255u32]), "ff FF");
        assert_eq!(interpolate("%b %b", &log_args![None::<i32>, "x"]), "false true");
        assert_eq!(interpolate("%c", &log_args!['z']), "z");
        assert_eq!(interpolate("100%% done%n", &log_args![]), "100% done\n");
        assert_eq!(interpolate("%S", &log_args!["loud"]), "LOUD");
        assert_eq!(interpolate("%.2e", &log_args![1234.5]), "1.23e+03");
        assert_eq!(interpolate("%E", &log_args![0.00042]), "4.200000E-04");
    }

    #[test]
    fn test_json_argument_rendering() {
        let args = log_args![
            serde_json::json!({"a": 1}),
            serde_json::json!("plain"),
            serde_json::Value::Null
        ];
        assert_eq!(interpolate("%s %s [%s]", &args), r#"{"a":1} plain []"#);
    }

    #[test]
    fn test_unserializable_argument_degrades_to_debug() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple-keyed");

        let arg = LogArg::json(&map);

        match &arg {
            LogArg::Str(text) => assert!(text.contains("(1, 2)")),
            other => panic!("expected string fallback, got {other:?}"),
        }
        assert!(interpolate("map=%s", &[arg]).starts_with("map={"));
    }

    #[test]
    fn test_display_argument() {
        let addr: std::net::SocketAddr = "127.0.0.1:4222".parse().unwrap();
        assert_eq!(
            interpolate("peer %s", &[LogArg::display(&addr)]),
            "peer 127.0.0.1:4222"
        );
    }

    #[test]
    fn test_thread_ids_are_stable_and_distinct() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());

        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, other);
    }
}
