//! Records, events and status lines.
//!
//! A line is split on the list separator into records, each record on the
//! cell separator into cells, and each cell on the first pair separator into
//! a key and an (unescaped) value. Field order is preserved.
//!
//! # Example
//!
//! ```
//! use serverquery_client::protocol::parse_records;
//!
//! let records = parse_records(r"clid=1 client_nickname=Ann|clid=2 client_nickname=Bo\sB");
//!
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].get("clid"), Some("1"));
//! assert_eq!(records[1].get("client_nickname"), Some("Bo B"));
//! ```

use std::str::FromStr;

use super::escape::unescape;
use super::grammar::{CELL_SEPARATOR, LIST_SEPARATOR, PAIR_SEPARATOR, STATUS_PREFIX};
use crate::error::{QueryError, Result};

static EMPTY_RECORD: Record = Record { fields: Vec::new() };

/// One set of `key=value` fields, in the order they were received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Cells without a value (e.g. flags) carry an empty value.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a field named `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Parse the value of `key` into `T`.
    ///
    /// Returns `None` when the field is missing or does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Iterate over `(key, value)` pairs in received order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names in received order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Parse one record (no list separators).
pub fn parse_record(segment: &str) -> Record {
    segment
        .split(CELL_SEPARATOR)
        .filter(|cell| !cell.is_empty())
        .map(|cell| match cell.split_once(PAIR_SEPARATOR) {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (cell.to_string(), String::new()),
        })
        .collect()
}

/// Parse a data line into its records.
pub fn parse_records(line: &str) -> Vec<Record> {
    line.split(LIST_SEPARATOR)
        .map(parse_record)
        .filter(|record| !record.is_empty())
        .collect()
}

/// An unsolicited notification pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    name: String,
    records: Vec<Record>,
}

impl Event {
    /// Event name, e.g. `notifytextmessage`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All records carried by the event.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The first record (empty if the event carried no fields).
    pub fn payload(&self) -> &Record {
        self.records.first().unwrap_or(&EMPTY_RECORD)
    }

    /// Shortcut for `payload().get(key)`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.payload().get(key)
    }
}

/// Parse an event line (`notify<name> key=value ...`).
pub fn parse_event(line: &str) -> Event {
    let line = line.trim();
    let (name, rest) = line.split_once(CELL_SEPARATOR).unwrap_or((line, ""));

    Event {
        name: name.to_string(),
        records: parse_records(rest),
    }
}

/// Parsed status line terminating a command cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: u32,
    message: String,
    record: Record,
}

impl Status {
    /// Build a status directly.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        let record = [("id", code.to_string()), ("msg", message.clone())]
            .into_iter()
            .collect();
        Self {
            code,
            message,
            record,
        }
    }

    /// Numeric status code (`0` = success).
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Unescaped status message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// All status fields, including extras like `extra_msg` or `failed_permid`.
    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// Parse a status line (`error id=<code> msg=<message> ...`).
///
/// Status messages additionally decode `+` as a space.
pub fn parse_status(line: &str) -> Result<Status> {
    let line = line.trim();
    let rest = line
        .strip_prefix(STATUS_PREFIX)
        .ok_or_else(|| QueryError::Protocol(format!("not a status line: {}", line)))?;

    let record = parse_record(rest);

    let code = record
        .get("id")
        .ok_or_else(|| QueryError::Protocol(format!("status line without id: {}", line)))?
        .parse::<u32>()
        .map_err(|e| QueryError::Protocol(format!("invalid status id in '{}': {}", line, e)))?;

    let message = record.get("msg").unwrap_or_default().replace('+', " ");

    Ok(Status {
        code,
        message,
        record,
    })
}
