//! Command serialization.
//!
//! Builds the single request line for a command. Only parameter values are
//! escaped; the verb, keys and option flags go out verbatim.
//!
//! # Example
//!
//! ```
//! use serverquery_client::protocol::Command;
//!
//! let cmd = Command::new("clientkick")
//!     .list("clid", [5, 7])
//!     .arg("reasonid", 5)
//!     .arg("reasonmsg", "go away");
//!
//! assert_eq!(cmd.to_line(), r"clientkick clid=5|clid=7 reasonid=5 reasonmsg=go\saway");
//! ```

use std::fmt;

use super::escape::escape;
use super::grammar::{CELL_SEPARATOR, LIST_SEPARATOR, PAIR_SEPARATOR};

/// One parameter of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `key=value`
    Pair(String, String),
    /// `key=v1|key=v2|...`
    List(String, Vec<String>),
    /// Bare option such as `-virtual`.
    Flag(String),
}

impl Param {
    fn write_to(&self, out: &mut String) {
        match self {
            Param::Pair(key, value) => write_pair(out, key, value),
            Param::List(key, values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(LIST_SEPARATOR);
                    }
                    write_pair(out, key, value);
                }
            }
            Param::Flag(flag) => out.push_str(flag),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Param::List(_, values) => values.is_empty(),
            Param::Flag(flag) => flag.is_empty(),
            Param::Pair(..) => false,
        }
    }
}

fn write_pair(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(PAIR_SEPARATOR);
    out.push_str(&escape(value));
}

/// Serialize a verb and its parameters into one request line (no terminator).
pub fn prepare(verb: &str, params: &[Param]) -> String {
    let mut line = String::from(verb.trim());

    for param in params.iter().filter(|p| !p.is_empty()) {
        line.push(CELL_SEPARATOR);
        param.write_to(&mut line);
    }

    line
}

/// Fluent builder for a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    params: Vec<Param>,
}

impl Command {
    /// Start a command with the given verb.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            params: Vec::new(),
        }
    }

    /// Add a `key=value` parameter.
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params
            .push(Param::Pair(key.into(), value.to_string()));
        self
    }

    /// Add a `key=value` parameter only when `value` is present.
    pub fn arg_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.arg(key, value),
            None => self,
        }
    }

    /// Add repeated sub-records for the same key.
    pub fn list<I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.params.push(Param::List(key.into(), values));
        self
    }

    /// Add a bare option, e.g. `-uid`.
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.params.push(Param::Flag(flag.into()));
        self
    }

    /// The command verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The parameters added so far.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Serialize to a request line.
    pub fn to_line(&self) -> String {
        prepare(&self.verb, &self.params)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}
