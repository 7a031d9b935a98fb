//! Parsed result of one command cycle.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{QueryError, Result};
use crate::protocol::{Record, Status, STATUS_OK};

/// Immutable result of one command: data records, status line, and timing.
///
/// Event lines that arrived while the command was in flight are never part
/// of a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    command: String,
    records: Vec<Record>,
    status: Status,
    elapsed: Duration,
}

impl Reply {
    pub(crate) fn new(
        command: impl Into<String>,
        records: Vec<Record>,
        status: Status,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            records,
            status,
            elapsed,
        }
    }

    /// The request line this reply answers.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// All records, in received order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Take ownership of the records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// The first record, if any.
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the reply carried no data.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Status code (`0` = success).
    pub fn code(&self) -> u32 {
        self.status.code()
    }

    /// Unescaped status message.
    pub fn message(&self) -> &str {
        self.status.message()
    }

    /// The full status line, including fields like `extra_msg`.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.status.code() == STATUS_OK
    }

    /// Wall time between sending the command and receiving its status line.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Values of `key` across all records that have it.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.records.iter().filter_map(|r| r.get(key)).collect()
    }

    /// Records keyed by the value of their `ident` field.
    ///
    /// Records without the field are skipped; on duplicate values the last
    /// record wins.
    pub fn to_assoc(&self, ident: &str) -> HashMap<&str, &Record> {
        self.records
            .iter()
            .filter_map(|r| r.get(ident).map(|key| (key, r)))
            .collect()
    }

    /// Turn a non-zero status into [`QueryError::Command`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(QueryError::Command {
                code: self.code(),
                message: self.message().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_records, parse_status};

    fn reply(data: &str, status: &str) -> Reply {
        Reply::new(
            "channellist",
            parse_records(data),
            parse_status(status).unwrap(),
            Duration::from_millis(3),
        )
    }

    #[test]
    fn test_accessors() {
        let reply = reply("cid=1 channel_name=Lobby", "error id=0 msg=ok");

        assert_eq!(reply.command(), "channellist");
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.first().unwrap().get("channel_name"), Some("Lobby"));
        assert_eq!(reply.code(), 0);
        assert_eq!(reply.message(), "ok");
        assert!(reply.is_ok());
        assert_eq!(reply.elapsed(), Duration::from_millis(3));
    }

    #[test]
    fn test_values_and_assoc() {
        let reply = reply(
            r"cid=1 channel_name=Lobby|cid=2 channel_name=AFK|channel_name=Orphan",
            "error id=0 msg=ok",
        );

        assert_eq!(reply.values("cid"), vec!["1", "2"]);

        let by_cid = reply.to_assoc("cid");
        assert_eq!(by_cid.len(), 2);
        assert_eq!(by_cid["2"].get("channel_name"), Some("AFK"));
    }

    #[test]
    fn test_into_result() {
        let ok = reply("", "error id=0 msg=ok");
        assert!(ok.is_empty());
        assert!(ok.into_result().is_ok());

        let failed = reply("", "error id=1281 msg=invalid+channel");
        assert!(!failed.is_ok());
        let err = failed.into_result().unwrap_err();
        assert!(matches!(
            err,
            QueryError::Command { code: 1281, ref message } if message == "invalid channel"
        ));
    }
}
