//! Wire grammar constants and line classification.
//!
//! Every line on the wire is one of three things:
//!
//! ```text
//! notifytextmessage targetmode=1 msg=hi     <- event, routed to the signal bus
//! cid=1 channel_name=Lobby|cid=2 ...        <- reply data for the in-flight command
//! error id=0 msg=ok                         <- status line, ends the command cycle
//! ```

/// Terminator of every line sent to the server.
pub const LINE_SEPARATOR: &str = "\n";

/// Separates repeated records on one line.
pub const LIST_SEPARATOR: char = '|';

/// Separates `key=value` cells within a record.
pub const CELL_SEPARATOR: char = ' ';

/// Separates a key from its value (first occurrence only).
pub const PAIR_SEPARATOR: char = '=';

/// First cell of a status line.
pub const STATUS_PREFIX: &str = "error";

/// Prefix of every unsolicited event line.
pub const EVENT_PREFIX: &str = "notify";

/// Status code of a successful command.
pub const STATUS_OK: u32 = 0;

/// Chunk size for line reads and line writes.
pub const CHUNK_SIZE: usize = 4096;

/// Command that ends a session politely.
pub const QUIT_COMMAND: &str = "quit";

/// A received line, classified by its leading cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `error id=.. msg=..` terminating a command cycle.
    Status(&'a str),
    /// `notify...` event, never part of a reply.
    Event(&'a str),
    /// Reply data (possibly empty).
    Data(&'a str),
}

/// Classify one received line.
///
/// Surrounding whitespace (the server ends lines with `\n\r`) is ignored.
pub fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    let verb = line.split(CELL_SEPARATOR).next().unwrap_or_default();

    if verb == STATUS_PREFIX {
        Line::Status(line)
    } else if verb.starts_with(EVENT_PREFIX) {
        Line::Event(line)
    } else {
        Line::Data(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify("error id=0 msg=ok"),
            Line::Status("error id=0 msg=ok")
        );
        assert_eq!(classify("error"), Line::Status("error"));
    }

    #[test]
    fn test_classify_event() {
        assert_eq!(
            classify("notifytextmessage msg=hi"),
            Line::Event("notifytextmessage msg=hi")
        );
        assert_eq!(classify("notifycliententerview"), Line::Event("notifycliententerview"));
    }

    #[test]
    fn test_classify_data() {
        assert_eq!(classify("cid=1 name=Lobby"), Line::Data("cid=1 name=Lobby"));
        // a field merely named like the prefix is still data
        assert_eq!(classify("errors=3"), Line::Data("errors=3"));
        assert_eq!(classify(""), Line::Data(""));
    }

    #[test]
    fn test_classify_trims_carriage_return() {
        assert_eq!(classify("\rerror id=0 msg=ok"), Line::Status("error id=0 msg=ok"));
    }
}
