//! Protocol module - line grammar, escaping, and parsing.
//!
//! This module implements the text protocol spoken over the transport:
//! - Grammar constants and line classification
//! - Escape table shared by serialization and parsing
//! - Command serialization ([`Command`], [`prepare`])
//! - Record, event, and status-line parsing

mod command;
mod escape;
mod grammar;
mod record;

pub use command::{prepare, Command, Param};
pub use escape::{escape, unescape, ESCAPE_TABLE};
pub use grammar::{
    classify, Line, CELL_SEPARATOR, CHUNK_SIZE, EVENT_PREFIX, LINE_SEPARATOR, LIST_SEPARATOR,
    PAIR_SEPARATOR, QUIT_COMMAND, STATUS_OK, STATUS_PREFIX,
};
pub use record::{parse_event, parse_record, parse_records, parse_status, Event, Record, Status};
