//! Signal handlers and their argument kinds.
//!
//! A [`Handler`] wraps a callback together with the kind of arguments it
//! accepts. Signal names imply the arguments they carry, so the bus can reject
//! a handler at registration time instead of failing on the first emission.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{QueryError, Result};
use crate::protocol::{Event, EVENT_PREFIX};
use crate::reply::Reply;

/// Result type for handler callbacks.
pub type HandlerResult = Result<()>;

/// Arguments passed along with a signal.
#[derive(Debug, Clone)]
pub enum SignalArgs {
    /// No arguments (`<kind>Connected`, `<kind>Disconnected`).
    None,
    /// Raw bytes (`<kind>DataRead`, `<kind>DataSend`).
    Bytes(Bytes),
    /// Cumulative wait time (`<kind>WaitTimeout`).
    Elapsed(Duration),
    /// Command text (`<kind>CommandStarted`).
    Command(String),
    /// Completed reply (`<kind>CommandFinished`).
    Reply(Arc<Reply>),
    /// Server notification (`notify*`).
    Event(Arc<Event>),
}

impl SignalArgs {
    /// The kind of these arguments.
    pub fn kind(&self) -> ArgsKind {
        match self {
            SignalArgs::None => ArgsKind::None,
            SignalArgs::Bytes(_) => ArgsKind::Bytes,
            SignalArgs::Elapsed(_) => ArgsKind::Elapsed,
            SignalArgs::Command(_) => ArgsKind::Command,
            SignalArgs::Reply(_) => ArgsKind::Reply,
            SignalArgs::Event(_) => ArgsKind::Event,
        }
    }
}

/// Shape of the arguments a signal carries or a handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsKind {
    /// No arguments.
    None,
    /// Raw bytes.
    Bytes,
    /// A duration.
    Elapsed,
    /// Command text.
    Command,
    /// A reply.
    Reply,
    /// An event.
    Event,
    /// Anything (handlers built with [`Handler::new`], or unknown signals).
    Any,
}

impl ArgsKind {
    /// Expected arguments for a (lowercased) signal name.
    pub fn for_signal(name: &str) -> ArgsKind {
        let name = name.to_lowercase();

        // server events may end in any suffix below
        if name.starts_with(EVENT_PREFIX) {
            ArgsKind::Event
        } else if name.ends_with("connected") {
            ArgsKind::None
        } else if name.ends_with("dataread") || name.ends_with("datasend") {
            ArgsKind::Bytes
        } else if name.ends_with("waittimeout") {
            ArgsKind::Elapsed
        } else if name.ends_with("commandstarted") {
            ArgsKind::Command
        } else if name.ends_with("commandfinished") {
            ArgsKind::Reply
        } else {
            ArgsKind::Any
        }
    }

    /// Whether a handler accepting `self` can be bound to a signal carrying `expected`.
    pub fn accepts(self, expected: ArgsKind) -> bool {
        self == ArgsKind::Any || expected == ArgsKind::Any || self == expected
    }

    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ArgsKind::None => "no",
            ArgsKind::Bytes => "bytes",
            ArgsKind::Elapsed => "elapsed-time",
            ArgsKind::Command => "command",
            ArgsKind::Reply => "reply",
            ArgsKind::Event => "event",
            ArgsKind::Any => "any",
        }
    }
}

type Callback = Arc<dyn Fn(&SignalArgs) -> HandlerResult + Send + Sync>;

/// A validated signal callback.
///
/// Cloning a handler shares the callback; clones compare equal.
#[derive(Clone)]
pub struct Handler {
    accepts: ArgsKind,
    callback: Callback,
}

impl Handler {
    /// Handler accepting any arguments.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SignalArgs) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            accepts: ArgsKind::Any,
            callback: Arc::new(f),
        }
    }

    /// Handler for argument-less lifecycle signals.
    pub fn on_unit<F>(f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::None, move |args| match args {
            SignalArgs::None => Some(f()),
            _ => None,
        })
    }

    /// Handler for `DataRead` / `DataSend`.
    pub fn on_bytes<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::Bytes, move |args| match args {
            SignalArgs::Bytes(data) => Some(f(data)),
            _ => None,
        })
    }

    /// Handler for `WaitTimeout`.
    pub fn on_elapsed<F>(f: F) -> Self
    where
        F: Fn(Duration) -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::Elapsed, move |args| match args {
            SignalArgs::Elapsed(elapsed) => Some(f(*elapsed)),
            _ => None,
        })
    }

    /// Handler for `CommandStarted`.
    pub fn on_command<F>(f: F) -> Self
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::Command, move |args| match args {
            SignalArgs::Command(text) => Some(f(text)),
            _ => None,
        })
    }

    /// Handler for `CommandFinished`.
    pub fn on_reply<F>(f: F) -> Self
    where
        F: Fn(&Reply) -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::Reply, move |args| match args {
            SignalArgs::Reply(reply) => Some(f(reply)),
            _ => None,
        })
    }

    /// Handler for server notifications.
    pub fn on_event<F>(f: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self::typed(ArgsKind::Event, move |args| match args {
            SignalArgs::Event(event) => Some(f(event)),
            _ => None,
        })
    }

    fn typed<F>(accepts: ArgsKind, f: F) -> Self
    where
        F: Fn(&SignalArgs) -> Option<HandlerResult> + Send + Sync + 'static,
    {
        Self {
            accepts,
            callback: Arc::new(move |args: &SignalArgs| {
                f(args).unwrap_or_else(|| {
                    Err(QueryError::Handler(format!(
                        "handler accepts {} arguments, got {}",
                        accepts.as_str(),
                        args.kind().as_str()
                    )))
                })
            }),
        }
    }

    /// Argument kind this handler accepts.
    pub fn accepts(&self) -> ArgsKind {
        self.accepts
    }

    /// Invoke the callback.
    pub fn call(&self, args: &SignalArgs) -> HandlerResult {
        (self.callback)(args)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("accepts", &self.accepts)
            .finish_non_exhaustive()
    }
}
