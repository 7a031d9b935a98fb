//! ServerQuery protocol engine.
//!
//! The [`ServerQuery`] owns one [`Transport`] and drives the command cycle:
//! 1. Send the command line
//! 2. Read lines until the `error id=.. msg=..` status line
//! 3. Dispatch `notify*` lines through the signal bus as they arrive
//! 4. Collect everything else as reply records
//!
//! At most one command is in flight per connection. Concurrent callers are
//! queued on an async mutex and served in order.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serverquery_client::config::ConnectionConfig;
//! use serverquery_client::protocol::Command;
//! use serverquery_client::signal::{Handler, SignalBus};
//! use serverquery_client::ServerQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let signals = Arc::new(SignalBus::new());
//!     signals.subscribe("notifyTextMessage", Handler::on_event(|event| {
//!         println!("{:?}", event.get("msg"));
//!         Ok(())
//!     }))?;
//!
//!     let query = ServerQuery::builder()
//!         .config(ConnectionConfig::builder().host("127.0.0.1").port(10011).build()?)
//!         .signals(signals)
//!         .connect()
//!         .await?;
//!
//!     query.run(&Command::new("use").arg("sid", 1)).await?;
//!     let channels = query.execute("channellist", &[]).await?;
//!     for channel in channels.records() {
//!         println!("{:?}", channel.get("channel_name"));
//!     }
//!
//!     query.close().await;
//!     Ok(())
//! }
//! ```

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::error::{QueryError, Result};
use crate::protocol::{
    classify, parse_event, parse_records, parse_status, prepare, Command, Event, Line, Param,
    LINE_SEPARATOR, QUIT_COMMAND,
};
use crate::reply::Reply;
use crate::signal::{names, SignalArgs, SignalBus};
use crate::transport::{AbortHandle, QueryStream, Transport};

/// Signal prefix for engine-owned transports (`serverqueryDataRead`, ...).
pub const ADAPTER_KIND: &str = "serverquery";

/// Builder for a [`ServerQuery`].
#[derive(Default)]
pub struct ServerQueryBuilder {
    config: Option<ConnectionConfig>,
    signals: Option<Arc<SignalBus>>,
}

impl ServerQueryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection settings (required).
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Report into an existing signal bus.
    ///
    /// Default: a fresh bus owned by the engine.
    pub fn signals(mut self, signals: Arc<SignalBus>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Build an unconnected engine. The connection opens on first use.
    pub fn build(self) -> Result<ServerQuery> {
        let config = self
            .config
            .ok_or_else(|| QueryError::Config("connection config is required".into()))?;
        let signals = self.signals.unwrap_or_default();
        Ok(ServerQuery::new(config, signals))
    }

    /// Build the engine and connect immediately, including the greeting check.
    pub async fn connect(self) -> Result<ServerQuery> {
        let query = self.build()?;
        query.connect().await?;
        Ok(query)
    }
}

/// Connection state guarded by the command lock.
struct Session {
    transport: Transport,
    /// The server banner has been read on the current connection.
    greeted: bool,
}

/// A ServerQuery connection.
///
/// Share it between tasks through an `Arc`; every method takes `&self`.
pub struct ServerQuery {
    session: Mutex<Session>,
    signals: Arc<SignalBus>,
    abort: AbortHandle,
    kind: String,
}

impl ServerQuery {
    /// Create a builder.
    pub fn builder() -> ServerQueryBuilder {
        ServerQueryBuilder::new()
    }

    /// Create an unconnected engine.
    pub fn new(config: ConnectionConfig, signals: Arc<SignalBus>) -> Self {
        Self::from_transport(Transport::new(config, signals).with_kind(ADAPTER_KIND))
    }

    /// Create an engine over an already open stream.
    ///
    /// The server banner is still expected on the stream unless the config
    /// disables it.
    pub fn with_stream<S>(config: ConnectionConfig, signals: Arc<SignalBus>, stream: S) -> Self
    where
        S: QueryStream + 'static,
    {
        Self::from_transport(Transport::with_stream(config, signals, stream).with_kind(ADAPTER_KIND))
    }

    /// Create an engine around a prepared transport, keeping its signal prefix.
    pub fn from_transport(transport: Transport) -> Self {
        let signals = transport.signals().clone();
        let abort = transport.abort_handle();
        let kind = transport.kind().to_string();

        Self {
            session: Mutex::new(Session {
                transport,
                greeted: false,
            }),
            signals,
            abort,
            kind,
        }
    }

    /// Serialize a command line: `verb key=value ...` with escaped values.
    pub fn prepare(verb: &str, params: &[Param]) -> String {
        prepare(verb, params)
    }

    /// The signal bus this engine reports to.
    pub fn signals(&self) -> &Arc<SignalBus> {
        &self.signals
    }

    /// Handle for interrupting a blocked read from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Whether the underlying transport is connected.
    ///
    /// Waits for any in-flight command to finish.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.transport.is_connected()
    }

    /// Connect and read the server banner. No-op if already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        Self::ensure_ready(&mut session).await
    }

    /// Send one command line and collect its reply.
    ///
    /// With `throw_on_error`, a non-zero status becomes
    /// [`QueryError::Command`]; otherwise the reply carries it. Transport
    /// failures mid-cycle close the connection; the next call reconnects.
    pub async fn request(&self, command: &str, throw_on_error: bool) -> Result<Reply> {
        if command.contains(['\n', '\r']) {
            return Err(QueryError::Protocol(
                "command text must be a single line".into(),
            ));
        }

        let mut session = self.session.lock().await;
        Self::ensure_ready(&mut session).await?;

        let reply = match self.cycle(&mut session.transport, command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Command '{}' failed, closing connection: {}", command, e);
                session.transport.disconnect();
                session.greeted = false;
                return Err(e);
            }
        };
        drop(session);

        if throw_on_error {
            reply.into_result()
        } else {
            Ok(reply)
        }
    }

    /// Serialize `verb` with `params` and run it, failing on a non-zero status.
    pub async fn execute(&self, verb: &str, params: &[Param]) -> Result<Reply> {
        self.request(&prepare(verb, params), true).await
    }

    /// Run a built command, failing on a non-zero status.
    pub async fn run(&self, command: &Command) -> Result<Reply> {
        self.request(&command.to_line(), true).await
    }

    /// Wait for the next server notification while no command is in flight.
    ///
    /// The event is dispatched through the signal bus before it is returned.
    /// Non-event lines received while idle are discarded.
    pub async fn wait_for_event(&self) -> Result<Arc<Event>> {
        let mut session = self.session.lock().await;
        Self::ensure_ready(&mut session).await?;

        loop {
            let line = match session.transport.read_line(LINE_SEPARATOR).await {
                Ok(line) => line,
                Err(e @ QueryError::WaitTimeout { .. }) => return Err(e),
                Err(e) => {
                    session.transport.disconnect();
                    session.greeted = false;
                    return Err(e);
                }
            };

            match classify(&line) {
                Line::Event(text) => {
                    let event = Arc::new(parse_event(text));
                    self.dispatch(&event);
                    return Ok(event);
                }
                Line::Status(text) | Line::Data(text) if !text.is_empty() => {
                    tracing::warn!("Discarding unsolicited line: {}", text);
                }
                _ => {}
            }
        }
    }

    /// Say goodbye to the server (best effort) and disconnect.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;

        if session.transport.is_connected() {
            if let Err(e) = session
                .transport
                .send_line(QUIT_COMMAND, LINE_SEPARATOR)
                .await
            {
                tracing::debug!("Failed to send quit: {}", e);
            }
        }

        session.transport.disconnect();
        session.greeted = false;
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Connect if needed and consume the server banner once per connection.
    async fn ensure_ready(session: &mut Session) -> Result<()> {
        if !session.transport.is_connected() {
            session.greeted = false;
        }
        session.transport.connect().await?;

        if session.greeted {
            return Ok(());
        }

        if let Some(greeting) = session.transport.config().greeting().map(str::to_owned) {
            let banner = match session.transport.read_line(LINE_SEPARATOR).await {
                Ok(line) => line,
                Err(e) => {
                    session.transport.disconnect();
                    return Err(e);
                }
            };

            if !banner.trim_start().starts_with(&greeting) {
                tracing::warn!("Unexpected server banner: {}", banner);
                let endpoint = session.transport.config().endpoint();
                session.transport.disconnect();
                return Err(QueryError::Connection {
                    endpoint,
                    source: io::Error::new(io::ErrorKind::InvalidData, "invalid reply from server"),
                });
            }

            // welcome text
            if let Err(e) = session.transport.read_line(LINE_SEPARATOR).await {
                session.transport.disconnect();
                return Err(e);
            }
        }

        session.greeted = true;
        Ok(())
    }

    /// One command cycle: send, then read until the status line.
    async fn cycle(&self, transport: &mut Transport, command: &str) -> Result<Reply> {
        tracing::debug!("> {}", command);

        self.notify(
            &names::command_started(&self.kind),
            SignalArgs::Command(command.to_string()),
        );

        let started = Instant::now();
        transport.send_line(command, LINE_SEPARATOR).await?;

        let mut records = Vec::new();
        let status = loop {
            let line = transport.read_line(LINE_SEPARATOR).await?;
            tracing::trace!("< {}", line);

            match classify(&line) {
                Line::Event(text) => self.dispatch(&Arc::new(parse_event(text))),
                Line::Status(text) => break parse_status(text)?,
                Line::Data(text) => records.extend(parse_records(text)),
            }
        };

        let reply = Reply::new(command, records, status, started.elapsed());
        tracing::debug!(
            "Command '{}' finished with {} ({} records, {:?})",
            command,
            reply.code(),
            reply.len(),
            reply.elapsed()
        );

        let reply = Arc::new(reply);
        self.notify(
            &names::command_finished(&self.kind),
            SignalArgs::Reply(reply.clone()),
        );

        Ok(Arc::try_unwrap(reply).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Emit an event under its own name and as `notifyEvent`.
    fn dispatch(&self, event: &Arc<Event>) {
        tracing::debug!("Event {}", event.name());

        self.notify(event.name(), SignalArgs::Event(event.clone()));
        if !event.name().eq_ignore_ascii_case(names::NOTIFY_EVENT) {
            self.notify(names::NOTIFY_EVENT, SignalArgs::Event(event.clone()));
        }
    }

    /// Emit a signal; a failing handler is logged and does not stop the cycle.
    fn notify(&self, name: &str, args: SignalArgs) {
        if let Err(e) = self.signals.emit(name, args) {
            tracing::error!("Handler for '{}' failed: {}", name, e);
        }
    }
}
