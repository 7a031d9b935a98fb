//! Byte-level conversation with one endpoint.
//!
//! A [`Transport`] owns at most one live stream. It connects lazily on the
//! first I/O call, reports its lifecycle through the signal bus, and reads in
//! one of two modes:
//!
//! - **blocking**: each read awaits data for at most the configured timeout;
//!   an expired timeout is a lost connection.
//! - **non-blocking**: reads first wait for readiness, polling in
//!   timeout-sized steps and emitting `<kind>WaitTimeout` after every step
//!   that saw no data. The wait is bounded by the configured `wait_limit`
//!   and can be interrupted through an [`AbortHandle`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serverquery_client::config::ConnectionConfig;
//! use serverquery_client::signal::SignalBus;
//! use serverquery_client::transport::Transport;
//!
//! let config = ConnectionConfig::builder().host("127.0.0.1").port(10011).build()?;
//! let mut transport = Transport::new(config, Arc::new(SignalBus::new()));
//!
//! transport.send_line("version", "\n").await?;
//! let line = transport.read_line("\n").await?;
//! ```

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::line_buffer::LineBuffer;
use super::tls;
use crate::config::{ConnectionConfig, Scheme};
use crate::error::{QueryError, Result};
use crate::protocol::CHUNK_SIZE;
use crate::signal::{names, SignalArgs, SignalBus};

/// Default signal prefix for a bare transport.
pub const DEFAULT_KIND: &str = "transport";

/// Any bidirectional byte stream a transport can drive.
pub trait QueryStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> QueryStream for T {}

/// The live socket.
enum Link {
    Stream(Box<dyn QueryStream>),
    Datagram(UdpSocket),
}

/// Reason carried by the error of an aborted read or wait.
const WAIT_ABORTED: &str = "wait aborted";

/// Interrupts a read or readiness wait on a transport.
///
/// Cheap to clone; usable from any task (or a signal handler) while the
/// transport itself is borrowed by the waiting call. An abort stays pending
/// until a read or wait observes it, so one issued before the read starts or
/// between polling steps is not lost. Disconnecting clears a pending abort.
#[derive(Clone, Default)]
pub struct AbortHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl AbortHandle {
    /// Abort the current wait, or the next one if none is in progress.
    ///
    /// The interrupted call fails with [`QueryError::ConnectionLost`].
    pub fn abort(&self) {
        self.current().cancel();
    }

    /// Whether an abort is pending.
    pub fn is_aborted(&self) -> bool {
        self.current().is_cancelled()
    }

    fn current(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a fresh token, consuming any pending abort.
    fn reset(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
    }
}

/// One logical connection to a server.
pub struct Transport {
    /// Endpoint and I/O settings.
    config: ConnectionConfig,
    /// Bus receiving lifecycle signals.
    signals: Arc<SignalBus>,
    /// Signal name prefix (`<kind>DataRead`, ...).
    kind: String,
    /// Live socket (`None` = unconnected).
    link: Option<Link>,
    /// Bytes received but not yet handed out.
    inbound: LineBuffer,
    /// The peer closed its side of the stream.
    eof: bool,
    /// Interrupts waits.
    abort: AbortHandle,
}

impl Transport {
    /// Create an unconnected transport.
    pub fn new(config: ConnectionConfig, signals: Arc<SignalBus>) -> Self {
        Self {
            config,
            signals,
            kind: DEFAULT_KIND.to_string(),
            link: None,
            inbound: LineBuffer::new(),
            eof: false,
            abort: AbortHandle::default(),
        }
    }

    /// Create a transport around an already open stream.
    ///
    /// The transport starts connected; after a disconnect it reconnects to
    /// the configured endpoint like any other transport.
    pub fn with_stream<S>(config: ConnectionConfig, signals: Arc<SignalBus>, stream: S) -> Self
    where
        S: QueryStream + 'static,
    {
        let mut transport = Self::new(config, signals);
        transport.link = Some(Link::Stream(Box::new(stream)));
        transport
    }

    /// Set the prefix used for lifecycle signal names.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// The connection settings.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The signal bus this transport reports to.
    pub fn signals(&self) -> &Arc<SignalBus> {
        &self.signals
    }

    /// Signal name prefix.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether a stream is open.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Whether the transport is stream-oriented.
    pub fn is_stream(&self) -> bool {
        match &self.link {
            Some(Link::Stream(_)) => true,
            Some(Link::Datagram(_)) => false,
            None => self.config.scheme().is_stream(),
        }
    }

    /// Handle for interrupting a wait from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Open the connection. No-op if already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }

        let endpoint = self.config.endpoint();
        let limit = self.config.timeout();
        let failed = |source: io::Error| QueryError::Connection {
            endpoint: endpoint.clone(),
            source,
        };
        let timed_out = || io::Error::new(io::ErrorKind::TimedOut, "connect timed out");

        let link = match self.config.scheme() {
            Scheme::Tcp => {
                let tcp = timeout(limit, TcpStream::connect(endpoint.as_str()))
                    .await
                    .map_err(|_| failed(timed_out()))?
                    .map_err(failed)?;
                let _ = tcp.set_nodelay(true);

                if self.config.tls() {
                    Link::Stream(Box::new(tls::handshake(&self.config, tcp).await?))
                } else {
                    Link::Stream(Box::new(tcp))
                }
            }
            Scheme::Udp => {
                let local = if endpoint.starts_with('[') {
                    "[::]:0"
                } else {
                    "0.0.0.0:0"
                };
                let socket = UdpSocket::bind(local).await.map_err(failed)?;
                timeout(limit, socket.connect(endpoint.as_str()))
                    .await
                    .map_err(|_| failed(timed_out()))?
                    .map_err(failed)?;
                Link::Datagram(socket)
            }
        };

        tracing::debug!("{} connected to {}", self.kind, endpoint);

        self.link = Some(link);
        self.inbound.clear();
        self.eof = false;
        self.notify(&names::connected(&self.kind), SignalArgs::None);

        Ok(())
    }

    /// Close the connection. No-op if not connected.
    pub fn disconnect(&mut self) {
        if self.link.take().is_none() {
            return;
        }

        tracing::debug!("{} disconnected from {}", self.kind, self.config.endpoint());

        self.inbound.clear();
        self.eof = false;
        self.abort.reset();
        self.notify(&names::disconnected(&self.kind), SignalArgs::None);
    }

    /// Read up to `length` bytes (stream) or one datagram truncated to `length`.
    pub async fn read(&mut self, length: usize) -> Result<Bytes> {
        self.connect().await?;

        if self.is_datagram() {
            return self.recv_datagram(length).await;
        }

        if self.inbound.is_empty() {
            self.read_chunk(length.max(1)).await?;
        }

        Ok(self.inbound.take(length))
    }

    /// Read one line terminated by `token`.
    ///
    /// The returned line has the token and trailing whitespace stripped. If
    /// the stream ends mid-line, the partial line is returned; if it ends
    /// with nothing buffered, the read fails with
    /// [`QueryError::ConnectionLost`].
    pub async fn read_line(&mut self, token: &str) -> Result<String> {
        self.connect().await?;

        if self.is_datagram() {
            return Err(QueryError::Unsupported(
                "line reads need a stream transport",
            ));
        }

        loop {
            if let Some(line) = self.inbound.take_line(token.as_bytes()) {
                return Ok(finish_line(&line, token));
            }

            let max = self.config.max_line_length();
            if self.inbound.len() > max {
                let buffered = self.inbound.len();
                self.inbound.clear();
                return Err(QueryError::Protocol(format!(
                    "line exceeds {} bytes without a terminator ({} buffered)",
                    max, buffered
                )));
            }

            match self.read_chunk(CHUNK_SIZE).await {
                Ok(()) => continue,
                Err(QueryError::ConnectionLost(reason))
                    if !self.inbound.is_empty() && reason != WAIT_ABORTED =>
                {
                    let rest = finish_line(&self.inbound.take_all(), token);
                    // leftover line-end padding is not a line
                    if rest.trim().is_empty() {
                        return Err(QueryError::ConnectionLost(reason));
                    }
                    tracing::debug!("Returning partial line after read failure: {}", reason);
                    return Ok(rest);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write all of `data` (stream) or send it as one datagram.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.connect().await?;

        let limit = self.config.timeout();
        let result = match self.link.as_mut() {
            Some(Link::Stream(stream)) => {
                timeout(limit, async {
                    stream.write_all(data).await?;
                    stream.flush().await
                })
                .await
            }
            Some(Link::Datagram(socket)) => timeout(limit, async {
                socket.send(data).await.map(|_| ())
            })
            .await,
            None => return Err(QueryError::NotConnected),
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(QueryError::ConnectionLost(e.to_string())),
            Err(_) => {
                return Err(QueryError::ConnectionLost(format!(
                    "send did not complete within {:?}",
                    limit
                )))
            }
        }

        self.notify(
            &names::data_send(&self.kind),
            SignalArgs::Bytes(Bytes::copy_from_slice(data)),
        );
        Ok(())
    }

    /// Send `data` followed by `separator`, in chunks of at most 4096 bytes.
    ///
    /// The separator is appended to the final chunk only.
    pub async fn send_line(&mut self, data: &str, separator: &str) -> Result<()> {
        if !self.is_stream() {
            return Err(QueryError::Unsupported(
                "line writes need a stream transport",
            ));
        }

        let bytes = data.as_bytes();
        if bytes.is_empty() {
            return self.send(separator.as_bytes()).await;
        }

        let mut chunks = bytes.chunks(CHUNK_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            if chunks.peek().is_some() {
                self.send(chunk).await?;
            } else {
                let mut last = Vec::with_capacity(chunk.len() + separator.len());
                last.extend_from_slice(chunk);
                last.extend_from_slice(separator.as_bytes());
                self.send(&last).await?;
            }
        }

        Ok(())
    }

    /// Wait until data can be read, starting the elapsed count at `elapsed`.
    ///
    /// Only meaningful in non-blocking mode; returns immediately in blocking
    /// mode or when received data is already buffered.
    pub async fn wait_for_ready_read(&mut self, elapsed: Duration) -> Result<()> {
        if self.config.blocking() || !self.inbound.is_empty() || self.eof {
            return Ok(());
        }
        self.connect().await?;
        self.poll_until_ready(elapsed).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn is_datagram(&self) -> bool {
        matches!(self.link, Some(Link::Datagram(_)))
    }

    /// Emit a lifecycle signal, logging handler failures instead of
    /// propagating them into the I/O path.
    fn notify(&self, name: &str, args: SignalArgs) {
        if let Err(e) = self.signals.emit(name, args) {
            tracing::error!("Handler for '{}' failed: {}", name, e);
        }
    }

    /// Consume the pending abort and build the error the aborted call returns.
    fn take_abort(&self) -> QueryError {
        self.abort.reset();
        QueryError::ConnectionLost(WAIT_ABORTED.into())
    }

    /// Pull one more chunk of at most `limit` bytes into the inbound buffer.
    async fn read_chunk(&mut self, limit: usize) -> Result<()> {
        if self.eof {
            return Err(QueryError::ConnectionLost(
                "connection closed by peer".into(),
            ));
        }

        if self.config.blocking() {
            if self.fill(limit, self.config.timeout()).await?.is_none() {
                self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(Bytes::new()));
                return Err(QueryError::ConnectionLost(format!(
                    "no data received within {:?}",
                    self.config.timeout()
                )));
            }
        } else {
            self.poll_until_ready(Duration::ZERO).await?;
        }

        if self.eof {
            return Err(QueryError::ConnectionLost(
                "connection closed by peer".into(),
            ));
        }
        Ok(())
    }

    /// Readiness loop for non-blocking mode.
    ///
    /// For streams the chunk that made the socket ready is pulled into the
    /// inbound buffer.
    async fn poll_until_ready(&mut self, mut elapsed: Duration) -> Result<()> {
        let step = self.config.timeout();

        loop {
            if !elapsed.is_zero() {
                self.notify(
                    &names::wait_timeout(&self.kind),
                    SignalArgs::Elapsed(elapsed),
                );
            }
            // also catches an abort issued by a WaitTimeout handler
            if self.abort.is_aborted() {
                return Err(self.take_abort());
            }
            elapsed += step;

            if self.poll_once(step).await? {
                return Ok(());
            }

            if let Some(limit) = self.config.wait_limit() {
                if elapsed >= limit {
                    tracing::warn!(
                        "{} gave up waiting for data from {} after {:?}",
                        self.kind,
                        self.config.endpoint(),
                        elapsed
                    );
                    return Err(QueryError::WaitTimeout { elapsed });
                }
            }
        }
    }

    async fn poll_once(&mut self, step: Duration) -> Result<bool> {
        if !self.is_datagram() {
            return Ok(self.fill(CHUNK_SIZE, step).await?.is_some());
        }

        let token = self.abort.current();
        let Some(Link::Datagram(socket)) = self.link.as_ref() else {
            return Err(QueryError::NotConnected);
        };

        let ready = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            ready = timeout(step, socket.readable()) => Some(ready),
        };

        match ready {
            None => Err(self.take_abort()),
            Some(Ok(Ok(()))) => Ok(true),
            Some(Ok(Err(e))) => Err(QueryError::ConnectionLost(e.to_string())),
            Some(Err(_)) => Ok(false),
        }
    }

    /// Read at most `limit` bytes from the stream into the inbound buffer.
    ///
    /// Returns `None` if nothing arrived within `within`, `Some(0)` at end of
    /// stream.
    async fn fill(&mut self, limit: usize, within: Duration) -> Result<Option<usize>> {
        let token = self.abort.current();
        let stream = match self.link.as_mut() {
            Some(Link::Stream(stream)) => stream,
            Some(Link::Datagram(_)) => {
                return Err(QueryError::Unsupported("datagram transports have no stream"))
            }
            None => return Err(QueryError::NotConnected),
        };

        let mut chunk = vec![0u8; limit];
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            read = timeout(within, stream.read(&mut chunk)) => Some(read),
        };

        let Some(outcome) = outcome else {
            self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(Bytes::new()));
            return Err(self.take_abort());
        };

        match outcome {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.eof = true;
                self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(Bytes::new()));
                Ok(Some(0))
            }
            Ok(Ok(n)) => {
                self.inbound.push(&chunk[..n]);
                self.notify(
                    &names::data_read(&self.kind),
                    SignalArgs::Bytes(Bytes::copy_from_slice(&chunk[..n])),
                );
                Ok(Some(n))
            }
            Ok(Err(e)) => {
                self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(Bytes::new()));
                Err(QueryError::ConnectionLost(e.to_string()))
            }
        }
    }

    async fn recv_datagram(&mut self, length: usize) -> Result<Bytes> {
        self.wait_for_ready_read(Duration::ZERO).await?;

        let limit = self.config.timeout();
        let token = self.abort.current();
        let Some(Link::Datagram(socket)) = self.link.as_ref() else {
            return Err(QueryError::NotConnected);
        };

        let mut buf = vec![0u8; length];
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.abort.reset();
                Err(WAIT_ABORTED.to_string())
            }
            recv = timeout(limit, socket.recv(&mut buf)) => match recv {
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no datagram received within {:?}", limit)),
            },
        };

        match outcome {
            Ok(n) => {
                buf.truncate(n);
                let data = Bytes::from(buf);
                self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(data.clone()));
                Ok(data)
            }
            Err(reason) => {
                self.notify(&names::data_read(&self.kind), SignalArgs::Bytes(Bytes::new()));
                Err(QueryError::ConnectionLost(reason))
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Strip the terminator and trailing whitespace from a received line.
fn finish_line(raw: &[u8], token: &str) -> String {
    let raw = raw.strip_suffix(token.as_bytes()).unwrap_or(raw);
    String::from_utf8_lossy(raw).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::signal::Handler;
    use tokio::io::duplex;

    fn config() -> ConnectionConfig {
        ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    fn counter(bus: &SignalBus, name: &str) -> Arc<Mutex<usize>> {
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        bus.subscribe(
            name,
            Handler::new(move |_| {
                *count_clone.lock().unwrap() += 1;
                Ok(())
            }),
        )
        .unwrap();
        count
    }

    #[test]
    fn test_finish_line() {
        assert_eq!(finish_line(b"cid=1\n", "\n"), "cid=1");
        assert_eq!(finish_line(b"cid=1 \r\n", "\n"), "cid=1");
        assert_eq!(finish_line(b"partial", "\n"), "partial");
    }

    #[test]
    fn test_new_transport_is_unconnected() {
        let transport = Transport::new(config(), Arc::new(SignalBus::new()));
        assert!(!transport.is_connected());
        assert!(transport.is_stream());
        assert_eq!(transport.kind(), DEFAULT_KIND);
    }

    #[tokio::test]
    async fn test_read_line_across_chunks() {
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);

        server.write_all(b"cid=1 na").await.unwrap();
        server.write_all(b"me=Lobby\nerror id=0 msg=ok\n").await.unwrap();

        assert_eq!(transport.read_line("\n").await.unwrap(), "cid=1 name=Lobby");
        assert_eq!(transport.read_line("\n").await.unwrap(), "error id=0 msg=ok");
    }

    #[tokio::test]
    async fn test_read_line_partial_at_eof() {
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);

        server.write_all(b"trailing").await.unwrap();
        drop(server);

        assert_eq!(transport.read_line("\n").await.unwrap(), "trailing");
        let err = transport.read_line("\n").await.unwrap_err();
        assert!(matches!(err, QueryError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_read_line_blocking_timeout_is_connection_lost() {
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);

        let err = transport.read_line("\n").await.unwrap_err();
        assert!(matches!(err, QueryError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_read_returns_buffered_bytes_first() {
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);

        server.write_all(b"abcdef").await.unwrap();

        assert_eq!(&transport.read(4).await.unwrap()[..], b"abcd");
        assert_eq!(&transport.read(4).await.unwrap()[..], b"ef");
    }

    #[tokio::test]
    async fn test_data_read_emitted_per_chunk() {
        let bus = Arc::new(SignalBus::new());
        let reads = counter(&bus, "transportDataRead");
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config(), bus, client);

        server.write_all(b"x=1\n").await.unwrap();
        transport.read_line("\n").await.unwrap();

        assert_eq!(*reads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_send_line_chunks() {
        let bus = Arc::new(SignalBus::new());
        let sent = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sent_clone = sent.clone();
        bus.subscribe(
            "transportDataSend",
            Handler::on_bytes(move |data| {
                sent_clone.lock().unwrap().push(data.to_vec());
                Ok(())
            }),
        )
        .unwrap();

        let (client, mut server) = duplex(32 * 1024);
        let mut transport = Transport::with_stream(config(), bus, client);

        let payload = "a".repeat(10_000);
        transport.send_line(&payload, "\n").await.unwrap();

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].len(), 4096);
        assert_eq!(sent[1].len(), 4096);
        assert_eq!(sent[2].len(), 10_000 - 2 * 4096 + 1);
        assert!(!sent[0].ends_with(b"\n"));
        assert!(!sent[1].ends_with(b"\n"));
        assert!(sent[2].ends_with(b"\n"));

        let mut received = vec![0u8; 10_001];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[tokio::test]
    async fn test_send_line_empty_sends_separator() {
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);

        transport.send_line("", "\n").await.unwrap();

        let mut buf = [0u8; 1];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\n");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let bus = Arc::new(SignalBus::new());
        let disconnects = counter(&bus, "transportDisconnected");
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config(), bus, client);

        transport.disconnect();
        transport.disconnect();

        assert!(!transport.is_connected());
        assert_eq!(*disconnects.lock().unwrap(), 1);

        drop(transport);
        assert_eq!(*disconnects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_emits_disconnect() {
        let bus = Arc::new(SignalBus::new());
        let disconnects = counter(&bus, "queryDisconnected");
        let (client, _server) = duplex(64);

        let transport = Transport::with_stream(config(), bus, client).with_kind("query");
        drop(transport);

        assert_eq!(*disconnects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_blocking_wait_emits_timeouts_and_gives_up() {
        let bus = Arc::new(SignalBus::new());
        let waits = Arc::new(Mutex::new(Vec::new()));
        let waits_clone = waits.clone();
        bus.subscribe(
            "transportWaitTimeout",
            Handler::on_elapsed(move |elapsed| {
                waits_clone.lock().unwrap().push(elapsed);
                Ok(())
            }),
        )
        .unwrap();

        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .blocking(false)
            .timeout(Duration::from_millis(20))
            .wait_limit(Duration::from_millis(60))
            .build()
            .unwrap();
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config, bus, client);

        let err = transport
            .wait_for_ready_read(Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::WaitTimeout { .. }));
        assert_eq!(
            *waits.lock().unwrap(),
            vec![Duration::from_millis(20), Duration::from_millis(40)]
        );
    }

    #[tokio::test]
    async fn test_non_blocking_wait_returns_when_data_arrives() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .blocking(false)
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config, Arc::new(SignalBus::new()), client);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.write_all(b"late=1\n").await.unwrap();
            // keep the pipe open until the reader is done
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        assert_eq!(transport.read_line("\n").await.unwrap(), "late=1");
    }

    #[tokio::test]
    async fn test_abort_interrupts_wait() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .blocking(false)
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config, Arc::new(SignalBus::new()), client);
        let abort = transport.abort_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            abort.abort();
        });

        let err = transport.read_line("\n").await.unwrap_err();
        assert!(matches!(err, QueryError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_abort_from_wait_timeout_handler() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .blocking(false)
            .timeout(Duration::from_millis(20))
            .wait_limit(Duration::from_millis(400))
            .build()
            .unwrap();
        let bus = Arc::new(SignalBus::new());
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config, bus.clone(), client);

        let abort = transport.abort_handle();
        let fired = Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();
        bus.subscribe(
            "transportWaitTimeout",
            Handler::on_elapsed(move |_| {
                let mut fired = fired_clone.lock().unwrap();
                *fired += 1;
                if *fired == 3 {
                    abort.abort();
                }
                Ok(())
            }),
        )
        .unwrap();

        let err = transport.read_line("\n").await.unwrap_err();

        assert!(matches!(err, QueryError::ConnectionLost(ref reason) if reason == WAIT_ABORTED));
        assert_eq!(*fired.lock().unwrap(), 3);
        assert!(!transport.abort_handle().is_aborted());
    }

    #[tokio::test]
    async fn test_abort_before_read_is_kept() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let (client, mut server) = duplex(64);
        let mut transport = Transport::with_stream(config, Arc::new(SignalBus::new()), client);

        transport.abort_handle().abort();

        let err = tokio::time::timeout(Duration::from_secs(1), transport.read_line("\n"))
            .await
            .expect("aborted read should return at once")
            .unwrap_err();
        assert!(matches!(err, QueryError::ConnectionLost(_)));

        // the abort was consumed; the next read proceeds
        server.write_all(b"cid=1\n").await.unwrap();
        assert_eq!(transport.read_line("\n").await.unwrap(), "cid=1");
    }

    #[tokio::test]
    async fn test_disconnect_clears_pending_abort() {
        let (client, _server) = duplex(64);
        let mut transport = Transport::with_stream(config(), Arc::new(SignalBus::new()), client);
        let abort = transport.abort_handle();

        abort.abort();
        assert!(abort.is_aborted());

        transport.disconnect();
        assert!(!abort.is_aborted());
    }

    #[tokio::test]
    async fn test_line_without_terminator_is_capped() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(10011)
            .timeout(Duration::from_millis(200))
            .max_line_length(16)
            .build()
            .unwrap();
        let (client, mut server) = duplex(256);
        let mut transport = Transport::with_stream(config, Arc::new(SignalBus::new()), client);

        server.write_all(&[b'x'; 40]).await.unwrap();

        let err = transport.read_line("\n").await.unwrap_err();
        assert!(matches!(err, QueryError::Protocol(_)));
    }
}
