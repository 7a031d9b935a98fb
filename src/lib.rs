//! # serverquery-client
//!
//! Async client core for the ServerQuery remote-administration protocol of
//! voice-chat servers.
//!
//! ## Architecture
//!
//! - **Signal Bus** ([`signal`]): named, case-insensitive handler lists for
//!   I/O lifecycle notices and server-pushed events
//! - **Transport** ([`transport`]): one TCP, TCP+TLS or UDP connection with
//!   line framing and blocking or non-blocking reads
//! - **Protocol Engine** ([`ServerQuery`]): serializes commands, correlates each
//!   with its reply, and routes `notify*` lines to the signal bus
//! - **Reply** ([`Reply`]): records, status and timing of one command
//!
//! ## Example
//!
//! ```ignore
//! use serverquery_client::config::ConnectionConfig;
//! use serverquery_client::ServerQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), serverquery_client::QueryError> {
//!     let config = ConnectionConfig::builder()
//!         .host("127.0.0.1")
//!         .port(10011)
//!         .build()?;
//!
//!     let query = ServerQuery::builder().config(config).connect().await?;
//!     let version = query.execute("version", &[]).await?;
//!     println!("{:?}", version.first().and_then(|r| r.get("version")));
//!
//!     query.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod reply;
pub mod signal;
pub mod transport;

mod client;

pub use client::{ServerQuery, ServerQueryBuilder, ADAPTER_KIND};
pub use config::ConnectionConfig;
pub use error::{QueryError, Result};
pub use protocol::{Command, Param};
pub use reply::Reply;
pub use signal::{Handler, SignalArgs, SignalBus};
