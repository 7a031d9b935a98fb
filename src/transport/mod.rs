//! Transport module - byte-level connection handling.
//!
//! Provides:
//! - [`Transport`] - one logical connection (TCP, TCP+TLS, or UDP)
//! - [`LineBuffer`] - accumulates received chunks and splits off lines
//! - [`AbortHandle`] - interrupts a blocked read or readiness wait

mod connection;
mod line_buffer;
mod tls;

pub use connection::{AbortHandle, QueryStream, Transport, DEFAULT_KIND};
pub use line_buffer::LineBuffer;
