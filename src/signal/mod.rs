//! Signal module - named, subscribable event channels.
//!
//! Provides:
//! - [`SignalBus`] - maps signal names to ordered handler lists
//! - [`Handler`] - a callback plus the arguments it accepts
//! - [`names`] - builders for the lifecycle signal names
//!
//! The bus is an ordinary value: create one, share it through an `Arc`, and
//! hand it to every transport and engine that should report into it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serverquery_client::signal::{names, Handler, SignalBus};
//!
//! let bus = Arc::new(SignalBus::new());
//!
//! bus.subscribe(&names::data_send("serverquery"), Handler::on_bytes(|data| {
//!     assert!(!data.is_empty());
//!     Ok(())
//! }))
//! .unwrap();
//! ```

mod bus;
mod handler;

pub use bus::{SignalBus, SubscriptionId};
pub use handler::{ArgsKind, Handler, HandlerResult, SignalArgs};

/// Signal name builders.
///
/// Lifecycle signals are prefixed with the kind of the adapter that owns the
/// transport, e.g. `serverqueryDataRead`.
pub mod names {
    /// Signal carrying every server notification, whatever its name.
    pub const NOTIFY_EVENT: &str = "notifyEvent";

    /// `<kind>Connected`
    pub fn connected(kind: &str) -> String {
        format!("{}Connected", kind)
    }

    /// `<kind>Disconnected`
    pub fn disconnected(kind: &str) -> String {
        format!("{}Disconnected", kind)
    }

    /// `<kind>DataRead`
    pub fn data_read(kind: &str) -> String {
        format!("{}DataRead", kind)
    }

    /// `<kind>DataSend`
    pub fn data_send(kind: &str) -> String {
        format!("{}DataSend", kind)
    }

    /// `<kind>WaitTimeout`
    pub fn wait_timeout(kind: &str) -> String {
        format!("{}WaitTimeout", kind)
    }

    /// `<kind>CommandStarted`
    pub fn command_started(kind: &str) -> String {
        format!("{}CommandStarted", kind)
    }

    /// `<kind>CommandFinished`
    pub fn command_finished(kind: &str) -> String {
        format!("{}CommandFinished", kind)
    }
}
