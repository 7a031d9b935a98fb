//! Signal bus mapping signal names to ordered handler lists.
//!
//! Names are case-insensitive. Handlers run synchronously, in subscription
//! order, on the task that emits the signal. A slow handler delays whatever
//! that task does next, so handlers should be quick or hand work off.
//!
//! # Example
//!
//! ```
//! use serverquery_client::signal::{Handler, SignalArgs, SignalBus};
//!
//! let bus = SignalBus::new();
//!
//! bus.subscribe("notifyTextMessage", Handler::on_event(|event| {
//!     println!("{:?}", event.get("msg"));
//!     Ok(())
//! }))
//! .unwrap();
//!
//! assert_eq!(bus.handler_count("NOTIFYTEXTMESSAGE"), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use super::handler::{ArgsKind, Handler, SignalArgs};
use crate::error::{QueryError, Result};

/// Identifies one subscription, for [`SignalBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Entry for a registered handler.
struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// Registry of named signals and their handlers.
///
/// Shared between transports and engines through an `Arc`. Emission works on
/// a snapshot of the handler list, so one emission never holds the registry
/// lock while handlers run.
pub struct SignalBus {
    /// Handlers by lowercased signal name, in subscription order.
    slots: RwLock<HashMap<String, Vec<Subscription>>>,
    /// Next subscription ID to assign.
    next_id: AtomicU64,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a handler to a signal.
    ///
    /// Fails with [`QueryError::InvalidHandler`] if the handler does not accept
    /// the arguments the signal carries.
    pub fn subscribe(&self, name: &str, handler: Handler) -> Result<SubscriptionId> {
        let key = name.to_lowercase();
        let expected = ArgsKind::for_signal(&key);

        if !handler.accepts().accepts(expected) {
            return Err(QueryError::InvalidHandler {
                signal: key,
                expected: expected.as_str(),
                found: handler.accepts().as_str(),
            });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(Subscription { id, handler });

        Ok(id)
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        self.remove_first(name, |s| s.id == id)
    }

    /// Remove the first subscription of `handler` (or a clone of it).
    pub fn unsubscribe_handler(&self, name: &str, handler: &Handler) -> bool {
        self.remove_first(name, |s| &s.handler == handler)
    }

    fn remove_first<P>(&self, name: &str, predicate: P) -> bool
    where
        P: Fn(&Subscription) -> bool,
    {
        let key = name.to_lowercase();
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        let Some(list) = slots.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().position(predicate) else {
            return false;
        };

        list.remove(pos);
        if list.is_empty() {
            slots.remove(&key);
        }
        true
    }

    /// Invoke every handler of `name`, in subscription order.
    ///
    /// The first handler error aborts the remaining handlers of this emission
    /// and is returned to the caller.
    pub fn emit(&self, name: &str, args: SignalArgs) -> Result<()> {
        let handlers: Vec<Handler> = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            match slots.get(&name.to_lowercase()) {
                Some(list) => list.iter().map(|s| s.handler.clone()).collect(),
                None => return Ok(()),
            }
        };

        for handler in &handlers {
            handler.call(&args)?;
        }

        Ok(())
    }

    /// Whether any handler is subscribed to `name`.
    pub fn has_handlers(&self, name: &str) -> bool {
        self.handler_count(name) > 0
    }

    /// Number of handlers subscribed to `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_lowercase())
            .map_or(0, Vec::len)
    }

    /// Names of all signals with at least one handler (lowercased).
    pub fn signals(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Remove every handler of `name`.
    pub fn clear(&self, name: &str) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name.to_lowercase());
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = log.clone();
        Handler::new(move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_handlers_called_in_subscription_order() {
        let bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("custom", recorder(&log, "h1")).unwrap();
        bus.subscribe("custom", recorder(&log, "h2")).unwrap();
        bus.emit("custom", SignalArgs::None).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("ServerQueryConnected", recorder(&log, "x"))
            .unwrap();
        bus.emit("serverqueryconnected", SignalArgs::None).unwrap();
        bus.emit("SERVERQUERYCONNECTED", SignalArgs::None).unwrap();

        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(bus.signals(), vec!["serverqueryconnected".to_string()]);
    }

    #[test]
    fn test_emit_without_handlers_is_ok() {
        let bus = SignalBus::new();
        assert!(bus.emit("nobody", SignalArgs::None).is_ok());
        assert!(!bus.has_handlers("nobody"));
    }

    #[test]
    fn test_invalid_handler_rejected() {
        let bus = SignalBus::new();

        let err = bus
            .subscribe("serverqueryWaitTimeout", Handler::on_bytes(|_| Ok(())))
            .unwrap_err();

        assert!(matches!(
            err,
            QueryError::InvalidHandler {
                expected: "elapsed-time",
                found: "bytes",
                ..
            }
        ));
        assert_eq!(bus.handler_count("serverqueryWaitTimeout"), 0);
    }

    #[test]
    fn test_event_handler_on_event_with_lifecycle_suffix() {
        let bus = SignalBus::new();
        assert!(bus
            .subscribe("notifyClientConnected", Handler::on_event(|_| Ok(())))
            .is_ok());
    }

    #[test]
    fn test_typed_handler_accepted() {
        let bus = SignalBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        bus.subscribe(
            "serverqueryWaitTimeout",
            Handler::on_elapsed(move |elapsed| {
                *seen_clone.lock().unwrap() = Some(elapsed);
                Ok(())
            }),
        )
        .unwrap();
        bus.emit(
            "serverqueryWaitTimeout",
            SignalArgs::Elapsed(Duration::from_secs(3)),
        )
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_unsubscribe_by_id() {
        let bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = bus.subscribe("custom", recorder(&log, "h1")).unwrap();
        bus.subscribe("custom", recorder(&log, "h2")).unwrap();

        assert!(bus.unsubscribe("CUSTOM", first));
        assert!(!bus.unsubscribe("custom", first));
        bus.emit("custom", SignalArgs::None).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["h2"]);
    }

    #[test]
    fn test_unsubscribe_handler_removes_first_match_only() {
        let bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(&log, "dup");

        bus.subscribe("custom", handler.clone()).unwrap();
        bus.subscribe("custom", handler.clone()).unwrap();

        assert!(bus.unsubscribe_handler("custom", &handler));
        assert_eq!(bus.handler_count("custom"), 1);
        assert!(bus.unsubscribe_handler("custom", &handler));
        assert!(!bus.unsubscribe_handler("custom", &handler));
        assert!(bus.signals().is_empty());
    }

    #[test]
    fn test_handler_error_aborts_emission() {
        let bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("custom", recorder(&log, "before")).unwrap();
        bus.subscribe(
            "custom",
            Handler::new(|_| Err(QueryError::Handler("boom".into()))),
        )
        .unwrap();
        bus.subscribe("custom", recorder(&log, "after")).unwrap();

        let err = bus.emit("custom", SignalArgs::None).unwrap_err();

        assert!(matches!(err, QueryError::Handler(msg) if msg == "boom"));
        assert_eq!(*log.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = Arc::new(SignalBus::new());
        let inner = bus.clone();

        bus.subscribe(
            "custom",
            Handler::new(move |_| {
                inner.subscribe("other", Handler::new(|_| Ok(())))?;
                Ok(())
            }),
        )
        .unwrap();

        bus.emit("custom", SignalArgs::None).unwrap();
        assert_eq!(bus.handler_count("other"), 1);
    }

    #[test]
    fn test_clear() {
        let bus = SignalBus::new();
        bus.subscribe("custom", Handler::new(|_| Ok(()))).unwrap();
        bus.clear("Custom");
        assert!(!bus.has_handlers("custom"));
    }
}
