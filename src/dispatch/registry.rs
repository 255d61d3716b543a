use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, error, warn};

use super::{keys, Event};
use crate::protocol::Link;

/// Error a handler may return; it is logged and never stops the connection
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Trait for event handlers.
pub trait Handler: Send + 'static {
    /// Handles one event. `link` sends frames on the same connection.
    fn call(&mut self, link: &mut Link, event: &Event<'_>) -> HandlerResult;
}

impl<F> Handler for F
where
    F: FnMut(&mut Link, &Event<'_>) -> HandlerResult + Send + 'static,
{
    fn call(&mut self, link: &mut Link, event: &Event<'_>) -> HandlerResult {
        self(link, event)
    }
}

/// Registry mapping event keys to handlers.
///
/// Keys are unique; registering a key again replaces the previous handler. The
/// registry belongs to the session and survives reconnects.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("keys", &keys).finish()
    }
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `key`, returning the handler it replaced
    pub fn on<F>(&mut self, key: impl Into<String>, handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut(&mut Link, &Event<'_>) -> HandlerResult + Send + 'static,
    {
        self.on_handler(key, handler)
    }

    /// Registers any `Handler` under `key`, returning the handler it replaced
    pub fn on_handler<H: Handler>(
        &mut self,
        key: impl Into<String>,
        handler: H,
    ) -> Option<Box<dyn Handler>> {
        let key = key.into();
        debug!(key = %key, "registering handler");
        self.handlers.insert(key, Box::new(handler))
    }

    /// Removes the handler registered under `key`
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Handler>> {
        self.handlers.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Called once the server accepts the login, with the handshake latency
    pub fn on_connected<F>(&mut self, mut handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut(&mut Link, Duration) -> HandlerResult + Send + 'static,
    {
        self.on(keys::CONNECTED, move |link: &mut Link, event: &Event<'_>| match event {
            Event::Connected { latency } => handler(link, *latency),
            _ => Ok(()),
        })
    }

    /// Called when the connection ends for any reason
    pub fn on_disconnected<F>(&mut self, mut handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut() -> HandlerResult + Send + 'static,
    {
        self.on(keys::DISCONNECTED, move |_: &mut Link, event: &Event<'_>| match event {
            Event::Disconnected => handler(),
            _ => Ok(()),
        })
    }

    /// Called with the values the app wrote to virtual pin `pin`
    pub fn on_virtual_write<P, F>(&mut self, pin: P, mut handler: F) -> Option<Box<dyn Handler>>
    where
        P: Display,
        F: FnMut(&mut Link, &[String]) -> HandlerResult + Send + 'static,
    {
        self.on(
            keys::virtual_write(pin),
            move |link: &mut Link, event: &Event<'_>| match event {
                Event::VirtualWrite { values, .. } => handler(link, values),
                _ => Ok(()),
            },
        )
    }

    /// Called with the pin and values of every virtual pin write
    pub fn on_any_virtual_write<F>(&mut self, mut handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut(&mut Link, &str, &[String]) -> HandlerResult + Send + 'static,
    {
        self.on(
            keys::ANY_VIRTUAL_WRITE,
            move |link: &mut Link, event: &Event<'_>| match event {
                Event::VirtualWrite { pin, values } => handler(link, pin, values),
                _ => Ok(()),
            },
        )
    }

    /// Called when the app reads virtual pin `pin`; answer with `link.virtual_write`
    pub fn on_virtual_read<P, F>(&mut self, pin: P, mut handler: F) -> Option<Box<dyn Handler>>
    where
        P: Display,
        F: FnMut(&mut Link) -> HandlerResult + Send + 'static,
    {
        self.on(
            keys::virtual_read(pin),
            move |link: &mut Link, event: &Event<'_>| match event {
                Event::VirtualRead { .. } => handler(link),
                _ => Ok(()),
            },
        )
    }

    /// Called with the pin of every virtual pin read
    pub fn on_any_virtual_read<F>(&mut self, mut handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut(&mut Link, &str) -> HandlerResult + Send + 'static,
    {
        self.on(
            keys::ANY_VIRTUAL_READ,
            move |link: &mut Link, event: &Event<'_>| match event {
                Event::VirtualRead { pin } => handler(link, pin),
                _ => Ok(()),
            },
        )
    }

    /// Called with the values of internal messages for `key`, e.g. `"rtc"`
    pub fn on_internal<F>(&mut self, key: &str, mut handler: F) -> Option<Box<dyn Handler>>
    where
        F: FnMut(&mut Link, &[String]) -> HandlerResult + Send + 'static,
    {
        self.on(
            keys::internal(key),
            move |link: &mut Link, event: &Event<'_>| match event {
                Event::Internal { values, .. } => handler(link, values),
                _ => Ok(()),
            },
        )
    }

    /// Invokes the handler for `key`, if any. Returns whether one was registered.
    ///
    /// A handler error or panic is logged and swallowed.
    pub fn emit(&mut self, key: &str, link: &mut Link, event: &Event<'_>) -> bool {
        let Some(handler) = self.handlers.get_mut(key) else {
            return false;
        };
        debug!(key, ?event, "emitting event");
        match panic::catch_unwind(AssertUnwindSafe(|| handler.call(link, event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "handler failed"),
            Err(_) => error!(key, "handler panicked"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameCodec;
    use std::sync::{Arc, Mutex};

    fn link() -> Link {
        let mut link = Link::new(FrameCodec::default());
        link.reset(0);
        link
    }

    #[test]
    fn test_replace_on_reregister() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();

        let log = calls.clone();
        assert!(registry
            .on_virtual_write(1, move |_, _| {
                log.lock().unwrap().push("first");
                Ok(())
            })
            .is_none());
        let log = calls.clone();
        assert!(registry
            .on_virtual_write(1, move |_, _| {
                log.lock().unwrap().push("second");
                Ok(())
            })
            .is_some());
        assert_eq!(registry.len(), 1);

        let values = vec!["1".to_string()];
        let event = Event::VirtualWrite { pin: "1", values: &values };
        assert!(registry.emit("V1", &mut link(), &event));
        assert_eq!(*calls.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_missing_handler() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.emit("V9", &mut link(), &Event::VirtualRead { pin: "9" }));
    }

    #[test]
    fn test_handler_error_and_panic_are_contained() {
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(1, |_| Err("sensor offline".into()));
        registry.on_virtual_read(2, |_| panic!("boom"));
        registry.on_virtual_read(3, |link| {
            link.virtual_write(3, ["ok"])?;
            Ok(())
        });

        let mut link = link();
        assert!(registry.emit("readV1", &mut link, &Event::VirtualRead { pin: "1" }));
        assert!(registry.emit("readV2", &mut link, &Event::VirtualRead { pin: "2" }));
        assert!(registry.emit("readV3", &mut link, &Event::VirtualRead { pin: "3" }));
        assert!(!link.pending().is_empty());
    }

    #[test]
    fn test_typed_helpers_use_expected_keys() {
        let mut registry = HandlerRegistry::new();
        registry.on_connected(|_, _| Ok(()));
        registry.on_disconnected(|| Ok(()));
        registry.on_virtual_write(3, |_, _| Ok(()));
        registry.on_any_virtual_write(|_, _, _| Ok(()));
        registry.on_virtual_read(4, |_| Ok(()));
        registry.on_any_virtual_read(|_, _| Ok(()));
        registry.on_internal("rtc", |_, _| Ok(()));

        for key in ["connected", "disconnected", "V3", "V*", "readV4", "readV*", "int_rtc"] {
            assert!(registry.contains(key), "missing {}", key);
        }
        assert!(registry.remove("V3").is_some());
        assert!(!registry.contains("V3"));
    }

    #[test]
    fn test_connected_latency_passed() {
        let seen = Arc::new(Mutex::new(None));
        let mut registry = HandlerRegistry::new();
        let slot = seen.clone();
        registry.on_connected(move |_, latency| {
            *slot.lock().unwrap() = Some(latency);
            Ok(())
        });
        let event = Event::Connected { latency: Duration::from_millis(35) };
        registry.emit(keys::CONNECTED, &mut link(), &event);
        assert_eq!(*seen.lock().unwrap(), Some(Duration::from_millis(35)));
    }
}
