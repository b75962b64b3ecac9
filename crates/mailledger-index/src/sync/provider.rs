//! Extension providers and expunge handlers.
//!
//! The sync engine doesn't know what extension data means. An
//! [`ExtensionProvider`] tells it which extension names this build
//! understands and supplies an [`ExpungeHandler`] for extensions that need
//! to see a message's data before it disappears.

use std::collections::HashMap;
use std::fmt;

use crate::types::Uid;

/// Callback run for each expunged message that carries an extension slot.
///
/// `record` is the extension's slot for the message, read before the
/// message is removed.
pub trait ExpungeHandler: Send {
    /// Called once per expunged message.
    fn expunge(&mut self, uid: Uid, record: &[u8]);
}

impl<F> ExpungeHandler for F
where
    F: FnMut(Uid, &[u8]) + Send,
{
    fn expunge(&mut self, uid: Uid, record: &[u8]) {
        self(uid, record);
    }
}

/// Source of extension knowledge for a sync pass.
pub trait ExtensionProvider {
    /// Returns true if this build understands the named extension.
    fn is_known(&self, name: &str) -> bool;

    /// Creates an expunge handler for the named extension, if it wants one.
    ///
    /// Called at most once per extension per sync pass.
    fn expunge_handler(&self, name: &str) -> Option<Box<dyn ExpungeHandler>> {
        let _ = name;
        None
    }
}

/// Provider that knows no extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtensions;

impl ExtensionProvider for NoExtensions {
    fn is_known(&self, _name: &str) -> bool {
        false
    }
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn ExpungeHandler> + Send + Sync>;

/// Provider backed by a fixed set of extension names.
#[derive(Default)]
pub struct KnownExtensions {
    names: HashMap<String, Option<HandlerFactory>>,
}

impl KnownExtensions {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an extension as known.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.names.entry(name.into()).or_insert(None);
        self
    }

    /// Marks an extension as known and registers an expunge handler factory.
    #[must_use]
    pub fn with_expunge_handler<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ExpungeHandler> + Send + Sync + 'static,
    {
        self.names.insert(name.into(), Some(Box::new(factory)));
        self
    }
}

impl fmt::Debug for KnownExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("KnownExtensions").field("names", &names).finish()
    }
}

impl ExtensionProvider for KnownExtensions {
    fn is_known(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn expunge_handler(&self, name: &str) -> Option<Box<dyn ExpungeHandler>> {
        self.names.get(name)?.as_ref().map(|factory| factory())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn known_names() {
        let provider = KnownExtensions::new().with("cache").with("modseq");
        assert!(provider.is_known("cache"));
        assert!(!provider.is_known("other"));
        assert!(provider.expunge_handler("cache").is_none());
        assert!(!NoExtensions.is_known("cache"));
    }

    #[test]
    fn handler_factory_runs_per_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let provider = KnownExtensions::new().with_expunge_handler("cache", move || -> Box<dyn ExpungeHandler> {
            let sink = Arc::clone(&sink);
            Box::new(move |uid: Uid, record: &[u8]| {
                sink.lock().unwrap().push((uid.get(), record.to_vec()));
            })
        });

        let mut handler = provider.expunge_handler("cache").unwrap();
        handler.expunge(Uid::new(9).unwrap(), &[1, 2]);
        assert_eq!(*seen.lock().unwrap(), vec![(9, vec![1, 2])]);
    }
}
