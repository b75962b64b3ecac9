//! Per-pass expunge handler registry.
//!
//! Handlers are created from the [`super::provider::ExtensionProvider`] the first
//! time a pass expunges something and dropped when the pass ends. Extensions
//! introduced after that point get no handler for the rest of the pass.

use std::ops::Range;

use super::SyncMapContext;
use super::provider::ExpungeHandler;

pub(crate) struct ExpungeHandlerSlot {
    ext_id: u32,
    name: String,
    handler: Box<dyn ExpungeHandler>,
}

impl SyncMapContext<'_> {
    /// Creates the expunge handlers for every known extension in the map.
    ///
    /// Expunges call this on their own, so a caller only needs it to create
    /// the handlers up front. Does nothing if the handlers already exist or
    /// the pass is a [`crate::SyncHandlerType::View`].
    pub fn init_expunge_handlers(&mut self) {
        if self.expunge_handlers_set {
            return;
        }
        self.expunge_handlers_set = true;
        if !self.handler_type.runs_expunge_handlers() {
            return;
        }

        for (ext_id, ext) in self.map.extensions().iter() {
            if !ext.is_known() {
                continue;
            }
            if let Some(handler) = self.provider.expunge_handler(ext.name()) {
                self.expunge_handlers.push(ExpungeHandlerSlot {
                    ext_id,
                    name: ext.name().to_string(),
                    handler,
                });
            }
        }
        tracing::trace!(count = self.expunge_handlers.len(), "expunge handlers initialized");
    }

    /// Drops the pass's expunge handlers.
    ///
    /// Runs when the pass finishes or the context is dropped. A later
    /// expunge in the same pass creates a fresh set.
    pub fn deinit_expunge_handlers(&mut self) {
        if !self.expunge_handlers_set {
            return;
        }
        if self.expunge_handlers_used {
            let names: Vec<&str> = self.expunge_handlers.iter().map(|slot| slot.name.as_str()).collect();
            tracing::trace!(?names, "expunge handlers finished");
        }
        self.expunge_handlers.clear();
        self.expunge_handlers_set = false;
        self.expunge_handlers_used = false;
    }

    /// Hands the extension slots of the messages at `span` to every handler.
    /// Called before the messages are removed.
    pub(crate) fn run_expunge_handlers(&mut self, span: Range<usize>) {
        self.init_expunge_handlers();
        if self.expunge_handlers.is_empty() {
            return;
        }
        self.expunge_handlers_used = true;

        let map = &self.map;
        for slot in &mut self.expunge_handlers {
            for idx in span.clone() {
                let Some(rec) = map.records().get(idx) else {
                    break;
                };
                let data = map.ext_slot(idx, slot.ext_id).unwrap_or_default();
                slot.handler.expunge(rec.uid, data);
            }
        }
    }
}
