//! Subscriber registry with synchronous, in-order fan-out.
//!
//! Emit invokes every handler inline, in subscription order, before the
//! mutating call returns. There is no queue and no deferred processing:
//! the engine is single-writer and events must interleave exactly with
//! state transitions.

use super::events::{Event, EventHandler};

/// Handle returned by subscribe, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub struct EventBus {
    handlers: Vec<(HandlerId, Box<dyn EventHandler>)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add(&mut self, handler: Box<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    pub fn remove(&mut self, id: HandlerId) -> Option<Box<dyn EventHandler>> {
        let pos = self.handlers.iter().position(|(hid, _)| *hid == id)?;
        Some(self.handlers.remove(pos).1)
    }

    pub fn emit(&mut self, event: &Event) {
        for (_, handler) in self.handlers.iter_mut() {
            handler.handle(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
