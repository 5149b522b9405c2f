use std::fmt;

use tracing::trace;

use crate::datetime::{DayRange, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    GoTo,
    EventsChanged,
    UpdateTitle,
}

pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::GoTo,
    EventType::EventsChanged,
    EventType::UpdateTitle,
];

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    GoTo {
        selected: Instant,
        animate: bool,
        force_scroll: bool,
    },
    EventsChanged {
        range: Option<DayRange>,
    },
    UpdateTitle {
        title: String,
        range: DayRange,
    },
}

impl ControllerEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ControllerEvent::GoTo { .. } => EventType::GoTo,
            ControllerEvent::EventsChanged { .. } => EventType::EventsChanged,
            ControllerEvent::UpdateTitle { .. } => EventType::UpdateTitle,
        }
    }
}

pub trait EventHandler {
    fn supported_event_types(&self) -> &[EventType] {
        ALL_EVENT_TYPES
    }

    fn handle_event(&mut self, event: &ControllerEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(HandlerId, Box<dyn EventHandler>)>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl EventBus {
    pub fn register(&mut self, handler: Box<dyn EventHandler>) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.push((id, handler));
        id
    }

    pub fn deregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers `event` on the calling thread. Returns how many handlers saw it.
    pub fn send(&mut self, event: &ControllerEvent) -> usize {
        let kind = event.event_type();
        let mut delivered = 0;
        for (id, handler) in &mut self.handlers {
            if !handler.supported_event_types().contains(&kind) {
                continue;
            }
            trace!(handler = ?id, ?kind, "dispatching controller event");
            handler.handle_event(event);
            delivered += 1;
        }
        delivered
    }
}
