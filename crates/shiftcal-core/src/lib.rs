pub mod bus;
pub mod cache;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod error;
pub mod event;
pub mod highlight;
pub mod loader;
pub mod logging;
pub mod normalize;
pub mod scroll;
pub mod store;

pub use bus::{ControllerEvent, EventBus, EventHandler, EventType, HandlerId};
pub use cache::EventCache;
pub use config::CalendarConfig;
pub use controller::{CalendarController, ScrollState};
pub use datetime::{DateMath, DayRange, Instant, JulianDay};
pub use error::{CalendarError, CalendarResult};
pub use event::{CalendarEvent, Event, EventId, EventRow, Fragment};
pub use highlight::{MonthChange, MonthHighlightState, MonthHighlightTracker, ScrollSample};
pub use loader::{EventLoader, LoadOutcome};
pub use normalize::{Normalized, normalize};
pub use scroll::{ScrollDecision, ScrollPositionResolver, VisibleWindow};
pub use store::{EventStore, JsonlEventStore, MemoryEventStore};
