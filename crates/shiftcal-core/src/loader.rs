use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::datetime::DayRange;
use crate::event::EventRow;
use crate::store::EventStore;

#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: u64,
    pub range: DayRange,
    pub result: anyhow::Result<Vec<EventRow>>,
}

/// Background event fetches. Each request aborts the previous task and makes
/// its generation stale, so a late result never overwrites a newer window.
/// Fetch starts are spaced at least `throttle` apart.
pub struct EventLoader {
    store: Arc<dyn EventStore>,
    runtime: Handle,
    throttle: Duration,
    generation: u64,
    scheduled_start: Option<Instant>,
    in_flight: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<LoadOutcome>,
    rx: mpsc::UnboundedReceiver<LoadOutcome>,
}

impl std::fmt::Debug for EventLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoader")
            .field("throttle", &self.throttle)
            .field("generation", &self.generation)
            .field("loading", &self.is_loading())
            .finish()
    }
}

impl EventLoader {
    pub fn new(store: Arc<dyn EventStore>, runtime: Handle, throttle: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            runtime,
            throttle,
            generation: 0,
            scheduled_start: None,
            in_flight: None,
            tx,
            rx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    #[tracing::instrument(skip(self, range), fields(range = %range))]
    pub fn request(&mut self, range: DayRange) -> u64 {
        let aborted = self.abort_in_flight();
        self.generation += 1;
        let generation = self.generation;

        let now = Instant::now();
        let start_at = match self.scheduled_start {
            // The superseded fetch never started; take over its slot.
            Some(previous) if aborted && previous > now => previous,
            Some(previous) => (previous + self.throttle).max(now),
            None => now,
        };
        self.scheduled_start = Some(start_at);
        debug!(
            generation,
            delay_ms = start_at.saturating_duration_since(now).as_millis() as u64,
            "scheduled event fetch"
        );

        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        self.in_flight = Some(self.runtime.spawn(async move {
            tokio::time::sleep_until(start_at).await;
            let result = tokio::task::spawn_blocking(move || store.query(range))
                .await
                .unwrap_or_else(|err| Err(anyhow!("event query task failed: {err}")));
            if tx
                .send(LoadOutcome {
                    generation,
                    range,
                    result,
                })
                .is_err()
            {
                trace!(generation, "loader dropped before fetch finished");
            }
        }));

        generation
    }

    /// Drops whatever is pending; outcomes already queued become stale.
    #[tracing::instrument(skip(self))]
    pub fn cancel(&mut self) {
        if self.abort_in_flight() {
            debug!(generation = self.generation, "cancelled event fetch");
        }
        self.generation += 1;
    }

    /// Next outcome of the current generation, without waiting.
    pub fn try_next(&mut self) -> Option<LoadOutcome> {
        while let Ok(outcome) = self.rx.try_recv() {
            if let Some(outcome) = self.accept(outcome) {
                return Some(outcome);
            }
        }
        None
    }

    pub async fn next(&mut self) -> Option<LoadOutcome> {
        while let Some(outcome) = self.rx.recv().await {
            if let Some(outcome) = self.accept(outcome) {
                return Some(outcome);
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if outcome.generation != self.generation {
            debug!(
                stale = outcome.generation,
                current = self.generation,
                "discarding stale fetch result"
            );
            return None;
        }
        self.in_flight = None;
        Some(outcome)
    }

    fn abort_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(task) if !task.is_finished() => {
                task.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for EventLoader {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}
