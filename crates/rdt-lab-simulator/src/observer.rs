use rdt_lab_abstract::{LinkFate, SessionEvent, SessionObserver, TimerAction};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A compact textual summary of one session event for later inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkEventSummary {
    /// Milliseconds since the recorder was created.
    pub time: u64,
    pub description: String,
}

/// Forwards every event to `tracing`, at a level matching how unusual it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Link {
                fate: LinkFate::Queued { .. },
                ..
            } => debug!("{event}"),
            SessionEvent::Link { .. } => warn!("{event}"),
            SessionEvent::Timer(TimerAction::Expired) => warn!("{event}"),
            SessionEvent::Timer(_) => debug!("{event}"),
            _ => info!("{event}"),
        }
    }
}

/// Keeps a timestamped log of everything observed.
#[derive(Debug)]
pub struct EventRecorder {
    start: Instant,
    events: Mutex<Vec<LinkEventSummary>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Vec<LinkEventSummary> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionObserver for EventRecorder {
    fn on_event(&self, event: &SessionEvent) {
        let summary = LinkEventSummary {
            time: self.start.elapsed().as_millis() as u64,
            description: event.to_string(),
        };
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(summary);
    }
}

/// Broadcasts each event to several observers in registration order.
#[derive(Default, Clone)]
pub struct Fanout {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl Fanout {
    pub fn push(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }
}

impl SessionObserver for Fanout {
    fn on_event(&self, event: &SessionEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
