//! In-memory history of recent application events.
//!
//! Fixed-capacity ring: once full, the oldest entry is overwritten.
//! Periodic telemetry snapshots are not retained so they cannot push
//! fault and relay history out of the window.

use heapless::HistoryBuffer;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

pub const EVENT_LOG_DEPTH: usize = 32;

#[derive(Default)]
pub struct EventLog {
    entries: HistoryBuffer<AppEvent, EVENT_LOG_DEPTH>,
    dropped: u32,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.as_slice().is_empty()
    }

    /// Events overwritten since creation.
    pub fn overwritten(&self) -> u32 {
        self.dropped
    }

    pub fn latest(&self) -> Option<&AppEvent> {
        self.entries.recent()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AppEvent> {
        self.entries.oldest_ordered()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        if matches!(event, AppEvent::Telemetry(_)) {
            return;
        }
        if self.entries.len() == EVENT_LOG_DEPTH {
            self.dropped = self.dropped.saturating_add(1);
        }
        self.entries.write(event.clone());
    }
}

/// Fans one event out to two sinks (e.g. the serial log and the history).
pub struct Tee<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&mut self, event: &AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::TelemetryRecord;
    use crate::error::FaultKind;

    #[test]
    fn keeps_most_recent_events_in_order() {
        let mut log = EventLog::new();
        for n in 0..40u64 {
            log.emit(&AppEvent::ChargeCycleCompleted { cycle_count: n });
        }
        assert_eq!(log.len(), EVENT_LOG_DEPTH);
        assert_eq!(log.overwritten(), 8);
        assert_eq!(
            log.iter().next(),
            Some(&AppEvent::ChargeCycleCompleted { cycle_count: 8 })
        );
        assert_eq!(log.latest(), Some(&AppEvent::ChargeCycleCompleted { cycle_count: 39 }));
    }

    #[test]
    fn telemetry_is_not_retained() {
        let mut log = EventLog::new();
        log.emit(&AppEvent::FaultRaised(FaultKind::OverVoltage));
        log.emit(&AppEvent::Telemetry(TelemetryRecord::default()));
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn tee_feeds_both_sinks() {
        let mut tee = Tee(EventLog::new(), EventLog::new());
        tee.emit(&AppEvent::FreeFall);
        assert_eq!(tee.0.latest(), Some(&AppEvent::FreeFall));
        assert_eq!(tee.1.len(), 1);
    }
}
