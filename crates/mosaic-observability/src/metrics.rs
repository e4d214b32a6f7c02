//! Route transition metrics collected from the page event bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mosaic_core::{PageEvent, PageEventBus, SubscriptionId};
use parking_lot::Mutex;
use serde::Serialize;

/// Point-in-time view of the collected metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Reroute cycles started.
    pub cycles: u64,
    /// Route changes observed.
    pub route_changes: u64,
    /// Locale changes observed.
    pub intl_changes: u64,
    /// Transitions that reached `SlotsSettled`.
    pub settled_transitions: u64,
    /// Duration of the last settled transition (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_settle_us: Option<u64>,
    /// Longest settled transition (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_settle_us: Option<u64>,
    /// Id of the last route entered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_route: Option<String>,
}

impl MetricsSnapshot {
    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Duration of the last settled transition.
    pub fn last_settle(&self) -> Option<Duration> {
        self.last_settle_us.map(Duration::from_micros)
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: MetricsSnapshot,
    pending_since: Option<Instant>,
}

/// Counts page events and times each transition from its first
/// `BeforeRouting` to the following `SlotsSettled`.
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    state: Mutex<State>,
}

impl TransitionMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `bus`.
    pub fn attach(self: &Arc<Self>, bus: &PageEventBus) -> SubscriptionId {
        let weak = Arc::downgrade(self);
        bus.subscribe(move |event| {
            if let Some(metrics) = weak.upgrade() {
                metrics.record(event);
            }
        })
    }

    /// Record one event.
    pub fn record(&self, event: &PageEvent) {
        self.record_at(event, Instant::now());
    }

    fn record_at(&self, event: &PageEvent, now: Instant) {
        let mut state = self.state.lock();
        match event {
            PageEvent::BeforeRouting => {
                state.snapshot.cycles += 1;
                if state.pending_since.is_none() {
                    state.pending_since = Some(now);
                }
            }
            PageEvent::RouteChanged { route_id, .. } => {
                state.snapshot.route_changes += 1;
                state.snapshot.last_route = Some(route_id.clone());
            }
            PageEvent::IntlChanged { .. } => state.snapshot.intl_changes += 1,
            PageEvent::SlotsSettled => {
                if let Some(started) = state.pending_since.take() {
                    let elapsed = now.saturating_duration_since(started).as_micros() as u64;
                    let snapshot = &mut state.snapshot;
                    snapshot.settled_transitions += 1;
                    snapshot.last_settle_us = Some(elapsed);
                    snapshot.max_settle_us = Some(snapshot.max_settle_us.map_or(elapsed, |max| max.max(elapsed)));
                }
            }
            PageEvent::AppChange => {}
        }
    }

    /// Current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Whether a transition is waiting for its slots to settle.
    pub fn in_transition(&self) -> bool {
        self.state.lock().pending_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_changed(id: &str) -> PageEvent {
        PageEvent::RouteChanged {
            previous_url: Some("/".into()),
            url: format!("/{}", id),
            route_id: id.into(),
        }
    }

    #[test]
    fn test_counts_events_from_bus() {
        let bus = PageEventBus::new();
        let metrics = Arc::new(TransitionMetrics::new());
        metrics.attach(&bus);

        bus.emit(route_changed("news"));
        bus.emit(PageEvent::IntlChanged { locale: "ua".into() });
        bus.emit(PageEvent::BeforeRouting);
        bus.emit(PageEvent::AppChange);
        bus.emit(PageEvent::BeforeRouting);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.route_changes, 1);
        assert_eq!(snapshot.intl_changes, 1);
        assert_eq!(snapshot.last_route.as_deref(), Some("news"));
        assert!(metrics.in_transition());
    }

    #[test]
    fn test_times_transition_from_first_cycle() {
        let metrics = TransitionMetrics::new();
        let start = Instant::now();

        metrics.record_at(&PageEvent::BeforeRouting, start);
        metrics.record_at(&PageEvent::BeforeRouting, start + Duration::from_millis(5));
        metrics.record_at(&PageEvent::SlotsSettled, start + Duration::from_millis(20));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.settled_transitions, 1);
        assert_eq!(snapshot.last_settle(), Some(Duration::from_millis(20)));
        assert!(!metrics.in_transition());

        metrics.record_at(&PageEvent::BeforeRouting, start + Duration::from_millis(30));
        metrics.record_at(&PageEvent::SlotsSettled, start + Duration::from_millis(35));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.last_settle_us, Some(5_000));
        assert_eq!(snapshot.max_settle_us, Some(20_000));
    }

    #[test]
    fn test_settle_without_cycle_is_ignored() {
        let metrics = TransitionMetrics::new();

        metrics.record(&PageEvent::SlotsSettled);

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(metrics.snapshot().to_json(), r#"{"cycles":0,"route_changes":0,"intl_changes":0,"settled_transitions":0}"#);
    }

    #[test]
    fn test_detached_collector_is_dropped() {
        let bus = PageEventBus::new();
        let metrics = Arc::new(TransitionMetrics::new());
        metrics.attach(&bus);
        drop(metrics);

        bus.emit(PageEvent::BeforeRouting);
        assert_eq!(bus.listener_count(), 1);
    }
}
