use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::events::bus::EventBus;
use crate::types::{EventType, ExportEvent};

/// Collects every event published on a bus, in emission order.
///
/// Dispatch on the bus is synchronous, so by the time an export call has
/// returned, all of its events are visible on the collector.
#[derive(Clone)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<ExportEvent>>>,
}

impl EventCollector {
    /// Attaches a fresh collector to the given bus.
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let collected = events.clone();
        bus.on_any(move |event: &ExportEvent| {
            collected.lock().unwrap().push(event.clone());
        });

        Self { events }
    }

    /// Returns all collected events in emission order.
    pub fn events(&self) -> Vec<ExportEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the collected event types in emission order.
    pub fn event_types(&self) -> Vec<EventType> {
        self.events().iter().map(ExportEvent::event_type).collect()
    }

    /// Returns the collected event types without the per query noise.
    pub fn table_event_types(&self) -> Vec<EventType> {
        self.event_types()
            .into_iter()
            .filter(|event_type| {
                !matches!(
                    event_type,
                    EventType::SqlExecutionStarted | EventType::SqlExecutionEnded
                )
            })
            .collect()
    }

    /// Returns the row indexes reported by progress events, in order.
    pub fn progress_indexes(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExportEvent::TableExportProgress(progress) => Some(progress.current_row_index),
                _ => None,
            })
            .collect()
    }
}

pub fn group_events_by_type(events: &[ExportEvent]) -> HashMap<EventType, Vec<ExportEvent>> {
    let mut grouped = HashMap::new();
    for event in events {
        let event_type = EventType::from(event);
        grouped
            .entry(event_type)
            .or_insert_with(Vec::new)
            .push(event.clone());
    }

    grouped
}

pub fn check_events_count(events: &[ExportEvent], conditions: Vec<(EventType, u64)>) -> bool {
    let grouped_events = group_events_by_type(events);

    conditions.into_iter().all(|(event_type, count)| {
        grouped_events
            .get(&event_type)
            .map(|inner| inner.len() == count as usize)
            .unwrap_or(false)
    })
}
