//! Loading indicator.
//!
//! Fetch chains hold a [`LoadingGuard`] for their whole duration. The
//! indicator shows while at least one guard is alive, so it is hidden again
//! however the chain ends. Each show and hide is published as a spinner
//! command to subscribers as it happens, ahead of the chain's own result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use signpost::MapCommand;

const EVENT_CAPACITY: usize = 64;

/// Counts the fetch chains in flight.
#[derive(Debug)]
pub struct LoadingIndicator {
    active: AtomicUsize,
    events: broadcast::Sender<MapCommand>,
}

impl Default for LoadingIndicator {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            active: AtomicUsize::new(0),
            events,
        }
    }
}

impl LoadingIndicator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Show the indicator until the returned guard is dropped.
    pub fn start(self: &Arc<Self>, label: &str) -> LoadingGuard {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            tracing::debug!("Loading started: {label}");
            self.emit(MapCommand::StartSpinner);
        }
        LoadingGuard {
            indicator: Arc::clone(self),
            label: label.to_string(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.active() > 0
    }

    /// Number of chains currently holding a guard.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Receive spinner commands from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MapCommand> {
        self.events.subscribe()
    }

    fn emit(&self, command: MapCommand) {
        // No subscribers is fine.
        let _ = self.events.send(command);
    }
}

/// Keeps the loading indicator visible while alive.
#[derive(Debug)]
pub struct LoadingGuard {
    indicator: Arc<LoadingIndicator>,
    label: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let previous = self.indicator.active.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            tracing::debug!("Loading finished: {}", self.label);
            self.indicator.emit(MapCommand::StopSpinner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_chain(indicator: &Arc<LoadingIndicator>) -> Result<(), String> {
        let _guard = indicator.start("dataset");
        assert!(indicator.is_loading());
        Err("boundary fetch failed".to_string())
    }

    #[test]
    fn test_guard_brackets_chain() {
        let indicator = LoadingIndicator::new();
        assert!(!indicator.is_loading());

        {
            let _outer = indicator.start("choropleth");
            let inner = indicator.start("dataset");
            assert_eq!(indicator.active(), 2);
            drop(inner);
            assert!(indicator.is_loading());
        }
        assert!(!indicator.is_loading());
    }

    #[test]
    fn test_guard_released_on_error() {
        let indicator = LoadingIndicator::new();
        let mut events = indicator.subscribe();

        assert!(failing_chain(&indicator).is_err());
        assert_eq!(indicator.active(), 0);
        assert_eq!(events.try_recv().unwrap(), MapCommand::StartSpinner);
        assert_eq!(events.try_recv().unwrap(), MapCommand::StopSpinner);
    }

    #[test]
    fn test_overlapping_chains_show_spinner_once() {
        let indicator = LoadingIndicator::new();
        let mut events = indicator.subscribe();

        let first = indicator.start("dataset");
        let second = indicator.start("choropleth");
        drop(first);
        drop(second);

        assert_eq!(events.try_recv().unwrap(), MapCommand::StartSpinner);
        assert_eq!(events.try_recv().unwrap(), MapCommand::StopSpinner);
        assert!(events.try_recv().is_err());
    }
}
