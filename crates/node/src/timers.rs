//! Timer management for the module loops.
//!
//! Each armed timer is a tokio task that sleeps and then delivers the
//! deadline event to the consensus queue. Arming a timer that is already
//! armed replaces it, which is how the pacemaker rolls its deadline on
//! every round entry.

use monsoon_core::{Event, TimerId};
use monsoon_types::View;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Manages the node's armed timers.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    events: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        TimerManager {
            timers: HashMap::new(),
            events,
        }
    }

    /// Arm `id` to fire after `duration`, delivering a timeout for `view`.
    pub fn set(&mut self, id: TimerId, duration: Duration, view: View) {
        self.cancel(id);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(%view, "view deadline fired");
            let _ = events.send(Event::ViewTimeout { view }).await;
        });
        self.timers.insert(id, handle);
    }

    /// Disarm `id`. No-op when not armed or already fired.
    pub fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> View {
        View::genesis()
    }

    #[tokio::test]
    async fn armed_timer_fires_with_its_view() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerManager::new(tx);
        timers.set(TimerId::ViewChange, Duration::from_millis(5), view());

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timer should fire")
            .expect("channel open");
        assert!(matches!(event, Event::ViewTimeout { view: v } if v == view()));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerManager::new(tx);
        timers.set(TimerId::ViewChange, Duration::from_millis(20), view());
        timers.cancel(TimerId::ViewChange);

        let result = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn rearming_replaces_the_deadline() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerManager::new(tx);
        timers.set(TimerId::ViewChange, Duration::from_secs(30), view());
        timers.set(TimerId::ViewChange, Duration::from_millis(5), view());

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("replacement timer should fire quickly")
            .expect("channel open");
        assert!(matches!(event, Event::ViewTimeout { .. }));
    }
}
