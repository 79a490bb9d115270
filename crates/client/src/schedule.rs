//! Timer-driven background work and stale-response suppression.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// A fixed-period task on the tokio runtime.
///
/// Each tick runs as its own task so a slow tick never delays the timer; overlapping
/// ticks are expected and callers pair this with [`LatestWins`]. Cancelling, or
/// dropping the handle, aborts the timer and every tick still running.
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Must be called from within a tokio runtime. The first tick fires immediately.
    pub fn every<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut running = JoinSet::new();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(event_name = "schedule.tick", task = %task_name, in_flight = running.len(), "scheduled tick");
                        running.spawn(tick());
                    }
                    Some(_) = running.join_next(), if !running.is_empty() => {}
                }
            }
        });

        Self { name, handle: Some(handle) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(event_name = "schedule.cancelled", task = %self.name, "scheduled task cancelled");
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Monotonic request numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn number(&self) -> u64 {
        self.0
    }
}

/// Keeps the response of the most recently issued request.
///
/// Take a ticket before sending; offer the response with it afterwards. A response is
/// applied only if its ticket is newer than the last applied one, so a slow older
/// response can never overwrite fresher state.
#[derive(Debug)]
pub struct LatestWins<T> {
    issued: AtomicU64,
    state: Mutex<Applied<T>>,
}

#[derive(Debug)]
struct Applied<T> {
    ticket: u64,
    value: Option<T>,
}

impl<T: Clone> LatestWins<T> {
    pub fn new() -> Self {
        Self { issued: AtomicU64::new(0), state: Mutex::new(Applied { ticket: 0, value: None }) }
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns whether the value was applied.
    pub fn offer(&self, ticket: Ticket, value: T) -> bool {
        let mut state = self.lock();
        if ticket.0 <= state.ticket {
            debug!(
                event_name = "latest_wins.discarded",
                ticket = ticket.0,
                applied = state.ticket,
                "stale response discarded"
            );
            return false;
        }
        state.ticket = ticket.0;
        state.value = Some(value);
        true
    }

    pub fn current(&self) -> Option<T> {
        self.lock().value.clone()
    }

    pub fn last_applied(&self) -> Option<Ticket> {
        let ticket = self.lock().ticket;
        (ticket > 0).then_some(Ticket(ticket))
    }

    fn lock(&self) -> MutexGuard<'_, Applied<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Clone> Default for LatestWins<T> {
    fn default() -> Self {
        Self::new()
    }
}
