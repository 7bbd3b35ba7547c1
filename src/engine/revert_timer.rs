// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot timer for returning to continuous autofocus
//!
//! At most one firing is outstanding. Scheduling cancels the previous task
//! and bumps a generation counter, so a firing that was already queued on
//! the serial worker before the cancel is recognised as stale and ignored.

use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RevertTimer {
    generation: u64,
    pending: Option<AbortHandle>,
}

impl RevertTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending firing and schedule `fire` after `delay`
    ///
    /// `fire` receives the generation it was scheduled with; pass it back to
    /// [`take_if_current`](Self::take_if_current) when it arrives.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation);
        });
        self.pending = Some(task.abort_handle());
        debug!(generation, delay_ms = delay.as_millis() as u64, "Focus hold scheduled");
        generation
    }

    /// Cancel the pending firing, if any
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accept a firing if it belongs to the latest schedule
    pub fn take_if_current(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for RevertTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    const HOLD: Duration = Duration::from_millis(3000);

    type Fired = (u64, Instant);

    fn timer_with_channel() -> (
        RevertTimer,
        mpsc::UnboundedSender<Fired>,
        mpsc::UnboundedReceiver<Fired>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RevertTimer::new(), tx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_fires_once_after_second_schedule() {
        let (mut timer, tx, mut rx) = timer_with_channel();
        let start = Instant::now();

        let sender = tx.clone();
        timer.schedule(HOLD, move |generation| {
            let _ = sender.send((generation, Instant::now()));
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let sender = tx.clone();
        let second = timer.schedule(HOLD, move |generation| {
            let _ = sender.send((generation, Instant::now()));
        });
        drop(tx);

        let (generation, fired_at) = rx.recv().await.unwrap();
        assert_eq!(generation, second);
        assert_eq!(fired_at - start, Duration::from_millis(4000));
        assert!(timer.take_if_current(generation));
        assert!(!timer.is_pending());

        // The first task was aborted, so nothing else ever arrives.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_rejected() {
        let (mut timer, tx, mut rx) = timer_with_channel();
        let first = timer.schedule(HOLD, |_| {});
        let sender = tx.clone();
        let second = timer.schedule(HOLD, move |generation| {
            let _ = sender.send((generation, Instant::now()));
        });
        drop(tx);

        assert!(!timer.take_if_current(first));
        assert!(timer.is_pending());

        let (generation, _) = rx.recv().await.unwrap();
        assert_eq!(generation, second);
        assert!(timer.take_if_current(second));
        assert!(!timer.take_if_current(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (mut timer, tx, mut rx) = timer_with_channel();
        let sender = tx.clone();
        timer.schedule(HOLD, move |generation| {
            let _ = sender.send((generation, Instant::now()));
        });
        drop(tx);

        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(rx.recv().await.is_none());
    }
}
