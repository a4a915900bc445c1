//! Cancellable poll timer.
//!
//! Every wait in a session goes through a `PollTimer`. A tick sleeps for the
//! poll interval unless the host signals shutdown first, in which case the
//! session unwinds with `DkgError::Cancelled`.

use crate::errors::{DkgError, DkgResult};
use std::time::Duration;
use tokio::sync::watch;

/// Sender side of the shutdown signal shared by a host's sessions.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Untriggered signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Timer bound to this signal
    pub fn timer(&self, interval: Duration) -> PollTimer {
        PollTimer {
            interval,
            shutdown: Some(self.tx.subscribe()),
        }
    }

    /// Wake and cancel every timer bound to this signal
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was signalled
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-cadence timer used between ledger polls.
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PollTimer {
    /// Timer that can never be cancelled
    pub fn detached(interval: Duration) -> Self {
        Self {
            interval,
            shutdown: None,
        }
    }

    /// Poll interval slept by [`PollTimer::tick`]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep one interval
    pub async fn tick(&self) -> DkgResult<()> {
        self.sleep(self.interval).await
    }

    /// Sleep for `duration` unless shutdown is signalled first
    pub async fn sleep(&self, duration: Duration) -> DkgResult<()> {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };
        let mut shutdown = shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Err(DkgError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            changed = shutdown.changed() => match changed {
                // Sender dropped: nobody can cancel any more, finish the sleep.
                Err(_) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
                Ok(()) if *shutdown.borrow() => Err(DkgError::Cancelled),
                Ok(()) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_sleeps_one_interval() {
        let timer = PollTimer::detached(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        timer.tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_sleeping_timer() {
        let signal = ShutdownSignal::new();
        let timer = signal.timer(Duration::from_secs(3600));
        let handle = tokio::spawn(async move { timer.tick().await });
        tokio::task::yield_now().await;
        signal.trigger();
        assert_eq!(handle.await.unwrap(), Err(DkgError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggered_signal_fails_fast() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        assert!(signal.is_triggered());
        let start = tokio::time::Instant::now();
        assert_eq!(
            signal.timer(Duration::from_secs(30)).tick().await,
            Err(DkgError::Cancelled)
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_custom_sleep() {
        let signal = ShutdownSignal::new();
        let timer = signal.timer(Duration::from_secs(30));
        let handle = tokio::spawn(async move { timer.sleep(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        signal.trigger();
        assert_eq!(handle.await.unwrap(), Err(DkgError::Cancelled));

        let detached = PollTimer::detached(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        detached.sleep(Duration::from_secs(5)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
