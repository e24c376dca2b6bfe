use std::{pin::Pin, time::Duration};
use tokio::sync::{futures::Notified, Notify};

use super::error::{PlayerError, PlayerResult};

/// Edge-triggered handoff between the background loader and the controller.
///
/// A waiter must [`subscribe`](WakeSignal::subscribe) while it still holds the
/// guild lock it used to observe the empty queue. The loader needs that same
/// lock to append, so every pulse that follows the check reaches the waiter.
/// A pulse with nobody subscribed is dropped.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulse(&self) {
        self.notify.notify_waiters();
    }

    /// Registers interest in the next pulse.
    pub fn subscribe(&self) -> WakeListener<'_> {
        let mut notified = Box::pin(self.notify.notified());
        notified.as_mut().enable();
        WakeListener { notified }
    }
}

pub struct WakeListener<'a> {
    notified: Pin<Box<Notified<'a>>>,
}

impl WakeListener<'_> {
    /// Waits for a pulse; consuming the listener resets the signal for this waiter.
    pub async fn wait(self, bound: Duration) -> PlayerResult<()> {
        tokio::time::timeout(bound, self.notified)
            .await
            .map_err(|_| PlayerError::WaitTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn pulse_without_listener_is_dropped() {
        let signal = WakeSignal::new();
        signal.pulse();

        let listener = signal.subscribe();
        let result = listener.wait(Duration::from_secs(10)).await;

        assert_eq!(result, Err(PlayerError::WaitTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_between_subscribe_and_wait_is_not_lost() {
        let signal = WakeSignal::new();

        let listener = signal.subscribe();
        signal.pulse();

        assert_eq!(listener.wait(Duration::from_secs(10)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_is_delivered_once() {
        let signal = Arc::new(WakeSignal::new());

        let listener = signal.subscribe();
        let pulser = {
            let signal = signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                signal.pulse();
            })
        };
        assert_eq!(listener.wait(Duration::from_secs(10)).await, Ok(()));
        pulser.await.unwrap();

        let second = signal.subscribe();
        assert_eq!(
            second.wait(Duration::from_secs(10)).await,
            Err(PlayerError::WaitTimeout)
        );
    }
}
