//! Cooperative cancellation signal for suspending unit-of-work operations.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::{SessionError, UowError};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation signal.
///
/// All clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal nobody holds a trigger for; convenient for callers without cancellation.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancel every operation observing this signal.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel()` cannot be missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` to completion unless the signal fires first.
    ///
    /// When cancelled, `fut` is dropped before it completes.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, UowError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        if self.is_cancelled() {
            return Err(UowError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(UowError::Cancelled),
            res = fut => res.map_err(UowError::Session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn guard_passes_through_results() {
        let signal = CancelSignal::new();
        let ok = signal.guard(async { Ok::<_, SessionError>(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = signal
            .guard(async { Err::<(), _>(SessionError::Closed) })
            .await
            .unwrap_err();
        assert!(matches!(err, UowError::Session(SessionError::Closed)));
    }

    #[tokio::test]
    async fn already_cancelled_signal_short_circuits() {
        let signal = CancelSignal::new();
        signal.cancel();
        let err = signal
            .guard(async { Ok::<_, SessionError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, UowError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = signal
            .guard(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, SessionError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UowError::Cancelled));
        assert!(signal.is_cancelled());
    }
}
