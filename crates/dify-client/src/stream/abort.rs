use tokio::sync::watch;

/// Handle used to request cancellation of a streaming call.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side of an [`AbortHandle`], passed to a `*_with_abort` call.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    /// Creates a connected handle/signal pair.
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx }, AbortSignal { rx })
    }

    /// Requests cancellation.
    ///
    /// The streaming call stops before reading its next frame and returns
    /// `StreamEnd::Cancelled`. A callback already running is not interrupted.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort was requested. Never resolves if every handle was
    /// dropped without aborting.
    pub(crate) async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn aborted_resolves_after_abort() {
        let (handle, mut signal) = AbortHandle::new();
        assert!(!signal.is_aborted());
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), signal.aborted())
            .await
            .expect("abort observed");
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn dropped_handle_never_aborts() {
        let (handle, mut signal) = AbortHandle::new();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.aborted()).await;
        assert!(waited.is_err());
    }
}
