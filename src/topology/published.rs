use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OnceCell, watch};

use crate::topology::Detection;

/// One-shot detection result plus its watch channel.
///
/// Exactly one caller runs the detection; every other caller waits for the
/// value it produces. If that caller is dropped before finishing, the next
/// waiter takes over, so the result is always eventually published.
pub struct DetectionState {
    running: AtomicUsize,
    cell: OnceCell<Arc<Detection>>,
    tx: watch::Sender<Option<Arc<Detection>>>,
}

impl Default for DetectionState {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            running: AtomicUsize::new(0),
            cell: OnceCell::new(),
            tx,
        }
    }
}

/// Counts a detection run for as long as it is alive.
struct RunGuard<'a>(&'a AtomicUsize);

impl<'a> RunGuard<'a> {
    fn enter(running: &'a AtomicUsize) -> Self {
        running.fetch_add(1, Ordering::AcqRel);
        Self(running)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the published detection, running `run` if none exists yet.
    ///
    /// `run` is invoked by at most one caller at a time and never again once a
    /// value is published.
    pub(crate) async fn get_or_publish<F, Fut>(&self, run: F) -> Arc<Detection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Detection>,
    {
        let detection = self
            .cell
            .get_or_init(|| async move {
                let _running = RunGuard::enter(&self.running);
                let detection = Arc::new(run().await);
                self.tx.send_replace(Some(Arc::clone(&detection)));
                detection
            })
            .await;
        Arc::clone(detection)
    }

    /// A detection is running or has been published.
    pub fn is_started(&self) -> bool {
        self.running.load(Ordering::Acquire) > 0 || self.tx.borrow().is_some()
    }

    pub fn current(&self) -> Option<Arc<Detection>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Detection>>> {
        self.tx.subscribe()
    }

    /// Wait until a detection has been published.
    pub async fn wait(&self) -> Option<Arc<Detection>> {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::topology::{DeploymentMode, DetectionSource};

    fn placeholder() -> Detection {
        Detection {
            mode: DeploymentMode::Standalone,
            source: DetectionSource::StandalonePlaceholder,
            agents: Vec::new().into(),
            selected: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn runs_once_and_waiters_share_the_value() {
        let state = Arc::new(DetectionState::new());
        assert!(!state.is_started());
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait().await })
        };

        let runs = &AtomicUsize::new(0);
        let first = state
            .get_or_publish(|| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                placeholder()
            })
            .await;
        let second = state
            .get_or_publish(|| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                placeholder()
            })
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(state.is_started());
        let seen = waiter.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&seen, &first));
        assert!(state.current().is_some());
    }

    #[tokio::test]
    async fn dropped_run_hands_over_to_the_next_caller() {
        let state = DetectionState::new();

        let stalled = tokio::time::timeout(
            Duration::from_millis(50),
            state.get_or_publish(|| async {
                std::future::pending::<()>().await;
                placeholder()
            }),
        )
        .await;
        assert!(stalled.is_err());
        assert!(!state.is_started());
        assert!(state.current().is_none());

        let detection = tokio::time::timeout(
            Duration::from_secs(1),
            state.get_or_publish(|| async { placeholder() }),
        )
        .await
        .unwrap();
        assert_eq!(detection.source, DetectionSource::StandalonePlaceholder);
        assert!(state.is_started());
    }
}
