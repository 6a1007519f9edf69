//! Lazy, single-flight initialization of a shared value.
//!
//! `InitGuard` moves through `Uninitialized → Initializing → Ready` or
//! `→ Failed`. Only one caller builds at a time; everyone else waits on the
//! same lock and then either picks up the published value or, if the attempt
//! they were waiting on failed, gets that attempt's error. A failed guard is
//! not stuck: the next caller that arrives afterwards starts a fresh attempt.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::InitError;

/// Observable state of a guard.
#[derive(Debug, Clone)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(InitError),
}

impl InitState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

enum Phase<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
    /// `attempt` is the number of the finished attempt that produced `error`.
    Failed { error: InitError, attempt: u64 },
}

pub struct InitGuard<T> {
    /// Held for the whole of a construction attempt.
    build_lock: tokio::sync::Mutex<()>,
    phase: RwLock<Phase<T>>,
    /// Finished attempts, successful or not.
    finished: AtomicU64,
}

impl<T> Default for InitGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InitGuard<T> {
    pub fn new() -> Self {
        Self {
            build_lock: tokio::sync::Mutex::new(()),
            phase: RwLock::new(Phase::Uninitialized),
            finished: AtomicU64::new(0),
        }
    }

    /// The published value, if construction has succeeded.
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.phase.read().unwrap_or_else(|e| e.into_inner()) {
            Phase::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub fn state(&self) -> InitState {
        match &*self.phase.read().unwrap_or_else(|e| e.into_inner()) {
            Phase::Uninitialized => InitState::Uninitialized,
            Phase::Initializing => InitState::Initializing,
            Phase::Ready(_) => InitState::Ready,
            Phase::Failed { error, .. } => InitState::Failed(error.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    fn set_phase(&self, phase: Phase<T>) {
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Return the published value, building it with `build` if needed.
    ///
    /// `build` runs at most once per attempt, with no other attempt in
    /// flight. If the caller driving an attempt is dropped mid-build the
    /// state stays `Initializing`; the next caller treats it as abandoned and
    /// builds again.
    pub async fn ensure_ready<F, Fut>(&self, build: F) -> Result<Arc<T>, InitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, InitError>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let seen = self.finished.load(Ordering::Acquire);
        let _lock = self.build_lock.lock().await;

        match &*self.phase.read().unwrap_or_else(|e| e.into_inner()) {
            Phase::Ready(value) => return Ok(Arc::clone(value)),
            Phase::Failed { error, attempt } if *attempt > seen => {
                return Err(error.clone());
            }
            Phase::Initializing => {
                tracing::warn!("Previous initialization was abandoned, retrying");
            }
            Phase::Uninitialized | Phase::Failed { .. } => {}
        }

        self.set_phase(Phase::Initializing);
        let attempt = self.finished.load(Ordering::Acquire) + 1;
        tracing::debug!(attempt, "Initialization started");

        let outcome = build().await;
        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                self.set_phase(Phase::Ready(Arc::clone(&value)));
                self.finished.store(attempt, Ordering::Release);
                tracing::info!(attempt, "Initialization complete");
                Ok(value)
            }
            Err(error) => {
                self.set_phase(Phase::Failed {
                    error: error.clone(),
                    attempt,
                });
                self.finished.store(attempt, Ordering::Release);
                tracing::error!(
                    attempt,
                    category = error.category(),
                    error = %error,
                    "Initialization failed"
                );
                Err(error)
            }
        }
    }

    /// Drop the published value and return to `Uninitialized`. Waits for any
    /// in-flight attempt to finish first.
    pub async fn reset(&self) {
        let _lock = self.build_lock.lock().await;
        self.set_phase(Phase::Uninitialized);
        tracing::info!("Initialization state reset");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_construction() {
        let guard = Arc::new(InitGuard::<String>::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = Arc::clone(&guard);
            let builds = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                guard
                    .ensure_ready(|| async {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("agent".to_string())
                    })
                    .await
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert!(guard.is_ready());
    }

    #[tokio::test]
    async fn ready_guard_does_not_rebuild() {
        let guard = InitGuard::<u32>::new();
        let builds = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = guard
                .ensure_ready(|| async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(*value, 7);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(guard.get().as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn waiters_see_failure_then_later_call_retries() {
        let guard = Arc::new(InitGuard::<u32>::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let guard = Arc::clone(&guard);
            let builds = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                guard
                    .ensure_ready(|| async {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(InitError::Config("GOOGLE_API_KEY missing".into()))
                    })
                    .await
            }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.category(), "config");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(matches!(guard.state(), InitState::Failed(_)));
        assert!(guard.get().is_none());

        let value = guard
            .ensure_ready(|| async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(*value, 42);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandoned_attempt_is_retried() {
        let guard = Arc::new(InitGuard::<u32>::new());

        let stuck = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move {
                guard
                    .ensure_ready(|| std::future::pending::<Result<u32, InitError>>())
                    .await
            })
        };
        while !matches!(guard.state(), InitState::Initializing) {
            tokio::task::yield_now().await;
        }
        stuck.abort();
        let _ = stuck.await;

        assert!(matches!(guard.state(), InitState::Initializing));
        let value = guard.ensure_ready(|| async { Ok(1) }).await.unwrap();
        assert_eq!(*value, 1);
    }

    #[tokio::test]
    async fn reset_allows_rebuild() {
        let guard = InitGuard::<u32>::new();
        guard.ensure_ready(|| async { Ok(1) }).await.unwrap();
        guard.reset().await;
        assert!(matches!(guard.state(), InitState::Uninitialized));

        let value = guard.ensure_ready(|| async { Ok(2) }).await.unwrap();
        assert_eq!(*value, 2);
    }
}
