//! Circuit breaker for outbound dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are recorded
//! - Open: dependency assumed down, calls fail fast without invoking the action
//! - Half-Open: a single trial call decides whether to close again
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate > threshold after min_samples calls,
//!                or any single call exceeding the timeout
//! Open → Half-Open: next call after reset_timeout has elapsed
//! Half-Open → Closed: trial call succeeds (rolling counters reset)
//! Half-Open → Open: trial call fails (reset_timeout restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected action (not global), process-local
//! - Timed-out actions are detached, not cancelled: they may still finish
//!   downstream after the caller has been told they failed
//! - Single trial in Half-Open; concurrent callers are rejected as Open

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::BreakerSettings;
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Lifecycle notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerEventKind {
    Open,
    HalfOpen,
    Close,
    Fallback,
}

/// A lifecycle notification emitted by a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    pub breaker: String,
    pub kind: BreakerEventKind,
}

/// Tuning for a single breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    pub timeout: Duration,
    pub error_threshold_pct: f64,
    pub reset_timeout: Duration,
    pub min_samples: u32,
    pub rolling_window: Duration,
    pub rolling_buckets: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig::from(&BreakerSettings::default())
    }
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(s: &BreakerSettings) -> Self {
        Self {
            timeout: Duration::from_millis(s.timeout_ms),
            error_threshold_pct: s.error_threshold_pct,
            reset_timeout: Duration::from_millis(s.reset_timeout_ms),
            min_samples: s.min_samples,
            rolling_window: Duration::from_millis(s.rolling_window_ms),
            rolling_buckets: s.rolling_buckets.max(1),
        }
    }
}

/// Errors surfaced by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the action was not invoked.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The action did not finish within the configured timeout.
    #[error("circuit breaker '{name}': action timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The detached action task was cancelled by the runtime.
    #[error("circuit breaker '{name}': action aborted")]
    Aborted { name: String },

    /// The action itself failed.
    #[error("{0}")]
    Action(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The action's own error, if that is what failed.
    pub fn into_action_error(self) -> Option<E> {
        match self {
            BreakerError::Action(e) => Some(e),
            _ => None,
        }
    }
}

/// Counters reported by the health surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    /// Successes in the rolling window.
    pub success_count: u64,
    /// Failures (timeouts included) in the rolling window.
    pub failure_count: u64,
    /// Timeouts since start.
    pub timeout_count: u64,
    /// Calls rejected while open since start.
    pub reject_count: u64,
    /// Fallbacks served since start.
    pub fallback_count: u64,
}

/// Point-in-time status of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub opened: bool,
    /// Milliseconds since the Unix epoch of the last state change.
    pub last_transition_at_ms: u64,
    pub stats: BreakerStats,
}

#[derive(Debug)]
struct Bucket {
    started: Instant,
    successes: u64,
    failures: u64,
}

/// Outcome counts over a sliding time window, kept in fixed-width buckets.
#[derive(Debug)]
struct RollingWindow {
    buckets: VecDeque<Bucket>,
    window: Duration,
    bucket_width: Duration,
}

impl RollingWindow {
    fn new(window: Duration, buckets: u32) -> Self {
        Self {
            buckets: VecDeque::with_capacity(buckets as usize + 1),
            window,
            bucket_width: window / buckets.max(1),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started) >= self.window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&mut self, now: Instant) -> &mut Bucket {
        self.prune(now);
        let fresh = match self.buckets.back() {
            Some(b) => now.duration_since(b.started) >= self.bucket_width,
            None => true,
        };
        if fresh {
            self.buckets.push_back(Bucket {
                started: now,
                successes: 0,
                failures: 0,
            });
        }
        // Non-empty: a bucket was pushed above if there was none.
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn record(&mut self, now: Instant, success: bool) {
        let bucket = self.current(now);
        if success {
            bucket.successes += 1;
        } else {
            bucket.failures += 1;
        }
    }

    fn totals(&mut self, now: Instant) -> (u64, u64) {
        self.prune(now);
        self.buckets
            .iter()
            .fold((0, 0), |(s, f), b| (s + b.successes, f + b.failures))
    }

    fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: RollingWindow,
    opened_at: Option<Instant>,
    last_transition_at: SystemTime,
    trial_in_flight: bool,
    timeouts: u64,
    rejects: u64,
    fallbacks: u64,
}

/// Failure-rate circuit breaker around asynchronous actions.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BreakerEvent>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let window = RollingWindow::new(config.rolling_window, config.rolling_buckets);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                last_transition_at: SystemTime::now(),
                trial_in_flight: false,
                timeouts: 0,
                rejects: 0,
                fallbacks: 0,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Receive lifecycle notifications (`open`, `half_open`, `close`, `fallback`).
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Snapshot for health checks.
    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.lock();
        let (successes, failures) = inner.window.totals(Instant::now());
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            opened: inner.state == CircuitState::Open,
            last_transition_at_ms: inner
                .last_transition_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            stats: BreakerStats {
                success_count: successes,
                failure_count: failures,
                timeout_count: inner.timeouts,
                reject_count: inner.rejects,
                fallback_count: inner.fallbacks,
            },
        }
    }

    /// Run `action` through the breaker.
    ///
    /// The action is only invoked when the circuit admits the call. It runs as a
    /// detached task, so hitting the timeout reports a failure to the caller while
    /// the underlying work may still complete. Callers protecting non-idempotent
    /// side effects must not blindly retry on [`BreakerError::Timeout`].
    pub async fn call<F, Fut, T, E>(&self, action: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self.admit().ok_or_else(|| BreakerError::Open {
            name: self.name.clone(),
        })?;

        let handle = tokio::spawn(action());

        match tokio::time::timeout(self.config.timeout, handle).await {
            Ok(Ok(Ok(value))) => {
                permit.succeed();
                Ok(value)
            }
            Ok(Ok(Err(e))) => {
                permit.fail(false);
                Err(BreakerError::Action(e))
            }
            Ok(Err(join_err)) => {
                permit.fail(false);
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                Err(BreakerError::Aborted {
                    name: self.name.clone(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    breaker = %self.name,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Protected call timed out; it may still complete downstream"
                );
                permit.fail(true);
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    /// Count a fallback served on behalf of this breaker.
    pub fn record_fallback(&self) {
        self.lock().fallbacks += 1;
        metrics::record_breaker_call(&self.name, "fallback");
        tracing::debug!(breaker = %self.name, "Serving fallback");
        self.emit(BreakerEventKind::Fallback);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Some(Permit::new(self, false)),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Some(Permit::new(self, true))
                } else {
                    self.reject(&mut inner);
                    None
                }
            }
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                self.reject(&mut inner);
                None
            }
        }
    }

    fn reject(&self, inner: &mut Inner) {
        inner.rejects += 1;
        metrics::record_breaker_call(&self.name, "rejected");
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.window.record(Instant::now(), true);
        metrics::record_breaker_call(&self.name, "success");

        if trial && inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
            inner.window.reset();
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn on_failure(&self, trial: bool, timed_out: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.window.record(now, false);
        if timed_out {
            inner.timeouts += 1;
        }
        metrics::record_breaker_call(&self.name, if timed_out { "timeout" } else { "failure" });

        let state = inner.state;
        match state {
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner, now);
            }
            CircuitState::Closed => {
                if timed_out {
                    self.open(&mut inner, now);
                    return;
                }
                let (successes, failures) = inner.window.totals(now);
                let total = successes + failures;
                if total >= u64::from(self.config.min_samples) {
                    let failure_pct = failures as f64 * 100.0 / total as f64;
                    if failure_pct > self.config.error_threshold_pct {
                        self.open(&mut inner, now);
                    }
                }
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        inner.opened_at = Some(now);
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition_at = SystemTime::now();

        match to {
            CircuitState::Open => tracing::warn!(breaker = %self.name, from = from.as_str(), "Circuit opened"),
            CircuitState::HalfOpen => tracing::info!(breaker = %self.name, "Circuit half-open, allowing trial call"),
            CircuitState::Closed => tracing::info!(breaker = %self.name, from = from.as_str(), "Circuit closed"),
        }
        metrics::record_breaker_transition(&self.name, to.as_str());

        self.emit(match to {
            CircuitState::Open => BreakerEventKind::Open,
            CircuitState::HalfOpen => BreakerEventKind::HalfOpen,
            CircuitState::Closed => BreakerEventKind::Close,
        });
    }

    fn emit(&self, kind: BreakerEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(BreakerEvent {
            breaker: self.name.clone(),
            kind,
        });
    }
}

/// Admission ticket for a single call; settles the outcome exactly once.
///
/// Dropping an unsettled trial permit (the caller's future was dropped) frees the
/// half-open slot so the next caller can probe.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self, timed_out: bool) {
        self.settled = true;
        self.breaker.on_failure(self.trial, timed_out);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

type ActionFn<Req, T, E> = Arc<dyn Fn(Req) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type FallbackFn<Req, T, E> = Arc<dyn Fn(Req, &BreakerError<E>) -> T + Send + Sync>;

/// An action bound to its breaker, with an optional registered fallback.
///
/// A registered fallback is always preferred over surfacing an error.
pub struct ProtectedAction<Req, T, E> {
    breaker: Arc<CircuitBreaker>,
    action: ActionFn<Req, T, E>,
    fallback: Option<FallbackFn<Req, T, E>>,
}

impl<Req, T, E> Clone for ProtectedAction<Req, T, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            action: self.action.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<Req, T, E> ProtectedAction<Req, T, E>
where
    Req: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(breaker: Arc<CircuitBreaker>, action: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            breaker,
            action: Arc::new(move |req| action(req).boxed()),
            fallback: None,
        }
    }

    /// Register `fallback(args, error)`, used whenever the call cannot succeed.
    pub fn with_fallback<G>(mut self, fallback: G) -> Self
    where
        G: Fn(Req, &BreakerError<E>) -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn execute(&self, req: Req) -> Result<T, BreakerError<E>> {
        let fallback_args = self.fallback.as_ref().map(|_| req.clone());
        let action = self.action.clone();

        match self.breaker.call(move || action(req)).await {
            Ok(value) => Ok(value),
            Err(err) => match (&self.fallback, fallback_args) {
                (Some(fallback), Some(args)) => {
                    self.breaker.record_fallback();
                    Ok(fallback(args, &err))
                }
                _ => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "payments",
            BreakerConfig {
                timeout: Duration::from_millis(100),
                error_threshold_pct: 50.0,
                reset_timeout: Duration::from_secs(30),
                min_samples: 5,
                rolling_window: Duration::from_secs(10),
                rolling_buckets: 10,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<Boom>> {
        cb.call(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Boom) }
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<u32, BreakerError<Boom>> {
        cb.call(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Boom>(7) }
        })
        .await
    }

    #[tokio::test]
    async fn test_stays_closed_below_min_samples() {
        let cb = breaker();
        let calls = AtomicU32::new(0);

        for _ in 0..4 {
            let err = fail(&cb, &calls).await.unwrap_err();
            assert!(matches!(err, BreakerError::Action(Boom)));
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb, &calls).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_threshold_is_strictly_greater() {
        let cb = breaker();
        let calls = AtomicU32::new(0);

        // 3 successes + 3 failures = 50%, not above the threshold
        for _ in 0..3 {
            succeed(&cb, &calls).await.unwrap();
        }
        for _ in 0..3 {
            fail(&cb, &calls).await.unwrap_err();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb, &calls).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_never_invokes_action() {
        let cb = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            fail(&cb, &calls).await.unwrap_err();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        for _ in 0..10 {
            let err = succeed(&cb, &calls).await.unwrap_err();
            assert!(err.is_open());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(cb.status().stats.reject_count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets() {
        let cb = breaker();
        let calls = AtomicU32::new(0);
        let mut events = cb.subscribe();

        for _ in 0..5 {
            fail(&cb, &calls).await.unwrap_err();
        }
        assert_eq!(events.recv().await.unwrap().kind, BreakerEventKind::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(succeed(&cb, &calls).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(events.recv().await.unwrap().kind, BreakerEventKind::HalfOpen);
        assert_eq!(events.recv().await.unwrap().kind, BreakerEventKind::Close);

        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert!(!status.opened);
        assert_eq!(status.stats.failure_count, 0);
        assert_eq!(status.stats.success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_clock() {
        let cb = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            fail(&cb, &calls).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        let err = fail(&cb, &calls).await.unwrap_err();
        assert!(matches!(err, BreakerError::Action(Boom)));
        assert_eq!(cb.state(), CircuitState::Open);

        // Clock restarted: still rejecting shortly after the failed trial
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(succeed(&cb, &calls).await.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(succeed(&cb, &calls).await.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let cb = Arc::new(breaker());
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            fail(&cb, &calls).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, Boom>(1)
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert!(succeed(&cb, &calls).await.unwrap_err().is_open());

        assert_eq!(slow.await.unwrap().unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_trips_and_action_still_completes() {
        let cb = breaker();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let err = cb
            .call(move || async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, Boom>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().stats.timeout_count, 1);
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst), "detached call should still finish");
    }

    #[tokio::test]
    async fn test_failures_outside_window_are_forgotten() {
        let cb = CircuitBreaker::new(
            "short-window",
            BreakerConfig {
                rolling_window: Duration::from_millis(50),
                rolling_buckets: 5,
                ..BreakerConfig::default()
            },
        );
        let calls = AtomicU32::new(0);
        for _ in 0..4 {
            fail(&cb, &calls).await.unwrap_err();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        fail(&cb, &calls).await.unwrap_err();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.status().stats.failure_count, 1);
    }

    #[tokio::test]
    async fn test_fallback_preferred_over_error() {
        let cb = Arc::new(breaker());
        let mut events = cb.subscribe();
        let action = ProtectedAction::new(cb.clone(), |amount: u32| async move {
            if amount > 100 {
                Err(Boom)
            } else {
                Ok(format!("charged {amount}"))
            }
        })
        .with_fallback(|amount, err| format!("queued {amount} ({err})"));

        assert_eq!(action.execute(10).await.unwrap(), "charged 10");
        assert_eq!(action.execute(500).await.unwrap(), "queued 500 (boom)");
        assert_eq!(events.recv().await.unwrap().kind, BreakerEventKind::Fallback);
        assert_eq!(cb.status().stats.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_fallback_used_while_open() {
        let cb = Arc::new(breaker());
        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let action = ProtectedAction::new(cb.clone(), move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<&'static str, _>(Boom) }
        })
        .with_fallback(|_, err| if err.is_open() { "cached" } else { "degraded" });

        for _ in 0..5 {
            assert_eq!(action.execute(()).await.unwrap(), "degraded");
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(action.execute(()).await.unwrap(), "cached");
        assert_eq!(invoked.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_without_fallback_errors_surface() {
        let cb = Arc::new(breaker());
        let action = ProtectedAction::new(cb, |_: ()| async { Err::<(), _>(Boom) });
        let err = action.execute(()).await.unwrap_err();
        assert_eq!(err.into_action_error(), Some(Boom));
    }
}
