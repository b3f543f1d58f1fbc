//! On-demand endpoint poller.
//!
//! A session polls one endpoint for a fixed iteration budget of
//! `frequency × duration` requests, storing every successful response through
//! the configured [`RecordSink`]. Requests run back to back: no pacing is
//! applied between iterations.
//!
//! Architecture:
//! - [`PollController`] owns the session state and the loop's task handle
//! - Session state lives behind a lock that is never held across network or
//!   storage calls, so `status()` never waits on I/O
//! - The loop checks its cancellation token once per iteration; an in-flight
//!   request is never interrupted
//! - Every session carries a generation number; a loop only touches state of
//!   its own generation, so a slow loop from an earlier session cannot clear a
//!   newer one

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::services::fetcher::{HttpFetcher, FETCH_TIMEOUT};
use crate::services::sink::RecordSink;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long `stop()` waits for the loop to exit before leaving it to finish
/// on its own.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// A session is running, or a stopped session is still draining.
    #[error("Already polling")]
    AlreadyActive,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to stop polling: {0}")]
    StopFailed(String),
}

// ---------------------------------------------------------------------------
// Session state (in-memory, shared between controller and loop)
// ---------------------------------------------------------------------------

/// Poller status, exposed via the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    pub is_active: bool,
    /// Requests per second of duration, as given to start
    pub frequency: u32,
    /// Seconds until the session's end time; 0 when inactive
    pub remaining_time: u64,
    /// Iteration most recently begun (1-based)
    pub current_iteration: u64,
    /// Iteration budget of the current or last session
    pub total_iterations: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    is_active: bool,
    frequency: u32,
    end_time: Option<DateTime<Utc>>,
    generation: u64,
    current_iteration: u64,
    total_iterations: u64,
}

impl SessionState {
    /// Activate a new session and return its generation.
    fn begin(&mut self, plan: &SessionPlan) -> u64 {
        self.generation += 1;
        self.is_active = true;
        self.frequency = plan.frequency;
        self.end_time = Some(plan.end_time);
        self.current_iteration = 0;
        self.total_iterations = plan.budget;
        self.generation
    }

    /// Record that `iteration` has begun. Ignored for stale generations.
    fn advance(&mut self, generation: u64, iteration: u64) {
        if self.generation == generation && self.is_active {
            self.current_iteration = iteration;
        }
    }

    /// Deactivate the session if it is still `generation`. Returns whether
    /// this call performed the transition.
    fn finish(&mut self, generation: u64) -> bool {
        if self.generation != generation || !self.is_active {
            return false;
        }
        self.is_active = false;
        true
    }

    /// Unconditional deactivation, used by `stop()`.
    fn deactivate(&mut self) {
        self.is_active = false;
    }

    fn snapshot(&self, now: DateTime<Utc>) -> PollerStatus {
        let remaining_time = match (self.is_active, self.end_time) {
            (true, Some(end)) => (end - now).num_seconds().max(0) as u64,
            _ => 0,
        };
        PollerStatus {
            is_active: self.is_active,
            frequency: self.frequency,
            remaining_time,
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
        }
    }
}

type SharedSessionState = Arc<RwLock<SessionState>>;

fn read_state(state: &RwLock<SessionState>) -> RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &RwLock<SessionState>) -> RwLockWriteGuard<'_, SessionState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Validated start parameters.
#[derive(Debug, Clone)]
struct SessionPlan {
    endpoint: String,
    frequency: u32,
    budget: u64,
    end_time: DateTime<Utc>,
}

impl SessionPlan {
    fn new(
        endpoint: &str,
        frequency: i64,
        duration: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, PollerError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(PollerError::InvalidParameters(
                "endpoint must not be empty".to_string(),
            ));
        }
        if frequency < 1 {
            return Err(PollerError::InvalidParameters(format!(
                "frequency must be at least 1, got {}",
                frequency
            )));
        }
        if duration < 1 {
            return Err(PollerError::InvalidParameters(format!(
                "duration must be at least 1, got {}",
                duration
            )));
        }

        let frequency_u32 = u32::try_from(frequency).map_err(|_| {
            PollerError::InvalidParameters(format!("frequency {} is too large", frequency))
        })?;
        let budget = (frequency as u64)
            .checked_mul(duration as u64)
            .ok_or_else(|| {
                PollerError::InvalidParameters("frequency × duration overflows".to_string())
            })?;
        let end_time = chrono::Duration::try_seconds(duration)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                PollerError::InvalidParameters(format!("duration {} is too large", duration))
            })?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            frequency: frequency_u32,
            budget,
            end_time,
        })
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The spawned loop of the most recent session.
struct RunningLoop {
    generation: u64,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    /// Fired by the loop's [`SessionGuard`] once it has stopped working.
    finished: CancellationToken,
}

/// Owns the single polling session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PollController {
    state: SharedSessionState,
    control: Arc<Mutex<Option<RunningLoop>>>,
    fetcher: HttpFetcher,
    sink: Arc<dyn RecordSink>,
    fetch_timeout: Duration,
    stop_grace: Duration,
}

impl PollController {
    pub fn new(fetcher: HttpFetcher, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            control: Arc::new(Mutex::new(None)),
            fetcher,
            sink,
            fetch_timeout: FETCH_TIMEOUT,
            stop_grace: STOP_GRACE_PERIOD,
        }
    }

    #[cfg(test)]
    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Start a session polling `endpoint` `frequency × duration` times.
    ///
    /// Returns as soon as the loop is spawned. Concurrent calls are
    /// serialized on the control lock, so at most one of them succeeds. The
    /// lock is never held across loop progress, so this never waits on an
    /// in-flight request.
    pub async fn start(
        &self,
        endpoint: &str,
        frequency: i64,
        duration: i64,
    ) -> Result<(), PollerError> {
        let plan = SessionPlan::new(endpoint, frequency, duration, Utc::now())?;

        let mut control = self.control.lock().await;

        if control
            .as_ref()
            .is_some_and(|running| !running.finished.is_cancelled())
        {
            return Err(PollerError::AlreadyActive);
        }

        let generation = {
            let mut state = write_state(&self.state);
            if state.is_active {
                return Err(PollerError::AlreadyActive);
            }
            state.begin(&plan)
        };

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let session = PollSession {
            endpoint: plan.endpoint.clone(),
            budget: plan.budget,
            generation,
            fetch_timeout: self.fetch_timeout,
            cancel: cancel.clone(),
            finished: finished.clone(),
            state: self.state.clone(),
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
        };

        *control = Some(RunningLoop {
            generation,
            handle: tokio::spawn(poll_loop(session)),
            cancel,
            finished,
        });

        tracing::info!(
            "Polling started: {} ({} × {}s = {} iterations, session {})",
            plan.endpoint,
            plan.frequency,
            duration,
            plan.budget,
            generation
        );
        Ok(())
    }

    /// Cancel the running session, if any, and wait up to the grace period
    /// for the loop to exit. Safe to call when nothing is running.
    ///
    /// The control lock is released while waiting, so a concurrent `start()`
    /// is answered immediately with [`PollerError::AlreadyActive`].
    pub async fn stop(&self) -> Result<(), PollerError> {
        let (generation, finished) = {
            let control = self.control.lock().await;
            write_state(&self.state).deactivate();
            let Some(running) = control.as_ref() else {
                return Ok(());
            };
            running.cancel.cancel();
            (running.generation, running.finished.clone())
        };

        if tokio::time::timeout(self.stop_grace, finished.cancelled())
            .await
            .is_err()
        {
            tracing::warn!(
                "Poll loop did not exit within {:?}; it will finish after its in-flight request",
                self.stop_grace
            );
            return Ok(());
        }

        // Reap the task unless a concurrent stop already did.
        let handle = {
            let mut control = self.control.lock().await;
            if control.as_ref().map(|running| running.generation) != Some(generation) {
                return Ok(());
            }
            match control.take() {
                Some(running) => running.handle,
                None => return Ok(()),
            }
        };

        match handle.await {
            Ok(()) => {
                tracing::info!("Polling stopped");
                Ok(())
            }
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(PollerError::StopFailed(format!("poll loop panicked: {}", e))),
        }
    }

    /// Current session snapshot. Never fails and never waits on I/O.
    pub fn status(&self) -> PollerStatus {
        read_state(&self.state).snapshot(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

struct PollSession {
    endpoint: String,
    budget: u64,
    generation: u64,
    fetch_timeout: Duration,
    cancel: CancellationToken,
    finished: CancellationToken,
    state: SharedSessionState,
    fetcher: HttpFetcher,
    sink: Arc<dyn RecordSink>,
}

/// Clears the session when the loop exits, whether it ran out of budget,
/// was cancelled, or panicked.
struct SessionGuard {
    state: SharedSessionState,
    generation: u64,
    finished: CancellationToken,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if write_state(&self.state).finish(self.generation) {
            tracing::info!("Polling ended (session {})", self.generation);
        }
        self.finished.cancel();
    }
}

async fn poll_loop(session: PollSession) {
    let _guard = SessionGuard {
        state: session.state.clone(),
        generation: session.generation,
        finished: session.finished.clone(),
    };

    tracing::debug!(
        "Poll loop started for {} (session {})",
        session.endpoint,
        session.generation
    );

    let mut stored: u64 = 0;
    let mut skipped: u64 = 0;

    for iteration in 1..=session.budget {
        if session.cancel.is_cancelled() {
            tracing::info!(
                "Poll loop cancelled after {}/{} iterations",
                iteration - 1,
                session.budget
            );
            break;
        }

        write_state(&session.state).advance(session.generation, iteration);

        tracing::debug!(
            "Calling ({}/{}): {}",
            iteration,
            session.budget,
            session.endpoint
        );

        let record = match session
            .fetcher
            .fetch(&session.endpoint, session.fetch_timeout)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    "Poller: request {}/{} to {} failed: {}",
                    iteration,
                    session.budget,
                    session.endpoint,
                    e
                );
                skipped += 1;
                continue;
            }
        };

        match session.sink.insert(&record).await {
            Ok(()) => stored += 1,
            Err(e) => {
                tracing::warn!(
                    "Poller: failed to store response {}/{}: {}",
                    iteration,
                    session.budget,
                    e
                );
                skipped += 1;
            }
        }
    }

    tracing::info!(
        "Poll loop finished for {}: {} stored, {} skipped",
        session.endpoint,
        stored,
        skipped
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
