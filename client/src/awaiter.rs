//! Polling-based observation of a run until it reaches a terminal status.

use std::time::Duration;

use exosphere_types::{Run, RunId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::ExosphereClient;
use crate::error::ClientError;

/// Poll intervals below this are raised to it, bounding the request rate
/// regardless of caller input.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60 * 60);

/// Callback invoked with every polled snapshot, terminal one included.
pub type OnUpdate = Box<dyn FnMut(&Run) + Send>;

/// Configuration for [`await_run`].
pub struct AwaitRunOptions {
    poll_interval: Duration,
    max_wait: Duration,
    on_update: Option<OnUpdate>,
    cancel: Option<CancellationToken>,
}

impl Default for AwaitRunOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            on_update: None,
            cancel: None,
        }
    }
}

impl AwaitRunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between polls; values below [`MIN_POLL_INTERVAL`] are clamped.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Logical deadline measured from the start of the awaiting call, not
    /// from the run's creation. Checked at poll boundaries only; an
    /// in-flight fetch is never interrupted by it.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Observe every snapshot as it is polled, terminal one included.
    #[must_use]
    pub fn with_on_update(mut self, on_update: impl FnMut(&Run) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(on_update));
        self
    }

    /// Stop polling early when this token fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl std::fmt::Debug for AwaitRunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwaitRunOptions")
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .field("on_update", &self.on_update.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Poll a run until it reaches a terminal status and return that snapshot.
///
/// Each iteration fetches the current snapshot, hands it to `on_update`,
/// returns it if terminal, raises [`ClientError::Timeout`] once the deadline
/// has passed, and otherwise sleeps the clamped interval. A fetch failure
/// propagates immediately; there is no retry here. Two fetches are never in
/// flight at once from a single call.
pub async fn await_run(
    client: &ExosphereClient,
    run_id: &RunId,
    options: AwaitRunOptions,
) -> Result<Run, ClientError> {
    let AwaitRunOptions {
        poll_interval,
        max_wait,
        mut on_update,
        cancel,
    } = options;
    let poll_interval = effective_poll_interval(poll_interval);
    let cancel = cancel.unwrap_or_default();
    let start = Instant::now();

    loop {
        let run = tokio::select! {
            () = cancel.cancelled() => {
                return Err(ClientError::Cancelled { run_id: run_id.clone() });
            }
            run = client.get_run(run_id) => run?,
        };
        if let Some(on_update) = on_update.as_mut() {
            on_update(&run);
        }
        if run.is_terminal() {
            tracing::debug!(%run_id, status = %run.status, "run reached terminal status");
            return Ok(run);
        }

        let waited = start.elapsed();
        if waited > max_wait {
            return Err(ClientError::Timeout {
                run_id: run_id.clone(),
                waited,
            });
        }

        tracing::debug!(%run_id, status = %run.status, ?waited, "run not terminal yet");
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(ClientError::Cancelled { run_id: run_id.clone() });
            }
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

fn effective_poll_interval(requested: Duration) -> Duration {
    requested.max(MIN_POLL_INTERVAL)
}
