use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slidegen_common::{JobId, JobSnapshot};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::JobApi;
use crate::error::ApiError;

/// Identifies one `start`..`stop` span of a poller.
pub type SessionId = u64;

#[derive(Debug)]
pub enum PollEvent {
    /// A status fetch succeeded. `seq` increases by one per fetch within a session.
    Snapshot {
        session: SessionId,
        seq: u64,
        snapshot: JobSnapshot,
    },
    /// A status fetch failed. The session has ended.
    Failed { session: SessionId, error: ApiError },
}

impl PollEvent {
    pub fn session(&self) -> SessionId {
        match self {
            PollEvent::Snapshot { session, .. } | PollEvent::Failed { session, .. } => *session,
        }
    }
}

/// Fetches a job's status on a fixed period.
///
/// At most one poll loop runs per poller. Status values are not interpreted
/// here; stopping on a terminal status is the caller's decision.
pub struct StatusPoller {
    api: Arc<dyn JobApi>,
    interval: Duration,
    session: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn JobApi>, interval: Duration) -> Self {
        Self {
            api,
            interval,
            session: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Starts polling `job_id`, stopping any previous loop first.
    ///
    /// The first fetch is issued immediately. Events are tagged with the
    /// returned session id.
    pub fn start(&mut self, job_id: JobId, sink: UnboundedSender<PollEvent>) -> SessionId {
        self.stop();

        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Polling job {} every {:?} (session {})", job_id, self.interval, session);

        let task = tokio::spawn(poll_loop(
            self.api.clone(),
            job_id,
            self.interval,
            session,
            self.session.clone(),
            sink,
        ));
        self.task = Some(task);
        session
    }

    /// Cancels the current loop, including a fetch that is still in flight.
    /// Calling this when nothing is running does nothing.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let ended = self.session.fetch_add(1, Ordering::SeqCst);
            log::debug!("Stopped polling (session {})", ended);
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    api: Arc<dyn JobApi>,
    job_id: JobId,
    period: Duration,
    session: SessionId,
    current: Arc<AtomicU64>,
    sink: UnboundedSender<PollEvent>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0u64;

    loop {
        ticker.tick().await;
        let result = api.job_status(&job_id).await;

        if current.load(Ordering::SeqCst) != session {
            log::debug!("Dropping status of job {} from ended session {}", job_id, session);
            return;
        }

        seq += 1;
        match result {
            Ok(snapshot) => {
                if sink.send(PollEvent::Snapshot { session, seq, snapshot }).is_err() {
                    return;
                }
            }
            Err(error) => {
                log::warn!("Polling job {} failed: {}", job_id, error);
                let _ = sink.send(PollEvent::Failed { session, error });
                return;
            }
        }
    }
}
