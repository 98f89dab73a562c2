//! Client-side lifecycle of a generation job.
//!
//! [`JobController`] owns the tracked job and its render report. It is
//! driven from a single task: operations take `&mut self`, and poll and
//! report results are applied only inside [`JobController::next_event`].
//! Presentation code reads [`JobView`] snapshots and never mutates them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use slidegen_common::job::parse_timestamp;
use slidegen_common::{
    DownloadRef, GenerateOptions, GenerateRequest, Job, JobFailure, JobId, JobSnapshot, JobStatus,
    RenderReport,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::JobApi;
use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError};
use crate::poller::{PollEvent, SessionId, StatusPoller};

const GENERIC_FAILURE: &str = "Generation failed";
const DEFAULT_MIN_VISIBLE_PROGRESS: f64 = 0.05;

/// Read-only snapshot of the controller's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobView {
    /// `None` while idle.
    pub job: Option<Job>,
    pub report: Option<RenderReport>,
    pub report_pending: bool,
    /// Set when the report could not be fetched. The job itself still succeeded.
    pub report_error: Option<String>,
}

impl JobView {
    pub fn status(&self) -> Option<&JobStatus> {
        self.job.as_ref().map(|j| &j.status)
    }

    /// A job is active until it reaches `done` or `failed`.
    pub fn is_active(&self) -> bool {
        self.job.as_ref().is_some_and(|j| !j.is_terminal())
    }

    pub fn display(&self, min_visible_progress: f64) -> DisplayState {
        match &self.job {
            None => DisplayState::Idle,
            Some(job) => match &job.status {
                JobStatus::Done => DisplayState::Done,
                JobStatus::Failed => DisplayState::Failed {
                    message: job.error().unwrap_or(GENERIC_FAILURE).to_string(),
                },
                status => DisplayState::InProgress {
                    label: status.label().to_string(),
                    percent: display_percent(job.progress, min_visible_progress),
                },
            },
        }
    }
}

/// What a presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    InProgress { label: String, percent: u8 },
    Done,
    Failed { message: String },
}

impl std::fmt::Display for DisplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayState::Idle => f.write_str("Idle"),
            DisplayState::InProgress { label, percent } => write!(f, "[{:>3}%] {}", percent, label),
            DisplayState::Done => f.write_str("Done"),
            DisplayState::Failed { message } => write!(f, "Failed: {}", message),
        }
    }
}

/// Percentage shown for `progress`. Small non-zero values are raised to
/// `min_visible` so a running job never looks stuck at zero.
pub fn display_percent(progress: f64, min_visible: f64) -> u8 {
    let mut p = if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 0.0 };
    if p > 0.0 && p < min_visible {
        p = min_visible.min(1.0);
    }
    (p * 100.0).round() as u8
}

struct ReportEvent {
    generation: u64,
    result: Result<RenderReport, ApiError>,
}

pub struct JobController {
    api: Arc<dyn JobApi>,
    poller: StatusPoller,
    /// Events of the current poll session. Closed early only if the poll task died.
    poll_rx: Option<mpsc::UnboundedReceiver<PollEvent>>,
    report_tx: mpsc::UnboundedSender<ReportEvent>,
    report_rx: mpsc::UnboundedReceiver<ReportEvent>,
    report_task: Option<JoinHandle<()>>,
    /// Poll session whose events may still be applied.
    session: Option<SessionId>,
    last_seq: u64,
    /// Bumped whenever tracking is discarded, so late report results are ignored.
    generation: u64,
    view: JobView,
    view_tx: watch::Sender<JobView>,
    min_visible_progress: f64,
}

impl JobController {
    pub fn new(api: Arc<dyn JobApi>, poll_interval: Duration) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(JobView::default());

        Self {
            poller: StatusPoller::new(api.clone(), poll_interval),
            api,
            poll_rx: None,
            report_tx,
            report_rx,
            report_task: None,
            session: None,
            last_seq: 0,
            generation: 0,
            view: JobView::default(),
            view_tx,
            min_visible_progress: DEFAULT_MIN_VISIBLE_PROGRESS,
        }
    }

    pub fn from_config(api: Arc<dyn JobApi>, config: &ClientConfig) -> Self {
        let mut controller = Self::new(api, config.polling.interval());
        controller.min_visible_progress = config.polling.min_visible_progress;
        controller
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    pub fn display(&self) -> DisplayState {
        self.view.display(self.min_visible_progress)
    }

    /// Receives a new [`JobView`] after every state change.
    pub fn subscribe(&self) -> watch::Receiver<JobView> {
        self.view_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.session.is_some()
    }

    /// Creates a job for `prompt` and starts polling it.
    pub async fn submit(
        &mut self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<JobId, ClientError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ClientError::Validation("Prompt must not be empty".to_string()));
        }
        let chars = prompt.chars().count();
        if chars > slidegen_common::MAX_PROMPT_CHARS {
            return Err(ClientError::Validation(format!(
                "Prompt is {} characters long; the limit is {}",
                chars,
                slidegen_common::MAX_PROMPT_CHARS
            )));
        }
        if let Some(job) = self.view.job.as_ref().filter(|j| !j.is_terminal()) {
            return Err(ClientError::Validation(format!(
                "Job {} is still {}; reset before submitting another",
                job.id, job.status
            )));
        }

        self.discard();
        self.publish();

        let request = GenerateRequest::new(prompt, options);
        let created = match self.api.create_job(&request).await {
            Ok(created) => created,
            Err(e) => {
                log::error!("Failed to create job: {}", e);
                return Err(ClientError::Creation(e));
            }
        };

        log::info!("Created job {} ({})", created.job_id, created.status);
        self.view.job = Some(Job::new(created.job_id.clone(), created.status));
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        self.session = Some(self.poller.start(created.job_id.clone(), poll_tx));
        self.poll_rx = Some(poll_rx);
        self.publish();

        Ok(created.job_id)
    }

    /// Waits for the next poll or report result and applies it.
    ///
    /// Returns `false` without waiting when nothing is outstanding.
    pub async fn next_event(&mut self) -> bool {
        if self.session.is_none() && !self.view.report_pending {
            return false;
        }

        tokio::select! {
            event = recv_poll(&mut self.poll_rx) => match event {
                Some(event) => self.handle_poll_event(event),
                None => self.handle_poll_closed(),
            },
            Some(event) = self.report_rx.recv() => self.handle_report_event(event),
            else => return false,
        }
        true
    }

    /// Applies events until polling has stopped and any report fetch has finished.
    pub async fn run_until_settled(&mut self) -> &JobView {
        while self.next_event().await {}
        &self.view
    }

    /// Drops the tracked job and report and stops polling. The job is not
    /// cancelled on the server.
    pub fn reset(&mut self) {
        if let Some(job) = &self.view.job {
            log::info!("Resetting; no longer tracking job {}", job.id);
        }
        self.discard();
        self.publish();
    }

    /// Reference to the finished file. Only valid once the job is `done`.
    pub fn request_download(&self) -> Result<DownloadRef, ClientError> {
        match &self.view.job {
            Some(job) if job.status == JobStatus::Done => {
                Ok(DownloadRef::for_job(self.api.base_url(), &job.id))
            }
            Some(job) => Err(ClientError::Validation(format!(
                "Job {} is {}; download is available once it is done",
                job.id, job.status
            ))),
            None => Err(ClientError::Validation("No job has been submitted".to_string())),
        }
    }

    fn handle_poll_event(&mut self, event: PollEvent) {
        if self.session != Some(event.session()) {
            log::debug!("Ignoring result from ended poll session {}", event.session());
            return;
        }

        match event {
            PollEvent::Snapshot { seq, snapshot, .. } => {
                if seq <= self.last_seq {
                    log::debug!("Ignoring out-of-order poll result {} (last {})", seq, self.last_seq);
                    return;
                }
                self.last_seq = seq;
                self.apply_snapshot(snapshot);
            }
            PollEvent::Failed { error, .. } => self.apply_poll_transport_error(error),
        }
    }

    /// The poll task ended without reporting why, e.g. it panicked.
    fn handle_poll_closed(&mut self) {
        self.poll_rx = None;
        if self.session.is_some() {
            self.apply_poll_transport_error(ApiError::Transport(
                "status polling stopped unexpectedly".to_string(),
            ));
        }
    }

    fn apply_snapshot(&mut self, snapshot: JobSnapshot) {
        let Some(job) = self.view.job.as_mut() else {
            return;
        };
        if snapshot.job_id != job.id {
            log::warn!("Ignoring status for job {} while tracking {}", snapshot.job_id, job.id);
            return;
        }

        let entering_done = snapshot.status == JobStatus::Done && job.status != JobStatus::Done;
        if snapshot.status != job.status {
            log::info!("Job {}: {} -> {}", job.id, job.status, snapshot.status);
        }

        job.status = snapshot.status;
        job.progress = snapshot.progress;
        if let Some(ts) = snapshot.created_at.as_deref().and_then(parse_timestamp) {
            job.created_at = Some(ts);
        }
        if let Some(ts) = snapshot.updated_at.as_deref().and_then(parse_timestamp) {
            job.updated_at = Some(ts);
        }

        let terminal = match job.status {
            JobStatus::Failed => {
                let message = snapshot
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                log::warn!("Job {} failed: {}", job.id, message);
                job.failure = Some(JobFailure::Remote(message));
                true
            }
            JobStatus::Done => true,
            _ => false,
        };
        let id = job.id.clone();

        if terminal {
            self.stop_polling();
        }
        if entering_done {
            self.fetch_report(id);
        }
        self.publish();
    }

    fn apply_poll_transport_error(&mut self, error: ApiError) {
        self.stop_polling();
        if let Some(job) = self.view.job.as_mut() {
            let message = format!("Lost contact with the server: {}", error);
            log::error!("Job {}: {}", job.id, message);
            job.status = JobStatus::Failed;
            job.failure = Some(JobFailure::Transport(message));
        }
        self.publish();
    }

    fn fetch_report(&mut self, job_id: JobId) {
        self.view.report_pending = true;
        self.view.report_error = None;

        let api = self.api.clone();
        let tx = self.report_tx.clone();
        let generation = self.generation;
        self.report_task = Some(tokio::spawn(async move {
            let result = api.job_report(&job_id).await;
            let _ = tx.send(ReportEvent { generation, result });
        }));
    }

    fn handle_report_event(&mut self, event: ReportEvent) {
        if event.generation != self.generation {
            log::debug!("Ignoring report for a discarded job");
            return;
        }

        self.view.report_pending = false;
        self.report_task = None;
        match event.result {
            Ok(report) => {
                log::info!(
                    "Report for job {}: {} slides, {} with overflow",
                    report.job_id,
                    report.slide_count(),
                    report.overflow_count()
                );
                self.view.report = Some(report);
            }
            Err(e) => {
                // The job succeeded; a missing report only loses diagnostics
                log::warn!("Could not fetch render report: {}", e);
                self.view.report_error = Some(e.to_string());
            }
        }
        self.publish();
    }

    fn stop_polling(&mut self) {
        self.poller.stop();
        self.session = None;
        self.poll_rx = None;
    }

    fn discard(&mut self) {
        self.stop_polling();
        if let Some(task) = self.report_task.take() {
            task.abort();
        }
        self.generation += 1;
        self.last_seq = 0;
        self.view = JobView::default();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view.clone());
    }
}

async fn recv_poll(rx: &mut Option<mpsc::UnboundedReceiver<PollEvent>>) -> Option<PollEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        if let Some(task) = self.report_task.take() {
            task.abort();
        }
    }
}
