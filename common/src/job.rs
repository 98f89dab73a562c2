use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Status reported by the generation service.
///
/// Unrecognised strings are kept verbatim in `Unknown` so newer servers
/// can introduce intermediate stages without breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Generating,
    GeneratingJson,
    Rendering,
    Done,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Generating => "generating",
            JobStatus::GeneratingJson => "generating_json",
            JobStatus::Rendering => "rendering",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Unknown(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Human-readable label for progress displays.
    pub fn label(&self) -> &str {
        match self {
            JobStatus::Queued => "Waiting in queue",
            JobStatus::Generating => "Generating content",
            JobStatus::GeneratingJson => "Structuring slides",
            JobStatus::Rendering => "Rendering presentation",
            JobStatus::Done => "Done",
            JobStatus::Failed => "Failed",
            JobStatus::Unknown(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => JobStatus::Queued,
            "generating" => JobStatus::Generating,
            "generating_json" => JobStatus::GeneratingJson,
            "rendering" => JobStatus::Rendering,
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown(s),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        JobStatus::from(s.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFailure {
    /// The server reported the failure itself.
    Remote(String),
    /// The client lost contact with the server while polling.
    Transport(String),
}

impl JobFailure {
    pub fn message(&self) -> &str {
        match self {
            JobFailure::Remote(m) | JobFailure::Transport(m) => m,
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub failure: Option<JobFailure>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, status: JobStatus) -> Self {
        Self {
            id,
            status,
            progress: 0.0,
            failure: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Error message, only when the job has failed.
    pub fn error(&self) -> Option<&str> {
        match self.status {
            JobStatus::Failed => self.failure.as_ref().map(JobFailure::message),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parses the server's timestamps. Accepts RFC 3339 as well as the naive
/// `YYYY-MM-DDTHH:MM:SS[.ffffff]` form, which is assumed to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_chars: Option<f64>,
}

impl std::fmt::Display for SlideAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_chars {
            Some(n) => write!(f, "{} (to {} chars)", self.kind, n),
            None => f.write_str(&self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideReport {
    pub slide_id: String,
    #[serde(default)]
    pub overflow_detected: bool,
    #[serde(default)]
    pub actions: Vec<SlideAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub job_id: JobId,
    #[serde(default)]
    pub slides: Vec<SlideReport>,
    #[serde(default)]
    pub total_slides: usize,
    #[serde(default)]
    pub generation_time: Option<f64>,
    #[serde(default)]
    pub render_time: Option<f64>,
}

impl RenderReport {
    /// Slide count, falling back to the slide list when the server omits it.
    pub fn slide_count(&self) -> usize {
        if self.total_slides == 0 {
            self.slides.len()
        } else {
            self.total_slides
        }
    }

    pub fn overflow_count(&self) -> usize {
        self.slides.iter().filter(|s| s.overflow_detected).count()
    }
}
