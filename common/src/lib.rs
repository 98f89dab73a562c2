pub mod api;
pub mod job;
pub mod options;

pub use api::{DownloadRef, ErrorBody, GenerateRequest, GenerateResponse, HealthResponse, JobSnapshot};
pub use job::{Job, JobFailure, JobId, JobStatus, RenderReport, SlideAction, SlideReport};
pub use options::{parse_density, Density, GenerateOptions};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

// Matches the server-side limit on POST /generate
pub const MAX_PROMPT_CHARS: usize = 5000;

pub const DEFAULT_TEMPLATE_ID: &str = "default";
pub const DEFAULT_LANGUAGE: &str = "auto";
