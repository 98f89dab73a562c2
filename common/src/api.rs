use serde::{Deserialize, Serialize};
use crate::job::{JobId, JobStatus};
use crate::options::{Density, GenerateOptions};

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub template_id: String,
    pub language: String,
    pub density: Density,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, options: GenerateOptions) -> Self {
        Self {
            prompt: prompt.into(),
            template_id: options.template_id,
            language: options.language,
            density: options.density,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Body of `GET /jobs/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// Error payload carried by non-2xx responses. Validation failures put a
/// list of objects in `detail` rather than a string.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let msgs: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect();
                if msgs.is_empty() {
                    Some(serde_json::Value::Array(items.clone()).to_string())
                } else {
                    Some(msgs.join("; "))
                }
            }
            other => Some(other.to_string()),
        }
    }
}

/// Where to fetch the finished presentation from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
    pub url: String,
    pub file_name: String,
}

impl DownloadRef {
    pub fn for_job(base_url: &str, job_id: &JobId) -> Self {
        Self {
            url: format!("{}/jobs/{}/download", base_url.trim_end_matches('/'), job_id),
            file_name: format!("presentation_{}.pptx", job_id),
        }
    }
}
