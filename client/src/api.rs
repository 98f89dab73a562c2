//! Access to the remote generation service.
//!
//! The controller talks to the service only through [`JobApi`], so tests can
//! substitute a scripted implementation. [`HttpJobApi`] is the real one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use slidegen_common::{
    DownloadRef, ErrorBody, GenerateRequest, GenerateResponse, HealthResponse, JobId, JobSnapshot,
    RenderReport,
};
use tokio::io::AsyncWriteExt;

use crate::config::ApiConfig;
use crate::error::ApiError;

#[async_trait]
pub trait JobApi: Send + Sync {
    /// Base URL used to build download references.
    fn base_url(&self) -> &str;

    async fn create_job(&self, request: &GenerateRequest) -> Result<GenerateResponse, ApiError>;

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError>;

    async fn job_report(&self, job_id: &JobId) -> Result<RenderReport, ApiError>;

    async fn health(&self) -> Result<HealthResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpJobApi {
    client: Client,
    base_url: String,
}

impl HttpJobApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder =
            Client::builder().user_agent(concat!("slidegen/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Streams the finished presentation to `dest`, returning the byte count.
    ///
    /// The body is written to `<dest>.part` and renamed once complete, so an
    /// interrupted transfer never leaves a truncated file at `dest`.
    pub async fn download_to(&self, download: &DownloadRef, dest: &Path) -> Result<u64, ApiError> {
        log::info!("Downloading {} to {}", download.url, dest.display());
        let response = self.client.get(&download.url).send().await?;
        let response = check_status(response).await?;

        let partial = partial_path(dest);
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&partial).await {
                    log::debug!("Could not remove {}: {}", partial.display(), rm);
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, dest).await?;

        log::info!("Saved {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_body(mut response: Response, path: &Path) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl JobApi for HttpJobApi {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_job(&self, request: &GenerateRequest) -> Result<GenerateResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/generate"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{}", job_id)))
            .send()
            .await?;
        decode(response).await
    }

    async fn job_report(&self, job_id: &JobId) -> Result<RenderReport, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{}/report", job_id)))
            .send()
            .await?;
        decode(response).await
    }

    async fn health(&self) -> Result<HealthResponse, ApiError> {
        let response = self.client.get(self.url("/healthz")).send().await?;
        decode(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted stand-in for the generation service.

    use super::*;
    use slidegen_common::JobStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) const BASE_URL: &str = "http://api.test";

    #[derive(Debug, Clone)]
    pub(crate) enum Step {
        Snapshot(JobSnapshot),
        ConnectionError,
        /// The status call panics, killing the poll task.
        Crash,
    }

    pub(crate) fn snapshot(status: &str, progress: f64) -> Step {
        Step::Snapshot(JobSnapshot {
            job_id: JobId::from("j1"),
            status: JobStatus::from(status),
            progress,
            created_at: Some("2025-01-01T00:00:00".to_string()),
            updated_at: Some("2025-01-01T00:00:01".to_string()),
            error: None,
        })
    }

    pub(crate) fn failed(error: Option<&str>) -> Step {
        Step::Snapshot(JobSnapshot {
            job_id: JobId::from("j1"),
            status: JobStatus::Failed,
            progress: 0.5,
            created_at: None,
            updated_at: None,
            error: error.map(str::to_string),
        })
    }

    /// Plays back a fixed sequence of status responses. The last step
    /// repeats once the script runs out.
    pub(crate) struct ScriptedApi {
        steps: Mutex<VecDeque<Step>>,
        create_error: Option<(u16, Option<String>)>,
        report_fails: bool,
        status_delay: Duration,
        pub(crate) create_calls: AtomicUsize,
        pub(crate) status_calls: AtomicUsize,
        pub(crate) report_calls: AtomicUsize,
    }

    impl ScriptedApi {
        pub(crate) fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                create_error: None,
                report_fails: false,
                status_delay: Duration::ZERO,
                create_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_create(mut self, status: u16, detail: Option<&str>) -> Self {
            self.create_error = Some((status, detail.map(str::to_string)));
            self
        }

        pub(crate) fn failing_report(mut self) -> Self {
            self.report_fails = true;
            self
        }

        pub(crate) fn with_status_delay(mut self, delay: Duration) -> Self {
            self.status_delay = delay;
            self
        }

        pub(crate) fn creates(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn polls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn reports(&self) -> usize {
            self.report_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobApi for ScriptedApi {
        fn base_url(&self) -> &str {
            BASE_URL
        }

        async fn create_job(&self, _request: &GenerateRequest) -> Result<GenerateResponse, ApiError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((status, detail)) = &self.create_error {
                return Err(ApiError::Http { status: *status, detail: detail.clone() });
            }
            Ok(GenerateResponse {
                job_id: JobId::from("j1"),
                status: JobStatus::Queued,
            })
        }

        async fn job_status(&self, _job_id: &JobId) -> Result<JobSnapshot, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if !self.status_delay.is_zero() {
                tokio::time::sleep(self.status_delay).await;
            }

            let step = {
                let mut steps = self.steps.lock().unwrap();
                if steps.len() > 1 {
                    steps.pop_front()
                } else {
                    steps.front().cloned()
                }
            };

            match step {
                Some(Step::Snapshot(snapshot)) => Ok(snapshot),
                Some(Step::ConnectionError) => Err(ApiError::Transport(
                    "error sending request: connection refused".to_string(),
                )),
                Some(Step::Crash) => panic!("status handler crashed"),
                None => Err(ApiError::Http { status: 404, detail: None }),
            }
        }

        async fn job_report(&self, job_id: &JobId) -> Result<RenderReport, ApiError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            if self.report_fails {
                return Err(ApiError::Transport("connection reset by peer".to_string()));
            }
            Ok(RenderReport {
                job_id: job_id.clone(),
                slides: Vec::new(),
                total_slides: 5,
                generation_time: Some(2.0),
                render_time: Some(0.5),
            })
        }

        async fn health(&self) -> Result<HealthResponse, ApiError> {
            Ok(HealthResponse {
                status: "healthy".to_string(),
                service: None,
            })
        }
    }

    /// Builds a complete HTTP/1.1 response with the given status line.
    pub(crate) fn http_response(status: &str, content_type: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
        .into_bytes()
    }

    /// Answers a single request on a loopback port with `response`, written
    /// verbatim, then closes the connection. Returns the server's base URL.
    pub(crate) async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{http_response, serve_once};
    use super::*;
    use slidegen_common::JobStatus;

    fn api_for(base_url: &str) -> HttpJobApi {
        HttpJobApi::new(base_url, Some(Duration::from_secs(5))).unwrap()
    }

    #[test]
    fn test_base_url_is_normalised() {
        let api = HttpJobApi::new("http://localhost:8000/", None).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/jobs/j1"), "http://localhost:8000/jobs/j1");
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Job not done. Current status: rendering"}"#).as_deref(),
            Some("Job not done. Current status: rendering")
        );
        assert_eq!(error_detail("<html>Bad Gateway</html>"), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Nothing listens on port 1.
        let api = HttpJobApi::new("http://127.0.0.1:1", Some(Duration::from_secs(5))).unwrap();
        let err = api.job_status(&JobId::from("j1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_status_response_is_decoded() {
        let body = r#"{"job_id":"j1","status":"rendering","progress":0.7,
            "created_at":"2025-01-01T00:00:00","updated_at":"2025-01-01T00:00:09","error":null}"#;
        let base = serve_once(http_response("200 OK", "application/json", body)).await;

        let snapshot = api_for(&base).job_status(&JobId::from("j1")).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Rendering);
        assert_eq!(snapshot.progress, 0.7);
    }

    #[tokio::test]
    async fn test_html_error_page_uses_status_message() {
        let page = "<html><body><h1>502 Bad Gateway</h1></body></html>";
        let base = serve_once(http_response("502 Bad Gateway", "text/html", page)).await;

        let err = api_for(&base).job_status(&JobId::from("j1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 502, detail: None }), "got {:?}", err);
        assert_eq!(err.to_string(), "Request failed with status 502 (Bad Gateway)");
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_decode_error() {
        let base = serve_once(http_response("200 OK", "text/plain", "ok")).await;

        let err = api_for(&base).health().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("presentation_j1.pptx");
        let base = serve_once(http_response(
            "200 OK",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "PK-slides",
        ))
        .await;

        let api = api_for(&base);
        let written = api
            .download_to(&DownloadRef::for_job(api.base_url(), &JobId::from("j1")), &dest)
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK-slides");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("presentation_j1.pptx");
        // Promises 1000 bytes, sends 10, then hangs up.
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\nPK-partial".to_vec();
        let base = serve_once(response).await;

        let api = api_for(&base);
        let result = api
            .download_to(&DownloadRef::for_job(api.base_url(), &JobId::from("j1")), &dest)
            .await;

        assert!(result.is_err(), "got {:?}", result);
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("presentation_j1.pptx");
        std::fs::write(&dest, b"previous deck").unwrap();
        let base = serve_once(http_response(
            "400 Bad Request",
            "application/json",
            r#"{"detail":"Job not done. Current status: rendering"}"#,
        ))
        .await;

        let api = api_for(&base);
        let err = api
            .download_to(&DownloadRef::for_job(api.base_url(), &JobId::from("j1")), &dest)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Job not done. Current status: rendering");
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous deck");
    }
}
