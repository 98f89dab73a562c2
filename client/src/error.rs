use thiserror::Error;

/// Failures talking to the generation service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("{}", http_message(*status, detail.as_deref()))]
    Http { status: u16, detail: Option<String> },

    /// The request never produced a response (connection refused, reset, timeout).
    #[error("{0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("Unexpected response from server: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Http { status: status.as_u16(), detail: None }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

fn http_message(status: u16, detail: Option<&str>) -> String {
    if let Some(detail) = detail {
        return detail.to_string();
    }
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("Request failed with status {} ({})", status, reason),
        None => format!("Request failed with status {}", status),
    }
}

/// Errors returned by controller operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A local precondition was violated. No request was sent.
    #[error("{0}")]
    Validation(String),

    #[error("Could not create job: {0}")]
    Creation(#[source] ApiError),
}
