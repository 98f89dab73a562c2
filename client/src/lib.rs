//! Job-lifecycle client for the SlideGen service.
//!
//! Submits a prompt, polls the resulting generation job until it finishes
//! and fetches the render report. See [`JobController`].

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod poller;

pub use api::{HttpJobApi, JobApi};
pub use config::ClientConfig;
pub use controller::{display_percent, DisplayState, JobController, JobView};
pub use error::{ApiError, ClientError};
pub use poller::{PollEvent, SessionId, StatusPoller};
