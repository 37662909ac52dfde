//! Wire types and HTTP client for the migops console backend.

mod client;
mod error;
mod http;
mod types;

pub use client::ConsoleApi;
pub use error::{ApiError, ErrorKind};
pub use http::{HttpConfig, HttpConsoleApi};
pub use types::{
    BuildOption, BuildQuery, InjectAccepted, InjectRequest, JobStatus, JobStatusReport,
    ObjectMetaResponse, ObjectMetadata, Page, Pagination, PlannedArtifact, SelectOption,
    StackTarget, StatusTone, StreamExists, StreamQuery, UploadItemRequest, UploadPlan,
    UploadPlanForm,
};
