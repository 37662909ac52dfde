use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A running Landmark stack that can receive injected files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTarget {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObjectMetadata {
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObjectMetaResponse {
    pub ok: bool,
    pub metadata: Option<ObjectMetadata>,
    pub error: Option<String>,
}

impl ObjectMetaResponse {
    /// The version stamp, if the lookup succeeded and the object carries one.
    pub fn version(&self) -> Option<&str> {
        if !self.ok {
            return None;
        }
        self.metadata
            .as_ref()
            .and_then(|meta| meta.version.as_deref())
            .map(str::trim)
            .filter(|version| !version.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InjectRequest {
    pub instance_id: String,
    pub key_prefix: String,
    pub files: Vec<String>,
    pub preclear: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectAccepted {
    pub job_id: String,
    pub instance_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InjectResponse {
    pub(crate) ok: bool,
    pub(crate) job_id: Option<String>,
    pub(crate) instance_id: Option<String>,
    pub(crate) error: Option<String>,
}

/// Remote command status as reported by the job status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Failed,
    TimedOut,
    Cancelled,
    Cancelling,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTone {
    Secondary,
    Info,
    Warning,
    Success,
    Danger,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }

    pub fn tone(self) -> StatusTone {
        match self {
            JobStatus::Pending | JobStatus::Cancelled | JobStatus::Unknown => StatusTone::Secondary,
            JobStatus::InProgress => StatusTone::Info,
            JobStatus::Delayed | JobStatus::Cancelling => StatusTone::Warning,
            JobStatus::Success => StatusTone::Success,
            JobStatus::Failed | JobStatus::TimedOut => StatusTone::Danger,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "InProgress",
            JobStatus::Delayed => "Delayed",
            JobStatus::Success => "Success",
            JobStatus::Failed => "Failed",
            JobStatus::TimedOut => "TimedOut",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Cancelling => "Cancelling",
            JobStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub status_details: String,
    pub stdout: String,
    pub stderr: String,
    pub stdout_url: String,
    pub stderr_url: String,
}

impl JobStatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            status_details: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            stdout_url: String::new(),
            stderr_url: String::new(),
        }
    }

    /// stdout and stderr joined by a newline, skipping whichever is empty.
    pub fn combined_output(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct JobStatusResponse {
    pub(crate) ok: bool,
    pub(crate) status: Option<JobStatus>,
    pub(crate) status_details: Option<String>,
    pub(crate) stdout: Option<String>,
    pub(crate) stderr: Option<String>,
    pub(crate) stdout_url: Option<String>,
    pub(crate) stderr_url: Option<String>,
    pub(crate) error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub more: bool,
}

/// One page of a searchable dropdown's remote results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            pagination: Pagination { more: false },
        }
    }

    pub fn has_more(&self) -> bool {
        self.pagination.more
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub maturity: Option<String>,
    #[serde(default)]
    pub release_id: Option<String>,
}

impl BuildOption {
    /// The release id used for ranking; falls back to the option id.
    pub fn release(&self) -> &str {
        self.release_id
            .as_deref()
            .filter(|rid| !rid.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamQuery {
    pub app: String,
    pub term: String,
    pub page: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildQuery {
    pub app: String,
    pub stream_id: String,
    pub term: String,
    pub page: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamExists {
    pub exists: bool,
    pub stream: Option<String>,
    pub error: Option<String>,
}

/// Form fields posted to the upload planner, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadPlanForm {
    pub fields: Vec<(String, String)>,
}

impl UploadPlanForm {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedArtifact {
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    pub source_url: String,
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl PlannedArtifact {
    pub fn s3_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPlan {
    pub s3_prefix: String,
    pub artifacts: Vec<PlannedArtifact>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UploadPlanResponse {
    pub(crate) ok: bool,
    pub(crate) message: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) s3_prefix: String,
    pub(crate) artifacts: Vec<PlannedArtifact>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadItemRequest {
    pub source_url: String,
    pub bucket: String,
    pub key: String,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl From<&PlannedArtifact> for UploadItemRequest {
    fn from(item: &PlannedArtifact) -> Self {
        Self {
            source_url: item.source_url.clone(),
            bucket: item.bucket.clone(),
            key: item.key.clone(),
            metadata: item.metadata.clone(),
        }
    }
}
