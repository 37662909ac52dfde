use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{
    BuildOption, BuildQuery, InjectAccepted, InjectRequest, JobStatusReport, ObjectMetaResponse,
    Page, SelectOption, StackTarget, StreamExists, StreamQuery, UploadItemRequest, UploadPlan,
    UploadPlanForm,
};

/// The backend surface the console controllers depend on.
///
/// Every method maps to one HTTP call. Implementations fold `{ok: false}`
/// bodies into [`ApiError::Rejected`] so callers only see typed success
/// values.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// `GET /api/stacks?state=running`
    async fn running_stacks(&self) -> Result<Vec<StackTarget>, ApiError>;

    /// `GET /api/s3/object_meta?key=<rel_key>`
    ///
    /// Returns the raw body; an `ok: false` answer is not an error here
    /// because the caller caches it as "unknown".
    async fn object_meta(&self, rel_key: &str) -> Result<ObjectMetaResponse, ApiError>;

    /// `POST /api/inject`
    async fn start_inject(&self, request: &InjectRequest) -> Result<InjectAccepted, ApiError>;

    /// `GET /api/inject/<job_id>/status?instance_id=<id>`
    async fn inject_status(
        &self,
        job_id: &str,
        instance_id: &str,
    ) -> Result<JobStatusReport, ApiError>;

    /// `GET /api/streams?app&q&page`
    async fn search_streams(&self, query: &StreamQuery) -> Result<Page<SelectOption>, ApiError>;

    /// `GET /api/builds?app&stream_id&q&page`
    async fn search_builds(&self, query: &BuildQuery) -> Result<Page<BuildOption>, ApiError>;

    /// `GET /api/streams/exists?app&stream`
    async fn stream_exists(&self, app: &str, stream: &str) -> Result<StreamExists, ApiError>;

    /// `POST /lars2aws/plan`
    async fn plan_upload(&self, form: &UploadPlanForm) -> Result<UploadPlan, ApiError>;

    /// `POST /lars2aws/upload-item`
    async fn upload_item(&self, item: &UploadItemRequest) -> Result<(), ApiError>;
}
