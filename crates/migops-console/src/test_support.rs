use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use migops_api::{
    ApiError, BuildOption, BuildQuery, ConsoleApi, InjectAccepted, InjectRequest,
    JobStatusReport, ObjectMetaResponse, Page, Pagination, SelectOption, StackTarget,
    StreamExists, StreamQuery, UploadItemRequest, UploadPlan, UploadPlanForm,
};

type Queue<T> = Mutex<VecDeque<Result<T, ApiError>>>;
type Keyed<T> = Mutex<HashMap<String, VecDeque<Result<T, ApiError>>>>;

/// Scripted [`ConsoleApi`] that records every request it sees.
///
/// Unscripted calls fall back to harmless answers: empty pages, unknown
/// metadata, successful uploads. Unscripted inject and status calls fail.
#[derive(Default)]
pub(crate) struct StubApi {
    stacks: Queue<Vec<StackTarget>>,
    meta: Keyed<ObjectMetaResponse>,
    inject: Queue<InjectAccepted>,
    statuses: Queue<JobStatusReport>,
    streams: Keyed<Page<SelectOption>>,
    builds: Keyed<Page<BuildOption>>,
    exists: Queue<StreamExists>,
    plans: Queue<UploadPlan>,
    uploads: Queue<()>,
    calls: Mutex<Vec<&'static str>>,
    inject_requests: Mutex<Vec<InjectRequest>>,
    stream_queries: Mutex<Vec<StreamQuery>>,
    build_queries: Mutex<Vec<BuildQuery>>,
    plan_forms: Mutex<Vec<UploadPlanForm>>,
    upload_requests: Mutex<Vec<UploadItemRequest>>,
}

fn pop<T>(queue: &Queue<T>) -> Option<Result<T, ApiError>> {
    queue.lock().unwrap().pop_front()
}

fn pop_keyed<T>(queues: &Keyed<T>, key: &str) -> Option<Result<T, ApiError>> {
    queues
        .lock()
        .unwrap()
        .get_mut(key)
        .and_then(VecDeque::pop_front)
}

fn push_keyed<T>(queues: &Keyed<T>, key: &str, value: Result<T, ApiError>) {
    queues
        .lock()
        .unwrap()
        .entry(key.to_string())
        .or_default()
        .push_back(value);
}

impl StubApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_stacks(&self, value: Result<Vec<StackTarget>, ApiError>) {
        self.stacks.lock().unwrap().push_back(value);
    }

    pub(crate) fn push_meta(&self, rel_key: &str, value: Result<ObjectMetaResponse, ApiError>) {
        push_keyed(&self.meta, rel_key, value);
    }

    pub(crate) fn push_inject(&self, value: Result<InjectAccepted, ApiError>) {
        self.inject.lock().unwrap().push_back(value);
    }

    pub(crate) fn push_status(&self, value: Result<JobStatusReport, ApiError>) {
        self.statuses.lock().unwrap().push_back(value);
    }

    pub(crate) fn push_streams(&self, app: &str, value: Result<Page<SelectOption>, ApiError>) {
        push_keyed(&self.streams, app, value);
    }

    pub(crate) fn push_builds(&self, app: &str, value: Result<Page<BuildOption>, ApiError>) {
        push_keyed(&self.builds, app, value);
    }

    pub(crate) fn push_exists(&self, value: Result<StreamExists, ApiError>) {
        self.exists.lock().unwrap().push_back(value);
    }

    pub(crate) fn push_plan(&self, value: Result<UploadPlan, ApiError>) {
        self.plans.lock().unwrap().push_back(value);
    }

    pub(crate) fn push_upload(&self, value: Result<(), ApiError>) {
        self.uploads.lock().unwrap().push_back(value);
    }

    fn record(&self, endpoint: &'static str) {
        self.calls.lock().unwrap().push(endpoint);
    }

    fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == endpoint)
            .count()
    }

    pub(crate) fn meta_calls(&self) -> usize {
        self.count("object_meta")
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.count("inject_status")
    }

    pub(crate) fn stream_calls(&self) -> usize {
        self.count("search_streams")
    }

    pub(crate) fn build_calls(&self) -> usize {
        self.count("search_builds")
    }

    pub(crate) fn exists_calls(&self) -> usize {
        self.count("stream_exists")
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.count("upload_item")
    }

    pub(crate) fn inject_requests(&self) -> Vec<InjectRequest> {
        self.inject_requests.lock().unwrap().clone()
    }

    pub(crate) fn stream_queries(&self) -> Vec<StreamQuery> {
        self.stream_queries.lock().unwrap().clone()
    }

    pub(crate) fn build_queries(&self) -> Vec<BuildQuery> {
        self.build_queries.lock().unwrap().clone()
    }

    pub(crate) fn plan_forms(&self) -> Vec<UploadPlanForm> {
        self.plan_forms.lock().unwrap().clone()
    }

    pub(crate) fn upload_requests(&self) -> Vec<UploadItemRequest> {
        self.upload_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsoleApi for StubApi {
    async fn running_stacks(&self) -> Result<Vec<StackTarget>, ApiError> {
        self.record("running_stacks");
        pop(&self.stacks).unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn object_meta(&self, rel_key: &str) -> Result<ObjectMetaResponse, ApiError> {
        self.record("object_meta");
        pop_keyed(&self.meta, rel_key).unwrap_or_else(|| {
            Ok(ObjectMetaResponse {
                ok: false,
                metadata: None,
                error: Some("not scripted".into()),
            })
        })
    }

    async fn start_inject(&self, request: &InjectRequest) -> Result<InjectAccepted, ApiError> {
        self.record("start_inject");
        self.inject_requests.lock().unwrap().push(request.clone());
        pop(&self.inject)
            .unwrap_or_else(|| Err(ApiError::network("POST /api/inject", "not scripted")))
    }

    async fn inject_status(
        &self,
        _job_id: &str,
        _instance_id: &str,
    ) -> Result<JobStatusReport, ApiError> {
        self.record("inject_status");
        pop(&self.statuses).unwrap_or_else(|| {
            Err(ApiError::network("GET /api/inject/status", "not scripted"))
        })
    }

    async fn search_streams(&self, query: &StreamQuery) -> Result<Page<SelectOption>, ApiError> {
        self.record("search_streams");
        self.stream_queries.lock().unwrap().push(query.clone());
        pop_keyed(&self.streams, &query.app).unwrap_or_else(|| Ok(Page::empty()))
    }

    async fn search_builds(&self, query: &BuildQuery) -> Result<Page<BuildOption>, ApiError> {
        self.record("search_builds");
        self.build_queries.lock().unwrap().push(query.clone());
        pop_keyed(&self.builds, &query.app).unwrap_or_else(|| Ok(Page::empty()))
    }

    async fn stream_exists(&self, _app: &str, _stream: &str) -> Result<StreamExists, ApiError> {
        self.record("stream_exists");
        pop(&self.exists).unwrap_or_else(|| Ok(StreamExists::default()))
    }

    async fn plan_upload(&self, form: &UploadPlanForm) -> Result<UploadPlan, ApiError> {
        self.record("plan_upload");
        self.plan_forms.lock().unwrap().push(form.clone());
        pop(&self.plans)
            .unwrap_or_else(|| Err(ApiError::network("POST /lars2aws/plan", "not scripted")))
    }

    async fn upload_item(&self, item: &UploadItemRequest) -> Result<(), ApiError> {
        self.record("upload_item");
        self.upload_requests.lock().unwrap().push(item.clone());
        pop(&self.uploads).unwrap_or(Ok(()))
    }
}

pub(crate) fn stack(id: &str, name: &str) -> StackTarget {
    StackTarget {
        id: id.into(),
        name: name.into(),
        env: Some("dev".into()),
        region: Some("us-east-1".into()),
    }
}

pub(crate) fn stream(id: &str) -> SelectOption {
    SelectOption {
        id: id.into(),
        text: id.into(),
    }
}

pub(crate) fn build(release_id: &str, maturity: &str) -> BuildOption {
    BuildOption {
        id: release_id.into(),
        text: format!("{maturity}--{release_id}"),
        maturity: Some(maturity.into()),
        release_id: Some(release_id.into()),
    }
}

pub(crate) fn page<T>(results: Vec<T>, more: bool) -> Page<T> {
    Page {
        results,
        pagination: Pagination { more },
    }
}
