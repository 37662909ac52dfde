use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::ConsoleApi;
use crate::error::ApiError;
use crate::types::{
    BuildOption, BuildQuery, InjectAccepted, InjectRequest, InjectResponse, JobStatus,
    JobStatusReport, JobStatusResponse, ObjectMetaResponse, Page, SelectOption, StackTarget,
    StreamExists, StreamQuery, UploadItemRequest, UploadPlan, UploadPlanForm, UploadPlanResponse,
};

const USER_AGENT: &str = concat!("migops-console/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    /// Raw `Cookie` header value sent with every request.
    pub session_cookie: Option<String>,
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_cookie: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`ConsoleApi`] over the console backend's HTTP/JSON endpoints.
#[derive(Clone)]
pub struct HttpConsoleApi {
    client: Client,
    base: Url,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadItemResponse {
    ok: bool,
    error: Option<String>,
}

impl HttpConsoleApi {
    pub fn new(config: &HttpConfig) -> Result<Self, ApiError> {
        let trimmed = config.base_url.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{trimmed}/"))
            .map_err(|err| ApiError::Validation(format!("invalid base url {trimmed}: {err}")))?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = config
            .session_cookie
            .as_deref()
            .map(str::trim)
            .filter(|cookie| !cookie.is_empty())
        {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|err| ApiError::Validation(format!("invalid session cookie: {err}")))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                ApiError::network("client", format!("failed to build http client: {err}"))
            })?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::Validation(format!("invalid path {path}: {err}")))
    }

    fn job_status_url(&self, job_id: &str) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Validation(format!("base url {} cannot take a path", self.base))
            })?
            .pop_if_empty()
            .extend(["api", "inject", job_id, "status"]);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!(endpoint, "request");
        let resp = request
            .send()
            .await
            .map_err(|err| ApiError::network(endpoint, err.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| ApiError::network(endpoint, format!("read failed: {err}")))?;
        interpret(endpoint, status, &body)
    }
}

/// Maps a raw response onto `T` or the matching [`ApiError`].
///
/// Non-2xx responses that carry a JSON `error` (or `message`) are treated as
/// server rejections; anything else non-2xx is a network failure.
pub(crate) fn interpret<T: DeserializeOwned>(
    endpoint: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, ApiError> {
    if !status.is_success() {
        let reason = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error.or(parsed.message))
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());
        return match reason {
            Some(reason) => {
                warn!(endpoint, status = status.as_u16(), "rejected: {reason}");
                Err(ApiError::Rejected(reason))
            }
            None => Err(ApiError::network(endpoint, format!("HTTP {}", status.as_u16()))),
        };
    }
    serde_json::from_str(body).map_err(|err| ApiError::Decode {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}

fn status_report(resp: JobStatusResponse) -> Result<JobStatusReport, ApiError> {
    if !resp.ok {
        return Err(ApiError::rejected_or(resp.error, "status lookup failed"));
    }
    Ok(JobStatusReport {
        status: resp.status.unwrap_or(JobStatus::Unknown),
        status_details: resp.status_details.unwrap_or_default(),
        stdout: resp.stdout.unwrap_or_default(),
        stderr: resp.stderr.unwrap_or_default(),
        stdout_url: resp.stdout_url.unwrap_or_default(),
        stderr_url: resp.stderr_url.unwrap_or_default(),
    })
}

fn accepted(resp: InjectResponse, request: &InjectRequest) -> Result<InjectAccepted, ApiError> {
    if !resp.ok {
        return Err(ApiError::rejected_or(resp.error, "inject request failed"));
    }
    let job_id = resp
        .job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Decode {
            endpoint: "POST /api/inject".into(),
            message: "missing job_id".into(),
        })?;
    Ok(InjectAccepted {
        job_id,
        instance_id: resp
            .instance_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| request.instance_id.clone()),
    })
}

fn upload_plan(resp: UploadPlanResponse) -> Result<UploadPlan, ApiError> {
    if !resp.ok {
        let reason = resp.message.or(resp.error);
        return Err(ApiError::rejected_or(reason, "planning failed"));
    }
    Ok(UploadPlan {
        s3_prefix: resp.s3_prefix,
        artifacts: resp.artifacts,
    })
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn running_stacks(&self) -> Result<Vec<StackTarget>, ApiError> {
        let url = self.url("api/stacks")?;
        self.send(
            "GET /api/stacks",
            self.client.get(url).query(&[("state", "running")]),
        )
        .await
    }

    async fn object_meta(&self, rel_key: &str) -> Result<ObjectMetaResponse, ApiError> {
        let url = self.url("api/s3/object_meta")?;
        let request = self.client.get(url).query(&[("key", rel_key)]);
        match self.send("GET /api/s3/object_meta", request).await {
            // 400 {ok:false, error} is still a usable "unknown" answer.
            Err(ApiError::Rejected(reason)) => Ok(ObjectMetaResponse {
                ok: false,
                metadata: None,
                error: Some(reason),
            }),
            other => other,
        }
    }

    async fn start_inject(&self, request: &InjectRequest) -> Result<InjectAccepted, ApiError> {
        let url = self.url("api/inject")?;
        let resp: InjectResponse = self
            .send("POST /api/inject", self.client.post(url).json(request))
            .await?;
        accepted(resp, request)
    }

    async fn inject_status(
        &self,
        job_id: &str,
        instance_id: &str,
    ) -> Result<JobStatusReport, ApiError> {
        let url = self.job_status_url(job_id)?;
        let resp: JobStatusResponse = self
            .send(
                "GET /api/inject/status",
                self.client.get(url).query(&[("instance_id", instance_id)]),
            )
            .await?;
        status_report(resp)
    }

    async fn search_streams(&self, query: &StreamQuery) -> Result<Page<SelectOption>, ApiError> {
        let url = self.url("api/streams")?;
        let page = query.page.max(1).to_string();
        self.send(
            "GET /api/streams",
            self.client.get(url).query(&[
                ("app", query.app.as_str()),
                ("q", query.term.as_str()),
                ("page", page.as_str()),
            ]),
        )
        .await
    }

    async fn search_builds(&self, query: &BuildQuery) -> Result<Page<BuildOption>, ApiError> {
        let url = self.url("api/builds")?;
        let page = query.page.max(1).to_string();
        self.send(
            "GET /api/builds",
            self.client.get(url).query(&[
                ("app", query.app.as_str()),
                ("stream_id", query.stream_id.as_str()),
                ("q", query.term.as_str()),
                ("page", page.as_str()),
            ]),
        )
        .await
    }

    async fn stream_exists(&self, app: &str, stream: &str) -> Result<StreamExists, ApiError> {
        let url = self.url("api/streams/exists")?;
        self.send(
            "GET /api/streams/exists",
            self.client
                .get(url)
                .query(&[("app", app), ("stream", stream)]),
        )
        .await
    }

    async fn plan_upload(&self, form: &UploadPlanForm) -> Result<UploadPlan, ApiError> {
        let url = self.url("lars2aws/plan")?;
        let resp: UploadPlanResponse = match self
            .send("POST /lars2aws/plan", self.client.post(url).form(&form.fields))
            .await
        {
            Ok(resp) => resp,
            Err(ApiError::Rejected(reason)) => UploadPlanResponse {
                message: Some(reason),
                ..UploadPlanResponse::default()
            },
            Err(err) => return Err(err),
        };
        upload_plan(resp)
    }

    async fn upload_item(&self, item: &UploadItemRequest) -> Result<(), ApiError> {
        let url = self.url("lars2aws/upload-item")?;
        let resp: UploadItemResponse = self
            .send("POST /lars2aws/upload-item", self.client.post(url).json(item))
            .await?;
        if resp.ok {
            Ok(())
        } else {
            Err(ApiError::rejected_or(resp.error, "upload failed"))
        }
    }
}
