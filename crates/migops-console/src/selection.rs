use indexmap::IndexMap;
use migops_api::{
    ApiError, BuildOption, BuildQuery, ConsoleApi, Page, SelectOption, StreamQuery,
    UploadPlanForm,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::artifacts::StorageLayout;
use crate::error::ConsoleError;

pub const SUFFIX_FIELD: &str = "migops_lars_suffix";

pub fn app_key(app: &str) -> String {
    app.trim().to_lowercase()
}

/// Stream and build picked for one application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppSelection {
    pub app: String,
    pub stream: Option<SelectOption>,
    pub build: Option<BuildOption>,
    pub manual_mode: bool,
    pub manual_stream_text: String,
    validated_stream: Option<String>,
}

impl AppSelection {
    pub fn new(app: &str) -> Self {
        Self {
            app: app.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        app_key(&self.app)
    }

    /// The stream builds are searched under.
    ///
    /// In manual mode only a catalog-validated name counts; until then the
    /// effective stream is empty.
    pub fn effective_stream(&self) -> &str {
        if self.manual_mode {
            self.validated_stream.as_deref().unwrap_or_default()
        } else {
            self.stream
                .as_ref()
                .map(|stream| stream.id.as_str())
                .unwrap_or_default()
        }
    }

    pub fn stream_selector_enabled(&self) -> bool {
        !self.manual_mode
    }

    pub fn build_selector_enabled(&self) -> bool {
        !self.effective_stream().is_empty()
    }

    pub fn manual_validated(&self) -> bool {
        self.validated_stream.is_some()
    }

    pub fn select_stream(&mut self, stream: Option<SelectOption>) {
        self.stream = stream;
        if !self.manual_mode {
            self.build = None;
        }
    }

    pub fn select_build(&mut self, build: Option<BuildOption>) {
        self.build = build;
    }

    pub fn set_manual_mode(&mut self, enabled: bool) {
        if enabled && !self.manual_mode {
            self.build = None;
        }
        self.manual_mode = enabled;
    }

    pub fn set_manual_text(&mut self, text: &str) {
        if text.trim() == self.manual_stream_text {
            return;
        }
        self.manual_stream_text = text.trim().to_string();
        self.validated_stream = None;
        if self.manual_mode {
            self.build = None;
        }
    }

    fn accept_manual_stream(&mut self, canonical: String) {
        self.manual_stream_text = canonical.clone();
        self.validated_stream = Some(canonical);
    }

    /// Current build identifier, mirrored into the summary field.
    pub fn summary(&self) -> &str {
        self.hidden_build()
    }

    pub fn hidden_stream(&self) -> &str {
        self.effective_stream()
    }

    pub fn hidden_build(&self) -> &str {
        self.build
            .as_ref()
            .map(|build| build.id.as_str())
            .unwrap_or_default()
    }

    pub fn stream_field(&self) -> String {
        format!("summary_{}_stream", self.key())
    }

    pub fn build_field(&self) -> String {
        format!("summary_{}_build", self.key())
    }
}

/// Per-app selectors plus the destination suffix shared by the upload form.
#[derive(Clone, Debug, Serialize)]
pub struct SelectionBoard {
    apps: IndexMap<String, AppSelection>,
    destination_root: String,
    suffix: String,
}

impl SelectionBoard {
    pub fn new<S: AsRef<str>>(apps: &[S], layout: &StorageLayout) -> Self {
        let apps = apps
            .iter()
            .map(|app| {
                let selection = AppSelection::new(app.as_ref());
                (selection.key(), selection)
            })
            .collect();
        Self {
            apps,
            destination_root: format!("{}/{}/", layout.bucket, layout.root()),
            suffix: String::new(),
        }
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppSelection> {
        self.apps.values()
    }

    pub fn app(&self, app: &str) -> Result<&AppSelection, ConsoleError> {
        self.apps
            .get(&app_key(app))
            .ok_or_else(|| ConsoleError::UnknownApp(app.to_string()))
    }

    pub fn app_mut(&mut self, app: &str) -> Result<&mut AppSelection, ConsoleError> {
        self.apps
            .get_mut(&app_key(app))
            .ok_or_else(|| ConsoleError::UnknownApp(app.to_string()))
    }

    pub(crate) fn apps_mut(&mut self) -> impl Iterator<Item = &mut AppSelection> {
        self.apps.values_mut()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn set_suffix(&mut self, suffix: &str) {
        self.suffix = suffix.trim().to_string();
    }

    /// Full destination path, e.g. `migops/LARS/MT/AUG`.
    pub fn destination(&self) -> String {
        format!(
            "{}{}",
            self.destination_root,
            self.suffix.trim_start_matches('/')
        )
    }

    pub async fn search_streams(
        &self,
        api: &dyn ConsoleApi,
        app: &str,
        term: &str,
        page: u32,
    ) -> Result<Page<SelectOption>, ConsoleError> {
        let selection = self.app(app)?;
        let query = StreamQuery {
            app: selection.app.clone(),
            term: term.trim().to_string(),
            page: page.max(1),
        };
        Ok(api.search_streams(&query).await?)
    }

    pub async fn search_builds(
        &self,
        api: &dyn ConsoleApi,
        app: &str,
        term: &str,
        page: u32,
    ) -> Result<Page<BuildOption>, ConsoleError> {
        let selection = self.app(app)?;
        let stream_id = selection.effective_stream();
        if stream_id.is_empty() {
            debug!(app = %selection.app, "no effective stream, skipping build search");
            return Ok(Page::empty());
        }
        let query = BuildQuery {
            app: selection.app.clone(),
            stream_id: stream_id.to_string(),
            term: term.trim().to_string(),
            page: page.max(1),
        };
        Ok(api.search_builds(&query).await?)
    }

    /// Checks the typed manual stream against the catalog and adopts the
    /// canonical spelling it returns.
    pub async fn validate_manual_stream(
        &mut self,
        api: &dyn ConsoleApi,
        app: &str,
    ) -> Result<String, ConsoleError> {
        let selection = self.app(app)?;
        let typed = selection.manual_stream_text.trim().to_string();
        if !selection.manual_mode {
            return Err(ApiError::Validation(format!(
                "Manual stream entry is off for {}.",
                selection.app
            ))
            .into());
        }
        if typed.is_empty() {
            return Err(ApiError::Validation("Enter a stream name to validate.".into()).into());
        }
        let app_name = selection.app.clone();

        let answer = api.stream_exists(&app_name, &typed).await?;
        if !answer.exists {
            let reason = answer
                .error
                .filter(|err| !err.trim().is_empty())
                .unwrap_or_else(|| format!("Stream {typed} was not found for {app_name}."));
            return Err(ApiError::Validation(reason).into());
        }
        let canonical = answer
            .stream
            .map(|stream| stream.trim().to_string())
            .filter(|stream| !stream.is_empty())
            .unwrap_or(typed);
        info!(app = %app_name, stream = %canonical, "manual stream validated");
        self.app_mut(&app_name)?
            .accept_manual_stream(canonical.clone());
        Ok(canonical)
    }

    /// Form fields for the upload planner; apps missing a stream or build are left out.
    pub fn plan_form(&self) -> UploadPlanForm {
        let mut form = UploadPlanForm::default();
        for selection in self.apps.values() {
            let stream = selection.hidden_stream();
            let build = selection.hidden_build();
            if stream.is_empty() || build.is_empty() {
                continue;
            }
            form.push(selection.stream_field(), stream);
            form.push(selection.build_field(), build);
        }
        form.push(SUFFIX_FIELD, self.suffix.trim_start_matches('/'));
        form
    }
}
