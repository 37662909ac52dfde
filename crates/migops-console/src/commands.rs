use chrono::NaiveDate;
use migops_api::{BuildOption, ErrorKind, Page, SelectOption, StackTarget};
use serde::Serialize;

use crate::artifacts::{ArtifactGroup, FileRow};
use crate::autofill::AutofillReport;
use crate::selection::AppSelection;
use crate::upload::{UploadItem, UploadOutcome, UploadRun};
use crate::wizard::{ConfirmSummary, WizardInput, WizardView};

#[derive(Debug)]
pub enum UiCommand {
    ListGroups,
    ShowFiles {
        display_prefix: String,
    },
    CopyUri {
        display_prefix: String,
        file: String,
    },
    OpenWizard {
        display_prefix: String,
    },
    Wizard(WizardInput),
    SearchStreams {
        app: String,
        term: String,
        page: u32,
    },
    SearchBuilds {
        app: String,
        term: String,
        page: u32,
    },
    SelectStream {
        app: String,
        stream: Option<SelectOption>,
    },
    SelectBuild {
        app: String,
        build: Option<BuildOption>,
    },
    SetManualMode {
        app: String,
        enabled: bool,
    },
    SetManualText {
        app: String,
        text: String,
    },
    ValidateManualStream {
        app: String,
    },
    SetSuffix {
        suffix: String,
    },
    Autofill {
        date: NaiveDate,
    },
    PlanUpload,
    ExecuteUpload,
}

impl UiCommand {
    pub fn name(&self) -> &'static str {
        match self {
            UiCommand::ListGroups => "artifacts.list",
            UiCommand::ShowFiles { .. } => "artifacts.files",
            UiCommand::CopyUri { .. } => "artifacts.copy",
            UiCommand::OpenWizard { .. } => "wizard.open",
            UiCommand::Wizard(input) => match input {
                WizardInput::Open(_) => "wizard.open",
                WizardInput::InstancesLoaded { .. } => "wizard.instances",
                WizardInput::FilterInstances(_) => "wizard.filter",
                WizardInput::PickInstance(_) => "wizard.pick_instance",
                WizardInput::ToggleFile(_) => "wizard.toggle_file",
                WizardInput::SelectAllFiles => "wizard.select_all",
                WizardInput::ClearFiles => "wizard.clear_files",
                WizardInput::Next => "wizard.next",
                WizardInput::Back => "wizard.back",
                WizardInput::Submit => "wizard.submit",
                WizardInput::JobStarted { .. } => "wizard.job_started",
                WizardInput::StatusReceived { .. } => "wizard.status",
                WizardInput::PollTimedOut { .. } => "wizard.poll_timeout",
                WizardInput::Close => "wizard.close",
            },
            UiCommand::SearchStreams { .. } => "selector.streams",
            UiCommand::SearchBuilds { .. } => "selector.builds",
            UiCommand::SelectStream { .. } => "selector.select_stream",
            UiCommand::SelectBuild { .. } => "selector.select_build",
            UiCommand::SetManualMode { .. } => "selector.manual_mode",
            UiCommand::SetManualText { .. } => "selector.manual_text",
            UiCommand::ValidateManualStream { .. } => "selector.validate_manual",
            UiCommand::SetSuffix { .. } => "selector.suffix",
            UiCommand::Autofill { .. } => "selector.autofill",
            UiCommand::PlanUpload => "upload.plan",
            UiCommand::ExecuteUpload => "upload.execute",
        }
    }
}

/// A file row together with the version shown for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub row: FileRow,
    pub version: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    Groups {
        groups: Vec<ArtifactGroup>,
    },
    Files {
        display_prefix: String,
        files: Vec<FileView>,
    },
    Clipboard {
        text: String,
    },
    Wizard {
        view: Box<WizardSnapshot>,
    },
    WizardDismissed,
    StreamResults {
        app: String,
        page: Page<SelectOption>,
    },
    BuildResults {
        app: String,
        page: Page<BuildOption>,
    },
    Selection {
        selection: AppSelection,
        effective_stream: String,
        destination: String,
    },
    Autofill {
        report: AutofillReport,
    },
    UploadPlanned {
        run: UploadRun,
    },
    UploadProgress {
        index: usize,
        item: UploadItem,
    },
    UploadFinished {
        outcome: UploadOutcome,
    },
    Alert {
        #[serde(serialize_with = "serialize_kind")]
        kind: ErrorKind,
        message: String,
    },
    Log {
        line: String,
    },
    WorkerStopped,
}

/// Everything a front end needs to redraw the wizard.
#[derive(Clone, Debug, Serialize)]
pub struct WizardSnapshot {
    pub step: String,
    pub indicator: &'static str,
    pub hint: String,
    pub back_enabled: bool,
    pub next_visible: bool,
    pub next_enabled: bool,
    pub submit_label: &'static str,
    pub submit_enabled: bool,
    pub instances: Vec<StackTarget>,
    pub instances_shown: usize,
    pub files: Vec<FileView>,
    pub selected_files: Vec<String>,
    pub summary: Option<ConfirmSummary>,
    pub status: Option<String>,
    pub tone: Option<String>,
    pub status_label: String,
    pub log: String,
}

impl WizardSnapshot {
    pub(crate) fn new(
        view: WizardView,
        instances: Vec<StackTarget>,
        files: Vec<FileView>,
        selected_files: Vec<String>,
        summary: Option<ConfirmSummary>,
    ) -> Self {
        Self {
            step: format!("{:?}", view.step),
            indicator: view.indicator,
            hint: view.hint,
            back_enabled: view.back_enabled,
            next_visible: view.next_visible,
            next_enabled: view.next_enabled,
            submit_label: view.submit.label,
            submit_enabled: view.submit.visible && view.submit.enabled,
            instances,
            instances_shown: view.instances_shown,
            files,
            selected_files,
            summary,
            status: view.status.map(|status| status.to_string()),
            tone: view.tone.map(|tone| format!("{tone:?}").to_lowercase()),
            status_label: view.status_label,
            log: view.log,
        }
    }
}

fn serialize_kind<S: serde::Serializer>(
    kind: &ErrorKind,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let label = match kind {
        ErrorKind::NetworkFailure => "network_failure",
        ErrorKind::ServerRejection => "server_rejection",
        ErrorKind::ValidationFailure => "validation_failure",
    };
    serializer.serialize_str(label)
}
