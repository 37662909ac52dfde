//! Inject wizard: pick a stack, pick files, confirm, then follow the remote
//! copy job until it finishes.
//!
//! [`InjectWizard::dispatch`] is the only way state changes. It returns the
//! side effects the caller must run; their results come back as inputs
//! tagged with the generation that requested them, so answers that arrive
//! after the wizard was closed or reopened are dropped.

use std::time::Duration;

use indexmap::IndexSet;
use migops_api::{
    InjectAccepted, InjectRequest, JobStatus, JobStatusReport, StackTarget, StatusTone,
};
use serde::Serialize;

use crate::artifacts::ArtifactGroup;
use crate::meta_cache::needs_meta;

pub const HINT_SELECT_INSTANCE: &str = "Pick the Landmark stack that will receive the files.";
pub const HINT_INSTANCE_REQUIRED: &str = "Please select a stack to continue.";
pub const HINT_SELECT_FILES: &str = "Choose which files to copy into /opt/infor/landmark/tmp.";
pub const HINT_FILES_REQUIRED: &str = "Please select at least one file.";
pub const HINT_CONFIRM: &str =
    "Review and confirm. Conflicting files are pre-cleared before copying.";
pub const HINT_SUBMITTING: &str = "Running SSM command on the selected stack…";

pub const LABEL_START_FAILED: &str = "Failed to start";
pub const LABEL_STATUS_ERROR: &str = "Status error";
pub const LABEL_POLL_TIMEOUT: &str = "Client poll timeout";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardStep {
    SelectInstance,
    SelectFiles,
    Confirm,
    Submitting,
    Polling,
    Finished(JobStatus),
}

impl WizardStep {
    pub fn indicator(self) -> &'static str {
        match self {
            WizardStep::SelectInstance => "Step 1 of 3 — Select target stack",
            WizardStep::SelectFiles => "Step 2 of 3 — Select files to inject",
            _ => "Step 3 of 3 — Confirm & inject",
        }
    }

    fn hint(self) -> &'static str {
        match self {
            WizardStep::SelectInstance => HINT_SELECT_INSTANCE,
            WizardStep::SelectFiles => HINT_SELECT_FILES,
            WizardStep::Confirm => HINT_CONFIRM,
            WizardStep::Submitting | WizardStep::Polling | WizardStep::Finished(_) => {
                HINT_SUBMITTING
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum WizardInput {
    Open(ArtifactGroup),
    InstancesLoaded {
        generation: u64,
        result: Result<Vec<StackTarget>, String>,
    },
    FilterInstances(String),
    PickInstance(String),
    ToggleFile(String),
    SelectAllFiles,
    ClearFiles,
    Next,
    Back,
    Submit,
    JobStarted {
        generation: u64,
        result: Result<InjectAccepted, String>,
    },
    StatusReceived {
        generation: u64,
        result: Result<JobStatusReport, String>,
    },
    PollTimedOut {
        generation: u64,
    },
    Close,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardEffect {
    LoadInstances {
        generation: u64,
    },
    HydrateMeta {
        keys: Vec<String>,
    },
    StartJob {
        generation: u64,
        request: InjectRequest,
    },
    PollStatus {
        generation: u64,
        job_id: String,
        instance_id: String,
        delay: Duration,
    },
    Dismiss,
}

#[derive(Clone, Debug, Default)]
pub struct WizardState {
    pub display_prefix: String,
    pub key_prefix: String,
    pub files: Vec<String>,
    pub instances: Vec<StackTarget>,
    pub instances_loading: bool,
    pub instance_filter: String,
    pub selected_instance: Option<StackTarget>,
    pub selected_files: IndexSet<String>,
    pub hint: String,
    pub job: Option<InjectAccepted>,
    pub status: Option<JobStatus>,
    pub status_label: String,
    pub log: String,
}

impl WizardState {
    fn for_group(group: ArtifactGroup) -> Self {
        Self {
            display_prefix: group.display_prefix,
            key_prefix: group.key_prefix,
            files: group.files,
            instances_loading: true,
            hint: HINT_SELECT_INSTANCE.to_string(),
            ..Self::default()
        }
    }

    /// Instances whose row text contains the filter, ignoring case.
    pub fn visible_instances(&self) -> Vec<&StackTarget> {
        let term = self.instance_filter.trim().to_lowercase();
        self.instances
            .iter()
            .filter(|stack| term.is_empty() || row_text(stack).contains(&term))
            .collect()
    }

    fn versioned_keys(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|name| needs_meta(name))
            .map(|name| format!("{}{name}", self.key_prefix))
            .collect()
    }
}

fn row_text(stack: &StackTarget) -> String {
    [
        stack.name.as_str(),
        stack.id.as_str(),
        stack.env.as_deref().unwrap_or_default(),
        stack.region.as_deref().unwrap_or_default(),
    ]
    .join(" ")
    .to_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitAction {
    Submit,
    Close,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitControl {
    pub visible: bool,
    pub label: &'static str,
    pub enabled: bool,
    pub action: SubmitAction,
}

/// What a front end needs to draw the wizard for the current step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WizardView {
    pub step: WizardStep,
    pub indicator: &'static str,
    pub hint: String,
    pub back_enabled: bool,
    pub next_visible: bool,
    pub next_enabled: bool,
    pub submit: SubmitControl,
    pub instances_shown: usize,
    pub status: Option<JobStatus>,
    pub tone: Option<StatusTone>,
    pub status_label: String,
    pub log: String,
}

/// Step-3 summary of what is about to be copied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmSummary {
    pub stack_name: String,
    pub stack_id: String,
    pub display_prefix: String,
    pub file_count: usize,
    pub files: Vec<String>,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct InjectWizard {
    open: Option<WizardStep>,
    state: WizardState,
    generation: u64,
    poll_interval: Duration,
}

impl Default for InjectWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectWizard {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            open: None,
            state: WizardState::default(),
            generation: 0,
            poll_interval,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn step(&self) -> Option<WizardStep> {
        self.open
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dispatch(&mut self, input: WizardInput) -> Vec<WizardEffect> {
        if let WizardInput::Open(group) = input {
            return self.open(group);
        }
        let Some(step) = self.open else {
            return Vec::new();
        };

        match (step, input) {
            (_, WizardInput::Close) => self.close(),

            (
                WizardStep::SelectInstance,
                WizardInput::InstancesLoaded { generation, result },
            ) if generation == self.generation => {
                self.state.instances_loading = false;
                match result {
                    Ok(instances) => self.state.instances = instances,
                    Err(err) => {
                        self.state.instances.clear();
                        self.state.hint = format!("Failed to load stacks: {err}");
                    }
                }
                Vec::new()
            }
            (WizardStep::SelectInstance, WizardInput::FilterInstances(term)) => {
                self.state.instance_filter = term;
                Vec::new()
            }
            (WizardStep::SelectInstance, WizardInput::PickInstance(id)) => {
                if let Some(stack) = self.state.instances.iter().find(|stack| stack.id == id) {
                    self.state.selected_instance = Some(stack.clone());
                }
                Vec::new()
            }
            (WizardStep::SelectInstance, WizardInput::Next) => {
                if self.state.instances_loading {
                    return Vec::new();
                }
                if self.state.selected_instance.is_none() {
                    self.state.hint = HINT_INSTANCE_REQUIRED.to_string();
                    return Vec::new();
                }
                self.go(WizardStep::SelectFiles);
                let keys = self.state.versioned_keys();
                if keys.is_empty() {
                    Vec::new()
                } else {
                    vec![WizardEffect::HydrateMeta { keys }]
                }
            }

            (WizardStep::SelectFiles, WizardInput::ToggleFile(name)) => {
                if !self.state.selected_files.shift_remove(&name)
                    && self.state.files.contains(&name)
                {
                    self.state.selected_files.insert(name);
                }
                Vec::new()
            }
            (WizardStep::SelectFiles, WizardInput::SelectAllFiles) => {
                self.state.selected_files = self.state.files.iter().cloned().collect();
                Vec::new()
            }
            (WizardStep::SelectFiles, WizardInput::ClearFiles) => {
                self.state.selected_files.clear();
                Vec::new()
            }
            (WizardStep::SelectFiles, WizardInput::Next) => {
                if self.state.selected_files.is_empty() {
                    self.state.hint = HINT_FILES_REQUIRED.to_string();
                } else {
                    self.go(WizardStep::Confirm);
                }
                Vec::new()
            }
            (WizardStep::SelectFiles, WizardInput::Back) => {
                self.go(WizardStep::SelectInstance);
                Vec::new()
            }

            (WizardStep::Confirm, WizardInput::Back) => {
                self.go(WizardStep::SelectFiles);
                Vec::new()
            }
            (WizardStep::Confirm, WizardInput::Submit) => self.submit(),

            (WizardStep::Submitting, WizardInput::JobStarted { generation, result })
                if generation == self.generation =>
            {
                match result {
                    Ok(job) => {
                        let effect = WizardEffect::PollStatus {
                            generation: self.generation,
                            job_id: job.job_id.clone(),
                            instance_id: job.instance_id.clone(),
                            delay: Duration::ZERO,
                        };
                        self.state.job = Some(job);
                        self.open = Some(WizardStep::Polling);
                        vec![effect]
                    }
                    Err(err) => {
                        self.finish(JobStatus::Failed, LABEL_START_FAILED.to_string(), err);
                        Vec::new()
                    }
                }
            }

            (WizardStep::Polling, WizardInput::StatusReceived { generation, result })
                if generation == self.generation =>
            {
                self.on_status(result)
            }
            (WizardStep::Polling, WizardInput::PollTimedOut { generation })
                if generation == self.generation =>
            {
                let log = std::mem::take(&mut self.state.log);
                self.finish(JobStatus::TimedOut, LABEL_POLL_TIMEOUT.to_string(), log);
                Vec::new()
            }

            (WizardStep::Finished(_), WizardInput::Submit) => self.close(),

            _ => Vec::new(),
        }
    }

    /// Delay between status requests after the first one.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn open(&mut self, group: ArtifactGroup) -> Vec<WizardEffect> {
        self.generation += 1;
        self.state = WizardState::for_group(group);
        self.open = Some(WizardStep::SelectInstance);
        vec![WizardEffect::LoadInstances {
            generation: self.generation,
        }]
    }

    fn close(&mut self) -> Vec<WizardEffect> {
        self.generation += 1;
        self.state = WizardState::default();
        self.open = None;
        vec![WizardEffect::Dismiss]
    }

    fn go(&mut self, step: WizardStep) {
        self.open = Some(step);
        self.state.hint = step.hint().to_string();
    }

    fn submit(&mut self) -> Vec<WizardEffect> {
        let Some(instance) = self.state.selected_instance.as_ref() else {
            return Vec::new();
        };
        if self.state.selected_files.is_empty() {
            return Vec::new();
        }
        let request = InjectRequest {
            instance_id: instance.id.clone(),
            key_prefix: self.state.key_prefix.clone(),
            files: self.state.selected_files.iter().cloned().collect(),
            preclear: true,
        };
        self.go(WizardStep::Submitting);
        vec![WizardEffect::StartJob {
            generation: self.generation,
            request,
        }]
    }

    fn on_status(&mut self, result: Result<JobStatusReport, String>) -> Vec<WizardEffect> {
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.finish(JobStatus::Failed, LABEL_STATUS_ERROR.to_string(), err);
                return Vec::new();
            }
        };

        let label = if report.status_details.trim().is_empty() {
            report.status.to_string()
        } else {
            report.status_details.clone()
        };
        let log = report.combined_output();
        if report.status.is_terminal() {
            self.finish(report.status, label, log);
            return Vec::new();
        }

        self.state.status = Some(report.status);
        self.state.status_label = label;
        self.state.log = log;
        match self.state.job.as_ref() {
            Some(job) => vec![WizardEffect::PollStatus {
                generation: self.generation,
                job_id: job.job_id.clone(),
                instance_id: job.instance_id.clone(),
                delay: self.poll_interval,
            }],
            None => Vec::new(),
        }
    }

    fn finish(&mut self, status: JobStatus, label: String, log: String) {
        self.open = Some(WizardStep::Finished(status));
        self.state.status = Some(status);
        self.state.status_label = label;
        self.state.log = log;
    }

    pub fn summary(&self) -> Option<ConfirmSummary> {
        let stack = self.state.selected_instance.as_ref()?;
        Some(ConfirmSummary {
            stack_name: stack.name.clone(),
            stack_id: stack.id.clone(),
            display_prefix: self.state.display_prefix.clone(),
            file_count: self.state.selected_files.len(),
            files: self.state.selected_files.iter().cloned().collect(),
        })
    }

    pub fn view(&self) -> Option<WizardView> {
        let step = self.open?;
        let state = &self.state;
        let submit = match step {
            WizardStep::SelectInstance | WizardStep::SelectFiles => SubmitControl {
                visible: false,
                label: "Inject",
                enabled: false,
                action: SubmitAction::Submit,
            },
            WizardStep::Confirm => SubmitControl {
                visible: true,
                label: "Inject",
                enabled: state.selected_instance.is_some() && !state.selected_files.is_empty(),
                action: SubmitAction::Submit,
            },
            WizardStep::Submitting | WizardStep::Polling => SubmitControl {
                visible: true,
                label: "Injecting…",
                enabled: false,
                action: SubmitAction::Submit,
            },
            WizardStep::Finished(_) => SubmitControl {
                visible: true,
                label: "Close",
                enabled: true,
                action: SubmitAction::Close,
            },
        };
        Some(WizardView {
            step,
            indicator: step.indicator(),
            hint: state.hint.clone(),
            back_enabled: matches!(step, WizardStep::SelectFiles | WizardStep::Confirm),
            next_visible: matches!(step, WizardStep::SelectInstance | WizardStep::SelectFiles),
            next_enabled: match step {
                WizardStep::SelectInstance => !state.instances_loading,
                WizardStep::SelectFiles => true,
                _ => false,
            },
            submit,
            instances_shown: state.visible_instances().len(),
            status: state.status,
            tone: state.status.map(JobStatus::tone),
            status_label: state.status_label.clone(),
            log: state.log.clone(),
        })
    }
}
