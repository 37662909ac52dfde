use std::collections::VecDeque;
use std::time::Duration;

use migops_api::{ConsoleApi, JobStatus};
use migops_telemetry as telemetry;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::meta_cache::MetaCache;
use crate::wizard::{InjectWizard, WizardEffect, WizardInput, WizardStep};

/// One pending status request for a running inject job.
///
/// Runs apart from the wizard so the caller can keep taking input while it
/// waits, and drop it when the wizard is closed or reopened.
#[derive(Clone, Debug)]
pub struct StatusPoll {
    pub generation: u64,
    pub job_id: String,
    pub instance_id: String,
    delay: Duration,
    deadline: Option<Instant>,
}

impl StatusPoll {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits out the delay, then asks the backend for the job status.
    pub async fn run(self, api: &dyn ConsoleApi) -> WizardInput {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!(job_id = %self.job_id, "giving up on inject job");
            return WizardInput::PollTimedOut {
                generation: self.generation,
            };
        }
        debug!(job_id = %self.job_id, "polling inject status");
        let result = api
            .inject_status(&self.job_id, &self.instance_id)
            .await
            .map_err(|err| err.to_string());
        WizardInput::StatusReceived {
            generation: self.generation,
            result,
        }
    }
}

/// Runs wizard effects against the backend.
#[derive(Debug, Default)]
pub struct InjectDriver {
    poll_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl InjectDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends polling with a client-side TimedOut once the job has run this long.
    pub fn with_poll_timeout(mut self, poll_timeout: Option<Duration>) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Dispatches `input` and runs every effect it causes except the status
    /// poll, which is handed back for the caller to schedule.
    ///
    /// `observe` sees the wizard after each transition and each effect as it
    /// starts, which is how front ends follow the job.
    pub async fn step(
        &mut self,
        api: &dyn ConsoleApi,
        wizard: &mut InjectWizard,
        cache: &mut MetaCache,
        input: WizardInput,
        mut observe: impl FnMut(&InjectWizard, &MetaCache, Option<&WizardEffect>),
    ) -> Option<StatusPoll> {
        let mut queue = VecDeque::new();
        feed(wizard, cache, input, &mut queue, &mut observe);
        let mut poll = None;

        while let Some(effect) = queue.pop_front() {
            observe(wizard, cache, Some(&effect));
            let next = match effect {
                WizardEffect::LoadInstances { generation } => {
                    let result = api.running_stacks().await.map_err(|err| err.to_string());
                    if let Err(err) = &result {
                        warn!("failed to load running stacks: {err}");
                    }
                    Some(WizardInput::InstancesLoaded { generation, result })
                }
                WizardEffect::HydrateMeta { keys } => {
                    if cache.hydrate(api, keys.iter().map(String::as_str)).await > 0 {
                        observe(wizard, cache, None);
                    }
                    None
                }
                WizardEffect::StartJob {
                    generation,
                    request,
                } => {
                    let files = request.files.len().to_string();
                    telemetry::event(
                        "inject.submit",
                        &[
                            ("instance_id", request.instance_id.as_str()),
                            ("key_prefix", request.key_prefix.as_str()),
                            ("files", files.as_str()),
                        ],
                    );
                    info!(
                        instance_id = %request.instance_id,
                        files = request.files.len(),
                        "starting inject job"
                    );
                    let result = api
                        .start_inject(&request)
                        .await
                        .map_err(|err| err.to_string());
                    if result.is_ok() {
                        self.deadline = self.poll_timeout.map(|limit| Instant::now() + limit);
                    }
                    Some(WizardInput::JobStarted { generation, result })
                }
                WizardEffect::PollStatus {
                    generation,
                    job_id,
                    instance_id,
                    delay,
                } => {
                    poll = Some(StatusPoll {
                        generation,
                        job_id,
                        instance_id,
                        delay,
                        deadline: self.deadline,
                    });
                    None
                }
                WizardEffect::Dismiss => {
                    self.deadline = None;
                    None
                }
            };

            if let Some(input) = next {
                feed(wizard, cache, input, &mut queue, &mut observe);
            }
        }
        poll
    }

    /// Like [`InjectDriver::step`] but awaits each status poll in place until
    /// the job reaches a terminal status or the wizard stops polling.
    pub async fn run(
        &mut self,
        api: &dyn ConsoleApi,
        wizard: &mut InjectWizard,
        cache: &mut MetaCache,
        input: WizardInput,
        mut observe: impl FnMut(&InjectWizard, &MetaCache, Option<&WizardEffect>),
    ) -> Option<JobStatus> {
        let mut next = self.step(api, wizard, cache, input, &mut observe).await;
        while let Some(poll) = next {
            let input = poll.run(api).await;
            next = self.step(api, wizard, cache, input, &mut observe).await;
        }
        match wizard.step() {
            Some(WizardStep::Finished(status)) => Some(status),
            _ => None,
        }
    }
}

fn feed(
    wizard: &mut InjectWizard,
    cache: &MetaCache,
    input: WizardInput,
    queue: &mut VecDeque<WizardEffect>,
    observe: &mut impl FnMut(&InjectWizard, &MetaCache, Option<&WizardEffect>),
) {
    let was_finished = matches!(wizard.step(), Some(WizardStep::Finished(_)));
    queue.extend(wizard.dispatch(input));
    observe(wizard, cache, None);
    if was_finished {
        return;
    }
    if let Some(WizardStep::Finished(status)) = wizard.step() {
        let label = wizard.state().status_label.clone();
        telemetry::event(
            "inject.finished",
            &[("status", status.as_str()), ("label", label.as_str())],
        );
        info!(status = %status, "inject job finished: {label}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactGroup;
    use crate::test_support::{stack, StubApi};
    use crate::wizard::{LABEL_POLL_TIMEOUT, LABEL_START_FAILED};
    use migops_api::{ApiError, InjectAccepted, JobStatusReport};

    fn group() -> ArtifactGroup {
        ArtifactGroup {
            display_prefix: "LARS/".into(),
            category: "ROOT".into(),
            key_prefix: String::new(),
            files: vec!["LANDMARK.jar".into(), "grid-installer.jar".into()],
            files_count: 2,
        }
    }

    async fn to_confirm(
        api: &StubApi,
        driver: &mut InjectDriver,
        wizard: &mut InjectWizard,
        cache: &mut MetaCache,
    ) {
        for input in [
            WizardInput::Open(group()),
            WizardInput::PickInstance("i-0abc".into()),
            WizardInput::Next,
            WizardInput::SelectAllFiles,
            WizardInput::Next,
        ] {
            driver.run(api, wizard, cache, input, |_, _, _| {}).await;
        }
        assert_eq!(wizard.step(), Some(WizardStep::Confirm));
    }

    fn scripted_api() -> StubApi {
        let api = StubApi::new();
        api.push_stacks(Ok(vec![stack("i-0abc", "lm-dev-01")]));
        api
    }

    fn accept(api: &StubApi, job_id: &str) {
        api.push_inject(Ok(InjectAccepted {
            job_id: job_id.into(),
            instance_id: "i-0abc".into(),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal_status() {
        let api = scripted_api();
        accept(&api, "cmd-42");
        for _ in 0..3 {
            api.push_status(Ok(JobStatusReport::new(JobStatus::InProgress)));
        }
        let mut done = JobStatusReport::new(JobStatus::Success);
        done.stdout = "copied 2 files".into();
        api.push_status(Ok(done));

        let mut driver = InjectDriver::new();
        let mut wizard = InjectWizard::new();
        let mut cache = MetaCache::new();
        to_confirm(&api, &mut driver, &mut wizard, &mut cache).await;

        let mut polls = 0;
        let outcome = driver
            .run(&api, &mut wizard, &mut cache, WizardInput::Submit, |_, _, effect| {
                if matches!(effect, Some(WizardEffect::PollStatus { .. })) {
                    polls += 1;
                }
            })
            .await;

        assert_eq!(outcome, Some(JobStatus::Success));
        assert_eq!(polls, 4);
        assert_eq!(api.status_calls(), 4);
        assert_eq!(wizard.state().log, "copied 2 files");
        let sent = api.inject_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key_prefix, "");
        assert_eq!(sent[0].files, vec!["LANDMARK.jar", "grid-installer.jar"]);
    }

    #[tokio::test]
    async fn submit_hands_back_the_first_poll_unsent() {
        let api = scripted_api();
        accept(&api, "cmd-9");
        api.push_status(Ok(JobStatusReport::new(JobStatus::Success)));

        let mut driver = InjectDriver::new();
        let mut wizard = InjectWizard::new();
        let mut cache = MetaCache::new();
        to_confirm(&api, &mut driver, &mut wizard, &mut cache).await;

        let poll = driver
            .step(&api, &mut wizard, &mut cache, WizardInput::Submit, |_, _, _| {})
            .await
            .expect("a running job schedules a poll");
        assert_eq!(poll.job_id, "cmd-9");
        assert!(poll.delay().is_zero());
        assert_eq!(api.status_calls(), 0);
        assert_eq!(wizard.step(), Some(WizardStep::Polling));

        let input = poll.run(&api).await;
        assert_eq!(api.status_calls(), 1);
        let next = driver
            .step(&api, &mut wizard, &mut cache, input, |_, _, _| {})
            .await;
        assert!(next.is_none());
        assert_eq!(wizard.step(), Some(WizardStep::Finished(JobStatus::Success)));
    }

    #[tokio::test]
    async fn start_failure_never_polls() {
        let api = scripted_api();
        api.push_inject(Err(ApiError::Rejected("SSM send failed".into())));

        let mut driver = InjectDriver::new();
        let mut wizard = InjectWizard::new();
        let mut cache = MetaCache::new();
        to_confirm(&api, &mut driver, &mut wizard, &mut cache).await;

        let outcome = driver
            .run(&api, &mut wizard, &mut cache, WizardInput::Submit, |_, _, _| {})
            .await;
        assert_eq!(outcome, Some(JobStatus::Failed));
        assert_eq!(api.status_calls(), 0);
        assert_eq!(wizard.state().status_label, LABEL_START_FAILED);
        assert_eq!(wizard.state().log, "SSM send failed");
    }

    #[tokio::test(start_paused = true)]
    async fn client_ceiling_times_out_a_stuck_job() {
        let api = scripted_api();
        accept(&api, "cmd-7");
        for _ in 0..10 {
            api.push_status(Ok(JobStatusReport::new(JobStatus::Delayed)));
        }

        let mut driver = InjectDriver::new().with_poll_timeout(Some(Duration::from_secs(5)));
        let mut wizard = InjectWizard::new();
        let mut cache = MetaCache::new();
        to_confirm(&api, &mut driver, &mut wizard, &mut cache).await;

        let outcome = driver
            .run(&api, &mut wizard, &mut cache, WizardInput::Submit, |_, _, _| {})
            .await;
        assert_eq!(outcome, Some(JobStatus::TimedOut));
        assert_eq!(wizard.state().status_label, LABEL_POLL_TIMEOUT);
        // polls at 0s, 2s and 4s; the check at 6s trips the ceiling
        assert_eq!(api.status_calls(), 3);
    }

    #[tokio::test]
    async fn file_step_hydrates_metadata_once() {
        let api = scripted_api();
        let mut driver = InjectDriver::new();
        let mut wizard = InjectWizard::new();
        let mut cache = MetaCache::new();

        to_confirm(&api, &mut driver, &mut wizard, &mut cache).await;
        assert_eq!(api.meta_calls(), 2);

        for input in [WizardInput::Back, WizardInput::Back, WizardInput::Next] {
            driver
                .run(&api, &mut wizard, &mut cache, input, |_, _, _| {})
                .await;
        }
        assert_eq!(api.meta_calls(), 2);
    }
}
