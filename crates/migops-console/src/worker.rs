use std::sync::Arc;
use std::thread;

use migops_api::{ApiError, ConsoleApi};
use migops_telemetry as telemetry;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::artifacts::{load_prefix_map, ArtifactBrowser, FileRow, PrefixMap, StorageLayout};
use crate::autofill::{run_autofill, AutofillSettings};
use crate::commands::{AppEvent, FileView, UiCommand, WizardSnapshot};
use crate::config::AppConfig;
use crate::error::ConsoleError;
use crate::inject::{InjectDriver, StatusPoll};
use crate::meta_cache::MetaCache;
use crate::selection::SelectionBoard;
use crate::ui_events::UiEventSender;
use crate::upload::{self, UploadRun};
use crate::wizard::{InjectWizard, WizardEffect, WizardInput};

const COMMAND_QUEUE_SIZE: usize = 128;

/// Everything both page controllers own; lives on the worker thread.
pub struct WorkerState {
    cfg: AppConfig,
    browser: ArtifactBrowser,
    cache: MetaCache,
    wizard: InjectWizard,
    board: SelectionBoard,
    upload: Option<UploadRun>,
    inject: InjectDriver,
    pending_poll: Option<StatusPoll>,
    poll_task: Option<AbortHandle>,
}

impl WorkerState {
    pub fn new(cfg: AppConfig, prefix_map: &PrefixMap) -> Self {
        let layout = cfg.storage_layout();
        Self {
            browser: ArtifactBrowser::new(layout.clone(), prefix_map),
            cache: MetaCache::new(),
            wizard: InjectWizard::with_poll_interval(cfg.poll_interval()),
            board: SelectionBoard::new(&cfg.apps, &layout),
            upload: None,
            inject: InjectDriver::new().with_poll_timeout(cfg.poll_timeout()),
            pending_poll: None,
            poll_task: None,
            cfg,
        }
    }

    /// Builds state from config, reading the prefix map if one is configured.
    pub fn from_config(cfg: AppConfig) -> Result<Self, ConsoleError> {
        let prefix_map = match cfg.prefix_map_path() {
            Some(path) => load_prefix_map(&path)?,
            None => PrefixMap::new(),
        };
        Ok(Self::new(cfg, &prefix_map))
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn browser(&self) -> &ArtifactBrowser {
        &self.browser
    }

    pub fn board(&self) -> &SelectionBoard {
        &self.board
    }

    pub fn wizard(&self) -> &InjectWizard {
        &self.wizard
    }

    pub fn cache(&self) -> &MetaCache {
        &self.cache
    }
}

fn wizard_event(wizard: &InjectWizard, cache: &MetaCache, layout: &StorageLayout) -> AppEvent {
    let Some(view) = wizard.view() else {
        return AppEvent::WizardDismissed;
    };
    let state = wizard.state();
    let files = state
        .files
        .iter()
        .map(|name| {
            let row = FileRow::new(layout, &state.key_prefix, name);
            FileView {
                version: cache.display(&row.rel_key).to_string(),
                row,
            }
        })
        .collect();
    AppEvent::Wizard {
        view: Box::new(WizardSnapshot::new(
            view,
            state.instances.clone(),
            files,
            state.selected_files.iter().cloned().collect(),
            wizard.summary(),
        )),
    }
}

fn selection_event(board: &SelectionBoard, app: &str) -> Result<AppEvent, ConsoleError> {
    let selection = board.app(app)?;
    Ok(AppEvent::Selection {
        effective_stream: selection.effective_stream().to_string(),
        selection: selection.clone(),
        destination: board.destination(),
    })
}

pub async fn handle_command(
    cmd: UiCommand,
    state: &mut WorkerState,
    api: &dyn ConsoleApi,
    ui: &UiEventSender,
) -> Result<(), ConsoleError> {
    match cmd {
        UiCommand::ListGroups => {
            ui.send(AppEvent::Groups {
                groups: state.browser.groups().to_vec(),
            });
        }
        UiCommand::ShowFiles { display_prefix } => {
            let rows = state.browser.file_rows(&display_prefix)?;
            state
                .cache
                .hydrate(api, rows.iter().map(|row| row.rel_key.as_str()))
                .await;
            let files = rows
                .into_iter()
                .map(|row| FileView {
                    version: state.cache.display(&row.rel_key).to_string(),
                    row,
                })
                .collect();
            ui.send(AppEvent::Files {
                display_prefix,
                files,
            });
        }
        UiCommand::CopyUri {
            display_prefix,
            file,
        } => {
            let row = state
                .browser
                .file_rows(&display_prefix)?
                .into_iter()
                .find(|row| row.name == file)
                .ok_or_else(|| {
                    ApiError::Validation(format!("{file} is not listed under {display_prefix}"))
                })?;
            ui.send(AppEvent::Clipboard { text: row.s3_uri });
        }
        UiCommand::OpenWizard { display_prefix } => {
            let group = state.browser.group(&display_prefix)?.clone();
            drive_wizard(state, api, ui, WizardInput::Open(group)).await;
        }
        UiCommand::Wizard(input) => {
            drive_wizard(state, api, ui, input).await;
        }
        UiCommand::SearchStreams { app, term, page } => {
            let page = state.board.search_streams(api, &app, &term, page).await?;
            ui.send(AppEvent::StreamResults { app, page });
        }
        UiCommand::SearchBuilds { app, term, page } => {
            let page = state.board.search_builds(api, &app, &term, page).await?;
            ui.send(AppEvent::BuildResults { app, page });
        }
        UiCommand::SelectStream { app, stream } => {
            state.board.app_mut(&app)?.select_stream(stream);
            ui.send(selection_event(&state.board, &app)?);
        }
        UiCommand::SelectBuild { app, build } => {
            state.board.app_mut(&app)?.select_build(build);
            ui.send(selection_event(&state.board, &app)?);
        }
        UiCommand::SetManualMode { app, enabled } => {
            state.board.app_mut(&app)?.set_manual_mode(enabled);
            ui.send(selection_event(&state.board, &app)?);
        }
        UiCommand::SetManualText { app, text } => {
            state.board.app_mut(&app)?.set_manual_text(&text);
            ui.send(selection_event(&state.board, &app)?);
        }
        UiCommand::ValidateManualStream { app } => {
            state.board.validate_manual_stream(api, &app).await?;
            ui.send(selection_event(&state.board, &app)?);
        }
        UiCommand::SetSuffix { suffix } => {
            state.board.set_suffix(&suffix);
            ui.send(AppEvent::Log {
                line: format!("Destination: {}", state.board.destination()),
            });
        }
        UiCommand::Autofill { date } => {
            let settings = AutofillSettings::from(&state.cfg);
            let report = run_autofill(api, &mut state.board, &settings, date).await?;
            let apps: Vec<String> = report.apps.iter().map(|(app, _)| app.clone()).collect();
            ui.send(AppEvent::Autofill { report });
            for app in apps {
                ui.send(selection_event(&state.board, &app)?);
            }
        }
        UiCommand::PlanUpload => {
            let run = upload::plan(api, &state.board).await?;
            ui.send(AppEvent::UploadPlanned { run: run.clone() });
            state.upload = Some(run);
        }
        UiCommand::ExecuteUpload => {
            let mut run = state
                .upload
                .take()
                .ok_or_else(|| ApiError::Validation("Plan the upload first.".into()))?;
            let outcome = run
                .execute(api, |index, item| {
                    ui.send(AppEvent::UploadProgress {
                        index,
                        item: item.clone(),
                    });
                })
                .await;
            ui.send(AppEvent::UploadFinished { outcome });
            state.upload = Some(run);
        }
    }
    Ok(())
}

async fn drive_wizard(
    state: &mut WorkerState,
    api: &dyn ConsoleApi,
    ui: &UiEventSender,
    input: WizardInput,
) {
    if matches!(input, WizardInput::Open(_) | WizardInput::Close) {
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        state.pending_poll = None;
    }
    let layout = state.browser.layout().clone();
    let poll = state
        .inject
        .step(
            api,
            &mut state.wizard,
            &mut state.cache,
            input,
            |wizard, cache, effect| match effect {
                None => {
                    ui.send(wizard_event(wizard, cache, &layout));
                }
                Some(WizardEffect::PollStatus { job_id, .. }) => {
                    ui.send(AppEvent::Log {
                        line: format!("Checking status of {job_id}"),
                    });
                }
                Some(_) => {}
            },
        )
        .await;
    if poll.is_some() {
        state.pending_poll = poll;
    }
}

/// Moves a poll handed back by the wizard onto `poll_tasks`.
fn schedule_poll(
    state: &mut WorkerState,
    api: &Arc<dyn ConsoleApi>,
    poll_tasks: &mut JoinSet<WizardInput>,
) {
    if let Some(poll) = state.pending_poll.take() {
        let api = Arc::clone(api);
        state.poll_task = Some(poll_tasks.spawn(async move { poll.run(api.as_ref()).await }));
    }
}

/// Runs commands one at a time on a dedicated thread with its own runtime.
///
/// Status polls run as tasks beside the command loop so Close and Open still
/// get through while a job is being followed. The thread exits once every
/// command sender is dropped and no poll is left, after sending
/// [`AppEvent::WorkerStopped`].
pub fn spawn_worker(
    mut state: WorkerState,
    api: Arc<dyn ConsoleApi>,
    ui: UiEventSender,
) -> (mpsc::Sender<UiCommand>, thread::JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<UiCommand>(COMMAND_QUEUE_SIZE);
    let handle = thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                error!("failed to build tokio runtime: {err}");
                ui.send(AppEvent::Alert {
                    kind: migops_api::ErrorKind::NetworkFailure,
                    message: format!("worker failed to start: {err}"),
                });
                ui.send(AppEvent::WorkerStopped);
                return;
            }
        };

        rt.block_on(async move {
            let mut poll_tasks: JoinSet<WizardInput> = JoinSet::new();
            let mut accepting = true;
            while accepting || !poll_tasks.is_empty() {
                tokio::select! {
                    cmd = cmd_rx.recv(), if accepting => {
                        let Some(cmd) = cmd else {
                            accepting = false;
                            continue;
                        };
                        let cmd_name = cmd.name();
                        telemetry::event("ui.command.start", &[("command", cmd_name)]);
                        debug!(command = cmd_name, "handling command");
                        match handle_command(cmd, &mut state, api.as_ref(), &ui).await {
                            Ok(()) => {
                                telemetry::event(
                                    "ui.command.result",
                                    &[("command", cmd_name), ("result", "ok")],
                                );
                            }
                            Err(err) => {
                                telemetry::event(
                                    "ui.command.result",
                                    &[("command", cmd_name), ("result", "err")],
                                );
                                warn!(command = cmd_name, "command failed: {err}");
                                ui.send(AppEvent::Alert {
                                    kind: err.kind(),
                                    message: err.to_string(),
                                });
                            }
                        }
                        schedule_poll(&mut state, &api, &mut poll_tasks);
                    }
                    Some(joined) = poll_tasks.join_next(), if !poll_tasks.is_empty() => {
                        match joined {
                            Ok(input) => {
                                drive_wizard(&mut state, api.as_ref(), &ui, input).await;
                                schedule_poll(&mut state, &api, &mut poll_tasks);
                            }
                            Err(err) if !err.is_cancelled() => {
                                warn!("status poll failed: {err}");
                            }
                            Err(_) => {}
                        }
                    }
                    else => break,
                }
            }
            ui.send(AppEvent::WorkerStopped);
        });
    });
    (cmd_tx, handle)
}
