use std::io::Write;
use std::sync::Arc;

use base64::Engine;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use migops_api::{BuildOption, ConsoleApi, HttpConsoleApi, SelectOption};
use migops_console::{
    spawn_worker, AppConfig, AppEvent, UiCommand, UiEventQueue, WizardInput, WorkerState,
    DEFAULT_EVENT_QUEUE_SIZE,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "migops-cli", version, about = "Headless front end for the migops ops console")]
struct Cli {
    /// Console base URL (overrides MIGOPS_BASE_URL and the saved config)
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List artifact groups from the prefix map
    Groups,
    /// List the files of one group with their versions
    Files { prefix: String },
    /// Print the S3 URI of a file
    Copy {
        prefix: String,
        file: String,
        /// Also push the URI to the terminal clipboard via OSC 52
        #[arg(long)]
        osc52: bool,
    },
    /// List running stacks that can receive injected files
    Stacks,
    /// Inject files from a group into a running stack and follow the job
    Inject {
        prefix: String,
        #[arg(long)]
        stack: String,
        /// File to inject (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Inject every file in the group
        #[arg(long, conflicts_with = "files")]
        all: bool,
    },
    /// Search streams for an app
    Streams {
        app: String,
        #[arg(long, default_value = "")]
        term: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Search builds of a stream for an app
    Builds {
        app: String,
        #[arg(long)]
        stream: String,
        #[arg(long, default_value = "")]
        term: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Check a typed stream name against the catalog
    StreamExists { app: String, stream: String },
    /// Fill every app's stream and build for a month
    Autofill {
        /// Any day of the target month (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Plan and run an upload batch
    Upload {
        /// APP=STREAM:BUILD selection (repeatable)
        #[arg(long = "pick", value_parser = parse_pick)]
        picks: Vec<Pick>,
        /// Run autofill before applying picks
        #[arg(long)]
        autofill: bool,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Destination suffix under the bucket root, e.g. MT/AUG
        #[arg(long, default_value = "")]
        suffix: String,
        /// Plan only
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Pick {
    app: String,
    stream: String,
    build: String,
}

fn parse_pick(raw: &str) -> Result<Pick, String> {
    let (app, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected APP=STREAM:BUILD, got {raw}"))?;
    let (stream, build) = rest
        .split_once(':')
        .ok_or_else(|| format!("expected APP=STREAM:BUILD, got {raw}"))?;
    let (app, stream, build) = (app.trim(), stream.trim(), build.trim());
    if app.is_empty() || stream.is_empty() || build.is_empty() {
        return Err(format!("expected APP=STREAM:BUILD, got {raw}"));
    }
    Ok(Pick {
        app: app.into(),
        stream: stream.into(),
        build: build.into(),
    })
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn option(id: &str) -> SelectOption {
    SelectOption {
        id: id.into(),
        text: id.into(),
    }
}

fn commands_for(cmd: Cmd) -> Vec<UiCommand> {
    match cmd {
        Cmd::Groups => vec![UiCommand::ListGroups],
        Cmd::Files { prefix } => vec![UiCommand::ShowFiles {
            display_prefix: prefix,
        }],
        Cmd::Copy { prefix, file, .. } => vec![UiCommand::CopyUri {
            display_prefix: prefix,
            file,
        }],
        Cmd::Stacks => Vec::new(),
        Cmd::Inject {
            prefix,
            stack,
            files,
            all,
        } => {
            let mut cmds = vec![
                UiCommand::OpenWizard {
                    display_prefix: prefix,
                },
                UiCommand::Wizard(WizardInput::PickInstance(stack)),
                UiCommand::Wizard(WizardInput::Next),
            ];
            if all {
                cmds.push(UiCommand::Wizard(WizardInput::SelectAllFiles));
            }
            cmds.extend(
                files
                    .into_iter()
                    .map(|file| UiCommand::Wizard(WizardInput::ToggleFile(file))),
            );
            cmds.push(UiCommand::Wizard(WizardInput::Next));
            cmds.push(UiCommand::Wizard(WizardInput::Submit));
            cmds
        }
        Cmd::Streams { app, term, page } => vec![UiCommand::SearchStreams { app, term, page }],
        Cmd::Builds {
            app,
            stream,
            term,
            page,
        } => vec![
            UiCommand::SelectStream {
                app: app.clone(),
                stream: Some(option(&stream)),
            },
            UiCommand::SearchBuilds { app, term, page },
        ],
        Cmd::StreamExists { app, stream } => vec![
            UiCommand::SetManualMode {
                app: app.clone(),
                enabled: true,
            },
            UiCommand::SetManualText {
                app: app.clone(),
                text: stream,
            },
            UiCommand::ValidateManualStream { app },
        ],
        Cmd::Autofill { date } => vec![UiCommand::Autofill {
            date: date.unwrap_or_else(today),
        }],
        Cmd::Upload {
            picks,
            autofill,
            date,
            suffix,
            dry_run,
        } => {
            let mut cmds = Vec::new();
            if autofill {
                cmds.push(UiCommand::Autofill {
                    date: date.unwrap_or_else(today),
                });
            }
            for pick in picks {
                cmds.push(UiCommand::SelectStream {
                    app: pick.app.clone(),
                    stream: Some(option(&pick.stream)),
                });
                cmds.push(UiCommand::SelectBuild {
                    app: pick.app,
                    build: Some(BuildOption {
                        id: pick.build.clone(),
                        text: pick.build.clone(),
                        maturity: None,
                        release_id: Some(pick.build),
                    }),
                });
            }
            cmds.push(UiCommand::SetSuffix { suffix });
            cmds.push(UiCommand::PlanUpload);
            if !dry_run {
                cmds.push(UiCommand::ExecuteUpload);
            }
            cmds
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    migops_util::init_tracing("warn")?;
    migops_util::init_console_telemetry("migops-cli", env!("CARGO_PKG_VERSION"), "cli");
    let cli = Cli::parse();

    let mut cfg = AppConfig::load();
    if let Some(base_url) = cli.base_url {
        cfg.base_url = base_url;
    }
    let api: Arc<dyn ConsoleApi> = Arc::new(HttpConsoleApi::new(&cfg.http_config())?);

    if let Cmd::Stacks = cli.cmd {
        for stack in api.running_stacks().await? {
            println!("{}", serde_json::to_string(&stack)?);
        }
        return Ok(());
    }

    let osc52 = matches!(cli.cmd, Cmd::Copy { osc52: true, .. });
    let commands = commands_for(cli.cmd);
    let state = WorkerState::from_config(cfg)?;
    let (queue, mut notify_rx) = UiEventQueue::new(DEFAULT_EVENT_QUEUE_SIZE);
    let (cmd_tx, worker) = spawn_worker(state, api, queue.sender());

    for cmd in commands {
        debug!(command = cmd.name(), "queueing command");
        cmd_tx.send(cmd).await?;
    }
    drop(cmd_tx);

    let mut failures = 0usize;
    'events: while notify_rx.recv().await.is_some() {
        for event in queue.drain() {
            match &event {
                AppEvent::WorkerStopped => break 'events,
                AppEvent::Alert { message, .. } => {
                    failures += 1;
                    eprintln!("error: {message}");
                }
                AppEvent::Clipboard { text } if osc52 => osc52_copy(text)?,
                _ => {}
            }
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    worker
        .join()
        .map_err(|_| "console worker panicked")?;

    if failures > 0 {
        return Err(format!("{failures} command(s) failed").into());
    }
    Ok(())
}

/// Writes the OSC 52 escape that asks the terminal to set its clipboard.
fn osc52_copy(text: &str) -> std::io::Result<()> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    let mut stderr = std::io::stderr();
    stderr.write_all(format!("\x1b]52;c;{encoded}\x07").as_bytes())?;
    stderr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_parses_app_stream_and_build() {
        assert_eq!(
            parse_pick("Landmark=REL_2024_08:2003"),
            Ok(Pick {
                app: "Landmark".into(),
                stream: "REL_2024_08".into(),
                build: "2003".into(),
            })
        );
        assert!(parse_pick("Landmark=REL_2024_08").is_err());
        assert!(parse_pick("=REL:1").is_err());
    }

    #[test]
    fn inject_walks_the_wizard_in_order() {
        let cli = Cli::parse_from([
            "migops-cli",
            "inject",
            "MT/AUG/",
            "--stack",
            "i-0abc",
            "--file",
            "LANDMARK.jar",
        ]);
        let names: Vec<_> = commands_for(cli.cmd).iter().map(UiCommand::name).collect();
        assert_eq!(
            names,
            vec![
                "wizard.open",
                "wizard.pick_instance",
                "wizard.next",
                "wizard.toggle_file",
                "wizard.next",
                "wizard.submit",
            ]
        );
    }

    #[test]
    fn dry_run_upload_stops_after_planning() {
        let cli = Cli::parse_from([
            "migops-cli",
            "upload",
            "--pick",
            "HCM=REL_2024_08:901",
            "--suffix",
            "MT/AUG",
            "--dry-run",
        ]);
        let names: Vec<_> = commands_for(cli.cmd).iter().map(UiCommand::name).collect();
        assert_eq!(
            names,
            vec![
                "selector.select_stream",
                "selector.select_build",
                "selector.suffix",
                "upload.plan",
            ]
        );
    }
}
