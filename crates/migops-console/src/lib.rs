//! Page controllers for the migops ops console: the artifact browser with its
//! inject wizard, and the stream/build selectors that feed the upload flow.
//!
//! Front ends talk to a single worker thread through [`UiCommand`]s and read
//! [`AppEvent`]s back off a [`UiEventQueue`].

pub mod artifacts;
pub mod autofill;
pub mod commands;
pub mod config;
pub mod error;
pub mod inject;
pub mod meta_cache;
pub mod selection;
pub mod ui_events;
pub mod upload;
pub mod wizard;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use artifacts::{ArtifactBrowser, ArtifactGroup, FileRow, PrefixMap, StorageLayout};
pub use commands::{AppEvent, FileView, UiCommand, WizardSnapshot};
pub use config::AppConfig;
pub use error::ConsoleError;
pub use meta_cache::MetaCache;
pub use selection::{AppSelection, SelectionBoard};
pub use ui_events::{UiEventQueue, UiEventSender, DEFAULT_EVENT_QUEUE_SIZE};
pub use wizard::{InjectWizard, WizardInput, WizardStep};
pub use worker::{handle_command, spawn_worker, WorkerState};
