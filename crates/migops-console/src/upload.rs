use migops_api::{ApiError, ConsoleApi, PlannedArtifact, UploadItemRequest};
use migops_telemetry as telemetry;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ConsoleError;
use crate::selection::SelectionBoard;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

impl ItemState {
    pub fn glyph(self) -> &'static str {
        match self {
            ItemState::Pending => "…",
            ItemState::Uploading => "⏳",
            ItemState::Uploaded => "✅",
            ItemState::Failed => "❌",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadItem {
    pub artifact: PlannedArtifact,
    pub state: ItemState,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Complete { total: usize },
    PartialFailure { failed: usize, total: usize },
}

impl UploadOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, UploadOutcome::Complete { .. })
    }
}

/// A planned batch and the per-item progress of its execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadRun {
    pub s3_prefix: String,
    pub items: Vec<UploadItem>,
}

/// Asks the backend to expand the current selections into upload items.
pub async fn plan(api: &dyn ConsoleApi, board: &SelectionBoard) -> Result<UploadRun, ConsoleError> {
    if !board
        .apps()
        .any(|app| !app.hidden_stream().is_empty() && !app.hidden_build().is_empty())
    {
        return Err(ApiError::Validation(
            "Select a stream and build for at least one app.".into(),
        )
        .into());
    }

    let form = board.plan_form();
    let plan = api.plan_upload(&form).await?;
    let count = plan.artifacts.len().to_string();
    telemetry::event(
        "upload.plan",
        &[("s3_prefix", plan.s3_prefix.as_str()), ("artifacts", count.as_str())],
    );
    info!(s3_prefix = %plan.s3_prefix, artifacts = plan.artifacts.len(), "upload planned");

    Ok(UploadRun {
        s3_prefix: plan.s3_prefix,
        items: plan
            .artifacts
            .into_iter()
            .map(|artifact| UploadItem {
                artifact,
                state: ItemState::Pending,
                message: String::new(),
            })
            .collect(),
    })
}

impl UploadRun {
    /// Uploads items one at a time. A failed item is recorded and the batch
    /// moves on; `progress` sees every state change. Items already uploaded
    /// are skipped, so running again retries only what failed.
    pub async fn execute(
        &mut self,
        api: &dyn ConsoleApi,
        mut progress: impl FnMut(usize, &UploadItem),
    ) -> UploadOutcome {
        let total = self.items.len();
        let mut failed = 0;

        for (index, item) in self.items.iter_mut().enumerate() {
            if item.state == ItemState::Uploaded {
                continue;
            }
            item.state = ItemState::Uploading;
            item.message = format!("Uploading {}", item.artifact.s3_uri());
            progress(index, item);

            let request = UploadItemRequest::from(&item.artifact);
            match api.upload_item(&request).await {
                Ok(()) => {
                    item.state = ItemState::Uploaded;
                    item.message = format!("Uploaded {}", item.artifact.s3_uri());
                }
                Err(err) => {
                    warn!(key = %item.artifact.key, "upload failed: {err}");
                    failed += 1;
                    item.state = ItemState::Failed;
                    item.message = err.to_string();
                }
            }
            let result = if item.state == ItemState::Uploaded {
                "ok"
            } else {
                "err"
            };
            telemetry::event(
                "upload.item",
                &[("key", item.artifact.key.as_str()), ("result", result)],
            );
            progress(index, item);
        }

        if failed == 0 {
            UploadOutcome::Complete { total }
        } else {
            UploadOutcome::PartialFailure { failed, total }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::artifacts::StorageLayout;
    use crate::test_support::{build, stream, StubApi};
    use migops_api::{ErrorKind, UploadPlan};

    fn artifact(key: &str) -> PlannedArtifact {
        PlannedArtifact {
            app: Some("Landmark".into()),
            stream: Some("REL_2024_08".into()),
            build: Some("2003".into()),
            source_url: format!("https://builds.example/lars/{key}"),
            bucket: "migops".into(),
            key: format!("LARS/MT/AUG/{key}"),
            metadata: Some(BTreeMap::from([("version".to_string(), "2003".to_string())])),
        }
    }

    fn ready_board() -> SelectionBoard {
        let mut board = SelectionBoard::new(&["Landmark"], &StorageLayout::new("migops", "LARS"));
        let landmark = board.app_mut("Landmark").unwrap();
        landmark.select_stream(Some(stream("REL_2024_08")));
        landmark.select_build(Some(build("2003", "R")));
        board.set_suffix("MT/AUG");
        board
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_batch() {
        let api = StubApi::new();
        api.push_plan(Ok(UploadPlan {
            s3_prefix: "s3://migops/LARS/MT/AUG/".into(),
            artifacts: vec![
                artifact("LANDMARK.jar"),
                artifact("grid-installer.jar"),
                artifact("mt_dependencies.txt"),
            ],
        }));
        api.push_upload(Ok(()));
        api.push_upload(Err(ApiError::Rejected("source returned 404".into())));
        api.push_upload(Ok(()));

        let mut run = plan(&api, &ready_board()).await.unwrap();
        assert!(run.items.iter().all(|item| item.state == ItemState::Pending));

        let mut seen = Vec::new();
        let outcome = run
            .execute(&api, |index, item| seen.push((index, item.state)))
            .await;

        assert_eq!(outcome, UploadOutcome::PartialFailure { failed: 1, total: 3 });
        assert!(!outcome.is_success());
        assert_eq!(api.upload_calls(), 3);
        let states: Vec<_> = run.items.iter().map(|item| item.state).collect();
        assert_eq!(
            states,
            vec![ItemState::Uploaded, ItemState::Failed, ItemState::Uploaded]
        );
        assert_eq!(run.items[1].message, "source returned 404");
        assert_eq!(run.items[1].state.glyph(), "❌");
        assert_eq!(
            seen,
            vec![
                (0, ItemState::Uploading),
                (0, ItemState::Uploaded),
                (1, ItemState::Uploading),
                (1, ItemState::Failed),
                (2, ItemState::Uploading),
                (2, ItemState::Uploaded),
            ]
        );

        let sent = api.upload_requests();
        assert_eq!(sent[2].key, "LARS/MT/AUG/mt_dependencies.txt");
        let form = &api.plan_forms()[0];
        assert_eq!(form.get("summary_landmark_build"), Some("2003"));
    }

    #[tokio::test]
    async fn second_run_retries_only_failed_items() {
        let api = StubApi::new();
        let mut run = UploadRun {
            s3_prefix: "s3://migops/LARS/MT/AUG/".into(),
            items: ["LANDMARK.jar", "grid-installer.jar"]
                .into_iter()
                .map(|key| UploadItem {
                    artifact: artifact(key),
                    state: ItemState::Pending,
                    message: String::new(),
                })
                .collect(),
        };
        api.push_upload(Ok(()));
        api.push_upload(Err(ApiError::Rejected("source returned 404".into())));
        let first = run.execute(&api, |_, _| {}).await;
        assert_eq!(first, UploadOutcome::PartialFailure { failed: 1, total: 2 });

        let mut seen = Vec::new();
        let second = run
            .execute(&api, |index, item| seen.push((index, item.state)))
            .await;
        assert_eq!(second, UploadOutcome::Complete { total: 2 });
        assert_eq!(api.upload_calls(), 3);
        assert_eq!(api.upload_requests()[2].key, "LARS/MT/AUG/grid-installer.jar");
        assert_eq!(
            seen,
            vec![(1, ItemState::Uploading), (1, ItemState::Uploaded)]
        );
    }

    #[tokio::test]
    async fn plan_rejection_surfaces_the_message() {
        let api = StubApi::new();
        api.push_plan(Err(ApiError::Rejected("No app selections found.".into())));
        let err = plan(&api, &ready_board()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerRejection);
        assert_eq!(err.to_string(), "No app selections found.");
    }

    #[tokio::test]
    async fn empty_selection_is_caught_locally() {
        let api = StubApi::new();
        let board = SelectionBoard::new(&["MIG"], &StorageLayout::new("migops", "LARS"));
        let err = plan(&api, &board).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(api.plan_forms().is_empty());
    }

    #[tokio::test]
    async fn all_uploads_succeeding_is_complete() {
        let api = StubApi::new();
        let mut run = UploadRun {
            s3_prefix: "s3://migops/LARS/MT/AUG/".into(),
            items: vec![UploadItem {
                artifact: artifact("LANDMARK.jar"),
                state: ItemState::Pending,
                message: String::new(),
            }],
        };
        let outcome = run.execute(&api, |_, _| {}).await;
        assert_eq!(outcome, UploadOutcome::Complete { total: 1 });
        assert_eq!(run.items[0].message, "Uploaded s3://migops/LARS/MT/AUG/LANDMARK.jar");
    }
}
