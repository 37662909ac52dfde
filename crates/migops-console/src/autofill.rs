//! Current-month shortcut: pick this month's release stream and the best
//! build of the right maturity for every app, then point the destination at
//! `<category>/<MON>`.

use chrono::{Datelike, NaiveDate};
use futures_util::future::join_all;
use migops_api::{ApiError, BuildOption, BuildQuery, ConsoleApi, SelectOption, StreamQuery};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::ConsoleError;
use crate::selection::{AppSelection, SelectionBoard};

/// Upper bound on pages scanned per lookup.
const MAX_PAGES: u32 = 100;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const MATURITY: [(&str, &str); 7] = [
    ("R", "Released"),
    ("UT", "UpgradeTested"),
    ("ST", "SmokeTested"),
    ("AQ", "AppQualified"),
    ("B", "Built"),
    ("TO", "TurnedOver"),
    ("JT", "JunitTested"),
];

pub fn maturity_label(code: &str) -> &'static str {
    MATURITY
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code.trim()))
        .map(|(_, label)| *label)
        .unwrap_or("unknown")
}

/// Accepts either a code (`"R"`) or its label (`"Released"`).
fn maturity_code(value: &str) -> Option<&'static str> {
    let value = value.trim();
    MATURITY
        .iter()
        .find(|(code, label)| code.eq_ignore_ascii_case(value) || label.eq_ignore_ascii_case(value))
        .map(|(code, _)| *code)
}

fn maturity_matches(build: &BuildOption, wanted: &str) -> bool {
    let Some(maturity) = build.maturity.as_deref() else {
        return false;
    };
    match (maturity_code(maturity), maturity_code(wanted)) {
        (Some(have), Some(want)) => have == want,
        _ => maturity.trim().eq_ignore_ascii_case(wanted.trim()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutofillSettings {
    pub category: String,
    pub coordinating_app: String,
    pub coordinating_maturity: String,
    pub app_maturity: String,
}

impl From<&AppConfig> for AutofillSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            category: cfg.autofill_category.clone(),
            coordinating_app: cfg.coordinating_app.clone(),
            coordinating_maturity: cfg.coordinating_maturity.clone(),
            app_maturity: cfg.app_maturity.clone(),
        }
    }
}

impl AutofillSettings {
    fn maturity_for(&self, app: &str) -> &str {
        if app.eq_ignore_ascii_case(&self.coordinating_app) {
            &self.coordinating_maturity
        } else {
            &self.app_maturity
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseTarget {
    pub release: String,
    pub month: String,
    pub suffix: String,
}

pub fn release_for(date: NaiveDate, category: &str) -> ReleaseTarget {
    let month = MONTHS[date.month0() as usize].to_string();
    ReleaseTarget {
        release: format!("REL_{}_{:02}", date.year(), date.month()),
        suffix: format!("{}/{month}", category.trim().trim_matches('/')),
        month,
    }
}

/// Orders builds by numeric release id; ids that do not parse sort below
/// numeric ones and compare as strings.
pub fn rank(build: &BuildOption) -> (Option<u64>, String) {
    let release = build.release().trim();
    (release.parse::<u64>().ok(), release.to_string())
}

/// Pages through the stream catalog for a stream whose id or text is exactly `name`.
pub async fn find_exact_stream(
    api: &dyn ConsoleApi,
    app: &str,
    name: &str,
) -> Result<Option<SelectOption>, ApiError> {
    for page in 1..=MAX_PAGES {
        let query = StreamQuery {
            app: app.to_string(),
            term: name.to_string(),
            page,
        };
        let resp = api.search_streams(&query).await?;
        let hit = resp
            .results
            .into_iter()
            .find(|stream| stream.id == name || stream.text == name);
        if hit.is_some() {
            return Ok(hit);
        }
        if !resp.pagination.more {
            break;
        }
    }
    Ok(None)
}

/// Scans every build page of `stream_id` and keeps the best one of `maturity`.
pub async fn best_build(
    api: &dyn ConsoleApi,
    app: &str,
    stream_id: &str,
    maturity: &str,
) -> Result<Option<BuildOption>, ApiError> {
    let mut best: Option<BuildOption> = None;
    for page in 1..=MAX_PAGES {
        let query = BuildQuery {
            app: app.to_string(),
            stream_id: stream_id.to_string(),
            term: String::new(),
            page,
        };
        let resp = api.search_builds(&query).await?;
        let more = resp.pagination.more;
        for build in resp.results {
            if !maturity_matches(&build, maturity) {
                continue;
            }
            if best.as_ref().map_or(true, |current| rank(&build) > rank(current)) {
                best = Some(build);
            }
        }
        if !more {
            break;
        }
    }
    Ok(best)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppOutcome {
    Filled {
        stream: String,
        build: Option<String>,
    },
    StreamMissing,
    Failed {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AutofillReport {
    pub target: ReleaseTarget,
    pub apps: Vec<(String, AppOutcome)>,
}

async fn resolve_app(
    api: &dyn ConsoleApi,
    selection: &mut AppSelection,
    release: &str,
    maturity: &str,
    known_stream: Option<SelectOption>,
) -> AppOutcome {
    let app = selection.app.clone();
    let stream = match known_stream {
        Some(stream) => stream,
        None => match find_exact_stream(api, &app, release).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return AppOutcome::StreamMissing,
            Err(err) => {
                warn!(app = %app, "stream lookup failed: {err}");
                return AppOutcome::Failed {
                    error: err.to_string(),
                };
            }
        },
    };

    selection.set_manual_mode(false);
    selection.select_stream(Some(stream.clone()));

    match best_build(api, &app, &stream.id, maturity).await {
        Ok(build) => {
            let build_id = build.as_ref().map(|build| build.id.clone());
            if build.is_some() {
                selection.select_build(build);
            }
            AppOutcome::Filled {
                stream: stream.id,
                build: build_id,
            }
        }
        Err(err) => {
            warn!(app = %app, "build scan failed: {err}");
            AppOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

/// Fills every app for the month containing `date`.
///
/// Nothing changes unless the coordinating app has this month's stream.
pub async fn run_autofill(
    api: &dyn ConsoleApi,
    board: &mut SelectionBoard,
    settings: &AutofillSettings,
    date: NaiveDate,
) -> Result<AutofillReport, ConsoleError> {
    let target = release_for(date, &settings.category);
    let coordinator = board.app(&settings.coordinating_app)?.app.clone();

    let Some(coordinator_stream) = find_exact_stream(api, &coordinator, &target.release).await?
    else {
        return Err(ConsoleError::Autofill(format!(
            "{} not found for {coordinator}; autofill aborted.",
            target.release
        )));
    };

    let branches = board.apps_mut().map(|selection| {
        let maturity = settings.maturity_for(&selection.app).to_string();
        let known = selection
            .app
            .eq_ignore_ascii_case(&coordinator)
            .then(|| coordinator_stream.clone());
        let release = target.release.as_str();
        async move {
            let outcome = resolve_app(api, selection, release, &maturity, known).await;
            (selection.app.clone(), outcome)
        }
    });
    let apps = join_all(branches).await;

    board.set_suffix(&target.suffix);
    info!(
        release = %target.release,
        suffix = %target.suffix,
        "autofill complete"
    );
    Ok(AutofillReport { target, apps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StorageLayout;
    use crate::test_support::{build, page, stream, StubApi};

    fn settings() -> AutofillSettings {
        AutofillSettings::from(&AppConfig::default())
    }

    fn board() -> SelectionBoard {
        SelectionBoard::new(
            &["MIG", "HCM", "IEFin", "Landmark"],
            &StorageLayout::new("migops", "LARS"),
        )
    }

    fn aug_15() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 15).unwrap()
    }

    #[test]
    fn release_name_and_suffix_follow_the_date() {
        let target = release_for(aug_15(), "MT");
        assert_eq!(target.release, "REL_2024_08");
        assert_eq!(target.month, "AUG");
        assert_eq!(target.suffix, "MT/AUG");

        let jan = release_for(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), "/HF/");
        assert_eq!(jan.release, "REL_2025_01");
        assert_eq!(jan.suffix, "HF/JAN");
    }

    #[test]
    fn numeric_ids_outrank_strings() {
        let mut builds = vec![build("99", "B"), build("1001", "B"), build("nightly", "B")];
        builds.sort_by_key(rank);
        let ids: Vec<_> = builds.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["nightly", "99", "1001"]);
    }

    #[test]
    fn maturity_accepts_codes_and_labels() {
        let mut released = build("5", "Released");
        assert!(maturity_matches(&released, "R"));
        released.maturity = Some("r".into());
        assert!(maturity_matches(&released, "R"));
        assert!(!maturity_matches(&build("5", "B"), "R"));
        assert_eq!(maturity_label("AQ"), "AppQualified");
        assert_eq!(maturity_label("N"), "unknown");
    }

    #[tokio::test]
    async fn missing_coordinator_stream_aborts_untouched() {
        let api = StubApi::new();
        api.push_streams(
            "Landmark",
            Ok(page(vec![stream("REL_2024_07")], false)),
        );
        let mut board = board();
        board
            .app_mut("HCM")
            .unwrap()
            .select_stream(Some(stream("REL_2024_06")));
        let before = serde_json::to_value(&board).unwrap();

        let err = run_autofill(&api, &mut board, &settings(), aug_15())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Autofill(_)));
        assert!(err.to_string().contains("REL_2024_08"));
        assert_eq!(serde_json::to_value(&board).unwrap(), before);
        assert_eq!(api.stream_calls(), 1);
        assert_eq!(api.build_calls(), 0);
    }

    #[tokio::test]
    async fn fills_each_app_with_its_best_build() {
        let api = StubApi::new();
        api.push_streams("Landmark", Ok(page(vec![stream("REL_2024_08")], false)));
        api.push_builds(
            "Landmark",
            Ok(page(vec![build("2001", "R"), build("2005", "B")], true)),
        );
        api.push_builds("Landmark", Ok(page(vec![build("2003", "R")], false)));

        api.push_streams(
            "MIG",
            Ok(page(vec![stream("REL_2024_07"), stream("rel_2024_08")], true)),
        );
        api.push_streams("MIG", Ok(page(vec![stream("REL_2024_08")], false)));
        api.push_builds(
            "MIG",
            Ok(page(vec![build("10", "B"), build("9", "B"), build("11", "R")], false)),
        );

        api.push_streams("HCM", Ok(page(vec![stream("REL_2024_08")], false)));
        api.push_builds("HCM", Ok(page(vec![build("77", "ST")], false)));

        let mut board = board();
        board.app_mut("MIG").unwrap().set_manual_mode(true);

        let report = run_autofill(&api, &mut board, &settings(), aug_15())
            .await
            .unwrap();

        let landmark = board.app("Landmark").unwrap();
        assert_eq!(landmark.hidden_stream(), "REL_2024_08");
        assert_eq!(landmark.summary(), "2003");

        let mig = board.app("MIG").unwrap();
        assert!(!mig.manual_mode);
        assert_eq!(mig.hidden_stream(), "REL_2024_08");
        assert_eq!(mig.summary(), "10");

        let hcm = board.app("HCM").unwrap();
        assert_eq!(hcm.hidden_stream(), "REL_2024_08");
        assert_eq!(hcm.summary(), "");

        let iefin = board.app("IEFin").unwrap();
        assert!(iefin.stream.is_none());

        assert_eq!(board.suffix(), "MT/AUG");
        assert_eq!(board.destination(), "migops/LARS/MT/AUG");
        let outcomes: Vec<_> = report.apps.iter().map(|(app, o)| (app.as_str(), o)).collect();
        assert!(outcomes.contains(&("IEFin", &AppOutcome::StreamMissing)));
        assert!(outcomes.contains(&(
            "HCM",
            &AppOutcome::Filled {
                stream: "REL_2024_08".into(),
                build: None
            }
        )));
    }

    #[tokio::test]
    async fn case_variant_is_not_an_exact_match() {
        let api = StubApi::new();
        api.push_streams("MIG", Ok(page(vec![stream("rel_2024_08")], false)));
        let found = find_exact_stream(&api, "MIG", "REL_2024_08").await.unwrap();
        assert_eq!(found, None);
        assert_eq!(api.stream_calls(), 1);
    }
}
