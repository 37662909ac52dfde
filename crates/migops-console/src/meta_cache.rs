use std::collections::HashMap;

use futures_util::future::join_all;
use indexmap::IndexSet;
use migops_api::ConsoleApi;
use tracing::{debug, warn};

/// Shown for files without a version stamp, and while a lookup is pending.
pub const UNKNOWN_VERSION: &str = "—";

const VERSIONED_FILES: [&str; 5] = [
    "Install-LMMIG.jar",
    "Install-LMIEFIN.jar",
    "Install-LMHCM.jar",
    "LANDMARK.jar",
    "grid-installer.jar",
];

/// Whether a file name carries a version stamp worth looking up.
pub fn needs_meta(name: &str) -> bool {
    VERSIONED_FILES.contains(&name)
}

fn file_name(rel_key: &str) -> &str {
    rel_key.rsplit('/').next().unwrap_or(rel_key)
}

/// Version stamps keyed by relative object key.
///
/// Entries are written once and kept for the life of the page; a key that
/// resolved to [`UNKNOWN_VERSION`] is not asked again.
#[derive(Debug, Default)]
pub struct MetaCache {
    entries: HashMap<String, String>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rel_key: &str) -> Option<&str> {
        self.entries.get(rel_key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The value to render for a file row.
    pub fn display(&self, rel_key: &str) -> &str {
        if !needs_meta(file_name(rel_key)) {
            return UNKNOWN_VERSION;
        }
        self.get(rel_key).unwrap_or(UNKNOWN_VERSION)
    }

    fn insert_once(&mut self, rel_key: String, version: String) {
        self.entries.entry(rel_key).or_insert(version);
    }

    /// Keys among `rel_keys` that still need a lookup, deduplicated in order.
    pub fn pending<'a>(&self, rel_keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        rel_keys
            .into_iter()
            .filter(|key| needs_meta(file_name(key)) && !self.entries.contains_key(*key))
            .map(str::to_string)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Looks up every uncached versioned key concurrently and records the
    /// answers. Returns the number of requests issued.
    ///
    /// A transport failure leaves the key uncached so a later render retries.
    pub async fn hydrate<'a>(
        &mut self,
        api: &dyn ConsoleApi,
        rel_keys: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let pending = self.pending(rel_keys);
        if pending.is_empty() {
            return 0;
        }
        debug!(count = pending.len(), "hydrating version metadata");

        let results = join_all(pending.iter().map(|key| api.object_meta(key))).await;
        for (key, result) in pending.iter().zip(results) {
            match result {
                Ok(resp) => {
                    let version = resp.version().unwrap_or(UNKNOWN_VERSION).to_string();
                    self.insert_once(key.clone(), version);
                }
                Err(err) => warn!("metadata lookup for {key} failed: {err}"),
            }
        }
        pending.len()
    }
}
