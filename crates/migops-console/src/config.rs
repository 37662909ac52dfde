use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use migops_api::HttpConfig;
use migops_util::{
    env_nonempty, expand_user, state_file_path, write_json_atomic, BASE_URL_ENV, DEFAULT_BASE_URL,
    PREFIX_MAP_ENV, SESSION_COOKIE_ENV,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifacts::StorageLayout;

const CONSOLE_CONFIG_FILE: &str = "console-config.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    pub request_timeout_secs: u64,
    pub bucket: String,
    pub root: String,
    pub prefix_map_path: Option<String>,
    pub apps: Vec<String>,
    pub coordinating_app: String,
    pub coordinating_maturity: String,
    pub app_maturity: String,
    pub autofill_category: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            request_timeout_secs: 30,
            bucket: "migops".into(),
            root: "LARS".into(),
            prefix_map_path: None,
            apps: ["MIG", "HCM", "IEFin", "Landmark"]
                .into_iter()
                .map(String::from)
                .collect(),
            coordinating_app: "Landmark".into(),
            coordinating_maturity: "R".into(),
            app_maturity: "B".into(),
            autofill_category: "MT".into(),
            poll_interval_ms: 2000,
            poll_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Loads the saved config, then lets the environment override it.
    pub fn load() -> Self {
        Self::load_from(&config_path(), env_nonempty)
    }

    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => file_cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                    AppConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
                AppConfig::default()
            }
        };
        cfg.apply_env(env);
        cfg.fill_gaps();
        cfg
    }

    pub fn save(&self) -> io::Result<()> {
        write_json_atomic(&config_path(), self)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = env(BASE_URL_ENV) {
            self.base_url = base_url;
        }
        if let Some(cookie) = env(SESSION_COOKIE_ENV) {
            self.session_cookie = Some(cookie);
        }
        if let Some(path) = env(PREFIX_MAP_ENV) {
            self.prefix_map_path = Some(path);
        }
    }

    fn fill_gaps(&mut self) {
        let defaults = AppConfig::default();
        if self.base_url.trim().is_empty() {
            self.base_url = defaults.base_url;
        }
        if self.bucket.trim().is_empty() {
            self.bucket = defaults.bucket;
        }
        if self.root.trim().trim_matches('/').is_empty() {
            self.root = defaults.root;
        }
        if self.apps.is_empty() {
            self.apps = defaults.apps;
        }
        if self.coordinating_app.trim().is_empty() {
            self.coordinating_app = defaults.coordinating_app;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = defaults.request_timeout_secs;
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.base_url.clone(),
            session_cookie: self.session_cookie.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(&self.bucket, &self.root)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    pub fn prefix_map_path(&self) -> Option<PathBuf> {
        self.prefix_map_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(expand_user)
    }
}

pub fn config_path() -> PathBuf {
    state_file_path(CONSOLE_CONFIG_FILE)
}
