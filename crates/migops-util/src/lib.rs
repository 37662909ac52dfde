use std::{
    fs, io,
    path::{Path, PathBuf},
};

use migops_telemetry as telemetry;
use serde::Serialize;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const BASE_URL_ENV: &str = "MIGOPS_BASE_URL";
pub const SESSION_COOKIE_ENV: &str = "MIGOPS_SESSION_COOKIE";
pub const PREFIX_MAP_ENV: &str = "MIGOPS_PREFIX_MAP";

/// Returns the trimmed value of `key`, treating an empty variable as unset.
pub fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/migops")
    } else {
        PathBuf::from("/tmp/migops")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Installs the fmt subscriber on stderr so stdout stays free for rendered output.
pub fn init_tracing(default_directive: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse()?),
        )
        .init();
    Ok(())
}

pub fn init_console_telemetry(app_name: &'static str, app_version: &'static str, front_end: &str) {
    telemetry::init_with_env(app_name, app_version);
    telemetry::event("console.start", &[("front_end", front_end)]);
    tracing::debug!("telemetry initialised for {app_name} {app_version}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "migops-util-{tag}-{}-{}",
            std::process::id(),
            now_millis()
        ))
    }

    #[test]
    fn write_json_atomic_creates_parents_and_leaves_no_tmp() {
        let dir = scratch_dir("atomic");
        let path = dir.join("nested").join("sample.json");
        let value = Sample {
            name: "landmark".into(),
            count: 3,
        };

        write_json_atomic(&path, &value).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let back: Sample = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("json.tmp").exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user("/opt/maps.json"), PathBuf::from("/opt/maps.json"));
        assert_eq!(expand_user("maps.json"), PathBuf::from("maps.json"));
    }

    #[test]
    fn state_file_lives_under_state_dir() {
        let path = state_file_path("console-config.json");
        assert!(path.starts_with(state_dir()));
        assert!(path.ends_with("console-config.json"));
    }
}
