//! Opt-in local audit trail for console actions.
//!
//! Records land as JSON lines in
//! `~/.local/share/migops/telemetry/<app>/events.jsonl`, written by one
//! background thread. Nothing leaves the machine. `MIGOPS_TELEMETRY` turns on
//! action records and `MIGOPS_TELEMETRY_CRASH` turns on panic dumps.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

const QUEUE_DEPTH: usize = 256;
const ROTATE_AT_BYTES: u64 = 2 * 1024 * 1024;
const VALUE_LIMIT: usize = 512;
const SECRET_KEYS: [&str; 3] = ["cookie", "session_cookie", "token"];

#[derive(Clone)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub usage_enabled: bool,
    pub crash_enabled: bool,
}

/// Identifies the process that produced a record.
#[derive(Clone, Debug, Serialize)]
struct Origin {
    app: &'static str,
    version: &'static str,
    session_id: String,
}

#[derive(Debug, Serialize)]
struct ActionRecord {
    event_type: String,
    at_unix_millis: i64,
    #[serde(flatten)]
    origin: Origin,
    properties: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PanicDump<'a> {
    at_unix_millis: i64,
    #[serde(flatten)]
    origin: &'a Origin,
    message: String,
    location: Option<String>,
}

pub struct Telemetry {
    origin: Origin,
    usage_enabled: AtomicBool,
    crash_enabled: AtomicBool,
    queue: SyncSender<ActionRecord>,
}

static GLOBAL: OnceLock<Arc<Telemetry>> = OnceLock::new();

/// Starts the recorder once per process; later calls only update the switches.
pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(current) = GLOBAL.get() {
        current.apply(&options);
        return Arc::clone(current);
    }

    let (queue, pending) = sync_channel(QUEUE_DEPTH);
    let recorder = Arc::new(Telemetry {
        origin: Origin {
            app: options.app_name,
            version: options.app_version,
            session_id: session_id(),
        },
        usage_enabled: AtomicBool::new(options.usage_enabled),
        crash_enabled: AtomicBool::new(options.crash_enabled),
        queue,
    });

    let log = EventLog::new(app_dir(options.app_name).join("events.jsonl"));
    std::thread::spawn(move || drain(pending, log));
    hook_panics(Arc::clone(&recorder));

    let _ = GLOBAL.set(Arc::clone(&recorder));
    recorder
}

pub fn init_with_env(app_name: &'static str, app_version: &'static str) -> Arc<Telemetry> {
    init(TelemetryOptions {
        app_name,
        app_version,
        usage_enabled: env_flag("MIGOPS_TELEMETRY"),
        crash_enabled: env_flag("MIGOPS_TELEMETRY_CRASH"),
    })
}

/// Records one console action. A no-op before [`init`] or while usage is off.
pub fn event(event_type: &str, properties: &[(&str, &str)]) {
    if let Some(recorder) = GLOBAL.get() {
        recorder.record(event_type, properties);
    }
}

impl Telemetry {
    fn apply(&self, options: &TelemetryOptions) {
        self.usage_enabled
            .store(options.usage_enabled, Ordering::Relaxed);
        self.crash_enabled
            .store(options.crash_enabled, Ordering::Relaxed);
    }

    fn record(&self, event_type: &str, properties: &[(&str, &str)]) {
        if !self.usage_enabled.load(Ordering::Relaxed) {
            return;
        }
        // Never blocks; a full queue loses the record.
        let _ = self.queue.try_send(ActionRecord {
            event_type: event_type.to_string(),
            at_unix_millis: now_millis(),
            origin: self.origin.clone(),
            properties: scrub(properties),
        });
    }

    fn dump_panic(&self, message: String, location: Option<String>) {
        if !self.crash_enabled.load(Ordering::Relaxed) {
            return;
        }
        let dump = PanicDump {
            at_unix_millis: now_millis(),
            origin: &self.origin,
            message,
            location,
        };
        let dir = app_dir(self.origin.app).join("crashes");
        let path = dir.join(format!(
            "crash-{}-{}.json",
            dump.at_unix_millis,
            std::process::id()
        ));
        let written = fs::create_dir_all(&dir)
            .and_then(|_| File::create(&path))
            .and_then(|file| {
                serde_json::to_writer_pretty(file, &dump).map_err(io::Error::from)
            });
        if let Err(err) = written {
            eprintln!("telemetry: crash dump {} failed: {err}", path.display());
        }
    }
}

/// Trims keys, drops blank ones, hides secrets and caps value length.
fn scrub(properties: &[(&str, &str)]) -> BTreeMap<String, String> {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = if SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                "<redacted>".to_string()
            } else {
                value.chars().take(VALUE_LIMIT).collect()
            };
            Some((key.to_string(), value))
        })
        .collect()
}

fn drain(pending: Receiver<ActionRecord>, mut log: EventLog) {
    for record in pending {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(_) => continue,
        };
        if let Err(err) = log.append(&line) {
            eprintln!("telemetry: {}: {err}", log.path.display());
        }
    }
}

fn hook_panics(recorder: Arc<Telemetry>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        recorder.dump_panic(message, location);
        previous(info);
    }));
}

/// Append-only JSONL file that rolls over to `<name>.1` once it grows past
/// [`ROTATE_AT_BYTES`].
struct EventLog {
    path: PathBuf,
    limit: u64,
    file: Option<File>,
    size: u64,
}

impl EventLog {
    fn new(path: PathBuf) -> Self {
        Self::with_limit(path, ROTATE_AT_BYTES)
    }

    fn with_limit(path: PathBuf, limit: u64) -> Self {
        Self {
            path,
            limit,
            file: None,
            size: 0,
        }
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.file.is_none() {
            self.open()?;
        }
        if self.size >= self.limit {
            self.file = None;
            let rolled = self.path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rolled);
            fs::rename(&self.path, &rolled)?;
            self.open()?;
        }
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{line}")?;
            self.size += line.len() as u64 + 1;
        }
        Ok(())
    }

    fn open(&mut self) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }
}

fn app_dir(app_name: &str) -> PathBuf {
    let base = match std::env::var("HOME") {
        Ok(home) => Path::new(&home).join(".local/share/migops"),
        Err(_) => PathBuf::from("/tmp/migops"),
    };
    base.join("telemetry").join(app_name)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn session_id() -> String {
    format!("{:x}-{:x}", now_millis(), std::process::id())
}
