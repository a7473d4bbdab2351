//! Configuration loading and environment parsing.

use super::validation::validate_config;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for per-field overrides, e.g. `ROBOT_SIGNAL__SERVER__RECONNECT_GRACE_SECS=90`.
pub const ENV_OVERRIDE_PREFIX: &str = "ROBOT_SIGNAL__";

/// Raw configuration inputs gathered from the process environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigSources {
    /// Inline JSON document (`ROBOT_SIGNAL_CONFIG_JSON`)
    pub inline_json: Option<String>,
    /// JSON read from stdin when `ROBOT_SIGNAL_CONFIG_STDIN` is truthy
    pub stdin_json: Option<String>,
    /// Candidate config files, highest precedence first
    pub files: Vec<PathBuf>,
    /// `(KEY, value)` pairs whose key starts with [`ENV_OVERRIDE_PREFIX`]
    pub overrides: Vec<(String, String)>,
}

impl ConfigSources {
    /// Collect sources with the following precedence (highest first):
    /// 1) `ROBOT_SIGNAL_CONFIG_JSON` env var containing raw JSON
    /// 2) If `ROBOT_SIGNAL_CONFIG_STDIN=true/1`, JSON read from stdin
    /// 3) File pointed to by `ROBOT_SIGNAL_CONFIG_PATH`
    /// 4) config.json in the current working directory
    /// 5) config.json next to the executable
    ///
    /// `ROBOT_SIGNAL__*` field overrides beat all of the above.
    pub fn from_environment() -> Self {
        use std::env;
        use std::io::Read;

        let inline_json = env::var("ROBOT_SIGNAL_CONFIG_JSON").ok();

        let stdin_json = match env::var("ROBOT_SIGNAL_CONFIG_STDIN") {
            Ok(flag) if env_var_truthy(&flag) => {
                let mut buf = String::new();
                match std::io::stdin().read_to_string(&mut buf) {
                    Ok(_) => Some(buf),
                    Err(e) => {
                        eprintln!("Failed to read config from stdin: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        let mut files = Vec::new();
        if let Ok(path) = env::var("ROBOT_SIGNAL_CONFIG_PATH") {
            files.push(PathBuf::from(path));
        }
        files.push(PathBuf::from("config.json"));
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            files.push(exe_dir.join("config.json"));
        }

        let overrides = env::vars()
            .filter(|(key, _)| key.starts_with(ENV_OVERRIDE_PREFIX))
            .collect();

        Self {
            inline_json,
            stdin_json,
            files,
            overrides,
        }
    }
}

/// Load configuration from the process environment.
///
/// Errors while reading or parsing a source are printed to stderr and that source is
/// skipped. Validation errors are printed but not propagated; `main` re-validates and
/// fails hard.
#[must_use]
pub fn load() -> Config {
    let config = load_from(&ConfigSources::from_environment());

    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

/// Merge the given sources over the compiled-in defaults.
#[must_use]
pub fn load_from(sources: &ConfigSources) -> Config {
    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    // Lowest precedence first so each layer overwrites the ones below it.
    for path in sources.files.iter().rev() {
        if let Some(value) = read_file_source(path) {
            merge_values(&mut merged, value);
        }
    }

    if let Some(value) = sources
        .stdin_json
        .as_deref()
        .and_then(|raw| parse_json_document(raw, "stdin"))
    {
        merge_values(&mut merged, value);
    }

    if let Some(value) = sources
        .inline_json
        .as_deref()
        .and_then(|raw| parse_json_document(raw, "ROBOT_SIGNAL_CONFIG_JSON"))
    {
        merge_values(&mut merged, value);
    }

    for (key, raw_value) in &sources.overrides {
        apply_env_override(&mut merged, key, raw_value);
    }

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn read_file_source(path: &Path) -> Option<Value> {
    if path.as_os_str().is_empty() || !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(contents) => parse_json_document(&contents, &format!("file {}", path.display())),
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
            None
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_override(root: &mut Value, key: &str, raw_value: &str) {
    let Some(stripped) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
        return;
    };

    let segments: Vec<String> = stripped
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    if segments.is_empty() {
        return;
    }

    set_nested_value(root, &segments, parse_scalar(raw_value.trim()));
}

fn env_var_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    if rest.is_empty() {
        map.insert(head.clone(), value);
    } else {
        let entry = map
            .entry(head.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        set_nested_value(entry, rest, value);
    }
}
