use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::defaults::default_config;
use crate::errors::ConfigError;
use crate::model::WardenConfig;

const ENV_PREFIX: &str = "FEEDWARDEN__";
const ENV_JSON: &str = "FEEDWARDEN_CONFIG_JSON";

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<WardenConfig, ConfigError> {
    let mut options = LoadOptions::default();
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    options.include_env = true;
    load_config_with_options(&options)
}

/// Builds a configuration from built-in defaults, then every existing file in
/// `options.paths` (YAML or JSON), then environment overlays, and validates
/// the result.
pub fn load_config_with_options(options: &LoadOptions) -> Result<WardenConfig, ConfigError> {
    let mut merged = serde_json::to_value(default_config())
        .map_err(|err| ConfigError::Invalid(format!("{}", err)))?;

    for path in &options.paths {
        if path.exists() {
            let overlay = overlay_from_file(path)?;
            merge_value(&mut merged, overlay);
        }
    }

    if options.include_env {
        for (path, value) in overlays_from_env()? {
            set_path(&mut merged, &path, value);
        }
    }

    let config: WardenConfig =
        serde_json::from_value(merged).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    config.validate()?;
    Ok(config)
}

fn overlay_from_file(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(format!("{}", err)))?;
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(format!("{}", err)))
}

fn overlays_from_env() -> Result<Vec<(Vec<String>, Value)>, ConfigError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(camel_case)
                .collect::<Vec<_>>();
            if path.is_empty() {
                continue;
            }
            overlays.push((path, parse_env_value(&raw)));
        }
    }
    // Deterministic application order regardless of the environment's order.
    overlays.sort_by(|a, b| a.0.cmp(&b.0));

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
            overlays.extend(flatten_value(json_value, Vec::new()));
        }
    }

    Ok(overlays)
}

/// `SCORE_THRESHOLDS` → `scoreThresholds`.
fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for ch in segment.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Vec<String>) -> Vec<(Vec<String>, Value)> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let mut next = prefix.clone();
                next.push(key.trim().to_string());
                result.extend(flatten_value(value, next));
            }
            result
        }
        other => {
            if prefix.is_empty() {
                Vec::new()
            } else {
                vec![(prefix, other)]
            }
        }
    }
}

fn set_path(target: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = target;
    for segment in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Value::Object(map) = cursor {
        map.insert(last.clone(), value);
    }
}

/// Objects merge key by key; every other value (arrays included) replaces.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod unit {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_converts_env_segments() {
        assert_eq!(camel_case("SCORE_THRESHOLDS"), "scoreThresholds");
        assert_eq!(camel_case("HIDE"), "hide");
        assert_eq!(camel_case("USE_NOT_INTERESTED"), "useNotInterested");
    }

    #[test]
    fn merge_replaces_arrays_and_merges_objects() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "list": [1, 2]});
        merge_value(&mut base, json!({"a": {"c": 3}, "list": [9]}));
        assert_eq!(base, json!({"a": {"b": 1, "c": 3}, "list": [9]}));
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut base = json!({});
        set_path(
            &mut base,
            &["autoActions".to_string(), "hideVideos".to_string()],
            json!(false),
        );
        assert_eq!(base, json!({"autoActions": {"hideVideos": false}}));
    }
}
