use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Deep-merge `base` underneath `overrides`.
///
/// Keys in `overrides` win; `base` only fills keys that `overrides` lacks.
/// When both sides hold a map under the same key the maps are merged
/// recursively.
#[must_use]
pub fn coalesce(overrides: &Map<String, Value>, base: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = overrides.clone();
    for (key, base_value) in base {
        match merged.get_mut(key) {
            None => {
                merged.insert(key.clone(), base_value.clone());
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(base_map) = base_value {
                    *existing = coalesce(existing, base_map);
                }
            }
            Some(_) => {}
        }
    }
    merged
}

/// Walk `path` through nested maps.
#[must_use]
pub fn nested_map<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Map<String, Value>> {
    path.iter()
        .try_fold(map, |current, key| current.get(*key)?.as_object())
}

/// Render a scalar for use in an environment variable or interpolated string.
#[must_use]
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Environment for an image build: `container.env.normal` from the chart
/// values, overlaid with the explicit build environment.
#[must_use]
pub fn build_env(
    values: &Map<String, Value>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = nested_map(values, &["container", "env", "normal"])
        .map(|normal| {
            normal
                .iter()
                .map(|(key, value)| (key.clone(), scalar_to_string(value)))
                .collect()
        })
        .unwrap_or_default();
    env.extend(
        overrides
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    env
}

/// Set `image.repository` and `image.tag` in chart values.
pub fn set_image(values: &mut Map<String, Value>, repository: &str, tag: &str) {
    let image = values
        .entry("image")
        .or_insert_with(|| Value::Object(Map::new()));
    if !image.is_object() {
        *image = Value::Object(Map::new());
    }
    if let Value::Object(image) = image {
        image.insert("repository".to_string(), Value::String(repository.to_string()));
        image.insert("tag".to_string(), Value::String(tag.to_string()));
    }
}
