//! Chart values with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Values tree handed to the renderer and stored with each release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from a YAML string. An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            other => Ok(Self(other)),
        }
    }

    /// Parse values from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Deep merge another Values into this one
    ///
    /// Objects merge recursively. Scalars and arrays from `overlay` replace
    /// whatever was in the base.
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Merge multiple values in order, later entries win
    pub fn merge_all(values: Vec<Values>) -> Self {
        let mut result = Values::new();
        for v in values {
            result.merge(&v);
        }
        result
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(CoreError::ValuesMerge {
                message: format!("invalid value path '{}'", path),
            });
        }
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

/// Parse `--set key=value` arguments into a values overlay
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;
        values.set(key.trim(), parse_scalar(val))?;
    }

    Ok(values)
}

fn parse_scalar(val: &str) -> JsonValue {
    match val {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => {
            if let Ok(num) = val.parse::<i64>() {
                return JsonValue::Number(num.into());
            }
            if let Some(num) = val
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                return JsonValue::Number(num);
            }
            if val.starts_with('[') || val.starts_with('{') {
                if let Ok(parsed) = serde_json::from_str(val) {
                    return parsed;
                }
            }
            JsonValue::String(val.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_arrays_are_replaced() {
        let mut base = Values::from_yaml("ports: [80, 443]").unwrap();
        base.merge(&Values::from_yaml("ports: [8080]").unwrap());
        assert_eq!(base.get("ports").unwrap(), &serde_json::json!([8080]));
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("image.tag", serde_json::json!("v2")).unwrap();
        values.set("image.repository", serde_json::json!("nginx")).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v2");
        assert_eq!(values.get("image.repository").unwrap(), "nginx");
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut values = Values::from_yaml("image: nginx").unwrap();
        values.set("image.tag", serde_json::json!("v2")).unwrap();
        assert_eq!(values.get("image.tag").unwrap(), "v2");
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        let mut values = Values::new();
        assert!(values.set("image..tag", serde_json::json!(1)).is_err());
        assert!(values.set("", serde_json::json!(1)).is_err());
    }

    #[test]
    fn test_empty_yaml_is_empty_values() {
        assert!(Values::from_yaml("").unwrap().is_empty());
        assert!(Values::from_yaml("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "replicas=3".to_string(),
            "image.tag=v1.2".to_string(),
            "debug=true".to_string(),
            "ratio=0.5".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
        ];

        let values = parse_set_values(&args).unwrap();

        assert_eq!(values.get("replicas").unwrap(), 3);
        assert_eq!(values.get("image.tag").unwrap(), "v1.2");
        assert_eq!(values.get("debug").unwrap(), true);
        assert_eq!(values.get("ratio").unwrap(), 0.5);
        assert_eq!(values.get("tags").unwrap(), &serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_parse_set_values_invalid() {
        let args = vec!["no-equals-sign".to_string()];
        assert!(parse_set_values(&args).is_err());
    }

    #[test]
    fn test_merge_all_order() {
        let merged = Values::merge_all(vec![
            Values::from_yaml("a: 1\nb: 1").unwrap(),
            Values::from_yaml("b: 2").unwrap(),
        ]);
        assert_eq!(merged.get("a").unwrap(), 1);
        assert_eq!(merged.get("b").unwrap(), 2);
    }
}
