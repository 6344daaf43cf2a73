pub mod backtest_runs;
pub mod config_change_log;
pub mod config_proposals;
pub mod strategy_configs;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::meta::config_value::{ConfigMap, ConfigValue};

/// JSON object -> config map. Entries with no `ConfigValue` form (nulls) are dropped.
pub(crate) fn config_map_from_json(entity: &'static str, id: &str, value: &Value) -> Result<ConfigMap, StoreError> {
    let Value::Object(entries) = value else {
        return Err(StoreError::Decode {
            entity,
            id: id.to_string(),
            reason: format!("expected a JSON object, got {}", value),
        });
    };

    let mut config = ConfigMap::new();
    for (key, raw) in entries {
        match ConfigValue::from_json(raw) {
            Some(v) => {
                config.insert(key.clone(), v);
            }
            None => warn!(entity, id, key = %key, "Skipping null config entry"),
        }
    }
    Ok(config)
}

/// JSON object -> numeric map. Non-numeric entries are dropped.
pub(crate) fn metrics_from_json(value: &Value) -> BTreeMap<String, f64> {
    match value {
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

pub(crate) fn metrics_to_json(metrics: &BTreeMap<String, f64>) -> Value {
    Value::Object(
        metrics
            .iter()
            .filter_map(|(k, v)| serde_json::Number::from_f64(*v).map(|n| (k.clone(), Value::Number(n))))
            .collect(),
    )
}

pub(crate) fn optional_config_value(
    entity: &'static str,
    id: &str,
    column: &str,
    value: Option<&Value>,
) -> Result<Option<ConfigValue>, StoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => ConfigValue::from_json(raw).map(Some).ok_or_else(|| StoreError::Decode {
            entity,
            id: id.to_string(),
            reason: format!("{} contains null", column),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_component_reads_as_absent() {
        assert_eq!(optional_config_value("strategy_config", "S1", "window", None).unwrap(), None);
        assert_eq!(
            optional_config_value("strategy_config", "S1", "window", Some(&Value::Null)).unwrap(),
            None
        );
        assert_eq!(
            optional_config_value("strategy_config", "S1", "window", Some(&json!(20))).unwrap(),
            Some(ConfigValue::Int(20))
        );
    }

    #[test]
    fn nested_null_is_a_decode_error() {
        let err = optional_config_value("strategy_config", "S1", "limits", Some(&json!({"max_vol": null})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode { entity: "strategy_config", .. }));
    }

    #[test]
    fn null_entries_are_dropped_from_config_maps() {
        let config = config_map_from_json("strategy_config", "S1", &json!({"window": 20, "fast": null})).unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config["window"], ConfigValue::Int(20));
    }
}
