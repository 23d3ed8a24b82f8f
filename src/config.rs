use crate::compose::{sanitize_sort_params, VariableConfig};
use crate::errors::ConfigError;
use crate::sink::{RawSinkConfig, StreamSinkConfig};
use crate::subscriptions::{websocket_url, SubscriptionPath};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(rename = "serverURL", default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(rename = "defaultCollectionID", default, skip_serializing_if = "Option::is_none")]
    pub default_collection_id: Option<String>,
    /// Variables in configuration order
    #[serde(
        default,
        deserialize_with = "deserialize_variables",
        serialize_with = "serialize_variables"
    )]
    pub subscriptions: Vec<(String, VariableConfig)>,
    #[serde(
        rename = "vizOutput",
        default,
        deserialize_with = "deserialize_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub viz_output: Vec<RawSinkConfig>,
    /// Enables debug output for every log tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

fn deserialize_variables<'de, D>(deserializer: D) -> Result<Vec<(String, VariableConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Map::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, variable)| {
            serde_json::from_value(variable)
                .map(|variable| (name.clone(), variable))
                .map_err(|e| serde::de::Error::custom(format!("variable '{}': {}", name, e)))
        })
        .collect()
}

fn serialize_variables<S>(variables: &[(String, VariableConfig)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(variables.len()))?;
    for (name, variable) in variables {
        map.serialize_entry(name, variable)?;
    }
    map.end()
}

/// `vizOutput` may hold a single sink or a list of sinks
fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<RawSinkConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<RawSinkConfig>),
        One(RawSinkConfig),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(sinks)) => sinks,
        Some(OneOrMany::One(sink)) => vec![sink],
    })
}

impl BridgeConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!("Configuration file not found: {}", path));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).context("Failed to parse configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail while wiring the bridge
    pub fn validate(&self) -> Result<()> {
        let server_url = self.server_url()?;
        websocket_url(server_url)?;

        if self.subscriptions.is_empty() {
            return Err(ConfigError::Missing {
                field: "subscriptions".to_string(),
            }
            .into());
        }

        for (name, variable) in &self.subscriptions {
            sanitize_sort_params(&variable.sort)
                .with_context(|| format!("Variable '{}' has an invalid sort", name))?;

            for (index, item) in variable.structure.iter().enumerate() {
                for (field, params) in &item.subscriptions {
                    SubscriptionPath::sanitize(params, self.default_collection_id.as_deref()).with_context(|| {
                        format!("Variable '{}', structure #{}, field '{}'", name, index, field)
                    })?;
                }
            }
        }

        self.sink_configs()?;
        Ok(())
    }

    pub fn server_url(&self) -> Result<&str, ConfigError> {
        self.server_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "serverURL".to_string(),
            })
    }

    /// Resolved sink configurations, defaults applied
    pub fn sink_configs(&self) -> Result<Vec<StreamSinkConfig>, ConfigError> {
        self.viz_output.iter().map(StreamSinkConfig::from_raw).collect()
    }

    /// Debug output is opt-in; a config without `debug` runs at normal verbosity
    pub fn debug_enabled(&self) -> bool {
        self.debug.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "serverURL": "http://cache.local:4000/graphql",
        "defaultCollectionID": "quotes",
        "subscriptions": {
            "fx": {
                "structure": [
                    {"attach": {"name": "EUR/USD"}, "subscriptions": {"bid": {"itemID": "EURUSD", "fieldID": "bid"}}}
                ],
                "sort": ["name"],
                "debounce": 250
            },
            "indices": {
                "structure": [
                    {"subscriptions": {"last": {"collectionID": "idx", "itemID": "DAX", "fieldID": "last"}}}
                ]
            }
        },
        "vizOutput": {"host": "viz01"}
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = BridgeConfig::from_json(SAMPLE).unwrap();

        let names: Vec<&str> = config.subscriptions.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["fx", "indices"]);
        assert_eq!(config.subscriptions[0].1.debounce, Some(250.0));
        assert_eq!(config.viz_output.len(), 1);

        let sinks = config.sink_configs().unwrap();
        assert_eq!(sinks[0].address(), "viz01:6100");
        assert!(!config.debug_enabled());
    }

    #[test]
    fn test_fractional_debounce_accepted() {
        let config = BridgeConfig::from_json(
            r#"{"serverURL": "ws://cache/graphql", "subscriptions": {"fx": {"debounce": 250.5}, "idx": {"debounce": -1}}}"#,
        )
        .unwrap();

        assert_eq!(
            config.subscriptions[0].1.debounce_interval(),
            Some(Duration::from_micros(250_500))
        );
        assert_eq!(config.subscriptions[1].1.debounce_interval(), None);
    }

    #[test]
    fn test_debug_flag_is_opt_in() {
        let base = r#""serverURL": "ws://cache/graphql", "subscriptions": {"fx": {}}"#;

        let absent = BridgeConfig::from_json(&format!("{{{}}}", base)).unwrap();
        assert!(!absent.debug_enabled());

        let enabled = BridgeConfig::from_json(&format!(r#"{{{}, "debug": true}}"#, base)).unwrap();
        assert!(enabled.debug_enabled());

        let disabled = BridgeConfig::from_json(&format!(r#"{{{}, "debug": false}}"#, base)).unwrap();
        assert!(!disabled.debug_enabled());
    }

    #[test]
    fn test_viz_output_list() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{"vizOutput": [{"port": 6200}, {"host": "viz02", "commandInterface": true}]}"#,
        )
        .unwrap();
        assert_eq!(config.viz_output.len(), 2);
        assert_eq!(config.viz_output[0].port, Some(6200));
    }

    #[test]
    fn test_missing_server_url() {
        let err = BridgeConfig::from_json(r#"{"subscriptions": {"fx": {"structure": []}}}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing { field }) if field == "serverURL"
        ));
    }

    #[test]
    fn test_missing_subscriptions() {
        let err = BridgeConfig::from_json(r#"{"serverURL": "ws://cache/graphql"}"#).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_invalid_server_url() {
        let err = BridgeConfig::from_json(r#"{"serverURL": "ftp://cache", "subscriptions": {"fx": {}}}"#)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_unresolvable_params_reported() {
        let err = BridgeConfig::from_json(
            r#"{"serverURL": "ws://cache/graphql", "subscriptions": {"fx": {"structure": [{"subscriptions": {"bid": {"fieldID": "bid"}}}]}}}"#,
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::MissingCollectionId));
    }

    #[test]
    fn test_udp_sink_rejected() {
        let err = BridgeConfig::from_json(
            r#"{"serverURL": "ws://cache/graphql", "subscriptions": {"fx": {}}, "vizOutput": {"protocol": "udp"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = BridgeConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.default_collection_id.as_deref(), Some("quotes"));

        assert!(BridgeConfig::load("/nonexistent/cachebridge.json").is_err());

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        broken.write_all(b"{ not json").unwrap();
        assert!(BridgeConfig::load(broken.path().to_str().unwrap()).is_err());
    }
}
