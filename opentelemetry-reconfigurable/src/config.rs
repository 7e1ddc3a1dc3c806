//! Flattened configuration properties and their typed accessors.
use crate::error::{ReconfigureError, ReconfigureResult};
use opentelemetry::Key;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{
    SERVICE_NAME, SERVICE_NAMESPACE, SERVICE_VERSION,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Keys whose presence asks for a real SDK rather than the no-op providers.
pub const SDK_TRIGGER_KEYS: [&str; 4] = [
    "otel.exporter.otlp.endpoint",
    "otel.traces.exporter",
    "otel.metrics.exporter",
    "otel.logs.exporter",
];

const NOTEWORTHY_KEYS: [&str; 10] = [
    "otel.service.name",
    "otel.resource.attributes",
    "otel.traces.exporter",
    "otel.metrics.exporter",
    "otel.logs.exporter",
    "otel.exporter.otlp.protocol",
    "otel.exporter.otlp.endpoint",
    "otel.exporter.otlp.traces.endpoint",
    "otel.exporter.otlp.metrics.endpoint",
    "otel.exporter.otlp.logs.endpoint",
];

const NOTEWORTHY_RESOURCE_KEYS: [&str; 3] = [SERVICE_NAME, SERVICE_NAMESPACE, SERVICE_VERSION];

/// Lower-cases `key` and maps `_` and `-` to `.`, so `OTEL_SERVICE_NAME`,
/// `otel.service-name` and `otel.service.name` are the same property.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            '_' | '-' => '.',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Resolved configuration snapshot.
///
/// Immutable once built; every configuration produces a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigProperties {
    properties: BTreeMap<String, String>,
}

impl ConfigProperties {
    /// Creates properties from explicit key/value pairs only.
    pub fn new<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut pairs = properties
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_owned(), value.into()))
            .collect::<Vec<_>>();
        // aliases of one property: the already normalized spelling wins, the
        // rest are applied in key order
        pairs.sort_by_cached_key(|(key, _)| (normalize_key(key) == *key, key.clone()));
        ConfigProperties {
            properties: pairs
                .into_iter()
                .map(|(key, value)| (normalize_key(&key), value))
                .collect(),
        }
    }

    /// Resolves `properties` on top of the `OTEL_*` environment variables.
    /// Explicit properties win over the environment.
    pub fn resolve(properties: &HashMap<String, String>) -> Self {
        Self::resolve_with(std::env::vars(), properties)
    }

    fn resolve_with(
        env: impl Iterator<Item = (String, String)>,
        properties: &HashMap<String, String>,
    ) -> Self {
        let mut resolved = ConfigProperties::new(env.filter(|(key, _)| key.starts_with("OTEL_")));
        resolved
            .properties
            .extend(ConfigProperties::new(properties).properties);
        resolved
    }

    /// Returns the value of `key`, or `None` when unset or blank.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.properties
            .get(&normalize_key(key))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Returns `true` only for a case-insensitive `true`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_string(key)
            .map(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Parses a duration. A bare number is milliseconds; `ms`, `s`, `m`, `h`
    /// and `d` suffixes are accepted.
    pub fn get_duration(&self, key: &str) -> ReconfigureResult<Option<Duration>> {
        let Some(value) = self.get_string(key) else {
            return Ok(None);
        };
        let invalid = |reason: &str| ReconfigureError::InvalidValue {
            key: normalize_key(key),
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let split = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (number, unit) = value.split_at(split);
        let number: u64 = number
            .parse()
            .map_err(|_| invalid("expected a non-negative integer"))?;
        let millis_per_unit = match unit.trim() {
            "" | "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid("unknown duration unit")),
        };
        number
            .checked_mul(millis_per_unit)
            .map(|millis| Some(Duration::from_millis(millis)))
            .ok_or_else(|| invalid("duration overflows"))
    }

    /// Splits a comma separated value, dropping blank entries.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parses a comma separated list of `key=value` pairs.
    pub fn get_map(&self, key: &str) -> ReconfigureResult<BTreeMap<String, String>> {
        self.get_list(key)
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    Ok((k.trim().to_owned(), v.trim().to_owned()))
                }
                _ => Err(ReconfigureError::InvalidValue {
                    key: normalize_key(key),
                    value: entry.clone(),
                    reason: "expected key=value".to_owned(),
                }),
            })
            .collect()
    }

    /// Whether the instrumentation called `name` should be active.
    ///
    /// Reads `otel.instrumentation.<name>.enabled`, then
    /// `otel.instrumentation.common.default-enabled`, and defaults to `true`.
    pub fn is_instrumentation_enabled(&self, name: &str) -> bool {
        self.get_bool(&format!("otel.instrumentation.{name}.enabled"))
            .or_else(|| self.get_bool("otel.instrumentation.common.default-enabled"))
            .unwrap_or(true)
    }

    /// Whether any key asking for a real SDK is present, even with a blank
    /// value.
    pub fn wants_sdk(&self) -> bool {
        SDK_TRIGGER_KEYS
            .iter()
            .any(|key| self.properties.contains_key(*key))
    }

    /// Iterates over the normalized properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Human readable summary of a configuration, used when logging a new SDK.
#[derive(Debug)]
pub struct SdkSummary<'a> {
    config: &'a ConfigProperties,
    resource: &'a Resource,
}

impl<'a> SdkSummary<'a> {
    /// Summarizes `config` and `resource`.
    pub fn new(config: &'a ConfigProperties, resource: &'a Resource) -> Self {
        SdkSummary { config, resource }
    }
}

impl fmt::Display for SdkSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut entry = |f: &mut fmt::Formatter<'_>, key: &str, value: &dyn fmt::Display| {
            let separator = if first { "" } else { ", " };
            first = false;
            write!(f, "{separator}{key}={value}")
        };
        for key in NOTEWORTHY_KEYS {
            if let Some(value) = self.config.get_string(key) {
                entry(f, key, &value)?;
            }
        }
        for key in NOTEWORTHY_RESOURCE_KEYS {
            if let Some(value) = self.resource.get(&Key::from_static_str(key)) {
                entry(f, key, &value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(normalize_key("OTEL_EXPORTER_OTLP_ENDPOINT"), "otel.exporter.otlp.endpoint");
        assert_eq!(
            normalize_key("otel.instrumentation.common.default-enabled"),
            "otel.instrumentation.common.default.enabled"
        );

        let config = ConfigProperties::new([("OTEL_SERVICE_NAME", "checkout")]);
        assert_eq!(config.get_string("otel.service.name"), Some("checkout"));
        assert_eq!(config.get_string("otel.service-name"), Some("checkout"));
    }

    #[test]
    fn explicit_properties_win_over_environment() {
        let env = vec![
            ("OTEL_SERVICE_NAME".to_owned(), "from-env".to_owned()),
            ("OTEL_TRACES_EXPORTER".to_owned(), "console".to_owned()),
            ("PATH".to_owned(), "/usr/bin".to_owned()),
        ];
        let config = ConfigProperties::resolve_with(
            env.into_iter(),
            &props(&[("otel.service.name", "explicit")]),
        );
        assert_eq!(config.get_string("otel.service.name"), Some("explicit"));
        assert_eq!(config.get_string("otel.traces.exporter"), Some("console"));
        assert_eq!(config.get_string("path"), None);
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn blank_values_are_unset() {
        let config = ConfigProperties::new([("otel.traces.exporter", "  ")]);
        assert_eq!(config.get_string("otel.traces.exporter"), None);
        // the key alone asks for a real SDK
        assert!(config.wants_sdk());
        assert!(ConfigProperties::new([("OTEL_EXPORTER_OTLP_ENDPOINT", "")]).wants_sdk());
    }

    #[test]
    fn normalized_spelling_wins_over_aliases() {
        for _ in 0..16 {
            let config = ConfigProperties::new(&props(&[
                ("OTEL_SERVICE_NAME", "from-alias"),
                ("otel.service.name", "dotted"),
                ("otel.service-name", "dashed"),
            ]));
            assert_eq!(config.get_string("otel.service.name"), Some("dotted"));
        }

        let config = ConfigProperties::new(&props(&[
            ("OTEL_TRACES_EXPORTER", "console"),
            ("otel.traces-exporter", "otlp"),
        ]));
        // no normalized spelling: the last alias in key order wins
        assert_eq!(config.get_string("otel.traces.exporter"), Some("otlp"));

        let config = ConfigProperties::resolve_with(
            std::iter::empty(),
            &props(&[("OTEL_LOGS_EXPORTER", "none"), ("otel.logs.exporter", "console")]),
        );
        assert_eq!(config.get_string("otel.logs.exporter"), Some("console"));
    }

    #[test]
    fn durations() {
        let config = ConfigProperties::new([
            ("a", "250"),
            ("b", "3s"),
            ("c", "2m"),
            ("d", "1h"),
            ("e", "1d"),
            ("f", "10ms"),
            ("g", "ten"),
            ("h", "5w"),
        ]);
        assert_eq!(config.get_duration("a").unwrap(), Some(Duration::from_millis(250)));
        assert_eq!(config.get_duration("b").unwrap(), Some(Duration::from_secs(3)));
        assert_eq!(config.get_duration("c").unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(config.get_duration("d").unwrap(), Some(Duration::from_secs(3600)));
        assert_eq!(config.get_duration("e").unwrap(), Some(Duration::from_secs(86_400)));
        assert_eq!(config.get_duration("f").unwrap(), Some(Duration::from_millis(10)));
        assert!(matches!(
            config.get_duration("g"),
            Err(ReconfigureError::InvalidValue { .. })
        ));
        assert!(config.get_duration("h").is_err());
        assert_eq!(config.get_duration("missing").unwrap(), None);
    }

    #[test]
    fn lists_and_maps() {
        let config = ConfigProperties::new([
            ("otel.traces.exporter", "otlp, console,,"),
            ("otel.resource.attributes", "service.namespace=shop, team = payments"),
            ("otel.exporter.otlp.headers", "api-key"),
        ]);
        assert_eq!(config.get_list("otel.traces.exporter"), vec!["otlp", "console"]);
        let attributes = config.get_map("otel.resource.attributes").unwrap();
        assert_eq!(attributes.get("service.namespace").map(String::as_str), Some("shop"));
        assert_eq!(attributes.get("team").map(String::as_str), Some("payments"));
        assert!(config.get_map("otel.exporter.otlp.headers").is_err());
        assert!(config.get_list("missing").is_empty());
    }

    #[test]
    fn instrumentation_toggles() {
        let config = ConfigProperties::new([
            ("otel.instrumentation.jdbc.enabled", "false"),
            ("otel.instrumentation.http.enabled", "TRUE"),
        ]);
        assert!(!config.is_instrumentation_enabled("jdbc"));
        assert!(config.is_instrumentation_enabled("http"));
        assert!(config.is_instrumentation_enabled("grpc"));

        let config = ConfigProperties::new([
            ("otel.instrumentation.common.default-enabled", "false"),
            ("otel.instrumentation.http.enabled", "true"),
        ]);
        assert!(!config.is_instrumentation_enabled("grpc"));
        assert!(config.is_instrumentation_enabled("http"));
    }

    #[test]
    fn sdk_trigger_keys() {
        assert!(!ConfigProperties::default().wants_sdk());
        for key in SDK_TRIGGER_KEYS {
            assert!(ConfigProperties::new([(key, "x")]).wants_sdk(), "{key}");
        }
        assert!(ConfigProperties::new([("OTEL_LOGS_EXPORTER", "none")]).wants_sdk());
        assert!(!ConfigProperties::new([("otel.service.name", "x")]).wants_sdk());
    }

    #[test]
    fn summary_lists_noteworthy_settings() {
        let config = ConfigProperties::new([
            ("otel.traces.exporter", "otlp"),
            ("otel.exporter.otlp.endpoint", "http://localhost:4318"),
            ("otel.bsp.max.queue.size", "10"),
        ]);
        let resource = Resource::builder_empty()
            .with_attributes([
                KeyValue::new(SERVICE_NAME, "checkout"),
                KeyValue::new(SERVICE_VERSION, "1.2.3"),
            ])
            .build();

        let summary = SdkSummary::new(&config, &resource).to_string();
        assert_eq!(
            summary,
            "otel.traces.exporter=otlp, otel.exporter.otlp.endpoint=http://localhost:4318, \
             service.name=checkout, service.version=1.2.3"
        );
    }
}
