//! Connection parameters passed through to the broker client.

use crate::error::TransportError;
use cebus_core::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Consumer-group identity. Defaults to the local endpoint's own identity.
pub const GROUP_ID: &str = "group.id";

/// Broker address: `tcp://host:port`, `mqtt://host:port` or `host[:port]`.
pub const BROKER: &str = "broker";

/// MQTT client id. Defaults to the local endpoint's own identity.
pub const CLIENT_ID: &str = "client.id";

/// Keep-alive interval in seconds.
pub const KEEP_ALIVE_SECS: &str = "keep.alive.secs";

/// Capacity of the client request and inbound event queues.
pub const CHANNEL_CAPACITY: &str = "channel.capacity";

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const MIN_KEEP_ALIVE_SECS: u64 = 5;
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Generic key/value connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(BTreeMap<String, String>);

impl ConfigMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set `group.id` to `identity` unless a non-empty group is configured.
    ///
    /// Every endpoint then consumes independently instead of load-sharing
    /// with other endpoints of the same cluster.
    ///
    /// Returns `true` if the default was injected.
    pub fn with_default_group_id(&mut self, identity: &Identity) -> bool {
        if self.get(GROUP_ID).is_some_and(|group| !group.is_empty()) {
            return false;
        }
        self.set(GROUP_ID, identity.as_str());
        true
    }

    /// Set `client.id` to `identity` unless a non-empty id is configured.
    ///
    /// Endpoints sharing a `group.id` still connect as distinct clients.
    ///
    /// Returns `true` if the default was injected.
    pub fn with_default_client_id(&mut self, identity: &Identity) -> bool {
        if self.get(CLIENT_ID).is_some_and(|id| !id.is_empty()) {
            return false;
        }
        self.set(CLIENT_ID, identity.as_str());
        true
    }

    /// Iterate over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Validated MQTT connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// MQTT client id
    pub client_id: String,
    /// Shared-subscription group
    pub group_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Request and inbound queue capacity
    pub channel_capacity: usize,
}

impl MqttSettings {
    /// Validate a config map.
    ///
    /// # Errors
    ///
    /// Returns error if the broker is missing or malformed, `group.id` or
    /// `client.id` is missing, or a numeric parameter is out of range.
    pub fn from_config(config: &ConfigMap) -> Result<Self, TransportError> {
        let broker = config
            .get(BROKER)
            .ok_or_else(|| TransportError::Config(format!("missing '{BROKER}'")))?;
        let (host, port) = parse_mqtt_url(broker)?;

        let group_id = config
            .get(GROUP_ID)
            .filter(|group| !group.is_empty())
            .ok_or_else(|| TransportError::Config(format!("missing '{GROUP_ID}'")))?
            .to_string();
        if group_id.contains(['/', '+', '#']) {
            return Err(TransportError::Config(format!(
                "'{GROUP_ID}' must not contain '/', '+' or '#': {group_id}"
            )));
        }

        let client_id = config
            .get(CLIENT_ID)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TransportError::Config(format!("missing '{CLIENT_ID}'")))?
            .to_string();

        let keep_alive_secs = parse_number(config, KEEP_ALIVE_SECS, DEFAULT_KEEP_ALIVE_SECS)?;
        if keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(TransportError::Config(format!(
                "'{KEEP_ALIVE_SECS}' must be at least {MIN_KEEP_ALIVE_SECS}"
            )));
        }

        let channel_capacity = parse_number(config, CHANNEL_CAPACITY, DEFAULT_CHANNEL_CAPACITY)?;
        if channel_capacity == 0 {
            return Err(TransportError::Config(format!(
                "'{CHANNEL_CAPACITY}' must be positive"
            )));
        }

        Ok(Self {
            host,
            port,
            client_id,
            group_id,
            keep_alive: Duration::from_secs(keep_alive_secs),
            channel_capacity,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    config: &ConfigMap,
    key: &str,
    default: T,
) -> Result<T, TransportError> {
    match config.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| TransportError::Config(format!("'{key}' is not a number: {raw}"))),
    }
}

/// Parse MQTT URL into host and port.
fn parse_mqtt_url(input: &str) -> Result<(String, u16), TransportError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| TransportError::Config(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(TransportError::Config(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Config(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TransportError::Config(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => DEFAULT_PORT,
        Some(port) => port
            .parse()
            .map_err(|_| TransportError::Config(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(TransportError::Config(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn group_id_defaults_to_identity() {
        let mut config: ConfigMap = [(BROKER, "tcp://localhost:1883")].into_iter().collect();

        assert!(config.with_default_group_id(&identity("agent-1")));
        assert_eq!(config.get(GROUP_ID), Some("agent-1"));
    }

    #[test]
    fn configured_group_id_is_kept() {
        let mut config: ConfigMap = [(GROUP_ID, "shared")].into_iter().collect();

        assert!(!config.with_default_group_id(&identity("agent-1")));
        assert_eq!(config.get(GROUP_ID), Some("shared"));
    }

    #[test]
    fn empty_group_id_is_replaced() {
        let mut config: ConfigMap = [(GROUP_ID, "")].into_iter().collect();

        assert!(config.with_default_group_id(&identity("agent-1")));
        assert_eq!(config.get(GROUP_ID), Some("agent-1"));
    }

    #[test]
    fn client_id_defaults_to_identity() {
        let mut config: ConfigMap = [(GROUP_ID, "fleet")].into_iter().collect();

        assert!(config.with_default_client_id(&identity("agent-1")));
        assert_eq!(config.get(CLIENT_ID), Some("agent-1"));
        assert!(!config.with_default_client_id(&identity("agent-2")));
        assert_eq!(config.get(CLIENT_ID), Some("agent-1"));
    }

    #[test]
    fn settings_defaults() {
        let config: ConfigMap = [
            (BROKER, "tcp://broker.example.com"),
            (GROUP_ID, "fleet"),
            (CLIENT_ID, "agent-1"),
        ]
        .into_iter()
        .collect();

        let settings = MqttSettings::from_config(&config).unwrap();
        assert_eq!(settings.host, "broker.example.com");
        assert_eq!(settings.port, 1883);
        assert_eq!(settings.client_id, "agent-1");
        assert_eq!(settings.group_id, "fleet");
        assert_eq!(settings.keep_alive, Duration::from_secs(30));
        assert_eq!(settings.channel_capacity, 100);
    }

    #[test]
    fn settings_overrides() {
        let config: ConfigMap = [
            (BROKER, "localhost:11883"),
            (GROUP_ID, "agent-1"),
            (CLIENT_ID, "agent-1-pod-a"),
            (KEEP_ALIVE_SECS, "10"),
            (CHANNEL_CAPACITY, "8"),
        ]
        .into_iter()
        .collect();

        let settings = MqttSettings::from_config(&config).unwrap();
        assert_eq!(settings.port, 11883);
        assert_eq!(settings.client_id, "agent-1-pod-a");
        assert_eq!(settings.keep_alive, Duration::from_secs(10));
        assert_eq!(settings.channel_capacity, 8);
    }

    #[test]
    fn settings_rejects_invalid() {
        let missing_broker: ConfigMap = [(GROUP_ID, "agent-1"), (CLIENT_ID, "agent-1")]
            .into_iter()
            .collect();
        assert!(matches!(
            MqttSettings::from_config(&missing_broker),
            Err(TransportError::Config(_))
        ));

        let missing_client: ConfigMap = [(BROKER, "localhost"), (GROUP_ID, "agent-1")]
            .into_iter()
            .collect();
        assert!(matches!(
            MqttSettings::from_config(&missing_client),
            Err(TransportError::Config(_))
        ));

        for (key, value) in [
            (BROKER, "http://localhost"),
            (BROKER, "localhost:abc"),
            (GROUP_ID, "a/b"),
            (KEEP_ALIVE_SECS, "1"),
            (CHANNEL_CAPACITY, "0"),
        ] {
            let mut config: ConfigMap = [
                (BROKER, "localhost"),
                (GROUP_ID, "agent-1"),
                (CLIENT_ID, "agent-1"),
            ]
            .into_iter()
            .collect();
            config.set(key, value);
            assert!(
                matches!(MqttSettings::from_config(&config), Err(TransportError::Config(_))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn parse_mqtt_url_variants() {
        assert_eq!(
            parse_mqtt_url("tcp://localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("mqtt://broker:2883").unwrap(),
            ("broker".to_string(), 2883)
        );
        assert_eq!(
            parse_mqtt_url("localhost").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert!(parse_mqtt_url("a:1:2").is_err());
    }
}
