//! Agent configuration.

use anyhow::{Context, Result};
use cebus_transport::config::BROKER;
use cebus_transport::ConfigMap;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Cluster this agent represents
    pub cluster_name: String,

    /// Agent instance identifier
    pub agent_id: Option<String>,

    /// Connection parameters passed to the transport
    pub transport: ConfigMap,

    /// Ask every hub to resend state on startup
    pub resync_on_start: bool,

    /// Heartbeat configuration
    pub heartbeat: HeartbeatConfig,
}

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Source that receives heartbeats; none disables them
    pub source: Option<String>,

    /// Interval between heartbeats
    pub interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut transport = ConfigMap::new();
        transport.set(BROKER, "tcp://localhost:1883");

        Self {
            cluster_name: "local-cluster".to_string(),
            agent_id: None,
            transport,
            resync_on_start: true,
            heartbeat: HeartbeatConfig {
                source: None,
                interval: Duration::from_secs(60),
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CEBUS_CLUSTER_NAME`: Cluster this agent represents
    /// - `CEBUS_AGENT_ID`: Agent instance identifier (random if unset)
    /// - `CEBUS_BROKER`: MQTT broker URL
    /// - `CEBUS_TRANSPORT_CONFIG`: JSON object of extra transport parameters
    /// - `CEBUS_RESYNC_ON_START`: "true" or "false"
    /// - `CEBUS_HEARTBEAT_SOURCE`: Source that receives heartbeats
    /// - `CEBUS_HEARTBEAT_INTERVAL_SECS`: Heartbeat interval
    ///
    /// # Errors
    ///
    /// Returns error if a variable has an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(cluster_name) = lookup("CEBUS_CLUSTER_NAME") {
            config.cluster_name = cluster_name;
        }

        if let Some(agent_id) = lookup("CEBUS_AGENT_ID") {
            config.agent_id = Some(agent_id);
        }

        // Applied before CEBUS_BROKER so the dedicated variable wins
        if let Some(raw) = lookup("CEBUS_TRANSPORT_CONFIG") {
            let extra: BTreeMap<String, String> =
                serde_json::from_str(&raw).context("Invalid CEBUS_TRANSPORT_CONFIG JSON")?;
            for (key, value) in extra {
                config.transport.set(key, value);
            }
        }

        if let Some(broker) = lookup("CEBUS_BROKER") {
            config.transport.set(BROKER, broker);
        }

        if let Some(raw) = lookup("CEBUS_RESYNC_ON_START") {
            config.resync_on_start = raw
                .parse()
                .context("Invalid CEBUS_RESYNC_ON_START, expected true or false")?;
        }

        if let Some(source) = lookup("CEBUS_HEARTBEAT_SOURCE") {
            config.heartbeat.source = Some(source).filter(|s| !s.is_empty());
        }

        if let Some(raw) = lookup("CEBUS_HEARTBEAT_INTERVAL_SECS") {
            let secs: u64 = raw
                .parse()
                .context("Invalid CEBUS_HEARTBEAT_INTERVAL_SECS")?;
            anyhow::ensure!(secs > 0, "CEBUS_HEARTBEAT_INTERVAL_SECS must be positive");
            config.heartbeat.interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Agent identifier, generating one if none is configured.
    #[must_use]
    pub fn agent_id_or_generate(&self) -> String {
        self.agent_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.cluster_name, Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cebus_transport::config::GROUP_ID;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AgentConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = load(&[]).unwrap();

        assert_eq!(config.cluster_name, "local-cluster");
        assert_eq!(config.transport.get(BROKER), Some("tcp://localhost:1883"));
        assert!(config.resync_on_start);
        assert!(config.heartbeat.source.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = load(&[
            ("CEBUS_CLUSTER_NAME", "cluster7"),
            ("CEBUS_AGENT_ID", "agent-7a"),
            ("CEBUS_TRANSPORT_CONFIG", r#"{"group.id": "fleet", "broker": "tcp://ignored"}"#),
            ("CEBUS_BROKER", "tcp://broker:1883"),
            ("CEBUS_RESYNC_ON_START", "false"),
            ("CEBUS_HEARTBEAT_SOURCE", "hub"),
            ("CEBUS_HEARTBEAT_INTERVAL_SECS", "15"),
        ])
        .unwrap();

        assert_eq!(config.cluster_name, "cluster7");
        assert_eq!(config.agent_id_or_generate(), "agent-7a");
        assert_eq!(config.transport.get(GROUP_ID), Some("fleet"));
        assert_eq!(config.transport.get(BROKER), Some("tcp://broker:1883"));
        assert!(!config.resync_on_start);
        assert_eq!(config.heartbeat.source.as_deref(), Some("hub"));
        assert_eq!(config.heartbeat.interval, Duration::from_secs(15));
    }

    #[test]
    fn generated_agent_id_includes_cluster() {
        let config = load(&[("CEBUS_CLUSTER_NAME", "cluster7")]).unwrap();
        assert!(config.agent_id_or_generate().starts_with("cluster7-"));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(load(&[("CEBUS_TRANSPORT_CONFIG", "not json")]).is_err());
        assert!(load(&[("CEBUS_RESYNC_ON_START", "yes")]).is_err());
        assert!(load(&[("CEBUS_HEARTBEAT_INTERVAL_SECS", "0")]).is_err());
    }
}
