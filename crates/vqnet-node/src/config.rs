//! Configuration management for vqnet nodes.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with VQNET_ prefix)
//! 3. .env files
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values
//!
//! # File layout
//!
//! ```yaml
//! settings:
//!   max_qubits: 20
//!   register_capacity: 10
//! logging:
//!   level: info
//!   format: console
//! networks:
//!   default:
//!     nodes:
//!       Alice: { host: localhost, port: 8801 }
//!       Bob: { host: localhost, port: 8802 }
//!     topology:          # optional, omitted means fully connected
//!       Alice: [Bob]
//!       Bob: [Alice]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Name of the network used when none is given.
pub const DEFAULT_NETWORK: &str = "default";

/// Nodes of the network available without a configuration file.
pub const DEFAULT_NODES: [&str; 5] = ["Alice", "Bob", "Charlie", "David", "Eve"];

/// Port of the first default node; the others follow consecutively.
pub const DEFAULT_BASE_PORT: u16 = 8801;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-node limits and timings
    #[serde(default)]
    pub settings: NodeSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Network topologies keyed by network name
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Engine implementation backing every register of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Dense statevector.
    #[default]
    Statevector,
    /// Stabilizer tableau, Clifford gates only.
    Stabilizer,
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statevector" => Ok(EngineKind::Statevector),
            "stabilizer" => Ok(EngineKind::Stabilizer),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown engine: {other}"
            ))),
        }
    }
}

/// Limits and timings shared by every node of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Maximum number of virtual qubits per node
    #[serde(default = "default_max_qubits")]
    pub max_qubits: usize,

    /// Maximum number of registers per node
    #[serde(default = "default_max_registers")]
    pub max_registers: usize,

    /// Capacity of a freshly created register
    #[serde(default = "default_register_capacity")]
    pub register_capacity: usize,

    /// Engine backing each register
    #[serde(default)]
    pub engine: EngineKind,

    /// Delay before retrying a refused connection
    #[serde(default = "default_conn_retry_ms")]
    pub conn_retry_ms: u64,

    /// How long recv/recv_epr wait for a delivery
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Polling interval of recv/recv_epr
    #[serde(default = "default_recv_retry_ms")]
    pub recv_retry_ms: u64,

    /// Delay before re-routing an operation on a qubit that moved
    #[serde(default = "default_qubit_retry_ms")]
    pub qubit_retry_ms: u64,

    /// Lower bound of the randomized lock backoff
    #[serde(default = "default_lock_backoff_min_ms")]
    pub lock_backoff_min_ms: u64,

    /// Upper bound (exclusive) of the randomized lock backoff
    #[serde(default = "default_lock_backoff_max_ms")]
    pub lock_backoff_max_ms: u64,

    /// Attempts before lock acquisition or re-routing gives up
    #[serde(default = "default_max_lock_attempts")]
    pub max_lock_attempts: u32,
}

impl NodeSettings {
    /// Delay before retrying a refused connection.
    pub fn conn_retry(&self) -> Duration {
        Duration::from_millis(self.conn_retry_ms)
    }

    /// Deadline of recv/recv_epr.
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Polling interval of recv/recv_epr.
    pub fn recv_retry(&self) -> Duration {
        Duration::from_millis(self.recv_retry_ms)
    }

    /// Re-routing delay for moved qubits.
    pub fn qubit_retry(&self) -> Duration {
        Duration::from_millis(self.qubit_retry_ms)
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            max_qubits: default_max_qubits(),
            max_registers: default_max_registers(),
            register_capacity: default_register_capacity(),
            engine: EngineKind::default(),
            conn_retry_ms: default_conn_retry_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            recv_retry_ms: default_recv_retry_ms(),
            qubit_retry_ms: default_qubit_retry_ms(),
            lock_backoff_min_ms: default_lock_backoff_min_ms(),
            lock_backoff_max_ms: default_lock_backoff_max_ms(),
            max_lock_attempts: default_max_lock_attempts(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Where a node listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Host name or IP
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl NodeEndpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One network: its nodes and optional adjacency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Node endpoints keyed by node name
    pub nodes: BTreeMap<String, NodeEndpoint>,

    /// Neighbours keyed by node name; `None` means fully connected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<BTreeMap<String, Vec<String>>>,
}

impl NetworkConfig {
    /// Create an empty, fully connected network.
    pub fn new() -> Self {
        Self::default()
    }

    /// [`DEFAULT_NODES`] on localhost, fully connected.
    pub fn local_default() -> Self {
        DEFAULT_NODES
            .iter()
            .zip(DEFAULT_BASE_PORT..)
            .fold(Self::new(), |network, (name, port)| {
                network.with_node(*name, NodeEndpoint::new("localhost", port))
            })
    }

    /// Add a node.
    pub fn with_node(mut self, name: impl Into<String>, endpoint: NodeEndpoint) -> Self {
        self.nodes.insert(name.into(), endpoint);
        self
    }

    /// Add an undirected link, switching the network to an explicit topology.
    pub fn with_link(mut self, a: &str, b: &str) -> Self {
        let topology = self.topology.get_or_insert_with(BTreeMap::new);
        let mut link = |from: &str, to: &str| {
            let neighbours = topology.entry(from.to_string()).or_default();
            if !neighbours.iter().any(|n| n == to) {
                neighbours.push(to.to_string());
            }
        };
        link(a, b);
        link(b, a);
        self
    }

    /// Endpoint of a node.
    pub fn endpoint(&self, name: &str) -> Option<&NodeEndpoint> {
        self.nodes.get(name)
    }

    /// Whether a node is part of this network.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All node names, sorted.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Whether `from` may exchange qubits with `to`.
    ///
    /// Without a topology every pair is adjacent. With one, a node missing
    /// from the map has no neighbours.
    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        let Some(topology) = &self.topology else {
            return true;
        };
        match topology.get(from) {
            Some(neighbours) => neighbours.iter().any(|n| n == to),
            None => {
                warn!(node = from, "Node is not listed in the topology, treating it as isolated");
                false
            }
        }
    }

    fn validate(&self, network: &str) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Network '{network}' has no nodes"
            )));
        }
        if let Some(topology) = &self.topology {
            for (node, neighbours) in topology {
                for name in std::iter::once(node).chain(neighbours) {
                    if !self.contains(name) {
                        return Err(ConfigError::ValidationError(format!(
                            "Topology of network '{network}' names unknown node '{name}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_max_qubits() -> usize {
    20
}

fn default_max_registers() -> usize {
    1000
}

fn default_register_capacity() -> usize {
    10
}

fn default_conn_retry_ms() -> u64 {
    500
}

fn default_recv_timeout_ms() -> u64 {
    10_000
}

fn default_recv_retry_ms() -> u64 {
    100
}

fn default_qubit_retry_ms() -> u64 {
    1_000
}

fn default_lock_backoff_min_ms() -> u64 {
    1_000
}

fn default_lock_backoff_max_ms() -> u64 {
    4_000
}

fn default_max_lock_attempts() -> u32 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Default settings plus [`NetworkConfig::local_default`] as
    /// [`DEFAULT_NETWORK`].
    pub fn with_default_network() -> Self {
        let mut config = Self::default();
        config
            .networks
            .insert(DEFAULT_NETWORK.to_string(), NetworkConfig::local_default());
        config
    }

    /// Load configuration with the following precedence:
    /// 1. Load .env file if it exists
    /// 2. Load from file if provided, else [`Config::with_default_network`]
    /// 3. Apply environment variable overrides
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = if let Some(path) = config_file {
            Self::from_file(path)?
        } else {
            Config::with_default_network()
        };

        let config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into this configuration.
    ///
    /// Only variables that are explicitly set override the file-loaded (or
    /// default) values.
    pub fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let settings = &mut self.settings;
        override_var(&lookup, "VQNET_MAX_QUBITS", &mut settings.max_qubits)?;
        override_var(&lookup, "VQNET_MAX_REGISTERS", &mut settings.max_registers)?;
        override_var(&lookup, "VQNET_REGISTER_CAPACITY", &mut settings.register_capacity)?;
        override_var(&lookup, "VQNET_ENGINE", &mut settings.engine)?;
        override_var(&lookup, "VQNET_CONN_RETRY_MS", &mut settings.conn_retry_ms)?;
        override_var(&lookup, "VQNET_RECV_TIMEOUT_MS", &mut settings.recv_timeout_ms)?;
        override_var(&lookup, "VQNET_RECV_RETRY_MS", &mut settings.recv_retry_ms)?;
        override_var(&lookup, "VQNET_QUBIT_RETRY_MS", &mut settings.qubit_retry_ms)?;
        override_var(&lookup, "VQNET_LOCK_BACKOFF_MIN_MS", &mut settings.lock_backoff_min_ms)?;
        override_var(&lookup, "VQNET_LOCK_BACKOFF_MAX_MS", &mut settings.lock_backoff_max_ms)?;
        override_var(&lookup, "VQNET_MAX_LOCK_ATTEMPTS", &mut settings.max_lock_attempts)?;

        if let Some(v) = lookup("VQNET_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("VQNET_LOG_FORMAT") {
            self.logging.format = v;
        }

        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.settings;
        for (name, value) in [
            ("max_qubits", s.max_qubits),
            ("max_registers", s.max_registers),
            ("register_capacity", s.register_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if s.recv_retry_ms == 0 {
            return Err(ConfigError::ValidationError(
                "recv_retry_ms must be greater than 0".to_string(),
            ));
        }
        if s.max_lock_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_lock_attempts must be greater than 0".to_string(),
            ));
        }
        if s.lock_backoff_min_ms > s.lock_backoff_max_ms {
            return Err(ConfigError::ValidationError(format!(
                "lock_backoff_min_ms ({}) exceeds lock_backoff_max_ms ({})",
                s.lock_backoff_min_ms, s.lock_backoff_max_ms
            )));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }
        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        for (name, network) in &self.networks {
            network.validate(name)?;
        }
        Ok(())
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }
}

fn override_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("Invalid value for {key}: {raw}")))?;
    }
    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r"
settings:
  register_capacity: 4
  lock_backoff_min_ms: 5
  lock_backoff_max_ms: 20
networks:
  default:
    nodes:
      Alice: { host: localhost, port: 8801 }
      Bob: { host: localhost, port: 8802 }
      Charlie: { host: localhost, port: 8803 }
  line:
    nodes:
      Alice: { host: localhost, port: 8811 }
      Bob: { host: localhost, port: 8812 }
      Charlie: { host: localhost, port: 8813 }
    topology:
      Alice: [Bob]
      Bob: [Alice, Charlie]
      Charlie: [Bob]
";

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.settings.max_qubits, 20);
        assert_eq!(config.settings.max_registers, 1000);
        assert_eq!(config.settings.register_capacity, 10);
        assert_eq!(config.settings.recv_timeout(), Duration::from_secs(10));
        assert_eq!(config.settings.max_lock_attempts, 300);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_has_default_network() {
        let config = Config::load(None).unwrap();
        let net = config.network(DEFAULT_NETWORK).unwrap();
        assert_eq!(
            net.node_names().collect::<Vec<_>>(),
            ["Alice", "Bob", "Charlie", "David", "Eve"]
        );
        assert_eq!(net.endpoint("Alice").unwrap().address(), "localhost:8801");
        assert_eq!(net.endpoint("Eve").unwrap().address(), "localhost:8805");
        assert!(net.is_adjacent("Alice", "Eve"));
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.settings.register_capacity, 4);
        // Unset fields keep their defaults.
        assert_eq!(config.settings.max_qubits, 20);

        let net = config.network("default").unwrap();
        assert_eq!(net.node_names().collect::<Vec<_>>(), ["Alice", "Bob", "Charlie"]);
        assert_eq!(net.endpoint("Bob").unwrap().address(), "localhost:8802");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.networks.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/vqnet.yaml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_unknown_network() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert!(matches!(
            config.network("lab"),
            Err(ConfigError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn test_adjacency() {
        let config = Config::from_yaml(SAMPLE).unwrap();

        let full = config.network("default").unwrap();
        assert!(full.is_adjacent("Alice", "Charlie"));

        let line = config.network("line").unwrap();
        assert!(line.is_adjacent("Alice", "Bob"));
        assert!(line.is_adjacent("Bob", "Charlie"));
        assert!(!line.is_adjacent("Alice", "Charlie"));
    }

    #[test]
    fn test_adjacency_fails_closed() {
        let net = NetworkConfig::new()
            .with_node("Alice", NodeEndpoint::new("localhost", 1))
            .with_node("Bob", NodeEndpoint::new("localhost", 2))
            .with_node("Eve", NodeEndpoint::new("localhost", 3))
            .with_link("Alice", "Bob");
        assert!(net.is_adjacent("Bob", "Alice"));
        assert!(!net.is_adjacent("Eve", "Alice"));
    }

    #[test]
    fn test_topology_with_unknown_node_rejected() {
        let yaml = r"
networks:
  default:
    nodes:
      Alice: { host: localhost, port: 8801 }
    topology:
      Alice: [Mallory]
";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_backoff_window() {
        let mut config = Config::default();
        config.settings.lock_backoff_min_ms = 10;
        config.settings.lock_backoff_max_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VQNET_MAX_QUBITS", "8"),
            ("VQNET_ENGINE", "stabilizer"),
            ("VQNET_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .merge_vars(|k| vars.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.settings.max_qubits, 8);
        assert_eq!(config.settings.engine, EngineKind::Stabilizer);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.settings.max_registers, 1000);
    }

    #[test]
    fn test_log_format_override_reaches_tracing() {
        let config = Config::default()
            .merge_vars(|k| (k == "VQNET_LOG_FORMAT").then(|| "json".to_string()))
            .unwrap();
        let tracing = crate::tracing_config::TracingConfig::from_logging(&config.logging);
        assert_eq!(tracing.format, crate::tracing_config::TracingFormat::Json);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let result = Config::default().merge_vars(|k| {
            (k == "VQNET_RECV_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
