//! Agent configuration

use anyhow::Result;
use serde::Deserialize;

/// Environment variable naming an optional configuration file
const CONFIG_FILE_ENV: &str = "METADB_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health, metrics and lookups
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// procfs mount used to inspect processes
    #[serde(default = "default_proc_root")]
    pub proc_root: String,

    /// JSON cluster inventory used to seed the in-memory informer
    #[serde(default)]
    pub inventory_path: Option<String>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_proc_root() -> String {
    "/proc".to_string()
}

impl AgentConfig {
    /// Load configuration from the optional config file, then `METADB_*`
    /// environment variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("METADB").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
