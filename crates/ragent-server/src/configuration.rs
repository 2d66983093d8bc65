use config::{Config, Environment};
use ragent::settings::ENV_PREFIX;
use serde::Deserialize;
use std::net::SocketAddr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Read `RAG_SERVER__HOST` and `RAG_SERVER__PORT`
    pub fn new() -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Root {
            #[serde(default)]
            server: ServerSettings,
        }

        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let root: Root = config.try_deserialize()?;
        Ok(root.server)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}
