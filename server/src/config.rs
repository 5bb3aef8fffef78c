use crate::command::CommandArgs;
use clap::Parser;
use common::config::CommonConfig;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// The default configuration file path, resolved relative to the process's
/// working directory the way the teacher resolves `proxy.toml`/`agent.toml`.
const DEFAULT_CONFIG_FILE: &str = "./resources/tunneld.toml";
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Parse the command line, load the configuration file it names (or the
/// default), merge command-line overrides over it, and cache the result for
/// the lifetime of the process.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let command_line = CommandArgs::parse();
        let config_content = match &command_line.config_file_path {
            None => read_to_string(DEFAULT_CONFIG_FILE).unwrap_or_else(|_| {
                panic!(
                    "Fail to read tunnel server configuration file content from: {:?}",
                    DEFAULT_CONFIG_FILE
                )
            }),
            Some(path) => read_to_string(path).unwrap_or_else(|_| {
                panic!(
                    "Fail to read tunnel server configuration file content from: {:?}",
                    path
                )
            }),
        };
        let mut config = toml::from_str::<Config>(&config_content)
            .expect("Fail to initialize tunnel server configuration");
        config.merge_command_args(command_line);
        config
    })
}

/// The two listen endpoints plus the ambient `CommonConfig` fields (§6 —
/// every other parameter named in spec.md is a constant, not configurable).
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    common: CommonConfig,
    tunnel_listening_address: SocketAddr,
    socks_listening_address: SocketAddr,
}

impl Config {
    pub fn common(&self) -> &CommonConfig {
        &self.common
    }

    pub fn tunnel_listening_address(&self) -> SocketAddr {
        self.tunnel_listening_address
    }

    pub fn socks_listening_address(&self) -> SocketAddr {
        self.socks_listening_address
    }

    fn merge_command_args(&mut self, command: CommandArgs) {
        if let Some(tunnel_listening_address) = command.tunnel_listening_address {
            self.tunnel_listening_address = tunnel_listening_address;
        }
        if let Some(socks_listening_address) = command.socks_listening_address {
            self.socks_listening_address = socks_listening_address;
        }
        if let Some(worker_threads) = command.worker_threads {
            self.common.worker_threads = worker_threads;
        }
        if let Some(log_directory) = command.log_directory {
            self.common.log_directory = log_directory;
        }
        if let Some(max_log_level) = command.max_log_level {
            self.common.max_log_level = max_log_level;
        }
        if let Some(client_max_connections) = command.client_max_connections {
            self.common.client_max_connections = client_max_connections;
        }
    }
}
