use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// The reverse tunnel server
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    /// The configuration file path
    #[arg(short = 'c', long)]
    pub config_file_path: Option<PathBuf>,
    /// The listening address of the tunnel port (control + proxy connections)
    #[arg(short = 't', long)]
    pub tunnel_listening_address: Option<SocketAddr>,
    /// The listening address of the socks5 front door
    #[arg(short = 's', long)]
    pub socks_listening_address: Option<SocketAddr>,
    /// The worker thread number
    #[arg(short = 'w', long)]
    pub worker_threads: Option<usize>,
    /// The log directory path
    #[arg(short = 'l', long)]
    pub log_directory: Option<PathBuf>,
    /// The max log level
    #[arg(short = 'm', long)]
    pub max_log_level: Option<String>,
    /// The maximum number of simultaneous connections allowed per listener
    #[arg(short = 'n', long)]
    pub client_max_connections: Option<usize>,
}
