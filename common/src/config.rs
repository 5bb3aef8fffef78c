use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A trait that defines methods for accessing server configuration details.
///
/// This trait is designed to be implemented by types that need to provide
/// information about the server's setup, such as the number of worker
/// threads it uses and where it logs to. Implementing this trait allows for
/// a consistent interface to access these properties regardless of which
/// concrete configuration type (file-backed, command-line, test fixture)
/// produced them.
///
/// # Methods
///
/// * `client_max_connections` - Specifies the maximum number of simultaneous
///   connections allowed per listener.
/// * `worker_threads` - Indicates the number of worker threads the tokio
///   runtime will use.
pub trait ServerConfig {
    /// Returns the maximum number of connections allowed per listener.
    ///
    /// # Returns
    ///
    /// * `usize` - The maximum number of connections as an unsigned integer.
    fn client_max_connections(&self) -> usize;
    /// Returns the number of worker threads currently configured for the system or process.
    ///
    /// # Returns
    ///
    /// * `usize` - The number of worker threads.
    fn worker_threads(&self) -> usize;
    /// Returns a reference to the path of the log directory.
    fn log_directory(&self) -> &Path;
    /// Returns the prefix used for log file names.
    fn log_name_prefix(&self) -> &str;
    /// Returns the maximum log level as a string slice.
    ///
    /// # Returns
    ///
    /// A string slice representing the maximum log level (parsed with
    /// `tracing::Level::from_str`).
    fn max_log_level(&self) -> &str;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommonConfig {
    pub client_max_connections: usize,
    pub log_directory: PathBuf,
    pub log_name_prefix: String,
    pub max_log_level: String,
    pub worker_threads: usize,
}

impl ServerConfig for CommonConfig {
    fn client_max_connections(&self) -> usize {
        self.client_max_connections
    }
    fn worker_threads(&self) -> usize {
        self.worker_threads
    }
    fn log_directory(&self) -> &Path {
        &self.log_directory
    }
    fn log_name_prefix(&self) -> &str {
        &self.log_name_prefix
    }
    fn max_log_level(&self) -> &str {
        &self.max_log_level
    }
}
