use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("commitsync.db")
    }

    /// Shared rate budget cache. Kept apart from the main database so several
    /// deployments can point at one cache file.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("budget-cache.db")
    }

    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("commitsync.toml")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
        }
    }
}
