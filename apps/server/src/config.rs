//! Process configuration read from the environment.

const DEFAULT_PORT: u16 = 8088;
const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017/ledger-countervalue";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Store backend, `mongodb` (default) or `memory`.
    pub database: String,
    pub mongodb_uri: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let database = std::env::var("DATABASE").unwrap_or_else(|_| "mongodb".to_string());
        let mongodb_uri =
            std::env::var("MONGODB_URI").unwrap_or_else(|_| DEFAULT_MONGODB_URI.to_string());
        Self {
            port,
            database,
            mongodb_uri,
        }
    }

    pub fn listen_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
