use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub blob_root: PathBuf,
    /// Base URL prepended to signed blob links, without a trailing slash.
    pub public_url: String,
    pub signing_secret: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "carecrew.db".into()),
            blob_root: env::var("BLOB_ROOT")
                .unwrap_or_else(|_| "blobs".into())
                .into(),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            signing_secret: env::var("SIGNING_SECRET")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(3000),
        })
    }
}
