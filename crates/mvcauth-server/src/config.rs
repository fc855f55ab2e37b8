//! Server configuration.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

/// mvcauth server command line arguments.
#[derive(Debug, Parser)]
#[command(name = "mvcauth-server")]
#[command(about = "HTTP authentication front with an OAuth2 token endpoint")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// JSON file holding the authentication configuration tree.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Raw authentication configuration tree.
    pub auth: Value,
}

impl ServerConfig {
    /// Build the configuration from `args`, reading the config file if given.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let auth = match &args.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Value::Null,
        };

        Ok(Self {
            listen_addr: args.listen.clone(),
            auth,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            auth: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_without_config_file() {
        let args = Args::parse_from(["mvcauth-server"]);
        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.auth.is_null());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api-tools-oauth2": {{"db": {{"dsn": "memory:"}}}}}}"#).unwrap();

        let args = Args::parse_from([
            "mvcauth-server",
            "--listen",
            "127.0.0.1:9090",
            "--config",
            file.path().to_str().unwrap(),
        ]);
        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9090");
        assert_eq!(config.auth["api-tools-oauth2"]["db"]["dsn"], "memory:");
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let args = Args::parse_from([
            "mvcauth-server",
            "--config",
            file.path().to_str().unwrap(),
        ]);
        assert!(ServerConfig::load(&args).is_err());
    }
}
