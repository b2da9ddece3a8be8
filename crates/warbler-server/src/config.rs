use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub secret_key: String,
    pub session_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("WARBLER_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("WARBLER_SECRET_KEY is unset or still a placeholder");
        }

        let db_path = lookup("WARBLER_DB_PATH").unwrap_or_else(|| "warbler.db".into());
        let host = lookup("WARBLER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("WARBLER_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("WARBLER_PORT must be a port number")?;
        let session_days: i64 = lookup("WARBLER_SESSION_DAYS")
            .unwrap_or_else(|| "7".into())
            .parse()
            .context("WARBLER_SESSION_DAYS must be a whole number of days")?;
        if session_days <= 0 {
            bail!("WARBLER_SESSION_DAYS must be positive");
        }

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            db_path: db_path.into(),
            addr,
            secret_key,
            session_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("WARBLER_SECRET_KEY", "s3cr3t-value")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("warbler.db"));
        assert_eq!(config.addr.port(), 5000);
        assert_eq!(config.session_days, 7);
    }

    #[test]
    fn overrides_apply() {
        let config = Config::from_lookup(lookup(&[
            ("WARBLER_SECRET_KEY", "s3cr3t-value"),
            ("WARBLER_DB_PATH", "/tmp/w.db"),
            ("WARBLER_HOST", "127.0.0.1"),
            ("WARBLER_PORT", "8080"),
            ("WARBLER_SESSION_DAYS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path, PathBuf::from("/tmp/w.db"));
        assert_eq!(config.session_days, 30);
    }

    #[test]
    fn placeholder_secret_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("WARBLER_SECRET_KEY", "change-me")])).is_err());
    }

    #[test]
    fn bad_numbers_refused() {
        assert!(
            Config::from_lookup(lookup(&[
                ("WARBLER_SECRET_KEY", "ok-secret"),
                ("WARBLER_PORT", "http"),
            ]))
            .is_err()
        );
        assert!(
            Config::from_lookup(lookup(&[
                ("WARBLER_SECRET_KEY", "ok-secret"),
                ("WARBLER_SESSION_DAYS", "0"),
            ]))
            .is_err()
        );
    }
}
