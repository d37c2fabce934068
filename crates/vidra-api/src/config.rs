//! Process configuration, loaded once from the environment at startup and
//! shared by reference through `AppState`.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Deliberately not `Debug`: it holds both signing secrets.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Where uploaded images are staged before going to the blob store.
    pub upload_dir: PathBuf,
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_secret: String,
    pub refresh_token_ttl: Duration,
    pub blob_upload_url: String,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let host = or_default("VIDRA_HOST", "0.0.0.0");
        let port = parse_var("VIDRA_PORT", &or_default("VIDRA_PORT", "8000"))?;
        let db_path = PathBuf::from(or_default("VIDRA_DB_PATH", "vidra.db"));
        let upload_dir = PathBuf::from(or_default("VIDRA_UPLOAD_DIR", "./uploads"));

        let access_token_secret = required("ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required("REFRESH_TOKEN_SECRET")?;
        if access_token_secret == refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "REFRESH_TOKEN_SECRET".to_string(),
                "must differ from ACCESS_TOKEN_SECRET".to_string(),
            ));
        }

        let access_minutes: i64 = parse_var(
            "ACCESS_TOKEN_EXPIRY_MINUTES",
            &or_default("ACCESS_TOKEN_EXPIRY_MINUTES", "60"),
        )?;
        let refresh_days: i64 = parse_var(
            "REFRESH_TOKEN_EXPIRY_DAYS",
            &or_default("REFRESH_TOKEN_EXPIRY_DAYS", "10"),
        )?;
        if access_minutes <= 0 || refresh_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "ACCESS_TOKEN_EXPIRY_MINUTES/REFRESH_TOKEN_EXPIRY_DAYS".to_string(),
                "expiries must be positive".to_string(),
            ));
        }

        let access_token_ttl = Duration::try_minutes(access_minutes).ok_or_else(|| {
            ConfigError::InvalidValue(
                "ACCESS_TOKEN_EXPIRY_MINUTES".to_string(),
                "out of range".to_string(),
            )
        })?;
        let refresh_token_ttl = Duration::try_days(refresh_days).ok_or_else(|| {
            ConfigError::InvalidValue(
                "REFRESH_TOKEN_EXPIRY_DAYS".to_string(),
                "out of range".to_string(),
            )
        })?;

        let blob_upload_url = or_default("BLOB_UPLOAD_URL", "http://127.0.0.1:4000/upload");
        let cookie_secure = parse_var("COOKIE_SECURE", &or_default("COOKIE_SECURE", "true"))?;

        Ok(Self {
            host,
            port,
            db_path,
            upload_dir,
            access_token_secret,
            access_token_ttl,
            refresh_token_secret,
            refresh_token_ttl,
            blob_upload_url,
            cookie_secure,
        })
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue("VIDRA_HOST".to_string(), e.to_string())
            })
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
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
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_fill_everything_but_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a-secret"),
            ("REFRESH_TOKEN_SECRET", "r-secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.access_token_ttl, Duration::minutes(60));
        assert_eq!(config.refresh_token_ttl, Duration::days(10));
        assert!(config.cookie_secure);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.bind_address().unwrap().port(), 8000);
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let err = Config::from_lookup(lookup(&[("ACCESS_TOKEN_SECRET", "a")]))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "REFRESH_TOKEN_SECRET"));
    }

    #[test]
    fn shared_secret_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "same"),
            ("REFRESH_TOKEN_SECRET", "same"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue(..)));
    }

    #[test]
    fn bad_port_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "r"),
            ("VIDRA_PORT", "eighty"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "VIDRA_PORT"));
    }

    #[test]
    fn huge_expiry_is_invalid_not_a_panic() {
        let err = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "r"),
            ("REFRESH_TOKEN_EXPIRY_DAYS", "9223372036854775807"),
        ]))
        .err()
        .unwrap();
        assert!(
            matches!(err, ConfigError::InvalidValue(name, _) if name == "REFRESH_TOKEN_EXPIRY_DAYS")
        );

        let err = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "r"),
            ("ACCESS_TOKEN_EXPIRY_MINUTES", "9223372036854775807"),
        ]))
        .err()
        .unwrap();
        assert!(
            matches!(err, ConfigError::InvalidValue(name, _) if name == "ACCESS_TOKEN_EXPIRY_MINUTES")
        );
    }
}
