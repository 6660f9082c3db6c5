use std::collections::BTreeMap;
use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid member status entry `{0}`")]
    InvalidStatus(String),
    #[error("member status `{0}` is not configured")]
    MissingStatus(&'static str),
}

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub member_status: MemberStatus,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/members.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        let statuses = env::var("MEMBER_STATUSES").map_err(|_| ConfigError::Missing("MEMBER_STATUSES"))?;
        let member_status = MemberStatus::parse(&statuses)?;

        Ok(Self {
            server_port,
            sqlite_path,
            database_url,
            member_status,
        })
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}?mode=rwc", path)
    }
}

/// Named member status codes. `delete` and `active` must always be present.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberStatus {
    codes: BTreeMap<String, i64>,
}

impl MemberStatus {
    pub fn new(codes: BTreeMap<String, i64>) -> Result<Self, ConfigError> {
        for key in ["delete", "active"] {
            if !codes.contains_key(key) {
                return Err(ConfigError::MissingStatus(key));
            }
        }
        Ok(Self { codes })
    }

    /// Parses `delete=-1,deactive=0,active=1`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut codes = BTreeMap::new();
        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, code) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidStatus(entry.to_string()))?;
            let code = code
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidStatus(entry.to_string()))?;
            codes.insert(name.trim().to_string(), code);
        }
        Self::new(codes)
    }

    pub fn delete(&self) -> i64 {
        self.codes["delete"]
    }

    pub fn active(&self) -> i64 {
        self.codes["active"]
    }

    pub fn is_known(&self, code: i64) -> bool {
        self.codes.values().any(|c| *c == code)
    }
}
