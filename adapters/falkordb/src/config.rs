//! Configuration types for the FalkorDB adapter

use serde::{Deserialize, Serialize};

/// Connection settings for a FalkorDB instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalkorConfig {
    /// Host name of the FalkorDB server
    pub host: String,
    /// Port (FalkorDB speaks the Redis protocol)
    pub port: u16,
    /// Optional password
    pub password: Option<String>,
}

impl Default for FalkorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl FalkorConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Redis connection URL for this configuration.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", password, self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_password_when_set() {
        let config = FalkorConfig::default();
        assert_eq!(config.url(), "redis://localhost:6379");

        let config = FalkorConfig::new("db", 6380).with_password("secret");
        assert_eq!(config.url(), "redis://:secret@db:6380");
    }
}
