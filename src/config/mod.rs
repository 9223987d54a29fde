//! Client configuration management

use std::env;

use anyhow::{Context, Result};

use crate::orm::DEFAULT_TYPE_TABLE;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Database URL, e.g. `sqlite://data/app.db` or `sqlite::memory:`
    pub database_url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// Log every statement through the debug driver
    pub debug: bool,

    /// Table listing entity tables in global-id order
    pub type_table: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 10,
            debug: false,
            type_table: DEFAULT_TYPE_TABLE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            None => defaults.max_connections,
        };
        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        let debug = match lookup("ENTGRAPH_DEBUG") {
            Some(v) => parse_bool(&v).context("Invalid ENTGRAPH_DEBUG")?,
            None => defaults.debug,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            debug,
            type_table: lookup("ENTGRAPH_TYPE_TABLE").unwrap_or(defaults.type_table),
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.type_table, "ent_types");
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://data/test.db"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("ENTGRAPH_DEBUG", "true"),
            ("ENTGRAPH_TYPE_TABLE", "types"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite://data/test.db");
        assert_eq!(config.max_connections, 4);
        assert!(config.debug);
        assert_eq!(config.type_table, "types");
    }

    #[test]
    fn test_invalid_values() {
        assert!(ClientConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "many")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "0")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("ENTGRAPH_DEBUG", "maybe")])).is_err());
    }
}
