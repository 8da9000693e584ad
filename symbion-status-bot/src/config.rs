//! Bot configuration loading
//!
//! Handles:
//! - Telegram bot token (API_TOKEN env var, via .env)
//! - Operator allow-list (ALLOWED_USERS env var, comma-separated IDs)
//! - Monitored service map (YAML file, SYMBION_STATUS_CONFIG env var)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// One monitored service: short display key + systemd unit name.
/// Declaration order in the YAML file is display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub key: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesFile {
    pub services: Vec<ServiceEntry>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Full bot configuration, read-only after startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub allowed_users: Vec<i64>,
    pub services: Vec<ServiceEntry>,
    pub probe_timeout_secs: u64,
}

impl BotConfig {
    /// Load configuration from the environment and the services YAML file.
    /// This is the only fatal path in the bot: a missing token, empty
    /// allow-list or unreadable service map aborts startup.
    pub async fn load() -> Result<Self> {
        let token = std::env::var("API_TOKEN").context("API_TOKEN is not set")?;
        if token.trim().is_empty() {
            bail!("API_TOKEN is empty");
        }

        let allowed_raw = std::env::var("ALLOWED_USERS").unwrap_or_default();
        let allowed_users = parse_allowed_users(&allowed_raw)
            .context("ALLOWED_USERS contains a non-numeric entry")?;
        if allowed_users.is_empty() {
            bail!("ALLOWED_USERS is empty, nobody could talk to the bot");
        }

        let path =
            std::env::var("SYMBION_STATUS_CONFIG").unwrap_or_else(|_| "status-bot.yaml".into());
        let services_file = load_services_file(&path).await?;

        Ok(Self {
            token,
            allowed_users,
            services: services_file.services,
            probe_timeout_secs: services_file.probe_timeout_secs,
        })
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.contains(&user_id)
    }

    /// Resolve a display key back to its service entry.
    pub fn service(&self, key: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.key == key)
    }
}

/// Parse the comma-separated operator allow-list. Tolerates whitespace and
/// empty segments ("1, 2,," parses to [1, 2]).
pub fn parse_allowed_users(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().with_context(|| format!("invalid user id: {s:?}")))
        .collect()
}

async fn load_services_file(path: &str) -> Result<ServicesFile> {
    if !Path::new(path).exists() {
        bail!("service map not found: {path}");
    }
    let txt = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read service map {path}"))?;
    let file: ServicesFile =
        serde_yaml::from_str(&txt).with_context(|| format!("invalid service map {path}"))?;
    validate_services(&file.services)?;
    Ok(file)
}

fn validate_services(services: &[ServiceEntry]) -> Result<()> {
    if services.is_empty() {
        bail!("service map lists no services");
    }
    let mut seen = HashSet::new();
    for entry in services {
        if entry.key.trim().is_empty() || entry.unit.trim().is_empty() {
            bail!("service entry with empty key or unit");
        }
        if !seen.insert(entry.key.as_str()) {
            bail!("duplicate service key: {}", entry.key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_users() {
        let users = parse_allowed_users("123, 456,789,,").unwrap();
        assert_eq!(users, vec![123, 456, 789]);
        assert!(parse_allowed_users("").unwrap().is_empty());
        assert!(parse_allowed_users("12a").is_err());
    }

    #[test]
    fn test_services_yaml_parsing() {
        let yaml = r#"
services:
  - key: web
    unit: nginx.service
  - key: db
    unit: postgresql.service
"#;
        let file: ServicesFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.services.len(), 2);
        assert_eq!(file.services[0].key, "web");
        assert_eq!(file.services[1].unit, "postgresql.service");
        assert_eq!(file.probe_timeout_secs, 5); // default
        validate_services(&file.services).unwrap();
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let services = vec![
            ServiceEntry { key: "web".into(), unit: "nginx.service".into() },
            ServiceEntry { key: "web".into(), unit: "httpd.service".into() },
        ];
        assert!(validate_services(&services).is_err());
    }

    #[test]
    fn test_service_lookup() {
        let cfg = BotConfig {
            token: "t".into(),
            allowed_users: vec![42],
            services: vec![ServiceEntry { key: "web".into(), unit: "nginx.service".into() }],
            probe_timeout_secs: 5,
        };
        assert!(cfg.is_allowed(42));
        assert!(!cfg.is_allowed(43));
        assert_eq!(cfg.service("web").unwrap().unit, "nginx.service");
        assert!(cfg.service("unknown").is_none());
    }
}
