use std::path::Path;

use anyhow::{Context, Result};
use audit_relay::config::{BrokerConfig, ConfigStore, FigmentStore};
use audit_relay::formatter::EventKind;
use audit_relay::properties::PropertyCache;
use colored::Colorize;

use crate::utils;

/// Resolve and report the log and audit broker settings held in `file`
pub fn execute(file: &Path) -> Result<()> {
    let store = open_store(file)?;

    utils::section(&format!("Broker configuration in {}", file.display()));
    for kind in [EventKind::Log, EventKind::Audit] {
        let broker = BrokerConfig::resolve(store.as_ref(), kind)
            .with_context(|| format!("Invalid {} broker configuration", kind))?;
        report(kind, &broker);
    }

    Ok(())
}

fn open_store(file: &Path) -> Result<Box<dyn ConfigStore>> {
    if !file.exists() {
        anyhow::bail!("Configuration file not found: {}", file.display());
    }

    let is_toml = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        Ok(Box::new(FigmentStore::from_toml(file)))
    } else {
        let cache = PropertyCache::load(file)
            .with_context(|| format!("Failed to load properties from {}", file.display()))?;
        Ok(Box::new(cache))
    }
}

fn report(kind: EventKind, broker: &BrokerConfig) {
    if broker.enabled {
        utils::success(&format!(
            "{} forwarding {} → topic {} via {}",
            kind,
            "enabled".green(),
            broker.topic.bold(),
            broker.bootstrap_servers
        ));
    } else {
        utils::info(&format!("{} forwarding {}", kind, "disabled".dimmed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_check_properties_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("app.properties");
        fs::write(
            &file,
            "config.kafka.enable-log-kafka=true\n\
             config.kafka.server-details=localhost:4222\n\
             config.kafka.log-topic=app.logs\n",
        )
        .unwrap();

        assert!(execute(&file).is_ok());
    }

    #[test]
    fn test_check_toml_missing_topic_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(
            &file,
            "[config.kafka]\n\
             enable-audit-kafka = true\n\
             server-details = \"localhost:4222\"\n",
        )
        .unwrap();

        let err = execute(&file).unwrap_err();
        assert!(format!("{:#}", err).contains("config.kafka.audit-topic"));
    }

    #[test]
    fn test_check_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(execute(&dir.path().join("nope.properties")).is_err());
    }
}
