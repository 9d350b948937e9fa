use anyhow::Context;
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_KEY_AUTO_PRUNE: &str = "fork-database.auto-prune";
pub const CONFIG_KEY_BFT_AUTO_IRREVERSIBLE: &str = "fork-database.bft-auto-irreversible";

const DEFAULT_AUTO_PRUNE: bool = true;
const DEFAULT_BFT_AUTO_IRREVERSIBLE: bool = true;

/// Fork database behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ForkDatabaseConfig {
    /// Prune blocks that fall below the head's irreversible block on add.
    pub auto_prune: bool,

    /// Mark a block BFT irreversible once a quorum of producers confirmed it.
    pub bft_auto_irreversible: bool,
}

impl Default for ForkDatabaseConfig {
    fn default() -> Self {
        Self {
            auto_prune: DEFAULT_AUTO_PRUNE,
            bft_auto_irreversible: DEFAULT_BFT_AUTO_IRREVERSIBLE,
        }
    }
}

impl ForkDatabaseConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_prune: config.get_bool(CONFIG_KEY_AUTO_PRUNE).unwrap_or(DEFAULT_AUTO_PRUNE),
            bft_auto_irreversible: config
                .get_bool(CONFIG_KEY_BFT_AUTO_IRREVERSIBLE)
                .unwrap_or(DEFAULT_BFT_AUTO_IRREVERSIBLE),
        }
    }

    /// Read the settings from a configuration file, any format `config` knows.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("loading fork database config from {}", path.display()))?;
        Ok(Self::from_config(&config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::io::Write;

    fn config(toml: &str) -> Config {
        Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build().unwrap()
    }

    #[test]
    fn test_defaults_when_missing() {
        assert_eq!(
            ForkDatabaseConfig::from_config(&Config::default()),
            ForkDatabaseConfig::default()
        );
    }

    #[test]
    fn test_reads_section() {
        let parsed = ForkDatabaseConfig::from_config(&config(
            "[fork-database]\nauto-prune = false\nbft-auto-irreversible = true\n",
        ));
        assert!(!parsed.auto_prune);
        assert!(parsed.bft_auto_irreversible);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[fork-database]\nbft-auto-irreversible = false").unwrap();
        let parsed = ForkDatabaseConfig::load(file.path()).unwrap();
        assert!(parsed.auto_prune);
        assert!(!parsed.bft_auto_irreversible);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(ForkDatabaseConfig::load(Path::new("/nonexistent/fork-database.toml")).is_err());
    }
}
