use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use spendmail_extract::OpenAiConfig;
use spendmail_ingest::PatternRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::{default_store_path, ensure_spendmail_home, spendmail_home};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierSection {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegistrySection {
    /// Extra issuer table merged over the built-in one.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Built-in issuers plus the configured extra table, if any.
    pub fn registry(&self) -> Result<PatternRegistry> {
        let mut registry = PatternRegistry::builtin().context("load built-in issuers")?;
        if let Some(p) = &self.registry.path {
            let extra = PatternRegistry::from_path(p)
                .with_context(|| format!("load issuer table {}", p.display()))?;
            registry.extend(extra);
        }
        Ok(registry)
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(p) => Ok(p.clone()),
            None => default_store_path(),
        }
    }

    /// Backend settings, with the API key read from the environment.
    pub fn openai_config(&self) -> Result<OpenAiConfig> {
        let c = &self.classifier;
        if c.provider != "openai" {
            bail!("unsupported classifier provider {:?} (expected \"openai\")", c.provider);
        }
        let key = std::env::var(&c.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} is not set", c.api_key_env))?;
        Ok(OpenAiConfig {
            base_url: c.base_url.clone(),
            model: c.model.clone(),
            api_key: SecretString::from(key),
            timeout: Duration::from_secs(c.timeout_secs),
        })
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(spendmail_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = ensure_spendmail_home()?.join("config.toml");
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.classifier.model = "gpt-4.1-mini".to_string();
        cfg.store.path = Some(dir.path().join("txns.jsonl"));
        save_config(&cfg, &p).unwrap();
        assert_eq!(load_config_from(&p).unwrap(), cfg);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(
            &p,
            r#"
[classifier]
provider = "openai"
model = "gpt-4o-mini"
base_url = "http://localhost:8080"
api_key_env = "LOCAL_KEY"
timeout_secs = 5
"#,
        )
        .unwrap();
        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.classifier.base_url, "http://localhost:8080");
        assert_eq!(cfg.registry.path, None);
        assert_eq!(cfg.store.path, None);
    }

    #[test]
    fn test_store_only_file_keeps_classifier_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[store]\npath = \"/tmp/spend.jsonl\"\n").unwrap();
        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.classifier, ClassifierSection::default());
        assert_eq!(cfg.store.path, Some(PathBuf::from("/tmp/spend.jsonl")));
    }

    #[test]
    fn test_partial_classifier_section() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[classifier]\nmodel = \"gpt-4.1-mini\"\n").unwrap();
        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.classifier.model, "gpt-4.1-mini");
        assert_eq!(cfg.classifier.provider, "openai");
        assert_eq!(cfg.classifier.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.classifier.timeout_secs, 30);
    }

    #[test]
    fn test_registry_merges_extra_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("issuers.toml");
        fs::write(
            &table,
            r#"
[[issuer]]
domain = "alerts.examplebank.com"
currency = "USD"
date_format = "%m/%d/%Y"
pattern = '''purchase of \$(?P<amount>[\d,]+\.\d{2}) at (?P<merchant>[^\n]+?) on (?P<date>\d{2}/\d{2}/\d{4})'''
"#,
        )
        .unwrap();
        let mut cfg = Config::default();
        cfg.registry.path = Some(table);
        let reg = cfg.registry().unwrap();
        assert!(reg.lookup("alerts@hdfcbank.com").is_some());
        assert!(reg.lookup("card@alerts.examplebank.com").is_some());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.provider = "carrier-pigeon".to_string();
        assert!(cfg.openai_config().is_err());
    }
}
