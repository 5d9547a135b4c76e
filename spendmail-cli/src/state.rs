use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$SPENDMAIL_HOME`, or `~/.spendmail`.
pub fn spendmail_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SPENDMAIL_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".spendmail"))
}

pub fn ensure_spendmail_home() -> Result<PathBuf> {
    let dir = spendmail_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_store_path() -> Result<PathBuf> {
    Ok(spendmail_home()?.join("transactions.jsonl"))
}
